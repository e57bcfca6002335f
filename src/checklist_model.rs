//! In-memory checklist aggregate.
//!
//! A [`Checklist`] is the document an inspector works on during one visit to
//! one area of a solar park. It exclusively owns an ordered list of
//! [`InspectionItem`]s, and each item owns the photos taken at that check point
//! as fully loaded [`ImageRecord`]s.
//!
//! The store never hands out partially loaded items: whatever
//! [`DocumentStore::get_checklist_by_id`](crate::document_store::DocumentStore::get_checklist_by_id)
//! returns carries every image payload inline.
//!
//! # Examples
//!
//! ```rust
//! use checklist_store::checklist_model::{Checklist, ImageRecord, InspectionStatus, ItemTemplate};
//!
//! let template = vec![
//!     ItemTemplate::new("1.1", "Fence", "Fence intact, no gaps", "Yearly"),
//!     ItemTemplate::new("1.2", "Fence", "Gate locks", "Yearly"),
//! ];
//! let mut checklist = Checklist::new("Solbakken", "3", &template);
//!
//! checklist.set_item_status("1.1", InspectionStatus::Deviation);
//! checklist.add_image("1.1", ImageRecord::new("data:image/jpeg;base64,/9j/4AAQ"));
//!
//! assert_eq!(checklist.items[0].images.len(), 1);
//! assert_eq!(checklist.next_child_item_id("1"), "1.3");
//! ```

use std::fmt::{Display, Formatter};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A latitude/longitude pair as delivered by the device's geolocation.
///
/// Ranges are not validated; the store keeps whatever the collaborator produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Six-decimal `"lat, lon"` rendering used on reports.
    pub fn format(&self) -> String {
        format!("{:.6}, {:.6}", self.latitude, self.longitude)
    }

    /// Great-circle distance in metres (haversine).
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        let phi1 = self.latitude.to_radians();
        let phi2 = other.latitude.to_radians();
        let d_phi = (other.latitude - self.latitude).to_radians();
        let d_lambda = (other.longitude - self.longitude).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }
}

/// One photo attached to an inspection item.
///
/// `data` is the encoded image exactly as the camera collaborator produced it
/// (typically a base64 data URL). It is opaque to the store and is written to
/// the image table as-is, together with where and when it was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
}

impl ImageRecord {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            location: None,
            captured_at: None,
        }
    }

    pub fn with_location(mut self, location: Coordinates) -> Self {
        self.location = Some(location);
        self
    }

    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = Some(at);
        self
    }
}

/// Advisory lifecycle of a checklist: draft, then completed, then sent.
///
/// The progression is not enforced; the store persists whatever it is given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecklistStatus {
    #[default]
    Draft,
    Completed,
    Sent,
}

/// Outcome recorded for a check point.
///
/// Persisted as its label. Labels outside the known set are kept verbatim in
/// [`InspectionStatus::Other`] so records written by other app versions
/// survive a load/save cycle unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InspectionStatus {
    Ok,
    Deviation,
    RecommendedAction,
    NotApplicable,
    Yes,
    No,
    NoNeedFound,
    Other(String),
}

impl InspectionStatus {
    pub fn label(&self) -> &str {
        match self {
            InspectionStatus::Ok => "OK",
            InspectionStatus::Deviation => "Avvik",
            InspectionStatus::RecommendedAction => "Anbefalt tiltak",
            InspectionStatus::NotApplicable => "Ikke aktuelt",
            InspectionStatus::Yes => "Ja",
            InspectionStatus::No => "Nei",
            InspectionStatus::NoNeedFound => "Behov ikke funnet",
            InspectionStatus::Other(label) => label,
        }
    }
}

impl From<String> for InspectionStatus {
    fn from(label: String) -> Self {
        match label.as_str() {
            "OK" => InspectionStatus::Ok,
            "Avvik" => InspectionStatus::Deviation,
            "Anbefalt tiltak" => InspectionStatus::RecommendedAction,
            "Ikke aktuelt" => InspectionStatus::NotApplicable,
            "Ja" => InspectionStatus::Yes,
            "Nei" => InspectionStatus::No,
            "Behov ikke funnet" => InspectionStatus::NoNeedFound,
            _ => InspectionStatus::Other(label),
        }
    }
}

impl From<InspectionStatus> for String {
    fn from(status: InspectionStatus) -> Self {
        match status {
            InspectionStatus::Other(label) => label,
            known => known.label().to_string(),
        }
    }
}

impl Display for InspectionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Where and when the inspection took place, and who did it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistMetadata {
    pub site_name: String,
    pub area_id: String,
    pub inspection_date: NaiveDate,
    #[serde(default)]
    pub inspectors: Vec<String>,
    /// Free-text weather and site conditions.
    #[serde(default)]
    pub conditions: String,
}

/// Descriptive part of a check point, as defined by the inspection template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTemplate {
    pub id: String,
    pub category: String,
    pub label: String,
    pub frequency: String,
}

impl ItemTemplate {
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        label: impl Into<String>,
        frequency: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            label: label.into(),
            frequency: frequency.into(),
        }
    }
}

/// A single check point inside a checklist.
///
/// `id` is unique within its checklist and often hierarchical ("3.2", "3.2.1");
/// the store treats it as an opaque string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionItem {
    pub id: String,
    pub category: String,
    pub label: String,
    pub frequency: String,
    #[serde(default)]
    pub status: Option<InspectionStatus>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub images: Vec<ImageRecord>,
    #[serde(default)]
    pub location: Option<Coordinates>,
    /// Last time this item was modified.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl InspectionItem {
    pub fn from_template(template: &ItemTemplate) -> Self {
        Self {
            id: template.id.clone(),
            category: template.category.clone(),
            label: template.label.clone(),
            frequency: template.frequency.clone(),
            status: None,
            notes: String::new(),
            images: Vec::new(),
            location: None,
            timestamp: None,
        }
    }
}

/// Aggregate root: one inspection visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checklist {
    pub id: String,
    pub metadata: ChecklistMetadata,
    pub items: Vec<InspectionItem>,
    #[serde(default)]
    pub status: ChecklistStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checklist {
    /// Starts a draft checklist for `site_name` / `area_id` with one item per template entry.
    pub fn new(site_name: &str, area_id: &str, template: &[ItemTemplate]) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: ChecklistMetadata {
                site_name: site_name.to_string(),
                area_id: area_id.to_string(),
                inspection_date: now.date_naive(),
                inspectors: Vec::new(),
                conditions: String::new(),
            },
            items: template.iter().map(InspectionItem::from_template).collect(),
            status: ChecklistStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn title(&self) -> String {
        format!("{} - Area {}", self.metadata.site_name, self.metadata.area_id)
    }

    pub fn item(&self, item_id: &str) -> Option<&InspectionItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Number of image payloads across all items.
    pub fn image_count(&self) -> usize {
        self.items.iter().map(|item| item.images.len()).sum()
    }

    pub fn set_status(&mut self, status: ChecklistStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn set_item_status(&mut self, item_id: &str, status: InspectionStatus) -> bool {
        self.modify_item(item_id, |item| item.status = Some(status))
    }

    pub fn set_item_notes(&mut self, item_id: &str, notes: impl Into<String>) -> bool {
        let notes = notes.into();
        self.modify_item(item_id, |item| item.notes = notes)
    }

    pub fn set_item_location(&mut self, item_id: &str, location: Coordinates) -> bool {
        self.modify_item(item_id, |item| item.location = Some(location))
    }

    /// Appends a photo to the item. The image's location, if any, also becomes the item's.
    pub fn add_image(&mut self, item_id: &str, image: ImageRecord) -> bool {
        self.modify_item(item_id, |item| {
            if let Some(location) = image.location {
                item.location = Some(location);
            }
            item.images.push(image);
        })
    }

    /// Removes the photo at `index`, shifting later photos down.
    pub fn remove_image(&mut self, item_id: &str, index: usize) -> Option<ImageRecord> {
        let item = self.items.iter_mut().find(|item| item.id == item_id)?;
        if index >= item.images.len() {
            return None;
        }
        let removed = item.images.remove(index);
        let now = Utc::now();
        item.timestamp = Some(now);
        self.updated_at = now;
        Some(removed)
    }

    /// Next free child id under `parent_id`: "3.2" with children "3.2.1", "3.2.4" gives "3.2.5".
    pub fn next_child_item_id(&self, parent_id: &str) -> String {
        let prefix = format!("{parent_id}.");
        let last = self
            .items
            .iter()
            .filter_map(|item| item.id.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('.'))
            .filter_map(|rest| rest.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        format!("{prefix}{}", last + 1)
    }

    fn modify_item(&mut self, item_id: &str, change: impl FnOnce(&mut InspectionItem)) -> bool {
        let Some(item) = self.items.iter_mut().find(|item| item.id == item_id) else {
            return false;
        };
        change(item);
        let now = Utc::now();
        item.timestamp = Some(now);
        self.updated_at = now;
        true
    }
}
