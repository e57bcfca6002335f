//! Persisted layout of a checklist.
//!
//! A checklist is stored as one metadata record plus one blob per image:
//!
//! - `checklists[<checklist id>]` holds a [`ChecklistRecord`]: the checklist with
//!   every item's images replaced by an `image_count`.
//! - `images[<checklist id>_<item id>_<index>]` holds one JSON-encoded
//!   [`ImageRecord`].
//!
//! The record alone is enough to rebuild every blob key, so reads never scan
//! or probe the image table.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checklist_model::{
    Checklist, ChecklistMetadata, ChecklistStatus, Coordinates, InspectionItem, InspectionStatus,
};
use crate::error::{Result, StoreError};

pub const LAYOUT_VERSION: u32 = 1;

/// Key of the `index`-th image of `item_id` in `checklist_id`.
pub fn image_key(checklist_id: &str, item_id: &str, index: usize) -> String {
    format!("{checklist_id}_{item_id}_{index}")
}

/// An inspection item as it sits in the metadata table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: String,
    pub category: String,
    pub label: String,
    pub frequency: String,
    #[serde(default)]
    pub status: Option<InspectionStatus>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub location: Option<Coordinates>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub image_count: usize,
}

/// A checklist without image payloads.
///
/// This is also what [`get_all_checklists`](crate::document_store::DocumentStore::get_all_checklists)
/// returns, so list views never pull image bytes into memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistRecord {
    pub layout_version: u32,
    pub id: String,
    pub metadata: ChecklistMetadata,
    pub items: Vec<ItemRecord>,
    pub status: ChecklistStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct LayoutProbe {
    layout_version: u32,
}

impl ChecklistRecord {
    /// Every blob key this record addresses, item by item, in image order.
    pub fn image_keys(&self) -> Vec<String> {
        self.items
            .iter()
            .flat_map(|item| (0..item.image_count).map(move |i| image_key(&self.id, &item.id, i)))
            .collect()
    }

    pub fn image_count(&self) -> usize {
        self.items.iter().map(|item| item.image_count).sum()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let probe: LayoutProbe = serde_json::from_slice(bytes)?;
        if probe.layout_version != LAYOUT_VERSION {
            return Err(StoreError::UnsupportedLayout(probe.layout_version));
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Keys addressed by `previous` that this record no longer addresses.
    pub fn stale_keys_since(&self, previous: &ChecklistRecord) -> Vec<String> {
        let current: HashSet<String> = self.image_keys().into_iter().collect();
        previous
            .image_keys()
            .into_iter()
            .filter(|key| !current.contains(key))
            .collect()
    }

    /// Rebuilds the full checklist from this record and the blobs stored under
    /// [`image_keys`](Self::image_keys), given in the same order.
    pub fn hydrate(self, blobs: Vec<Option<Vec<u8>>>) -> Result<Checklist> {
        let mut blobs = self.image_keys().into_iter().zip(blobs);
        let mut items = Vec::with_capacity(self.items.len());

        for item in self.items {
            let mut images = Vec::with_capacity(item.image_count);
            for _ in 0..item.image_count {
                match blobs.next() {
                    Some((_, Some(bytes))) => images.push(serde_json::from_slice(&bytes)?),
                    Some((key, None)) => return Err(StoreError::MissingImage(key)),
                    None => {
                        let key = image_key(&self.id, &item.id, images.len());
                        return Err(StoreError::MissingImage(key));
                    }
                }
            }
            items.push(InspectionItem {
                id: item.id,
                category: item.category,
                label: item.label,
                frequency: item.frequency,
                status: item.status,
                notes: item.notes,
                images,
                location: item.location,
                timestamp: item.timestamp,
            });
        }

        Ok(Checklist {
            id: self.id,
            metadata: self.metadata,
            items,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// A checklist split into its metadata record and encoded image blobs.
#[derive(Debug)]
pub struct SplitChecklist {
    pub record: ChecklistRecord,
    pub blobs: Vec<(String, Vec<u8>)>,
}

/// Separates image payloads from `checklist`.
///
/// Rejects an empty checklist id, a checklist id containing `_` and duplicate
/// item ids. Any of these would let two images share a blob key; with no `_`
/// in the checklist id, everything before the first `_` of a key names its
/// checklist.
pub fn split(checklist: &Checklist) -> Result<SplitChecklist> {
    if checklist.id.is_empty() {
        return Err(StoreError::InvalidChecklist("checklist id is empty".to_string()));
    }
    if checklist.id.contains('_') {
        return Err(StoreError::InvalidChecklist(format!(
            "checklist id '{}' must not contain '_'",
            checklist.id
        )));
    }

    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(checklist.items.len());
    let mut blobs = Vec::with_capacity(checklist.image_count());

    for item in &checklist.items {
        if !seen.insert(item.id.as_str()) {
            return Err(StoreError::InvalidChecklist(format!(
                "duplicate item id '{}' in checklist '{}'",
                item.id, checklist.id
            )));
        }
        for (index, image) in item.images.iter().enumerate() {
            let key = image_key(&checklist.id, &item.id, index);
            blobs.push((key, serde_json::to_vec(image)?));
        }
        items.push(ItemRecord {
            id: item.id.clone(),
            category: item.category.clone(),
            label: item.label.clone(),
            frequency: item.frequency.clone(),
            status: item.status.clone(),
            notes: item.notes.clone(),
            location: item.location,
            timestamp: item.timestamp,
            image_count: item.images.len(),
        });
    }

    let record = ChecklistRecord {
        layout_version: LAYOUT_VERSION,
        id: checklist.id.clone(),
        metadata: checklist.metadata.clone(),
        items,
        status: checklist.status,
        created_at: checklist.created_at,
        updated_at: checklist.updated_at,
    };

    Ok(SplitChecklist { record, blobs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checklist_model::{ImageRecord, ItemTemplate};

    fn sample() -> Checklist {
        let mut checklist = Checklist::new(
            "Solbakken",
            "3",
            &[
                ItemTemplate::new("1.1", "Fence", "Fence intact", "Yearly"),
                ItemTemplate::new("1.2", "Fence", "Gate locks", "Yearly"),
            ],
        );
        checklist.id = "c1".to_string();
        checklist.add_image("1.1", ImageRecord::new("imgA"));
        checklist.add_image("1.1", ImageRecord::new("imgB"));
        checklist
    }

    #[test]
    fn key_formula() {
        assert_eq!(image_key("c1", "3.2.1", 4), "c1_3.2.1_4");
    }

    #[test]
    fn split_strips_payloads_from_record() {
        let split = split(&sample()).unwrap();
        let keys: Vec<&str> = split.blobs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["c1_1.1_0", "c1_1.1_1"]);

        let encoded = String::from_utf8(split.record.encode().unwrap()).unwrap();
        assert!(!encoded.contains("imgA"));
        assert_eq!(split.record.items[0].image_count, 2);
        assert_eq!(split.record.items[1].image_count, 0);
    }

    #[test]
    fn split_rejects_duplicate_item_ids() {
        let mut checklist = sample();
        checklist.items[1].id = "1.1".to_string();
        assert!(matches!(split(&checklist), Err(StoreError::InvalidChecklist(_))));
    }

    #[test]
    fn split_rejects_underscore_in_checklist_id() {
        let mut checklist = sample();
        checklist.id = "a_b".to_string();
        assert!(matches!(split(&checklist), Err(StoreError::InvalidChecklist(_))));

        // Item ids may contain '_'; keys stay unique within one checklist
        let mut checklist = sample();
        checklist.items[1].id = "b_c".to_string();
        checklist.add_image("b_c", ImageRecord::new("imgC"));
        let keys: Vec<String> = split(&checklist).unwrap().blobs.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["c1_1.1_0", "c1_1.1_1", "c1_b_c_0"]);
    }

    #[test]
    fn hydrate_restores_original() {
        let original = sample();
        let split = split(&original).unwrap();
        let blobs = split.blobs.into_iter().map(|(_, v)| Some(v)).collect();
        assert_eq!(split.record.hydrate(blobs).unwrap(), original);
    }

    #[test]
    fn hydrate_reports_missing_blob_key() {
        let split = split(&sample()).unwrap();
        let blobs = vec![Some(split.blobs[0].1.clone()), None];
        match split.record.hydrate(blobs) {
            Err(StoreError::MissingImage(key)) => assert_eq!(key, "c1_1.1_1"),
            other => panic!("expected MissingImage, got {other:?}"),
        }
    }

    #[test]
    fn stale_keys_cover_shrunk_and_removed_items() {
        let previous = split(&sample()).unwrap().record;

        let mut next = sample();
        next.remove_image("1.1", 1);
        let current = split(&next).unwrap().record;
        assert_eq!(current.stale_keys_since(&previous), vec!["c1_1.1_1".to_string()]);

        next.items.retain(|item| item.id != "1.1");
        let current = split(&next).unwrap().record;
        assert_eq!(current.stale_keys_since(&previous).len(), 2);
    }

    #[test]
    fn decode_rejects_unknown_layout() {
        let mut record = split(&sample()).unwrap().record;
        record.layout_version = 7;
        let bytes = serde_json::to_vec(&record).unwrap();
        assert!(matches!(
            ChecklistRecord::decode(&bytes),
            Err(StoreError::UnsupportedLayout(7))
        ));
    }
}
