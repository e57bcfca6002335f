//! Getting a finished checklist out of the device.
//!
//! Two ways out: a raw JSON file that can later be imported on another device,
//! and a rendered report sent by mail. Rendering and mail delivery are done by
//! collaborators behind [`ReportRenderer`] and [`MailTransport`]; this module
//! only feeds them a fully hydrated checklist.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use log::info;

use crate::checklist_model::{Checklist, ChecklistStatus};
use crate::document_store::DocumentStore;
use crate::error::{Result, StoreError};

pub type CollaboratorResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Turns a hydrated checklist into a report document (typically PDF).
pub trait ReportRenderer: Send + Sync {
    /// MIME type of the rendered bytes.
    fn content_type(&self) -> &str;

    fn file_extension(&self) -> &str;

    fn render(&self, checklist: &Checklist) -> CollaboratorResult<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> CollaboratorResult<()>;
}

fn file_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// `checklist_raw_<site>_<area>_<date>.json`
pub fn export_file_name(checklist: &Checklist, on: NaiveDate) -> String {
    format!(
        "checklist_raw_{}_{}_{}.json",
        file_component(&checklist.metadata.site_name),
        file_component(&checklist.metadata.area_id),
        on.format("%Y-%m-%d")
    )
}

/// Pretty JSON of the whole checklist, images included.
pub fn export_json(checklist: &Checklist) -> Result<String> {
    Ok(serde_json::to_string_pretty(checklist)?)
}

/// Parses an exported checklist and gives it a fresh identity.
///
/// The imported copy never replaces the checklist it was exported from.
pub fn import_json(raw: &str) -> Result<Checklist> {
    let mut checklist: Checklist = serde_json::from_str(raw)?;
    if checklist.metadata.site_name.trim().is_empty() || checklist.metadata.area_id.trim().is_empty() {
        return Err(StoreError::InvalidChecklist(
            "imported checklist lacks site name or area".to_string(),
        ));
    }
    checklist.id = uuid::Uuid::new_v4().to_string();
    checklist.updated_at = Utc::now();
    Ok(checklist)
}

fn mail_body(checklist: &Checklist) -> String {
    format!(
        "Attached is the inspection checklist for {} - Area {}.\n\nInspected {} by {}.",
        checklist.metadata.site_name,
        checklist.metadata.area_id,
        checklist.metadata.inspection_date.format("%Y-%m-%d"),
        if checklist.metadata.inspectors.is_empty() {
            "unknown inspectors".to_string()
        } else {
            checklist.metadata.inspectors.join(", ")
        }
    )
}

/// Renders checklist `id`, mails it to `to` and marks it as sent.
///
/// Returns `Ok(false)` when no such checklist exists. The status is only
/// updated after the transport accepted the mail.
pub async fn deliver_report(
    store: &DocumentStore,
    id: &str,
    renderer: &dyn ReportRenderer,
    transport: &dyn MailTransport,
    to: &str,
) -> Result<bool> {
    let Some(mut checklist) = store.get_checklist_by_id(id).await? else {
        return Ok(false);
    };

    let bytes = renderer
        .render(&checklist)
        .map_err(|e| StoreError::Delivery(format!("rendering checklist {id}: {e}")))?;

    let mail = OutgoingMail {
        to: to.to_string(),
        subject: format!("Inspection checklist: {}", checklist.title()),
        body: mail_body(&checklist),
        attachment: Some(Attachment {
            file_name: format!(
                "checklist_{}_{}.{}",
                file_component(&checklist.metadata.site_name),
                file_component(&checklist.metadata.area_id),
                renderer.file_extension()
            ),
            content_type: renderer.content_type().to_string(),
            bytes,
        }),
    };

    transport
        .send(mail)
        .await
        .map_err(|e| StoreError::Delivery(format!("sending checklist {id}: {e}")))?;
    info!("Checklist {id} sent to {to}");

    checklist.set_status(ChecklistStatus::Sent);
    store.save(&checklist).await?;
    Ok(true)
}
