//! Gallery document models returned by the CMS.

use crate::model::GalleryStatus;
use chrono::{DateTime, Utc};

/// One gallery document as the moderation flow sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GallerySubmission {
    pub id: String,
    pub status: GalleryStatus,
    /// Chat id of the submitter. The CMS stores it as a string field;
    /// documents created outside the bot may lack it.
    pub submitter_chat_id: Option<i64>,
    pub first_name: Option<String>,
    pub username: Option<String>,
    pub asset_id: Option<String>,
    pub image_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl GallerySubmission {
    pub fn display_name(&self) -> &str {
        self.first_name.as_deref().unwrap_or("Unknown")
    }

    pub fn handle(&self) -> String {
        match (&self.username, self.submitter_chat_id) {
            (Some(u), _) => format!("@{u}"),
            (None, Some(id)) => format!("User {id}"),
            (None, None) => "Unknown".to_string(),
        }
    }
}
