use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payload::SourcePayload;

/// Enrichment field names shared between the scheduler's consumers and the
/// snowball seed extractor.
pub mod fields {
    pub const INSTAGRAM_USERNAME: &str = "instagram_username";
    pub const INSTAGRAM_BIO: &str = "instagram_bio";
    pub const INSTAGRAM_URL: &str = "instagram_url";
    pub const FACEBOOK_URL: &str = "facebook_url";
    pub const WEBSITE_URL: &str = "website_url";
    pub const LINKEDIN_URL: &str = "linkedin_url";
    pub const YOUTUBE_URL: &str = "youtube_url";
    /// URL surfaced by the search engine, classified by host at seed time.
    pub const DISCOVERED_URL: &str = "discovered_url";
    pub const GOOGLE_PLACE_ID: &str = "google_place_id";
    pub const EMAIL: &str = "email";
    pub const PHONE: &str = "phone";
}

/// One business lead being enriched. Identity fields come from the source
/// spreadsheet or places API; everything learned afterwards accumulates in
/// `enriched`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadRecord {
    pub lead_id: Uuid,
    pub name: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub enriched: SourcePayload,
}

impl LeadRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            lead_id: Uuid::new_v4(),
            name: name.into(),
            city: None,
            state: None,
            enriched: SourcePayload::new(),
        }
    }

    pub fn with_location(mut self, city: impl Into<String>, state: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self.state = Some(state.into());
        self
    }

    pub fn location(&self) -> String {
        match (&self.city, &self.state) {
            (Some(city), Some(state)) => format!("{}, {}", city, state),
            (Some(city), None) => city.clone(),
            (None, Some(state)) => state.clone(),
            (None, None) => String::new(),
        }
    }

    /// Folds one task's result into the record; empty fields never
    /// overwrite collected data.
    pub fn merge_payload(&mut self, payload: &SourcePayload) {
        self.enriched.merge(payload);
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.enriched.text(key)
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.field(key).is_some()
    }
}
