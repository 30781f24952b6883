use serde::{Deserialize, Serialize};

/// Data sources a lead can be enriched from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    GooglePlaces,
    Instagram,
    Facebook,
    Linktree,
    Website,
    GoogleSearch,
    LinkedIn,
    YouTube,
}

impl DataSource {
    pub const ALL: [DataSource; 8] = [
        DataSource::GooglePlaces,
        DataSource::Instagram,
        DataSource::Facebook,
        DataSource::Linktree,
        DataSource::Website,
        DataSource::GoogleSearch,
        DataSource::LinkedIn,
        DataSource::YouTube,
    ];

    /// Stable identifier used in cache keys, visited sets and statistics.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::GooglePlaces => "google_places",
            DataSource::Instagram => "instagram",
            DataSource::Facebook => "facebook",
            DataSource::Linktree => "linktree",
            DataSource::Website => "website",
            DataSource::GoogleSearch => "google_search",
            DataSource::LinkedIn => "linkedin",
            DataSource::YouTube => "youtube",
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
