//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Person credited for sightings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub id: i64,
    pub sender: Option<String>,
    pub external_handle: Option<String>,
    pub preferred_name: Option<String>,
}

impl Contributor {
    /// Name used when crediting the contributor publicly
    pub fn display_name(&self) -> String {
        self.preferred_name
            .clone()
            .or_else(|| self.external_handle.clone())
            .unwrap_or_else(|| "Anonymous".to_string())
    }
}

/// Read-only reference vehicle record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RegistryEntry {
    pub plate: String,
    pub owner_name: Option<String>,
    pub vehicle_id: Option<String>,
    pub vehicle_year: Option<String>,
    pub base_name: Option<String>,
    pub base_type: Option<String>,
}

impl RegistryEntry {
    /// Entry carrying only a plate, used when seeding tests
    pub fn bare(plate: &str) -> Self {
        Self {
            plate: plate.to_string(),
            owner_name: None,
            vehicle_id: None,
            vehicle_year: None,
            base_name: None,
            base_type: None,
        }
    }
}

/// Persisted sighting
///
/// Immutable after creation apart from the one-way `posted_at`/`post_reference`
/// transition, or `publish_error` when the sighting is withdrawn from publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sighting {
    pub id: i64,
    pub plate: String,
    pub timestamp: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub borough: Option<String>,
    pub contributor_id: i64,
    pub image_ref: String,
    pub content_hash: Option<String>,
    pub perceptual_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
    pub post_reference: Option<String>,
    pub publish_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contributor(name: Option<&str>, handle: Option<&str>) -> Contributor {
        Contributor {
            id: 3,
            sender: Some("+15550001111".to_string()),
            external_handle: handle.map(str::to_string),
            preferred_name: name.map(str::to_string),
        }
    }

    #[test]
    fn test_display_name_prefers_name_then_handle() {
        assert_eq!(contributor(Some("Sam"), Some("@sam.bsky")).display_name(), "Sam");
        assert_eq!(contributor(None, Some("@sam.bsky")).display_name(), "@sam.bsky");
        assert_eq!(contributor(None, None).display_name(), "Anonymous");
    }
}
