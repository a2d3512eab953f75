//! Sighting records and batch queue items

use chrono::{DateTime, Utc};
use fleetspot_common::db::Contributor;
use serde::{Deserialize, Serialize};

use super::Borough;

/// Sighting about to be persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NewSighting {
    pub plate: String,
    pub timestamp: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub borough: Option<Borough>,
    pub contributor_id: i64,
    pub image_ref: String,
    pub content_hash: Option<String>,
    pub perceptual_hash: Option<String>,
}

impl NewSighting {
    pub fn has_gps(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Advisory near-duplicate metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarMatch {
    pub matched_id: i64,
    pub distance: u32,
}

/// Result of recording one sighting
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// Sighting persisted
    Recorded {
        sighting_id: i64,
        borough: Option<Borough>,
        similar: Option<SimilarMatch>,
    },
    /// Same image content already accepted; nothing persisted
    Duplicate { existing_id: Option<i64> },
}

impl RecordOutcome {
    pub fn sighting_id(&self) -> Option<i64> {
        match self {
            RecordOutcome::Recorded { sighting_id, .. } => Some(*sighting_id),
            RecordOutcome::Duplicate { .. } => None,
        }
    }
}

/// Unposted sighting with the contributor needed to credit it
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedSighting {
    pub id: i64,
    pub plate: String,
    pub image_ref: String,
    pub created_at: DateTime<Utc>,
    pub contributor: Contributor,
}

/// Batch queue observability snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStats {
    pub count: usize,
    pub oldest_age_hours: Option<f64>,
    pub should_post: bool,
}
