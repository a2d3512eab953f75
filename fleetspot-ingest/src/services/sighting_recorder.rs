//! Sighting persistence with duplicate checks and borough resolution

use fleetspot_common::time;
use sqlx::SqlitePool;

use crate::db::sightings;
use crate::error::IngestResult;
use crate::models::{NewSighting, RecordOutcome};
use crate::services::borough_resolver::resolve_borough;
use crate::services::duplicate_detector::{check_perceptual_hash, DuplicateDetector};

/// Records one sighting
///
/// **Algorithm:**
/// 0. A malformed perceptual hash is rejected before anything is written
/// 1. Exact-duplicate check on the content hash; a match ends here
/// 2. Resolve the borough from coordinates when none was given
/// 3. Insert (a UNIQUE violation on the content hash also counts as duplicate)
/// 4. Near-duplicate check, attached as advisory metadata
#[derive(Clone)]
pub struct SightingRecorder {
    db: SqlitePool,
    detector: DuplicateDetector,
}

impl SightingRecorder {
    pub fn new(db: SqlitePool, detector: DuplicateDetector) -> Self {
        Self { db, detector }
    }

    pub async fn record(&self, mut sighting: NewSighting) -> IngestResult<RecordOutcome> {
        if let Some(hash) = &sighting.perceptual_hash {
            check_perceptual_hash(hash)?;
        }

        if let Some(hash) = &sighting.content_hash {
            if let Some(existing_id) = self.detector.find_exact(hash).await? {
                return Ok(RecordOutcome::Duplicate {
                    existing_id: Some(existing_id),
                });
            }
        }

        if sighting.borough.is_none() {
            if let (Some(lat), Some(lon)) = (sighting.latitude, sighting.longitude) {
                sighting.borough = resolve_borough(lat, lon);
                tracing::debug!(lat, lon, borough = ?sighting.borough, "Borough resolved from GPS");
            }
        }

        let sighting_id = match sightings::insert(&self.db, &sighting, time::now()).await {
            Ok(id) => id,
            Err(e) if e.is_unique_violation() => {
                tracing::info!(plate = %sighting.plate, "Duplicate image rejected by storage constraint");
                return Ok(RecordOutcome::Duplicate { existing_id: None });
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            sighting_id,
            plate = %sighting.plate,
            borough = ?sighting.borough,
            "Sighting saved"
        );

        let similar = match &sighting.perceptual_hash {
            Some(hash) => self.detector.find_similar(hash, Some(sighting_id)).await?,
            None => None,
        };

        Ok(RecordOutcome::Recorded {
            sighting_id,
            borough: sighting.borough,
            similar,
        })
    }
}
