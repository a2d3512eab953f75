//! Image duplicate detection
//!
//! Exact duplicates share a SHA-256 content hash and are rejected. Near
//! duplicates have perceptual hashes within a small Hamming distance and are
//! only flagged.

use sqlx::SqlitePool;

use crate::db::sightings;
use crate::error::{HashError, IngestResult};
use crate::models::SimilarMatch;

/// Default maximum distance that still counts as similar
pub const SIMILAR_DISTANCE_THRESHOLD: u32 = 5;

/// Hex digits in a perceptual hash
pub const PERCEPTUAL_HASH_LEN: usize = 16;

/// Reject a perceptual hash that is not [`PERCEPTUAL_HASH_LEN`] hex digits
pub fn check_perceptual_hash(hash: &str) -> Result<(), HashError> {
    if hash.len() != PERCEPTUAL_HASH_LEN {
        return Err(HashError::LengthMismatch {
            left: hash.len(),
            right: PERCEPTUAL_HASH_LEN,
        });
    }
    if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(HashError::InvalidHex(hash.to_string()));
    }
    Ok(())
}

/// Number of differing bits between two hex-encoded hashes
///
/// Case-insensitive. Hashes of different lengths are a caller error.
pub fn hamming_distance(left: &str, right: &str) -> Result<u32, HashError> {
    if left.len() != right.len() {
        return Err(HashError::LengthMismatch {
            left: left.len(),
            right: right.len(),
        });
    }

    left.chars().zip(right.chars()).try_fold(0u32, |acc, (a, b)| {
        let a = a.to_digit(16).ok_or_else(|| HashError::InvalidHex(left.to_string()))?;
        let b = b.to_digit(16).ok_or_else(|| HashError::InvalidHex(right.to_string()))?;
        Ok(acc + (a ^ b).count_ones())
    })
}

/// Duplicate detector backed by the sightings table
#[derive(Clone)]
pub struct DuplicateDetector {
    db: SqlitePool,
    threshold: u32,
}

impl DuplicateDetector {
    pub fn new(db: SqlitePool) -> Self {
        Self::with_threshold(db, SIMILAR_DISTANCE_THRESHOLD)
    }

    pub fn with_threshold(db: SqlitePool, threshold: u32) -> Self {
        Self { db, threshold }
    }

    /// Existing sighting with byte-identical content, if any
    pub async fn find_exact(&self, content_hash: &str) -> IngestResult<Option<i64>> {
        let existing = sightings::find_by_content_hash(&self.db, content_hash).await?;
        if let Some(id) = existing {
            tracing::info!(hash = %content_hash, existing_id = id, "Duplicate image detected");
        }
        Ok(existing)
    }

    /// Closest prior sighting within the similarity threshold
    ///
    /// `exclude_id` keeps a freshly inserted sighting from matching itself.
    /// A malformed `perceptual_hash` is an error; stored hashes that cannot
    /// be compared are skipped.
    pub async fn find_similar(
        &self,
        perceptual_hash: &str,
        exclude_id: Option<i64>,
    ) -> IngestResult<Option<SimilarMatch>> {
        check_perceptual_hash(perceptual_hash)?;
        let candidates = sightings::perceptual_hashes(&self.db).await?;

        let mut best: Option<SimilarMatch> = None;
        for (id, stored) in candidates {
            if Some(id) == exclude_id {
                continue;
            }
            let distance = match hamming_distance(perceptual_hash, &stored) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(sighting_id = id, error = %e, "Skipping incomparable perceptual hash");
                    continue;
                }
            };
            if distance <= self.threshold && best.map_or(true, |b| distance < b.distance) {
                best = Some(SimilarMatch {
                    matched_id: id,
                    distance,
                });
            }
        }

        if let Some(found) = best {
            tracing::info!(
                matched_id = found.matched_id,
                distance = found.distance,
                "Similar image detected"
            );
        }
        Ok(best)
    }
}
