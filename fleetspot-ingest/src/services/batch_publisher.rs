//! Batch publishing of queued sightings

use fleetspot_common::time;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db::{registry, sightings};
use crate::error::IngestResult;
use crate::models::{QueueStats, QueuedSighting};
use crate::services::batch_admission::BatchAdmissionController;
use crate::services::image_store::ImageStore;
use crate::services::social_poster::{PostImage, SocialPoster};

const PROGRESS_BAR_CELLS: usize = 10;

/// Collection progress like `1.5% █▒▒▒▒▒▒▒▒▒ (30 out of 2053)`
pub fn progress_bar(current: i64, total: i64) -> String {
    let (percentage, filled) = if total > 0 {
        (
            current as f64 / total as f64 * 100.0,
            ((PROGRESS_BAR_CELLS as i64 * current) / total).clamp(0, PROGRESS_BAR_CELLS as i64)
                as usize,
        )
    } else {
        (0.0, 0)
    };
    format!(
        "{:.1}% {}{} ({} out of {})",
        percentage,
        "█".repeat(filled),
        "▒".repeat(PROGRESS_BAR_CELLS - filled),
        current,
        total
    )
}

/// Text of one batch post
///
/// Header with the count, the plates, the progress bar, then one credit line
/// per contributor (`* name +in_batch → all_time`) sorted by display name.
pub fn compose_batch_post(
    batch: &[QueuedSighting],
    contributor_totals: &HashMap<i64, i64>,
    unique_sighted: i64,
    total_vehicles: i64,
) -> String {
    let noun = if batch.len() == 1 { "sighting" } else { "sightings" };
    let plates: Vec<&str> = batch.iter().map(|s| s.plate.as_str()).collect();

    let mut text = format!(
        "🌊 +{} {}\n🚗 {}\n📈 {}",
        batch.len(),
        noun,
        plates.join(", "),
        progress_bar(unique_sighted, total_vehicles)
    );

    // contributor id -> (display name, count in batch)
    let mut credits: BTreeMap<i64, (String, i64)> = BTreeMap::new();
    for sighting in batch {
        credits
            .entry(sighting.contributor.id)
            .or_insert_with(|| (sighting.contributor.display_name(), 0))
            .1 += 1;
    }

    if !credits.is_empty() {
        let mut lines: Vec<(i64, String, i64)> = credits
            .into_iter()
            .map(|(id, (name, in_batch))| (id, name, in_batch))
            .collect();
        lines.sort_by_key(|(_, name, _)| name.to_lowercase());

        text.push_str("\n\n");
        for (id, name, in_batch) in lines {
            let all_time = contributor_totals.get(&id).copied().unwrap_or(0);
            text.push_str(&format!("* {} +{} → {}\n", name, in_batch, all_time));
        }
    }

    text
}

/// Drains the unposted queue through the admission controller
pub struct BatchPublisher {
    db: SqlitePool,
    controller: BatchAdmissionController,
    poster: Arc<dyn SocialPoster>,
    images: Arc<dyn ImageStore>,
    progress_total_override: Option<usize>,
    // Held for a whole drain so one queue snapshot is never posted twice
    drain_lock: Mutex<()>,
}

impl BatchPublisher {
    pub fn new(
        db: SqlitePool,
        controller: BatchAdmissionController,
        poster: Arc<dyn SocialPoster>,
        images: Arc<dyn ImageStore>,
    ) -> Self {
        Self {
            db,
            controller,
            poster,
            images,
            progress_total_override: None,
            drain_lock: Mutex::new(()),
        }
    }

    /// Use a fixed denominator for the progress bar instead of the registry size
    pub fn with_progress_total(mut self, total: Option<usize>) -> Self {
        self.progress_total_override = total;
        self
    }

    /// Current queue snapshot
    pub async fn stats(&self) -> IngestResult<QueueStats> {
        let queue = sightings::unposted_queue(&self.db).await?;
        Ok(self.controller.stats(&queue, time::now()))
    }

    /// Publish batches while the controller admits them
    ///
    /// Each batch takes at most one full batch from the head of the queue.
    /// Drains are serialized; a second caller waits and then sees the
    /// updated queue. A sighting whose image cannot be read is withdrawn
    /// from publishing and the batch is recomposed without it. A publish
    /// failure stops the loop; those sightings stay queued.
    /// Returns the number of posts made.
    pub async fn drain(&self) -> IngestResult<usize> {
        let _guard = self.drain_lock.lock().await;
        let mut posts = 0;
        loop {
            let queue = sightings::unposted_queue(&self.db).await?;
            if !self.controller.should_trigger(&queue, time::now()) {
                break;
            }

            let batch_len = queue.len().min(self.controller.batch_size());
            let batch = &queue[..batch_len];
            let Some(images) = self.load_images(batch).await? else {
                continue;
            };
            let reference = self.publish_batch(batch, images).await?;

            let ids: Vec<i64> = batch.iter().map(|s| s.id).collect();
            let changed = sightings::mark_posted(&self.db, &ids, &reference, time::now()).await?;
            tracing::info!(
                post_reference = %reference,
                sightings = changed,
                "Batch posted"
            );
            posts += 1;

            if changed == 0 {
                // Posted through another publisher on the same database
                break;
            }
        }
        Ok(posts)
    }

    /// Images for every sighting in the batch, or `None` when some were
    /// unreadable and have been withdrawn
    async fn load_images(&self, batch: &[QueuedSighting]) -> IngestResult<Option<Vec<PostImage>>> {
        let mut images = Vec::with_capacity(batch.len());
        let mut withdrawn = 0;
        for sighting in batch {
            match self.images.read(&sighting.image_ref).await {
                Ok(bytes) => images.push(PostImage {
                    bytes,
                    alt_text: format!("Vehicle with plate {}", sighting.plate),
                }),
                Err(e) => {
                    tracing::warn!(
                        sighting_id = sighting.id,
                        image_ref = %sighting.image_ref,
                        error = %e,
                        "Image unreadable, withdrawing sighting from publishing"
                    );
                    sightings::mark_unpublishable(&self.db, sighting.id, &e.to_string()).await?;
                    withdrawn += 1;
                }
            }
        }
        Ok((withdrawn == 0).then_some(images))
    }

    async fn publish_batch(
        &self,
        batch: &[QueuedSighting],
        images: Vec<PostImage>,
    ) -> IngestResult<String> {
        let totals = sightings::totals_by_contributor(&self.db).await?;
        let unique = sightings::distinct_plate_count(&self.db).await?;
        let total = match self.progress_total_override {
            Some(n) => n as i64,
            None => registry::count(&self.db).await?,
        };
        let text = compose_batch_post(batch, &totals, unique, total);

        match self.poster.publish(&text, images).await {
            Ok(reference) => Ok(reference),
            Err(e) => {
                tracing::error!(error = %e, sightings = batch.len(), "Batch post failed");
                Err(e)
            }
        }
    }
}
