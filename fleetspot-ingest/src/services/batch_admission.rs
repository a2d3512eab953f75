//! Batch admission control
//!
//! Decides when the backlog of unposted sightings should be flushed to the
//! social feed: once a full batch is waiting, or once the oldest item has
//! waited long enough.

use chrono::{DateTime, Duration, Utc};
use fleetspot_common::time;

use crate::models::{QueueStats, QueuedSighting};

/// Images per post, also the queue length that forces a publish
pub const DEFAULT_BATCH_SIZE: usize = 4;

/// Waiting time of the oldest item that forces a publish
pub const DEFAULT_MAX_AGE_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct BatchAdmissionController {
    batch_size: usize,
    max_age: Duration,
}

impl Default for BatchAdmissionController {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, DEFAULT_MAX_AGE_HOURS)
    }
}

impl BatchAdmissionController {
    pub fn new(batch_size: usize, max_age_hours: i64) -> Self {
        Self {
            batch_size: batch_size.max(1),
            max_age: Duration::hours(max_age_hours),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Should the queue be flushed now?
    ///
    /// `queue` is ordered oldest first. Either a full batch or an oldest item
    /// aged at least the limit (inclusive) is enough on its own.
    pub fn should_trigger(&self, queue: &[QueuedSighting], now: DateTime<Utc>) -> bool {
        let Some(oldest) = queue.first() else {
            return false;
        };

        if queue.len() >= self.batch_size {
            tracing::debug!(count = queue.len(), threshold = self.batch_size, "Batch trigger: queue full");
            return true;
        }

        let waited = now - oldest.created_at;
        if waited >= self.max_age {
            tracing::debug!(
                hours_waiting = time::hours_between(oldest.created_at, now),
                "Batch trigger: oldest sighting aged out"
            );
            return true;
        }

        tracing::debug!(
            count = queue.len(),
            hours_waiting = time::hours_between(oldest.created_at, now),
            "Batch not triggered"
        );
        false
    }

    /// Observability snapshot of the queue
    pub fn stats(&self, queue: &[QueuedSighting], now: DateTime<Utc>) -> QueueStats {
        QueueStats {
            count: queue.len(),
            oldest_age_hours: queue
                .first()
                .map(|oldest| time::hours_between(oldest.created_at, now)),
            should_post: self.should_trigger(queue, now),
        }
    }
}
