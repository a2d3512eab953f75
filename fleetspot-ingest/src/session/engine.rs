//! Conversation engine
//!
//! Runs one turn per inbound message: gathers facts, asks the transition
//! function what to do, then executes the effect. Slow follow-up work
//! (batch publishing, admin notification) runs on tracked background tasks
//! after the reply is computed.

use fleetspot_common::config::ServiceConfig;
use fleetspot_common::db::Contributor;
use fleetspot_common::time;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::task::TaskTracker;

use crate::db::contributors::{self, NameChange};
use crate::db::{conversations, sightings};
use crate::error::IngestResult;
use crate::messages::Reply;
use crate::models::{InboundMessage, NewSighting, RecordOutcome};
use crate::services::image_store::sighting_filename;
use crate::services::media_inspector::{self, MediaFacts};
use crate::services::{
    BatchPublisher, DuplicateDetector, ImageStore, MediaFetcher, Notifier, PlateValidator,
    SightingRecorder,
};
use crate::session::machine::{
    self, Completion, CompletionResult, Effect, MediaIntake, PlateLookup, PlateQuery,
    SessionRules, SightingCounts, StoredMedia, TurnFacts,
};

/// Image inspection function, swappable for tests
pub type InspectFn = Arc<dyn Fn(&[u8]) -> MediaFacts + Send + Sync>;

/// External collaborators the engine drives
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn MediaFetcher>,
    pub images: Arc<dyn ImageStore>,
    pub notifier: Arc<dyn Notifier>,
    pub publisher: Arc<BatchPublisher>,
}

pub struct ConversationEngine {
    db: SqlitePool,
    validator: PlateValidator,
    detector: DuplicateDetector,
    recorder: SightingRecorder,
    collaborators: Collaborators,
    inspect: InspectFn,
    rules: SessionRules,
    admin_contributor_id: i64,
    background: TaskTracker,
}

impl ConversationEngine {
    pub fn new(db: SqlitePool, collaborators: Collaborators, config: &ServiceConfig) -> Self {
        let detector = DuplicateDetector::with_threshold(db.clone(), config.similar_distance_threshold);
        Self {
            validator: PlateValidator::new(db.clone()),
            recorder: SightingRecorder::new(db.clone(), detector.clone()),
            detector,
            db,
            collaborators,
            inspect: Arc::new(media_inspector::inspect),
            rules: SessionRules {
                max_name_len: config.max_name_len,
                fuzzy_max_results: config.fuzzy_max_results,
            },
            admin_contributor_id: config.admin_contributor_id,
            background: TaskTracker::new(),
        }
    }

    /// Replace the image inspection function
    pub fn with_inspector(mut self, inspect: InspectFn) -> Self {
        self.inspect = inspect;
        self
    }

    /// Handle one inbound message, always producing a reply
    ///
    /// Any failure resets the sender's conversation to idle and yields the
    /// generic apology; the cause is only logged.
    pub async fn handle(&self, msg: &InboundMessage) -> Reply {
        tracing::info!(
            sender = %msg.sender,
            media = msg.media_urls.len(),
            "Inbound message"
        );

        match self.run_turn(msg).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(sender = %msg.sender, error = %e, "Turn failed, resetting conversation");
                self.reset_after_failure(&msg.sender).await;
                Reply::GenericError
            }
        }
    }

    /// Wait for background work spawned so far
    pub async fn wait_for_background(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    async fn reset_after_failure(&self, sender: &str) {
        let pending = match conversations::find(&self.db, sender).await {
            Ok(conversation) => conversation.and_then(|c| c.pending_image_ref),
            Err(e) => {
                tracing::warn!(sender = %sender, error = %e, "Could not read conversation before reset");
                None
            }
        };
        if let Err(e) = conversations::reset(&self.db, sender).await {
            tracing::error!(sender = %sender, error = %e, "Conversation reset failed");
            return;
        }
        if let Some(image_ref) = pending {
            self.discard_pending(sender, &image_ref).await;
        }
    }

    /// Remove a parked image no conversation refers to any more
    async fn discard_pending(&self, sender: &str, image_ref: &str) {
        match self.collaborators.images.discard(image_ref).await {
            Ok(()) => tracing::debug!(sender = %sender, image_ref = %image_ref, "Pending image discarded"),
            Err(e) => tracing::warn!(sender = %sender, image_ref = %image_ref, error = %e, "Pending image not discarded"),
        }
    }

    async fn run_turn(&self, msg: &InboundMessage) -> IngestResult<Reply> {
        let (conversation, created) = conversations::get_or_create(&self.db, &msg.sender).await?;
        let contributor = contributors::find_by_sender(&self.db, &msg.sender).await?;

        if created {
            if let Some(known) = contributor.as_ref().filter(|c| c.id != self.admin_contributor_id) {
                self.notify_in_background(format!("New chat session from {}", known.display_name()));
            }
        }

        let plan = machine::plan(&conversation, msg);
        let (media, intake_facts) = match &plan.media_url {
            Some(url) => {
                let (intake, facts) = self.intake_media(url).await?;
                (Some(intake), facts)
            }
            None => (None, None),
        };
        let plate = match plan.plate_query {
            Some(query) => Some(self.lookup_plate(query).await?),
            None => None,
        };

        let facts = TurnFacts {
            now: time::now(),
            media,
            plate,
            contributor,
        };
        let step = machine::decide(&conversation, msg, &facts, &self.rules)?;
        tracing::debug!(
            sender = %msg.sender,
            state = conversation.state.as_str(),
            next = ?step.update.as_ref().and_then(|u| u.state.as_ref()),
            "Transition decided"
        );

        if let Some(update) = step.update {
            let released = update.released_image(&conversation).map(str::to_string);
            conversations::apply_update(&self.db, &msg.sender, update).await?;
            if let Some(image_ref) = released {
                self.discard_pending(&msg.sender, &image_ref).await;
            }
        }

        match step.effect {
            Effect::Reply(reply) => Ok(reply),
            Effect::SaveName(name) => self.save_name(&msg.sender, &name).await,
            Effect::Complete(completion) => {
                self.complete(&msg.sender, completion, intake_facts).await
            }
        }
    }

    async fn inspect_bytes(&self, bytes: Vec<u8>) -> IngestResult<(Vec<u8>, MediaFacts)> {
        let inspect = Arc::clone(&self.inspect);
        tokio::task::spawn_blocking(move || {
            let facts = inspect(&bytes);
            (bytes, facts)
        })
        .await
        .map_err(|e| fleetspot_common::Error::Internal(format!("Image inspection task failed: {}", e)).into())
    }

    /// Download, inspect, duplicate-check and park the inbound image
    async fn intake_media(&self, url: &str) -> IngestResult<(MediaIntake, Option<MediaFacts>)> {
        let bytes = self.collaborators.fetcher.fetch(url).await?;
        let (bytes, facts) = self.inspect_bytes(bytes).await?;

        if let Some(existing_id) = self.detector.find_exact(&facts.content_hash).await? {
            tracing::info!(existing_id, hash = %facts.content_hash, "Duplicate photo at intake");
            return Ok((MediaIntake::Duplicate { existing_id }, None));
        }

        let image_ref = self.collaborators.images.store_pending(&bytes).await?;
        let stored = StoredMedia {
            image_ref,
            latitude: facts.latitude,
            longitude: facts.longitude,
            captured_at: facts.captured_at,
        };
        Ok((MediaIntake::Stored(stored), Some(facts)))
    }

    async fn lookup_plate(&self, query: PlateQuery) -> IngestResult<PlateLookup> {
        if let Some(plate) = query.extracted {
            if self.validator.validate(&plate).await?.is_valid() {
                tracing::info!(plate = %plate, "Plate validated");
                return Ok(PlateLookup::Registered(plate));
            }
        }

        let suggestions = if query.suggest {
            self.validator
                .fuzzy_matches(&query.candidate, self.rules.fuzzy_max_results)
                .await?
                .into_iter()
                .map(|s| s.plate)
                .collect()
        } else {
            Vec::new()
        };

        tracing::info!(candidate = %query.candidate, suggestions = suggestions.len(), "Plate not registered");
        Ok(PlateLookup::Unregistered {
            candidate: query.candidate,
            suggestions,
        })
    }

    async fn save_name(&self, sender: &str, name: &str) -> IngestResult<Reply> {
        let reply = match contributors::set_name_if_absent(&self.db, sender, name).await? {
            NameChange::Saved(saved) => Reply::NameSaved(saved),
            NameChange::AlreadyNamed(existing) => Reply::NameAlreadySet(existing),
            NameChange::UnknownSender => {
                tracing::warn!(sender = %sender, "Name offered by sender with no sightings");
                Reply::NameNotSaved
            }
        };
        Ok(reply)
    }

    async fn complete(
        &self,
        sender: &str,
        completion: Completion,
        intake_facts: Option<MediaFacts>,
    ) -> IngestResult<Reply> {
        let images = &self.collaborators.images;

        let facts = match intake_facts {
            Some(facts) => facts,
            None => {
                let bytes = images.read(&completion.image_ref).await?;
                self.inspect_bytes(bytes).await?.1
            }
        };

        let result = if let Some(existing_id) = self.detector.find_exact(&facts.content_hash).await? {
            tracing::info!(existing_id, plate = %completion.plate, "Duplicate photo at completion");
            images.discard(&completion.image_ref).await?;
            CompletionResult::Duplicate
        } else {
            let contributor = contributors::get_or_create_by_sender(&self.db, sender).await?;
            let final_name = sighting_filename(&completion.plate, &completion.image_timestamp);
            let image_ref = images.promote(&completion.image_ref, &final_name).await?;

            let outcome = self
                .recorder
                .record(NewSighting {
                    plate: completion.plate.clone(),
                    timestamp: completion.timestamp,
                    latitude: completion.latitude,
                    longitude: completion.longitude,
                    borough: completion.borough,
                    contributor_id: contributor.id,
                    image_ref: image_ref.clone(),
                    content_hash: Some(facts.content_hash),
                    perceptual_hash: facts.perceptual_hash,
                })
                .await?;

            match outcome {
                RecordOutcome::Recorded {
                    sighting_id,
                    similar,
                    ..
                } => {
                    if let Some(similar) = similar {
                        tracing::warn!(
                            sighting_id,
                            matched_id = similar.matched_id,
                            distance = similar.distance,
                            "Similar image already recorded"
                        );
                    }
                    let counts = self.counts(&completion.plate, &contributor).await?;
                    self.follow_up_in_background(&completion.plate, &contributor);
                    CompletionResult::Recorded {
                        plate: completion.plate,
                        counts,
                        contributor_named: contributor.preferred_name.is_some(),
                    }
                }
                RecordOutcome::Duplicate { .. } => {
                    images.discard(&image_ref).await?;
                    CompletionResult::Duplicate
                }
            }
        };

        let (update, reply) = machine::after_completion(result);
        conversations::apply_update(&self.db, sender, update).await?;
        Ok(reply)
    }

    async fn counts(&self, plate: &str, contributor: &Contributor) -> IngestResult<SightingCounts> {
        Ok(SightingCounts {
            vehicle: sightings::count_for_plate(&self.db, plate).await?,
            total: sightings::count_all(&self.db).await?,
            contributor: sightings::count_for_contributor(&self.db, contributor.id).await?,
        })
    }

    fn notify_in_background(&self, message: String) {
        let notifier = Arc::clone(&self.collaborators.notifier);
        self.background.spawn(async move {
            if let Err(e) = notifier.notify_admin(&message).await {
                tracing::warn!(error = %e, "Admin notification failed");
            }
        });
    }

    /// Drain the batch queue, then tell the admin
    fn follow_up_in_background(&self, plate: &str, contributor: &Contributor) {
        let publisher = Arc::clone(&self.collaborators.publisher);
        let notifier = Arc::clone(&self.collaborators.notifier);
        let message = format!("New sighting {} from {}", plate, contributor.display_name());

        self.background.spawn(async move {
            match publisher.drain().await {
                Ok(0) => {}
                Ok(posts) => tracing::info!(posts, "Published queued sightings"),
                Err(e) => tracing::warn!(error = %e, "Batch publishing failed"),
            }
            if let Err(e) = notifier.notify_admin(&message).await {
                tracing::warn!(error = %e, "Admin notification failed");
            }
        });
    }
}
