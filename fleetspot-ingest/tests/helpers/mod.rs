//! Shared test fixtures: in-memory database, fake collaborators and a wired engine
#![allow(dead_code)]

use async_trait::async_trait;
use fleetspot_common::config::ServiceConfig;
use fleetspot_common::db::RegistryEntry;
use fleetspot_ingest::db::{contributors, conversations, init_schema, registry};
use fleetspot_ingest::error::{IngestError, IngestResult};
use fleetspot_ingest::messages::Reply;
use fleetspot_ingest::models::{Conversation, InboundMessage};
use fleetspot_ingest::services::media_inspector;
use fleetspot_ingest::services::{
    BatchAdmissionController, BatchPublisher, LocalImageStore, MediaFetcher, Notifier, PostImage,
    SocialPoster,
};
use fleetspot_ingest::session::{Collaborators, ConversationEngine};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const ADMIN_SENDER: &str = "+15550000000";
pub const SENDER: &str = "+15550001111";

/// In-memory database with the full schema
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    init_schema(&pool).await.expect("Failed to initialize schema");
    pool
}

pub async fn seed_registry(pool: &SqlitePool, plates: &[&str]) {
    for plate in plates {
        registry::upsert(pool, &RegistryEntry::bare(plate))
            .await
            .expect("Failed to seed registry");
    }
}

/// Serves canned bytes per URL; unknown URLs fail like a provider outage
#[derive(Default)]
pub struct FakeFetcher {
    media: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeFetcher {
    pub fn insert(&self, url: &str, bytes: &[u8]) {
        self.media.lock().unwrap().insert(url.to_string(), bytes.to_vec());
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> IngestResult<Vec<u8>> {
        self.media
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| IngestError::TransientExternal(format!("No media at {}", url)))
    }
}

/// Records every post; can be switched to fail
#[derive(Default)]
pub struct RecordingPoster {
    pub posts: Mutex<Vec<(String, usize)>>,
    pub fail: AtomicBool,
    pub delay_ms: AtomicU64,
}

impl RecordingPoster {
    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Make each publish take this long, like a slow feed
    pub fn set_delay_ms(&self, ms: u64) {
        self.delay_ms.store(ms, Ordering::SeqCst);
    }
}

#[async_trait]
impl SocialPoster for RecordingPoster {
    async fn publish(&self, text: &str, images: Vec<PostImage>) -> IngestResult<String> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(IngestError::TransientExternal("Feed unavailable".to_string()));
        }
        let mut posts = self.posts.lock().unwrap();
        posts.push((text.to_string(), images.len()));
        Ok(format!("post-{}", posts.len()))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_admin(&self, message: &str) -> IngestResult<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// Engine wired to fakes, with GPS coordinates supplied per image content
pub struct Harness {
    pub pool: SqlitePool,
    pub engine: Arc<ConversationEngine>,
    pub publisher: Arc<BatchPublisher>,
    pub fetcher: Arc<FakeFetcher>,
    pub poster: Arc<RecordingPoster>,
    pub notifier: Arc<RecordingNotifier>,
    pub images: Arc<LocalImageStore>,
    gps: Arc<Mutex<HashMap<String, (f64, f64)>>>,
    _image_dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(ServiceConfig::default()).await
    }

    pub async fn with_config(config: ServiceConfig) -> Self {
        let pool = memory_pool().await;
        seed_registry(&pool, &["T123456C", "T654321C", "T111111C"]).await;

        // Admin is contributor 1, matching the default admin_contributor_id
        contributors::get_or_create_by_sender(&pool, ADMIN_SENDER)
            .await
            .expect("Failed to create admin");

        let image_dir = TempDir::new().expect("Failed to create image dir");
        let images = Arc::new(LocalImageStore::new(image_dir.path()));
        let poster = Arc::new(RecordingPoster::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let fetcher = Arc::new(FakeFetcher::default());

        let publisher = Arc::new(BatchPublisher::new(
            pool.clone(),
            BatchAdmissionController::new(config.batch_size, config.batch_max_age_hours),
            poster.clone(),
            images.clone(),
        ));

        let gps: Arc<Mutex<HashMap<String, (f64, f64)>>> = Arc::default();
        let gps_table = gps.clone();
        let engine = ConversationEngine::new(
            pool.clone(),
            Collaborators {
                fetcher: fetcher.clone(),
                images: images.clone(),
                notifier: notifier.clone(),
                publisher: publisher.clone(),
            },
            &config,
        )
        .with_inspector(Arc::new(move |bytes: &[u8]| {
            let mut facts = media_inspector::inspect(bytes);
            if let Some((lat, lon)) = gps_table.lock().unwrap().get(&facts.content_hash) {
                facts.latitude = Some(*lat);
                facts.longitude = Some(*lon);
            }
            facts
        }));

        Self {
            pool,
            engine: Arc::new(engine),
            publisher,
            fetcher,
            poster,
            notifier,
            images,
            gps,
            _image_dir: image_dir,
        }
    }

    /// Make `bytes` downloadable at `url`, optionally carrying coordinates
    pub fn add_photo(&self, url: &str, bytes: &[u8], gps: Option<(f64, f64)>) {
        self.fetcher.insert(url, bytes);
        if let Some(coords) = gps {
            self.gps
                .lock()
                .unwrap()
                .insert(media_inspector::content_hash(bytes), coords);
        }
    }

    pub async fn send(&self, sender: &str, body: &str) -> Reply {
        self.engine.handle(&InboundMessage::new(sender, body)).await
    }

    pub async fn send_photo(&self, sender: &str, body: &str, url: &str) -> Reply {
        self.engine
            .handle(&InboundMessage::new(sender, body).with_media(url))
            .await
    }

    pub async fn conversation(&self, sender: &str) -> Conversation {
        conversations::find(&self.pool, sender)
            .await
            .unwrap()
            .expect("conversation exists")
    }

    pub async fn sighting_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM sightings")
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}
