//! Ingest services

pub mod batch_admission;
pub mod batch_publisher;
pub mod borough_resolver;
pub mod duplicate_detector;
pub mod image_store;
pub mod media_fetcher;
pub mod media_inspector;
pub mod notifier;
pub mod plate_validator;
pub mod sighting_recorder;
pub mod social_poster;

pub use batch_admission::BatchAdmissionController;
pub use batch_publisher::{compose_batch_post, BatchPublisher};
pub use borough_resolver::resolve_borough;
pub use duplicate_detector::{hamming_distance, DuplicateDetector};
pub use image_store::{sighting_filename, ImageStore, LocalImageStore};
pub use media_fetcher::{HttpMediaFetcher, MediaFetcher};
pub use media_inspector::MediaFacts;
pub use notifier::{NoopNotifier, Notifier, TwilioNotifier};
pub use plate_validator::{PlateCheck, PlateSuggestion, PlateValidator};
pub use sighting_recorder::SightingRecorder;
pub use social_poster::{DryRunPoster, PostImage, SocialPoster};
