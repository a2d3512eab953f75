//! Sighting image storage
//!
//! Images land under a pending name when they arrive and are promoted to
//! their permanent name once the sighting is recorded. Permanent names are
//! write-once.

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{IngestError, IngestResult};

/// Permanent file name for a sighting image
///
/// `{plate}_{YYYYMMDD}_{HHMMSS}_{subsec}.jpg` where the subsecond part is
/// microseconds divided by 100, zero-padded to four digits.
pub fn sighting_filename(plate: &str, taken_at: &DateTime<Utc>) -> String {
    let micros = taken_at.nanosecond() / 1_000 % 1_000_000;
    format!(
        "{}_{}_{:04}.jpg",
        plate,
        taken_at.format("%Y%m%d_%H%M%S"),
        micros / 100
    )
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store a newly received image under a temporary reference
    async fn store_pending(&self, bytes: &[u8]) -> IngestResult<String>;

    /// Move a pending image to its permanent name, returning the new reference
    async fn promote(&self, pending_ref: &str, final_name: &str) -> IngestResult<String>;

    async fn read(&self, image_ref: &str) -> IngestResult<Vec<u8>>;

    /// Remove an image that will never be recorded
    async fn discard(&self, image_ref: &str) -> IngestResult<()>;
}

/// Images stored as files in one directory
pub struct LocalImageStore {
    dir: PathBuf,
}

impl LocalImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a reference to a path inside the store
    fn path_for(&self, image_ref: &str) -> IngestResult<PathBuf> {
        let name = Path::new(image_ref);
        if name.components().count() != 1 || name.file_name().is_none() {
            return Err(IngestError::Validation(format!(
                "Invalid image reference: {}",
                image_ref
            )));
        }
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn store_pending(&self, bytes: &[u8]) -> IngestResult<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let image_ref = format!("pending_{}.jpg", Uuid::new_v4());
        tokio::fs::write(self.dir.join(&image_ref), bytes).await?;
        tracing::debug!(image_ref = %image_ref, size = bytes.len(), "Stored pending image");
        Ok(image_ref)
    }

    async fn promote(&self, pending_ref: &str, final_name: &str) -> IngestResult<String> {
        let from = self.path_for(pending_ref)?;
        let to = self.path_for(final_name)?;
        if tokio::fs::try_exists(&to).await? {
            return Err(IngestError::TransientExternal(format!(
                "Image {} already exists",
                final_name
            )));
        }
        tokio::fs::rename(&from, &to).await?;
        tracing::debug!(from = %pending_ref, to = %final_name, "Promoted image");
        Ok(final_name.to_string())
    }

    async fn read(&self, image_ref: &str) -> IngestResult<Vec<u8>> {
        Ok(tokio::fs::read(self.path_for(image_ref)?).await?)
    }

    async fn discard(&self, image_ref: &str) -> IngestResult<()> {
        match tokio::fs::remove_file(self.path_for(image_ref)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
