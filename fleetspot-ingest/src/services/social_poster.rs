//! Social feed publishing

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{IngestError, IngestResult};

/// Most images one post can carry
pub const MAX_POST_IMAGES: usize = 4;

/// Image attached to a post
#[derive(Debug, Clone, PartialEq)]
pub struct PostImage {
    pub bytes: Vec<u8>,
    pub alt_text: String,
}

/// Publishes one post; all or nothing
#[async_trait]
pub trait SocialPoster: Send + Sync {
    /// Publish `text` with up to [`MAX_POST_IMAGES`] images, returning a persistent reference
    async fn publish(&self, text: &str, images: Vec<PostImage>) -> IngestResult<String>;
}

fn check_image_count(images: &[PostImage]) -> IngestResult<()> {
    if images.len() > MAX_POST_IMAGES {
        return Err(IngestError::Validation(format!(
            "A post carries at most {} images, got {}",
            MAX_POST_IMAGES,
            images.len()
        )));
    }
    Ok(())
}

/// Logs the post instead of sending it
#[derive(Debug, Default)]
pub struct DryRunPoster;

#[async_trait]
impl SocialPoster for DryRunPoster {
    async fn publish(&self, text: &str, images: Vec<PostImage>) -> IngestResult<String> {
        check_image_count(&images)?;
        let reference = format!("dry-run:{}", Uuid::new_v4());
        tracing::info!(
            reference = %reference,
            images = images.len(),
            text = %text,
            "Dry-run post"
        );
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> PostImage {
        PostImage {
            bytes: vec![0xff, 0xd8],
            alt_text: "T123456C".to_string(),
        }
    }

    #[tokio::test]
    async fn test_dry_run_returns_reference() {
        let reference = DryRunPoster.publish("+1 sighting", vec![image()]).await.unwrap();
        assert!(reference.starts_with("dry-run:"));
    }

    #[tokio::test]
    async fn test_too_many_images_rejected() {
        let images = vec![image(); 5];
        assert!(matches!(
            DryRunPoster.publish("+5 sightings", images).await,
            Err(IngestError::Validation(_))
        ));
    }
}
