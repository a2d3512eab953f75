//! Inbound media download

use async_trait::async_trait;
use fleetspot_common::config::TwilioCredentials;
use std::time::Duration;

use crate::error::{IngestError, IngestResult};

/// Downloads media referenced by an inbound message
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> IngestResult<Vec<u8>>;
}

/// Fetches provider-hosted media with account basic auth
pub struct HttpMediaFetcher {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
}

impl HttpMediaFetcher {
    pub fn new(credentials: &TwilioCredentials) -> IngestResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            account_sid: credentials.account_sid.clone(),
            auth_token: credentials.auth_token.clone(),
        })
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, url: &str) -> IngestResult<Vec<u8>> {
        tracing::debug!(url = %url, "Downloading media");

        let response = self
            .client
            .get(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::TransientExternal(format!(
                "Media download returned {}",
                status
            )));
        }

        let bytes = response.bytes().await?;
        tracing::debug!(url = %url, size = bytes.len(), "Media downloaded");
        Ok(bytes.to_vec())
    }
}
