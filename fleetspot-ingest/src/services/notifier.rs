//! Admin notifications over SMS

use async_trait::async_trait;
use fleetspot_common::config::TwilioCredentials;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::time::Duration;

use crate::db::contributors;
use crate::error::{IngestError, IngestResult};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a short text to the service admin
    async fn notify_admin(&self, message: &str) -> IngestResult<()>;
}

/// Used when outbound SMS is not configured
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_admin(&self, message: &str) -> IngestResult<()> {
        tracing::debug!(message = %message, "Admin notification skipped (not configured)");
        Ok(())
    }
}

/// Sends through the Twilio Messages REST endpoint
///
/// The admin's number is the sender identifier of the admin contributor.
pub struct TwilioNotifier {
    client: reqwest::Client,
    db: SqlitePool,
    account_sid: String,
    auth_token: String,
    from_number: String,
    admin_contributor_id: i64,
}

impl TwilioNotifier {
    pub fn new(
        db: SqlitePool,
        credentials: &TwilioCredentials,
        from_number: String,
        admin_contributor_id: i64,
    ) -> IngestResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            db,
            account_sid: credentials.account_sid.clone(),
            auth_token: credentials.auth_token.clone(),
            from_number,
            admin_contributor_id,
        })
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn notify_admin(&self, message: &str) -> IngestResult<()> {
        let admin = contributors::find_by_id(&self.db, self.admin_contributor_id).await?;
        let Some(to_number) = admin.and_then(|c| c.sender) else {
            tracing::warn!(
                admin_contributor_id = self.admin_contributor_id,
                "Admin contributor missing or has no phone number"
            );
            return Ok(());
        };

        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let mut form_body: HashMap<&str, &str> = HashMap::new();
        form_body.insert("To", &to_number);
        form_body.insert("From", &self.from_number);
        form_body.insert("Body", message);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::TransientExternal(format!(
                "Notification failed ({}): {}",
                status, body
            )));
        }

        tracing::info!(message = %message, "Admin notified");
        Ok(())
    }
}
