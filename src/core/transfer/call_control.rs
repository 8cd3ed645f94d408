//! Call-control client: redirects a live call leg to the transfer webhook.
//!
//! The redirect is a single REST call against the telephony platform that
//! replaces the call's current instructions with the document served by
//! `TRANSFER_WEBHOOK_URL`. Outcome tracking is callback driven and lands in
//! the [`TransferRegistry`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use super::registry::TransferRegistry;

/// Default REST API base for the telephony platform.
pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

const REDIRECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while starting a transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("call control is not configured: {0}")]
    NotConfigured(String),

    #[error("invalid transfer webhook url: {0}")]
    InvalidWebhookUrl(String),

    #[error("redirect request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("redirect rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Outbound call-control operations needed to complete a transfer.
#[async_trait]
pub trait CallControl: Send + Sync {
    /// Register the transfer as pending and redirect `call_sid` so the
    /// platform dials `destination`.
    async fn redirect_to_transfer(&self, call_sid: &str, destination: &str)
    -> Result<(), TransferError>;
}

/// Credentials and endpoints for [`TwilioCallControl`].
#[derive(Debug, Clone)]
pub struct TwilioCallControlConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Public URL of this service's `/twiml/transfer` endpoint.
    pub transfer_webhook_url: String,
    /// REST base, overridable for tests.
    pub api_base: String,
}

/// [`CallControl`] backed by the Twilio REST API.
pub struct TwilioCallControl {
    client: reqwest::Client,
    config: TwilioCallControlConfig,
    registry: Arc<TransferRegistry>,
}

impl TwilioCallControl {
    pub fn new(
        config: TwilioCallControlConfig,
        registry: Arc<TransferRegistry>,
    ) -> Result<Self, TransferError> {
        if config.account_sid.is_empty() || config.auth_token.is_empty() {
            return Err(TransferError::NotConfigured(
                "account SID and auth token are required".to_string(),
            ));
        }
        Url::parse(&config.transfer_webhook_url)
            .map_err(|e| TransferError::InvalidWebhookUrl(e.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(REDIRECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            config,
            registry,
        })
    }

    /// Webhook URL the call is redirected to, carrying the destination.
    pub fn transfer_url(&self, destination: &str) -> Result<String, TransferError> {
        let mut url = Url::parse(&self.config.transfer_webhook_url)
            .map_err(|e| TransferError::InvalidWebhookUrl(e.to_string()))?;
        url.query_pairs_mut().append_pair("target_number", destination);
        Ok(url.into())
    }

    fn call_resource_url(&self, call_sid: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls/{}.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid,
            call_sid
        )
    }
}

#[async_trait]
impl CallControl for TwilioCallControl {
    async fn redirect_to_transfer(
        &self,
        call_sid: &str,
        destination: &str,
    ) -> Result<(), TransferError> {
        let transfer_url = self.transfer_url(destination)?;

        // Registered before the redirect so the waiter never races the first callback.
        self.registry.set_pending(call_sid, destination);

        tracing::info!(call_sid = %call_sid, destination = %destination, "Redirecting call for transfer");

        let response = self
            .client
            .post(self.call_resource_url(call_sid))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("Url", transfer_url.as_str()), ("Method", "POST")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(call_sid = %call_sid, status = %status, "Call redirect rejected");
            return Err(TransferError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(call_sid = %call_sid, "Call redirect accepted");
        Ok(())
    }
}
