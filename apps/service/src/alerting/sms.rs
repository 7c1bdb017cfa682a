use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::info;

use crate::config::Sms as SmsConfig;
use crate::monitoring::validation::is_phone_number;

/// Longest body the transport accepts.
pub const MAX_SMS_LEN: usize = 1600;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("invalid recipient phone number {0:?}")]
    InvalidRecipient(String),

    #[error("message is {0} characters, limit is {MAX_SMS_LEN}")]
    MessageTooLong(usize),

    #[error("message must not be empty")]
    EmptyMessage,

    #[error("SMS provider returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("SMS request failed: {0}")]
    Network(#[from] reqwest::Error),
}

/// Outbound text-message capability.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> Result<(), AlertError>;
}

/// Checks applied before any message leaves the process.
pub fn validate_outgoing(phone: &str, message: &str) -> Result<(), AlertError> {
    let phone = phone.trim();
    if !is_phone_number(phone) {
        return Err(AlertError::InvalidRecipient(phone.to_string()));
    }
    let message = message.trim();
    if message.is_empty() {
        return Err(AlertError::EmptyMessage);
    }
    let len = message.chars().count();
    if len > MAX_SMS_LEN {
        return Err(AlertError::MessageTooLong(len));
    }
    Ok(())
}

/// Twilio Messages API.
pub struct TwilioSms {
    client: Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_phone: String,
    country_prefix: String,
}

impl TwilioSms {
    /// Create a new Twilio client. `country_prefix` is prepended to every recipient.
    pub fn new(
        api_base: impl Into<String>,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_phone: impl Into<String>,
        country_prefix: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_phone: from_phone.into(),
            country_prefix: country_prefix.into(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/2010-04-01/Accounts/{}/Messages.json", self.api_base, self.account_sid)
    }
}

#[async_trait]
impl SmsTransport for TwilioSms {
    async fn send(&self, phone: &str, message: &str) -> Result<(), AlertError> {
        validate_outgoing(phone, message)?;

        let to = format!("{}{}", self.country_prefix, phone.trim());
        let form = [("From", self.from_phone.as_str()), ("To", to.as_str()), ("Body", message.trim())];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;

        let status = response.status().as_u16();
        if matches!(status, 200 | 201) {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(AlertError::Rejected { status, body })
    }
}

/// Used when no provider credentials are configured: the alert only reaches
/// the service log.
#[derive(Debug, Default)]
pub struct LogOnlySms;

#[async_trait]
impl SmsTransport for LogOnlySms {
    async fn send(&self, phone: &str, message: &str) -> Result<(), AlertError> {
        validate_outgoing(phone, message)?;
        info!(phone, message, "SMS transport not configured, alert logged only");
        Ok(())
    }
}

/// Pick the transport the configuration allows.
pub fn transport_from_config(config: &SmsConfig) -> Arc<dyn SmsTransport> {
    match (&config.account_sid, &config.auth_token, &config.from_phone) {
        (Some(sid), Some(token), Some(from)) => Arc::new(TwilioSms::new(
            config.api_base.clone(),
            sid.clone(),
            token.clone(),
            from.clone(),
            config.country_prefix.clone(),
        )),
        _ => Arc::new(LogOnlySms),
    }
}
