//! State-change notifications.

pub mod sms;

pub use sms::{AlertError, SmsTransport, transport_from_config};

use std::sync::Arc;

use tracing::info;

use crate::monitoring::validation::ValidCheck;

/// The text sent when a check changes state.
pub fn alert_message(check: &ValidCheck) -> String {
    format!(
        "Alert: Your check for {} {} is currently {}",
        check.method.as_str().to_uppercase(),
        check.target(),
        check.state
    )
}

/// Sends state-change alerts to the check owner's phone.
///
/// Best-effort: a failed send is returned to the caller to log, never retried.
pub struct AlertDispatcher {
    transport: Arc<dyn SmsTransport>,
}

impl AlertDispatcher {
    /// Create a new dispatcher sending through `transport`.
    pub fn new(transport: Arc<dyn SmsTransport>) -> Self {
        Self { transport }
    }

    /// `check` must already carry its new state.
    pub async fn dispatch(&self, check: &ValidCheck) -> Result<(), AlertError> {
        let message = alert_message(check);
        self.transport.send(&check.user_phone, &message).await?;
        info!(check_id = %check.id, state = %check.state, "Owner alerted of state change");
        Ok(())
    }
}
