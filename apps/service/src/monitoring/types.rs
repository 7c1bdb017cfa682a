use serde::{Deserialize, Serialize};

use super::validation::ValidCheck;

/// Whether a check's target answered with one of its success codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Up,
    #[default]
    Down,
}

impl CheckState {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckState::Up => "up",
            CheckState::Down => "down",
        }
    }

    /// Parse a stored state; anything unrecognised is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "up" => Some(CheckState::Up),
            "down" => Some(CheckState::Down),
            _ => None,
        }
    }
}

impl std::fmt::Display for CheckState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "http" => Some(Protocol::Http),
            "https" => Some(Protocol::Https),
            _ => None,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "get" => Some(Method::Get),
            "post" => Some(Method::Post),
            "put" => Some(Method::Put),
            "delete" => Some(Method::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Normalized result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub response_code: Option<u16>,
    pub errored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl Outcome {
    /// Detail recorded when the probe ran out of time.
    pub const TIMEOUT: &'static str = "timeout";

    /// The target answered with `status`.
    pub fn response(status: u16) -> Self {
        Self { response_code: Some(status), errored: false, error_detail: None }
    }

    /// The probe failed before any response arrived.
    pub fn failure(detail: impl Into<String>) -> Self {
        Self { response_code: None, errored: true, error_detail: Some(detail.into()) }
    }

    pub fn timed_out() -> Self {
        Self::failure(Self::TIMEOUT)
    }

    #[cfg(test)]
    pub fn is_timeout(&self) -> bool {
        self.errored && self.error_detail.as_deref() == Some(Self::TIMEOUT)
    }
}

/// One line of a check's audit log.
///
/// `check` is the snapshot the probe ran against, before the new state was
/// written back. On disk it is `checkSnapshot`, and `state` is `resultingState`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord<'a> {
    #[serde(rename = "checkSnapshot")]
    pub check: &'a ValidCheck,
    pub outcome: &'a Outcome,
    #[serde(rename = "resultingState")]
    pub state: CheckState,
    pub alert_triggered: bool,
    /// Epoch milliseconds.
    pub timestamp: i64,
}
