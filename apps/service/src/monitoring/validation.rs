//! Sanity checks applied to every check record before it is probed.
//!
//! A record that fails any of these is skipped for the sweep and left as it is
//! on disk. The same field rules back check registration.

use serde::Serialize;
use thiserror::Error;

use super::types::{CheckState, Method, Protocol};
use crate::database::CheckRecord;

pub const CHECK_ID_LEN: usize = 20;
pub const PHONE_LEN: usize = 10;
pub const MIN_TIMEOUT_SECONDS: u64 = 1;
pub const MAX_TIMEOUT_SECONDS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing field `{0}`")]
    Missing(&'static str),

    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ValidationError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}

/// A check whose every field passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidCheck {
    pub id: String,
    pub user_phone: String,
    pub protocol: Protocol,
    pub url: String,
    pub method: Method,
    pub success_codes: Vec<u16>,
    pub timeout_seconds: u64,
    pub state: CheckState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<i64>,
}

impl ValidCheck {
    /// `<protocol>://<url>` as the user entered it.
    pub fn target(&self) -> String {
        format!("{}://{}", self.protocol, self.url)
    }
}

pub fn validate_check(record: &CheckRecord) -> Result<ValidCheck, ValidationError> {
    Ok(ValidCheck {
        id: check_id(record.id.as_deref())?,
        user_phone: phone(record.user_phone.as_deref())?,
        protocol: protocol(record.protocol.as_deref())?,
        url: non_empty("url", record.url.as_deref())?,
        method: method(record.method.as_deref())?,
        success_codes: success_codes(record.success_codes.as_deref())?,
        timeout_seconds: timeout_seconds(record.timeout_seconds)?,
        state: state(record.state.as_deref()),
        last_checked: last_checked(record.last_checked),
    })
}

fn non_empty(field: &'static str, value: Option<&str>) -> Result<String, ValidationError> {
    let value = value.ok_or(ValidationError::Missing(field))?.trim();
    if value.is_empty() {
        return Err(ValidationError::invalid(field, "must not be blank"));
    }
    Ok(value.to_string())
}

fn exact_len(field: &'static str, value: Option<&str>, len: usize) -> Result<String, ValidationError> {
    let value = non_empty(field, value)?;
    if value.chars().count() != len {
        return Err(ValidationError::invalid(field, format!("expected {len} characters")));
    }
    Ok(value)
}

pub fn check_id(value: Option<&str>) -> Result<String, ValidationError> {
    let id = exact_len("id", value, CHECK_ID_LEN)?;
    if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::invalid("id", "must be alphanumeric"));
    }
    Ok(id)
}

pub fn phone(value: Option<&str>) -> Result<String, ValidationError> {
    let phone = exact_len("userPhone", value, PHONE_LEN)?;
    if !is_phone_number(&phone) {
        return Err(ValidationError::invalid("userPhone", "must be digits only"));
    }
    Ok(phone)
}

/// Exactly ten ASCII digits.
pub fn is_phone_number(value: &str) -> bool {
    value.len() == PHONE_LEN && value.bytes().all(|b| b.is_ascii_digit())
}

pub fn protocol(value: Option<&str>) -> Result<Protocol, ValidationError> {
    let raw = value.ok_or(ValidationError::Missing("protocol"))?;
    Protocol::parse(raw).ok_or_else(|| ValidationError::invalid("protocol", "expected http or https"))
}

pub fn url(value: Option<&str>) -> Result<String, ValidationError> {
    non_empty("url", value)
}

pub fn method(value: Option<&str>) -> Result<Method, ValidationError> {
    let raw = value.ok_or(ValidationError::Missing("method"))?;
    Method::parse(raw)
        .ok_or_else(|| ValidationError::invalid("method", "expected get, post, put or delete"))
}

pub fn success_codes(value: Option<&[u16]>) -> Result<Vec<u16>, ValidationError> {
    match value {
        None => Err(ValidationError::Missing("successCodes")),
        Some([]) => Err(ValidationError::invalid("successCodes", "must not be empty")),
        Some(codes) => Ok(codes.to_vec()),
    }
}

pub fn timeout_seconds(value: Option<u64>) -> Result<u64, ValidationError> {
    let timeout = value.ok_or(ValidationError::Missing("timeoutSeconds"))?;
    if !(MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&timeout) {
        return Err(ValidationError::invalid(
            "timeoutSeconds",
            format!("must be between {MIN_TIMEOUT_SECONDS} and {MAX_TIMEOUT_SECONDS}"),
        ));
    }
    Ok(timeout)
}

/// Missing or unrecognised states count as down.
pub fn state(value: Option<&str>) -> CheckState {
    value.and_then(CheckState::parse).unwrap_or_default()
}

/// Only a positive timestamp means the check was evaluated before.
pub fn last_checked(value: Option<i64>) -> Option<i64> {
    value.filter(|&ts| ts > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CheckRecord {
        CheckRecord {
            id: Some("abcdefghij0123456789".into()),
            user_phone: Some("5551234567".into()),
            protocol: Some("https".into()),
            url: Some(" example.com/status ".into()),
            method: Some("get".into()),
            success_codes: Some(vec![200, 201]),
            timeout_seconds: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_complete_record_with_defaults() {
        let check = validate_check(&record()).unwrap();
        assert_eq!(check.url, "example.com/status");
        assert_eq!(check.state, CheckState::Down);
        assert_eq!(check.last_checked, None);
        assert_eq!(check.target(), "https://example.com/status");
    }

    #[test]
    fn keeps_prior_state_and_timestamp() {
        let mut raw = record();
        raw.state = Some("up".into());
        raw.last_checked = Some(1_700_000_000_000);
        let check = validate_check(&raw).unwrap();
        assert_eq!(check.state, CheckState::Up);
        assert_eq!(check.last_checked, Some(1_700_000_000_000));

        raw.state = Some("sideways".into());
        raw.last_checked = Some(0);
        let check = validate_check(&raw).unwrap();
        assert_eq!(check.state, CheckState::Down);
        assert_eq!(check.last_checked, None);
    }

    #[test]
    fn rejects_each_bad_field() {
        let cases: [(fn(&mut CheckRecord), &str); 11] = [
            (|r| r.id = Some("short".into()), "id"),
            (|r| r.id = None, "id"),
            (|r| r.user_phone = Some("555".into()), "userPhone"),
            (|r| r.user_phone = Some("abcdefghij".into()), "userPhone"),
            (|r| r.protocol = Some("ftp".into()), "protocol"),
            (|r| r.url = Some("   ".into()), "url"),
            (|r| r.method = Some("patch".into()), "method"),
            (|r| r.success_codes = Some(vec![]), "successCodes"),
            (|r| r.success_codes = None, "successCodes"),
            (|r| r.timeout_seconds = Some(0), "timeoutSeconds"),
            (|r| r.timeout_seconds = Some(6), "timeoutSeconds"),
        ];

        for (mutate, field) in cases {
            let mut raw = record();
            mutate(&mut raw);
            let err = validate_check(&raw).unwrap_err();
            let reported = match err {
                ValidationError::Missing(f) | ValidationError::Invalid { field: f, .. } => f,
            };
            assert_eq!(reported, field, "{raw:?}");
        }
    }

    #[test]
    fn timeout_bounds_are_inclusive() {
        assert_eq!(timeout_seconds(Some(1)), Ok(1));
        assert_eq!(timeout_seconds(Some(5)), Ok(5));
    }
}
