use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::repository::{Collection, Record};

/// A check exactly as persisted.
///
/// Fields are optional because records are written by other processes and are
/// only trusted after [`crate::monitoring::validation::validate_check`]. Keys
/// this service does not know about are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_codes: Option<Vec<u16>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Epoch milliseconds of the last evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for CheckRecord {
    const COLLECTION: Collection = Collection::Checks;
}

/// A registered user, keyed by phone number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub phone: String,
    #[serde(default)]
    pub tos_agreement: bool,
    #[serde(default)]
    pub checks: Vec<String>,
    /// Fields owned by the account API (e.g. the password hash).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserRecord {
    /// Fields never printed by the admin tooling.
    pub const SECRET_FIELDS: [&'static str; 1] = ["hashedPassword"];

    pub fn without_secrets(&self) -> Self {
        let mut user = self.clone();
        for field in Self::SECRET_FIELDS {
            user.extra.remove(field);
        }
        user
    }
}

impl Record for UserRecord {
    const COLLECTION: Collection = Collection::Users;
}

/// A session token; only its expiry matters to this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phone: String,
    /// Epoch milliseconds after which the token is dead.
    pub expires: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenRecord {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires < now_ms
    }
}

impl Record for TokenRecord {
    const COLLECTION: Collection = Collection::Tokens;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn check_record_keeps_unknown_fields() {
        let raw = json!({
            "id": "abcdefghij0123456789",
            "userPhone": "5551234567",
            "protocol": "https",
            "url": "example.com/health",
            "method": "get",
            "successCodes": [200, 204],
            "timeoutSeconds": 3,
            "label": "homepage"
        });

        let record: CheckRecord = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(record.success_codes, Some(vec![200, 204]));
        assert_eq!(record.state, None);
        assert_eq!(record.last_checked, None);
        assert_eq!(serde_json::to_value(&record).unwrap(), raw);
    }

    #[test]
    fn user_secrets_are_stripped() {
        let user: UserRecord = serde_json::from_value(json!({
            "firstName": "Ada",
            "lastName": "Lovelace",
            "phone": "5551234567",
            "tosAgreement": true,
            "hashedPassword": "deadbeef",
            "checks": ["abcdefghij0123456789"]
        }))
        .unwrap();

        let public = user.without_secrets();
        assert!(user.extra.contains_key("hashedPassword"));
        assert!(!public.extra.contains_key("hashedPassword"));
        assert_eq!(public.checks.len(), 1);
    }

    #[test]
    fn token_expiry() {
        let token = TokenRecord {
            id: "t".repeat(20),
            phone: "5551234567".into(),
            expires: 1_000,
            extra: Map::new(),
        };
        assert!(token.is_expired(1_001));
        assert!(!token.is_expired(1_000));
        assert!(!token.is_expired(999));
    }
}
