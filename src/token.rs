use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// The persisted credential record, stored verbatim as returned by the token
/// endpoint. Issuer fields the crate does not know about are retained in
/// `extra` so a round trip through storage loses nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Expiry instant as an absolute Unix timestamp in seconds. Issuers vary
    /// in how they populate this field; this crate compares it against the
    /// current clock as-is. Absent means the token never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Space-delimited list of granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            expires_in: None,
            refresh_token: None,
            scope: None,
            extra: HashMap::new(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_seconds())
    }

    /// A token with no expiry is never expired, no matter the clock.
    pub fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_in {
            Some(expires) => expires <= now,
            None => false,
        }
    }

    /// True iff every requested scope appears in the granted scope list.
    /// A token without a `scope` field grants nothing.
    pub fn grants(&self, scopes: &[&str]) -> bool {
        let granted: Vec<&str> = self
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default();
        scopes.iter().all(|scope| granted.contains(scope))
    }
}

pub(crate) fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::{OAuthToken, now_seconds};

    #[test]
    fn token_without_expiry_never_expires() {
        let token = OAuthToken::new("t");
        assert!(!token.is_expired_at(0));
        assert!(!token.is_expired_at(u64::MAX));
    }

    #[test]
    fn token_expiry_compares_against_now() {
        let mut token = OAuthToken::new("t");
        token.expires_in = Some(1_000);
        assert!(token.is_expired_at(1_000));
        assert!(token.is_expired_at(2_000));
        assert!(!token.is_expired_at(999));
        token.expires_in = Some(now_seconds() + 3_600);
        assert!(!token.is_expired());
    }

    #[test]
    fn grants_requires_every_scope() {
        let mut token = OAuthToken::new("t");
        token.scope = Some("read write".to_string());
        assert!(token.grants(&["read"]));
        assert!(token.grants(&["read", "write"]));
        assert!(!token.grants(&["read", "write", "admin"]));
        assert!(token.grants(&[]));
    }

    #[test]
    fn token_without_scope_grants_nothing() {
        let token = OAuthToken::new("t");
        assert!(!token.grants(&["read"]));
        assert!(token.grants(&[]));
    }

    #[test]
    fn unknown_issuer_fields_survive_a_round_trip() {
        let json = r#"{"access_token":"t","token_type":"Bearer","id_token":"x.y.z"}"#;
        let token: OAuthToken = serde_json::from_str(json).unwrap();
        assert_eq!(token.extra.get("id_token").unwrap(), "x.y.z");
        let back = serde_json::to_string(&token).unwrap();
        let reparsed: OAuthToken = serde_json::from_str(&back).unwrap();
        assert_eq!(token, reparsed);
    }
}
