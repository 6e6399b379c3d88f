//! Model names and the stored record shape.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::StoreError;

/// Opaque structured document owned by the authorization engine.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Payload field linking a record to its authorization grant.
pub const GRANT_ID_FIELD: &str = "grantId";
/// Payload field holding the human-entered device flow code.
pub const USER_CODE_FIELD: &str = "userCode";
/// Payload field correlating a browser session.
pub const UID_FIELD: &str = "uid";
/// Payload field stamped by `consume`.
pub const CONSUMED_FIELD: &str = "consumed";

// =============================================================================
// Model Names
// =============================================================================

/// Kind of artifact the authorization engine persists.
///
/// Each model maps to its own collection; the model also decides which
/// secondary indexes apply (see [`crate::index::indexes_for`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelName {
    Session,
    AccessToken,
    AuthorizationCode,
    RefreshToken,
    DeviceCode,
    ClientCredentials,
    Client,
    InitialAccessToken,
    RegistrationAccessToken,
    Interaction,
    ReplayDetection,
    PushedAuthorizationRequest,
    Grant,
    BackchannelAuthenticationRequest,
}

impl ModelName {
    /// Every model the engine may ask for.
    pub const ALL: [ModelName; 14] = [
        Self::Session,
        Self::AccessToken,
        Self::AuthorizationCode,
        Self::RefreshToken,
        Self::DeviceCode,
        Self::ClientCredentials,
        Self::Client,
        Self::InitialAccessToken,
        Self::RegistrationAccessToken,
        Self::Interaction,
        Self::ReplayDetection,
        Self::PushedAuthorizationRequest,
        Self::Grant,
        Self::BackchannelAuthenticationRequest,
    ];

    /// Collection (table) name used by the backing store.
    #[must_use]
    pub fn collection(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::AccessToken => "access_token",
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::DeviceCode => "device_code",
            Self::ClientCredentials => "client_credentials",
            Self::Client => "client",
            Self::InitialAccessToken => "initial_access_token",
            Self::RegistrationAccessToken => "registration_access_token",
            Self::Interaction => "interaction",
            Self::ReplayDetection => "replay_detection",
            Self::PushedAuthorizationRequest => "pushed_authorization_request",
            Self::Grant => "grant",
            Self::BackchannelAuthenticationRequest => "backchannel_authentication_request",
        }
    }

    /// Name the authorization engine uses for this model.
    #[must_use]
    pub fn engine_name(self) -> &'static str {
        match self {
            Self::Session => "Session",
            Self::AccessToken => "AccessToken",
            Self::AuthorizationCode => "AuthorizationCode",
            Self::RefreshToken => "RefreshToken",
            Self::DeviceCode => "DeviceCode",
            Self::ClientCredentials => "ClientCredentials",
            Self::Client => "Client",
            Self::InitialAccessToken => "InitialAccessToken",
            Self::RegistrationAccessToken => "RegistrationAccessToken",
            Self::Interaction => "Interaction",
            Self::ReplayDetection => "ReplayDetection",
            Self::PushedAuthorizationRequest => "PushedAuthorizationRequest",
            Self::Grant => "Grant",
            Self::BackchannelAuthenticationRequest => "BackchannelAuthenticationRequest",
        }
    }

    /// Returns `true` if records of this model can be bulk-revoked by grant id.
    #[must_use]
    pub fn is_grantable(self) -> bool {
        matches!(
            self,
            Self::AccessToken
                | Self::AuthorizationCode
                | Self::RefreshToken
                | Self::DeviceCode
                | Self::BackchannelAuthenticationRequest
        )
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

impl FromStr for ModelName {
    type Err = StoreError;

    /// Accepts both the engine form (`AccessToken`) and the collection form (`access_token`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.engine_name() == s || m.collection() == s)
            .ok_or_else(|| StoreError::invalid_input(format!("unknown model name '{s}'")))
    }
}

// =============================================================================
// Stored Record
// =============================================================================

/// A single persisted artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Primary key, unique within the model's collection.
    pub id: String,
    /// Model-specific document.
    pub payload: Payload,
    /// When set, the record is invisible once this instant has passed.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl StoredRecord {
    /// Create a record, deriving `expires_at` from a TTL in seconds.
    ///
    /// A TTL of zero (or none) yields a record without expiry.
    #[must_use]
    pub fn new(id: impl Into<String>, payload: Payload, ttl_seconds: Option<u64>) -> Self {
        Self {
            id: id.into(),
            payload,
            expires_at: expires_at_from_ttl(OffsetDateTime::now_utc(), ttl_seconds),
        }
    }

    /// Returns `true` if the record's expiry has elapsed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// String value of a top-level payload field, if present.
    #[must_use]
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(serde_json::Value::as_str)
    }
}

/// Text form of a top-level payload field, as SQL `payload->>'field'` yields it.
///
/// Strings compare by content, other scalars by their JSON text; `null` and
/// absent fields have no value and never collide on a unique index.
#[must_use]
pub fn payload_text(payload: &Payload, field: &str) -> Option<String> {
    match payload.get(field)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Compute the absolute expiry for a TTL relative to `now`.
#[must_use]
pub fn expires_at_from_ttl(now: OffsetDateTime, ttl_seconds: Option<u64>) -> Option<OffsetDateTime> {
    match ttl_seconds {
        Some(secs) if secs > 0 => {
            let secs = i64::try_from(secs).unwrap_or(i64::MAX);
            Some(now.saturating_add(time::Duration::seconds(secs)))
        }
        _ => None,
    }
}

/// Consumption stamp: whole Unix seconds.
#[must_use]
pub fn consumed_stamp(now: OffsetDateTime) -> i64 {
    now.unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_model_name_parse_both_forms() {
        assert_eq!(
            "AccessToken".parse::<ModelName>().unwrap(),
            ModelName::AccessToken
        );
        assert_eq!(
            "device_code".parse::<ModelName>().unwrap(),
            ModelName::DeviceCode
        );
        assert!("Nope".parse::<ModelName>().unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_grantable_set() {
        let grantable: Vec<_> = ModelName::ALL
            .into_iter()
            .filter(|m| m.is_grantable())
            .collect();
        assert_eq!(
            grantable,
            vec![
                ModelName::AccessToken,
                ModelName::AuthorizationCode,
                ModelName::RefreshToken,
                ModelName::DeviceCode,
                ModelName::BackchannelAuthenticationRequest,
            ]
        );
    }

    #[test]
    fn test_expires_at_from_ttl() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(expires_at_from_ttl(now, None), None);
        assert_eq!(expires_at_from_ttl(now, Some(0)), None);
        assert_eq!(
            expires_at_from_ttl(now, Some(3600)),
            Some(OffsetDateTime::from_unix_timestamp(1_700_003_600).unwrap())
        );
    }

    #[test]
    fn test_payload_text_matches_text_extraction() {
        let p = json!({"uid": "u-1", "n": 7, "nil": null})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(payload_text(&p, "uid").as_deref(), Some("u-1"));
        assert_eq!(payload_text(&p, "n").as_deref(), Some("7"));
        assert_eq!(payload_text(&p, "nil"), None);
        assert_eq!(payload_text(&p, "missing"), None);
    }

    #[test]
    fn test_record_expiry_and_fields() {
        let payload = json!({"grantId": "g1", "uid": 7}).as_object().cloned().unwrap();
        let mut record = StoredRecord::new("tok1", payload, Some(60));
        let now = OffsetDateTime::now_utc();
        assert!(!record.is_expired_at(now));
        assert!(record.is_expired_at(now + time::Duration::seconds(61)));
        assert_eq!(record.payload_str(GRANT_ID_FIELD), Some("g1"));
        assert_eq!(record.payload_str(UID_FIELD), None);

        record.expires_at = None;
        assert!(!record.is_expired_at(now + time::Duration::days(365)));
    }
}
