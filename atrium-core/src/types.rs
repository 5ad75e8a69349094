//! Core data type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Authenticated user record as delivered by the account service.
///
/// Only `id` is guaranteed to be present. Every other field defaults so
/// that the trimmed snapshot carried in the `user` cookie deserializes
/// into the same type as a full `/auth/me` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// Linked employee record, present for staff accounts.
    #[serde(default)]
    pub employee: Option<EmployeeSummary>,
    #[serde(default)]
    pub role: Option<Role>,
    /// Flat permission names. Cookie snapshots and older payloads carry
    /// the user's permissions here instead of under the role.
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub preferences: Vec<Preference>,
    /// Set while the account is still on its issued starter password.
    #[serde(default)]
    pub is_first_password: bool,
}

impl User {
    /// Display name for logs and notices.
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.email.clone()
        } else {
            name.to_string()
        }
    }

    pub fn role_name(&self) -> Option<&str> {
        self.role.as_ref().map(|r| r.name.as_str())
    }
}

/// Slim employee projection attached to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeSummary {
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub designation: Option<String>,
}

/// Role attached to a user, with whatever permission shape the backend
/// chose to send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub permissions: Option<PermissionList>,
}

/// Role permissions arrive in one of two shapes depending on the
/// endpoint: denormalized grant rows from the ORM, or already-flattened
/// permission names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionList {
    /// Join rows: `[{"permission": {"name": "city.create"}}, ...]`
    Granted(Vec<PermissionGrant>),
    /// Flattened: `["city.create", ...]`
    Named(Vec<String>),
}

impl PermissionList {
    pub fn is_empty(&self) -> bool {
        match self {
            PermissionList::Granted(grants) => grants.is_empty(),
            PermissionList::Named(names) => names.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PermissionList::Granted(grants) => grants.len(),
            PermissionList::Named(names) => names.len(),
        }
    }

    /// Permission names regardless of the wire shape.
    pub fn names(&self) -> Vec<&str> {
        match self {
            PermissionList::Granted(grants) => grants
                .iter()
                .map(|g| g.permission.name.as_str())
                .collect(),
            PermissionList::Named(names) => names.iter().map(|n| n.as_str()).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        match self {
            PermissionList::Granted(grants) => {
                grants.iter().any(|g| g.permission.name == name)
            }
            PermissionList::Named(names) => names.iter().any(|n| n == name),
        }
    }
}

/// One granted permission row as serialized by the backend ORM.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    pub permission: PermissionRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRef {
    pub name: String,
}

/// Per-user UI preference. Values are stored JSON-encoded on the server,
/// so `value` is the raw encoded string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preference {
    pub key: String,
    pub value: String,
}

impl Preference {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Decode the stored value. Values that were never JSON-encoded come
    /// back as plain strings instead of an error.
    pub fn decoded_value(&self) -> serde_json::Value {
        decode_preference_value(&self.value)
    }
}

/// Decode a JSON-encoded preference value, falling back to the raw
/// string for values that predate encoding.
pub fn decode_preference_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// Envelope returned by `GET /auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub data: Option<User>,
}

/// Where the session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No user loaded and no evidence one was ever signed in.
    Unauthenticated,
    /// A user is loaded and believed current.
    Authenticated,
    /// A user was signed in but the backend no longer honors the session.
    Expired,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Unauthenticated => write!(f, "unauthenticated"),
            SessionState::Authenticated => write!(f, "authenticated"),
            SessionState::Expired => write!(f, "expired"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtriumConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionTuning,
}

/// Backend endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the backend API, e.g. `http://localhost:3000/api`.
    pub base_url: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

/// Session maintenance knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTuning {
    /// Seconds between periodic session validity checks.
    pub check_interval_secs: u64,
    /// Random offset applied to the check schedule so a fleet of
    /// clients does not stampede the backend in lockstep.
    pub check_jitter_secs: u64,
    /// Seconds between stall warnings while hydration blocks readiness.
    /// Zero disables the warning.
    pub gate_warn_secs: u64,
    /// Write the signed-in user to disk so the next start can render
    /// something before the first `/auth/me` round trip completes.
    pub persist_snapshot: bool,
    pub snapshot_dir: Option<PathBuf>,
}
