use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use claimsync_core::PrincipalId;

use crate::Role;

/// Profile document as held by the profile store.
///
/// Only the fields claims are derived from are modelled, plus the store's
/// optional revision metadata. Documents are edited outside this core and may
/// carry anything: `role` is kept raw, and a `displayName` or `email` that is
/// not a string reads as absent rather than failing the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub principal_id: PrincipalId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<JsonValue>,

    #[serde(default, deserialize_with = "string_or_none", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, deserialize_with = "string_or_empty")]
    pub email: String,

    /// Store-assigned revision, bumped on every write (if the store has one).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,

    /// Store-assigned last-modified time (if the store has one).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProfileRecord {
    pub fn new(principal_id: PrincipalId, email: impl Into<String>) -> Self {
        Self {
            principal_id,
            role: None,
            display_name: None,
            email: email.into(),
            revision: None,
            updated_at: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(JsonValue::String(role.into()));
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }

    /// The recognized role, if the raw field holds one.
    pub fn recognized_role(&self) -> Option<Role> {
        match &self.role {
            Some(JsonValue::String(raw)) => Role::normalize(raw),
            _ => None,
        }
    }
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => Some(s),
        _ => None,
    })
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(string_or_none(deserializer)?.unwrap_or_default())
}
