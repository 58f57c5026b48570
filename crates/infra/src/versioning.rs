//! Where a snapshot's [`SyncVersion`] comes from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use claimsync_auth::ProfileRecord;
use claimsync_core::{SyncError, SyncVersion};
use claimsync_events::Arrival;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSource {
    /// `updatedAt` (then the arrival clock) ordered by wall time.
    #[default]
    Timestamp,
    /// The profile store's revision counter.
    Revision,
}

impl VersionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionSource::Timestamp => "timestamp",
            VersionSource::Revision => "revision",
        }
    }

    /// Version of `profile` as observed by a trigger that arrived at `arrival`.
    ///
    /// Depends only on the snapshot when it carries its own metadata, so a
    /// fetched and a carried copy of the same snapshot compare equal.
    pub fn candidate_version(
        &self,
        profile: &ProfileRecord,
        arrival: Arrival,
    ) -> Result<SyncVersion, SyncError> {
        match self {
            VersionSource::Revision => profile
                .revision
                .map(SyncVersion::from_revision)
                .ok_or_else(|| {
                    SyncError::permanent(format!(
                        "profile {} has no revision to version by",
                        profile.principal_id
                    ))
                }),
            VersionSource::Timestamp => Ok(match profile.updated_at {
                Some(updated_at) => {
                    SyncVersion::from_timestamp(updated_at, profile.revision.unwrap_or(0))
                }
                None => SyncVersion::from_timestamp(arrival.at, arrival.sequence),
            }),
        }
    }
}

impl fmt::Display for VersionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timestamp" => Ok(VersionSource::Timestamp),
            "revision" => Ok(VersionSource::Revision),
            other => Err(format!("expected `timestamp` or `revision`, got `{other}`")),
        }
    }
}
