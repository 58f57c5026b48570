use serde::{Deserialize, Serialize};

use claimsync_auth::ProfileRecord;
use claimsync_core::PrincipalId;

use crate::Event;

/// The identity provider created a principal.
///
/// Carries no profile: the profile may not exist yet, or may already have been
/// updated several times by the time this is handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalCreated {
    pub principal_id: PrincipalId,
}

/// The profile store wrote a profile document (create or update).
///
/// `after` is the snapshot as written; it is used as-is, never re-fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdated {
    pub principal_id: PrincipalId,
    #[serde(default)]
    pub before: Option<ProfileRecord>,
    pub after: ProfileRecord,
}

impl PrincipalCreated {
    pub const EVENT_TYPE: &'static str = "identity.principal.created";
}

impl ProfileUpdated {
    pub const EVENT_TYPE: &'static str = "profile.updated";
}

/// Every trigger the sync core reacts to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncTrigger {
    PrincipalCreated(PrincipalCreated),
    ProfileUpdated(ProfileUpdated),
}

impl Event for SyncTrigger {
    fn event_type(&self) -> &'static str {
        match self {
            SyncTrigger::PrincipalCreated(_) => PrincipalCreated::EVENT_TYPE,
            SyncTrigger::ProfileUpdated(_) => ProfileUpdated::EVENT_TYPE,
        }
    }

    fn principal_id(&self) -> &PrincipalId {
        match self {
            SyncTrigger::PrincipalCreated(e) => &e.principal_id,
            SyncTrigger::ProfileUpdated(e) => &e.principal_id,
        }
    }
}

impl From<PrincipalCreated> for SyncTrigger {
    fn from(value: PrincipalCreated) -> Self {
        SyncTrigger::PrincipalCreated(value)
    }
}

impl From<ProfileUpdated> for SyncTrigger {
    fn from(value: ProfileUpdated) -> Self {
        SyncTrigger::ProfileUpdated(value)
    }
}
