use serde::{Deserialize, Serialize};

use crate::{ProfileRecord, Role};

/// Authorization claims attached to a principal's identity record.
///
/// Always written as one whole value. Never merge a `ClaimsSet` into existing
/// claims field by field: a field cleared in a newer profile must not survive
/// from an older one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ClaimsSet {
    pub role: Role,
    /// Display only; never used for authorization decisions.
    pub email: String,
    pub name: String,
}

/// Derive the canonical claims for a profile snapshot.
///
/// Pure and total. Unknown or missing roles resolve to [`Role::Student`].
pub fn resolve_claims(profile: &ProfileRecord) -> ClaimsSet {
    ClaimsSet {
        role: profile.recognized_role().unwrap_or_default(),
        email: profile.email.clone(),
        name: profile
            .display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or_default()
            .to_string(),
    }
}
