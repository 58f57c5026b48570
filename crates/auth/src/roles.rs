use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role carried in a principal's authorization claims.
///
/// `Student` is the least-privileged role and the fallback for anything that
/// does not parse.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Teacher,
    Admin,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role: {0:?}")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ALL: [Role; 3] = [Role::Student, Role::Teacher, Role::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    /// Parse after trimming and ASCII-lowercasing, so `" Teacher "` is a teacher.
    pub fn normalize(raw: &str) -> Option<Role> {
        let normalized = raw.trim().to_ascii_lowercase();
        Role::ALL.into_iter().find(|r| r.as_str() == normalized)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::normalize(s).ok_or_else(|| UnknownRole(s.to_string()))
    }
}
