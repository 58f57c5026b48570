use std::net::SocketAddr;

use claimsync_infra::{ConfigError, SyncConfig};

pub const BIND_ADDR_VAR: &str = "BIND_ADDR";
pub const PROFILE_DATABASE_URL_VAR: &str = "PROFILE_DATABASE_URL";
pub const IDENTITY_DATABASE_URL_VAR: &str = "IDENTITY_DATABASE_URL";
pub const GUARD_DATABASE_URL_VAR: &str = "GUARD_DATABASE_URL";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Where the three stores live. Identity and guard default to the profile database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseUrls {
    pub profiles: String,
    pub identity: String,
    pub guard: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiSettings {
    pub bind_addr: SocketAddr,
    /// `None` runs every store in memory (development only).
    pub databases: Option<DatabaseUrls>,
    pub sync: SyncConfig,
}

impl ApiSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_addr = lookup(BIND_ADDR_VAR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr.trim().parse().map_err(|e| ConfigError::Invalid {
            var: BIND_ADDR_VAR,
            reason: format!("`{raw_addr}`: {e}"),
        })?;

        let non_empty = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let databases = match non_empty(PROFILE_DATABASE_URL_VAR) {
            None => {
                if non_empty(IDENTITY_DATABASE_URL_VAR).is_some()
                    || non_empty(GUARD_DATABASE_URL_VAR).is_some()
                {
                    return Err(ConfigError::Invalid {
                        var: PROFILE_DATABASE_URL_VAR,
                        reason: "required when any other database URL is set".to_string(),
                    });
                }
                None
            }
            Some(profiles) => Some(DatabaseUrls {
                identity: non_empty(IDENTITY_DATABASE_URL_VAR).unwrap_or_else(|| profiles.clone()),
                guard: non_empty(GUARD_DATABASE_URL_VAR).unwrap_or_else(|| profiles.clone()),
                profiles,
            }),
        };

        Ok(Self {
            bind_addr,
            databases,
            sync: SyncConfig::from_lookup(&lookup)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn defaults_to_in_memory_on_8080() {
        let settings = ApiSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(settings.databases, None);
        assert_eq!(settings.sync, SyncConfig::default());
    }

    #[test]
    fn other_databases_default_to_profile_url() {
        let settings = ApiSettings::from_lookup(lookup(&[
            (PROFILE_DATABASE_URL_VAR, "postgres://p"),
            (GUARD_DATABASE_URL_VAR, "postgres://g"),
        ]))
        .unwrap();
        assert_eq!(
            settings.databases,
            Some(DatabaseUrls {
                profiles: "postgres://p".to_string(),
                identity: "postgres://p".to_string(),
                guard: "postgres://g".to_string(),
            })
        );
    }

    #[test]
    fn identity_url_alone_is_rejected() {
        let err = ApiSettings::from_lookup(lookup(&[(IDENTITY_DATABASE_URL_VAR, "postgres://i")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: PROFILE_DATABASE_URL_VAR, .. }));
    }

    #[test]
    fn bad_bind_addr_is_rejected() {
        let err = ApiSettings::from_lookup(lookup(&[(BIND_ADDR_VAR, "everywhere")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: BIND_ADDR_VAR, .. }));
    }
}
