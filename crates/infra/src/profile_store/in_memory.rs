use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use claimsync_auth::ProfileRecord;
use claimsync_core::PrincipalId;

use super::ProfileStore;
use crate::faults::InjectedFaults;
use crate::gateway::GatewayError;

/// In-memory profile documents.
///
/// Intended for tests/dev. `put` plays the role of the dashboard editing a
/// profile; it does not emit any trigger by itself.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<PrincipalId, ProfileRecord>>,
    faults: InjectedFaults,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, profile: ProfileRecord) {
        if let Ok(mut profiles) = self.profiles.write() {
            profiles.insert(profile.principal_id.clone(), profile);
        }
    }

    pub fn remove(&self, principal_id: &PrincipalId) {
        if let Ok(mut profiles) = self.profiles.write() {
            profiles.remove(principal_id);
        }
    }

    pub fn faults(&self) -> &InjectedFaults {
        &self.faults
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn fetch(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<ProfileRecord>, GatewayError> {
        self.faults.delay().await;
        self.faults.check("profile fetch")?;

        let profiles = self
            .profiles
            .read()
            .map_err(|_| GatewayError::unavailable("profile store lock poisoned"))?;
        Ok(profiles.get(principal_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(raw: &str) -> PrincipalId {
        PrincipalId::new(raw).unwrap()
    }

    #[tokio::test]
    async fn fetch_returns_latest_put() {
        let store = InMemoryProfileStore::new();
        assert_eq!(store.fetch(&pid("a")).await.unwrap(), None);

        store.put(ProfileRecord::new(pid("a"), "a@x.com").with_role("teacher"));
        store.put(ProfileRecord::new(pid("a"), "a@x.com").with_role("admin"));

        let got = store.fetch(&pid("a")).await.unwrap().unwrap();
        assert_eq!(got.recognized_role(), Some(claimsync_auth::Role::Admin));
        assert_eq!(store.fetch(&pid("b")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn injected_outage_surfaces_as_unavailable() {
        let store = InMemoryProfileStore::new();
        store.faults().set_unavailable(true);
        let err = store.fetch(&pid("a")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }
}
