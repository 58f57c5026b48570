use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use claimsync_auth::ClaimsSet;
use claimsync_core::PrincipalId;

use super::IdentityClaimsWriter;
use crate::faults::InjectedFaults;
use crate::gateway::GatewayError;

#[derive(Debug, Default)]
struct IdentityRecord {
    claims: Option<ClaimsSet>,
    writes: u64,
}

/// In-memory identity provider.
///
/// Intended for tests/dev. Injected failures strike after the new claims are
/// staged and before they are committed, which is exactly the window where a
/// field-by-field writer would leave a half-applied set behind.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    records: RwLock<HashMap<PrincipalId, IdentityRecord>>,
    auto_register: bool,
    faults: InjectedFaults,
}

impl InMemoryIdentityStore {
    /// Strict store: only registered principals accept claims.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dev store: unknown principals are created on first write.
    pub fn permissive() -> Self {
        Self {
            auto_register: true,
            ..Self::default()
        }
    }

    pub fn register(&self, principal_id: PrincipalId) {
        if let Ok(mut records) = self.records.write() {
            records.entry(principal_id).or_default();
        }
    }

    /// Claims currently attached to the principal.
    pub fn claims(&self, principal_id: &PrincipalId) -> Option<ClaimsSet> {
        let records = self.records.read().ok()?;
        records.get(principal_id).and_then(|r| r.claims.clone())
    }

    /// Number of committed writes for the principal.
    pub fn write_count(&self, principal_id: &PrincipalId) -> u64 {
        self.records
            .read()
            .ok()
            .and_then(|records| records.get(principal_id).map(|r| r.writes))
            .unwrap_or(0)
    }

    pub fn faults(&self) -> &InjectedFaults {
        &self.faults
    }
}

#[async_trait]
impl IdentityClaimsWriter for InMemoryIdentityStore {
    async fn set_claims(
        &self,
        principal_id: &PrincipalId,
        claims: &ClaimsSet,
    ) -> Result<(), GatewayError> {
        self.faults.delay().await;

        let staged = claims.clone();

        let mut records = self
            .records
            .write()
            .map_err(|_| GatewayError::unavailable("identity store lock poisoned"))?;

        if !records.contains_key(principal_id) {
            if !self.auto_register {
                return Err(GatewayError::rejected(format!("unknown principal {principal_id}")));
            }
            records.insert(principal_id.clone(), IdentityRecord::default());
        }

        self.faults.check("claims write")?;

        if let Some(record) = records.get_mut(principal_id) {
            record.claims = Some(staged);
            record.writes += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimsync_auth::Role;

    fn pid() -> PrincipalId {
        PrincipalId::new("uid-1").unwrap()
    }

    fn claims(role: Role, name: &str) -> ClaimsSet {
        ClaimsSet {
            role,
            email: "a@x.com".to_string(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn unknown_principal_is_rejected() {
        let store = InMemoryIdentityStore::new();
        let err = store
            .set_claims(&pid(), &claims(Role::Admin, "A"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
        assert_eq!(store.claims(&pid()), None);
    }

    #[tokio::test]
    async fn writes_replace_the_whole_set() {
        let store = InMemoryIdentityStore::new();
        store.register(pid());

        store.set_claims(&pid(), &claims(Role::Teacher, "A")).await.unwrap();
        store.set_claims(&pid(), &claims(Role::Admin, "")).await.unwrap();

        // The cleared name does not survive from the first write.
        assert_eq!(store.claims(&pid()), Some(claims(Role::Admin, "")));
        assert_eq!(store.write_count(&pid()), 2);
    }

    #[tokio::test]
    async fn failed_write_leaves_previous_claims_untouched() {
        let store = InMemoryIdentityStore::new();
        store.register(pid());
        store.set_claims(&pid(), &claims(Role::Teacher, "A")).await.unwrap();

        store.faults().fail_next(1);
        let res = store.set_claims(&pid(), &claims(Role::Admin, "B")).await;

        assert!(res.is_err());
        assert_eq!(store.claims(&pid()), Some(claims(Role::Teacher, "A")));
        assert_eq!(store.write_count(&pid()), 1);
    }

    #[tokio::test]
    async fn permissive_store_registers_on_first_write() {
        let store = InMemoryIdentityStore::permissive();
        store.set_claims(&pid(), &claims(Role::Student, "A")).await.unwrap();
        assert_eq!(store.claims(&pid()), Some(claims(Role::Student, "A")));
    }
}
