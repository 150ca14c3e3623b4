//! In-memory store backed by `Arc<RwLock<..>>` maps.
//!
//! Every conditional operation completes under a single write-lock
//! acquisition. Locks are always taken in the order initiations, pairings.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::accounts::Account;
use crate::error::StoreError;
use crate::pairing::secret::secrets_match;
use crate::pairing::{Pairing, PairingInitiation};
use crate::store::{AccountStore, InsertOutcome, PairingStore};

type InitiationKey = (String, String);

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    /// Pending initiations keyed by `(initiator, target)`.
    initiations: Arc<RwLock<HashMap<InitiationKey, PairingInitiation>>>,
    pairings: Arc<RwLock<Vec<Pairing>>>,
    accounts: Arc<RwLock<HashMap<String, Account>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored initiations, stale ones included.
    pub async fn initiation_count(&self) -> usize {
        self.initiations.read().await.len()
    }

    /// Snapshot of all confirmed pairings.
    pub async fn pairings(&self) -> Vec<Pairing> {
        self.pairings.read().await.clone()
    }
}

fn key(initiator: &str, target: &str) -> InitiationKey {
    (initiator.to_string(), target.to_string())
}

#[async_trait]
impl PairingStore for InMemoryStore {
    async fn find_initiation(
        &self,
        initiator: &str,
        target: &str,
        fresh_after: DateTime<Utc>,
    ) -> Result<Option<PairingInitiation>, StoreError> {
        Ok(self
            .initiations
            .read()
            .await
            .get(&key(initiator, target))
            .filter(|i| i.is_live(fresh_after))
            .cloned())
    }

    async fn insert_initiation(
        &self,
        initiation: &PairingInitiation,
        fresh_after: DateTime<Utc>,
    ) -> Result<InsertOutcome, StoreError> {
        let mut initiations = self.initiations.write().await;
        let k = key(&initiation.initiator, &initiation.target);
        if initiations.get(&k).is_some_and(|i| i.is_live(fresh_after)) {
            return Ok(InsertOutcome::Conflict);
        }
        initiations.insert(k, initiation.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn consume_initiation_and_create_pairing(
        &self,
        initiator: &str,
        target: &str,
        secret: &str,
        fresh_after: DateTime<Utc>,
        confirmed_at: DateTime<Utc>,
    ) -> Result<Option<Pairing>, StoreError> {
        let mut initiations = self.initiations.write().await;
        let k = key(initiator, target);
        let matches = initiations
            .get(&k)
            .is_some_and(|i| i.is_live(fresh_after) && secrets_match(&i.secret, secret));
        if !matches {
            return Ok(None);
        }
        initiations.remove(&k);

        let mut pairings = self.pairings.write().await;
        if let Some(existing) = pairings.iter().find(|p| p.connects(initiator, target)) {
            return Ok(Some(existing.clone()));
        }
        let pairing = Pairing {
            confirmer: target.to_string(),
            peer: initiator.to_string(),
            created_at: confirmed_at,
            verified: true,
        };
        pairings.push(pairing.clone());
        Ok(Some(pairing))
    }

    async fn pairing_exists(&self, a: &str, b: &str) -> Result<bool, StoreError> {
        Ok(self.pairings.read().await.iter().any(|p| p.connects(a, b)))
    }

    async fn purge_expired_initiations(
        &self,
        fresh_after: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut initiations = self.initiations.write().await;
        let before = initiations.len();
        initiations.retain(|_, i| i.is_live(fresh_after));
        Ok((before - initiations.len()) as u64)
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn insert_account(&self, account: &Account) -> Result<InsertOutcome, StoreError> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.id) {
            return Ok(InsertOutcome::Conflict);
        }
        accounts.insert(account.id.clone(), account.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn get_account(&self, id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.read().await.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn initiation(
        initiator: &str,
        target: &str,
        secret: &str,
        at: DateTime<Utc>,
    ) -> PairingInitiation {
        PairingInitiation {
            initiator: initiator.into(),
            target: target.into(),
            secret: secret.into(),
            created_at: at,
        }
    }

    fn cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::minutes(2)
    }

    #[tokio::test]
    async fn test_insert_and_find_exact_match() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let outcome = store
            .insert_initiation(&initiation("alice", "bob", "s1", now), cutoff(now))
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);

        let found = store.find_initiation("alice", "bob", cutoff(now)).await.unwrap();
        assert_eq!(found.unwrap().secret, "s1");
        assert!(
            store
                .find_initiation("bob", "alice", cutoff(now))
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .find_initiation("Alice", "bob", cutoff(now))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_duplicate_live_insert_conflicts() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .insert_initiation(&initiation("alice", "bob", "s1", now), cutoff(now))
            .await
            .unwrap();
        let outcome = store
            .insert_initiation(&initiation("alice", "bob", "s2", now), cutoff(now))
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Conflict);

        let found = store.find_initiation("alice", "bob", cutoff(now)).await.unwrap();
        assert_eq!(found.unwrap().secret, "s1");
    }

    #[tokio::test]
    async fn test_stale_initiation_is_replaced() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let old = now - Duration::minutes(10);
        store
            .insert_initiation(&initiation("alice", "bob", "old", old), cutoff(old))
            .await
            .unwrap();
        assert!(
            store
                .find_initiation("alice", "bob", cutoff(now))
                .await
                .unwrap()
                .is_none()
        );

        let outcome = store
            .insert_initiation(&initiation("alice", "bob", "new", now), cutoff(now))
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);
        assert_eq!(store.initiation_count().await, 1);
    }

    #[tokio::test]
    async fn test_consume_requires_matching_secret() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .insert_initiation(&initiation("alice", "bob", "s1", now), cutoff(now))
            .await
            .unwrap();

        let wrong = store
            .consume_initiation_and_create_pairing("alice", "bob", "nope", cutoff(now), now)
            .await
            .unwrap();
        assert!(wrong.is_none());
        assert_eq!(store.initiation_count().await, 1);

        let pairing = store
            .consume_initiation_and_create_pairing("alice", "bob", "s1", cutoff(now), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pairing.confirmer, "bob");
        assert_eq!(pairing.peer, "alice");
        assert!(pairing.verified);
        assert_eq!(store.initiation_count().await, 0);
        assert!(store.pairing_exists("bob", "alice").await.unwrap());

        let again = store
            .consume_initiation_and_create_pairing("alice", "bob", "s1", cutoff(now), now)
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_consume_ignores_stale_initiation() {
        let store = InMemoryStore::new();
        let old = Utc::now() - Duration::minutes(10);
        store
            .insert_initiation(&initiation("alice", "bob", "s1", old), cutoff(old))
            .await
            .unwrap();
        let now = Utc::now();
        let result = store
            .consume_initiation_and_create_pairing("alice", "bob", "s1", cutoff(now), now)
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(store.pairings().await.is_empty());
    }

    #[tokio::test]
    async fn test_crossed_initiations_share_one_pairing() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .insert_initiation(&initiation("alice", "bob", "ab", now), cutoff(now))
            .await
            .unwrap();
        store
            .insert_initiation(&initiation("bob", "alice", "ba", now), cutoff(now))
            .await
            .unwrap();

        let first = store
            .consume_initiation_and_create_pairing("alice", "bob", "ab", cutoff(now), now)
            .await
            .unwrap()
            .unwrap();
        let second = store
            .consume_initiation_and_create_pairing("bob", "alice", "ba", cutoff(now), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(store.pairings().await.len(), 1);
        assert_eq!(store.initiation_count().await, 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let old = now - Duration::minutes(10);
        store
            .insert_initiation(&initiation("alice", "bob", "s1", old), cutoff(old))
            .await
            .unwrap();
        store
            .insert_initiation(&initiation("carol", "dave", "s2", now), cutoff(now))
            .await
            .unwrap();

        let removed = store.purge_expired_initiations(cutoff(now)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.initiation_count().await, 1);
    }

    #[tokio::test]
    async fn test_accounts() {
        let store = InMemoryStore::new();
        let account = Account::new("alice", "alice@example.com", "", 1_700_000_000);
        assert_eq!(
            store.insert_account(&account).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert_account(&account).await.unwrap(),
            InsertOutcome::Conflict
        );
        assert_eq!(store.get_account("alice").await.unwrap(), Some(account));
        assert_eq!(store.get_account("bob").await.unwrap(), None);
    }
}
