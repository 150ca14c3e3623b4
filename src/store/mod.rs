//! Persistence for pairing and account records.
//!
//! The pairing engine and account service only see the traits defined here.
//! Two backends implement them:
//! - [`InMemoryStore`]: process-local, for tests and single-instance runs
//! - `PgStore` (feature `postgres`): PostgreSQL via `deadpool-postgres`
//!
//! Conditional writes are single atomic operations in every backend. The
//! consume-once guarantee of `FinishPair` relies on that, not on any lock
//! held by the caller.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::accounts::Account;
use crate::error::StoreError;
use crate::pairing::{Pairing, PairingInitiation};

pub use memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

/// Result of a conditional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A live record with the same key already exists.
    Conflict,
}

/// Storage for initiations and confirmed pairings.
///
/// `fresh_after` is the expiry cutoff: initiations created at or before it
/// are stale and behave as if absent.
#[async_trait]
pub trait PairingStore: Send + Sync {
    /// Exact-match lookup of the live initiation for `(initiator, target)`.
    async fn find_initiation(
        &self,
        initiator: &str,
        target: &str,
        fresh_after: DateTime<Utc>,
    ) -> Result<Option<PairingInitiation>, StoreError>;

    /// Insert an initiation unless a live one exists for the same ordered
    /// pair. A stale record for the pair is replaced.
    async fn insert_initiation(
        &self,
        initiation: &PairingInitiation,
        fresh_after: DateTime<Utc>,
    ) -> Result<InsertOutcome, StoreError>;

    /// Atomically delete the live initiation matching `(initiator, target,
    /// secret)` and record the confirmed pairing, with `target` as confirmer.
    ///
    /// Returns `None` when nothing matched. If the two identities were
    /// already paired through a crossed initiation, the initiation is still
    /// consumed and the existing pairing is returned.
    async fn consume_initiation_and_create_pairing(
        &self,
        initiator: &str,
        target: &str,
        secret: &str,
        fresh_after: DateTime<Utc>,
        confirmed_at: DateTime<Utc>,
    ) -> Result<Option<Pairing>, StoreError>;

    /// Whether `a` and `b` are paired, in either direction.
    async fn pairing_exists(&self, a: &str, b: &str) -> Result<bool, StoreError>;

    /// Delete every stale initiation. Returns how many were removed.
    async fn purge_expired_initiations(
        &self,
        fresh_after: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

/// Storage for account records.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert an account unless one with the same id exists.
    async fn insert_account(&self, account: &Account) -> Result<InsertOutcome, StoreError>;

    async fn get_account(&self, id: &str) -> Result<Option<Account>, StoreError>;
}
