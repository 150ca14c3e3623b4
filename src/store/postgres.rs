//! PostgreSQL store.
//!
//! Tables (see `migrations/`):
//! - `pair_initiations`: pending initiations, primary key `(initiator, target)`
//! - `pairings`: confirmed pairings, unique per unordered identity pair
//! - `accounts`: account records
//!
//! Each trait method is one SQL statement, so a call that is cancelled by
//! the request deadline either fully happened or did not happen at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Pool, PoolConfig, Runtime};
use tokio_postgres::{NoTls, Row};

use crate::accounts::Account;
use crate::error::StoreError;
use crate::pairing::{Pairing, PairingInitiation};
use crate::store::{AccountStore, InsertOutcome, PairingStore};

mod embedded {
    refinery::embed_migrations!("migrations");
}

/// PostgreSQL-backed store sharing one connection pool across all calls.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Wrap an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a pool for `url` and verify that a connection can be opened.
    pub async fn connect(url: &str, pool_size: usize) -> Result<Self, StoreError> {
        let mut config = deadpool_postgres::Config::new();
        config.url = Some(url.to_string());
        config.pool = Some(PoolConfig::new(pool_size));
        let pool = config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        let store = Self { pool };
        store.conn().await?;
        Ok(store)
    }

    /// Apply pending schema migrations.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        let mut client = self.conn().await?;
        let report = embedded::migrations::runner()
            .run_async(&mut **client)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        tracing::info!(
            applied = report.applied_migrations().len(),
            "Database migrations complete"
        );
        Ok(())
    }

    async fn conn(&self) -> Result<deadpool_postgres::Object, StoreError> {
        Ok(self.pool.get().await?)
    }
}

fn row_to_initiation(row: &Row) -> PairingInitiation {
    PairingInitiation {
        initiator: row.get("initiator"),
        target: row.get("target"),
        secret: row.get("secret"),
        created_at: row.get("created_at"),
    }
}

fn row_to_pairing(row: &Row) -> Pairing {
    Pairing {
        confirmer: row.get("confirmer"),
        peer: row.get("peer"),
        created_at: row.get("created_at"),
        verified: row.get("verified"),
    }
}

fn row_to_account(row: &Row) -> Account {
    Account {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        created: row.get("created"),
        pic: row.get("pic"),
        points: row.get("points"),
        peers: row.get("peers"),
    }
}

#[async_trait]
impl PairingStore for PgStore {
    async fn find_initiation(
        &self,
        initiator: &str,
        target: &str,
        fresh_after: DateTime<Utc>,
    ) -> Result<Option<PairingInitiation>, StoreError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                r#"
                SELECT initiator, target, secret, created_at
                FROM pair_initiations
                WHERE initiator = $1 AND target = $2 AND created_at > $3
                "#,
                &[&initiator, &target, &fresh_after],
            )
            .await?;
        Ok(row.as_ref().map(row_to_initiation))
    }

    async fn insert_initiation(
        &self,
        initiation: &PairingInitiation,
        fresh_after: DateTime<Utc>,
    ) -> Result<InsertOutcome, StoreError> {
        let conn = self.conn().await?;
        // A stale row for the pair is overwritten; a live one is left alone
        // and reported as a conflict.
        let affected = conn
            .execute(
                r#"
                INSERT INTO pair_initiations (initiator, target, secret, created_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (initiator, target) DO UPDATE
                    SET secret = EXCLUDED.secret, created_at = EXCLUDED.created_at
                    WHERE pair_initiations.created_at <= $5
                "#,
                &[
                    &initiation.initiator,
                    &initiation.target,
                    &initiation.secret,
                    &initiation.created_at,
                    &fresh_after,
                ],
            )
            .await?;
        Ok(if affected == 0 {
            InsertOutcome::Conflict
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn consume_initiation_and_create_pairing(
        &self,
        initiator: &str,
        target: &str,
        secret: &str,
        fresh_after: DateTime<Utc>,
        confirmed_at: DateTime<Utc>,
    ) -> Result<Option<Pairing>, StoreError> {
        let conn = self.conn().await?;
        // Delete and insert in one statement: two concurrent finishers race
        // on the DELETE row lock and only one of them sees `consumed` rows.
        let row = conn
            .query_opt(
                r#"
                WITH consumed AS (
                    DELETE FROM pair_initiations
                    WHERE initiator = $1 AND target = $2 AND secret = $3 AND created_at > $4
                    RETURNING initiator, target
                ),
                inserted AS (
                    INSERT INTO pairings (confirmer, peer, created_at, verified)
                    SELECT target, initiator, $5::timestamptz, TRUE FROM consumed
                    ON CONFLICT DO NOTHING
                    RETURNING confirmer, peer, created_at, verified
                )
                SELECT confirmer, peer, created_at, verified FROM inserted
                UNION ALL
                SELECT p.confirmer, p.peer, p.created_at, p.verified
                FROM pairings p, consumed c
                WHERE LEAST(p.confirmer, p.peer) = LEAST(c.initiator, c.target)
                  AND GREATEST(p.confirmer, p.peer) = GREATEST(c.initiator, c.target)
                  AND NOT EXISTS (SELECT 1 FROM inserted)
                LIMIT 1
                "#,
                &[&initiator, &target, &secret, &fresh_after, &confirmed_at],
            )
            .await?;
        Ok(row.as_ref().map(row_to_pairing))
    }

    async fn pairing_exists(&self, a: &str, b: &str) -> Result<bool, StoreError> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM pairings
                    WHERE (confirmer = $1 AND peer = $2) OR (confirmer = $2 AND peer = $1)
                ) AS paired
                "#,
                &[&a, &b],
            )
            .await?;
        Ok(row.get("paired"))
    }

    async fn purge_expired_initiations(
        &self,
        fresh_after: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let conn = self.conn().await?;
        let removed = conn
            .execute(
                "DELETE FROM pair_initiations WHERE created_at <= $1",
                &[&fresh_after],
            )
            .await?;
        Ok(removed)
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn insert_account(&self, account: &Account) -> Result<InsertOutcome, StoreError> {
        let conn = self.conn().await?;
        let affected = conn
            .execute(
                r#"
                INSERT INTO accounts (id, email, username, created, pic, points, peers)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO NOTHING
                "#,
                &[
                    &account.id,
                    &account.email,
                    &account.username,
                    &account.created,
                    &account.pic,
                    &account.points,
                    &account.peers,
                ],
            )
            .await?;
        Ok(if affected == 0 {
            InsertOutcome::Conflict
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn get_account(&self, id: &str) -> Result<Option<Account>, StoreError> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                r#"
                SELECT id, email, username, created, pic, points, peers
                FROM accounts WHERE id = $1
                "#,
                &[&id],
            )
            .await?;
        Ok(row.as_ref().map(row_to_account))
    }
}
