//! Two-phase pairing handshake.
//!
//! ```text
//!   NONE ──StartPair(A→B)──▶ PENDING ──FinishPair(B, A, secret)──▶ CONFIRMED
//!     ▲                         │
//!     └──────── TTL expiry ─────┘
//! ```
//!
//! A starts toward B and receives a secret, which it hands to B out of band.
//! B finishes by presenting that secret; the lookup is therefore keyed by
//! the reversed direction `(initiator = A, target = B)`.
//!
//! The engine keeps no state of its own. All records live in the injected
//! [`PairingStore`], and the consume step is a single atomic store call.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;

use crate::auth::CallContext;
use crate::error::PairError;
use crate::pairing::secret::generate_secret;
use crate::pairing::{
    FinishPairRequest, FinishPairResponse, PairingInitiation, StartPairRequest, StartPairResponse,
};
use crate::store::{InsertOutcome, PairingStore};

/// Drives pairing requests from initiation to confirmation.
#[derive(Clone)]
pub struct PairingEngine {
    store: Arc<dyn PairingStore>,
    initiation_ttl: Duration,
}

impl PairingEngine {
    pub fn new(store: Arc<dyn PairingStore>, initiation_ttl: Duration) -> Self {
        Self {
            store,
            initiation_ttl,
        }
    }

    /// Initiations created at or before the returned instant are stale.
    fn fresh_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::from_std(self.initiation_ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// First phase: the caller declares intent to pair with `peer_id`.
    pub async fn start_pair(
        &self,
        ctx: &CallContext,
        req: StartPairRequest,
    ) -> Result<StartPairResponse, PairError> {
        ctx.ensure_acting_as(&req.id)?;

        if req.peer_id.is_empty() {
            return Err(PairError::InvalidArgument("missing peer id".into()));
        }
        if req.id == req.peer_id {
            return Err(PairError::InvalidArgument("pairing with self".into()));
        }

        let now = Utc::now();
        let fresh_after = self.fresh_after(now);

        if self.store.pairing_exists(&req.id, &req.peer_id).await? {
            return Err(PairError::AlreadyExists("Pair".into()));
        }
        if self
            .store
            .find_initiation(&req.id, &req.peer_id, fresh_after)
            .await?
            .is_some()
        {
            return Err(PairError::AlreadyExists("PairStart".into()));
        }

        let initiation = PairingInitiation {
            initiator: req.id,
            target: req.peer_id,
            secret: generate_secret(),
            created_at: now,
        };
        // A concurrent StartPair for the same pair can win between the lookup
        // above and this insert; the conditional insert reports it.
        match self.store.insert_initiation(&initiation, fresh_after).await? {
            InsertOutcome::Inserted => {}
            InsertOutcome::Conflict => return Err(PairError::AlreadyExists("PairStart".into())),
        }

        tracing::info!(
            request_id = %ctx.request_id(),
            initiator = %initiation.initiator,
            target = %initiation.target,
            "Pair start recorded"
        );

        Ok(StartPairResponse {
            peer_id: initiation.target,
            secret: initiation.secret,
        })
    }

    /// Second phase: the caller confirms an initiation that `peer_id` started
    /// toward it, proving contact with the shared secret.
    ///
    /// A missing initiation and a wrong secret both yield the same
    /// `NotFound`, so the reply cannot be used to probe for secrets.
    pub async fn finish_pair(
        &self,
        ctx: &CallContext,
        req: FinishPairRequest,
    ) -> Result<FinishPairResponse, PairError> {
        ctx.ensure_acting_as(&req.id)?;

        let now = Utc::now();
        let fresh_after = self.fresh_after(now);

        let initiator = req.peer_id.as_str();
        let target = req.id.as_str();

        if self
            .store
            .find_initiation(initiator, target, fresh_after)
            .await?
            .is_none()
        {
            return Err(not_found());
        }

        let pairing = self
            .store
            .consume_initiation_and_create_pairing(initiator, target, &req.secret, fresh_after, now)
            .await?
            .ok_or_else(not_found)?;

        tracing::info!(
            request_id = %ctx.request_id(),
            confirmer = %pairing.confirmer,
            peer = %pairing.peer,
            "Pair confirmed"
        );

        Ok(FinishPairResponse {
            created: pairing.created_at.timestamp(),
        })
    }

    /// Remove stale initiations from the store.
    pub async fn purge_expired(&self) -> Result<u64, PairError> {
        let removed = self
            .store
            .purge_expired_initiations(self.fresh_after(Utc::now()))
            .await?;
        if removed > 0 {
            tracing::debug!(removed, "Purged expired pair starts");
        }
        Ok(removed)
    }

    /// Spawn a task that purges stale initiations every `interval`.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = engine.purge_expired().await {
                    tracing::warn!(error = %e, "Expired pair start sweep failed");
                }
            }
        })
    }
}

fn not_found() -> PairError {
    PairError::NotFound("PairStart".into())
}
