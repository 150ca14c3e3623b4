//! Service assembly and the HTTP server lifecycle.
//!
//! [`build_router`] wires configuration, stores, verifier, engine, and
//! routes together. [`PairServer`] binds the listener, serves in a spawned
//! task, and shuts down gracefully on request.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::accounts::AccountService;
use crate::api::{AppState, router};
use crate::auth::{AuthState, IdentityVerifier};
use crate::config::{Config, StoreBackend, StoreConfig};
use crate::error::StoreError;
use crate::pairing::PairingEngine;
use crate::store::{AccountStore, InMemoryStore, PairingStore};

/// Store handles shared by the engine and the account service.
#[derive(Clone)]
pub struct Stores {
    pub pairing: Arc<dyn PairingStore>,
    pub accounts: Arc<dyn AccountStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        let store = InMemoryStore::new();
        Self {
            pairing: Arc::new(store.clone()),
            accounts: Arc::new(store),
        }
    }
}

/// Open the configured store backend, running migrations for PostgreSQL.
pub async fn open_stores(config: &StoreConfig) -> Result<Stores, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; pairing state is lost on restart");
            Ok(Stores::in_memory())
        }
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres => {
            use secrecy::ExposeSecret;

            let url = config
                .database_url
                .as_ref()
                .ok_or_else(|| StoreError::Pool("DATABASE_URL not set".to_string()))?;
            let store = Arc::new(
                crate::store::PgStore::connect(url.expose_secret(), config.pool_size).await?,
            );
            store.run_migrations().await?;
            Ok(Stores {
                pairing: store.clone(),
                accounts: store,
            })
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres => Err(StoreError::Pool(
            "built without the `postgres` feature".to_string(),
        )),
    }
}

/// Assemble the application router and the pairing engine behind it.
pub fn build_router(
    config: &Config,
    verifier: IdentityVerifier,
    stores: Stores,
) -> (Router, PairingEngine) {
    let engine = PairingEngine::new(stores.pairing, config.initiation_ttl);
    let state = AppState {
        engine: engine.clone(),
        accounts: AccountService::new(stores.accounts),
        request_timeout: config.request_timeout,
    };
    let auth = AuthState::new(Arc::new(verifier));
    (router(state, auth), engine)
}

/// The Pair API HTTP server.
pub struct PairServer {
    addr: SocketAddr,
    router: Option<Router>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PairServer {
    pub fn new(addr: SocketAddr, router: Router) -> Self {
        Self {
            addr,
            router: Some(router),
            local_addr: None,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Bind the listener and spawn the server task.
    pub async fn start(&mut self) -> std::io::Result<SocketAddr> {
        let router = self
            .router
            .take()
            .ok_or_else(|| std::io::Error::other("server already started"))?;

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        tracing::info!("Pair API listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let handle = tokio::spawn(async move {
            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("Pair API shutting down");
                })
                .await
            {
                tracing::error!("Pair API server error: {}", e);
            }
        });

        self.handle = Some(handle);
        Ok(local_addr)
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Signal graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
