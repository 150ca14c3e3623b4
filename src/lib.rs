//! Pair API: a backend that lets two users establish a mutually confirmed
//! pairing.
//!
//! Call flow for every `/v1` request:
//!
//! ```text
//! auth_middleware ─▶ CallContext::ensure_acting_as ─▶ PairingEngine ─▶ PairingStore
//! ```
//!
//! - [`auth`]: bearer token verification and per-call identity binding
//! - [`pairing`]: the two-phase StartPair / FinishPair handshake
//! - [`accounts`]: account creation and lookup
//! - [`store`]: in-memory and PostgreSQL persistence
//! - [`api`] / [`server`]: HTTP routes and server lifecycle

pub mod accounts;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod pairing;
pub mod server;
pub mod store;

pub use error::{PairError, Result};
