//! Pairing between two users.
//!
//! A pairing is confirmed through a two-call handshake: the initiator starts
//! it and receives a secret, the target finishes it by presenting that
//! secret. See [`PairingEngine`] for the state machine.

mod engine;
pub mod secret;
mod types;

pub use engine::PairingEngine;
pub use types::{
    FinishPairRequest, FinishPairResponse, Pairing, PairingInitiation, StartPairRequest,
    StartPairResponse,
};
