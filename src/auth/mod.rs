//! Caller authentication.
//!
//! - `verifier`: checks bearer tokens against the identity provider's key
//! - `middleware`: axum layer that binds the verified identity per call
//! - `context`: the bound [`CallContext`] and the identity consistency guard

mod context;
pub mod middleware;
mod verifier;

pub use context::{CallContext, Identity};
pub use middleware::{AuthState, auth_middleware, extract_bearer_token};
pub use verifier::IdentityVerifier;
