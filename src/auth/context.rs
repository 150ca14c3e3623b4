//! Per-call execution context and the identity consistency guard.

use std::fmt;
use std::net::SocketAddr;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Serialize;
use uuid::Uuid;

use crate::error::PairError;

/// Opaque user identifier asserted by a verified token's subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated state of a single call.
///
/// Only the authentication middleware creates one, and it lives in the
/// request extensions, which callers cannot write to. Handlers receive it
/// through the [`FromRequestParts`] impl below.
#[derive(Debug, Clone)]
pub struct CallContext {
    identity: Identity,
    peer_addr: Option<SocketAddr>,
    request_id: Uuid,
}

impl CallContext {
    pub fn new(identity: Identity, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            identity,
            peer_addr,
            request_id: Uuid::new_v4(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Identity consistency guard.
    ///
    /// The token proves who is calling; `claimed_id` is who the request body
    /// says the call acts for. Any difference is `PermissionDenied`. Run this
    /// before any store access.
    pub fn ensure_acting_as(&self, claimed_id: &str) -> Result<(), PairError> {
        if self.identity.as_str() == claimed_id {
            return Ok(());
        }
        tracing::warn!(
            request_id = %self.request_id,
            identity = %self.identity,
            claimed = %claimed_id,
            "Identity mismatch between token and request"
        );
        Err(PairError::PermissionDenied)
    }

    /// Log the start of an operation with caller and peer address.
    pub fn log_call(&self, operation: &str) {
        match self.peer_addr {
            Some(addr) => tracing::info!(
                request_id = %self.request_id,
                identity = %self.identity,
                peer = %addr,
                "{}", operation
            ),
            None => tracing::info!(
                request_id = %self.request_id,
                identity = %self.identity,
                "{}", operation
            ),
        }
    }
}

impl<S> FromRequestParts<S> for CallContext
where
    S: Send + Sync,
{
    type Rejection = PairError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallContext>()
            .cloned()
            .ok_or(PairError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    #[test]
    fn test_guard_accepts_matching_identity() {
        let ctx = CallContext::new(Identity::new("alice"), None);
        assert!(ctx.ensure_acting_as("alice").is_ok());
    }

    #[test]
    fn test_guard_rejects_other_identity() {
        let ctx = CallContext::new(Identity::new("alice"), None);
        assert_eq!(ctx.ensure_acting_as("bob"), Err(PairError::PermissionDenied));
        assert_eq!(ctx.ensure_acting_as(""), Err(PairError::PermissionDenied));
        assert_eq!(ctx.ensure_acting_as("Alice"), Err(PairError::PermissionDenied));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = CallContext::new(Identity::new("alice"), None);
        let b = CallContext::new(Identity::new("alice"), None);
        assert_ne!(a.request_id(), b.request_id());
    }

    #[tokio::test]
    async fn test_extractor_requires_bound_context() {
        let (mut parts, _) = Request::new(()).into_parts();
        let err = CallContext::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err, PairError::Unauthenticated);

        let addr: SocketAddr = "10.0.0.7:4242".parse().unwrap();
        parts
            .extensions
            .insert(CallContext::new(Identity::new("alice"), Some(addr)));
        let ctx = CallContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.identity().as_str(), "alice");
        assert_eq!(ctx.peer_addr(), Some(addr));
    }
}
