//! Request authenticator for the `/v1` routes.
//!
//! Reads the bearer credential from the `authorization` header, verifies it,
//! and binds the resulting [`CallContext`] into the request extensions. A
//! failure short-circuits with `Unauthenticated` before the handler runs.
//!
//! Header handling:
//! - exactly one `authorization` value is accepted; repeated headers are
//!   rejected rather than merged
//! - a `Bearer ` scheme prefix (any case) is stripped; a value without a
//!   scheme is taken as the raw compact token

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::{CallContext, IdentityVerifier};
use crate::error::PairError;

/// Shared auth state injected via axum middleware state.
#[derive(Clone)]
pub struct AuthState {
    verifier: Arc<IdentityVerifier>,
}

impl AuthState {
    pub fn new(verifier: Arc<IdentityVerifier>) -> Self {
        Self { verifier }
    }
}

/// Axum middleware that authenticates the caller.
///
/// Wire up with `axum::middleware::from_fn_with_state(auth_state, auth_middleware)`.
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);

    let token = match extract_bearer_token(request.headers()) {
        Ok(token) => token,
        Err(e) => return e.into_response(),
    };

    let identity = match auth.verifier.verify(token) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::debug!(error = %e, peer = ?peer_addr, "Token verification failed");
            return PairError::Unauthenticated.into_response();
        }
    };

    request
        .extensions_mut()
        .insert(CallContext::new(identity, peer_addr));
    next.run(request).await
}

/// Pull the single bearer token out of the request headers.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, PairError> {
    let mut values = headers.get_all(AUTHORIZATION).iter();
    let value = values.next().ok_or(PairError::Unauthenticated)?;
    if values.next().is_some() {
        tracing::debug!("Rejecting request with multiple authorization headers");
        return Err(PairError::Unauthenticated);
    }

    let value = value
        .to_str()
        .map_err(|_| PairError::Unauthenticated)?
        .trim();
    let token = match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ if value.eq_ignore_ascii_case("bearer") => "",
        _ => value,
    };

    if token.is_empty() {
        return Err(PairError::Unauthenticated);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(values: &[&str]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for v in values {
            map.append(AUTHORIZATION, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(
            extract_bearer_token(&HeaderMap::new()),
            Err(PairError::Unauthenticated)
        );
    }

    #[test]
    fn test_bearer_prefix_stripped() {
        let map = headers(&["Bearer abc.def.ghi"]);
        assert_eq!(extract_bearer_token(&map), Ok("abc.def.ghi"));

        let map = headers(&["bearer   abc.def.ghi"]);
        assert_eq!(extract_bearer_token(&map), Ok("abc.def.ghi"));
    }

    #[test]
    fn test_raw_token_accepted() {
        let map = headers(&["abc.def.ghi"]);
        assert_eq!(extract_bearer_token(&map), Ok("abc.def.ghi"));
    }

    #[test]
    fn test_multiple_headers_rejected() {
        let map = headers(&["Bearer one", "Bearer two"]);
        assert_eq!(extract_bearer_token(&map), Err(PairError::Unauthenticated));
    }

    #[test]
    fn test_empty_token_rejected() {
        let map = headers(&["Bearer "]);
        assert_eq!(extract_bearer_token(&map), Err(PairError::Unauthenticated));

        let map = headers(&[""]);
        assert_eq!(extract_bearer_token(&map), Err(PairError::Unauthenticated));
    }
}
