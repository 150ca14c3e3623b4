//! HTTP routes for the Pair API.
//!
//! `/health` is open. Everything under `/v1` goes through the auth
//! middleware first, then the handler binds the [`CallContext`], parses the
//! body, and runs the operation under the per-call deadline.

use std::future::Future;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::accounts::{Account, AccountService, CreateAccountRequest};
use crate::auth::{AuthState, CallContext, auth_middleware};
use crate::error::PairError;
use crate::pairing::{
    FinishPairRequest, FinishPairResponse, PairingEngine, StartPairRequest, StartPairResponse,
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: PairingEngine,
    pub accounts: AccountService,
    pub request_timeout: Duration,
}

/// Build the full router.
pub fn router(state: AppState, auth: AuthState) -> Router {
    let v1 = Router::new()
        .route("/v1/pairs/start", post(start_pair))
        .route("/v1/pairs/finish", post(finish_pair))
        .route("/v1/accounts", post(create_account))
        .route("/v1/accounts/{id}", get(get_account))
        .route_layer(middleware::from_fn_with_state(auth, auth_middleware))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .merge(v1)
        .layer(TraceLayer::new_for_http())
}

/// Run `fut` under `deadline`.
///
/// Store mutations are single statements, so dropping the future on expiry
/// leaves no partial write behind.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, PairError>
where
    F: Future<Output = Result<T, PairError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(?deadline, "Call deadline exceeded");
            Err(PairError::DeadlineExceeded)
        }
    }
}

fn invalid_body(rejection: JsonRejection) -> PairError {
    PairError::InvalidArgument(rejection.body_text())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn start_pair(
    State(state): State<AppState>,
    ctx: CallContext,
    payload: Result<Json<StartPairRequest>, JsonRejection>,
) -> Result<Json<StartPairResponse>, PairError> {
    ctx.log_call("StartPair");
    let Json(req) = payload.map_err(invalid_body)?;
    with_deadline(state.request_timeout, state.engine.start_pair(&ctx, req))
        .await
        .map(Json)
}

async fn finish_pair(
    State(state): State<AppState>,
    ctx: CallContext,
    payload: Result<Json<FinishPairRequest>, JsonRejection>,
) -> Result<Json<FinishPairResponse>, PairError> {
    ctx.log_call("FinishPair");
    let Json(req) = payload.map_err(invalid_body)?;
    with_deadline(state.request_timeout, state.engine.finish_pair(&ctx, req))
        .await
        .map(Json)
}

async fn create_account(
    State(state): State<AppState>,
    ctx: CallContext,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<Json<Account>, PairError> {
    ctx.log_call("CreateAccount");
    let Json(req) = payload.map_err(invalid_body)?;
    with_deadline(state.request_timeout, state.accounts.create_account(&ctx, req))
        .await
        .map(Json)
}

async fn get_account(
    State(state): State<AppState>,
    ctx: CallContext,
    Path(id): Path<String>,
) -> Result<Json<Account>, PairError> {
    ctx.log_call("GetAccount");
    with_deadline(state.request_timeout, state.accounts.get_account(&ctx, &id))
        .await
        .map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_passes_through_result() {
        let ok = with_deadline(Duration::from_secs(1), async { Ok::<_, PairError>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err = with_deadline(Duration::from_secs(1), async {
            Err::<(), _>(PairError::PermissionDenied)
        })
        .await;
        assert_eq!(err, Err(PairError::PermissionDenied));
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let result = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, PairError>(())
        })
        .await;
        assert_eq!(result, Err(PairError::DeadlineExceeded));
    }
}
