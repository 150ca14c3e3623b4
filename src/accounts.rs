//! Account records: creation and lookup.
//!
//! Both operations pass the identity consistency guard before any store
//! access, the same as the pairing RPCs.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::CallContext;
use crate::error::PairError;
use crate::store::{AccountStore, InsertOutcome};

/// Username given to every new account.
pub const DEFAULT_USERNAME: &str = "Anonymous";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@<>]+@[^\s@<>]+\.[^\s@<>]+$").expect("email pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub username: String,
    /// Creation time, unix seconds.
    pub created: i64,
    pub pic: String,
    pub points: i32,
    pub peers: i32,
}

impl Account {
    /// A fresh account with default username and zeroed counters.
    pub fn new(id: &str, email: &str, pic: &str, created: i64) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            created,
            pic: pic.to_string(),
            points: 0,
            peers: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub pic: String,
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Account operations over an injected [`AccountStore`].
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn AccountStore>,
}

impl AccountService {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    pub async fn create_account(
        &self,
        ctx: &CallContext,
        req: CreateAccountRequest,
    ) -> Result<Account, PairError> {
        ctx.ensure_acting_as(&req.id)?;

        if !is_valid_email(&req.email) {
            return Err(PairError::InvalidArgument("bad email formatting".into()));
        }

        let account = Account::new(
            &req.id,
            &req.email,
            &req.pic,
            chrono::Utc::now().timestamp(),
        );
        match self.store.insert_account(&account).await? {
            InsertOutcome::Inserted => {
                tracing::info!(request_id = %ctx.request_id(), id = %account.id, "Account created");
                Ok(account)
            }
            InsertOutcome::Conflict => Err(PairError::AlreadyExists("Account".into())),
        }
    }

    pub async fn get_account(&self, ctx: &CallContext, id: &str) -> Result<Account, PairError> {
        ctx.ensure_acting_as(id)?;
        self.store
            .get_account(id)
            .await?
            .ok_or_else(|| PairError::NotFound("Account".into()))
    }
}
