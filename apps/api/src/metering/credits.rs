//! Server-authoritative credit balance for signed-in users.
//!
//! Carried in `AppState` as `Arc<dyn CreditLedger>`. Production uses `PgCreditLedger`;
//! `InMemoryCreditLedger` backs local development and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;

#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Current balance. Users the ledger has never seen hold the signup grant.
    async fn balance(&self, user_id: Uuid) -> Result<i64, AppError>;

    /// Takes exactly one credit if any remain and returns the new balance.
    /// `None` means nothing was taken because the balance was already zero.
    async fn consume_one(&self, user_id: Uuid) -> Result<Option<i64>, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory ledger
// ────────────────────────────────────────────────────────────────────────────

pub struct InMemoryCreditLedger {
    balances: DashMap<Uuid, i64>,
    signup_credits: i64,
}

impl InMemoryCreditLedger {
    pub fn new(signup_credits: i64) -> Self {
        Self {
            balances: DashMap::new(),
            signup_credits,
        }
    }

    pub fn set_balance(&self, user_id: Uuid, credits: i64) {
        self.balances.insert(user_id, credits);
    }
}

#[async_trait]
impl CreditLedger for InMemoryCreditLedger {
    async fn balance(&self, user_id: Uuid) -> Result<i64, AppError> {
        Ok(self
            .balances
            .get(&user_id)
            .map_or(self.signup_credits, |b| *b))
    }

    async fn consume_one(&self, user_id: Uuid) -> Result<Option<i64>, AppError> {
        let mut balance = self
            .balances
            .entry(user_id)
            .or_insert(self.signup_credits);
        if *balance <= 0 {
            return Ok(None);
        }
        *balance -= 1;
        Ok(Some(*balance))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PostgreSQL ledger
// ────────────────────────────────────────────────────────────────────────────

/// Reads and decrements `users.credits_remaining`. The column is owned by the
/// account service; this ledger never creates users.
pub struct PgCreditLedger {
    pool: PgPool,
}

impl PgCreditLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        info!("Connecting to PostgreSQL...");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        info!("PostgreSQL connection pool established");
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    async fn balance(&self, user_id: Uuid) -> Result<i64, AppError> {
        let credits: Option<i64> =
            sqlx::query_scalar("SELECT credits_remaining::BIGINT FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        credits.ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))
    }

    async fn consume_one(&self, user_id: Uuid) -> Result<Option<i64>, AppError> {
        // Single statement: the row lock makes check-and-decrement atomic.
        let credits: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET credits_remaining = credits_remaining - 1
            WHERE id = $1 AND credits_remaining > 0
            RETURNING credits_remaining::BIGINT
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credits)
    }
}
