//! Subscription ledger: persistence seam and its Postgres implementation.
//!
//! The ledger keeps one logical subscription row per user plus two
//! append-only tables: `subscription_history` for activation audit and
//! `payment_events` for every gateway notification. Duplicate approved
//! payments are rejected by a partial unique index, so the idempotency
//! check and the event insert are a single atomic statement.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::{PaymentEvent, PlanType, SubscriptionRecord, SubscriptionStatus};
use crate::services::metrics::DB_QUERY_DURATION;

/// Persistence seam for the subscription state machine.
///
/// The service layer talks only to this trait; tests swap in an in-memory
/// store.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Current subscription row for a user, if one was ever created.
    async fn subscription_for_user(&self, user_id: Uuid) -> Result<Option<SubscriptionRecord>>;

    /// Demote a lapsed subscription to `expired` and drop the premium flag.
    ///
    /// The demotion re-checks the period end against the store's clock, so a
    /// renewal landing between the caller's read and this write is left
    /// untouched.
    async fn mark_expired(&self, user_id: Uuid) -> Result<()>;

    /// Apply one approved gateway payment: record the event and activate the
    /// subscription for the paid period, in a single transaction.
    ///
    /// Returns `false` without touching the subscription when the same
    /// gateway payment id was already applied.
    async fn apply_approved_payment(
        &self,
        event: &PaymentEvent,
        plan: PlanType,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<bool>;

    /// Append a non-approved gateway event for audit. Never mutates the
    /// subscription row.
    async fn record_payment_event(&self, event: &PaymentEvent) -> Result<()>;

    /// Cancel an active subscription. Premium access is kept until the paid
    /// period lapses; only the status changes here.
    ///
    /// Returns `None` when the user has no active subscription to cancel.
    async fn cancel_subscription(&self, user_id: Uuid) -> Result<Option<SubscriptionRecord>>;
}

/// Postgres-backed ledger.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(config.url.expose_secret())
            .await
            .context("Failed to connect to Postgres")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for Database {
    async fn subscription_for_user(&self, user_id: Uuid) -> Result<Option<SubscriptionRecord>> {
        let timer = DB_QUERY_DURATION.start_timer();
        let record = sqlx::query_as::<_, SubscriptionRecord>(
            r#"
            SELECT user_id, is_pro, status, plan,
                   current_period_start, current_period_end,
                   gateway_reference, updated_utc
            FROM subscriptions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        timer.observe_duration();

        Ok(record)
    }

    async fn mark_expired(&self, user_id: Uuid) -> Result<()> {
        let timer = DB_QUERY_DURATION.start_timer();
        // Recency predicate: a payment webhook may have renewed the row since
        // the caller fetched it, and a renewed period must survive.
        let demoted = sqlx::query(
            r#"
            UPDATE subscriptions
            SET is_pro = FALSE, status = $2, updated_utc = NOW()
            WHERE user_id = $1
              AND is_pro = TRUE
              AND current_period_end < NOW()
            "#,
        )
        .bind(user_id)
        .bind(SubscriptionStatus::Expired.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();
        timer.observe_duration();

        if demoted > 0 {
            tracing::info!(user_id = %user_id, "Subscription marked expired");
        }
        Ok(())
    }

    async fn apply_approved_payment(
        &self,
        event: &PaymentEvent,
        plan: PlanType,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<bool> {
        let timer = DB_QUERY_DURATION.start_timer();
        let mut tx = self.pool.begin().await?;

        // The partial unique index on approved events makes this insert the
        // idempotency gate: a replayed notification conflicts and inserts
        // nothing.
        let inserted = sqlx::query(
            r#"
            INSERT INTO payment_events
                (gateway_payment_id, user_id, plan, amount, status, received_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (gateway_payment_id) WHERE status = 'approved' DO NOTHING
            "#,
        )
        .bind(&event.gateway_payment_id)
        .bind(event.user_id)
        .bind(&event.plan)
        .bind(event.amount)
        .bind(&event.status)
        .bind(event.received_utc)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            timer.observe_duration();
            tracing::info!(
                gateway_payment_id = %event.gateway_payment_id,
                "Duplicate approved payment ignored"
            );
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (user_id, is_pro, status, plan,
                 current_period_start, current_period_end,
                 gateway_reference, updated_utc)
            VALUES ($1, TRUE, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                is_pro = TRUE,
                status = EXCLUDED.status,
                plan = EXCLUDED.plan,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                gateway_reference = EXCLUDED.gateway_reference,
                updated_utc = NOW()
            "#,
        )
        .bind(event.user_id)
        .bind(SubscriptionStatus::Active.as_str())
        .bind(plan.as_str())
        .bind(period_start)
        .bind(period_end)
        .bind(&event.gateway_payment_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO subscription_history
                (user_id, plan, amount, gateway_payment_id,
                 period_start, period_end, status, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, 'active', NOW())
            "#,
        )
        .bind(event.user_id)
        .bind(plan.as_str())
        .bind(event.amount)
        .bind(&event.gateway_payment_id)
        .bind(period_start)
        .bind(period_end)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.observe_duration();

        tracing::info!(
            user_id = %event.user_id,
            plan = %plan,
            period_end = %period_end,
            "Subscription activated"
        );
        Ok(true)
    }

    async fn record_payment_event(&self, event: &PaymentEvent) -> Result<()> {
        let timer = DB_QUERY_DURATION.start_timer();
        sqlx::query(
            r#"
            INSERT INTO payment_events
                (gateway_payment_id, user_id, plan, amount, status, received_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&event.gateway_payment_id)
        .bind(event.user_id)
        .bind(&event.plan)
        .bind(event.amount)
        .bind(&event.status)
        .bind(event.received_utc)
        .execute(&self.pool)
        .await?;
        timer.observe_duration();

        Ok(())
    }

    async fn cancel_subscription(&self, user_id: Uuid) -> Result<Option<SubscriptionRecord>> {
        let timer = DB_QUERY_DURATION.start_timer();
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, SubscriptionRecord>(
            r#"
            UPDATE subscriptions
            SET status = $2, updated_utc = NOW()
            WHERE user_id = $1 AND status = $3
            RETURNING user_id, is_pro, status, plan,
                      current_period_start, current_period_end,
                      gateway_reference, updated_utc
            "#,
        )
        .bind(user_id)
        .bind(SubscriptionStatus::Canceled.as_str())
        .bind(SubscriptionStatus::Active.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if record.is_some() {
            sqlx::query(
                r#"
                UPDATE subscription_history
                SET status = $2
                WHERE user_id = $1 AND status = $3
                "#,
            )
            .bind(user_id)
            .bind(SubscriptionStatus::Canceled.as_str())
            .bind(SubscriptionStatus::Active.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        timer.observe_duration();

        if record.is_some() {
            tracing::info!(user_id = %user_id, "Subscription canceled");
        }
        Ok(record)
    }
}
