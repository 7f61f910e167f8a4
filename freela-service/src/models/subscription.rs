//! Subscription ledger models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Free,
    Active,
    Canceled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Free => "free",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "active" => SubscriptionStatus::Active,
            "canceled" => SubscriptionStatus::Canceled,
            "expired" => SubscriptionStatus::Expired,
            _ => SubscriptionStatus::Free,
        }
    }
}

/// Premium billing plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Monthly,
    Annual,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Monthly => "monthly",
            PlanType::Annual => "annual",
        }
    }

    /// Length of the billing period granted by one approved payment,
    /// counted from the payment date.
    pub fn duration_days(&self) -> i64 {
        match self {
            PlanType::Monthly => 30,
            PlanType::Annual => 365,
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plan identifier outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported plan '{0}'; expected 'monthly' or 'annual'")]
pub struct UnsupportedPlan(pub String);

impl FromStr for PlanType {
    type Err = UnsupportedPlan;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(PlanType::Monthly),
            "annual" => Ok(PlanType::Annual),
            other => Err(UnsupportedPlan(other.to_string())),
        }
    }
}

/// One logical subscription row per user. Never deleted; cancellation and
/// expiry are status transitions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubscriptionRecord {
    pub user_id: Uuid,
    pub is_pro: bool,
    pub status: String,
    pub plan: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub gateway_reference: Option<String>,
    pub updated_utc: DateTime<Utc>,
}

impl SubscriptionRecord {
    /// The implicit state of a user with no persisted subscription row.
    pub fn free(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_pro: false,
            status: SubscriptionStatus::Free.as_str().to_string(),
            plan: None,
            current_period_start: None,
            current_period_end: None,
            gateway_reference: None,
            updated_utc: Utc::now(),
        }
    }

    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_string(&self.status)
    }
}

/// Append-only audit entry for a gateway payment notification.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentEvent {
    pub gateway_payment_id: String,
    pub user_id: Uuid,
    pub plan: Option<String>,
    pub amount: Option<Decimal>,
    pub status: String,
    pub received_utc: DateTime<Utc>,
}
