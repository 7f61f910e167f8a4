//! Premium subscription lifecycle: status reads with lazy expiry, checkout
//! initiation, gateway webhook reconciliation, and cancellation.
//!
//! The webhook path trusts nothing in the notification body beyond the
//! payment id: the authoritative payment record is always re-fetched from
//! the gateway before any state changes.

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use service_core::error::AppError;

use crate::config::PlanPricing;
use crate::models::{PaymentEvent, PlanType, SubscriptionRecord, SubscriptionStatus};
use crate::services::ledger::SubscriptionStore;
use crate::services::mercadopago::{MercadoPagoClient, PreferenceItem};

/// Token carried through the gateway as `external_reference`, linking an
/// asynchronous payment back to the purchasing user and plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationToken {
    pub user_id: Uuid,
    pub plan: PlanType,
}

impl CorrelationToken {
    pub fn encode(&self) -> String {
        format!("{}:{}", self.user_id, self.plan)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let (user_part, plan_part) = raw
            .split_once(':')
            .ok_or_else(|| anyhow!("correlation token missing ':' separator"))?;
        let user_id = Uuid::parse_str(user_part)?;
        let plan = PlanType::from_str(plan_part)?;
        Ok(Self { user_id, plan })
    }
}

/// What a single webhook notification did to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Approved payment applied; subscription is now active.
    Applied { user_id: Uuid, plan: PlanType },
    /// Approved payment seen before; nothing changed.
    Duplicate,
    /// Non-approved status recorded for audit only.
    Recorded,
    /// Notification could not be attributed; dropped with a reason.
    Ignored(&'static str),
}

impl NotificationOutcome {
    /// Metric label for the outcome.
    pub fn label(&self) -> &'static str {
        match self {
            NotificationOutcome::Applied { .. } => "applied",
            NotificationOutcome::Duplicate => "duplicate",
            NotificationOutcome::Recorded => "recorded",
            NotificationOutcome::Ignored(_) => "ignored",
        }
    }
}

/// MercadoPago webhook body. Only the payment id matters; everything else
/// is re-fetched. Older gateway payloads use `topic` instead of `type` and
/// send the id as a number.
#[derive(Debug, Deserialize)]
struct WebhookNotification {
    #[serde(rename = "type")]
    kind: Option<String>,
    topic: Option<String>,
    data: Option<WebhookData>,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    id: Option<Value>,
}

impl WebhookNotification {
    fn is_payment(&self) -> bool {
        self.kind.as_deref() == Some("payment") || self.topic.as_deref() == Some("payment")
    }

    fn payment_id(&self) -> Option<String> {
        match self.data.as_ref()?.id.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Current subscription view returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStatusResponse {
    pub is_pro: bool,
    pub status: SubscriptionStatus,
    pub plan: Option<String>,
    pub current_period_end: Option<chrono::DateTime<Utc>>,
}

impl From<&SubscriptionRecord> for SubscriptionStatusResponse {
    fn from(record: &SubscriptionRecord) -> Self {
        Self {
            is_pro: record.is_pro,
            status: record.status(),
            plan: record.plan.clone(),
            current_period_end: record.current_period_end,
        }
    }
}

/// Checkout initiation result.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub preference_id: String,
    pub checkout_url: String,
}

/// Subscription service over an injected store and gateway client.
#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    gateway: MercadoPagoClient,
    pricing: PlanPricing,
}

impl SubscriptionService {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        gateway: MercadoPagoClient,
        pricing: PlanPricing,
    ) -> Self {
        Self {
            store,
            gateway,
            pricing,
        }
    }

    /// Current subscription state for a user.
    ///
    /// Expiry is lazy: a premium subscription whose paid period has lapsed is
    /// demoted here, on read, rather than by a background job. Users with no
    /// row read as free.
    pub async fn read_status(&self, user_id: Uuid) -> Result<SubscriptionStatusResponse, AppError> {
        let record = self.store.subscription_for_user(user_id).await?;

        let Some(record) = record else {
            return Ok(SubscriptionStatusResponse::from(&SubscriptionRecord::free(
                user_id,
            )));
        };

        let lapsed = record.is_pro
            && record
                .current_period_end
                .is_some_and(|end| end < Utc::now());
        if lapsed {
            self.store.mark_expired(user_id).await?;
            return Ok(SubscriptionStatusResponse {
                is_pro: false,
                status: SubscriptionStatus::Expired,
                plan: record.plan.clone(),
                current_period_end: record.current_period_end,
            });
        }

        Ok(SubscriptionStatusResponse::from(&record))
    }

    /// Start a premium checkout for `plan`, returning the gateway URL the
    /// client should redirect to.
    ///
    /// The plan is validated here, before any gateway traffic: an unsupported
    /// plan is the caller's mistake, not the gateway's.
    pub async fn create_checkout(
        &self,
        user_id: Uuid,
        user_email: &str,
        plan: &str,
    ) -> Result<CheckoutResponse, AppError> {
        let plan: PlanType = plan
            .parse()
            .map_err(|err| AppError::BadRequest(anyhow!("{err}")))?;

        if !self.gateway.is_configured() {
            return Err(AppError::ServiceUnavailable(
                "Payment gateway is not configured".to_string(),
            ));
        }

        let token = CorrelationToken { user_id, plan };
        let item = PreferenceItem {
            title: format!("FreelaBR Premium ({})", plan),
            quantity: 1,
            currency_id: "BRL".to_string(),
            unit_price: self.pricing.price_for(plan),
        };

        let preference = self
            .gateway
            .create_preference(vec![item], user_email, &token.encode())
            .await
            .map_err(|err| AppError::BadGateway(err.to_string()))?;

        Ok(CheckoutResponse {
            preference_id: preference.id,
            checkout_url: preference.init_point,
        })
    }

    /// Reconcile one gateway webhook notification.
    ///
    /// Unattributable notifications are dropped, not errored: the gateway
    /// retries on non-2xx, and retrying a malformed body can never succeed.
    /// Gateway and storage failures do propagate so the caller can log them.
    pub async fn handle_notification(&self, body: &str) -> Result<NotificationOutcome> {
        let Ok(notification) = serde_json::from_str::<WebhookNotification>(body) else {
            return Ok(NotificationOutcome::Ignored("malformed payload"));
        };
        if !notification.is_payment() {
            return Ok(NotificationOutcome::Ignored("not a payment notification"));
        }
        let Some(payment_id) = notification.payment_id() else {
            return Ok(NotificationOutcome::Ignored("missing payment id"));
        };

        // Authoritative state lives at the gateway, never in the webhook body.
        let payment = self.gateway.get_payment(&payment_id).await?;

        let Some(reference) = payment.external_reference.as_deref() else {
            return Ok(NotificationOutcome::Ignored("missing external reference"));
        };
        let Ok(token) = CorrelationToken::parse(reference) else {
            tracing::warn!(
                gateway_payment_id = %payment.id,
                reference,
                "Unparseable external reference on payment"
            );
            return Ok(NotificationOutcome::Ignored("unparseable reference"));
        };

        let event = PaymentEvent {
            gateway_payment_id: payment.id.to_string(),
            user_id: token.user_id,
            plan: Some(token.plan.as_str().to_string()),
            amount: payment.transaction_amount,
            status: payment.status.clone(),
            received_utc: Utc::now(),
        };

        if payment.status == "approved" {
            let period_start = Utc::now();
            let period_end = period_start + Duration::days(token.plan.duration_days());
            let applied = self
                .store
                .apply_approved_payment(&event, token.plan, period_start, period_end)
                .await?;
            if applied {
                Ok(NotificationOutcome::Applied {
                    user_id: token.user_id,
                    plan: token.plan,
                })
            } else {
                Ok(NotificationOutcome::Duplicate)
            }
        } else {
            self.store.record_payment_event(&event).await?;
            tracing::info!(
                gateway_payment_id = %payment.id,
                status = %payment.status,
                "Non-approved payment recorded"
            );
            Ok(NotificationOutcome::Recorded)
        }
    }

    /// Cancel the user's active subscription. Premium access continues until
    /// the already-paid period lapses.
    pub async fn cancel(&self, user_id: Uuid) -> Result<SubscriptionStatusResponse, AppError> {
        let record = self.store.cancel_subscription(user_id).await?;
        match record {
            Some(record) => Ok(SubscriptionStatusResponse::from(&record)),
            None => Err(AppError::NotFound(anyhow!(
                "No active subscription to cancel"
            ))),
        }
    }
}
