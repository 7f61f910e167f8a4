//! Subscription endpoints and the gateway webhook.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use service_core::error::AppError;

use crate::middleware::auth::AuthUser;
use crate::services::metrics::{SUBSCRIPTION_OPERATIONS_TOTAL, WEBHOOK_NOTIFICATIONS_TOTAL};
use crate::services::subscription::{
    CheckoutResponse, NotificationOutcome, SubscriptionStatusResponse,
};
use crate::AppState;

/// GET /api/subscription/status
pub async fn status(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<SubscriptionStatusResponse>, AppError> {
    SUBSCRIPTION_OPERATIONS_TOTAL
        .with_label_values(&["status"])
        .inc();
    let response = state.subscriptions.read_status(user.user_id).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan: String,
}

/// POST /api/subscription/checkout
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    SUBSCRIPTION_OPERATIONS_TOTAL
        .with_label_values(&["checkout"])
        .inc();
    let response = state
        .subscriptions
        .create_checkout(user.user_id, &user.email, &payload.plan)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/subscription/cancel
pub async fn cancel(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<SubscriptionStatusResponse>, AppError> {
    SUBSCRIPTION_OPERATIONS_TOTAL
        .with_label_values(&["cancel"])
        .inc();
    let response = state.subscriptions.cancel(user.user_id).await?;
    Ok(Json(response))
}

/// POST /webhooks/mercadopago
///
/// Always answers 200: a non-2xx makes the gateway retry, and retries help
/// only for transient failures, which we log and let the gateway's own
/// redelivery schedule handle.
pub async fn mercadopago_webhook(State(state): State<AppState>, body: String) -> StatusCode {
    match state.subscriptions.handle_notification(&body).await {
        Ok(outcome) => {
            WEBHOOK_NOTIFICATIONS_TOTAL
                .with_label_values(&[outcome.label()])
                .inc();
            match outcome {
                NotificationOutcome::Applied { user_id, plan } => {
                    tracing::info!(user_id = %user_id, plan = %plan, "Webhook applied");
                }
                NotificationOutcome::Ignored(reason) => {
                    tracing::warn!(reason, "Webhook ignored");
                }
                NotificationOutcome::Duplicate | NotificationOutcome::Recorded => {}
            }
        }
        Err(err) => {
            WEBHOOK_NOTIFICATIONS_TOTAL
                .with_label_values(&["error"])
                .inc();
            tracing::error!(error = %err, "Webhook processing failed");
        }
    }
    StatusCode::OK
}
