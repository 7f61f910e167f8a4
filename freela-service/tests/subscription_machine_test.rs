//! Subscription reconciliation tests against an in-memory ledger and a
//! mocked payment gateway.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal_macros::dec;
use secrecy::Secret;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use freela_service::config::{MercadoPagoConfig, PlanPricing};
use freela_service::models::{PaymentEvent, PlanType, SubscriptionRecord, SubscriptionStatus};
use freela_service::services::ledger::SubscriptionStore;
use freela_service::services::mercadopago::MercadoPagoClient;
use freela_service::services::subscription::{NotificationOutcome, SubscriptionService};

#[derive(Default)]
struct InMemoryStore {
    subscriptions: Mutex<HashMap<Uuid, SubscriptionRecord>>,
    events: Mutex<Vec<PaymentEvent>>,
}

impl InMemoryStore {
    fn seed_subscription(&self, record: SubscriptionRecord) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(record.user_id, record);
    }

    fn subscription(&self, user_id: Uuid) -> Option<SubscriptionRecord> {
        self.subscriptions.lock().unwrap().get(&user_id).cloned()
    }

    fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn subscription_for_user(&self, user_id: Uuid) -> Result<Option<SubscriptionRecord>> {
        Ok(self.subscription(user_id))
    }

    async fn mark_expired(&self, user_id: Uuid) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        if let Some(record) = subscriptions.get_mut(&user_id) {
            // Same recency predicate as the Postgres store: a row renewed
            // since the caller's read keeps its new period.
            let lapsed = record.is_pro
                && record
                    .current_period_end
                    .is_some_and(|end| end < Utc::now());
            if lapsed {
                record.is_pro = false;
                record.status = SubscriptionStatus::Expired.as_str().to_string();
                record.updated_utc = Utc::now();
            }
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
        let mut events = self.events.lock().unwrap();
        let duplicate = events.iter().any(|existing| {
            existing.gateway_payment_id == event.gateway_payment_id
                && existing.status == "approved"
        });
        if duplicate {
            return Ok(false);
        }
        events.push(event.clone());

        let mut subscriptions = self.subscriptions.lock().unwrap();
        subscriptions.insert(
            event.user_id,
            SubscriptionRecord {
                user_id: event.user_id,
                is_pro: true,
                status: SubscriptionStatus::Active.as_str().to_string(),
                plan: Some(plan.as_str().to_string()),
                current_period_start: Some(period_start),
                current_period_end: Some(period_end),
                gateway_reference: Some(event.gateway_payment_id.clone()),
                updated_utc: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn record_payment_event(&self, event: &PaymentEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn cancel_subscription(&self, user_id: Uuid) -> Result<Option<SubscriptionRecord>> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        match subscriptions.get_mut(&user_id) {
            Some(record) if record.status == SubscriptionStatus::Active.as_str() => {
                record.status = SubscriptionStatus::Canceled.as_str().to_string();
                record.updated_utc = Utc::now();
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }
}

fn gateway_client(base_url: &str, token: &str) -> MercadoPagoClient {
    MercadoPagoClient::new(MercadoPagoConfig {
        access_token: Secret::new(token.to_string()),
        api_base_url: base_url.to_string(),
        back_url: "http://localhost:5173/premium".to_string(),
        timeout_seconds: 5,
    })
}

fn pricing() -> PlanPricing {
    PlanPricing {
        monthly: dec!(29.90),
        annual: dec!(299.00),
    }
}

fn service_with(
    store: Arc<InMemoryStore>,
    base_url: &str,
    token: &str,
) -> SubscriptionService {
    SubscriptionService::new(store, gateway_client(base_url, token), pricing())
}

fn active_record(user_id: Uuid, period_end: DateTime<Utc>) -> SubscriptionRecord {
    SubscriptionRecord {
        user_id,
        is_pro: true,
        status: SubscriptionStatus::Active.as_str().to_string(),
        plan: Some("monthly".to_string()),
        current_period_start: Some(period_end - Duration::days(30)),
        current_period_end: Some(period_end),
        gateway_reference: Some("111".to_string()),
        updated_utc: Utc::now(),
    }
}

fn webhook_body(payment_id: &str) -> String {
    json!({ "type": "payment", "data": { "id": payment_id } }).to_string()
}

async fn mount_payment(
    server: &MockServer,
    payment_id: u64,
    status: &str,
    external_reference: Option<String>,
) {
    let mut body = json!({
        "id": payment_id,
        "status": status,
        "transaction_amount": 29.90,
    });
    if let Some(reference) = external_reference {
        body["external_reference"] = json!(reference);
    }
    Mock::given(method("GET"))
        .and(path(format!("/v1/payments/{payment_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn replayed_approved_notification_activates_exactly_once() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();
    mount_payment(
        &server,
        111,
        "approved",
        Some(format!("{user_id}:monthly")),
    )
    .await;

    let store = Arc::new(InMemoryStore::default());
    let service = service_with(store.clone(), &server.uri(), "TEST-token");

    let first = service.handle_notification(&webhook_body("111")).await.unwrap();
    assert_eq!(
        first,
        NotificationOutcome::Applied {
            user_id,
            plan: PlanType::Monthly
        }
    );

    let second = service.handle_notification(&webhook_body("111")).await.unwrap();
    assert_eq!(second, NotificationOutcome::Duplicate);

    assert_eq!(store.event_count(), 1);
    let record = store.subscription(user_id).unwrap();
    assert!(record.is_pro);
    assert_eq!(record.status, "active");
    let period_end = record.current_period_end.unwrap();
    let expected_end = Utc::now() + Duration::days(30);
    assert!((period_end - expected_end).num_seconds().abs() < 5);
}

#[tokio::test]
async fn legacy_topic_payload_with_numeric_id_is_applied() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();
    mount_payment(&server, 222, "approved", Some(format!("{user_id}:annual"))).await;

    let store = Arc::new(InMemoryStore::default());
    let service = service_with(store.clone(), &server.uri(), "TEST-token");

    let body = json!({ "topic": "payment", "data": { "id": 222 } }).to_string();
    let outcome = service.handle_notification(&body).await.unwrap();
    assert_eq!(
        outcome,
        NotificationOutcome::Applied {
            user_id,
            plan: PlanType::Annual
        }
    );

    let record = store.subscription(user_id).unwrap();
    assert_eq!(record.plan.as_deref(), Some("annual"));
    let period_end = record.current_period_end.unwrap();
    let expected_end = Utc::now() + Duration::days(365);
    assert!((period_end - expected_end).num_seconds().abs() < 5);
}

#[tokio::test]
async fn pending_payment_is_recorded_without_activation() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();
    mount_payment(&server, 333, "pending", Some(format!("{user_id}:monthly"))).await;

    let store = Arc::new(InMemoryStore::default());
    let service = service_with(store.clone(), &server.uri(), "TEST-token");

    let outcome = service.handle_notification(&webhook_body("333")).await.unwrap();
    assert_eq!(outcome, NotificationOutcome::Recorded);

    assert_eq!(store.event_count(), 1);
    assert!(store.subscription(user_id).is_none());
}

#[tokio::test]
async fn malformed_payload_is_ignored_without_a_gateway_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryStore::default());
    let service = service_with(store.clone(), &server.uri(), "TEST-token");

    for body in ["not json", "{}", r#"{"type": "plan", "data": {"id": "9"}}"#] {
        let outcome = service.handle_notification(body).await.unwrap();
        assert!(matches!(outcome, NotificationOutcome::Ignored(_)), "{body}");
    }
    assert_eq!(store.event_count(), 0);
}

#[tokio::test]
async fn payment_without_external_reference_is_ignored() {
    let server = MockServer::start().await;
    mount_payment(&server, 444, "approved", None).await;

    let store = Arc::new(InMemoryStore::default());
    let service = service_with(store.clone(), &server.uri(), "TEST-token");

    let outcome = service.handle_notification(&webhook_body("444")).await.unwrap();
    assert_eq!(
        outcome,
        NotificationOutcome::Ignored("missing external reference")
    );
    assert_eq!(store.event_count(), 0);
}

#[tokio::test]
async fn lapsed_subscription_expires_on_read() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();
    let store = Arc::new(InMemoryStore::default());
    store.seed_subscription(active_record(user_id, Utc::now() - Duration::days(1)));

    let service = service_with(store.clone(), &server.uri(), "TEST-token");

    let status = service.read_status(user_id).await.unwrap();
    assert!(!status.is_pro);
    assert_eq!(status.status, SubscriptionStatus::Expired);

    // Second read sees the persisted demotion and changes nothing further.
    let record = store.subscription(user_id).unwrap();
    assert!(!record.is_pro);
    assert_eq!(record.status, "expired");
    let again = service.read_status(user_id).await.unwrap();
    assert!(!again.is_pro);
    assert_eq!(again.status, SubscriptionStatus::Expired);
}

#[tokio::test]
async fn expiry_demotion_leaves_a_freshly_renewed_subscription_active() {
    // A renewal webhook can commit between a status read's fetch and its
    // demotion write; the stale demotion must not clobber the new period.
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();
    let store = Arc::new(InMemoryStore::default());
    store.seed_subscription(active_record(user_id, Utc::now() - Duration::days(1)));

    let event = PaymentEvent {
        gateway_payment_id: "555".to_string(),
        user_id,
        plan: Some("monthly".to_string()),
        amount: None,
        status: "approved".to_string(),
        received_utc: Utc::now(),
    };
    let renewed_until = Utc::now() + Duration::days(30);
    store
        .apply_approved_payment(&event, PlanType::Monthly, Utc::now(), renewed_until)
        .await
        .unwrap();

    // The demotion decided against the pre-renewal row is a no-op now.
    store.mark_expired(user_id).await.unwrap();

    let record = store.subscription(user_id).unwrap();
    assert!(record.is_pro);
    assert_eq!(record.status, "active");
    assert_eq!(record.current_period_end, Some(renewed_until));

    let service = service_with(store.clone(), &server.uri(), "TEST-token");
    let status = service.read_status(user_id).await.unwrap();
    assert!(status.is_pro);
    assert_eq!(status.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn cancel_keeps_premium_until_the_paid_period_lapses() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();
    let store = Arc::new(InMemoryStore::default());
    store.seed_subscription(active_record(user_id, Utc::now() + Duration::days(10)));

    let service = service_with(store.clone(), &server.uri(), "TEST-token");

    let canceled = service.cancel(user_id).await.unwrap();
    assert!(canceled.is_pro);
    assert_eq!(canceled.status, SubscriptionStatus::Canceled);

    let status = service.read_status(user_id).await.unwrap();
    assert!(status.is_pro);
    assert_eq!(status.status, SubscriptionStatus::Canceled);
}

#[tokio::test]
async fn cancel_without_active_subscription_is_not_found() {
    let server = MockServer::start().await;
    let store = Arc::new(InMemoryStore::default());
    let service = service_with(store, &server.uri(), "TEST-token");

    let err = service.cancel(Uuid::new_v4()).await.unwrap_err();
    assert!(err.to_string().contains("No active subscription"));
}

#[tokio::test]
async fn user_without_a_row_reads_as_free() {
    let server = MockServer::start().await;
    let store = Arc::new(InMemoryStore::default());
    let service = service_with(store, &server.uri(), "TEST-token");

    let status = service.read_status(Uuid::new_v4()).await.unwrap();
    assert!(!status.is_pro);
    assert_eq!(status.status, SubscriptionStatus::Free);
    assert!(status.plan.is_none());
}

#[tokio::test]
async fn checkout_fails_fast_when_gateway_is_unconfigured() {
    let store = Arc::new(InMemoryStore::default());
    let service = service_with(store, "http://localhost:1", "");

    let err = service
        .create_checkout(Uuid::new_v4(), "dev@example.com", "monthly")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not configured"));
}

#[tokio::test]
async fn checkout_with_unsupported_plan_never_reaches_the_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/checkout/preferences"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryStore::default());
    let service = service_with(store, &server.uri(), "TEST-token");

    let err = service
        .create_checkout(Uuid::new_v4(), "dev@example.com", "weekly")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unsupported plan"));
}

#[tokio::test]
async fn checkout_threads_the_correlation_token_through_the_gateway() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/checkout/preferences"))
        .and(body_string_contains(format!("{user_id}:annual")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "pref-1",
            "init_point": "https://mercadopago.example/checkout/pref-1",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryStore::default());
    let service = service_with(store, &server.uri(), "TEST-token");

    let response = service
        .create_checkout(user_id, "dev@example.com", "annual")
        .await
        .unwrap();
    assert_eq!(response.preference_id, "pref-1");
    assert_eq!(
        response.checkout_url,
        "https://mercadopago.example/checkout/pref-1"
    );
}
