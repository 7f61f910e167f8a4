//! MercadoPago payment gateway client.
//!
//! Implements preference creation for checkout initiation and payment
//! lookup by id for webhook reconciliation. The gateway is treated as an
//! opaque remote service; this client never interprets subscription state.

use anyhow::{anyhow, Result};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::MercadoPagoConfig;

/// MercadoPago REST client.
#[derive(Clone)]
pub struct MercadoPagoClient {
    client: Client,
    config: MercadoPagoConfig,
}

/// One purchasable line item in a checkout preference.
#[derive(Debug, Clone, Serialize)]
pub struct PreferenceItem {
    pub title: String,
    pub quantity: u32,
    pub currency_id: String,
    pub unit_price: Decimal,
}

#[derive(Debug, Serialize)]
struct CreatePreferenceRequest {
    items: Vec<PreferenceItem>,
    payer: PreferencePayer,
    back_urls: BackUrls,
    auto_return: String,
    /// Opaque correlation token echoed back on the payment record.
    external_reference: String,
}

#[derive(Debug, Serialize)]
struct PreferencePayer {
    email: String,
}

#[derive(Debug, Serialize)]
struct BackUrls {
    success: String,
    failure: String,
    pending: String,
}

/// Response from preference creation.
#[derive(Debug, Deserialize)]
pub struct Preference {
    pub id: String,
    /// Checkout URL the payer is redirected to.
    pub init_point: String,
    #[serde(default)]
    pub sandbox_init_point: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
}

/// Authoritative payment record fetched by id.
#[derive(Debug, Deserialize)]
pub struct GatewayPayment {
    pub id: u64,
    pub status: String,
    #[serde(default)]
    pub transaction_amount: Option<Decimal>,
    #[serde(default)]
    pub external_reference: Option<String>,
}

/// MercadoPago API error body.
#[derive(Debug, Deserialize)]
struct GatewayError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: u16,
}

impl MercadoPagoClient {
    pub fn new(config: MercadoPagoConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    /// Check whether gateway credentials are set.
    pub fn is_configured(&self) -> bool {
        !self.config.access_token.expose_secret().is_empty()
    }

    /// Create a checkout preference.
    ///
    /// `external_reference` is threaded through the gateway untouched and
    /// comes back on the payment record, so the asynchronous notification can
    /// be attributed without a prior lookup.
    pub async fn create_preference(
        &self,
        items: Vec<PreferenceItem>,
        payer_email: &str,
        external_reference: &str,
    ) -> Result<Preference> {
        if !self.is_configured() {
            return Err(anyhow!("MercadoPago credentials not configured"));
        }

        let request = CreatePreferenceRequest {
            items,
            payer: PreferencePayer {
                email: payer_email.to_string(),
            },
            back_urls: BackUrls {
                success: self.config.back_url.clone(),
                failure: self.config.back_url.clone(),
                pending: self.config.back_url.clone(),
            },
            auto_return: "approved".to_string(),
            external_reference: external_reference.to_string(),
        };

        let url = format!("{}/checkout/preferences", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, "MercadoPago create_preference response");

        if status.is_success() {
            let preference: Preference = serde_json::from_str(&body)?;
            tracing::info!(
                preference_id = %preference.id,
                "MercadoPago preference created"
            );
            Ok(preference)
        } else {
            let error: GatewayError = serde_json::from_str(&body).unwrap_or(GatewayError {
                message: body.clone(),
                status: status.as_u16(),
            });
            tracing::error!(
                status = error.status,
                message = %error.message,
                "MercadoPago preference creation failed"
            );
            Err(anyhow!("MercadoPago error: {}", error.message))
        }
    }

    /// Fetch a payment by its gateway id.
    pub async fn get_payment(&self, payment_id: &str) -> Result<GatewayPayment> {
        if !self.is_configured() {
            return Err(anyhow!("MercadoPago credentials not configured"));
        }

        let url = format!("{}/v1/payments/{}", self.config.api_base_url, payment_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.config.access_token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            let payment: GatewayPayment = serde_json::from_str(&body)?;
            Ok(payment)
        } else {
            Err(anyhow!("Failed to fetch MercadoPago payment: {}", body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn test_config(token: &str) -> MercadoPagoConfig {
        MercadoPagoConfig {
            access_token: Secret::new(token.to_string()),
            api_base_url: "https://api.mercadopago.com".to_string(),
            back_url: "http://localhost:5173/premium".to_string(),
            timeout_seconds: 10,
        }
    }

    #[test]
    fn configured_only_with_access_token() {
        assert!(MercadoPagoClient::new(test_config("TEST-token")).is_configured());
        assert!(!MercadoPagoClient::new(test_config("")).is_configured());
    }

    #[tokio::test]
    async fn unconfigured_client_fails_without_network_call() {
        let client = MercadoPagoClient::new(test_config(""));
        let err = client.get_payment("123").await.unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn payment_deserializes_with_missing_optional_fields() {
        let payment: GatewayPayment =
            serde_json::from_str(r#"{"id": 42, "status": "approved"}"#).unwrap();
        assert_eq!(payment.id, 42);
        assert_eq!(payment.status, "approved");
        assert!(payment.external_reference.is_none());
        assert!(payment.transaction_amount.is_none());
    }
}
