use anyhow::{Context, Result};
use dotenvy::dotenv;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

use crate::models::PlanType;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub mercadopago: MercadoPagoConfig,
    pub plans: PlanPricing,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: Secret<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct MercadoPagoConfig {
    pub access_token: Secret<String>,
    pub api_base_url: String,
    /// Where the gateway sends the payer back after checkout.
    pub back_url: String,
    pub timeout_seconds: u64,
}

/// Premium plan prices in BRL.
#[derive(Deserialize, Clone, Debug)]
pub struct PlanPricing {
    pub monthly: Decimal,
    pub annual: Decimal,
}

impl PlanPricing {
    pub fn price_for(&self, plan: PlanType) -> Decimal {
        match plan {
            PlanType::Monthly => self.monthly,
            PlanType::Annual => self.annual,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("FREELA_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("FREELA_SERVICE_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()?;

        let db_url = env::var("FREELA_DATABASE_URL").context("FREELA_DATABASE_URL must be set")?;
        let max_connections = env::var("FREELA_DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let min_connections = env::var("FREELA_DATABASE_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?;

        let jwt_secret = env::var("FREELA_JWT_SECRET").unwrap_or_else(|_| "dev-secret".to_string());

        // An empty access token leaves the gateway client unconfigured; checkout
        // then fails with a service-level error instead of a panic.
        let mp_access_token = env::var("MERCADOPAGO_ACCESS_TOKEN").unwrap_or_default();
        let mp_base_url = env::var("MERCADOPAGO_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.mercadopago.com".to_string());
        let back_url = env::var("FREELA_CHECKOUT_BACK_URL")
            .unwrap_or_else(|_| "http://localhost:5173/premium".to_string());
        let mp_timeout_seconds = env::var("MERCADOPAGO_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;

        let monthly_price = match env::var("FREELA_PLAN_MONTHLY_PRICE") {
            Ok(raw) => raw
                .parse()
                .context("FREELA_PLAN_MONTHLY_PRICE must be a decimal amount")?,
            Err(_) => dec!(29.90),
        };
        let annual_price = match env::var("FREELA_PLAN_ANNUAL_PRICE") {
            Ok(raw) => raw
                .parse()
                .context("FREELA_PLAN_ANNUAL_PRICE must be a decimal amount")?,
            Err(_) => dec!(299.00),
        };

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections,
                min_connections,
            },
            auth: AuthConfig {
                jwt_secret: Secret::new(jwt_secret),
            },
            mercadopago: MercadoPagoConfig {
                access_token: Secret::new(mp_access_token),
                api_base_url: mp_base_url,
                back_url,
                timeout_seconds: mp_timeout_seconds,
            },
            plans: PlanPricing {
                monthly: monthly_price,
                annual: annual_price,
            },
            service_name: "freela-service".to_string(),
        })
    }
}
