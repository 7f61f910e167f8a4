pub mod calculator;
pub mod jwt;
pub mod ledger;
pub mod mercadopago;
pub mod metrics;
pub mod subscription;
pub mod tax;
