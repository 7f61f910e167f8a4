pub mod calculator;
pub mod subscription;

pub use calculator::{RateInput, RateResult, TaxRegime, UnknownRegime};
pub use subscription::{
    PaymentEvent, PlanType, SubscriptionRecord, SubscriptionStatus, UnsupportedPlan,
};
