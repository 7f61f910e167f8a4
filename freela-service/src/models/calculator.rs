//! Rate calculator input and output models.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Brazilian tax regimes supported by the calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaxRegime {
    Mei,
    PjSimples,
    PjPresumido,
    Autonomo,
}

impl TaxRegime {
    pub const ALL: [TaxRegime; 4] = [
        TaxRegime::Mei,
        TaxRegime::PjSimples,
        TaxRegime::PjPresumido,
        TaxRegime::Autonomo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaxRegime::Mei => "MEI",
            TaxRegime::PjSimples => "PJ_SIMPLES",
            TaxRegime::PjPresumido => "PJ_PRESUMIDO",
            TaxRegime::Autonomo => "AUTONOMO",
        }
    }
}

impl fmt::Display for TaxRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Regime identifier outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown tax regime '{0}'; expected one of MEI, PJ_SIMPLES, PJ_PRESUMIDO, AUTONOMO")]
pub struct UnknownRegime(pub String);

impl FromStr for TaxRegime {
    type Err = UnknownRegime;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MEI" => Ok(TaxRegime::Mei),
            "PJ_SIMPLES" => Ok(TaxRegime::PjSimples),
            "PJ_PRESUMIDO" => Ok(TaxRegime::PjPresumido),
            "AUTONOMO" => Ok(TaxRegime::Autonomo),
            other => Err(UnknownRegime(other.to_string())),
        }
    }
}

/// What the contractor wants to earn and how they plan to work.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RateInput {
    #[validate(custom(function = "positive_amount"))]
    pub desired_monthly_income: Decimal,
    #[validate(range(min = 1, max = 16))]
    pub hours_per_day: u32,
    #[validate(range(min = 1, max = 7))]
    pub days_per_week: u32,
    #[serde(default = "default_vacation_weeks")]
    #[validate(range(min = 0, max = 8))]
    pub vacation_weeks: u32,
    pub tax_regime: TaxRegime,
    #[serde(default = "default_true")]
    pub include_13th_salary: bool,
    #[serde(default = "default_true")]
    pub include_vacation_bonus: bool,
    #[serde(default)]
    #[validate(custom(function = "non_negative_amount"))]
    pub monthly_expenses: Decimal,
    #[serde(default)]
    #[validate(custom(function = "non_negative_amount"))]
    pub variable_expenses: Decimal,
    #[serde(default = "default_profit_margin")]
    #[validate(custom(function = "margin_below_one_hundred"))]
    pub profit_margin_percentage: Decimal,
}

fn default_vacation_weeks() -> u32 {
    4
}

fn default_true() -> bool {
    true
}

fn default_profit_margin() -> Decimal {
    dec!(20)
}

fn positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("must_be_positive"));
    }
    Ok(())
}

fn non_negative_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("must_not_be_negative"));
    }
    Ok(())
}

fn margin_below_one_hundred(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value >= dec!(100) {
        return Err(ValidationError::new("margin_out_of_range"));
    }
    Ok(())
}

/// Full rate breakdown for a calculator input.
///
/// All monetary fields are rounded to 2 decimal places; the working-time
/// fields are truncated integers for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateResult {
    pub hourly_rate: Decimal,
    pub daily_rate: Decimal,
    pub weekly_rate: Decimal,
    pub monthly_rate: Decimal,

    pub total_monthly_costs: Decimal,
    pub total_annual_costs: Decimal,
    pub monthly_taxes: Decimal,
    pub monthly_provisions: Decimal,
    pub net_monthly_income: Decimal,

    pub working_hours_per_month: u32,
    pub working_days_per_month: u32,
    pub tax_regime: TaxRegime,

    pub small_project_value: Decimal,
    pub medium_project_value: Decimal,
    pub large_project_value: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regime_round_trips_through_from_str() {
        for regime in TaxRegime::ALL {
            assert_eq!(regime.as_str().parse::<TaxRegime>().unwrap(), regime);
        }
    }

    #[test]
    fn unknown_regime_is_rejected() {
        let err = "CLT".parse::<TaxRegime>().unwrap_err();
        assert_eq!(err, UnknownRegime("CLT".to_string()));
    }

    #[test]
    fn regime_serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&TaxRegime::PjSimples).unwrap();
        assert_eq!(json, "\"PJ_SIMPLES\"");
    }

    #[test]
    fn validation_rejects_out_of_range_schedule() {
        let input = RateInput {
            desired_monthly_income: dec!(5000),
            hours_per_day: 20,
            days_per_week: 5,
            vacation_weeks: 4,
            tax_regime: TaxRegime::Mei,
            include_13th_salary: true,
            include_vacation_bonus: true,
            monthly_expenses: Decimal::ZERO,
            variable_expenses: Decimal::ZERO,
            profit_margin_percentage: dec!(20),
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn validation_rejects_margin_at_one_hundred() {
        let input = RateInput {
            desired_monthly_income: dec!(5000),
            hours_per_day: 8,
            days_per_week: 5,
            vacation_weeks: 4,
            tax_regime: TaxRegime::Mei,
            include_13th_salary: true,
            include_vacation_bonus: true,
            monthly_expenses: Decimal::ZERO,
            variable_expenses: Decimal::ZERO,
            profit_margin_percentage: dec!(100),
        };
        assert!(input.validate().is_err());
    }
}
