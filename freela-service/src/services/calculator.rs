//! Rate calculation engine.
//!
//! Pure computation from a [`RateInput`] and an injected [`FiscalTable`] to a
//! [`RateResult`]. All arithmetic is exact `Decimal`; monetary outputs are
//! rounded to 2 decimal places at the very end using round-half-even.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

use crate::models::{RateInput, RateResult};
use crate::services::tax::FiscalTable;

/// Calculation failures. All are input problems reported to the caller;
/// the engine never returns a partial result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateError {
    #[error("profit margin must be below 100%")]
    InvalidMargin,
    #[error("working schedule yields zero billable hours per month")]
    DegenerateSchedule,
}

/// Regime-aware billing-rate calculator over one fiscal year's parameters.
#[derive(Debug, Clone)]
pub struct RateCalculator {
    fiscal: FiscalTable,
}

impl RateCalculator {
    pub fn new(fiscal: FiscalTable) -> Self {
        Self { fiscal }
    }

    pub fn fiscal(&self) -> &FiscalTable {
        &self.fiscal
    }

    /// Convert an income goal into billing rates.
    ///
    /// Deterministic: the same input always produces the same result.
    pub fn calculate(&self, input: &RateInput) -> Result<RateResult, RateError> {
        // 1. Working time. Fractional days/month are kept unrounded until the
        // final integer reporting fields.
        let weeks_per_year = dec!(52) - Decimal::from(input.vacation_weeks);
        let days_per_year = Decimal::from(input.days_per_week) * weeks_per_year;
        let days_per_month = days_per_year / dec!(12);
        let hours_per_month = Decimal::from(input.hours_per_day) * days_per_month;

        // 2. Taxes by regime.
        let monthly_taxes = self
            .fiscal
            .monthly_tax(input.tax_regime, input.desired_monthly_income);

        // 3. Provisions: 13th salary and vacation bonus are independent
        // additive reserves.
        let mut monthly_provisions = Decimal::ZERO;
        if input.include_13th_salary {
            monthly_provisions += input.desired_monthly_income / dec!(12);
        }
        if input.include_vacation_bonus {
            monthly_provisions += input.desired_monthly_income / dec!(3) / dec!(12);
        }

        // 4. Total monthly cost basis.
        let total_monthly_costs = input.desired_monthly_income
            + monthly_taxes
            + monthly_provisions
            + input.monthly_expenses
            + input.variable_expenses;

        // 5. Margin. A margin of 100% or more would divide by zero or flip
        // the sign.
        if input.profit_margin_percentage >= dec!(100) {
            return Err(RateError::InvalidMargin);
        }
        let margin = input.profit_margin_percentage / dec!(100);
        let monthly_rate = total_monthly_costs / (Decimal::ONE - margin);

        // 6. Per-unit rates. Guard the derived divisor explicitly: callers
        // constructing inputs outside the validated bounds must not crash.
        if hours_per_month.is_zero() {
            return Err(RateError::DegenerateSchedule);
        }
        let hourly_rate = monthly_rate / hours_per_month;
        let daily_rate = hourly_rate * Decimal::from(input.hours_per_day);
        let weekly_rate = daily_rate * Decimal::from(input.days_per_week);

        // 7. Project-size suggestions at fixed hour multipliers.
        let small_project_value = hourly_rate * dec!(30);
        let medium_project_value = hourly_rate * dec!(100);
        let large_project_value = hourly_rate * dec!(200);

        // 8. Round monetary outputs to cents, half to even.
        let round = |value: Decimal| value.round_dp(2);

        Ok(RateResult {
            hourly_rate: round(hourly_rate),
            daily_rate: round(daily_rate),
            weekly_rate: round(weekly_rate),
            monthly_rate: round(monthly_rate),

            total_monthly_costs: round(total_monthly_costs),
            total_annual_costs: round(total_monthly_costs * dec!(12)),
            monthly_taxes: round(monthly_taxes),
            monthly_provisions: round(monthly_provisions),
            net_monthly_income: input.desired_monthly_income,

            working_hours_per_month: hours_per_month.trunc().to_u32().unwrap_or(0),
            working_days_per_month: days_per_month.trunc().to_u32().unwrap_or(0),
            tax_regime: input.tax_regime,

            small_project_value: round(small_project_value),
            medium_project_value: round(medium_project_value),
            large_project_value: round(large_project_value),
        })
    }
}
