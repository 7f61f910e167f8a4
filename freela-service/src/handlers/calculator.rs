//! Rate calculator endpoints. Public: no per-user state is involved.

use anyhow::anyhow;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use validator::Validate;

use service_core::error::AppError;

use crate::models::{RateInput, RateResult, TaxRegime};
use crate::services::metrics::RATE_CALCULATIONS_TOTAL;
use crate::services::tax::RegimeInfo;
use crate::AppState;

/// POST /api/calculator/calculate
pub async fn calculate(
    State(state): State<AppState>,
    Json(payload): Json<RateInput>,
) -> Result<Json<RateResult>, AppError> {
    payload.validate()?;

    let result = state
        .calculator
        .calculate(&payload)
        .map_err(|err| AppError::BadRequest(anyhow!(err)))?;

    RATE_CALCULATIONS_TOTAL
        .with_label_values(&[payload.tax_regime.as_str()])
        .inc();
    tracing::debug!(regime = %payload.tax_regime, "Rate calculation served");

    Ok(Json(result))
}

/// GET /api/calculator/tax-info/:regime
pub async fn tax_info(
    State(state): State<AppState>,
    Path(regime): Path<String>,
) -> Result<Json<RegimeInfo>, AppError> {
    let regime: TaxRegime = regime
        .parse()
        .map_err(|err| AppError::BadRequest(anyhow!("{err}")))?;
    Ok(Json(state.calculator.fiscal().describe(regime)))
}

#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    pub monthly_income: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct RegimeComparison {
    pub regime: TaxRegime,
    pub name: String,
    pub monthly_taxes: Decimal,
    pub hourly_rate: Decimal,
    pub monthly_rate: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CompareResponse {
    pub reference_income: Decimal,
    pub regimes: Vec<RegimeComparison>,
}

/// GET /api/calculator/compare?monthly_income=
///
/// Same reference working profile under every regime, so a user can see what
/// each regime costs them before picking one.
pub async fn compare(
    State(state): State<AppState>,
    Query(query): Query<CompareQuery>,
) -> Result<Json<CompareResponse>, AppError> {
    let reference_income = query.monthly_income.unwrap_or(dec!(5000));
    if reference_income <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow!(
            "monthly_income must be positive"
        )));
    }
    let mut regimes = Vec::with_capacity(TaxRegime::ALL.len());

    for regime in TaxRegime::ALL {
        let input = RateInput {
            desired_monthly_income: reference_income,
            hours_per_day: 8,
            days_per_week: 5,
            vacation_weeks: 4,
            tax_regime: regime,
            include_13th_salary: true,
            include_vacation_bonus: true,
            monthly_expenses: dec!(500),
            variable_expenses: dec!(200),
            profit_margin_percentage: dec!(20),
        };
        let result = state
            .calculator
            .calculate(&input)
            .map_err(|err| AppError::InternalError(anyhow!(err)))?;
        regimes.push(RegimeComparison {
            regime,
            name: state.calculator.fiscal().describe(regime).name,
            monthly_taxes: result.monthly_taxes,
            hourly_rate: result.hourly_rate,
            monthly_rate: result.monthly_rate,
        });
    }

    Ok(Json(CompareResponse {
        reference_income,
        regimes,
    }))
}
