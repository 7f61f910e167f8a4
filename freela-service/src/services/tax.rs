//! Tax regime catalog: fiscal-year constants and per-regime levy formulas.
//!
//! All parameters live in [`FiscalTable`] so that a new fiscal year is a new
//! table, not a code change. The progressive IR schedule is a data-driven
//! bracket list evaluated as `income × rate − deduction`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::models::TaxRegime;

/// One row of a progressive bracket table.
#[derive(Debug, Clone)]
pub struct TaxBracket {
    /// Inclusive upper income bound; `None` marks the top bracket.
    pub upper: Option<Decimal>,
    /// Marginal rate as a fraction (0.15 = 15%).
    pub rate: Decimal,
    /// Subtraction constant for the rate-minus-deduction formula.
    pub deduction: Decimal,
}

/// Immutable fiscal-year parameters for every supported regime.
///
/// Injected by value into the calculator; never a process-wide singleton, so
/// point-in-time fiscal updates are testable in isolation.
#[derive(Debug, Clone)]
pub struct FiscalTable {
    pub year: u16,
    /// MEI DAS: fixed monthly levy, independent of income.
    pub mei_monthly_levy: Decimal,
    /// Reference minimum wage for the AUTONOMO INSS base.
    pub minimum_wage: Decimal,
    /// Simples Nacional (Anexo III, initial band), percent of income.
    pub simples_rate: Decimal,
    /// Lucro Presumido blended rate, percent of income.
    pub presumido_rate: Decimal,
    /// INSS fraction applied to the minimum wage for AUTONOMO.
    pub inss_rate: Decimal,
    /// Progressive IR schedule, ordered by ascending upper bound.
    pub ir_brackets: Vec<TaxBracket>,
}

impl FiscalTable {
    /// 2025 constants.
    pub fn brazil_2025() -> Self {
        Self {
            year: 2025,
            mei_monthly_levy: dec!(81.90),
            minimum_wage: dec!(1518.00),
            simples_rate: dec!(6.0),
            presumido_rate: dec!(16.33),
            inss_rate: dec!(0.20),
            ir_brackets: vec![
                TaxBracket {
                    upper: Some(dec!(2259.20)),
                    rate: Decimal::ZERO,
                    deduction: Decimal::ZERO,
                },
                TaxBracket {
                    upper: Some(dec!(2828.65)),
                    rate: dec!(0.075),
                    deduction: dec!(169.44),
                },
                TaxBracket {
                    upper: Some(dec!(3751.05)),
                    rate: dec!(0.15),
                    deduction: dec!(381.44),
                },
                TaxBracket {
                    upper: Some(dec!(4664.68)),
                    rate: dec!(0.225),
                    deduction: dec!(662.77),
                },
                TaxBracket {
                    upper: None,
                    rate: dec!(0.275),
                    deduction: dec!(896.00),
                },
            ],
        }
    }

    /// Monthly tax owed under `regime` for the given gross monthly income.
    pub fn monthly_tax(&self, regime: TaxRegime, monthly_income: Decimal) -> Decimal {
        match regime {
            TaxRegime::Mei => self.mei_monthly_levy,
            TaxRegime::PjSimples => monthly_income * self.simples_rate / dec!(100),
            TaxRegime::PjPresumido => monthly_income * self.presumido_rate / dec!(100),
            TaxRegime::Autonomo => {
                self.minimum_wage * self.inss_rate + self.progressive_tax(monthly_income)
            }
        }
    }

    /// Progressive IR: `income × rate − deduction` for the bracket containing
    /// `monthly_income`. Income within the first (zero-rate) bracket owes
    /// nothing.
    pub fn progressive_tax(&self, monthly_income: Decimal) -> Decimal {
        for bracket in &self.ir_brackets {
            match bracket.upper {
                Some(upper) if monthly_income > upper => continue,
                _ => return monthly_income * bracket.rate - bracket.deduction,
            }
        }
        Decimal::ZERO
    }

    /// Descriptive metadata for a regime.
    pub fn describe(&self, regime: TaxRegime) -> RegimeInfo {
        match regime {
            TaxRegime::Mei => RegimeInfo {
                regime,
                name: "Microempreendedor Individual (MEI)".to_string(),
                percentage: format!("R$ {} fixed monthly (DAS)", self.mei_monthly_levy),
                description: format!(
                    "Fixed monthly levy of R$ {} (DAS {}), independent of revenue",
                    self.mei_monthly_levy, self.year
                ),
                annual_revenue_limit: "Up to R$ 81,000 per year".to_string(),
                benefits: vec![
                    "Simple".to_string(),
                    "Cheap".to_string(),
                    "Few reporting obligations".to_string(),
                ],
                drawbacks: vec![
                    "Revenue cap".to_string(),
                    "At most one employee".to_string(),
                ],
            },
            TaxRegime::PjSimples => RegimeInfo {
                regime,
                name: "Simples Nacional - Anexo III".to_string(),
                percentage: "6% to 33%".to_string(),
                description: format!("Starting rate of {}% over revenue", self.simples_rate),
                annual_revenue_limit: "Up to R$ 4.8 million per year".to_string(),
                benefits: vec![
                    "Less bureaucracy".to_string(),
                    "Progressive rate bands".to_string(),
                ],
                drawbacks: vec![
                    "Rate grows with revenue".to_string(),
                    "Ancillary filing obligations".to_string(),
                ],
            },
            TaxRegime::PjPresumido => RegimeInfo {
                regime,
                name: "Lucro Presumido".to_string(),
                percentage: format!("~{}%", self.presumido_rate),
                description: "IR + CSLL + PIS/COFINS + ISS blended rate".to_string(),
                annual_revenue_limit: "Up to R$ 78 million per year".to_string(),
                benefits: vec![
                    "Predictable".to_string(),
                    "Good for high-margin work".to_string(),
                ],
                drawbacks: vec![
                    "More complex".to_string(),
                    "More expensive than Simples at entry".to_string(),
                ],
            },
            TaxRegime::Autonomo => RegimeInfo {
                regime,
                name: "Autônomo (Pessoa Física)".to_string(),
                percentage: "20% INSS + progressive IR".to_string(),
                description: format!(
                    "INSS of 20% over the R$ {} minimum wage plus progressive IR",
                    self.minimum_wage
                ),
                annual_revenue_limit: "No limit".to_string(),
                benefits: vec!["Flexible".to_string(), "No company paperwork".to_string()],
                drawbacks: vec![
                    "High progressive IR".to_string(),
                    "Fewer tax benefits".to_string(),
                ],
            },
        }
    }
}

/// Descriptive metadata for a tax regime.
#[derive(Debug, Clone, Serialize)]
pub struct RegimeInfo {
    pub regime: TaxRegime,
    pub name: String,
    pub percentage: String,
    pub description: String,
    pub annual_revenue_limit: String,
    pub benefits: Vec<String>,
    pub drawbacks: Vec<String>,
}
