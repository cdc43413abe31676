use serde::Serialize;

use super::error::SimError;

/// Tax and fee parameters shared read-only by every run in a session.
/// Rates are fractions (0.172 = 17.2%), amounts are euros.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateConfig {
    pub annual_growth: f64,
    pub av_fee_annual: f64,
    pub cto_fee_rate: f64,
    pub cto_min_fee: f64,
    pub ps_rate: f64,
    pub pfu_income_rate: f64,
    pub av_income_low: f64,
    pub av_income_high: f64,
    pub av_premium_threshold: f64,
    pub annual_allowance: f64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            annual_growth: 0.05,
            av_fee_annual: 0.0075,
            cto_fee_rate: 0.00008,
            cto_min_fee: 3.0,
            ps_rate: 0.172,
            pfu_income_rate: 0.128,
            av_income_low: 0.075,
            av_income_high: 0.128,
            av_premium_threshold: 150_000.0,
            annual_allowance: 4_600.0,
        }
    }
}

impl RateConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        let rates = [
            ("annual_growth", self.annual_growth),
            ("av_fee_annual", self.av_fee_annual),
            ("cto_fee_rate", self.cto_fee_rate),
            ("ps_rate", self.ps_rate),
            ("pfu_income_rate", self.pfu_income_rate),
            ("av_income_low", self.av_income_low),
            ("av_income_high", self.av_income_high),
        ];
        for (field, value) in rates {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(SimError::RateOutOfRange { field, value });
            }
        }
        let amounts = [
            ("cto_min_fee", self.cto_min_fee),
            ("av_premium_threshold", self.av_premium_threshold),
            ("annual_allowance", self.annual_allowance),
        ];
        for (field, value) in amounts {
            if !value.is_finite() || value < 0.0 {
                return Err(SimError::NegativeAmount { field, value });
            }
        }
        Ok(())
    }

    /// Monthly growth rate that compounds to exactly `annual_growth` over 12
    /// periods.
    pub fn monthly_growth(&self) -> f64 {
        (1.0 + self.annual_growth).powf(1.0 / 12.0) - 1.0
    }

    /// Monthly AV management fee derived the same way, so 12 applications
    /// equal the annual fee.
    pub fn av_monthly_fee(&self) -> f64 {
        1.0 - (1.0 - self.av_fee_annual).powf(1.0 / 12.0)
    }

    /// Combined flat-tax rate applied to CTO gains.
    pub fn pfu_total(&self) -> f64 {
        self.ps_rate + self.pfu_income_rate
    }
}

/// Per-period net withdrawal target. Always a NET amount: the solver works
/// backwards to the gross figure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WithdrawalSpec {
    /// Annual rate applied to the initial capital, paid out in 12 equal
    /// monthly targets.
    PercentOfInitial { annual_rate: f64 },
    /// Annual rate applied to the balance at each period.
    PercentOfBalance { annual_rate: f64 },
    /// Fixed monthly net amount in euros.
    FixedMonthly { net_amount: f64 },
}

impl WithdrawalSpec {
    pub fn validate(&self) -> Result<(), SimError> {
        match *self {
            WithdrawalSpec::PercentOfInitial { annual_rate }
            | WithdrawalSpec::PercentOfBalance { annual_rate } => {
                if !annual_rate.is_finite() || !(0.0..=1.0).contains(&annual_rate) {
                    return Err(SimError::RateOutOfRange {
                        field: "withdrawal annual_rate",
                        value: annual_rate,
                    });
                }
            }
            WithdrawalSpec::FixedMonthly { net_amount } => {
                if !net_amount.is_finite() || net_amount < 0.0 {
                    return Err(SimError::NegativeAmount {
                        field: "withdrawal net_amount",
                        value: net_amount,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Mutable account state, owned and advanced exclusively by one
/// `AccountEngine`. The bucket fractions and allowance only matter for the AV
/// wrapper; CTO leaves them at their initial values.
#[derive(Debug, Clone, Copy)]
pub struct AccountState {
    pub balance: f64,
    pub basis: f64,
    /// Fraction of the basis attributable to premiums at or below the
    /// premium threshold. Together with `high_bucket_fraction` sums to 1.
    pub low_bucket_fraction: f64,
    pub high_bucket_fraction: f64,
    /// Income-tax allowance left for the current calendar year (AV).
    pub allowance_remaining: f64,
    pub cumulative_net: f64,
    pub cumulative_tax: f64,
    pub cumulative_fees: f64,
}

impl AccountState {
    /// Opens an account: the whole capital is basis, split across the two
    /// buckets at the premium threshold, with a full annual allowance.
    pub fn from_initial_capital(capital: f64, config: &RateConfig) -> Self {
        let low = capital.min(config.av_premium_threshold);
        let (low_fraction, high_fraction) = if capital > 0.0 {
            (low / capital, (capital - low) / capital)
        } else {
            (1.0, 0.0)
        };
        Self {
            balance: capital,
            basis: capital,
            low_bucket_fraction: low_fraction,
            high_bucket_fraction: high_fraction,
            allowance_remaining: config.annual_allowance,
            cumulative_net: 0.0,
            cumulative_tax: 0.0,
            cumulative_fees: 0.0,
        }
    }

    /// Share of any withdrawal that is gains rather than returned basis,
    /// clamped to [0, 1]. A zero balance has no gains by definition.
    pub fn gains_fraction(&self) -> f64 {
        if self.balance <= 0.0 {
            return 0.0;
        }
        ((self.balance - self.basis) / self.balance).clamp(0.0, 1.0)
    }
}

/// One scenario request: everything except the rates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioParams {
    pub initial_capital: f64,
    pub horizon_years: u32,
    pub withdrawal: WithdrawalSpec,
}

impl ScenarioParams {
    pub fn validate(&self) -> Result<(), SimError> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(SimError::NonPositiveAmount {
                field: "initial_capital",
                value: self.initial_capital,
            });
        }
        if self.horizon_years == 0 {
            return Err(SimError::InvalidHorizon);
        }
        self.withdrawal.validate()
    }

    pub fn periods(&self) -> u32 {
        self.horizon_years * 12
    }
}

/// Immutable summary of one completed account run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub final_balance: f64,
    pub cumulative_net_withdrawals: f64,
    pub cumulative_tax: f64,
    pub cumulative_fees: f64,
    /// `final_balance + cumulative_net_withdrawals`.
    pub total_net_wealth: f64,
}

/// Paired AV/CTO results for one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioOutcome {
    pub av: SimulationResult,
    pub cto: SimulationResult,
    /// AV total net wealth minus CTO total net wealth.
    pub wealth_difference: f64,
}

/// Arithmetic range of initial capitals for a grid sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl GridSpec {
    pub fn validate(&self) -> Result<(), SimError> {
        let finite = self.min.is_finite() && self.max.is_finite() && self.step.is_finite();
        if !finite || self.min <= 0.0 || self.min >= self.max || self.step <= 0.0 {
            return Err(SimError::InvalidGridRange {
                min: self.min,
                max: self.max,
                step: self.step,
            });
        }
        Ok(())
    }
}

/// One grid sweep row. Rows are emitted in strictly ascending capital order;
/// consumers locate the break-even capital by scanning for a sign change in
/// `wealth_difference`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRow {
    pub capital: f64,
    pub av: SimulationResult,
    pub cto: SimulationResult,
    pub wealth_difference: f64,
}
