use super::error::SimError;
use super::solver::{SolveOutcome, Wrapper, solve_gross_for_net};
use super::types::{AccountState, RateConfig, SimulationResult, WithdrawalSpec};

/// Terminal sub-state: once a required withdrawal cannot be fully satisfied
/// the account is emptied and every later period pays out nothing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AccountStatus {
    Active,
    Depleted,
}

/// What one period actually paid out. Flows back up to the runner unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeriodOutcome {
    pub gross: f64,
    pub net: f64,
    pub tax: f64,
    pub fee: f64,
    pub allowance_used: f64,
}

/// Advances a single account month by month: growth, management fee (AV),
/// net-target resolution through the solver, and the withdrawal bookkeeping.
/// Owns its `AccountState`; nothing else mutates it.
#[derive(Debug)]
pub struct AccountEngine {
    wrapper: Wrapper,
    withdrawal: WithdrawalSpec,
    initial_capital: f64,
    state: AccountState,
    status: AccountStatus,
}

impl AccountEngine {
    /// The only place malformed inputs are rejected; every later operation is
    /// total.
    pub fn new(
        wrapper: Wrapper,
        initial_capital: f64,
        withdrawal: WithdrawalSpec,
        config: &RateConfig,
    ) -> Result<Self, SimError> {
        config.validate()?;
        withdrawal.validate()?;
        if !initial_capital.is_finite() || initial_capital <= 0.0 {
            return Err(SimError::NonPositiveAmount {
                field: "initial_capital",
                value: initial_capital,
            });
        }
        Ok(Self {
            wrapper,
            withdrawal,
            initial_capital,
            state: AccountState::from_initial_capital(initial_capital, config),
            status: AccountStatus::Active,
        })
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn state(&self) -> &AccountState {
        &self.state
    }

    /// Advances one monthly period. `period` is 1-based; every 12th period
    /// closes a calendar year and refills the AV allowance.
    pub fn step(&mut self, config: &RateConfig, period: u32) -> Result<PeriodOutcome, SimError> {
        self.state.balance *= 1.0 + config.monthly_growth();
        if self.wrapper == Wrapper::AssuranceVie {
            // Management fee comes out of the balance, never the basis.
            self.state.balance *= 1.0 - config.av_monthly_fee();
        }

        let target_net = self.target_net();
        let outcome = if self.status == AccountStatus::Active {
            match solve_gross_for_net(target_net, &self.state, config, self.wrapper)? {
                SolveOutcome::Converged(breakdown) => {
                    self.apply_withdrawal(&breakdown);
                    PeriodOutcome {
                        gross: breakdown.gross,
                        net: breakdown.net,
                        tax: breakdown.tax,
                        fee: breakdown.fee,
                        allowance_used: breakdown.allowance_used,
                    }
                }
                SolveOutcome::Unreachable => {
                    // Liquidate: withdraw whatever is left, record the net it
                    // yields, and stop paying out from here on.
                    let breakdown = self.wrapper.breakdown(self.state.balance, &self.state, config);
                    self.apply_withdrawal(&breakdown);
                    self.state.balance = 0.0;
                    self.state.basis = 0.0;
                    self.status = AccountStatus::Depleted;
                    PeriodOutcome {
                        gross: breakdown.gross,
                        net: breakdown.net,
                        tax: breakdown.tax,
                        fee: breakdown.fee,
                        allowance_used: breakdown.allowance_used,
                    }
                }
            }
        } else {
            PeriodOutcome::default()
        };

        if self.wrapper == Wrapper::AssuranceVie && period % 12 == 0 {
            // Year boundary: unused allowance does not carry over.
            self.state.allowance_remaining = config.annual_allowance;
        }

        Ok(outcome)
    }

    pub fn into_result(self) -> SimulationResult {
        SimulationResult {
            final_balance: self.state.balance,
            cumulative_net_withdrawals: self.state.cumulative_net,
            cumulative_tax: self.state.cumulative_tax,
            cumulative_fees: self.state.cumulative_fees,
            total_net_wealth: self.state.balance + self.state.cumulative_net,
        }
    }

    fn target_net(&self) -> f64 {
        match self.withdrawal {
            WithdrawalSpec::PercentOfInitial { annual_rate } => {
                self.initial_capital * annual_rate / 12.0
            }
            WithdrawalSpec::PercentOfBalance { annual_rate } => {
                self.state.balance * annual_rate / 12.0
            }
            WithdrawalSpec::FixedMonthly { net_amount } => net_amount,
        }
    }

    fn apply_withdrawal(&mut self, breakdown: &super::tax::WithdrawalBreakdown) {
        let state = &mut self.state;
        state.balance = (state.balance - breakdown.gross).max(0.0);
        state.basis = (state.basis - (breakdown.gross - breakdown.gains_portion)).max(0.0);

        // A proportional withdrawal leaves the bucket split unchanged, but
        // renormalize so the fractions keep summing to exactly 1 instead of
        // drifting over hundreds of periods.
        let sum = state.low_bucket_fraction + state.high_bucket_fraction;
        if sum > 0.0 {
            state.low_bucket_fraction /= sum;
            state.high_bucket_fraction /= sum;
        } else {
            state.low_bucket_fraction = 1.0;
            state.high_bucket_fraction = 0.0;
        }

        state.allowance_remaining = (state.allowance_remaining - breakdown.allowance_used).max(0.0);
        state.cumulative_net += breakdown.net;
        state.cumulative_tax += breakdown.tax;
        state.cumulative_fees += breakdown.fee;
    }
}
