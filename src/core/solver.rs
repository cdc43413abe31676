use super::error::SimError;
use super::tax::{WithdrawalBreakdown, av_withdrawal, cto_withdrawal};
use super::types::{AccountState, RateConfig};

/// The two wrappers the solver (and engine) can run against.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Wrapper {
    AssuranceVie,
    Cto,
}

impl Wrapper {
    /// Dispatch to the wrapper's pure tax/fee function.
    pub fn breakdown(
        self,
        gross: f64,
        state: &AccountState,
        config: &RateConfig,
    ) -> WithdrawalBreakdown {
        match self {
            Wrapper::AssuranceVie => av_withdrawal(gross, state, config),
            Wrapper::Cto => cto_withdrawal(gross, state, config),
        }
    }
}

/// Absolute tolerance on the achieved net amount, in euros. Sub-cent so the
/// monthly payout error stays invisible even over hundreds of periods.
pub const NET_TOLERANCE: f64 = 0.01;
/// Bracket width below which bisection stops refining.
pub const GROSS_TOLERANCE: f64 = 1e-6;
/// Iteration ceiling. Halving [0, balance] 100 times is far more than enough
/// for any representable balance, so exhausting this is a numerical defect.
pub const MAX_ITERATIONS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveOutcome {
    /// Gross withdrawal found whose net lands within `NET_TOLERANCE` of the
    /// target, with its full tax/fee breakdown.
    Converged(WithdrawalBreakdown),
    /// Even withdrawing the entire balance nets less than the target. The
    /// engine treats this as depletion, never as an error.
    Unreachable,
}

/// Inverts the wrapper's net(gross) function by bisection on [0, balance].
/// net(gross) is monotonically non-decreasing but piecewise-linear, with
/// kinks where the allowance or a bucket runs out; bisection is kink-agnostic
/// where a closed form would need case-splitting.
pub fn solve_gross_for_net(
    target_net: f64,
    state: &AccountState,
    config: &RateConfig,
    wrapper: Wrapper,
) -> Result<SolveOutcome, SimError> {
    if target_net <= 0.0 {
        return Ok(SolveOutcome::Converged(WithdrawalBreakdown::default()));
    }
    if state.balance <= 0.0 {
        return Ok(SolveOutcome::Unreachable);
    }

    let full = wrapper.breakdown(state.balance, state, config);
    if full.net < target_net - NET_TOLERANCE {
        return Ok(SolveOutcome::Unreachable);
    }

    let mut lo = 0.0_f64;
    let mut hi = state.balance;
    for _ in 0..MAX_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        let candidate = wrapper.breakdown(mid, state, config);
        if (candidate.net - target_net).abs() <= NET_TOLERANCE {
            return Ok(SolveOutcome::Converged(candidate));
        }
        if candidate.net < target_net {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= GROSS_TOLERANCE {
            return Ok(SolveOutcome::Converged(
                wrapper.breakdown(0.5 * (lo + hi), state, config),
            ));
        }
    }

    Err(SimError::SolverConvergence {
        target_net,
        max_iterations: MAX_ITERATIONS,
    })
}
