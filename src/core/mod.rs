mod engine;
mod error;
mod grid;
mod runner;
mod solver;
mod tax;
mod types;

pub use engine::{AccountEngine, AccountStatus, PeriodOutcome};
pub use error::SimError;
pub use grid::{break_even_capital, closest_to_break_even, sweep_grid};
pub use runner::run_scenario;
pub use solver::{
    GROSS_TOLERANCE, MAX_ITERATIONS, NET_TOLERANCE, SolveOutcome, Wrapper, solve_gross_for_net,
};
pub use tax::{WithdrawalBreakdown, av_withdrawal, cto_withdrawal};
pub use types::{
    AccountState, GridRow, GridSpec, RateConfig, ScenarioOutcome, ScenarioParams,
    SimulationResult, WithdrawalSpec,
};
