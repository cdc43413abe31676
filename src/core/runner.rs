use super::engine::AccountEngine;
use super::error::SimError;
use super::solver::Wrapper;
use super::types::{RateConfig, ScenarioOutcome, ScenarioParams};

/// Runs one AV engine and one CTO engine over the same monthly periods with
/// the same withdrawal schedule. The two accounts share nothing but the
/// read-only inputs, so neither can influence the other.
pub fn run_scenario(
    params: &ScenarioParams,
    config: &RateConfig,
) -> Result<ScenarioOutcome, SimError> {
    params.validate()?;

    let mut av = AccountEngine::new(
        Wrapper::AssuranceVie,
        params.initial_capital,
        params.withdrawal,
        config,
    )?;
    let mut cto = AccountEngine::new(
        Wrapper::Cto,
        params.initial_capital,
        params.withdrawal,
        config,
    )?;

    for period in 1..=params.periods() {
        av.step(config, period)?;
        cto.step(config, period)?;
    }

    let av = av.into_result();
    let cto = cto.into_result();
    Ok(ScenarioOutcome {
        wealth_difference: av.total_net_wealth - cto.total_net_wealth,
        av,
        cto,
    })
}
