use super::error::SimError;
use super::runner::run_scenario;
use super::types::{GridRow, GridSpec, RateConfig, ScenarioParams};

/// Repeats the scenario over an arithmetic range of initial capitals.
/// Capitals are computed as `min + i * step` so the emitted progression is
/// exact and strictly increasing regardless of accumulation order; each row
/// is an independent run against the shared read-only config.
pub fn sweep_grid(
    params: &ScenarioParams,
    config: &RateConfig,
    grid: &GridSpec,
) -> Result<Vec<GridRow>, SimError> {
    grid.validate()?;

    // Small epsilon so `max` itself stays inclusive despite float division.
    let count = ((grid.max - grid.min) / grid.step + 1e-9).floor() as usize + 1;
    let mut rows = Vec::with_capacity(count);
    for idx in 0..count {
        let capital = grid.min + idx as f64 * grid.step;
        let run = ScenarioParams {
            initial_capital: capital,
            ..*params
        };
        let outcome = run_scenario(&run, config)?;
        rows.push(GridRow {
            capital,
            av: outcome.av,
            cto: outcome.cto,
            wealth_difference: outcome.wealth_difference,
        });
    }
    Ok(rows)
}

/// First capital where the AV−CTO difference changes sign, linearly
/// interpolated between the bracketing rows. `None` when the sweep is
/// one-sided.
pub fn break_even_capital(rows: &[GridRow]) -> Option<f64> {
    for pair in rows.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.wealth_difference == 0.0 {
            return Some(a.capital);
        }
        if a.wealth_difference.signum() != b.wealth_difference.signum() {
            let span = b.wealth_difference - a.wealth_difference;
            let t = if span.abs() > f64::EPSILON {
                -a.wealth_difference / span
            } else {
                0.0
            };
            return Some(a.capital + t * (b.capital - a.capital));
        }
    }
    rows.last()
        .filter(|row| row.wealth_difference == 0.0)
        .map(|row| row.capital)
}

/// Row whose difference is closest to zero, for one-sided sweeps.
pub fn closest_to_break_even(rows: &[GridRow]) -> Option<&GridRow> {
    rows.iter().min_by(|a, b| {
        a.wealth_difference
            .abs()
            .total_cmp(&b.wealth_difference.abs())
    })
}
