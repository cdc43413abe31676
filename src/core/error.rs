use thiserror::Error;

/// Failures the core can report. Validation variants are rejected before any
/// simulation starts; `SolverConvergence` indicates a numerical defect, not an
/// economic outcome. Account depletion is an ordinary state transition and
/// never appears here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("{field} must be between 0 and 1, got {value}")]
    RateOutOfRange { field: &'static str, value: f64 },

    #[error("{field} must be >= 0, got {value}")]
    NegativeAmount { field: &'static str, value: f64 },

    #[error("{field} must be > 0, got {value}")]
    NonPositiveAmount { field: &'static str, value: f64 },

    #[error("horizon must be at least one year")]
    InvalidHorizon,

    #[error("grid range requires 0 < min < max and step > 0, got {min}:{max}:{step}")]
    InvalidGridRange { min: f64, max: f64, step: f64 },

    #[error(
        "withdrawal solver did not converge within {max_iterations} iterations \
         for target net {target_net:.2}"
    )]
    SolverConvergence { target_net: f64, max_iterations: u32 },
}
