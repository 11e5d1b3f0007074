use std::fmt;

/// Errors surfaced by the model, the integrator, and the sensitivity engines.
#[derive(Debug, Clone)]
pub enum SimError {
    /// Invalid configuration: unknown parameter name, non-finite value,
    /// inverted distribution bounds, bad solver options.
    Config(String),
    /// The adaptive integrator failed to converge (step underflow, step
    /// budget exhausted, or non-finite state) at time `t`.
    Integration { t: f64, detail: String },
    /// An age class was empty (Nj = 0 or Na = 0) where the model or the
    /// R0 estimate divides by it.
    DegenerateState { t: f64, nj: f64, na: f64 },
    /// A single design-row evaluation failed during batch sensitivity
    /// analysis. The whole batch is aborted; no partial indices are built.
    Sample { index: usize, source: Box<SimError> },
}

impl SimError {
    pub fn config(msg: impl Into<String>) -> Self {
        SimError::Config(msg.into())
    }
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Config(msg) => write!(f, "configuration error: {msg}"),
            SimError::Integration { t, detail } => {
                write!(f, "numerical integration failed at t={t}: {detail}")
            }
            SimError::DegenerateState { t, nj, na } => {
                write!(f, "degenerate state at t={t}: Nj={nj}, Na={na}")
            }
            SimError::Sample { index, source } => {
                write!(f, "sensitivity sample {index} failed: {source}")
            }
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::Sample { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type SimResult<T> = std::result::Result<T, SimError>;
