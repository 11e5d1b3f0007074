pub mod local;
pub mod sobol;

use serde::{Deserialize, Serialize};

use crate::model::tb::TbState;

/// Model outputs the sensitivity engines can track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputVar {
    Sj,
    Ej,
    Ij,
    Sa,
    Ea,
    Ia,
    /// Total population N.
    Total,
}

impl OutputVar {
    pub const ALL: [OutputVar; 7] = [
        OutputVar::Sj,
        OutputVar::Ej,
        OutputVar::Ij,
        OutputVar::Sa,
        OutputVar::Ea,
        OutputVar::Ia,
        OutputVar::Total,
    ];

    pub fn extract(&self, state: &TbState) -> f64 {
        match self {
            OutputVar::Sj => state.sj,
            OutputVar::Ej => state.ej,
            OutputVar::Ij => state.ij,
            OutputVar::Sa => state.sa,
            OutputVar::Ea => state.ea,
            OutputVar::Ia => state.ia,
            OutputVar::Total => state.total(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OutputVar::Sj => "Sj",
            OutputVar::Ej => "Ej",
            OutputVar::Ij => "Ij",
            OutputVar::Sa => "Sa",
            OutputVar::Ea => "Ea",
            OutputVar::Ia => "Ia",
            OutputVar::Total => "N",
        }
    }
}
