//! Closed-form basic reproduction number.
//!
//! This is an algebraic point estimate evaluated at a given state
//! (usually the initial condition), not a next-generation-matrix
//! spectral radius: expected secondary infections from one introduced
//! infectious adult, decomposed as per-contact transmission, the
//! probability of surviving the latent period, and the expected
//! infectious lifetime. Known limitation, kept deliberately.

use crate::error::{SimError, SimResult};
use crate::model::params::Params;
use crate::model::tb::{growth_weight, TbState};

/// Basic reproduction number at `state`. Parameters may be in either
/// unit; the estimate is computed on daily rates, matching simulation.
pub fn r0(state: &TbState, params: &Params) -> SimResult<f64> {
    params.check()?;
    let nj = state.nj();
    let na = state.na();
    if nj <= 0.0 || na <= 0.0 {
        return Err(SimError::DegenerateState { t: 0.0, nj, na });
    }

    let p = params.to_daily();
    let n = nj + na;
    let gw = growth_weight(n, p.k, p.r);
    let dw = 1.0 - gw;

    let transmission = p.v * p.l * dw + (state.sa / na) * p.rba + (state.sj / nj) * p.rbaj;
    let survive_latency = p.s / (p.s + p.ma * gw);
    let infectious_lifetime = 1.0 / (p.da + p.ma * gw);

    Ok(transmission * survive_latency * infectious_lifetime)
}
