//! Local, derivative-based sensitivity.
//!
//! Finite-difference partials of output trajectories with respect to
//! individual parameters: one full integration per parameter (forward
//! scheme) or two (central scheme), against a shared baseline run.
//! Every perturbation builds a fresh parameter set; nothing is mutated
//! in place.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::model::params::{Params, PARAM_NAMES};
use crate::model::tb::{TbModel, TbState};
use crate::sensitivity::OutputVar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scheme {
    Forward,
    Central,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Parameter names to perturb.
    pub params: Vec<String>,
    /// Outputs to track.
    pub outputs: Vec<OutputVar>,
    /// Relative perturbation step.
    pub rel_step: f64,
    pub scheme: Scheme,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            params: PARAM_NAMES.iter().map(|s| s.to_string()).collect(),
            outputs: OutputVar::ALL.to_vec(),
            rel_step: 1e-2,
            scheme: Scheme::Central,
        }
    }
}

impl LocalConfig {
    fn check(&self) -> SimResult<()> {
        if self.params.is_empty() || self.outputs.is_empty() {
            return Err(SimError::config(
                "local sensitivity needs at least one parameter and one output",
            ));
        }
        for name in &self.params {
            if !PARAM_NAMES.contains(&name.as_str()) {
                return Err(SimError::config(format!("unknown parameter {name:?}")));
            }
        }
        if !self.rel_step.is_finite() || self.rel_step <= 0.0 || self.rel_step >= 1.0 {
            return Err(SimError::config("rel_step must be in (0, 1)"));
        }
        Ok(())
    }
}

/// Normalized sensitivity coefficients indexed by (time, output, parameter).
///
/// Coefficients are elasticities, (theta / y) * dy/dtheta, falling back to
/// the semi-normalized theta * dy/dtheta where the baseline output is
/// (numerically) zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSensitivityTable {
    pub times: Vec<f64>,
    pub outputs: Vec<OutputVar>,
    pub params: Vec<String>,
    values: Vec<f64>,
}

impl LocalSensitivityTable {
    /// Coefficient at (time index, output index, parameter index).
    pub fn coeff(&self, t_idx: usize, out_idx: usize, p_idx: usize) -> f64 {
        let stride_t = self.outputs.len() * self.params.len();
        self.values[t_idx * stride_t + out_idx * self.params.len() + p_idx]
    }
}

fn output_matrix(traj: &[(f64, TbState)], outputs: &[OutputVar]) -> Vec<f64> {
    let mut out = Vec::with_capacity(traj.len() * outputs.len());
    for (_, state) in traj {
        for o in outputs {
            out.push(o.extract(state));
        }
    }
    out
}

/// Compute the local sensitivity table for `params` around the given
/// baseline parameter set, integrating over `grid` (days).
pub fn local_sensitivity(
    base: &Params,
    init: &TbState,
    grid: &[f64],
    cfg: &LocalConfig,
) -> SimResult<LocalSensitivityTable> {
    cfg.check()?;
    let baseline = TbModel::new(*base)?.simulate(init, grid)?;
    let y_base = output_matrix(&baseline, &cfg.outputs);

    let n_out = cfg.outputs.len();
    let n_par = cfg.params.len();
    let mut values = vec![0.0; grid.len() * n_out * n_par];

    for (p_idx, name) in cfg.params.iter().enumerate() {
        let theta = base
            .get(name)
            .ok_or_else(|| SimError::config(format!("unknown parameter {name:?}")))?;
        let h = if theta.abs() > 0.0 {
            cfg.rel_step * theta.abs()
        } else {
            cfg.rel_step
        };

        let up = TbModel::new(base.with_value(name, theta + h)?)?.simulate(init, grid)?;
        let y_up = output_matrix(&up, &cfg.outputs);

        let (y_hi, y_lo, denom) = match cfg.scheme {
            Scheme::Forward => (y_up, y_base.clone(), h),
            Scheme::Central => {
                let down =
                    TbModel::new(base.with_value(name, theta - h)?)?.simulate(init, grid)?;
                (y_up, output_matrix(&down, &cfg.outputs), 2.0 * h)
            }
        };

        for t_idx in 0..grid.len() {
            for out_idx in 0..n_out {
                let flat = t_idx * n_out + out_idx;
                let deriv = (y_hi[flat] - y_lo[flat]) / denom;
                let y0 = y_base[flat];
                let coeff = if y0.abs() > 1e-9 {
                    deriv * theta / y0
                } else {
                    deriv * theta
                };
                values[t_idx * n_out * n_par + out_idx * n_par + p_idx] = coeff;
            }
        }
    }

    Ok(LocalSensitivityTable {
        times: grid.to_vec(),
        outputs: cfg.outputs.clone(),
        params: cfg.params.clone(),
        values,
    })
}

/// Percent change of each output at the end of `grid` for a ladder of
/// relative parameter changes. This is the informal what-if exploration
/// expressed through the same engine as [`local_sensitivity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepTable {
    pub param: String,
    pub rel_changes: Vec<f64>,
    pub outputs: Vec<OutputVar>,
    /// Percent output change per (change, output). `None` marks a
    /// perturbation that was skipped because it would have driven the
    /// parameter non-positive, or a baseline output of zero.
    pub values: Vec<Vec<Option<f64>>>,
}

pub fn perturbation_sweep(
    base: &Params,
    init: &TbState,
    grid: &[f64],
    param: &str,
    rel_changes: &[f64],
    outputs: &[OutputVar],
) -> SimResult<SweepTable> {
    if !PARAM_NAMES.contains(&param) {
        return Err(SimError::config(format!("unknown parameter {param:?}")));
    }
    if outputs.is_empty() || rel_changes.is_empty() {
        return Err(SimError::config(
            "sweep needs at least one output and one relative change",
        ));
    }

    let theta = base.get(param).unwrap_or(0.0);
    let baseline = TbModel::new(*base)?.simulate(init, grid)?;
    let (_, base_end) = *baseline.last().unwrap();

    let mut values = Vec::with_capacity(rel_changes.len());
    for &change in rel_changes {
        let perturbed = theta * (1.0 + change);
        if perturbed <= 0.0 {
            // row kept, entries missing: neither truncated nor clamped
            values.push(vec![None; outputs.len()]);
            continue;
        }
        let traj = TbModel::new(base.with_value(param, perturbed)?)?.simulate(init, grid)?;
        let (_, end) = *traj.last().unwrap();
        let row = outputs
            .iter()
            .map(|o| {
                let y0 = o.extract(&base_end);
                if y0.abs() > 1e-12 {
                    Some(100.0 * (o.extract(&end) - y0) / y0)
                } else {
                    None
                }
            })
            .collect();
        values.push(row);
    }

    Ok(SweepTable {
        param: param.to_string(),
        rel_changes: rel_changes.to_vec(),
        outputs: outputs.to_vec(),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tb::time_grid;

    #[test]
    fn decoupled_parameter_has_zero_sensitivity() {
        // Disease-free trajectory: da never multiplies a nonzero term,
        // so the perturbed run is bit-identical to the baseline.
        let base = Params::base_yearly();
        let init = TbState::new(20.0, 0.0, 0.0, 30.0, 0.0, 0.0);
        let grid = time_grid(365.0, 30.0);
        let cfg = LocalConfig {
            params: vec!["da".to_string(), "L".to_string()],
            outputs: vec![OutputVar::Total],
            ..LocalConfig::default()
        };
        let table = local_sensitivity(&base, &init, &grid, &cfg).unwrap();

        let last_t = grid.len() - 1;
        assert!(table.coeff(last_t, 0, 0).abs() < 1e-12, "da should not matter");
        assert!(table.coeff(last_t, 0, 1).abs() > 1e-4, "L should matter");
    }

    #[test]
    fn transmission_rate_drives_infectious_count() {
        let base = Params::base_yearly();
        let grid = time_grid(2.0 * 365.0, 73.0);
        let cfg = LocalConfig {
            params: vec!["rba".to_string()],
            outputs: vec![OutputVar::Ia],
            ..LocalConfig::default()
        };
        let table = local_sensitivity(&base, &TbState::seeded(), &grid, &cfg).unwrap();
        let last_t = grid.len() - 1;
        assert!(table.coeff(last_t, 0, 0).abs() > 1e-3);
    }

    #[test]
    fn forward_and_central_roughly_agree() {
        let base = Params::base_yearly();
        let grid = time_grid(365.0, 365.0);
        let mk = |scheme| LocalConfig {
            params: vec!["s".to_string()],
            outputs: vec![OutputVar::Ia],
            scheme,
            ..LocalConfig::default()
        };
        let fwd =
            local_sensitivity(&base, &TbState::seeded(), &grid, &mk(Scheme::Forward)).unwrap();
        let cen =
            local_sensitivity(&base, &TbState::seeded(), &grid, &mk(Scheme::Central)).unwrap();
        let a = fwd.coeff(1, 0, 0);
        let b = cen.coeff(1, 0, 0);
        assert!(
            (a - b).abs() < 0.1 * a.abs().max(b.abs()).max(1e-3),
            "forward {a} vs central {b}"
        );
    }

    #[test]
    fn sweep_marks_non_positive_perturbations_missing() {
        let base = Params::base_yearly();
        let grid = time_grid(365.0, 365.0);
        let table = perturbation_sweep(
            &base,
            &TbState::seeded(),
            &grid,
            "v",
            &[-1.5, -0.5, 0.5],
            &[OutputVar::Total],
        )
        .unwrap();
        assert_eq!(table.values.len(), 3);
        assert!(table.values[0][0].is_none(), "-150% drives v below zero");
        assert!(table.values[1][0].is_some());
        assert!(table.values[2][0].is_some());
    }

    #[test]
    fn config_validation() {
        let base = Params::base_yearly();
        let grid = time_grid(365.0, 365.0);
        let bad = LocalConfig {
            params: vec!["bogus".to_string()],
            ..LocalConfig::default()
        };
        assert!(local_sensitivity(&base, &TbState::seeded(), &grid, &bad).is_err());

        let bad_step = LocalConfig {
            rel_step: 0.0,
            ..LocalConfig::default()
        };
        assert!(local_sensitivity(&base, &TbState::seeded(), &grid, &bad_step).is_err());
    }
}
