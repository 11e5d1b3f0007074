use crate::error::{SimError, SimResult};

/// Simple fixed-step RK4 integrator for systems of ODEs.
/// State and derivative are represented as slices of f64.
/// Kept as a cross-check against the adaptive solver.
pub fn rk4_step<F>(y: &mut [f64], t: f64, dt: f64, mut f: F)
where
    F: FnMut(f64, &[f64], &mut [f64]),
{
    let n = y.len();
    let mut k1 = vec![0.0; n];
    let mut k2 = vec![0.0; n];
    let mut k3 = vec![0.0; n];
    let mut k4 = vec![0.0; n];
    let mut ytmp = vec![0.0; n];

    f(t, y, &mut k1);

    for i in 0..n {
        ytmp[i] = y[i] + 0.5 * dt * k1[i];
    }
    f(t + 0.5 * dt, &ytmp, &mut k2);

    for i in 0..n {
        ytmp[i] = y[i] + 0.5 * dt * k2[i];
    }
    f(t + 0.5 * dt, &ytmp, &mut k3);

    for i in 0..n {
        ytmp[i] = y[i] + dt * k3[i];
    }
    f(t + dt, &ytmp, &mut k4);

    for i in 0..n {
        y[i] += (dt / 6.0) * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
    }
}

/// Configuration for the adaptive solver.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Relative tolerance per step.
    pub rtol: f64,
    /// Absolute tolerance per step.
    pub atol: f64,
    /// Initial step size. 0.0 picks one from the grid span.
    pub h0: f64,
    /// Smallest step the controller may take before giving up.
    pub h_min: f64,
    /// Step budget across the whole grid.
    pub max_steps: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-9,
            h0: 0.0,
            h_min: 1e-10,
            max_steps: 1_000_000,
        }
    }
}

impl SolverOptions {
    pub fn check(&self) -> SimResult<()> {
        if !self.rtol.is_finite() || self.rtol <= 0.0 {
            return Err(SimError::config("rtol must be finite and > 0"));
        }
        if !self.atol.is_finite() || self.atol <= 0.0 {
            return Err(SimError::config("atol must be finite and > 0"));
        }
        if self.max_steps == 0 {
            return Err(SimError::config("max_steps must be > 0"));
        }
        Ok(())
    }
}

// Dormand-Prince 5(4) Butcher tableau.
const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th-order weights (propagated solution).
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// 4th-order weights (embedded error estimate).
const E1: f64 = 5179.0 / 57600.0;
const E3: f64 = 7571.0 / 16695.0;
const E4: f64 = 393.0 / 640.0;
const E5: f64 = -92097.0 / 339200.0;
const E6: f64 = 187.0 / 2100.0;
const E7: f64 = 1.0 / 40.0;

/// Integrate `dy/dt = f(t, y)` with the Dormand-Prince 5(4) pair and
/// adaptive step-size control, returning one state row per grid time.
///
/// `grid` must be non-empty and strictly increasing; `grid[0]` is the
/// initial time. Failure to converge (step underflow, exhausted step
/// budget, non-finite state) surfaces as [`SimError::Integration`]
/// carrying the failing time.
pub fn rk45_grid<F>(
    y0: &[f64],
    grid: &[f64],
    opts: &SolverOptions,
    mut f: F,
) -> SimResult<Vec<Vec<f64>>>
where
    F: FnMut(f64, &[f64], &mut [f64]),
{
    opts.check()?;
    if grid.is_empty() {
        return Err(SimError::config("time grid must be non-empty"));
    }
    for w in grid.windows(2) {
        if w[1] <= w[0] {
            return Err(SimError::config("time grid must be strictly increasing"));
        }
    }
    if !y0.iter().all(|v| v.is_finite()) {
        return Err(SimError::config("initial state must be finite"));
    }

    let n = y0.len();
    let mut y = y0.to_vec();
    let mut t = grid[0];
    let mut out = Vec::with_capacity(grid.len());
    out.push(y.clone());

    let mut k = vec![vec![0.0; n]; 7];
    let mut ytmp = vec![0.0; n];
    let mut y5 = vec![0.0; n];
    let mut y4 = vec![0.0; n];

    let mut h = if opts.h0 > 0.0 {
        opts.h0
    } else {
        ((grid[grid.len() - 1] - grid[0]) * 1e-3).max(opts.h_min)
    };
    let mut steps = 0usize;

    for &target in &grid[1..] {
        while t < target {
            steps += 1;
            if steps > opts.max_steps {
                return Err(SimError::Integration {
                    t,
                    detail: format!("step budget of {} exhausted", opts.max_steps),
                });
            }
            let h_step = h.min(target - t);

            f(t, &y, &mut k[0]);
            for i in 0..n {
                ytmp[i] = y[i] + h_step * A21 * k[0][i];
            }
            f(t + h_step / 5.0, &ytmp, &mut k[1]);
            for i in 0..n {
                ytmp[i] = y[i] + h_step * (A31 * k[0][i] + A32 * k[1][i]);
            }
            f(t + 0.3 * h_step, &ytmp, &mut k[2]);
            for i in 0..n {
                ytmp[i] = y[i] + h_step * (A41 * k[0][i] + A42 * k[1][i] + A43 * k[2][i]);
            }
            f(t + 0.8 * h_step, &ytmp, &mut k[3]);
            for i in 0..n {
                ytmp[i] = y[i]
                    + h_step * (A51 * k[0][i] + A52 * k[1][i] + A53 * k[2][i] + A54 * k[3][i]);
            }
            f(t + 8.0 / 9.0 * h_step, &ytmp, &mut k[4]);
            for i in 0..n {
                ytmp[i] = y[i]
                    + h_step
                        * (A61 * k[0][i]
                            + A62 * k[1][i]
                            + A63 * k[2][i]
                            + A64 * k[3][i]
                            + A65 * k[4][i]);
            }
            f(t + h_step, &ytmp, &mut k[5]);
            for i in 0..n {
                y5[i] = y[i]
                    + h_step
                        * (B1 * k[0][i] + B3 * k[2][i] + B4 * k[3][i] + B5 * k[4][i]
                            + B6 * k[5][i]);
            }
            f(t + h_step, &y5, &mut k[6]);
            for i in 0..n {
                y4[i] = y[i]
                    + h_step
                        * (E1 * k[0][i]
                            + E3 * k[2][i]
                            + E4 * k[3][i]
                            + E5 * k[4][i]
                            + E6 * k[5][i]
                            + E7 * k[6][i]);
            }

            // Scaled RMS error over the embedded pair
            let mut err_sq = 0.0;
            let mut finite = true;
            for i in 0..n {
                if !y5[i].is_finite() || !y4[i].is_finite() {
                    finite = false;
                    break;
                }
                let sc = opts.atol + opts.rtol * y[i].abs().max(y5[i].abs());
                let e = (y5[i] - y4[i]) / sc;
                err_sq += e * e;
            }
            if !finite {
                return Err(SimError::Integration {
                    t,
                    detail: "non-finite state produced by derivative".to_string(),
                });
            }
            let err = (err_sq / n as f64).sqrt();

            if err <= 1.0 {
                t += h_step;
                y.copy_from_slice(&y5);
                let grow = if err > 0.0 {
                    (0.9 * err.powf(-0.2)).min(5.0)
                } else {
                    5.0
                };
                h = (h_step * grow).max(opts.h_min);
            } else {
                h = h_step * (0.9 * err.powf(-0.2)).max(0.2);
                if h < opts.h_min {
                    return Err(SimError::Integration {
                        t,
                        detail: format!("step size underflow (h={h:e})"),
                    });
                }
            }
        }
        out.push(y.clone());
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rk45_exponential_decay() {
        let grid = vec![0.0, 1.0, 5.0, 10.0];
        let rows = rk45_grid(&[1.0], &grid, &SolverOptions::default(), |_t, y, dy| {
            dy[0] = -y[0];
        })
        .unwrap();
        for (row, t) in rows.iter().zip(&grid) {
            let exact = (-t).exp();
            assert!(
                (row[0] - exact).abs() < 1e-6 + 1e-4 * exact,
                "t={t}: {} vs {exact}",
                row[0]
            );
        }
    }

    #[test]
    fn rk45_matches_rk4_on_oscillator() {
        // y'' = -y as a 2d system, both solvers over one period
        let f = |_t: f64, y: &[f64], dy: &mut [f64]| {
            dy[0] = y[1];
            dy[1] = -y[0];
        };
        let t_end = 2.0 * std::f64::consts::PI;
        let rows = rk45_grid(&[1.0, 0.0], &[0.0, t_end], &SolverOptions::default(), f).unwrap();

        let mut y = vec![1.0, 0.0];
        let dt = t_end / 10_000.0;
        let mut t = 0.0;
        for _ in 0..10_000 {
            rk4_step(&mut y, t, dt, f);
            t += dt;
        }
        assert!((rows[1][0] - y[0]).abs() < 1e-4);
        assert!((rows[1][1] - y[1]).abs() < 1e-4);
    }

    #[test]
    fn rk45_rejects_bad_grid() {
        let opts = SolverOptions::default();
        assert!(rk45_grid(&[1.0], &[], &opts, |_, _, dy| dy[0] = 0.0).is_err());
        assert!(rk45_grid(&[1.0], &[0.0, 0.0], &opts, |_, _, dy| dy[0] = 0.0).is_err());
        assert!(rk45_grid(&[1.0], &[1.0, 0.5], &opts, |_, _, dy| dy[0] = 0.0).is_err());
    }

    #[test]
    fn rk45_surfaces_blowup() {
        // y' = y^2 from y(0)=1 blows up at t=1; must fail, not return junk
        let res = rk45_grid(&[1.0], &[0.0, 2.0], &SolverOptions::default(), |_t, y, dy| {
            dy[0] = y[0] * y[0];
        });
        match res {
            Err(SimError::Integration { t, .. }) => assert!(t <= 2.0),
            other => panic!("expected integration failure, got {other:?}"),
        }
    }

    #[test]
    fn solver_options_validated() {
        let opts = SolverOptions {
            rtol: -1.0,
            ..SolverOptions::default()
        };
        assert!(opts.check().is_err());
    }
}
