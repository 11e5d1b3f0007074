use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::math::ode::{rk45_grid, SolverOptions};
use crate::model::params::Params;

/// The six compartments: juvenile and adult possums, each split into
/// susceptible, exposed (latent) and infectious.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TbState {
    pub sj: f64,
    pub ej: f64,
    pub ij: f64,
    pub sa: f64,
    pub ea: f64,
    pub ia: f64,
}

impl TbState {
    pub fn new(sj: f64, ej: f64, ij: f64, sa: f64, ea: f64, ia: f64) -> Self {
        Self { sj, ej, ij, sa, ea, ia }
    }

    /// The standard introduction scenario: a healthy population near
    /// carrying capacity with one infectious adult.
    pub fn seeded() -> Self {
        Self::new(20.0, 0.0, 0.0, 30.0, 0.0, 1.0)
    }

    pub fn from_array(y: [f64; 6]) -> Self {
        Self::new(y[0], y[1], y[2], y[3], y[4], y[5])
    }

    pub fn as_array(&self) -> [f64; 6] {
        [self.sj, self.ej, self.ij, self.sa, self.ea, self.ia]
    }

    /// Juvenile total.
    pub fn nj(&self) -> f64 {
        self.sj + self.ej + self.ij
    }

    /// Adult total.
    pub fn na(&self) -> f64 {
        self.sa + self.ea + self.ia
    }

    pub fn total(&self) -> f64 {
        self.nj() + self.na()
    }
}

/// Logistic density-dependence switch: near zero while the population is
/// below carrying capacity, approaching one above it. Smooth in N, which
/// the finite-difference sensitivity machinery relies on.
pub fn growth_weight(n: f64, k: f64, r: f64) -> f64 {
    1.0 / (1.0 + (-r * (n - k)).exp())
}

/// One (time, state) sample per requested grid time.
pub type Trajectory = Vec<(f64, TbState)>;

/// Evenly spaced grid from 0 to `t_end` days (inclusive when it lands on
/// a step boundary).
pub fn time_grid(t_end: f64, step: f64) -> Vec<f64> {
    let mut grid = Vec::new();
    let mut t = 0.0;
    while t <= t_end + 1e-9 {
        grid.push(t);
        t += step;
    }
    grid
}

/// Display grid: 20 years in 30-day steps.
pub fn display_grid() -> Vec<f64> {
    time_grid(20.0 * 365.0, 30.0)
}

/// Sensitivity grid: 7 years in 30-day steps.
pub fn sensitivity_grid() -> Vec<f64> {
    time_grid(7.0 * 365.0, 30.0)
}

/// The possum bovine-TB compartment model.
///
/// Parameters are converted to daily rates at construction; time is
/// measured in days throughout.
#[derive(Debug, Clone)]
pub struct TbModel {
    pub params: Params,
    pub solver: SolverOptions,
}

impl TbModel {
    pub fn new(params: Params) -> SimResult<Self> {
        params.check()?;
        Ok(Self {
            params: params.to_daily(),
            solver: SolverOptions::default(),
        })
    }

    pub fn with_solver(mut self, solver: SolverOptions) -> Self {
        self.solver = solver;
        self
    }

    /// Rate of change of the six compartments. Pure: no state is kept
    /// between calls.
    ///
    /// Dividing by an empty age class (Nj = 0 or Na = 0) is undefined
    /// here and produces NaN; [`TbModel::simulate`] rejects such initial
    /// states up front.
    pub fn deriv(&self, _t: f64, y: &[f64], dy: &mut [f64]) {
        let p = &self.params;
        let (sj, ej, ij, sa, ea, ia) = (y[0], y[1], y[2], y[3], y[4], y[5]);
        let nj = sj + ej + ij;
        let na = sa + ea + ia;
        let n = nj + na;

        let gw = growth_weight(n, p.k, p.r);
        let dw = 1.0 - gw;

        // Per-capita infection pressure on juveniles and adults
        let foi_j = p.v * ia / n + p.rbj * ij / nj + p.rbaj * ia / na;
        let foi_a = p.rba * ia / na + p.rbaj * ij / nj;

        dy[0] = p.l * dw * n - sj * (foi_j + p.f + p.mj * gw);
        dy[1] = sj * foi_j - ej * (p.s + p.f + p.mj * gw);
        dy[2] = p.s * ej - ij * (p.dj + p.f + p.mj * gw);
        dy[3] = p.f * sj - sa * (foi_a + p.ma * gw);
        dy[4] = p.f * ej + sa * foi_a - ea * (p.s + p.ma * gw);
        dy[5] = p.f * ij + p.s * ea - ia * (p.da + p.ma * gw);
    }

    /// Integrate from `init` over the requested grid (days), returning
    /// one state per grid time.
    pub fn simulate(&self, init: &TbState, grid: &[f64]) -> SimResult<Trajectory> {
        let t0 = grid.first().copied().unwrap_or(0.0);
        if init.nj() <= 0.0 || init.na() <= 0.0 {
            return Err(SimError::DegenerateState {
                t: t0,
                nj: init.nj(),
                na: init.na(),
            });
        }

        let rows = rk45_grid(&init.as_array(), grid, &self.solver, |t, y, dy| {
            self.deriv(t, y, dy)
        })?;

        Ok(grid
            .iter()
            .zip(rows)
            .map(|(t, row)| {
                let mut y = [0.0; 6];
                y.copy_from_slice(&row);
                (*t, TbState::from_array(y))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::ode::rk4_step;

    fn base_model() -> TbModel {
        TbModel::new(Params::base_yearly()).unwrap()
    }

    #[test]
    fn no_spontaneous_negative_population() {
        // A compartment at zero with no positive inflow must not drain.
        let model = base_model();
        let mut dy = [0.0; 6];

        // Ij = 0, Ej = 0: dIj = s*Ej = 0
        model.deriv(0.0, &[10.0, 0.0, 0.0, 20.0, 1.0, 1.0], &mut dy);
        assert!(dy[2] >= 0.0);

        // Ea = 0 with inflow from Ej and Sa: dEa >= 0
        model.deriv(0.0, &[10.0, 2.0, 1.0, 20.0, 0.0, 1.0], &mut dy);
        assert!(dy[4] >= 0.0);

        // Sj = 0 still gains births
        model.deriv(0.0, &[0.0, 1.0, 1.0, 20.0, 1.0, 1.0], &mut dy);
        assert!(dy[0] >= 0.0);
    }

    #[test]
    fn disease_free_population_settles_at_logistic_equilibrium() {
        // With no disease and mj = ma = m the total obeys
        // dN/dt = N (L dw - m gw), so N* = k + ln(L/m) / r.
        let model = base_model();
        let init = TbState::new(20.0, 0.0, 0.0, 30.0, 0.0, 0.0);
        let traj = model.simulate(&init, &display_grid()).unwrap();

        let p = Params::base_yearly();
        let expected = p.k + (p.l / p.mj).ln() / p.r;
        let (_, last) = traj.last().unwrap();
        assert!(
            (last.total() - expected).abs() < 0.5,
            "N(20y) = {}, expected {expected}",
            last.total()
        );
        // and no compartment went negative on the way
        for (t, s) in &traj {
            for v in s.as_array() {
                assert!(v >= -1e-9, "negative compartment {v} at t={t}");
            }
        }
    }

    #[test]
    fn seeded_outbreak_stays_near_carrying_capacity() {
        let model = base_model();
        let traj = model.simulate(&TbState::seeded(), &display_grid()).unwrap();

        let n_final = traj.last().unwrap().1.total();
        assert!(
            (45.0..60.0).contains(&n_final),
            "N(20y) = {n_final}, expected near carrying capacity 50"
        );

        // settled: less than one head of drift over the final year
        let year_before = traj[traj.len() - 13].1.total();
        assert!((n_final - year_before).abs() < 1.0);
    }

    #[test]
    fn simulate_rejects_empty_age_class() {
        let model = base_model();
        let no_adults = TbState::new(20.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        match model.simulate(&no_adults, &[0.0, 10.0]) {
            Err(SimError::DegenerateState { na, .. }) => assert_eq!(na, 0.0),
            other => panic!("expected DegenerateState, got {other:?}"),
        }
    }

    #[test]
    fn adaptive_solver_agrees_with_fixed_rk4() {
        let model = base_model();
        let grid = time_grid(365.0, 30.0);
        let traj = model.simulate(&TbState::seeded(), &grid).unwrap();

        let mut y = TbState::seeded().as_array().to_vec();
        let dt = 0.5;
        let steps = (365.0 / dt) as usize;
        let mut t = 0.0;
        for _ in 0..steps {
            rk4_step(&mut y, t, dt, |tt, y, dy| model.deriv(tt, y, dy));
            t += dt;
        }
        let n_rk4: f64 = y.iter().sum();
        let n_rk45 = traj.last().unwrap().1.total();
        assert!(
            (n_rk4 - n_rk45).abs() / n_rk4 < 1e-3,
            "rk4 {n_rk4} vs rk45 {n_rk45}"
        );
    }

    #[test]
    fn grid_helpers_cover_requested_span() {
        let g = display_grid();
        assert_eq!(g[0], 0.0);
        assert!((g[g.len() - 1] - 20.0 * 365.0).abs() < 30.0);
        let s = sensitivity_grid();
        assert!((s[s.len() - 1] - 7.0 * 365.0).abs() < 30.0);
    }
}
