//! Global, variance-based sensitivity (Sobol' indices).
//!
//! Pipeline: quasi-random sample design, quantile transform into each
//! factor's marginal distribution, parallel batch evaluation of the
//! model, then first-order (Si) and total-order (Ti, Jansen) index
//! estimation with bootstrap confidence intervals.
//!
//! A synthetic "dummy" factor that the model never reads rides along in
//! the design; its indices estimate the noise floor of the estimators,
//! and any real factor indistinguishable from it is non-influential.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::model::params::{Params, PARAM_NAMES};
use crate::model::tb::{TbModel, TbState};
use crate::sensitivity::OutputVar;

/// Name of the synthetic no-effect factor.
pub const DUMMY_NAME: &str = "dummy";

/// Marginal distribution assumed for one factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Marginal {
    Uniform { low: f64, high: f64 },
    /// Degenerate marginal: the factor is pinned, variation disabled
    /// while the design keeps its column.
    Fixed(f64),
}

impl Marginal {
    /// Map a raw [0,1) sample through this marginal.
    fn quantile(&self, u: f64) -> f64 {
        match *self {
            Marginal::Uniform { low, high } => low + u * (high - low),
            Marginal::Fixed(v) => v,
        }
    }

    fn check(&self, name: &str) -> SimResult<()> {
        match *self {
            Marginal::Uniform { low, high } => {
                if !low.is_finite() || !high.is_finite() {
                    return Err(SimError::config(format!(
                        "factor {name:?}: bounds must be finite"
                    )));
                }
                if low >= high {
                    return Err(SimError::config(format!(
                        "factor {name:?}: bounds inverted or degenerate ({low} >= {high})"
                    )));
                }
                Ok(())
            }
            Marginal::Fixed(v) => {
                if !v.is_finite() {
                    return Err(SimError::config(format!(
                        "factor {name:?}: fixed value must be finite"
                    )));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Factor {
    pub name: String,
    pub marginal: Marginal,
}

impl Factor {
    pub fn uniform(name: &str, low: f64, high: f64) -> Self {
        Self {
            name: name.to_string(),
            marginal: Marginal::Uniform { low, high },
        }
    }

    pub fn fixed(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            marginal: Marginal::Fixed(value),
        }
    }
}

/// The full factor set with the documented yearly bounds; `r` is pinned.
pub fn default_factors() -> Vec<Factor> {
    vec![
        Factor::uniform("L", 1.0, 10.0),
        Factor::uniform("v", 0.0, 0.3),
        Factor::uniform("rbj", 0.5, 6.0),
        Factor::uniform("rba", 0.5, 6.0),
        Factor::uniform("rbaj", 0.5, 6.0),
        Factor::uniform("f", 0.5, 2.0),
        Factor::uniform("mj", 0.05, 0.5),
        Factor::uniform("s", 1.0, 10.0),
        Factor::uniform("da", 0.2, 3.0),
        Factor::uniform("dj", 0.2, 3.0),
        Factor::uniform("ma", 0.05, 0.5),
        Factor::uniform("k", 20.0, 100.0),
        Factor::fixed("r", 0.5),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SobolConfig {
    /// Base sample count N; the design holds N * (2p + 2) rows.
    pub samples: usize,
    pub factors: Vec<Factor>,
    /// Output times in days, strictly increasing, all > 0.
    pub times: Vec<f64>,
    pub outputs: Vec<OutputVar>,
    /// Bootstrap resamples for the confidence intervals (0 disables).
    pub bootstrap: usize,
    /// Confidence level, e.g. 0.95.
    pub conf: f64,
    /// Seed for the Owen scrambling and the bootstrap RNG.
    pub seed: u32,
    /// Append the dummy noise-floor factor.
    pub dummy: bool,
}

impl SobolConfig {
    pub fn new(samples: usize, times: Vec<f64>, outputs: Vec<OutputVar>) -> Self {
        Self {
            samples,
            factors: default_factors(),
            times,
            outputs,
            bootstrap: 200,
            conf: 0.95,
            seed: 0,
            dummy: true,
        }
    }

    fn check(&self) -> SimResult<()> {
        if self.samples < 8 {
            return Err(SimError::config("need at least 8 base samples"));
        }
        if self.factors.is_empty() {
            return Err(SimError::config("need at least one factor"));
        }
        if self.times.is_empty() {
            return Err(SimError::config("need at least one output time"));
        }
        if self.times[0] <= 0.0 {
            return Err(SimError::config("output times must be > 0"));
        }
        for w in self.times.windows(2) {
            if w[1] <= w[0] {
                return Err(SimError::config("output times must be strictly increasing"));
            }
        }
        if self.outputs.is_empty() {
            return Err(SimError::config("need at least one output variable"));
        }
        if !(0.0 < self.conf && self.conf < 1.0) {
            return Err(SimError::config("conf must be in (0, 1)"));
        }
        for (i, factor) in self.factors.iter().enumerate() {
            if factor.name != DUMMY_NAME && !PARAM_NAMES.contains(&factor.name.as_str()) {
                return Err(SimError::config(format!(
                    "unknown factor {:?}",
                    factor.name
                )));
            }
            if self.factors[..i].iter().any(|f| f.name == factor.name) {
                return Err(SimError::config(format!(
                    "duplicate factor {:?}",
                    factor.name
                )));
            }
            factor.marginal.check(&factor.name)?;
        }
        Ok(())
    }
}

/// The expanded sample design: N * (2p + 2) parameter vectors, blocks in
/// the order A, B, AB_1..AB_p, BA_1..BA_p (AB_i is A with column i taken
/// from B).
#[derive(Debug, Clone)]
pub struct SobolDesign {
    pub factors: Vec<Factor>,
    pub samples: usize,
    pub rows: Vec<Vec<f64>>,
}

fn sobol_point(index: usize, dim: usize, seed: u32) -> f64 {
    let v = sobol_burley::sample_4d(index as u32, (dim / 4) as u32, seed);
    v[dim % 4] as f64
}

/// Generate the quantile-transformed Saltelli-style design from an
/// Owen-scrambled Sobol' sequence. Dimensions 0..p feed the A block,
/// p..2p feed the B block.
pub fn generate_design(cfg: &SobolConfig) -> SimResult<SobolDesign> {
    cfg.check()?;
    let mut factors = cfg.factors.clone();
    if cfg.dummy {
        factors.push(Factor::uniform(DUMMY_NAME, 0.0, 1.0));
    }
    let p = factors.len();
    let n = cfg.samples;

    let mut a = vec![vec![0.0; p]; n];
    let mut b = vec![vec![0.0; p]; n];
    for j in 0..n {
        for (d, factor) in factors.iter().enumerate() {
            a[j][d] = factor.marginal.quantile(sobol_point(j, d, cfg.seed));
            b[j][d] = factor.marginal.quantile(sobol_point(j, p + d, cfg.seed));
        }
    }

    let mut rows = Vec::with_capacity(n * (2 * p + 2));
    rows.extend(a.iter().cloned());
    rows.extend(b.iter().cloned());
    for i in 0..p {
        for j in 0..n {
            let mut row = a[j].clone();
            row[i] = b[j][i];
            rows.push(row);
        }
    }
    for i in 0..p {
        for j in 0..n {
            let mut row = b[j].clone();
            row[i] = a[j][i];
            rows.push(row);
        }
    }

    Ok(SobolDesign {
        factors,
        samples: n,
        rows,
    })
}

/// One estimated index pair for (output, time, factor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SobolIndexRow {
    pub output: OutputVar,
    pub time: f64,
    pub param: String,
    pub si: f64,
    pub si_lo: f64,
    pub si_hi: f64,
    pub ti: f64,
    pub ti_lo: f64,
    pub ti_hi: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SobolIndices {
    pub samples: usize,
    pub rows: Vec<SobolIndexRow>,
}

impl SobolIndices {
    pub fn find(&self, output: OutputVar, time: f64, param: &str) -> Option<&SobolIndexRow> {
        self.rows.iter().find(|r| {
            r.output == output && r.param == param && (r.time - time).abs() < 1e-9
        })
    }
}

/// Si/Ti estimator over a (possibly resampled) index set.
///
/// Si uses the classic mean-product form with the f0 correction, which
/// keeps the dummy factor's estimate at the Monte-Carlo noise level
/// instead of collapsing it to an exact zero. Ti is Jansen's estimator.
/// Both are averaged over the symmetric (A,AB) and (B,BA) halves.
fn estimate(ya: &[f64], yb: &[f64], yab: &[f64], yba: &[f64], idx: &[usize]) -> (f64, f64) {
    let n = idx.len() as f64;
    let mut mean_a = 0.0;
    let mut mean_b = 0.0;
    for &j in idx {
        mean_a += ya[j];
        mean_b += yb[j];
    }
    mean_a /= n;
    mean_b /= n;

    let pooled_mean = 0.5 * (mean_a + mean_b);
    let mut var = 0.0;
    for &j in idx {
        var += (ya[j] - pooled_mean).powi(2) + (yb[j] - pooled_mean).powi(2);
    }
    var /= 2.0 * n - 1.0;
    if var <= 1e-300 {
        return (0.0, 0.0);
    }

    let mut prod_b_ab = 0.0;
    let mut prod_a_ba = 0.0;
    let mut jansen_a = 0.0;
    let mut jansen_b = 0.0;
    for &j in idx {
        prod_b_ab += yb[j] * yab[j];
        prod_a_ba += ya[j] * yba[j];
        jansen_a += (ya[j] - yab[j]).powi(2);
        jansen_b += (yb[j] - yba[j]).powi(2);
    }
    let f0 = mean_a * mean_b;
    let si = 0.5 * ((prod_b_ab / n - f0) + (prod_a_ba / n - f0)) / var;
    let ti = (jansen_a + jansen_b) / (4.0 * n * var);
    (si, ti)
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let idx = (q * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Run the full Sobol' pipeline around a baseline parameter set.
///
/// Every design row triggers one integration over the output-time grid;
/// rows are independent and evaluated in parallel. A single failed row
/// aborts the whole batch with [`SimError::Sample`] naming the offender;
/// indices are never built from a partial batch.
pub fn sobol_indices(base: &Params, init: &TbState, cfg: &SobolConfig) -> SimResult<SobolIndices> {
    let design = generate_design(cfg)?;
    let p = design.factors.len();
    let n = design.samples;

    let mut grid = Vec::with_capacity(cfg.times.len() + 1);
    grid.push(0.0);
    grid.extend_from_slice(&cfg.times);

    // flattened [time][output] per row
    let evals: Vec<Vec<f64>> = design
        .rows
        .par_iter()
        .enumerate()
        .map(|(row_idx, row)| {
            eval_row(base, init, &design.factors, row, &grid, &cfg.outputs).map_err(|e| {
                SimError::Sample {
                    index: row_idx,
                    source: Box::new(e),
                }
            })
        })
        .collect::<SimResult<Vec<_>>>()?;

    let n_out = cfg.outputs.len();
    let lo_q = (1.0 - cfg.conf) / 2.0;
    let hi_q = 1.0 - lo_q;
    let identity: Vec<usize> = (0..n).collect();
    let mut rng = SmallRng::seed_from_u64(cfg.seed as u64);

    let mut rows = Vec::with_capacity(cfg.times.len() * n_out * p);
    for (t_idx, &time) in cfg.times.iter().enumerate() {
        for (o_idx, &output) in cfg.outputs.iter().enumerate() {
            let flat = t_idx * n_out + o_idx;
            let ya: Vec<f64> = (0..n).map(|j| evals[j][flat]).collect();
            let yb: Vec<f64> = (0..n).map(|j| evals[n + j][flat]).collect();

            for (i, factor) in design.factors.iter().enumerate() {
                let yab: Vec<f64> = (0..n).map(|j| evals[(2 + i) * n + j][flat]).collect();
                let yba: Vec<f64> =
                    (0..n).map(|j| evals[(2 + p + i) * n + j][flat]).collect();

                let (si, ti) = estimate(&ya, &yb, &yab, &yba, &identity);

                let (si_lo, si_hi, ti_lo, ti_hi) = if cfg.bootstrap > 0 {
                    let mut si_samples = Vec::with_capacity(cfg.bootstrap);
                    let mut ti_samples = Vec::with_capacity(cfg.bootstrap);
                    for _ in 0..cfg.bootstrap {
                        let idx: Vec<usize> =
                            (0..n).map(|_| rng.gen_range(0..n)).collect();
                        let (s, t) = estimate(&ya, &yb, &yab, &yba, &idx);
                        si_samples.push(s);
                        ti_samples.push(t);
                    }
                    si_samples.sort_by(|a, b| a.total_cmp(b));
                    ti_samples.sort_by(|a, b| a.total_cmp(b));
                    (
                        percentile(&si_samples, lo_q),
                        percentile(&si_samples, hi_q),
                        percentile(&ti_samples, lo_q),
                        percentile(&ti_samples, hi_q),
                    )
                } else {
                    (si, si, ti, ti)
                };

                rows.push(SobolIndexRow {
                    output,
                    time,
                    param: factor.name.clone(),
                    si,
                    si_lo,
                    si_hi,
                    ti,
                    ti_lo,
                    ti_hi,
                });
            }
        }
    }

    Ok(SobolIndices { samples: n, rows })
}

fn eval_row(
    base: &Params,
    init: &TbState,
    factors: &[Factor],
    row: &[f64],
    grid: &[f64],
    outputs: &[OutputVar],
) -> SimResult<Vec<f64>> {
    let mut params = *base;
    for (factor, &value) in factors.iter().zip(row) {
        if factor.name == DUMMY_NAME {
            continue; // no causal path into the model, by construction
        }
        params = params.with_value(&factor.name, value)?;
    }
    let traj = TbModel::new(params)?.simulate(init, grid)?;

    let mut out = Vec::with_capacity((grid.len() - 1) * outputs.len());
    for (_, state) in traj.iter().skip(1) {
        for o in outputs {
            out.push(o.extract(state));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cfg() -> SobolConfig {
        SobolConfig {
            samples: 64,
            factors: vec![
                Factor::uniform("rbj", 0.5, 6.0),
                Factor::uniform("da", 0.2, 3.0),
                Factor::uniform("ma", 0.05, 0.5),
                Factor::fixed("r", 0.5),
            ],
            times: vec![365.0, 730.0],
            outputs: vec![OutputVar::Ia, OutputVar::Total],
            bootstrap: 100,
            conf: 0.95,
            seed: 7,
            dummy: true,
        }
    }

    #[test]
    fn design_has_documented_shape() {
        let cfg = small_cfg();
        let design = generate_design(&cfg).unwrap();
        let p = design.factors.len();
        assert_eq!(p, 5); // 4 declared + dummy
        assert_eq!(design.rows.len(), cfg.samples * (2 * p + 2));

        for row in &design.rows {
            assert_eq!(row.len(), p);
            assert!((0.5..=6.0).contains(&row[0]), "rbj out of bounds: {}", row[0]);
            assert_eq!(row[3], 0.5, "fixed marginal must pin the column");
            assert!((0.0..1.0).contains(&row[4]));
        }
    }

    #[test]
    fn inverted_bounds_rejected_at_design_time() {
        let mut cfg = small_cfg();
        cfg.factors[0] = Factor::uniform("rbj", 6.0, 0.5);
        assert!(matches!(generate_design(&cfg), Err(SimError::Config(_))));

        let mut cfg = small_cfg();
        cfg.factors[0] = Factor::uniform("rbj", 2.0, 2.0);
        assert!(generate_design(&cfg).is_err());
    }

    #[test]
    fn unknown_and_duplicate_factors_rejected() {
        let mut cfg = small_cfg();
        cfg.factors.push(Factor::uniform("beta", 0.0, 1.0));
        assert!(generate_design(&cfg).is_err());

        let mut cfg = small_cfg();
        cfg.factors.push(Factor::uniform("rbj", 0.5, 6.0));
        assert!(generate_design(&cfg).is_err());
    }

    #[test]
    fn dummy_factor_sits_on_the_noise_floor() {
        let cfg = small_cfg();
        let indices = sobol_indices(&Params::base_yearly(), &TbState::seeded(), &cfg).unwrap();

        let dummy = indices.find(OutputVar::Ia, 730.0, DUMMY_NAME).unwrap();
        // Jansen Ti of a no-effect factor is exactly zero: the swapped
        // column never reaches the model, so f(AB) == f(A) bitwise.
        assert!(dummy.ti.abs() < 1e-12);
        assert!(dummy.ti_hi < 1e-12);
        assert!(dummy.si.abs() < 0.3, "dummy Si = {}", dummy.si);

        // a wide transmission bound must rise above the floor
        let rbj = indices.find(OutputVar::Ia, 730.0, "rbj").unwrap();
        assert!(rbj.ti > dummy.ti);
        assert!(rbj.ti > 0.01, "rbj Ti = {}", rbj.ti);
    }

    #[test]
    fn indices_are_reproducible_for_a_seed() {
        let cfg = SobolConfig {
            samples: 16,
            bootstrap: 20,
            ..small_cfg()
        };
        let a = sobol_indices(&Params::base_yearly(), &TbState::seeded(), &cfg).unwrap();
        let b = sobol_indices(&Params::base_yearly(), &TbState::seeded(), &cfg).unwrap();
        for (ra, rb) in a.rows.iter().zip(&b.rows) {
            assert_eq!(ra.si.to_bits(), rb.si.to_bits());
            assert_eq!(ra.ti_lo.to_bits(), rb.ti_lo.to_bits());
        }
    }

    #[test]
    fn failed_sample_aborts_the_batch() {
        let cfg = SobolConfig {
            samples: 8,
            bootstrap: 0,
            ..small_cfg()
        };
        // no adults at all: every evaluation is degenerate
        let init = TbState::new(20.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        match sobol_indices(&Params::base_yearly(), &init, &cfg) {
            Err(SimError::Sample { source, .. }) => {
                assert!(matches!(*source, SimError::DegenerateState { .. }));
            }
            other => panic!("expected Sample error, got {other:?}"),
        }
    }
}
