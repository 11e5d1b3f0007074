use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

pub const DAYS_PER_YEAR: f64 = 365.0;

/// Names of every model parameter, in canonical order. The sensitivity
/// engines address parameters through this list.
pub const PARAM_NAMES: [&str; 13] = [
    "L", "v", "rbj", "rba", "rbaj", "f", "mj", "s", "da", "dj", "ma", "k", "r",
];

/// Unit scale of a parameter set. Yearly rates are the human-readable
/// form; simulation always runs on daily rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    Yearly,
    Daily,
}

impl std::str::FromStr for TimeUnit {
    type Err = SimError;

    fn from_str(s: &str) -> SimResult<Self> {
        match s {
            "yearly" => Ok(TimeUnit::Yearly),
            "daily" => Ok(TimeUnit::Daily),
            other => Err(SimError::config(format!(
                "unknown time unit {other:?} (expected \"yearly\" or \"daily\")"
            ))),
        }
    }
}

/// Named parameter configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scenario {
    Base,
    Extended,
}

impl std::str::FromStr for Scenario {
    type Err = SimError;

    fn from_str(s: &str) -> SimResult<Self> {
        match s {
            "base" => Ok(Scenario::Base),
            "extended" => Ok(Scenario::Extended),
            other => Err(SimError::config(format!(
                "unknown scenario {other:?} (expected \"base\" or \"extended\")"
            ))),
        }
    }
}

/// Rate constants of the possum-TB model.
///
/// All rates carry the unit in `unit`; `k` (carrying capacity, a head
/// count) and `r` (logistic steepness, dimensionless) are scale-invariant
/// and untouched by unit conversion.
///
/// A set is immutable during an integration. Sensitivity engines derive
/// perturbed copies through [`Params::with_value`]; nothing mutates a
/// shared set in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Params {
    /// Birth rate.
    pub l: f64,
    /// Vertical (pseudo-vertical) transmission rate from infectious adults.
    pub v: f64,
    /// Juvenile-juvenile contact transmission rate.
    pub rbj: f64,
    /// Adult-adult contact transmission rate.
    pub rba: f64,
    /// Cross age-class contact transmission rate.
    pub rbaj: f64,
    /// Juvenile maturation rate.
    pub f: f64,
    /// Juvenile natural mortality rate (density-weighted).
    pub mj: f64,
    /// Progression rate from exposed to infectious.
    pub s: f64,
    /// Adult disease-induced mortality rate.
    pub da: f64,
    /// Juvenile disease-induced mortality rate.
    pub dj: f64,
    /// Adult natural mortality rate (density-weighted).
    pub ma: f64,
    /// Carrying capacity (head count, scale-invariant).
    pub k: f64,
    /// Logistic density-dependence steepness (dimensionless, scale-invariant).
    pub r: f64,
    pub unit: TimeUnit,
}

impl Params {
    /// Base scenario, yearly rates.
    pub fn base_yearly() -> Self {
        Self {
            l: 5.0,
            v: 0.1,
            rbj: 2.1,
            rba: 2.1,
            rbaj: 2.1,
            f: 1.0,
            mj: 0.2,
            s: 5.0,
            da: 1.0,
            dj: 1.0,
            ma: 0.2,
            k: 50.0,
            r: 0.5,
            unit: TimeUnit::Yearly,
        }
    }

    /// Extended scenario, yearly rates. Differs from base only in the
    /// contact transmission rates and the disease-induced mortalities.
    pub fn extended_yearly() -> Self {
        Self {
            rbj: 3.0,
            rba: 3.0,
            da: 2.0,
            dj: 2.0,
            ..Self::base_yearly()
        }
    }

    pub fn scenario(which: Scenario) -> Self {
        match which {
            Scenario::Base => Self::base_yearly(),
            Scenario::Extended => Self::extended_yearly(),
        }
    }

    /// All parameter values in [`PARAM_NAMES`] order.
    pub fn values(&self) -> [f64; 13] {
        [
            self.l, self.v, self.rbj, self.rba, self.rbaj, self.f, self.mj, self.s, self.da,
            self.dj, self.ma, self.k, self.r,
        ]
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        let idx = PARAM_NAMES.iter().position(|n| *n == name)?;
        Some(self.values()[idx])
    }

    /// Return a copy with one parameter replaced. Unknown names and
    /// non-finite values are configuration errors.
    pub fn with_value(&self, name: &str, value: f64) -> SimResult<Self> {
        if !value.is_finite() {
            return Err(SimError::config(format!(
                "non-finite value {value} for parameter {name:?}"
            )));
        }
        let mut out = *self;
        match name {
            "L" => out.l = value,
            "v" => out.v = value,
            "rbj" => out.rbj = value,
            "rba" => out.rba = value,
            "rbaj" => out.rbaj = value,
            "f" => out.f = value,
            "mj" => out.mj = value,
            "s" => out.s = value,
            "da" => out.da = value,
            "dj" => out.dj = value,
            "ma" => out.ma = value,
            "k" => out.k = value,
            "r" => out.r = value,
            other => {
                return Err(SimError::config(format!("unknown parameter {other:?}")));
            }
        }
        Ok(out)
    }

    /// Every value must be finite; carrying capacity must be positive.
    pub fn check(&self) -> SimResult<()> {
        for (name, value) in PARAM_NAMES.iter().zip(self.values()) {
            if !value.is_finite() {
                return Err(SimError::config(format!(
                    "parameter {name:?} is not finite ({value})"
                )));
            }
        }
        if self.k <= 0.0 {
            return Err(SimError::config("carrying capacity k must be > 0"));
        }
        Ok(())
    }

    /// Convert yearly rates to daily rates. `k` and `r` are untouched.
    /// A set already in daily units is returned unchanged.
    pub fn to_daily(&self) -> Self {
        match self.unit {
            TimeUnit::Daily => *self,
            TimeUnit::Yearly => Self {
                l: self.l / DAYS_PER_YEAR,
                v: self.v / DAYS_PER_YEAR,
                rbj: self.rbj / DAYS_PER_YEAR,
                rba: self.rba / DAYS_PER_YEAR,
                rbaj: self.rbaj / DAYS_PER_YEAR,
                f: self.f / DAYS_PER_YEAR,
                mj: self.mj / DAYS_PER_YEAR,
                s: self.s / DAYS_PER_YEAR,
                da: self.da / DAYS_PER_YEAR,
                dj: self.dj / DAYS_PER_YEAR,
                ma: self.ma / DAYS_PER_YEAR,
                k: self.k,
                r: self.r,
                unit: TimeUnit::Daily,
            },
        }
    }

    /// Convert daily rates back to yearly rates. `k` and `r` are untouched.
    pub fn to_yearly(&self) -> Self {
        match self.unit {
            TimeUnit::Yearly => *self,
            TimeUnit::Daily => Self {
                l: self.l * DAYS_PER_YEAR,
                v: self.v * DAYS_PER_YEAR,
                rbj: self.rbj * DAYS_PER_YEAR,
                rba: self.rba * DAYS_PER_YEAR,
                rbaj: self.rbaj * DAYS_PER_YEAR,
                f: self.f * DAYS_PER_YEAR,
                mj: self.mj * DAYS_PER_YEAR,
                s: self.s * DAYS_PER_YEAR,
                da: self.da * DAYS_PER_YEAR,
                dj: self.dj * DAYS_PER_YEAR,
                ma: self.ma * DAYS_PER_YEAR,
                k: self.k,
                r: self.r,
                unit: TimeUnit::Yearly,
            },
        }
    }
}
