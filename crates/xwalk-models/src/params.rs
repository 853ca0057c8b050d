use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("parameter {name} = {value} is invalid: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
    #[error("percentile cap must lie in (0, 100], got {0}")]
    InvalidPercentile(f64),
    #[error("importance weighting needs task importance ratings")]
    MissingTaskUniverse,
    #[error("no occupations with wage and employment data")]
    NoOccupations,
    #[error("total wage bill is zero")]
    ZeroWageBill,
}

/// Behavioural parameters shared by the three models. Defaults follow the
/// usual literature calibration for the US economy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub sigma: f64,
    pub c_w: f64,
    pub c_pi: f64,
    pub avg_c: f64,
    pub s_pi: f64,
    pub g_u: f64,
    pub g_pi: f64,
    pub g_0: f64,
    pub u_baseline: f64,
    pub wage_share_baseline: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            sigma: 1.5,
            c_w: 0.80,
            c_pi: 0.40,
            avg_c: 0.70,
            s_pi: 0.45,
            g_u: 0.10,
            g_pi: 0.05,
            g_0: 0.03,
            u_baseline: 0.80,
            wage_share_baseline: 0.55,
        }
    }
}

fn check(name: &'static str, value: f64, ok: bool, reason: &'static str) -> Result<(), ModelError> {
    if value.is_finite() && ok {
        Ok(())
    } else {
        Err(ModelError::InvalidParameter { name, value, reason })
    }
}

impl ModelParams {
    pub fn validate(&self) -> Result<(), ModelError> {
        let unit = |v: f64| (0.0..=1.0).contains(&v);
        check("sigma", self.sigma, self.sigma > 0.0, "must be positive")?;
        check("c_w", self.c_w, unit(self.c_w), "must lie in [0, 1]")?;
        check("c_pi", self.c_pi, unit(self.c_pi), "must lie in [0, 1]")?;
        check("avg_c", self.avg_c, (0.0..1.0).contains(&self.avg_c), "must lie in [0, 1)")?;
        check("s_pi", self.s_pi, self.s_pi > 0.0 && self.s_pi <= 1.0, "must lie in (0, 1]")?;
        check("g_u", self.g_u, self.g_u >= 0.0, "must be non-negative")?;
        check("g_pi", self.g_pi, self.g_pi >= 0.0, "must be non-negative")?;
        check("g_0", self.g_0, self.g_0 >= 0.0, "must be non-negative")?;
        check("u_baseline", self.u_baseline, self.u_baseline > 0.0, "must be positive")?;
        check(
            "wage_share_baseline",
            self.wage_share_baseline,
            self.wage_share_baseline > 0.0 && self.wage_share_baseline < 1.0,
            "must lie in (0, 1)",
        )
    }

    pub fn described(&self) -> Vec<(&'static str, f64, &'static str)> {
        vec![
            ("sigma", self.sigma, "Elasticity of substitution between tasks"),
            ("c_w", self.c_w, "Marginal propensity to consume out of wages"),
            ("c_pi", self.c_pi, "Marginal propensity to consume out of profits"),
            ("avg_c", self.avg_c, "Aggregate consumption propensity"),
            ("s_pi", self.s_pi, "Propensity to save out of profits"),
            ("g_u", self.g_u, "Investment sensitivity to utilization"),
            ("g_pi", self.g_pi, "Investment sensitivity to profit share"),
            ("g_0", self.g_0, "Autonomous investment rate"),
            ("u_baseline", self.u_baseline, "Baseline capacity utilization"),
            ("wage_share_baseline", self.wage_share_baseline, "Baseline wage share"),
        ]
    }
}
