//! Task displacement, wage-share demand and endogenous-regime models over
//! occupation exposure, plus the wage-quintile breakdown.

use serde::Serialize;

use crate::exposure::OccupationExposure;
use crate::params::{ModelError, ModelParams};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AcemogluRestrepo {
    pub task_displacement_share: f64,
    pub emp_weighted_exposure: f64,
    pub wage_effect: f64,
    pub total_wage_bill: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Kaleckian {
    pub wage_at_risk: f64,
    pub wage_share_effect: f64,
    pub consumption_effect: f64,
    pub multiplier: f64,
    pub ad_effect: f64,
    pub emp_at_risk: f64,
    pub emp_share_at_risk: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DemandRegime {
    WageLed,
    ProfitLed,
}

impl DemandRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WageLed => "wage-led",
            Self::ProfitLed => "profit-led",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BhaduriMarglin {
    pub profit_share_baseline: f64,
    pub profit_share_new: f64,
    pub delta_profit_share: f64,
    pub u_star_before: f64,
    pub u_star_after: f64,
    pub delta_utilization: f64,
    pub partial_u_partial_pi: f64,
    pub regime: DemandRegime,
    pub output_effect: f64,
    pub investment_effect: f64,
    pub savings_effect: f64,
}

struct WageBill {
    total: f64,
    employment: f64,
}

fn wage_bill(occupations: &[OccupationExposure]) -> Result<WageBill, ModelError> {
    if occupations.is_empty() {
        return Err(ModelError::NoOccupations);
    }
    let total: f64 = occupations.iter().map(|o| o.tot_emp * o.a_mean).sum();
    if total <= 0.0 {
        return Err(ModelError::ZeroWageBill);
    }
    Ok(WageBill {
        total,
        employment: occupations.iter().map(|o| o.tot_emp).sum(),
    })
}

fn wage_at_risk(occupations: &[OccupationExposure]) -> f64 {
    occupations
        .iter()
        .map(|o| o.tot_emp * o.a_mean * o.ai_exposure)
        .sum()
}

pub fn acemoglu_restrepo(
    occupations: &[OccupationExposure],
    params: &ModelParams,
) -> Result<AcemogluRestrepo, ModelError> {
    let bill = wage_bill(occupations)?;
    let task_displacement_share = wage_at_risk(occupations) / bill.total;
    let emp_weighted_exposure = if bill.employment > 0.0 {
        occupations
            .iter()
            .map(|o| o.tot_emp / bill.employment * o.ai_exposure)
            .sum()
    } else {
        0.0
    };
    Ok(AcemogluRestrepo {
        task_displacement_share,
        emp_weighted_exposure,
        wage_effect: -((params.sigma - 1.0) / params.sigma) * task_displacement_share,
        total_wage_bill: bill.total,
    })
}

pub fn kaleckian(
    occupations: &[OccupationExposure],
    params: &ModelParams,
) -> Result<Kaleckian, ModelError> {
    let bill = wage_bill(occupations)?;
    let wage_at_risk = wage_at_risk(occupations);
    let wage_share_effect = wage_at_risk / bill.total;
    let consumption_effect = (params.c_w - params.c_pi) * wage_share_effect;
    let multiplier = 1.0 / (1.0 - params.avg_c);
    let emp_at_risk: f64 = occupations.iter().map(|o| o.tot_emp * o.ai_exposure).sum();
    Ok(Kaleckian {
        wage_at_risk,
        wage_share_effect,
        consumption_effect,
        multiplier,
        ad_effect: consumption_effect * multiplier,
        emp_at_risk,
        emp_share_at_risk: if bill.employment > 0.0 {
            emp_at_risk / bill.employment
        } else {
            0.0
        },
    })
}

// u* = (g₀ + g_π·π) / (s_π·π - g_u); an unstable denominator pins u* to the baseline.
fn equilibrium_utilization(profit_share: f64, params: &ModelParams) -> (f64, f64) {
    let denominator = params.s_pi * profit_share - params.g_u;
    let u_star = if denominator <= 0.0 {
        params.u_baseline
    } else {
        (params.g_0 + params.g_pi * profit_share) / denominator
    };
    (u_star, denominator)
}

pub fn bhaduri_marglin(
    occupations: &[OccupationExposure],
    params: &ModelParams,
) -> Result<BhaduriMarglin, ModelError> {
    let bill = wage_bill(occupations)?;
    let profit_share_baseline = 1.0 - params.wage_share_baseline;
    let delta_profit_share = wage_at_risk(occupations) / bill.total;
    let profit_share_new = profit_share_baseline + delta_profit_share;

    let (u_star_before, denominator_before) = equilibrium_utilization(profit_share_baseline, params);
    let (u_star_after, _) = equilibrium_utilization(profit_share_new, params);
    let delta_utilization = u_star_after - u_star_before;

    let regime_numerator = -(params.g_pi * params.g_u + params.g_0 * params.s_pi);
    let regime_denominator = if denominator_before > 0.0 {
        denominator_before * denominator_before
    } else {
        1.0
    };
    let partial_u_partial_pi = regime_numerator / regime_denominator;
    let regime = if partial_u_partial_pi > 0.0 {
        DemandRegime::ProfitLed
    } else {
        DemandRegime::WageLed
    };

    Ok(BhaduriMarglin {
        profit_share_baseline,
        profit_share_new,
        delta_profit_share,
        u_star_before,
        u_star_after,
        delta_utilization,
        partial_u_partial_pi,
        regime,
        output_effect: delta_utilization / params.u_baseline,
        investment_effect: params.g_u * delta_utilization + params.g_pi * delta_profit_share,
        savings_effect: params.s_pi
            * (profit_share_baseline * delta_utilization + params.u_baseline * delta_profit_share),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WageQuintile {
    pub wage_quintile: String,
    pub occupations: usize,
    pub min_a_mean: f64,
    pub max_a_mean: f64,
    pub mean_a_mean: f64,
    pub mean_ai_exposure: f64,
    pub total_employment: f64,
    pub wage_at_risk: f64,
}

/// Equal-frequency bins on mean annual wage. Edges are interpolated
/// quantiles; each bin is right-closed and the first one also holds the
/// minimum. Empty bins are omitted.
pub fn wage_quintiles(occupations: &[OccupationExposure]) -> Vec<WageQuintile> {
    let wages: Vec<f64> = occupations.iter().map(|o| o.a_mean).collect();
    let edges: Vec<f64> = (0..=5)
        .filter_map(|i| crate::exposure::percentile(&wages, 20.0 * i as f64))
        .collect();
    if edges.len() != 6 {
        return Vec::new();
    }

    let mut bins: Vec<Vec<&OccupationExposure>> = vec![Vec::new(); 5];
    for occ in occupations {
        let bin = (0..5)
            .find(|&i| occ.a_mean <= edges[i + 1])
            .unwrap_or(4);
        bins[bin].push(occ);
    }

    bins.into_iter()
        .enumerate()
        .filter(|(_, members)| !members.is_empty())
        .map(|(i, members)| {
            let n = members.len() as f64;
            WageQuintile {
                wage_quintile: format!("Q{}", i + 1),
                occupations: members.len(),
                min_a_mean: members.iter().map(|o| o.a_mean).fold(f64::INFINITY, f64::min),
                max_a_mean: members.iter().map(|o| o.a_mean).fold(f64::NEG_INFINITY, f64::max),
                mean_a_mean: members.iter().map(|o| o.a_mean).sum::<f64>() / n,
                mean_ai_exposure: members.iter().map(|o| o.ai_exposure).sum::<f64>() / n,
                total_employment: members.iter().map(|o| o.tot_emp).sum(),
                wage_at_risk: members
                    .iter()
                    .map(|o| o.tot_emp * o.a_mean * o.ai_exposure)
                    .sum(),
            }
        })
        .collect()
}
