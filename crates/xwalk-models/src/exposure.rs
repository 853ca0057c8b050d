use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::info;
use xwalk_core::coerce_numeric;
use xwalk_sources::TaskRatingRow;

use crate::params::ModelError;

pub const IMPORTANCE_SCALE: &str = "IM";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureWeighting {
    #[default]
    UsageShare,
    PerWorkerIntensity,
    ImportanceWeighted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    #[default]
    None,
    MaxScaling,
    PercentileCap(f64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingWagePolicy {
    #[default]
    Drop,
    MeanFill,
    ZeroFill,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureConfig {
    pub weighting: ExposureWeighting,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub normalization: Normalization,
    pub missing: MissingWagePolicy,
}

impl ExposureConfig {
    pub fn validate(&self) -> Result<(), ModelError> {
        if let Normalization::PercentileCap(p) = self.normalization {
            if !(p > 0.0 && p <= 100.0) {
                return Err(ModelError::InvalidPercentile(p));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CrosswalkUsageRow {
    pub occupation_code: String,
    pub task_id: String,
    pub allocated_usage: f64,
    #[serde(default)]
    pub occupation_title: Option<String>,
    #[serde(default)]
    pub job_zone: Option<f64>,
    #[serde(default)]
    pub tot_emp: Option<f64>,
    #[serde(default)]
    pub a_mean: Option<f64>,
    #[serde(default)]
    pub a_median: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskImportance {
    pub occupation_code: String,
    pub task_id: String,
    pub importance: f64,
}

pub fn task_universe(ratings: &[TaskRatingRow]) -> Vec<TaskImportance> {
    let mut seen = BTreeSet::new();
    ratings
        .iter()
        .filter(|row| row.scale_id.trim() == IMPORTANCE_SCALE)
        .filter_map(|row| {
            let importance = row.data_value.as_deref().and_then(coerce_numeric)?;
            let key = (row.occupation_code.trim().to_string(), row.task_id.trim().to_string());
            if !seen.insert(key.clone()) {
                return None;
            }
            Some(TaskImportance {
                occupation_code: key.0,
                task_id: key.1,
                importance,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupationExposure {
    pub occupation_code: String,
    pub occupation_title: Option<String>,
    pub job_zone: Option<f64>,
    pub usage: f64,
    pub task_rows: usize,
    pub tot_emp: f64,
    pub a_mean: f64,
    pub a_median: Option<f64>,
    pub wage_imputed: bool,
    pub usage_per_worker: Option<f64>,
    pub total_task_importance: Option<f64>,
    pub ai_task_importance: Option<f64>,
    pub raw_exposure: f64,
    pub ai_exposure: f64,
}

#[derive(Default)]
struct Aggregate {
    title: Option<String>,
    job_zone: Option<f64>,
    usage: f64,
    task_rows: usize,
    used_tasks: BTreeSet<String>,
    tot_emp: Option<f64>,
    a_mean: Option<f64>,
    a_median: Option<f64>,
}

fn first<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}

fn aggregate(rows: &[CrosswalkUsageRow]) -> BTreeMap<String, Aggregate> {
    let mut by_code: BTreeMap<String, Aggregate> = BTreeMap::new();
    for row in rows {
        let agg = by_code.entry(row.occupation_code.trim().to_string()).or_default();
        agg.usage += row.allocated_usage;
        agg.task_rows += 1;
        if row.allocated_usage > 0.0 {
            agg.used_tasks.insert(row.task_id.trim().to_string());
        }
        first(&mut agg.title, &row.occupation_title);
        first(&mut agg.job_zone, &row.job_zone);
        first(&mut agg.tot_emp, &row.tot_emp.filter(|emp| *emp > 0.0));
        first(&mut agg.a_mean, &row.a_mean);
        first(&mut agg.a_median, &row.a_median);
    }
    by_code
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}

fn normalize(values: &mut [OccupationExposure], normalization: Normalization) {
    let scale = match normalization {
        Normalization::None => None,
        Normalization::MaxScaling => values.iter().map(|o| o.raw_exposure).reduce(f64::max),
        Normalization::PercentileCap(p) => {
            let raw: Vec<f64> = values.iter().map(|o| o.raw_exposure).collect();
            percentile(&raw, p)
        }
    };
    for occ in values.iter_mut() {
        occ.ai_exposure = match scale {
            Some(cap) if cap > 0.0 => occ.raw_exposure.min(cap) / cap,
            Some(_) => 0.0,
            None => occ.raw_exposure,
        };
    }
}

pub fn occupation_exposure(
    rows: &[CrosswalkUsageRow],
    universe: &[TaskImportance],
    config: &ExposureConfig,
) -> Result<Vec<OccupationExposure>, ModelError> {
    config.validate()?;
    if config.weighting == ExposureWeighting::ImportanceWeighted && universe.is_empty() {
        return Err(ModelError::MissingTaskUniverse);
    }

    let grand_total: f64 = rows.iter().map(|row| row.allocated_usage).sum();
    let by_code = aggregate(rows);
    let known_emp = mean(by_code.values().filter_map(|a| a.tot_emp));
    let known_wage = mean(by_code.values().filter_map(|a| a.a_mean));

    let mut importance: HashMap<&str, Vec<(&str, f64)>> = HashMap::new();
    for task in universe {
        importance
            .entry(task.occupation_code.as_str())
            .or_default()
            .push((task.task_id.as_str(), task.importance));
    }

    let mut dropped_missing = 0usize;
    let mut dropped_unrated = 0usize;
    let mut out = Vec::with_capacity(by_code.len());
    for (code, agg) in by_code {
        let imputed = agg.tot_emp.is_none() || agg.a_mean.is_none();
        let (tot_emp, a_mean) = match (config.missing, agg.tot_emp, agg.a_mean) {
            (_, Some(emp), Some(wage)) => (emp, wage),
            (MissingWagePolicy::Drop, _, _) => {
                dropped_missing += 1;
                continue;
            }
            (MissingWagePolicy::MeanFill, emp, wage) => {
                (emp.unwrap_or(known_emp), wage.unwrap_or(known_wage))
            }
            (MissingWagePolicy::ZeroFill, emp, wage) => (emp.unwrap_or(0.0), wage.unwrap_or(0.0)),
        };

        let usage_per_worker = (tot_emp > 0.0).then(|| agg.usage / tot_emp);
        let (total_importance, ai_importance) = match importance.get(code.as_str()) {
            Some(tasks) => {
                let total: f64 = tasks.iter().map(|(_, v)| v).sum();
                let touched: f64 = tasks
                    .iter()
                    .filter(|(id, _)| agg.used_tasks.contains(*id))
                    .map(|(_, v)| v)
                    .sum();
                (Some(total), Some(touched))
            }
            None => (None, None),
        };

        let raw_exposure = match config.weighting {
            ExposureWeighting::UsageShare => {
                if grand_total > 0.0 {
                    agg.usage / grand_total
                } else {
                    0.0
                }
            }
            ExposureWeighting::PerWorkerIntensity => usage_per_worker.unwrap_or(0.0),
            ExposureWeighting::ImportanceWeighted => match (total_importance, ai_importance) {
                (Some(total), Some(ai)) if total > 0.0 => (ai / total).clamp(0.0, 1.0),
                _ => {
                    dropped_unrated += 1;
                    continue;
                }
            },
        };

        out.push(OccupationExposure {
            occupation_code: code,
            occupation_title: agg.title,
            job_zone: agg.job_zone,
            usage: agg.usage,
            task_rows: agg.task_rows,
            tot_emp,
            a_mean,
            a_median: agg.a_median,
            wage_imputed: imputed,
            usage_per_worker,
            total_task_importance: total_importance,
            ai_task_importance: ai_importance,
            raw_exposure,
            ai_exposure: raw_exposure,
        });
    }

    normalize(&mut out, config.normalization);
    info!(
        occupations = out.len(),
        dropped_missing,
        dropped_unrated,
        weighting = ?config.weighting,
        "occupation exposure"
    );
    Ok(out)
}
