pub mod economics;
pub mod exposure;
pub mod params;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, info_span};
use xwalk_storage::OutputStore;

pub use economics::{
    acemoglu_restrepo, bhaduri_marglin, kaleckian, wage_quintiles, AcemogluRestrepo,
    BhaduriMarglin, DemandRegime, Kaleckian, WageQuintile,
};
pub use exposure::{
    occupation_exposure, task_universe, CrosswalkUsageRow, ExposureConfig, ExposureWeighting,
    MissingWagePolicy, Normalization, OccupationExposure, TaskImportance,
};
pub use params::{ModelError, ModelParams};

pub const CRATE_NAME: &str = "xwalk-models";

pub const OCCUPATION_EXPOSURE_CSV: &str = "analysis/occupation_exposure.csv";
pub const MODEL_SUMMARY_CSV: &str = "analysis/model_summary.csv";
pub const PARAMETERS_CSV: &str = "analysis/parameters.csv";
pub const WAGE_QUINTILES_CSV: &str = "analysis/wage_quintiles.csv";

pub const BASELINE_SCENARIO: &str = "baseline";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub params: ModelParams,
}

/// Contents of `models.yaml`: how exposure is measured and which parameter
/// sets to run. No scenarios means a single baseline with default parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub exposure: ExposureConfig,
    pub scenarios: Vec<Scenario>,
}

impl ModelsConfig {
    pub async fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validating {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        self.exposure.validate()?;
        for scenario in &self.scenarios {
            scenario.params.validate()?;
        }
        Ok(())
    }

    pub fn scenarios(&self) -> Vec<Scenario> {
        if self.scenarios.is_empty() {
            vec![Scenario {
                name: BASELINE_SCENARIO.to_string(),
                params: ModelParams::default(),
            }]
        } else {
            self.scenarios.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioResult {
    pub name: String,
    pub params: ModelParams,
    pub acemoglu_restrepo: AcemogluRestrepo,
    pub kaleckian: Kaleckian,
    pub bhaduri_marglin: BhaduriMarglin,
}

pub fn run_scenarios(
    occupations: &[OccupationExposure],
    config: &ModelsConfig,
) -> Result<Vec<ScenarioResult>, ModelError> {
    config
        .scenarios()
        .into_iter()
        .map(|scenario| -> Result<ScenarioResult, ModelError> {
            scenario.params.validate()?;
            let result = ScenarioResult {
                acemoglu_restrepo: acemoglu_restrepo(occupations, &scenario.params)?,
                kaleckian: kaleckian(occupations, &scenario.params)?,
                bhaduri_marglin: bhaduri_marglin(occupations, &scenario.params)?,
                params: scenario.params,
                name: scenario.name,
            };
            info!(
                scenario = %result.name,
                wage_effect = result.acemoglu_restrepo.wage_effect,
                ad_effect = result.kaleckian.ad_effect,
                regime = result.bhaduri_marglin.regime.as_str(),
                "scenario estimated"
            );
            Ok(result)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummaryRow {
    pub scenario: String,
    pub model: &'static str,
    pub metric: &'static str,
    pub value: Option<f64>,
    pub formatted: String,
}

fn pct(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

fn dollars(value: f64) -> String {
    let whole = format!("{:.0}", value.abs());
    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}${grouped}")
}

impl ScenarioResult {
    pub fn summary_rows(&self) -> Vec<ModelSummaryRow> {
        let ar = &self.acemoglu_restrepo;
        let k = &self.kaleckian;
        let bm = &self.bhaduri_marglin;
        let rows: Vec<(&'static str, &'static str, Option<f64>, String)> = vec![
            ("Acemoglu-Restrepo", "Wage-weighted task displacement", Some(ar.task_displacement_share), pct(ar.task_displacement_share)),
            ("Acemoglu-Restrepo", "Predicted wage effect", Some(ar.wage_effect), pct(ar.wage_effect)),
            ("Acemoglu-Restrepo", "Employment-weighted exposure", Some(ar.emp_weighted_exposure), pct(ar.emp_weighted_exposure)),
            ("Acemoglu-Restrepo", "Total wage bill", Some(ar.total_wage_bill), dollars(ar.total_wage_bill)),
            ("Kaleckian", "Wage share reduction", Some(k.wage_share_effect), pct(k.wage_share_effect)),
            ("Kaleckian", "Consumption effect", Some(k.consumption_effect), pct(k.consumption_effect)),
            ("Kaleckian", "Keynesian multiplier", Some(k.multiplier), format!("{:.2}", k.multiplier)),
            ("Kaleckian", "AD effect (with multiplier)", Some(k.ad_effect), pct(k.ad_effect)),
            ("Kaleckian", "Employment share at risk", Some(k.emp_share_at_risk), pct(k.emp_share_at_risk)),
            ("Kaleckian", "Wage bill at risk", Some(k.wage_at_risk), dollars(k.wage_at_risk)),
            ("Bhaduri-Marglin", "Baseline profit share", Some(bm.profit_share_baseline), pct(bm.profit_share_baseline)),
            ("Bhaduri-Marglin", "Change in profit share", Some(bm.delta_profit_share), pct(bm.delta_profit_share)),
            ("Bhaduri-Marglin", "Equilibrium utilization (before)", Some(bm.u_star_before), pct(bm.u_star_before)),
            ("Bhaduri-Marglin", "Equilibrium utilization (after)", Some(bm.u_star_after), pct(bm.u_star_after)),
            ("Bhaduri-Marglin", "Change in capacity utilization", Some(bm.delta_utilization), pct(bm.delta_utilization)),
            ("Bhaduri-Marglin", "Demand regime", None, bm.regime.as_str().to_string()),
            ("Bhaduri-Marglin", "Regime indicator (du*/dpi)", Some(bm.partial_u_partial_pi), format!("{:.4}", bm.partial_u_partial_pi)),
            ("Bhaduri-Marglin", "Output effect", Some(bm.output_effect), pct(bm.output_effect)),
            ("Bhaduri-Marglin", "Investment effect", Some(bm.investment_effect), pct(bm.investment_effect)),
            ("Bhaduri-Marglin", "Savings effect", Some(bm.savings_effect), pct(bm.savings_effect)),
        ];
        rows.into_iter()
            .map(|(model, metric, value, formatted)| ModelSummaryRow {
                scenario: self.name.clone(),
                model,
                metric,
                value,
                formatted,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterRow {
    pub scenario: String,
    pub parameter: &'static str,
    pub value: f64,
    pub description: &'static str,
}

#[derive(Debug, Clone)]
pub struct ModelsPaths {
    pub crosswalk_path: PathBuf,
    pub task_ratings_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsRunSummary {
    pub occupations: usize,
    pub scenarios: Vec<String>,
    pub outputs: Vec<String>,
}

pub fn parse_crosswalk_rows(bytes: &[u8]) -> Result<Vec<CrosswalkUsageRow>> {
    let mut reader = csv::Reader::from_reader(bytes);
    reader
        .deserialize::<CrosswalkUsageRow>()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("crosswalk row {}", i + 1)))
        .collect()
}

pub async fn load_crosswalk_rows(path: &Path) -> Result<Vec<CrosswalkUsageRow>> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    parse_crosswalk_rows(&bytes).with_context(|| format!("parsing {}", path.display()))
}

pub async fn run_models(paths: &ModelsPaths) -> Result<ModelsRunSummary> {
    let config = match &paths.config_path {
        Some(path) => ModelsConfig::from_path(path).await?,
        None => ModelsConfig::default(),
    };
    let rows = load_crosswalk_rows(&paths.crosswalk_path).await?;
    let universe = match &paths.task_ratings_path {
        Some(path) => {
            let ratings = xwalk_sources::load_task_ratings(path)
                .with_context(|| format!("loading task ratings {}", path.display()))?;
            task_universe(&ratings)
        }
        None => Vec::new(),
    };
    info!(
        crosswalk_rows = rows.len(),
        rated_tasks = universe.len(),
        "models inputs loaded"
    );

    let occupations = info_span!("exposure")
        .in_scope(|| occupation_exposure(&rows, &universe, &config.exposure))
        .context("computing occupation exposure")?;
    let results = info_span!("models")
        .in_scope(|| run_scenarios(&occupations, &config))
        .context("estimating models")?;
    let quintiles = wage_quintiles(&occupations);

    let summary_rows: Vec<ModelSummaryRow> =
        results.iter().flat_map(ScenarioResult::summary_rows).collect();
    let parameter_rows: Vec<ParameterRow> = results
        .iter()
        .flat_map(|result| {
            result
                .params
                .described()
                .into_iter()
                .map(|(parameter, value, description)| ParameterRow {
                    scenario: result.name.clone(),
                    parameter,
                    value,
                    description,
                })
        })
        .collect();

    let store = OutputStore::new(&paths.output_dir);
    let mut outputs = Vec::new();
    for stored in [
        store.write_csv(OCCUPATION_EXPOSURE_CSV, &occupations).await?,
        store.write_csv(MODEL_SUMMARY_CSV, &summary_rows).await?,
        store.write_csv(PARAMETERS_CSV, &parameter_rows).await?,
        store.write_csv(WAGE_QUINTILES_CSV, &quintiles).await?,
    ] {
        outputs.push(stored.relative_path.display().to_string());
    }

    Ok(ModelsRunSummary {
        occupations: occupations.len(),
        scenarios: results.into_iter().map(|result| result.name).collect(),
        outputs,
    })
}
