//! Crosswalk build orchestration: load, match, split, enrich, merge wages, audit, export.

pub mod audit;
pub mod enrich;
pub mod export;
pub mod fuzzy;
pub mod index;
pub mod matching;
pub mod split;
pub mod wages;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, info_span};
use uuid::Uuid;
use xwalk_core::{CrosswalkRow, MatchMethod, TaxonomyTask, UsageRecord, Weighting};
use xwalk_sources::{
    load_education, load_job_zones, load_occupations, load_task_ratings, load_taxonomy_tasks, load_usage,
    load_wage_rows, EducationRow, JobZoneRow, OccupationRow, TaskRatingRow, WageSourceRow,
};
use xwalk_storage::{OutputStore, StoredOutput};

pub use audit::{
    ambiguous_match_report, duplicate_text_report, verify_conservation, AmbiguousMatchRow, AuditStatus,
    ConservationReport, ConservationTolerance, DuplicateTextRow,
};
pub use enrich::OccupationCatalog;
pub use fuzzy::{fuzzy_match, indel_ratio, FuzzyHit, FuzzyMatcher, DEFAULT_FUZZY_THRESHOLD};
pub use index::{exact_match, MatchCandidateSet, TaxonomyIndex};
pub use matching::{match_records, MatchOutcome, MatchSettings, UnmatchedRecord};
pub use split::{split, SplitOutcome};
pub use wages::{merge_wages, WageTable};

pub const CRATE_NAME: &str = "xwalk-pipeline";

pub const CROSSWALK_CSV: &str = "processed/master_task_crosswalk.csv";
pub const CROSSWALK_WAGES_CSV: &str = "processed/master_task_crosswalk_with_wages.csv";
pub const UNMATCHED_CSV: &str = "processed/unmatched_tasks.csv";
pub const DUPLICATES_CSV: &str = "audit/taxonomy_text_duplicates.csv";
pub const AMBIGUOUS_CSV: &str = "audit/ambiguous_matches.csv";
pub const ACCOUNTING_CSV: &str = "audit/conservation_accounting.csv";
pub const CONSERVATION_BY_RECORD_CSV: &str = "audit/conservation_by_record.csv";
pub const SNAPSHOT_PARQUET: &str = "processed/snapshots/crosswalk.parquet";
pub const SNAPSHOT_MANIFEST: &str = "processed/snapshots/manifest.json";
pub const RUN_SUMMARY_JSON: &str = "processed/run_summary.json";
pub const BRIEF_MD: &str = "processed/crosswalk_brief.md";

const TAXONOMY_RELEASE_DIR: &str = "raw/db_29_1_text";

#[derive(Debug, Clone)]
pub struct CrosswalkConfig {
    pub data_dir: PathBuf,
    pub usage_path: PathBuf,
    pub usage_format: String,
    pub taxonomy_path: PathBuf,
    pub occupations_path: PathBuf,
    pub job_zones_path: PathBuf,
    pub education_path: PathBuf,
    pub wages_path: PathBuf,
    pub task_ratings_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub fuzzy_threshold: f64,
    pub weighting: Weighting,
    pub parallel_fuzzy: bool,
}

fn env_path(name: &str, default: PathBuf) -> PathBuf {
    std::env::var(name).map(PathBuf::from).unwrap_or(default)
}

impl CrosswalkConfig {
    pub fn from_env() -> Self {
        let data_dir = env_path("XWALK_DATA_DIR", PathBuf::from("./data"));
        Self::for_data_dir(data_dir)
    }

    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let release = data_dir.join(TAXONOMY_RELEASE_DIR);
        let default_ratings = release.join("Task Ratings.txt");
        let task_ratings_path = match std::env::var("XWALK_TASK_RATINGS") {
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => default_ratings.exists().then_some(default_ratings),
        };
        Self {
            usage_path: env_path("XWALK_USAGE", data_dir.join("raw/usage.csv")),
            usage_format: std::env::var("XWALK_USAGE_FORMAT").unwrap_or_else(|_| "auto".to_string()),
            taxonomy_path: env_path("XWALK_TAXONOMY", release.join("Task Statements.txt")),
            occupations_path: env_path("XWALK_OCCUPATIONS", release.join("Occupation Data.txt")),
            job_zones_path: env_path("XWALK_JOB_ZONES", release.join("Job Zones.txt")),
            education_path: env_path(
                "XWALK_EDUCATION",
                release.join("Education, Training, and Experience.txt"),
            ),
            wages_path: env_path("XWALK_WAGES", data_dir.join("BLS/national_wages_2024.csv")),
            task_ratings_path,
            output_dir: env_path("XWALK_OUTPUT_DIR", data_dir.clone()),
            fuzzy_threshold: std::env::var("XWALK_FUZZY_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_FUZZY_THRESHOLD),
            weighting: std::env::var("XWALK_WEIGHTING")
                .ok()
                .and_then(|v| Weighting::parse(&v))
                .unwrap_or_default(),
            parallel_fuzzy: std::env::var("XWALK_PARALLEL_FUZZY")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(true),
            data_dir,
        }
    }

    pub fn match_settings(&self) -> MatchSettings {
        MatchSettings {
            fuzzy_threshold: self.fuzzy_threshold,
            weighting: self.weighting,
            parallel_fuzzy: self.parallel_fuzzy,
        }
    }

    fn required_inputs(&self) -> Vec<(&'static str, &Path)> {
        let mut inputs = vec![
            ("usage records", self.usage_path.as_path()),
            ("taxonomy task statements", self.taxonomy_path.as_path()),
            ("occupation reference", self.occupations_path.as_path()),
            ("job zones", self.job_zones_path.as_path()),
            ("education reference", self.education_path.as_path()),
            ("wage table", self.wages_path.as_path()),
        ];
        if let Some(path) = &self.task_ratings_path {
            inputs.push(("task ratings", path.as_path()));
        }
        inputs
    }
}

#[derive(Debug, Clone, Default)]
pub struct CrosswalkInputs {
    pub usage: Vec<UsageRecord>,
    pub taxonomy: Vec<TaxonomyTask>,
    pub occupations: Vec<OccupationRow>,
    pub job_zones: Vec<JobZoneRow>,
    pub education: Vec<EducationRow>,
    pub task_ratings: Vec<TaskRatingRow>,
    pub wage_rows: Vec<WageSourceRow>,
}

impl CrosswalkInputs {
    pub fn load(config: &CrosswalkConfig) -> Result<Self> {
        let task_ratings = match &config.task_ratings_path {
            Some(path) => load_task_ratings(path)
                .with_context(|| format!("loading task ratings {}", path.display()))?,
            None => Vec::new(),
        };
        Ok(Self {
            usage: load_usage(&config.usage_path, &config.usage_format)
                .with_context(|| format!("loading usage records {}", config.usage_path.display()))?,
            taxonomy: load_taxonomy_tasks(&config.taxonomy_path)
                .with_context(|| format!("loading taxonomy {}", config.taxonomy_path.display()))?,
            occupations: load_occupations(&config.occupations_path)
                .with_context(|| format!("loading occupations {}", config.occupations_path.display()))?,
            job_zones: load_job_zones(&config.job_zones_path)
                .with_context(|| format!("loading job zones {}", config.job_zones_path.display()))?,
            education: load_education(&config.education_path)
                .with_context(|| format!("loading education {}", config.education_path.display()))?,
            task_ratings,
            wage_rows: load_wage_rows(&config.wages_path)
                .with_context(|| format!("loading wages {}", config.wages_path.display()))?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CrosswalkBuild {
    pub index: TaxonomyIndex,
    pub outcome: MatchOutcome,
    pub catalog: OccupationCatalog,
    pub wages: WageTable,
    pub rows: Vec<CrosswalkRow>,
    pub conservation: ConservationReport,
    pub duplicates: Vec<DuplicateTextRow>,
    pub ambiguous: Vec<AmbiguousMatchRow>,
}

pub fn build_crosswalk(inputs: &CrosswalkInputs, settings: &MatchSettings) -> CrosswalkBuild {
    let index = info_span!("index").in_scope(|| TaxonomyIndex::build(&inputs.taxonomy));
    info!(
        tasks = index.task_count(),
        unique_keys = index.unique_keys(),
        duplicated_keys = index.duplicated_keys(),
        "taxonomy index built"
    );
    let matcher = FuzzyMatcher::new(&index);
    let wages = WageTable::from_rows(&inputs.wage_rows);

    let outcome = match_records(&inputs.usage, &index, &matcher, settings, |code| wages.employment(code));

    let catalog = info_span!("enrich").in_scope(|| {
        OccupationCatalog::from_tables(
            &inputs.occupations,
            &inputs.job_zones,
            &inputs.education,
            &inputs.task_ratings,
        )
    });
    let matched_rows = outcome.matches.iter().flat_map(|m| m.rows()).collect();
    let enriched = catalog.enrich_all(matched_rows);
    let mut rows = info_span!("merge_wages").in_scope(|| merge_wages(enriched, &wages));
    export::sort_by_usage(&mut rows);

    let (conservation, duplicates, ambiguous) = info_span!("audit").in_scope(|| {
        (
            verify_conservation(&inputs.usage, &outcome, ConservationTolerance::default()),
            duplicate_text_report(&index),
            ambiguous_match_report(&outcome.matches, &catalog),
        )
    });

    CrosswalkBuild {
        index,
        outcome,
        catalog,
        wages,
        rows,
        conservation,
        duplicates,
        ambiguous,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrosswalkRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub weighting: Weighting,
    pub fuzzy_threshold: f64,
    pub usage_records: usize,
    pub excluded_records: usize,
    pub taxonomy_tasks: usize,
    pub unique_task_keys: usize,
    pub duplicated_task_keys: usize,
    pub exact_matches: usize,
    pub fuzzy_matches: usize,
    pub unmatched_records: usize,
    pub ambiguous_records: usize,
    pub employment_fallbacks: usize,
    pub crosswalk_rows: usize,
    pub wage_matched_rows: usize,
    pub total_usage: f64,
    pub matched_usage: f64,
    pub unmatched_usage: f64,
    pub conservation_status: String,
    pub conservation_failures: usize,
    pub output_dir: String,
    pub outputs: Vec<String>,
}

impl CrosswalkRunSummary {
    fn from_build(
        build: &CrosswalkBuild,
        inputs: &CrosswalkInputs,
        settings: &MatchSettings,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        output_dir: &Path,
    ) -> Self {
        let outcome = &build.outcome;
        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            weighting: settings.weighting,
            fuzzy_threshold: settings.fuzzy_threshold,
            usage_records: inputs.usage.len(),
            excluded_records: outcome.excluded.len(),
            taxonomy_tasks: build.index.task_count(),
            unique_task_keys: build.index.unique_keys(),
            duplicated_task_keys: build.index.duplicated_keys(),
            exact_matches: outcome.count_by_method(MatchMethod::Exact),
            fuzzy_matches: outcome.count_by_method(MatchMethod::Fuzzy),
            unmatched_records: outcome.unmatched.len(),
            ambiguous_records: outcome.ambiguous_count(),
            employment_fallbacks: outcome.fallback_count(),
            crosswalk_rows: build.rows.len(),
            wage_matched_rows: build.rows.iter().filter(|r| r.wages.is_some()).count(),
            total_usage: inputs.usage.iter().map(|r| r.usage_count).sum(),
            matched_usage: outcome.matches.iter().map(|m| m.record.usage_count).sum(),
            unmatched_usage: outcome.unmatched.iter().map(|r| r.usage_count).sum(),
            conservation_status: build.conservation.status.as_str().to_string(),
            conservation_failures: build.conservation.failures,
            output_dir: output_dir.display().to_string(),
            outputs: Vec::new(),
        }
    }
}

pub struct CrosswalkPipeline {
    config: CrosswalkConfig,
    store: OutputStore,
}

impl CrosswalkPipeline {
    pub fn new(config: CrosswalkConfig) -> Self {
        let store = OutputStore::new(config.output_dir.clone());
        Self { config, store }
    }

    pub fn config(&self) -> &CrosswalkConfig {
        &self.config
    }

    pub async fn run_once(&self) -> Result<CrosswalkRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, output_dir = %self.config.output_dir.display(), "crosswalk run starting");

        self.check_inputs().await?;
        let inputs = info_span!("load_inputs").in_scope(|| CrosswalkInputs::load(&self.config))?;
        info!(
            usage_records = inputs.usage.len(),
            taxonomy_tasks = inputs.taxonomy.len(),
            wage_rows = inputs.wage_rows.len(),
            task_ratings = inputs.task_ratings.len(),
            "inputs loaded"
        );

        let settings = self.config.match_settings();
        let build = build_crosswalk(&inputs, &settings);
        let mut summary = CrosswalkRunSummary::from_build(
            &build,
            &inputs,
            &settings,
            run_id,
            started_at,
            &self.config.output_dir,
        );

        let mut stored = self.write_outputs(&build).await?;
        stored.push(self.export_snapshot(&build, &stored).await?);

        summary.finished_at = Utc::now();
        summary.outputs = stored
            .iter()
            .map(|s| s.relative_path.display().to_string())
            .chain([RUN_SUMMARY_JSON.to_string(), BRIEF_MD.to_string()])
            .collect();
        self.store
            .write_json(RUN_SUMMARY_JSON, &summary)
            .await
            .context("writing run summary")?;
        self.store
            .write_bytes(BRIEF_MD, brief_markdown(&summary).as_bytes())
            .await
            .context("writing crosswalk brief")?;

        info!(
            %run_id,
            rows = summary.crosswalk_rows,
            unmatched = summary.unmatched_records,
            conservation = %summary.conservation_status,
            "crosswalk run complete"
        );
        Ok(summary)
    }

    async fn check_inputs(&self) -> Result<()> {
        for (label, path) in self.config.required_inputs() {
            let exists = fs::try_exists(path)
                .await
                .with_context(|| format!("checking {label} at {}", path.display()))?;
            if !exists {
                bail!("missing input {label}: {}", path.display());
            }
        }
        Ok(())
    }

    async fn write_outputs(&self, build: &CrosswalkBuild) -> Result<Vec<StoredOutput>> {
        self.store.ensure_dir("processed").await?;
        self.store.ensure_dir("audit").await?;

        let mut stored = Vec::new();
        stored.push(
            self.store
                .write_csv(CROSSWALK_CSV, &export::crosswalk_csv_rows(&build.rows))
                .await?,
        );
        stored.push(
            self.store
                .write_csv(CROSSWALK_WAGES_CSV, &export::crosswalk_wages_csv_rows(&build.rows))
                .await?,
        );
        stored.push(self.store.write_csv(UNMATCHED_CSV, &build.outcome.unmatched).await?);
        stored.push(self.store.write_csv(DUPLICATES_CSV, &build.duplicates).await?);
        stored.push(self.store.write_csv(AMBIGUOUS_CSV, &build.ambiguous).await?);
        stored.push(
            self.store
                .write_csv(ACCOUNTING_CSV, &build.conservation.accounting)
                .await?,
        );
        stored.push(
            self.store
                .write_csv(CONSERVATION_BY_RECORD_CSV, &build.conservation.records)
                .await?,
        );
        Ok(stored)
    }

    async fn export_snapshot(&self, build: &CrosswalkBuild, written: &[StoredOutput]) -> Result<StoredOutput> {
        let batch = export::crosswalk_record_batch(&build.rows)?;
        let bytes = export::parquet_bytes(&batch)
            .with_context(|| format!("encoding {SNAPSHOT_PARQUET}"))?;
        let parquet = self.store.write_bytes(SNAPSHOT_PARQUET, &bytes).await?;

        let files = written
            .iter()
            .chain(std::iter::once(&parquet))
            .map(|output| export::SnapshotManifestFile {
                name: output
                    .relative_path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().to_string())
                    .unwrap_or_default(),
                path: output.relative_path.display().to_string(),
                sha256: output.sha256.clone(),
                bytes: output.byte_size as u64,
            })
            .collect();
        let manifest = export::SnapshotManifest {
            schema_version: 1,
            files,
        };
        self.store
            .write_json(SNAPSHOT_MANIFEST, &manifest)
            .await
            .context("writing snapshot manifest")?;
        Ok(parquet)
    }
}

pub async fn run_crosswalk_from_env() -> Result<CrosswalkRunSummary> {
    CrosswalkPipeline::new(CrosswalkConfig::from_env()).run_once().await
}

fn brief_markdown(summary: &CrosswalkRunSummary) -> String {
    let pct = |part: f64| {
        if summary.total_usage > 0.0 {
            format!("{:.1}%", 100.0 * part / summary.total_usage)
        } else {
            "N/A".to_string()
        }
    };
    format!(
        "# Crosswalk Brief\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Weighting: {}\n- Fuzzy threshold: {}\n\n## Matching\n- Usage records: {}\n- Excluded placeholders: {}\n- Exact matches: {}\n- Fuzzy matches: {}\n- Unmatched: {}\n- Ambiguous (multiple occupations): {}\n- Employment-weight fallbacks: {}\n\n## Usage\n- Total: {}\n- Matched: {} ({})\n- Unmatched: {} ({})\n- Conservation: {} ({} failing records)\n\n## Crosswalk\n- Rows: {}\n- Rows with wages: {}\n- Taxonomy keys: {} ({} shared by several occupations)\n",
        summary.run_id,
        summary.started_at,
        summary.finished_at,
        summary.weighting.as_str(),
        summary.fuzzy_threshold,
        summary.usage_records,
        summary.excluded_records,
        summary.exact_matches,
        summary.fuzzy_matches,
        summary.unmatched_records,
        summary.ambiguous_records,
        summary.employment_fallbacks,
        summary.total_usage,
        summary.matched_usage,
        pct(summary.matched_usage),
        summary.unmatched_usage,
        pct(summary.unmatched_usage),
        summary.conservation_status,
        summary.conservation_failures,
        summary.crosswalk_rows,
        summary.wage_matched_rows,
        summary.unique_task_keys,
        summary.duplicated_task_keys,
    )
}

pub fn report_markdown(output_dir: &Path) -> Result<String> {
    let summary_path = output_dir.join(RUN_SUMMARY_JSON);
    let summary: CrosswalkRunSummary = serde_json::from_str(
        &std::fs::read_to_string(&summary_path)
            .with_context(|| format!("reading {}", summary_path.display()))?,
    )
    .with_context(|| format!("parsing {}", summary_path.display()))?;

    let mut lines = vec![brief_markdown(&summary), "## Outputs".to_string()];
    for output in &summary.outputs {
        let present = output_dir.join(output).exists();
        lines.push(format!("- `{output}`{}", if present { "" } else { " (missing)" }));
    }
    lines.push(String::new());
    Ok(lines.join("\n"))
}

#[cfg(test)]
pub(crate) mod test_support {
    use xwalk_core::TaxonomyTask;

    use crate::index::TaxonomyIndex;

    pub fn task(code: &str, id: &str, text: &str) -> TaxonomyTask {
        TaxonomyTask {
            occupation_code: code.to_string(),
            task_id: id.to_string(),
            task_text: text.to_string(),
            task_type: None,
        }
    }

    pub fn scenario_index() -> TaxonomyIndex {
        TaxonomyIndex::build(&[
            task("A", "1", "Write code"),
            task("B", "2", "Oversee staff"),
            task("C", "3", "Oversee staff."),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use xwalk_sources::OccupationRow;

    fn scenario_inputs() -> CrosswalkInputs {
        CrosswalkInputs {
            usage: vec![
                UsageRecord::new("write code", 100.0),
                UsageRecord::new("oversee staff", 50.0),
                UsageRecord::new("wrte cod", 20.0),
                UsageRecord::new("not_classified", 999.0),
                UsageRecord::new("paint the fence", 5.0),
            ],
            taxonomy: vec![
                test_support::task("15-1252.00", "1", "Write code."),
                test_support::task("11-1021.00", "2", "Oversee staff"),
                test_support::task("11-3031.00", "3", "Oversee staff"),
            ],
            occupations: vec![OccupationRow {
                occupation_code: "15-1252.00".into(),
                title: Some("Software Developers".into()),
                description: None,
            }],
            wage_rows: vec![WageSourceRow {
                occ_code: "15-1252".into(),
                tot_emp: Some("1,000".into()),
                a_mean: Some("*".into()),
                ..WageSourceRow::default()
            }],
            ..CrosswalkInputs::default()
        }
    }

    #[test]
    fn build_covers_all_three_scenarios() {
        let inputs = scenario_inputs();
        let build = build_crosswalk(&inputs, &MatchSettings::default());

        assert_eq!(build.outcome.excluded.len(), 1);
        assert_eq!(build.outcome.unmatched.len(), 1);
        assert_eq!(build.outcome.unmatched[0].task_description, "paint the fence");
        assert!(build
            .rows
            .iter()
            .all(|r| r.enriched.row.task_description != "not_classified"));

        // Descending original usage: 100, 50, 50, 20.
        let usage: Vec<f64> = build.rows.iter().map(|r| r.enriched.row.usage_count_original).collect();
        assert_eq!(usage, vec![100.0, 50.0, 50.0, 20.0]);

        let top = &build.rows[0];
        assert_eq!(top.soc_6digit, "15-1252");
        assert_eq!(top.wages.as_ref().and_then(|w| w.tot_emp), Some(1000.0));
        assert_eq!(top.wages.as_ref().and_then(|w| w.a_mean), None);
        assert_eq!(top.enriched.occupation.title.as_deref(), Some("Software Developers"));

        let fuzzy = &build.rows[3];
        assert_eq!(fuzzy.enriched.row.match_method, MatchMethod::Fuzzy);
        assert_eq!(fuzzy.enriched.row.task.occupation_code, "15-1252.00");
        assert_eq!(fuzzy.enriched.row.allocated_usage, 20.0);

        assert!(build.conservation.passed());
        assert_eq!(build.duplicates.len(), 1);
        assert_eq!(build.ambiguous.len(), 1);
        assert!(build.rows[1].wages.is_none());
    }

    #[tokio::test]
    async fn missing_input_fails_before_writing() {
        let dir = tempdir().expect("tempdir");
        let mut config = CrosswalkConfig::for_data_dir(dir.path());
        config.output_dir = dir.path().join("out");
        config.task_ratings_path = None;
        let err = CrosswalkPipeline::new(config)
            .run_once()
            .await
            .expect_err("inputs are missing");
        assert!(err.to_string().contains("missing input"));
        assert!(!dir.path().join("out").exists());
    }
}
