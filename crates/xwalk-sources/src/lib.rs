//! Input table loaders and usage-export source adapters.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use xwalk_core::{TaskType, TaxonomyTask, UsageRecord};

pub const CRATE_NAME: &str = "xwalk-sources";

pub const DEFAULT_USAGE_FACET: &str = "onet_task";
pub const DEFAULT_USAGE_VARIABLE: &str = "onet_task_count";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("reading {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {origin}: {source}")]
    Csv {
        origin: String,
        #[source]
        source: csv::Error,
    },
    #[error("{origin}: row {row}: invalid {field} value {value:?}")]
    InvalidValue {
        origin: String,
        row: usize,
        field: &'static str,
        value: String,
    },
    #[error("unknown usage format {0:?} (expected auto, faceted or flat)")]
    UnknownFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
}

impl Delimiter {
    pub fn for_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("txt") | Some("tsv") => Self::Tab,
            _ => Self::Comma,
        }
    }

    fn byte(self) -> u8 {
        match self {
            Self::Comma => b',',
            Self::Tab => b'\t',
        }
    }
}

// Taxonomy release text files are tab-separated and carry bare quote characters
// inside task statements, so quoting is only honoured for comma files.
fn table_reader<R: Read>(rdr: R, delimiter: Delimiter) -> csv::Reader<R> {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .delimiter(delimiter.byte())
        .has_headers(true)
        .trim(csv::Trim::Headers);
    if delimiter == Delimiter::Tab {
        builder.quoting(false);
    }
    builder.from_reader(rdr)
}

fn read_rows<T, R>(rdr: R, delimiter: Delimiter, origin: &str) -> Result<Vec<T>, SourceError>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut reader = table_reader(rdr, delimiter);
    let mut rows = Vec::new();
    for result in reader.deserialize::<T>() {
        let row = result.map_err(|source| SourceError::Csv {
            origin: origin.to_string(),
            source,
        })?;
        rows.push(row);
    }
    debug!(origin, rows = rows.len(), "loaded table");
    Ok(rows)
}

fn open(path: &Path) -> Result<File, SourceError> {
    File::open(path).map_err(|source| SourceError::Io {
        origin: path.display().to_string(),
        source,
    })
}

fn load_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SourceError> {
    let file = open(path)?;
    read_rows(file, Delimiter::for_path(path), &path.display().to_string())
}

fn text_or_none(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[derive(Debug, Clone, Deserialize)]
struct TaskStatementRow {
    #[serde(rename = "O*NET-SOC Code", alias = "occupation_code")]
    occupation_code: String,
    #[serde(rename = "Task ID", alias = "task_id")]
    task_id: String,
    #[serde(rename = "Task", alias = "task_text")]
    task_text: String,
    #[serde(rename = "Task Type", alias = "task_type", default)]
    task_type: Option<String>,
}

pub fn parse_taxonomy_tasks<R: Read>(
    rdr: R,
    delimiter: Delimiter,
    origin: &str,
) -> Result<Vec<TaxonomyTask>, SourceError> {
    let rows: Vec<TaskStatementRow> = read_rows(rdr, delimiter, origin)?;
    Ok(rows
        .into_iter()
        .map(|row| TaxonomyTask {
            occupation_code: row.occupation_code.trim().to_string(),
            task_id: row.task_id.trim().to_string(),
            task_text: row.task_text,
            task_type: row.task_type.as_deref().and_then(TaskType::parse),
        })
        .collect())
}

pub fn load_taxonomy_tasks(path: impl AsRef<Path>) -> Result<Vec<TaxonomyTask>, SourceError> {
    let path = path.as_ref();
    parse_taxonomy_tasks(open(path)?, Delimiter::for_path(path), &path.display().to_string())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OccupationRow {
    #[serde(rename = "O*NET-SOC Code", alias = "occupation_code")]
    pub occupation_code: String,
    #[serde(rename = "Title", alias = "title", default)]
    pub title: Option<String>,
    #[serde(rename = "Description", alias = "description", default)]
    pub description: Option<String>,
}

pub fn load_occupations(path: impl AsRef<Path>) -> Result<Vec<OccupationRow>, SourceError> {
    let rows: Vec<OccupationRow> = load_rows(path.as_ref())?;
    Ok(rows
        .into_iter()
        .map(|row| OccupationRow {
            occupation_code: row.occupation_code.trim().to_string(),
            title: text_or_none(row.title),
            description: text_or_none(row.description),
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobZoneRow {
    #[serde(rename = "O*NET-SOC Code", alias = "occupation_code")]
    pub occupation_code: String,
    #[serde(rename = "Job Zone", alias = "job_zone", alias = "tier", default)]
    pub job_zone: Option<String>,
}

pub fn load_job_zones(path: impl AsRef<Path>) -> Result<Vec<JobZoneRow>, SourceError> {
    load_rows(path.as_ref())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EducationRow {
    #[serde(rename = "O*NET-SOC Code", alias = "occupation_code")]
    pub occupation_code: String,
    #[serde(rename = "Element Name", alias = "element_name", default)]
    pub element_name: Option<String>,
    #[serde(rename = "Category", alias = "category")]
    pub category: String,
    #[serde(rename = "Data Value", alias = "proportion", default)]
    pub proportion: Option<String>,
}

pub fn load_education(path: impl AsRef<Path>) -> Result<Vec<EducationRow>, SourceError> {
    load_rows(path.as_ref())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskRatingRow {
    #[serde(rename = "O*NET-SOC Code", alias = "occupation_code")]
    pub occupation_code: String,
    #[serde(rename = "Task ID", alias = "task_id")]
    pub task_id: String,
    #[serde(rename = "Scale ID", alias = "scale_id")]
    pub scale_id: String,
    #[serde(rename = "Data Value", alias = "data_value", default)]
    pub data_value: Option<String>,
}

pub fn load_task_ratings(path: impl AsRef<Path>) -> Result<Vec<TaskRatingRow>, SourceError> {
    load_rows(path.as_ref())
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct WageSourceRow {
    #[serde(rename = "AREA", alias = "area", default)]
    pub area: Option<String>,
    #[serde(rename = "NAICS", alias = "naics", default)]
    pub naics: Option<String>,
    #[serde(rename = "O_GROUP", alias = "o_group", default)]
    pub o_group: Option<String>,
    #[serde(rename = "OCC_CODE", alias = "occ_code")]
    pub occ_code: String,
    #[serde(rename = "OCC_TITLE", alias = "occ_title", default)]
    pub occ_title: Option<String>,
    #[serde(rename = "TOT_EMP", alias = "tot_emp", default)]
    pub tot_emp: Option<String>,
    #[serde(rename = "H_MEAN", alias = "h_mean", default)]
    pub h_mean: Option<String>,
    #[serde(rename = "A_MEAN", alias = "a_mean", default)]
    pub a_mean: Option<String>,
    #[serde(rename = "H_MEDIAN", alias = "h_median", default)]
    pub h_median: Option<String>,
    #[serde(rename = "A_MEDIAN", alias = "a_median", default)]
    pub a_median: Option<String>,
    #[serde(rename = "H_PCT10", alias = "h_pct10", default)]
    pub h_pct10: Option<String>,
    #[serde(rename = "H_PCT25", alias = "h_pct25", default)]
    pub h_pct25: Option<String>,
    #[serde(rename = "H_PCT75", alias = "h_pct75", default)]
    pub h_pct75: Option<String>,
    #[serde(rename = "H_PCT90", alias = "h_pct90", default)]
    pub h_pct90: Option<String>,
    #[serde(rename = "A_PCT10", alias = "a_pct10", default)]
    pub a_pct10: Option<String>,
    #[serde(rename = "A_PCT25", alias = "a_pct25", default)]
    pub a_pct25: Option<String>,
    #[serde(rename = "A_PCT75", alias = "a_pct75", default)]
    pub a_pct75: Option<String>,
    #[serde(rename = "A_PCT90", alias = "a_pct90", default)]
    pub a_pct90: Option<String>,
}

pub fn parse_wage_rows<R: Read>(
    rdr: R,
    delimiter: Delimiter,
    origin: &str,
) -> Result<Vec<WageSourceRow>, SourceError> {
    read_rows(rdr, delimiter, origin)
}

pub fn load_wage_rows(path: impl AsRef<Path>) -> Result<Vec<WageSourceRow>, SourceError> {
    load_rows(path.as_ref())
}

/// Seam for the different shapes a usage export can take.
pub trait UsageSource: Send + Sync {
    fn format_id(&self) -> &'static str;

    fn parse_usage(
        &self,
        bytes: &[u8],
        delimiter: Delimiter,
        origin: &str,
    ) -> Result<Vec<UsageRecord>, SourceError>;
}

fn parse_count(raw: &str, origin: &str, row: usize) -> Result<f64, SourceError> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(SourceError::InvalidValue {
            origin: origin.to_string(),
            row,
            field: "usage_count",
            value: raw.to_string(),
        }),
    }
}

#[derive(Debug, Clone)]
pub struct FacetedUsageExport {
    pub facet: String,
    pub variable: String,
}

impl Default for FacetedUsageExport {
    fn default() -> Self {
        Self {
            facet: DEFAULT_USAGE_FACET.to_string(),
            variable: DEFAULT_USAGE_VARIABLE.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FacetedRow {
    facet: String,
    variable: String,
    cluster_name: String,
    value: String,
}

impl UsageSource for FacetedUsageExport {
    fn format_id(&self) -> &'static str {
        "faceted"
    }

    fn parse_usage(
        &self,
        bytes: &[u8],
        delimiter: Delimiter,
        origin: &str,
    ) -> Result<Vec<UsageRecord>, SourceError> {
        let rows: Vec<FacetedRow> = read_rows(bytes, delimiter, origin)?;
        let mut out = Vec::new();
        for (idx, row) in rows.into_iter().enumerate() {
            if row.facet != self.facet || row.variable != self.variable {
                continue;
            }
            let usage_count = parse_count(&row.value, origin, idx + 1)?;
            out.push(UsageRecord::new(row.cluster_name, usage_count));
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FlatUsageTable;

#[derive(Debug, Deserialize)]
struct FlatRow {
    #[serde(alias = "task", alias = "cluster_name")]
    task_description: String,
    #[serde(alias = "count", alias = "value")]
    usage_count: String,
}

impl UsageSource for FlatUsageTable {
    fn format_id(&self) -> &'static str {
        "flat"
    }

    fn parse_usage(
        &self,
        bytes: &[u8],
        delimiter: Delimiter,
        origin: &str,
    ) -> Result<Vec<UsageRecord>, SourceError> {
        let rows: Vec<FlatRow> = read_rows(bytes, delimiter, origin)?;
        rows.into_iter()
            .enumerate()
            .map(|(idx, row)| {
                let usage_count = parse_count(&row.usage_count, origin, idx + 1)?;
                Ok(UsageRecord::new(row.task_description, usage_count))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AutoDetectUsage {
    faceted: FacetedUsageExport,
}

impl UsageSource for AutoDetectUsage {
    fn format_id(&self) -> &'static str {
        "auto"
    }

    fn parse_usage(
        &self,
        bytes: &[u8],
        delimiter: Delimiter,
        origin: &str,
    ) -> Result<Vec<UsageRecord>, SourceError> {
        let mut reader = table_reader(bytes, delimiter);
        let headers = reader.headers().map_err(|source| SourceError::Csv {
            origin: origin.to_string(),
            source,
        })?;
        if headers.iter().any(|h| h == "facet") {
            self.faceted.parse_usage(bytes, delimiter, origin)
        } else {
            FlatUsageTable.parse_usage(bytes, delimiter, origin)
        }
    }
}

pub fn usage_source_for(format: &str) -> Option<Box<dyn UsageSource>> {
    match format.trim().to_ascii_lowercase().as_str() {
        "auto" => Some(Box::new(AutoDetectUsage::default())),
        "faceted" => Some(Box::new(FacetedUsageExport::default())),
        "flat" => Some(Box::new(FlatUsageTable)),
        _ => None,
    }
}

pub fn load_usage(path: impl AsRef<Path>, format: &str) -> Result<Vec<UsageRecord>, SourceError> {
    let path = path.as_ref();
    let source =
        usage_source_for(format).ok_or_else(|| SourceError::UnknownFormat(format.to_string()))?;
    let bytes = std::fs::read(path).map_err(|source| SourceError::Io {
        origin: path.display().to_string(),
        source,
    })?;
    source.parse_usage(&bytes, Delimiter::for_path(path), &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_follows_extension() {
        assert_eq!(Delimiter::for_path(Path::new("Task Statements.txt")), Delimiter::Tab);
        assert_eq!(Delimiter::for_path(Path::new("x.TSV")), Delimiter::Tab);
        assert_eq!(Delimiter::for_path(Path::new("wages.csv")), Delimiter::Comma);
    }

    #[test]
    fn flat_usage_parses_counts() {
        let csv = "task_description,usage_count\nWrite code,100\n\"Oversee staff, daily\",50.5\n";
        let records = FlatUsageTable
            .parse_usage(csv.as_bytes(), Delimiter::Comma, "inline")
            .unwrap();
        assert_eq!(
            records,
            vec![
                UsageRecord::new("Write code", 100.0),
                UsageRecord::new("Oversee staff, daily", 50.5),
            ]
        );
    }

    #[test]
    fn faceted_usage_keeps_only_task_counts() {
        let csv = "geo_id,facet,variable,cluster_name,value\n\
                   GLOBAL,onet_task,onet_task_count,Write code,10\n\
                   GLOBAL,onet_task,onet_task_pct,Write code,0.4\n\
                   GLOBAL,collaboration,collab_count,directive,7\n\
                   GLOBAL,onet_task,onet_task_count,not_classified,3\n";
        let records = FacetedUsageExport::default()
            .parse_usage(csv.as_bytes(), Delimiter::Comma, "inline")
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], UsageRecord::new("Write code", 10.0));
        assert_eq!(records[1].task_description, "not_classified");
    }

    #[test]
    fn auto_detect_switches_on_facet_header() {
        let auto = usage_source_for("auto").unwrap();
        let faceted = "facet,variable,cluster_name,value\nonet_task,onet_task_count,A,1\n";
        let flat = "task_description,usage_count\nA,2\n";
        let a = auto.parse_usage(faceted.as_bytes(), Delimiter::Comma, "f").unwrap();
        let b = auto.parse_usage(flat.as_bytes(), Delimiter::Comma, "g").unwrap();
        assert_eq!(a, vec![UsageRecord::new("A", 1.0)]);
        assert_eq!(b, vec![UsageRecord::new("A", 2.0)]);
    }

    #[test]
    fn negative_or_textual_counts_are_rejected() {
        let csv = "task_description,usage_count\nA,-1\n";
        let err = FlatUsageTable
            .parse_usage(csv.as_bytes(), Delimiter::Comma, "inline")
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidValue { row: 1, .. }));

        let csv = "task_description,usage_count\nA,lots\n";
        assert!(FlatUsageTable
            .parse_usage(csv.as_bytes(), Delimiter::Comma, "inline")
            .is_err());
    }

    #[test]
    fn unknown_usage_format_is_none() {
        assert!(usage_source_for("parquet").is_none());
        assert!(usage_source_for(" FLAT ").is_some());
    }

    #[test]
    fn taxonomy_tab_files_keep_bare_quotes() {
        let tsv = "O*NET-SOC Code\tTask ID\tTask\tTask Type\n\
                   15-1252.00\t101\tWrite \"clean\" code.\tCore\n\
                   11-1021.00\t102\tOversee staff.\t\n";
        let tasks = parse_taxonomy_tasks(tsv.as_bytes(), Delimiter::Tab, "inline").unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].task_text, "Write \"clean\" code.");
        assert_eq!(tasks[0].task_type, Some(TaskType::Core));
        assert_eq!(tasks[1].task_type, None);
    }

    #[test]
    fn wage_rows_tolerate_missing_filter_columns() {
        let csv = "OCC_CODE,OCC_TITLE,TOT_EMP,A_MEAN\n15-1252,Software Developers,\"1,654,440\",*\n";
        let rows = parse_wage_rows(csv.as_bytes(), Delimiter::Comma, "inline").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].area, None);
        assert_eq!(rows[0].tot_emp.as_deref(), Some("1,654,440"));
        assert_eq!(rows[0].a_mean.as_deref(), Some("*"));
        assert_eq!(rows[0].h_mean, None);
    }
}
