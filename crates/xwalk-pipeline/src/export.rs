use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{ArrayRef, BooleanArray, Float64Array, RecordBatch, StringArray, UInt32Array, UInt64Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use parquet::arrow::ArrowWriter;
use serde::Serialize;
use xwalk_core::{CrosswalkRow, MatchMethod, MatchedTaskRow, Weighting};

pub fn sort_by_usage(rows: &mut [CrosswalkRow]) {
    rows.sort_by(|a, b| {
        b.enriched
            .row
            .usage_count_original
            .total_cmp(&a.enriched.row.usage_count_original)
    });
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrosswalkCsvRow<'a> {
    pub record_id: usize,
    pub task_description: &'a str,
    pub usage_count_original: f64,
    pub allocated_usage: f64,
    pub split_weight: f64,
    pub n_candidates: usize,
    pub is_ambiguous: bool,
    pub ambiguous_group_id: Option<u32>,
    pub occupation_code: &'a str,
    pub task_id: &'a str,
    pub task_text: &'a str,
    pub task_type: Option<&'static str>,
    pub occupation_title: Option<&'a str>,
    pub occupation_description: Option<&'a str>,
    pub match_method: MatchMethod,
    pub match_score: f64,
    pub matched_key: &'a str,
    pub weighting_applied: Weighting,
    pub job_zone: Option<f64>,
    pub typical_education: Option<&'a str>,
    pub typical_education_pct: Option<f64>,
    pub task_importance: Option<f64>,
}

impl<'a> From<&'a CrosswalkRow> for CrosswalkCsvRow<'a> {
    fn from(value: &'a CrosswalkRow) -> Self {
        let row = &value.enriched.row;
        let occupation = &value.enriched.occupation;
        Self {
            record_id: row.record_id,
            task_description: &row.task_description,
            usage_count_original: row.usage_count_original,
            allocated_usage: row.allocated_usage,
            split_weight: row.split_weight,
            n_candidates: row.candidate_set_size,
            is_ambiguous: row.is_ambiguous,
            ambiguous_group_id: row.ambiguous_group_id,
            occupation_code: &row.task.occupation_code,
            task_id: &row.task.task_id,
            task_text: &row.task.task_text,
            task_type: row.task.task_type.map(|t| t.as_str()),
            occupation_title: occupation.title.as_deref(),
            occupation_description: occupation.description.as_deref(),
            match_method: row.match_method,
            match_score: row.match_score,
            matched_key: &row.matched_key,
            weighting_applied: row.weighting_applied,
            job_zone: occupation.job_zone,
            typical_education: occupation.typical_education.as_deref(),
            typical_education_pct: occupation.typical_education_pct,
            task_importance: value.enriched.task_importance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrosswalkWagesCsvRow<'a> {
    pub record_id: usize,
    pub task_description: &'a str,
    pub usage_count_original: f64,
    pub allocated_usage: f64,
    pub split_weight: f64,
    pub n_candidates: usize,
    pub is_ambiguous: bool,
    pub ambiguous_group_id: Option<u32>,
    pub occupation_code: &'a str,
    pub task_id: &'a str,
    pub task_text: &'a str,
    pub task_type: Option<&'static str>,
    pub occupation_title: Option<&'a str>,
    pub occupation_description: Option<&'a str>,
    pub match_method: MatchMethod,
    pub match_score: f64,
    pub matched_key: &'a str,
    pub weighting_applied: Weighting,
    pub job_zone: Option<f64>,
    pub typical_education: Option<&'a str>,
    pub typical_education_pct: Option<f64>,
    pub task_importance: Option<f64>,
    pub soc_6digit: &'a str,
    pub occ_title: Option<&'a str>,
    pub tot_emp: Option<f64>,
    pub h_mean: Option<f64>,
    pub a_mean: Option<f64>,
    pub h_median: Option<f64>,
    pub a_median: Option<f64>,
    pub h_pct10: Option<f64>,
    pub h_pct25: Option<f64>,
    pub h_pct75: Option<f64>,
    pub h_pct90: Option<f64>,
    pub a_pct10: Option<f64>,
    pub a_pct25: Option<f64>,
    pub a_pct75: Option<f64>,
    pub a_pct90: Option<f64>,
}

impl<'a> From<&'a CrosswalkRow> for CrosswalkWagesCsvRow<'a> {
    fn from(value: &'a CrosswalkRow) -> Self {
        let base = CrosswalkCsvRow::from(value);
        let wages = value.wages.as_ref();
        let num = |pick: fn(&xwalk_core::WageRecord) -> Option<f64>| wages.and_then(pick);
        Self {
            record_id: base.record_id,
            task_description: base.task_description,
            usage_count_original: base.usage_count_original,
            allocated_usage: base.allocated_usage,
            split_weight: base.split_weight,
            n_candidates: base.n_candidates,
            is_ambiguous: base.is_ambiguous,
            ambiguous_group_id: base.ambiguous_group_id,
            occupation_code: base.occupation_code,
            task_id: base.task_id,
            task_text: base.task_text,
            task_type: base.task_type,
            occupation_title: base.occupation_title,
            occupation_description: base.occupation_description,
            match_method: base.match_method,
            match_score: base.match_score,
            matched_key: base.matched_key,
            weighting_applied: base.weighting_applied,
            job_zone: base.job_zone,
            typical_education: base.typical_education,
            typical_education_pct: base.typical_education_pct,
            task_importance: base.task_importance,
            soc_6digit: &value.soc_6digit,
            occ_title: wages.and_then(|w| w.occ_title.as_deref()),
            tot_emp: num(|w| w.tot_emp),
            h_mean: num(|w| w.h_mean),
            a_mean: num(|w| w.a_mean),
            h_median: num(|w| w.h_median),
            a_median: num(|w| w.a_median),
            h_pct10: num(|w| w.h_pct10),
            h_pct25: num(|w| w.h_pct25),
            h_pct75: num(|w| w.h_pct75),
            h_pct90: num(|w| w.h_pct90),
            a_pct10: num(|w| w.a_pct10),
            a_pct25: num(|w| w.a_pct25),
            a_pct75: num(|w| w.a_pct75),
            a_pct90: num(|w| w.a_pct90),
        }
    }
}

pub fn crosswalk_csv_rows(rows: &[CrosswalkRow]) -> Vec<CrosswalkCsvRow<'_>> {
    rows.iter().map(CrosswalkCsvRow::from).collect()
}

pub fn crosswalk_wages_csv_rows(rows: &[CrosswalkRow]) -> Vec<CrosswalkWagesCsvRow<'_>> {
    rows.iter().map(CrosswalkWagesCsvRow::from).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotManifest {
    pub schema_version: u32,
    pub files: Vec<SnapshotManifestFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

pub fn crosswalk_record_batch(rows: &[CrosswalkRow]) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("record_id", DataType::UInt64, false),
        ArrowField::new("task_description", DataType::Utf8, false),
        ArrowField::new("usage_count_original", DataType::Float64, false),
        ArrowField::new("allocated_usage", DataType::Float64, false),
        ArrowField::new("split_weight", DataType::Float64, false),
        ArrowField::new("is_ambiguous", DataType::Boolean, false),
        ArrowField::new("ambiguous_group_id", DataType::UInt32, true),
        ArrowField::new("occupation_code", DataType::Utf8, false),
        ArrowField::new("task_id", DataType::Utf8, false),
        ArrowField::new("match_method", DataType::Utf8, false),
        ArrowField::new("match_score", DataType::Float64, false),
        ArrowField::new("occupation_title", DataType::Utf8, true),
        ArrowField::new("job_zone", DataType::Float64, true),
        ArrowField::new("task_importance", DataType::Float64, true),
        ArrowField::new("soc_6digit", DataType::Utf8, false),
        ArrowField::new("tot_emp", DataType::Float64, true),
        ArrowField::new("a_mean", DataType::Float64, true),
    ]));

    fn row(r: &CrosswalkRow) -> &MatchedTaskRow {
        &r.enriched.row
    }
    let columns: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(rows.iter().map(|r| row(r).record_id as u64).collect::<Vec<_>>())),
        Arc::new(StringArray::from(
            rows.iter().map(|r| Some(row(r).task_description.as_str())).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(rows.iter().map(|r| row(r).usage_count_original).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|r| row(r).allocated_usage).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|r| row(r).split_weight).collect::<Vec<_>>())),
        Arc::new(BooleanArray::from(rows.iter().map(|r| row(r).is_ambiguous).collect::<Vec<_>>())),
        Arc::new(UInt32Array::from(rows.iter().map(|r| row(r).ambiguous_group_id).collect::<Vec<_>>())),
        Arc::new(StringArray::from(
            rows.iter().map(|r| Some(row(r).task.occupation_code.as_str())).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|r| Some(row(r).task.task_id.as_str())).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|r| Some(row(r).match_method.as_str())).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(rows.iter().map(|r| row(r).match_score).collect::<Vec<_>>())),
        Arc::new(StringArray::from(
            rows.iter()
                .map(|r| r.enriched.occupation.title.as_deref())
                .collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            rows.iter().map(|r| r.enriched.occupation.job_zone).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            rows.iter().map(|r| r.enriched.task_importance).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter().map(|r| Some(r.soc_6digit.as_str())).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            rows.iter()
                .map(|r| r.wages.as_ref().and_then(|w| w.tot_emp))
                .collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            rows.iter()
                .map(|r| r.wages.as_ref().and_then(|w| w.a_mean))
                .collect::<Vec<_>>(),
        )),
    ];

    RecordBatch::try_new(schema, columns).context("building crosswalk record batch")
}

pub fn parquet_bytes(batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut writer = ArrowWriter::try_new(Vec::new(), batch.schema(), None)
        .context("opening parquet writer")?;
    writer.write(batch).context("writing record batch")?;
    writer.into_inner().context("closing parquet writer")
}
