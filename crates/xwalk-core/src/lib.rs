//! Core domain model for the usage-to-occupation task crosswalk.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "xwalk-core";

pub const PLACEHOLDER_LABELS: [&str; 2] = ["not_classified", "none"];

pub const REDACTION_MARKERS: [&str; 5] = ["*", "**", "#", "~", "-"];

/// Canonical matching key: lowercase, alphanumerics and single spaces only.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_placeholder_label(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    PLACEHOLDER_LABELS.contains(&lowered.as_str())
}

/// Lenient numeric parse for published statistics. Redaction markers and any
/// other non-numeric token yield `None`, never zero.
pub fn coerce_numeric(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || REDACTION_MARKERS.contains(&trimmed) {
        return None;
    }
    let cleaned = trimmed.replace(',', "");
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => None,
    }
}

pub fn soc_6digit(occupation_code: &str) -> String {
    occupation_code
        .split('.')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub task_description: String,
    pub usage_count: f64,
}

impl UsageRecord {
    pub fn new(task_description: impl Into<String>, usage_count: f64) -> Self {
        Self {
            task_description: task_description.into(),
            usage_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    Core,
    Supplemental,
}

impl TaskType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "core" => Some(Self::Core),
            "supplemental" => Some(Self::Supplemental),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "Core",
            Self::Supplemental => "Supplemental",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyTask {
    pub occupation_code: String,
    pub task_id: String,
    pub task_text: String,
    pub task_type: Option<TaskType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Exact,
    Fuzzy,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Fuzzy => "fuzzy",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    #[default]
    Equal,
    Employment,
}

impl Weighting {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "equal" => Some(Self::Equal),
            "employment" => Some(Self::Employment),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::Employment => "employment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    MissingEmployment,
    ZeroEmployment,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingEmployment => "missing_employment",
            Self::ZeroEmployment => "zero_employment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub task: TaxonomyTask,
    pub split_weight: f64,
    pub allocated_usage: f64,
}

/// A matched usage record together with its weighted occupation allocations.
///
/// Conservation holds per value: the allocations' usage sums to
/// `record.usage_count` and their weights sum to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMatch {
    pub record_id: usize,
    pub record: UsageRecord,
    pub normalized_key: String,
    pub matched_key: String,
    pub method: MatchMethod,
    pub score: f64,
    pub candidate_set_size: usize,
    pub is_ambiguous: bool,
    pub ambiguous_group_id: Option<u32>,
    pub weighting: Weighting,
    pub fallback: Option<FallbackReason>,
    pub allocations: Vec<Allocation>,
}

impl SourceMatch {
    pub fn allocated_total(&self) -> f64 {
        self.allocations.iter().map(|a| a.allocated_usage).sum()
    }

    pub fn weight_total(&self) -> f64 {
        self.allocations.iter().map(|a| a.split_weight).sum()
    }

    pub fn rows(&self) -> Vec<MatchedTaskRow> {
        self.allocations
            .iter()
            .map(|allocation| MatchedTaskRow {
                record_id: self.record_id,
                task_description: self.record.task_description.clone(),
                usage_count_original: self.record.usage_count,
                allocated_usage: allocation.allocated_usage,
                split_weight: allocation.split_weight,
                is_ambiguous: self.is_ambiguous,
                candidate_set_size: self.candidate_set_size,
                ambiguous_group_id: self.ambiguous_group_id,
                match_method: self.method,
                match_score: self.score,
                matched_key: self.matched_key.clone(),
                weighting_applied: self.applied_weighting(),
                task: allocation.task.clone(),
            })
            .collect()
    }

    pub fn applied_weighting(&self) -> Weighting {
        if self.fallback.is_some() {
            Weighting::Equal
        } else {
            self.weighting
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedTaskRow {
    pub record_id: usize,
    pub task_description: String,
    pub usage_count_original: f64,
    pub allocated_usage: f64,
    pub split_weight: f64,
    pub is_ambiguous: bool,
    pub candidate_set_size: usize,
    pub ambiguous_group_id: Option<u32>,
    pub match_method: MatchMethod,
    pub match_score: f64,
    pub matched_key: String,
    pub weighting_applied: Weighting,
    pub task: TaxonomyTask,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OccupationProfile {
    pub title: Option<String>,
    pub description: Option<String>,
    pub job_zone: Option<f64>,
    pub typical_education: Option<String>,
    pub typical_education_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRow {
    pub row: MatchedTaskRow,
    pub occupation: OccupationProfile,
    pub task_importance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WageRecord {
    pub occ_code: String,
    pub occ_title: Option<String>,
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrosswalkRow {
    pub enriched: EnrichedRow,
    pub soc_6digit: String,
    pub wages: Option<WageRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_collapses_whitespace() {
        assert_eq!(normalize("  Write, Debug &  TEST code!\n"), "write debug test code");
        assert_eq!(normalize("self-driving"), "selfdriving");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \t ...  "), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "Oversee staff.",
            "  MIXED case\tand   tabs ",
            "Résumé review — über-quick",
            "not_classified",
            "100% of (things)",
            "",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn placeholder_labels_are_case_insensitive() {
        assert!(is_placeholder_label("not_classified"));
        assert!(is_placeholder_label(" NONE "));
        assert!(!is_placeholder_label("none of the above"));
    }

    #[test]
    fn coerce_numeric_treats_markers_as_missing() {
        assert_eq!(coerce_numeric("1,234.5"), Some(1234.5));
        assert_eq!(coerce_numeric(" 42 "), Some(42.0));
        assert_eq!(coerce_numeric("*"), None);
        assert_eq!(coerce_numeric("#"), None);
        assert_eq!(coerce_numeric(""), None);
        assert_eq!(coerce_numeric("NaN"), None);
        assert_eq!(coerce_numeric("n/a"), None);
        assert_eq!(coerce_numeric("0"), Some(0.0));
    }

    #[test]
    fn soc_code_truncates_suffix() {
        assert_eq!(soc_6digit("15-1252.00"), "15-1252");
        assert_eq!(soc_6digit("15-1252"), "15-1252");
    }

    #[test]
    fn rows_expand_allocations() {
        let task = |code: &str| TaxonomyTask {
            occupation_code: code.to_string(),
            task_id: "1".to_string(),
            task_text: "Oversee staff".to_string(),
            task_type: Some(TaskType::Core),
        };
        let m = SourceMatch {
            record_id: 0,
            record: UsageRecord::new("oversee staff", 50.0),
            normalized_key: "oversee staff".into(),
            matched_key: "oversee staff".into(),
            method: MatchMethod::Exact,
            score: 100.0,
            candidate_set_size: 2,
            is_ambiguous: true,
            ambiguous_group_id: Some(1),
            weighting: Weighting::Employment,
            fallback: Some(FallbackReason::ZeroEmployment),
            allocations: vec![
                Allocation { task: task("B"), split_weight: 0.5, allocated_usage: 25.0 },
                Allocation { task: task("C"), split_weight: 0.5, allocated_usage: 25.0 },
            ],
        };
        let rows = m.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].task.occupation_code, "C");
        assert_eq!(rows[0].weighting_applied, Weighting::Equal);
        assert_eq!(m.allocated_total(), 50.0);
        assert_eq!(m.weight_total(), 1.0);
    }
}
