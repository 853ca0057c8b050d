//! Observational audit reports. Nothing here mutates pipeline state.

use serde::Serialize;
use tracing::warn;
use xwalk_core::{MatchMethod, SourceMatch, UsageRecord};

use crate::enrich::OccupationCatalog;
use crate::index::TaxonomyIndex;
use crate::matching::MatchOutcome;

/// A record passes when `|Σ allocated − usage| <= relative · max(|usage|, 1)`
/// and `|Σ weight − 1| <= weight`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConservationTolerance {
    pub relative: f64,
    pub weight: f64,
}

impl Default for ConservationTolerance {
    fn default() -> Self {
        Self {
            relative: 1e-6,
            weight: 1e-9,
        }
    }
}

impl ConservationTolerance {
    fn usage_ok(&self, original: f64, allocated: f64) -> bool {
        (allocated - original).abs() <= self.relative * original.abs().max(1.0)
    }

    fn weight_ok(&self, weight_total: f64) -> bool {
        (weight_total - 1.0).abs() <= self.weight
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditStatus {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "FAIL")]
    Fail,
}

impl AuditStatus {
    fn from_ok(ok: bool) -> Self {
        if ok {
            Self::Pass
        } else {
            Self::Fail
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordConservation {
    pub record_id: usize,
    pub task_description: String,
    pub usage_count_original: f64,
    pub allocated_total: f64,
    pub split_weight_total: f64,
    pub n_candidates: usize,
    pub difference: f64,
    pub status: AuditStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountingLine {
    pub stage: String,
    pub value: String,
    pub percent_of_total: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConservationReport {
    pub records: Vec<RecordConservation>,
    pub accounting: Vec<AccountingLine>,
    pub status: AuditStatus,
    pub failures: usize,
}

impl ConservationReport {
    pub fn passed(&self) -> bool {
        self.status == AuditStatus::Pass
    }
}

fn percent(part: f64, whole: f64) -> String {
    if whole > 0.0 {
        format!("{:.2}%", 100.0 * part / whole)
    } else {
        "N/A".to_string()
    }
}

fn line(stage: &str, value: impl ToString, percent_of_total: String) -> AccountingLine {
    AccountingLine {
        stage: stage.to_string(),
        value: value.to_string(),
        percent_of_total,
    }
}

pub fn verify_conservation(
    records: &[UsageRecord],
    outcome: &MatchOutcome,
    tolerance: ConservationTolerance,
) -> ConservationReport {
    let per_record: Vec<RecordConservation> = outcome
        .matches
        .iter()
        .map(|m| {
            let allocated_total = m.allocated_total();
            let split_weight_total = m.weight_total();
            let ok = tolerance.usage_ok(m.record.usage_count, allocated_total)
                && tolerance.weight_ok(split_weight_total);
            RecordConservation {
                record_id: m.record_id,
                task_description: m.record.task_description.clone(),
                usage_count_original: m.record.usage_count,
                allocated_total,
                split_weight_total,
                n_candidates: m.allocations.len(),
                difference: allocated_total - m.record.usage_count,
                status: AuditStatus::from_ok(ok),
            }
        })
        .collect();

    let failures = per_record.iter().filter(|r| r.status == AuditStatus::Fail).count();
    for failed in per_record.iter().filter(|r| r.status == AuditStatus::Fail) {
        warn!(
            record_id = failed.record_id,
            task = %failed.task_description,
            original = failed.usage_count_original,
            allocated = failed.allocated_total,
            weights = failed.split_weight_total,
            "WARNING: usage conservation failed"
        );
    }

    let total_input: f64 = records.iter().map(|r| r.usage_count).sum();
    let excluded_usage: f64 = outcome.excluded.iter().map(|r| r.usage_count).sum();
    let eligible = total_input - excluded_usage;
    let matched_unique: f64 = outcome.matches.iter().map(|m| m.record.usage_count).sum();
    let matched_split: f64 = outcome.matches.iter().map(SourceMatch::allocated_total).sum();
    let unmatched_usage: f64 = outcome.unmatched.iter().map(|r| r.usage_count).sum();
    let n_matched = outcome.matches.len();
    let n_ambiguous = outcome.ambiguous_count();
    let n_rows: usize = outcome.matches.iter().map(|m| m.allocations.len()).sum();
    let n_eligible = records.len() - outcome.excluded.len();

    let aggregate_ok = failures == 0
        && tolerance.usage_ok(matched_unique, matched_split)
        && tolerance.usage_ok(eligible, matched_unique + unmatched_usage);
    let status = AuditStatus::from_ok(aggregate_ok);
    if !aggregate_ok {
        warn!(
            failures,
            matched_unique,
            matched_split,
            unmatched_usage,
            eligible,
            "WARNING: aggregate usage conservation failed"
        );
    }

    let accounting = vec![
        line("Total input usage", total_input, "N/A".to_string()),
        line("Excluded placeholder usage", excluded_usage, "N/A".to_string()),
        line("Total usage eligible for matching", eligible, "100.0%".to_string()),
        line("Matched usage (unique records)", matched_unique, percent(matched_unique, eligible)),
        line("Matched usage (after split)", matched_split, percent(matched_split, eligible)),
        line("Unmatched usage", unmatched_usage, percent(unmatched_usage, eligible)),
        line(
            "Matched + Unmatched (should equal eligible total)",
            matched_unique + unmatched_usage,
            percent(matched_unique + unmatched_usage, eligible),
        ),
        line("Unique matched records", n_matched, percent(n_matched as f64, n_eligible as f64)),
        line("Ambiguous records (multiple occupations)", n_ambiguous, percent(n_ambiguous as f64, n_matched as f64)),
        line("Crosswalk rows (after expansion)", n_rows, "N/A".to_string()),
        line("Excluded placeholder records", outcome.excluded.len(), "N/A".to_string()),
        line("Records failing conservation", failures, "N/A".to_string()),
        line("Conservation check", status.as_str(), "N/A".to_string()),
    ];

    ConservationReport {
        records: per_record,
        accounting,
        status,
        failures,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateTextRow {
    pub normalized_task_text: String,
    pub original_task_text: String,
    pub n_occupations: usize,
    pub occupation_codes: String,
}

pub fn duplicate_text_report(index: &TaxonomyIndex) -> Vec<DuplicateTextRow> {
    let mut rows: Vec<DuplicateTextRow> = index
        .duplicates()
        .map(|set| DuplicateTextRow {
            normalized_task_text: set.key.clone(),
            original_task_text: set.tasks.first().map(|t| t.task_text.clone()).unwrap_or_default(),
            n_occupations: set.size(),
            occupation_codes: set.occupation_codes().join("; "),
        })
        .collect();
    rows.sort_by(|a, b| {
        b.n_occupations
            .cmp(&a.n_occupations)
            .then_with(|| a.normalized_task_text.cmp(&b.normalized_task_text))
    });
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmbiguousMatchRow {
    pub ambiguous_group_id: Option<u32>,
    pub task_description: String,
    pub usage_count_original: f64,
    pub n_candidates: usize,
    pub candidate_occupation_codes: String,
    pub candidate_titles: String,
    pub match_method: MatchMethod,
    pub match_score: f64,
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

pub fn ambiguous_match_report(matches: &[SourceMatch], catalog: &OccupationCatalog) -> Vec<AmbiguousMatchRow> {
    let mut rows: Vec<AmbiguousMatchRow> = matches
        .iter()
        .filter(|m| m.is_ambiguous)
        .map(|m| {
            let mut codes = Vec::new();
            let mut titles = Vec::new();
            for allocation in &m.allocations {
                let code = allocation.task.occupation_code.as_str();
                push_unique(&mut codes, code);
                if let Some(title) = catalog.title(code) {
                    push_unique(&mut titles, title);
                }
            }
            AmbiguousMatchRow {
                ambiguous_group_id: m.ambiguous_group_id,
                task_description: m.record.task_description.clone(),
                usage_count_original: m.record.usage_count,
                n_candidates: m.candidate_set_size,
                candidate_occupation_codes: codes.join("; "),
                candidate_titles: titles.join("; "),
                match_method: m.method,
                match_score: m.score,
            }
        })
        .collect();
    rows.sort_by(|a, b| b.usage_count_original.total_cmp(&a.usage_count_original));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuzzy::FuzzyMatcher;
    use crate::matching::{match_records, MatchSettings};
    use crate::test_support::scenario_index;
    use xwalk_sources::OccupationRow;

    fn scenario_outcome(records: &[UsageRecord]) -> MatchOutcome {
        let index = scenario_index();
        let matcher = FuzzyMatcher::new(&index);
        match_records(records, &index, &matcher, &MatchSettings::default(), |_| None)
    }

    #[test]
    fn conservation_passes_and_accounts_for_all_usage() {
        let records = vec![
            UsageRecord::new("write code", 100.0),
            UsageRecord::new("oversee staff", 50.0),
            UsageRecord::new("juggle flaming torches", 7.0),
            UsageRecord::new("none", 3.0),
        ];
        let outcome = scenario_outcome(&records);
        let report = verify_conservation(&records, &outcome, ConservationTolerance::default());
        assert!(report.passed());
        assert_eq!(report.failures, 0);
        assert_eq!(report.records.len(), 2);
        assert!(report.records.iter().all(|r| r.difference.abs() < 1e-9));

        let value = |stage: &str| {
            report
                .accounting
                .iter()
                .find(|l| l.stage == stage)
                .map(|l| l.value.clone())
                .unwrap_or_default()
        };
        assert_eq!(value("Total input usage"), "160");
        assert_eq!(value("Matched usage (after split)"), "150");
        assert_eq!(value("Unmatched usage"), "7");
        assert_eq!(value("Matched + Unmatched (should equal eligible total)"), "157");
        assert_eq!(value("Crosswalk rows (after expansion)"), "3");
        assert_eq!(value("Conservation check"), "PASS");
    }

    #[test]
    fn tampered_allocation_fails_without_panicking() {
        let records = vec![UsageRecord::new("oversee staff", 50.0)];
        let mut outcome = scenario_outcome(&records);
        outcome.matches[0].allocations[0].allocated_usage = 30.0;
        let report = verify_conservation(&records, &outcome, ConservationTolerance::default());
        assert_eq!(report.status, AuditStatus::Fail);
        assert_eq!(report.failures, 1);
        assert_eq!(report.records[0].difference, 5.0);
        // Running the audit again yields the same report.
        let again = verify_conservation(&records, &outcome, ConservationTolerance::default());
        assert_eq!(report, again);
    }

    #[test]
    fn duplicate_and_ambiguous_reports() {
        let index = scenario_index();
        let duplicates = duplicate_text_report(&index);
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].normalized_task_text, "oversee staff");
        assert_eq!(duplicates[0].occupation_codes, "B; C");

        let records = vec![
            UsageRecord::new("oversee staff", 5.0),
            UsageRecord::new("Oversee staff!", 50.0),
            UsageRecord::new("write code", 100.0),
        ];
        let outcome = scenario_outcome(&records);
        let catalog = OccupationCatalog::from_tables(
            &[OccupationRow {
                occupation_code: "B".into(),
                title: Some("Managers".into()),
                description: None,
            }],
            &[],
            &[],
            &[],
        );
        let ambiguous = ambiguous_match_report(&outcome.matches, &catalog);
        assert_eq!(ambiguous.len(), 2);
        assert_eq!(ambiguous[0].usage_count_original, 50.0);
        assert_eq!(ambiguous[0].candidate_occupation_codes, "B; C");
        assert_eq!(ambiguous[0].candidate_titles, "Managers");
        assert_eq!(ambiguous[0].ambiguous_group_id, Some(2));
    }
}
