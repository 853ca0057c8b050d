use serde::Serialize;
use tracing::{debug, info, info_span};
use xwalk_core::{is_placeholder_label, normalize, MatchMethod, SourceMatch, UsageRecord, Weighting};

use crate::fuzzy::FuzzyMatcher;
use crate::index::{exact_match, MatchCandidateSet, TaxonomyIndex};
use crate::split::split;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchSettings {
    pub fuzzy_threshold: f64,
    pub weighting: Weighting,
    pub parallel_fuzzy: bool,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            fuzzy_threshold: crate::fuzzy::DEFAULT_FUZZY_THRESHOLD,
            weighting: Weighting::Equal,
            parallel_fuzzy: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    PlaceholderLabel,
    EmptyText,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedRecord {
    pub record_id: usize,
    pub task_description: String,
    pub usage_count: f64,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmatchedRecord {
    pub record_id: usize,
    pub task_description: String,
    pub usage_count: f64,
    pub normalized_key: String,
}

#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub matches: Vec<SourceMatch>,
    pub unmatched: Vec<UnmatchedRecord>,
    pub excluded: Vec<ExcludedRecord>,
}

impl MatchOutcome {
    pub fn count_by_method(&self, method: MatchMethod) -> usize {
        self.matches.iter().filter(|m| m.method == method).count()
    }

    pub fn ambiguous_count(&self) -> usize {
        self.matches.iter().filter(|m| m.is_ambiguous).count()
    }

    pub fn fallback_count(&self) -> usize {
        self.matches.iter().filter(|m| m.fallback.is_some()).count()
    }
}

struct Resolved<'a> {
    record_id: usize,
    normalized_key: String,
    set: &'a MatchCandidateSet,
    method: MatchMethod,
    score: f64,
}

/// Run every usage record through the matchers and the splitter.
///
/// Records with an exact hit never reach the fuzzy matcher. Ambiguous records
/// receive group ids 1, 2, ... in input order.
pub fn match_records<F>(
    records: &[UsageRecord],
    index: &TaxonomyIndex,
    matcher: &FuzzyMatcher,
    settings: &MatchSettings,
    employment: F,
) -> MatchOutcome
where
    F: Fn(&str) -> Option<f64>,
{
    let span = info_span!("match_records", records = records.len());
    let _guard = span.enter();

    let mut outcome = MatchOutcome::default();
    let mut resolved: Vec<Resolved<'_>> = Vec::new();
    let mut fuzzy_queue: Vec<(usize, String)> = Vec::new();

    for (record_id, record) in records.iter().enumerate() {
        if is_placeholder_label(&record.task_description) {
            outcome.excluded.push(excluded(record_id, record, ExclusionReason::PlaceholderLabel));
            continue;
        }
        let normalized_key = normalize(&record.task_description);
        if normalized_key.is_empty() {
            outcome.excluded.push(excluded(record_id, record, ExclusionReason::EmptyText));
            continue;
        }
        match exact_match(index, &normalized_key) {
            Some(set) => resolved.push(Resolved {
                record_id,
                normalized_key,
                set,
                method: MatchMethod::Exact,
                score: 100.0,
            }),
            None => fuzzy_queue.push((record_id, normalized_key)),
        }
    }
    let exact = resolved.len();

    let keys: Vec<String> = fuzzy_queue.iter().map(|(_, key)| key.clone()).collect();
    let hits = matcher.match_batch(&keys, settings.fuzzy_threshold, settings.parallel_fuzzy);
    for ((record_id, normalized_key), hit) in fuzzy_queue.into_iter().zip(hits) {
        match hit.and_then(|hit| index.get(&hit.key).map(|set| (set, hit.score))) {
            Some((set, score)) => {
                debug!(record_id, key = %normalized_key, matched = %set.key, score, "fuzzy match");
                resolved.push(Resolved {
                    record_id,
                    normalized_key,
                    set,
                    method: MatchMethod::Fuzzy,
                    score,
                });
            }
            None => {
                let record = &records[record_id];
                outcome.unmatched.push(UnmatchedRecord {
                    record_id,
                    task_description: record.task_description.clone(),
                    usage_count: record.usage_count,
                    normalized_key,
                });
            }
        }
    }
    resolved.sort_by_key(|r| r.record_id);

    let mut next_group_id = 0u32;
    for item in resolved {
        let record = &records[item.record_id];
        let is_ambiguous = item.set.is_ambiguous();
        let ambiguous_group_id = is_ambiguous.then(|| {
            next_group_id += 1;
            next_group_id
        });
        let split_outcome = split(record, item.set, settings.weighting, &employment);
        outcome.matches.push(SourceMatch {
            record_id: item.record_id,
            record: record.clone(),
            normalized_key: item.normalized_key,
            matched_key: item.set.key.clone(),
            method: item.method,
            score: item.score,
            candidate_set_size: item.set.size(),
            is_ambiguous,
            ambiguous_group_id,
            weighting: settings.weighting,
            fallback: split_outcome.fallback,
            allocations: split_outcome.allocations,
        });
    }

    info!(
        exact,
        fuzzy = outcome.matches.len() - exact,
        unmatched = outcome.unmatched.len(),
        excluded = outcome.excluded.len(),
        ambiguous = outcome.ambiguous_count(),
        "matching complete"
    );
    outcome
}

fn excluded(record_id: usize, record: &UsageRecord, reason: ExclusionReason) -> ExcludedRecord {
    ExcludedRecord {
        record_id,
        task_description: record.task_description.clone(),
        usage_count: record.usage_count,
        reason,
    }
}
