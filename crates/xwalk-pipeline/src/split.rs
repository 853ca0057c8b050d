use tracing::info;
use xwalk_core::{Allocation, FallbackReason, UsageRecord, Weighting};

use crate::index::MatchCandidateSet;

#[derive(Debug, Clone, PartialEq)]
pub struct SplitOutcome {
    pub allocations: Vec<Allocation>,
    pub fallback: Option<FallbackReason>,
}

pub fn split<F>(
    record: &UsageRecord,
    candidates: &MatchCandidateSet,
    weighting: Weighting,
    employment: F,
) -> SplitOutcome
where
    F: Fn(&str) -> Option<f64>,
{
    let n = candidates.size();
    let mut fallback = None;
    let weights = match weighting {
        Weighting::Equal => equal_weights(n),
        Weighting::Employment if n <= 1 => equal_weights(n),
        Weighting::Employment => match employment_weights(candidates, &employment) {
            Ok(weights) => weights,
            Err(reason) => {
                info!(
                    task = %record.task_description,
                    candidates = n,
                    reason = reason.as_str(),
                    "employment weighting unavailable; using equal split"
                );
                fallback = Some(reason);
                equal_weights(n)
            }
        },
    };

    let allocations = candidates
        .tasks
        .iter()
        .zip(weights)
        .map(|(task, split_weight)| Allocation {
            task: task.clone(),
            split_weight,
            allocated_usage: record.usage_count * split_weight,
        })
        .collect();

    SplitOutcome {
        allocations,
        fallback,
    }
}

fn equal_weights(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    vec![1.0 / n as f64; n]
}

fn employment_weights<F>(candidates: &MatchCandidateSet, employment: &F) -> Result<Vec<f64>, FallbackReason>
where
    F: Fn(&str) -> Option<f64>,
{
    let figures = candidates
        .tasks
        .iter()
        .map(|task| match employment(&task.occupation_code) {
            Some(value) if value.is_finite() && value >= 0.0 => Ok(value),
            _ => Err(FallbackReason::MissingEmployment),
        })
        .collect::<Result<Vec<_>, _>>()?;
    // Every candidate row must carry a positive weight.
    if figures.iter().any(|value| *value <= 0.0) {
        return Err(FallbackReason::ZeroEmployment);
    }
    let total: f64 = figures.iter().sum();
    Ok(figures.into_iter().map(|value| value / total).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xwalk_core::TaxonomyTask;

    fn candidates(codes: &[&str]) -> MatchCandidateSet {
        MatchCandidateSet {
            key: "oversee staff".into(),
            tasks: codes
                .iter()
                .enumerate()
                .map(|(i, code)| TaxonomyTask {
                    occupation_code: code.to_string(),
                    task_id: (i + 1).to_string(),
                    task_text: "Oversee staff".into(),
                    task_type: None,
                })
                .collect(),
        }
    }

    fn no_employment(_: &str) -> Option<f64> {
        None
    }

    #[test]
    fn equal_split_divides_evenly() {
        let record = UsageRecord::new("oversee staff", 50.0);
        let outcome = split(&record, &candidates(&["B", "C"]), Weighting::Equal, no_employment);
        assert_eq!(outcome.fallback, None);
        let usage: Vec<f64> = outcome.allocations.iter().map(|a| a.allocated_usage).collect();
        assert_eq!(usage, vec![25.0, 25.0]);
        assert!(outcome.allocations.iter().all(|a| a.split_weight == 0.5));
        assert_eq!(record.usage_count, 50.0);
    }

    #[test]
    fn employment_split_is_proportional() {
        let record = UsageRecord::new("oversee staff", 100.0);
        let lookup = |code: &str| match code {
            "B" => Some(300.0),
            "C" => Some(100.0),
            _ => None,
        };
        let outcome = split(&record, &candidates(&["B", "C"]), Weighting::Employment, lookup);
        assert_eq!(outcome.fallback, None);
        assert_eq!(outcome.allocations[0].split_weight, 0.75);
        assert_eq!(outcome.allocations[1].allocated_usage, 25.0);
    }

    #[test]
    fn zero_or_missing_employment_falls_back_to_equal() {
        let record = UsageRecord::new("oversee staff", 90.0);
        let set = candidates(&["B", "C", "D"]);

        let zero = split(&record, &set, Weighting::Employment, |_| Some(0.0));
        assert_eq!(zero.fallback, Some(FallbackReason::ZeroEmployment));

        let partial = |code: &str| (code != "C").then_some(10.0);
        let missing = split(&record, &set, Weighting::Employment, partial);
        assert_eq!(missing.fallback, Some(FallbackReason::MissingEmployment));

        let one_zero = |code: &str| Some(if code == "D" { 0.0 } else { 50.0 });
        let mixed = split(&record, &set, Weighting::Employment, one_zero);
        assert_eq!(mixed.fallback, Some(FallbackReason::ZeroEmployment));

        let none = split(&record, &set, Weighting::Employment, no_employment);
        for outcome in [zero, missing, mixed, none] {
            for allocation in &outcome.allocations {
                assert!((allocation.split_weight - 1.0 / 3.0).abs() < 1e-12);
            }
            let total: f64 = outcome.allocations.iter().map(|a| a.allocated_usage).sum();
            assert!((total - 90.0).abs() <= 1e-6 * 90.0);
        }
    }

    #[test]
    fn single_candidate_takes_full_usage() {
        let record = UsageRecord::new("write code", 100.0);
        let outcome = split(&record, &candidates(&["A"]), Weighting::Employment, no_employment);
        assert_eq!(outcome.fallback, None);
        assert_eq!(outcome.allocations.len(), 1);
        assert_eq!(outcome.allocations[0].allocated_usage, 100.0);
        assert_eq!(outcome.allocations[0].split_weight, 1.0);
    }
}
