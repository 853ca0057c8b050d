use std::collections::BTreeMap;

use xwalk_core::{normalize, TaxonomyTask};

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidateSet {
    pub key: String,
    pub tasks: Vec<TaxonomyTask>,
}

impl MatchCandidateSet {
    pub fn size(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_ambiguous(&self) -> bool {
        self.tasks.len() > 1
    }

    pub fn occupation_codes(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.occupation_code.as_str()).collect()
    }
}

/// Built once per run and read-only afterwards. Keys iterate in sorted order,
/// which is also the fuzzy matcher's tie-break order.
#[derive(Debug, Clone, Default)]
pub struct TaxonomyIndex {
    sets: BTreeMap<String, MatchCandidateSet>,
    task_count: usize,
    skipped_empty: usize,
}

impl TaxonomyIndex {
    pub fn build(tasks: &[TaxonomyTask]) -> Self {
        let mut sets: BTreeMap<String, MatchCandidateSet> = BTreeMap::new();
        let mut skipped_empty = 0usize;
        for task in tasks {
            let key = normalize(&task.task_text);
            if key.is_empty() {
                skipped_empty += 1;
                continue;
            }
            sets.entry(key.clone())
                .or_insert_with(|| MatchCandidateSet {
                    key,
                    tasks: Vec::new(),
                })
                .tasks
                .push(task.clone());
        }
        Self {
            sets,
            task_count: tasks.len() - skipped_empty,
            skipped_empty,
        }
    }

    pub fn get(&self, key: &str) -> Option<&MatchCandidateSet> {
        self.sets.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    pub fn sets(&self) -> impl Iterator<Item = &MatchCandidateSet> {
        self.sets.values()
    }

    pub fn duplicates(&self) -> impl Iterator<Item = &MatchCandidateSet> {
        self.sets.values().filter(|set| set.is_ambiguous())
    }

    pub fn unique_keys(&self) -> usize {
        self.sets.len()
    }

    pub fn duplicated_keys(&self) -> usize {
        self.duplicates().count()
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }

    pub fn skipped_empty(&self) -> usize {
        self.skipped_empty
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

pub fn exact_match<'a>(index: &'a TaxonomyIndex, normalized_key: &str) -> Option<&'a MatchCandidateSet> {
    index.get(normalized_key)
}
