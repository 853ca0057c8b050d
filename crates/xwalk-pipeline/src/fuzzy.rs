use rapidfuzz::distance::indel;
use rayon::prelude::*;

use crate::index::TaxonomyIndex;

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 85.0;

pub const PARALLEL_BATCH_CUTOFF: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyHit {
    pub key: String,
    pub score: f64,
}

fn ratio_from_distance(total_len: usize, distance: usize) -> f64 {
    if total_len == 0 {
        return 100.0;
    }
    100.0 * (total_len - distance) as f64 / total_len as f64
}

// Best score any string of length `b_len` could reach against one of `a_len`.
fn length_upper_bound(a_len: usize, b_len: usize) -> f64 {
    ratio_from_distance(a_len + b_len, a_len.abs_diff(b_len))
}

fn scored(a: &str, a_len: usize, b: &str, b_len: usize) -> f64 {
    ratio_from_distance(a_len + b_len, indel::distance(a.chars(), b.chars()))
}

pub fn indel_ratio(a: &str, b: &str) -> f64 {
    scored(a, a.chars().count(), b, b.chars().count())
}

// Scores every candidate; equal scores go to the smallest key.
pub fn fuzzy_match<'a, I>(normalized_key: &str, candidate_keys: I, threshold: f64) -> Option<(String, f64)>
where
    I: IntoIterator<Item = &'a str>,
{
    let query_len = normalized_key.chars().count();
    let mut best: Option<(&str, f64)> = None;
    for candidate in candidate_keys {
        let score = scored(normalized_key, query_len, candidate, candidate.chars().count());
        let replace = match best {
            None => true,
            Some((best_key, best_score)) => {
                score > best_score || (score == best_score && candidate < best_key)
            }
        };
        if replace {
            best = Some((candidate, score));
        }
    }
    best.filter(|(_, score)| *score >= threshold)
        .map(|(key, score)| (key.to_string(), score))
}

#[derive(Debug, Clone)]
struct VocabEntry {
    key: String,
    len: usize,
}

#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    vocabulary: Vec<VocabEntry>,
}

impl FuzzyMatcher {
    pub fn new(index: &TaxonomyIndex) -> Self {
        Self::from_keys(index.keys())
    }

    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();
        let vocabulary = keys
            .into_iter()
            .map(|key| VocabEntry {
                len: key.chars().count(),
                key,
            })
            .collect();
        Self { vocabulary }
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn best_match(&self, normalized_key: &str, threshold: f64) -> Option<FuzzyHit> {
        let query_len = normalized_key.chars().count();
        let mut best: Option<(&VocabEntry, f64)> = None;
        // Ascending key order: a later key can only win with a strictly higher score.
        for entry in &self.vocabulary {
            let bound = length_upper_bound(query_len, entry.len);
            if bound < threshold {
                continue;
            }
            if let Some((_, best_score)) = best {
                if bound <= best_score {
                    continue;
                }
            }
            let score = scored(normalized_key, query_len, &entry.key, entry.len);
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((entry, score));
            }
        }
        best.filter(|(_, score)| *score >= threshold)
            .map(|(entry, score)| FuzzyHit {
                key: entry.key.clone(),
                score,
            })
    }

    pub fn match_batch(&self, keys: &[String], threshold: f64, parallel: bool) -> Vec<Option<FuzzyHit>> {
        if parallel && keys.len() > PARALLEL_BATCH_CUTOFF {
            keys.par_iter()
                .map(|key| self.best_match(key, threshold))
                .collect()
        } else {
            keys.iter()
                .map(|key| self.best_match(key, threshold))
                .collect()
        }
    }
}
