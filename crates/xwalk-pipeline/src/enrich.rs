use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use xwalk_core::{coerce_numeric, EnrichedRow, MatchedTaskRow, OccupationProfile};
use xwalk_sources::{EducationRow, JobZoneRow, OccupationRow, TaskRatingRow};

pub const EDUCATION_ELEMENT: &str = "Required Level of Education";
pub const IMPORTANCE_SCALE: &str = "IM";

#[derive(Debug, Clone, Default)]
pub struct OccupationCatalog {
    profiles: HashMap<String, OccupationProfile>,
    importance: HashMap<(String, String), f64>,
}

impl OccupationCatalog {
    pub fn from_tables(
        occupations: &[OccupationRow],
        job_zones: &[JobZoneRow],
        education: &[EducationRow],
        task_ratings: &[TaskRatingRow],
    ) -> Self {
        let mut profiles: HashMap<String, OccupationProfile> = HashMap::new();

        for row in occupations {
            let code = row.occupation_code.trim();
            if profiles.contains_key(code) {
                continue;
            }
            profiles.insert(
                code.to_string(),
                OccupationProfile {
                    title: row.title.clone(),
                    description: row.description.clone(),
                    ..OccupationProfile::default()
                },
            );
        }

        let mut seen_zone: HashSet<&str> = HashSet::new();
        for row in job_zones {
            let code = row.occupation_code.trim();
            if !seen_zone.insert(code) {
                continue;
            }
            let zone = row.job_zone.as_deref().and_then(coerce_numeric);
            profiles.entry(code.to_string()).or_default().job_zone = zone;
        }

        for (code, (category, pct)) in typical_education(education) {
            let profile = profiles.entry(code).or_default();
            profile.typical_education = Some(category);
            profile.typical_education_pct = Some(pct);
        }

        let mut importance = HashMap::new();
        for row in task_ratings {
            if row.scale_id.trim() != IMPORTANCE_SCALE {
                continue;
            }
            let Some(value) = row.data_value.as_deref().and_then(coerce_numeric) else {
                continue;
            };
            importance
                .entry((row.occupation_code.trim().to_string(), row.task_id.trim().to_string()))
                .or_insert(value);
        }

        Self {
            profiles,
            importance,
        }
    }

    pub fn profile(&self, occupation_code: &str) -> Option<&OccupationProfile> {
        self.profiles.get(occupation_code)
    }

    pub fn title(&self, occupation_code: &str) -> Option<&str> {
        self.profile(occupation_code)?.title.as_deref()
    }

    pub fn task_importance(&self, occupation_code: &str, task_id: &str) -> Option<f64> {
        self.importance
            .get(&(occupation_code.to_string(), task_id.to_string()))
            .copied()
    }

    pub fn occupation_count(&self) -> usize {
        self.profiles.len()
    }

    pub fn enrich(&self, row: MatchedTaskRow) -> EnrichedRow {
        let occupation = self
            .profile(&row.task.occupation_code)
            .cloned()
            .unwrap_or_default();
        let task_importance = self.task_importance(&row.task.occupation_code, &row.task.task_id);
        EnrichedRow {
            row,
            occupation,
            task_importance,
        }
    }

    pub fn enrich_all(&self, rows: Vec<MatchedTaskRow>) -> Vec<EnrichedRow> {
        rows.into_iter().map(|row| self.enrich(row)).collect()
    }
}

// Education categories are numbered levels in the taxonomy release; order
// numbers numerically, and any non-numeric label after them lexicographically.
fn category_order(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn typical_education(rows: &[EducationRow]) -> HashMap<String, (String, f64)> {
    let mut pivot: HashMap<String, Vec<(String, Option<f64>)>> = HashMap::new();
    for row in rows {
        let element_matches = row
            .element_name
            .as_deref()
            .map_or(true, |name| name.trim() == EDUCATION_ELEMENT);
        if !element_matches {
            continue;
        }
        let category = row.category.trim().to_string();
        let cells = pivot.entry(row.occupation_code.trim().to_string()).or_default();
        if cells.iter().any(|(existing, _)| *existing == category) {
            continue;
        }
        cells.push((category, row.proportion.as_deref().and_then(coerce_numeric)));
    }

    pivot
        .into_iter()
        .filter_map(|(code, mut cells)| {
            cells.sort_by(|(a, _), (b, _)| category_order(a, b));
            let mut best: Option<(String, f64)> = None;
            for (category, value) in cells {
                let Some(value) = value else { continue };
                if best.as_ref().map_or(true, |(_, top)| value > *top) {
                    best = Some((category, value));
                }
            }
            best.map(|best| (code, best))
        })
        .collect()
}
