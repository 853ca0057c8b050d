// Loads every sample table under the workspace fixtures directory.

use std::path::PathBuf;

use xwalk_core::{TaskType, UsageRecord};
use xwalk_sources::{
    load_education, load_job_zones, load_occupations, load_task_ratings, load_taxonomy_tasks, load_usage,
    load_wage_rows, SourceError,
};

fn sample(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures/sample")
        .join(name)
}

#[test]
fn taxonomy_release_tables_load() {
    let tasks = load_taxonomy_tasks(sample("Task Statements.txt")).expect("task statements");
    assert_eq!(tasks.len(), 10);
    assert_eq!(tasks[0].occupation_code, "15-1252.00");
    assert_eq!(tasks[0].task_id, "16363");
    assert_eq!(tasks[3].task_type, Some(TaskType::Supplemental));
    assert_eq!(tasks[2].task_text, "Write test plans for \"edge case\" coverage.");
    assert_eq!(tasks[9].task_type, None);

    let occupations = load_occupations(sample("Occupation Data.txt")).expect("occupations");
    assert_eq!(occupations.len(), 5);
    assert_eq!(occupations[4].title.as_deref(), Some("Office Clerks, General"));

    let zones = load_job_zones(sample("Job Zones.txt")).expect("job zones");
    assert_eq!(zones[4].job_zone.as_deref(), Some("2"));

    let education = load_education(sample("Education, Training, and Experience.txt")).expect("education");
    assert!(education
        .iter()
        .any(|row| row.element_name.as_deref() == Some("Related Work Experience")));

    let ratings = load_task_ratings(sample("Task Ratings.txt")).expect("task ratings");
    assert_eq!(ratings.iter().filter(|r| r.scale_id == "IM").count(), 9);
}

#[test]
fn flat_and_faceted_usage_exports_agree() {
    let flat = load_usage(sample("usage.csv"), "auto").expect("flat usage");
    let faceted = load_usage(sample("usage_faceted.csv"), "auto").expect("faceted usage");
    assert_eq!(flat.len(), 8);
    assert_eq!(flat, faceted);
    assert_eq!(flat[0], UsageRecord::new("Write code to implement software features.", 1200.0));

    let explicit = load_usage(sample("usage_faceted.csv"), "faceted").expect("explicit faceted");
    assert_eq!(explicit, faceted);
}

#[test]
fn wage_table_keeps_raw_tokens() {
    let rows = load_wage_rows(sample("national_wages.csv")).expect("wages");
    assert_eq!(rows.len(), 7);
    assert_eq!(rows[1].occ_code, "11-1021");
    assert_eq!(rows[1].tot_emp.as_deref(), Some("3,507,810"));
    assert_eq!(rows[1].h_pct90.as_deref(), Some("#"));
    assert_eq!(rows[5].area.as_deref(), Some("6"));
}

#[test]
fn missing_files_and_formats_are_errors() {
    let err = load_taxonomy_tasks(sample("does-not-exist.txt")).expect_err("missing file");
    assert!(matches!(err, SourceError::Io { .. }));

    let err = load_usage(sample("usage.csv"), "xlsx").expect_err("unknown format");
    assert!(matches!(err, SourceError::UnknownFormat(_)));
}
