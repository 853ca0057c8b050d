use std::collections::HashMap;
use std::path::{Path, PathBuf};

use xwalk_models::{
    run_models, ModelsPaths, MODEL_SUMMARY_CSV, OCCUPATION_EXPOSURE_CSV, PARAMETERS_CSV,
    WAGE_QUINTILES_CSV,
};

const CROSSWALK: &str = "\
record_id,occupation_code,task_id,allocated_usage,occupation_title,job_zone,tot_emp,a_mean,a_median
0,15-1252.00,16363,1000,Software Developers,4,1654440,144570,132270
1,15-1253.00,16400,500,Software Quality Assurance Analysts and Testers,4,196830,105980,101800
2,11-1021.00,2001,250,General and Operations Managers,4,3507810,129330,102190
3,43-9061.00,3001,250,\"Office Clerks, General\",2,,,
";

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../fixtures/sample")
        .join(name)
}

fn read_rows(path: &Path) -> Vec<HashMap<String, String>> {
    let mut reader = csv::Reader::from_path(path).expect("open csv");
    reader
        .deserialize::<HashMap<String, String>>()
        .map(|row| row.expect("csv row"))
        .collect()
}

fn setup() -> (tempfile::TempDir, ModelsPaths) {
    let dir = tempfile::tempdir().expect("tempdir");
    let crosswalk_path = dir.path().join("crosswalk_with_wages.csv");
    std::fs::write(&crosswalk_path, CROSSWALK).expect("write crosswalk");
    let paths = ModelsPaths {
        crosswalk_path,
        task_ratings_path: Some(fixture("Task Ratings.txt")),
        config_path: None,
        output_dir: dir.path().join("out"),
    };
    (dir, paths)
}

#[tokio::test]
async fn default_run_writes_baseline_tables() {
    let (_dir, paths) = setup();
    let summary = run_models(&paths).await.expect("models run");
    assert_eq!(summary.occupations, 3, "clerks have no wages and are dropped");
    assert_eq!(summary.scenarios, vec!["baseline".to_string()]);
    assert_eq!(summary.outputs.len(), 4);

    let exposure = read_rows(&paths.output_dir.join(OCCUPATION_EXPOSURE_CSV));
    let share: HashMap<&str, f64> = exposure
        .iter()
        .map(|row| {
            (
                row["occupation_code"].as_str(),
                row["ai_exposure"].parse::<f64>().expect("number"),
            )
        })
        .collect();
    assert_eq!(share.len(), 3);
    assert!((share["15-1252.00"] - 0.5).abs() < 1e-12);
    assert!((share["15-1253.00"] - 0.25).abs() < 1e-12);
    assert!((share["11-1021.00"] - 0.125).abs() < 1e-12);

    let summary_rows = read_rows(&paths.output_dir.join(MODEL_SUMMARY_CSV));
    assert_eq!(summary_rows.len(), 20);
    assert!(summary_rows.iter().all(|row| row["scenario"] == "baseline"));
    let regime = summary_rows
        .iter()
        .find(|row| row["metric"] == "Demand regime")
        .expect("regime row");
    assert_eq!(regime["formatted"], "wage-led");

    assert_eq!(read_rows(&paths.output_dir.join(PARAMETERS_CSV)).len(), 10);
    let quintiles = read_rows(&paths.output_dir.join(WAGE_QUINTILES_CSV));
    let counted: usize = quintiles
        .iter()
        .map(|row| row["occupations"].parse::<usize>().expect("count"))
        .sum();
    assert_eq!(counted, 3);
}

#[tokio::test]
async fn yaml_config_selects_importance_weighting_and_scenarios() {
    let (dir, mut paths) = setup();
    let config_path = dir.path().join("models.yaml");
    std::fs::write(
        &config_path,
        "exposure:\n  weighting: importance_weighted\nscenarios:\n  - name: baseline\n  - name: high_substitution\n    params:\n      sigma: 3.0\n",
    )
    .expect("write config");
    paths.config_path = Some(config_path);

    let summary = run_models(&paths).await.expect("models run");
    assert_eq!(summary.scenarios.len(), 2);

    let exposure = read_rows(&paths.output_dir.join(OCCUPATION_EXPOSURE_CSV));
    let managers = exposure
        .iter()
        .find(|row| row["occupation_code"] == "11-1021.00")
        .expect("managers row");
    assert_eq!(managers["ai_exposure"].parse::<f64>().expect("number"), 1.0);
    let developers = exposure
        .iter()
        .find(|row| row["occupation_code"] == "15-1252.00")
        .expect("developers row");
    let expected = 4.62 / (4.62 + 4.10);
    assert!((developers["ai_exposure"].parse::<f64>().expect("number") - expected).abs() < 1e-9);

    let params = read_rows(&paths.output_dir.join(PARAMETERS_CSV));
    let sigma: Vec<(&str, &str)> = params
        .iter()
        .filter(|row| row["parameter"] == "sigma")
        .map(|row| (row["scenario"].as_str(), row["value"].as_str()))
        .collect();
    assert_eq!(sigma, vec![("baseline", "1.5"), ("high_substitution", "3.0")]);
}

#[tokio::test]
async fn invalid_config_and_missing_crosswalk_fail() {
    let (dir, mut paths) = setup();
    let config_path = dir.path().join("models.yaml");
    std::fs::write(&config_path, "scenarios:\n  - name: broken\n    params:\n      avg_c: 1.0\n")
        .expect("write config");
    paths.config_path = Some(config_path);
    let err = run_models(&paths).await.expect_err("invalid avg_c");
    assert!(format!("{err:#}").contains("avg_c"));

    paths.config_path = None;
    paths.crosswalk_path = dir.path().join("absent.csv");
    let err = run_models(&paths).await.expect_err("missing crosswalk");
    assert!(format!("{err:#}").contains("absent.csv"));
    assert!(!paths.output_dir.join(MODEL_SUMMARY_CSV).exists());
}
