use std::fs;
use std::sync::Arc;

use popsim::{
    composition_snapshot, filter_by_scenario, load_shared, projection_series, resolve_key,
    sensitivity_sweep, AdjustmentRange, DatasetLoader, EngineConfig, PopsimError, PopulationEngine, ScenarioKey,
};
use tempfile::tempdir;

const CSV: &str = "\
Combination,Year,Gender,AgeGroup,Count
asmr_0_asfr_0,2024,M,0-4,1000
asmr_0_asfr_0,2024,F,0-4,900
";

#[test]
fn csv_end_to_end() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("population_composition.csv");
    fs::write(&path, CSV).unwrap();

    let table = DatasetLoader::new(&path).load().unwrap();
    let filtered = filter_by_scenario(&table, &resolve_key(0, 0)).unwrap();

    let series = projection_series(&filtered, 10.0).unwrap();
    let points: Vec<(i64, f64)> = series.points().iter().map(|p| (p.year, p.population)).collect();
    assert_eq!(points, vec![(2024, 19000.0)]);

    let snap = composition_snapshot(&filtered, 2024, 10.0).unwrap();
    let male: Vec<(&str, f64)> = snap.male.iter().map(|b| (b.age_group.label(), b.count)).collect();
    let female: Vec<(&str, f64)> = snap.female.iter().map(|b| (b.age_group.label(), b.count)).collect();
    assert_eq!(male, vec![("0-4", 10000.0)]);
    assert_eq!(female, vec![("0-4", 9000.0)]);

    let matrix = sensitivity_sweep(
        &table,
        AdjustmentRange::mortality(),
        AdjustmentRange::fertility(),
        2024,
        10.0,
    )
    .unwrap();
    assert_eq!(matrix.cells.len(), 11);
    assert!(matrix.cells.iter().all(|row| row.len() == 10));
}

#[test]
fn loader_memoizes_table() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pop.csv");
    fs::write(&path, CSV).unwrap();

    let loader = DatasetLoader::new(&path);
    let first = loader.load().unwrap();
    // Later edits are invisible: the table lives for the loader's lifetime.
    fs::write(&path, "garbage").unwrap();
    let second = loader.load().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn engines_share_one_table_per_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shared.csv");
    fs::write(&path, CSV).unwrap();

    let first = PopulationEngine::open(EngineConfig::new(&path, 1.0)).unwrap();
    let second = PopulationEngine::open(EngineConfig::new(&path, 19.0)).unwrap();
    assert!(Arc::ptr_eq(first.table(), second.table()));

    fs::write(&path, "garbage").unwrap();
    let third = PopulationEngine::open(EngineConfig::new(&path, 2.0)).unwrap();
    assert!(Arc::ptr_eq(first.table(), third.table()));
    assert!(Arc::ptr_eq(&load_shared(&path).unwrap(), first.table()));
}

#[test]
fn failed_shared_load_is_retried() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("late.csv");
    assert!(matches!(load_shared(&path), Err(PopsimError::SourceLoad { .. })));

    fs::write(&path, CSV).unwrap();
    assert_eq!(load_shared(&path).unwrap().height(), 2);
}

#[test]
fn non_finite_counts_fail_the_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pop.csv");
    fs::write(
        &path,
        "Combination,Year,Gender,AgeGroup,Count\nasmr_0_asfr_0,2100,M,0-4,NaN\nasmr_0_asfr_0,2100,F,0-4,inf\n",
    )
    .unwrap();

    let err = DatasetLoader::new(&path).load().unwrap_err();
    assert!(matches!(err, PopsimError::SourceLoad { .. }), "{err}");
}

#[test]
fn header_whitespace_is_trimmed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pop.csv");
    fs::write(
        &path,
        "Combination , Year,Gender ,AgeGroup,Count\nvision,2030,F,5-9,12\n",
    )
    .unwrap();

    let table = DatasetLoader::new(&path).load().unwrap();
    assert_eq!(table.height(), 1);
    let series = projection_series(
        &filter_by_scenario(&table, &ScenarioKey::new("vision")).unwrap(),
        2.0,
    )
    .unwrap();
    assert_eq!(series.population_at(2030), Some(24.0));
}

#[test]
fn malformed_csv_is_fatal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pop.csv");
    fs::write(&path, "Combination,Year,Gender,Count\na,2024,M,1\n").unwrap();

    let err = DatasetLoader::new(&path).load().unwrap_err();
    match err {
        PopsimError::SourceLoad { path: p, reason } => {
            assert_eq!(p, path);
            assert!(reason.contains("AgeGroup"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn engine_from_yaml_config() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("data")).unwrap();
    fs::write(dir.path().join("data/pop.csv"), CSV).unwrap();
    let config_path = dir.path().join("config.yaml");
    fs::write(
        &config_path,
        "dataset_path: data/pop.csv\nscale_factor: 10\nsnapshot_years: [2024]\n",
    )
    .unwrap();

    let engine = PopulationEngine::open(EngineConfig::from_yaml_file(&config_path).unwrap()).unwrap();
    let key = engine.scenario_key(Some("None"), 0, 0);
    let view = engine.view(&key, true).unwrap();
    assert_eq!(view.series.population_at(2024), Some(19000.0));
    assert_eq!(view.baseline.unwrap().population_at(2024), Some(19000.0));
    assert_eq!(view.snapshots.len(), 1);
    assert!(engine.selectable_scenarios().is_empty());
}
