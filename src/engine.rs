use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use crate::aggregation::{
    impact_totals, sweep_totals, PolicyCell, SensitivityMatrix, YearlyTotals,
};
use crate::config::EngineConfig;
use crate::dataset::{self, PopulationTable};
use crate::error::PopsimError;
use crate::scenario::{self, ScenarioKey};
use crate::views::{self, ScenarioComparison, ScenarioView};

/// Configured entry point: one shared table plus the settings every view
/// needs. Holds no per-request state.
#[derive(Debug)]
pub struct PopulationEngine {
    config: EngineConfig,
    table: Arc<PopulationTable>,
    totals: OnceLock<YearlyTotals>,
}

impl PopulationEngine {
    pub fn new(config: EngineConfig, table: Arc<PopulationTable>) -> Result<Self, PopsimError> {
        config.validate()?;
        Ok(Self {
            config,
            table,
            totals: OnceLock::new(),
        })
    }

    /// Validate `config` and load its dataset. Engines opened on the same
    /// path share one table for the life of the process.
    pub fn open(config: EngineConfig) -> Result<Self, PopsimError> {
        config.validate()?;
        let table = dataset::load_shared(&config.dataset_path)?;
        Self::new(config, table)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn table(&self) -> &Arc<PopulationTable> {
        &self.table
    }

    fn totals(&self) -> Result<&YearlyTotals, PopsimError> {
        if let Some(totals) = self.totals.get() {
            return Ok(totals);
        }
        let totals = YearlyTotals::from_table(&self.table)?;
        Ok(self.totals.get_or_init(|| totals))
    }

    /// Dropdown selection if set, slider position otherwise.
    pub fn scenario_key(&self, explicit: Option<&str>, mortality: i32, fertility: i32) -> ScenarioKey {
        scenario::choose_key(explicit, scenario::resolve_key(mortality, fertility))
    }

    pub fn selectable_scenarios(&self) -> BTreeSet<String> {
        scenario::list_selectable_scenarios(&self.table)
    }

    pub fn view(&self, key: &ScenarioKey, include_baseline: bool) -> Result<ScenarioView, PopsimError> {
        views::scenario_view(
            &self.table,
            key,
            self.config.scale_factor,
            &self.config.snapshot_years,
            include_baseline,
        )
    }

    pub fn compare(
        &self,
        first: &ScenarioKey,
        second: &ScenarioKey,
    ) -> Result<ScenarioComparison, PopsimError> {
        views::compare_scenarios(
            &self.table,
            first,
            second,
            self.config.scale_factor,
            self.config.comparison_year,
        )
    }

    pub fn sensitivity(&self) -> Result<SensitivityMatrix, PopsimError> {
        Ok(sweep_totals(
            self.totals()?,
            self.config.mortality,
            self.config.fertility,
            self.config.sensitivity_year,
            self.config.scale_factor,
        ))
    }

    pub fn policy_analysis(&self) -> Result<Vec<PolicyCell>, PopsimError> {
        Ok(impact_totals(
            self.totals()?,
            self.config.mortality,
            self.config.fertility,
            self.config.horizon,
            self.config.scale_factor,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn engine(scale: f64) -> PopulationEngine {
        let df = df!(
            "Combination" => ["asmr_0_asfr_0", "asmr_0_asfr_0", "asmr_-1_asfr_1", "named"],
            "Year" => [2024i64, 2100, 2100, 2100],
            "Gender" => ["M", "M", "F", "F"],
            "AgeGroup" => ["0-4", "0-4", "0-4", "0-4"],
            "Count" => [100.0, 120.0, 60.0, 1.0],
        )
        .unwrap();
        let table = Arc::new(PopulationTable::from_frame(df).unwrap());
        PopulationEngine::new(EngineConfig::new("unused.csv", scale), table).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let df = df!(
            "Combination" => ["a"],
            "Year" => [2024i64],
            "Gender" => ["M"],
            "AgeGroup" => ["0-4"],
            "Count" => [1.0],
        )
        .unwrap();
        let table = Arc::new(PopulationTable::from_frame(df).unwrap());
        let err = PopulationEngine::new(EngineConfig::new("x.csv", f64::INFINITY), table).unwrap_err();
        assert!(matches!(err, PopsimError::Config(_)));
    }

    #[test]
    fn key_precedence() {
        let e = engine(1.0);
        assert_eq!(e.scenario_key(None, 1, -1).as_str(), "asmr_-1_asfr_1");
        assert_eq!(e.scenario_key(Some("None"), 0, 0).as_str(), "asmr_0_asfr_0");
        assert_eq!(e.scenario_key(Some("named"), 1, -1).as_str(), "named");
        assert_eq!(e.selectable_scenarios().into_iter().collect::<Vec<_>>(), vec!["named"]);
    }

    #[test]
    fn sweep_and_policy_use_config() {
        let e = engine(190.0);
        let matrix = e.sensitivity().unwrap();
        assert_eq!(matrix.dims(), (11, 10));
        assert_eq!(matrix.get(0, 0), Some(120.0 * 190.0));
        assert_eq!(matrix.get(1, -1), Some(60.0 * 190.0));

        let cells = e.policy_analysis().unwrap();
        assert_eq!(cells.len(), 110);
        // Years 2025..2099 are missing from the dataset, so every cell
        // divides by a zero population somewhere.
        assert!(cells.iter().all(|c| c.metrics.is_err()));
    }

    #[test]
    fn view_uses_snapshot_years() {
        let e = engine(2.0);
        let view = e.view(&ScenarioKey::baseline(), true).unwrap();
        assert_eq!(view.snapshots.iter().map(|s| s.year).collect::<Vec<_>>(), vec![2024, 2100]);
        assert_eq!(view.snapshots[1].male[0].count, 240.0);

        let cmp = e.compare(&ScenarioKey::baseline(), &ScenarioKey::new("named")).unwrap();
        assert_eq!(cmp.year, 2100);
        assert_eq!(cmp.second_snapshot.female[0].count, 2.0);
    }
}
