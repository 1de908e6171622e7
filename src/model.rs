use std::sync::Arc;

use pyo3::prelude::*;
use pyo3_polars::PyDataFrame;

use crate::aggregation::{
    composition_snapshot, filter_by_scenario, policy_cells_to_frame, projection_series, GridCell,
};
use crate::config::{EngineConfig, YearRange};
use crate::dataset::PopulationTable;
use crate::engine::PopulationEngine;
use crate::projection;
use crate::scenario::{self, ScenarioKey};

#[pyclass]
pub struct PopulationModel {
    engine: PopulationEngine,
}

#[pymethods]
impl PopulationModel {
    /// Load the dataset at `dataset_path` with default ranges and years.
    #[new]
    fn new(dataset_path: String, scale_factor: f64) -> PyResult<Self> {
        let engine = PopulationEngine::open(EngineConfig::new(dataset_path, scale_factor))?;
        Ok(Self { engine })
    }

    /// Build from a YAML config file (see `EngineConfig`).
    #[staticmethod]
    fn from_config(path: &str) -> PyResult<Self> {
        let config = EngineConfig::from_yaml_file(path)?;
        Ok(Self {
            engine: PopulationEngine::open(config)?,
        })
    }

    /// Build from an in-memory frame with the dataset's five columns.
    #[staticmethod]
    fn from_frame(df: PyDataFrame, scale_factor: f64) -> PyResult<Self> {
        let table = Arc::new(PopulationTable::from_frame(df.0)?);
        let config = EngineConfig::new("<frame>", scale_factor);
        Ok(Self {
            engine: PopulationEngine::new(config, table)?,
        })
    }

    // ── Scenario keys ───────────────────────────────────────────────────────

    #[staticmethod]
    fn resolve_key(mortality: i32, fertility: i32) -> String {
        scenario::resolve_key(mortality, fertility).to_string()
    }

    /// `explicit` wins unless it is None or "None"; otherwise `slider_key`.
    #[staticmethod]
    #[pyo3(signature = (explicit, slider_key))]
    fn choose_key(explicit: Option<&str>, slider_key: &str) -> String {
        scenario::choose_key(explicit, ScenarioKey::new(slider_key)).to_string()
    }

    fn selectable_scenarios(&self) -> Vec<String> {
        self.engine.selectable_scenarios().into_iter().collect()
    }

    // ── Views ───────────────────────────────────────────────────────────────

    /// Columns: Year, Population. Empty for an unknown key.
    fn projection_series(&self, key: &str) -> PyResult<PyDataFrame> {
        let table = self.engine.table();
        let filtered = filter_by_scenario(table, &ScenarioKey::new(key))?;
        let series = projection_series(&filtered, self.engine.config().scale_factor)?;
        Ok(PyDataFrame(series.to_frame()?))
    }

    /// Columns: Gender, AgeGroup, Count, label_position.
    fn composition_snapshot(&self, key: &str, year: i64) -> PyResult<PyDataFrame> {
        let table = self.engine.table();
        let filtered = filter_by_scenario(table, &ScenarioKey::new(key))?;
        let snap = composition_snapshot(&filtered, year, self.engine.config().scale_factor)?;
        Ok(PyDataFrame(snap.to_frame()?))
    }

    /// Columns: Year, first, second.
    fn compare_scenarios(&self, first: &str, second: &str) -> PyResult<PyDataFrame> {
        let cmp = self
            .engine
            .compare(&ScenarioKey::new(first), &ScenarioKey::new(second))?;
        Ok(PyDataFrame(cmp.to_frame()?))
    }

    /// Long format. Columns: mortality, fertility, population.
    fn sensitivity_sweep(&self) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(self.engine.sensitivity()?.to_frame()?))
    }

    /// `((mortality, fertility, population) of the minimum, ... of the maximum)`.
    fn sensitivity_extremes(&self) -> PyResult<Option<((i32, i32, f64), (i32, i32, f64))>> {
        let matrix = self.engine.sensitivity()?;
        let as_tuple = |c: GridCell| (c.mortality, c.fertility, c.population);
        Ok(matrix
            .min_cell()
            .zip(matrix.max_cell())
            .map(|(lo, hi)| (as_tuple(lo), as_tuple(hi))))
    }

    /// Columns: mortality, fertility, policy_strength, impact, volatility, error.
    fn volatility_and_impact(&self) -> PyResult<PyDataFrame> {
        let cells = self.engine.policy_analysis()?;
        Ok(PyDataFrame(policy_cells_to_frame(&cells)?))
    }

    // ── Properties ──────────────────────────────────────────────────────────

    #[getter]
    fn scale_factor(&self) -> f64 {
        self.engine.config().scale_factor
    }

    #[getter]
    fn table_df(&self) -> PyDataFrame {
        PyDataFrame(self.engine.table().frame().clone())
    }
}

/// Validate a model reply. Columns: Year, Population.
#[pyfunction]
#[pyo3(signature = (text, start=2024, end=2100))]
pub fn parse_generated_series(text: &str, start: i64, end: i64) -> PyResult<PyDataFrame> {
    let generated = projection::parse_generated_series(text, YearRange::new(start, end))?;
    Ok(PyDataFrame(generated.series().to_frame()?))
}

/// User message for a scenario description.
#[pyfunction]
#[pyo3(signature = (scenario, start=2024, end=2100))]
pub fn projection_prompt(scenario: &str, start: i64, end: i64) -> String {
    projection::projection_prompt(scenario, YearRange::new(start, end))
}
