pub mod aggregation;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod labels;
pub mod projection;
pub mod scenario;
pub mod schema;
pub mod views;

#[cfg(feature = "python")]
mod model;

pub use aggregation::{
    composition_snapshot, filter_by_scenario, projection_series, sensitivity_sweep,
    volatility_and_impact, CompositionSnapshot, FilteredSeries, PolicyCell, ProjectionSeries,
    SensitivityMatrix, YearPopulation,
};
pub use config::{EngineConfig, YearRange};
pub use dataset::{load_shared, DatasetLoader, PopulationTable};
pub use engine::PopulationEngine;
pub use error::{ComputationError, PopsimError, ProjectionError};
pub use projection::{GeneratedSeries, ProjectionAdapter, SeriesSource};
pub use scenario::{choose_key, list_selectable_scenarios, resolve_key, AdjustmentRange, ScenarioKey};

#[cfg(feature = "python")]
mod python {
    use pyo3::prelude::*;
    use pyo3::types::PyModule;

    use crate::model::{self, PopulationModel};
    use crate::schema;

    /// Export schema constants as Python submodules
    fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
        // Population
        let population = PyModule::new(m.py(), "population")?;
        population.add("COMBINATION", schema::population::COMBINATION)?;
        population.add("YEAR", schema::population::YEAR)?;
        population.add("GENDER", schema::population::GENDER)?;
        population.add("AGE_GROUP", schema::population::AGE_GROUP)?;
        population.add("COUNT", schema::population::COUNT)?;
        m.add_submodule(&population)?;

        // Gender
        let gender = PyModule::new(m.py(), "gender")?;
        gender.add("MALE", schema::gender::MALE)?;
        gender.add("FEMALE", schema::gender::FEMALE)?;
        m.add_submodule(&gender)?;

        // Scenario
        let scenario = PyModule::new(m.py(), "scenario")?;
        scenario.add("SLIDER_PREFIX", schema::scenario::SLIDER_PREFIX)?;
        scenario.add("NO_SELECTION", schema::scenario::NO_SELECTION)?;
        m.add_submodule(&scenario)?;

        // Composition
        let composition = PyModule::new(m.py(), "composition")?;
        composition.add("GENDER", schema::composition::GENDER)?;
        composition.add("AGE_GROUP", schema::composition::AGE_GROUP)?;
        composition.add("COUNT", schema::composition::COUNT)?;
        composition.add("LABEL_POSITION", schema::composition::LABEL_POSITION)?;
        m.add_submodule(&composition)?;

        // Sensitivity
        let sensitivity = PyModule::new(m.py(), "sensitivity")?;
        sensitivity.add("MORTALITY", schema::sensitivity::MORTALITY)?;
        sensitivity.add("FERTILITY", schema::sensitivity::FERTILITY)?;
        sensitivity.add("POPULATION", schema::sensitivity::POPULATION)?;
        sensitivity.add("IMPACT", schema::sensitivity::IMPACT)?;
        sensitivity.add("VOLATILITY", schema::sensitivity::VOLATILITY)?;
        sensitivity.add("POLICY_STRENGTH", schema::sensitivity::POLICY_STRENGTH)?;
        sensitivity.add("ERROR", schema::sensitivity::ERROR)?;
        m.add_submodule(&sensitivity)?;

        Ok(())
    }

    #[pymodule]
    fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_class::<PopulationModel>()?;
        m.add_function(wrap_pyfunction!(model::parse_generated_series, m)?)?;
        m.add_function(wrap_pyfunction!(model::projection_prompt, m)?)?;
        add_schema_exports(m)?;
        Ok(())
    }
}
