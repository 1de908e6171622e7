use std::collections::BTreeMap;

use polars::prelude::*;
use serde::Serialize;

use crate::aggregation::{
    composition_snapshot, filter_by_scenario, projection_series, CompositionSnapshot,
    ProjectionSeries,
};
use crate::dataset::PopulationTable;
use crate::error::PopsimError;
use crate::scenario::ScenarioKey;
use crate::schema::comparison;

/// Everything the single-scenario page shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioView {
    pub key: ScenarioKey,
    pub series: ProjectionSeries,
    /// The `(0, 0)` series drawn as a reference line, when requested.
    pub baseline: Option<ProjectionSeries>,
    /// One snapshot per requested year, in request order.
    pub snapshots: Vec<CompositionSnapshot>,
}

pub fn scenario_view(
    table: &PopulationTable,
    key: &ScenarioKey,
    scale_factor: f64,
    snapshot_years: &[i64],
    include_baseline: bool,
) -> Result<ScenarioView, PopsimError> {
    let filtered = filter_by_scenario(table, key)?;
    let series = projection_series(&filtered, scale_factor)?;

    let baseline = if include_baseline {
        let base = filter_by_scenario(table, &ScenarioKey::baseline())?;
        Some(projection_series(&base, scale_factor)?)
    } else {
        None
    };

    let snapshots = snapshot_years
        .iter()
        .map(|&year| composition_snapshot(&filtered, year, scale_factor))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ScenarioView {
        key: key.clone(),
        series,
        baseline,
        snapshots,
    })
}

/// Two scenarios side by side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioComparison {
    pub first_key: ScenarioKey,
    pub second_key: ScenarioKey,
    pub first: ProjectionSeries,
    pub second: ProjectionSeries,
    pub year: i64,
    pub first_snapshot: CompositionSnapshot,
    pub second_snapshot: CompositionSnapshot,
}

impl ScenarioComparison {
    /// Year-aligned series. Columns: Year, first, second; a year missing
    /// from one scenario is null on that side.
    pub fn to_frame(&self) -> Result<DataFrame, PopsimError> {
        let mut aligned: BTreeMap<i64, (Option<f64>, Option<f64>)> = BTreeMap::new();
        for p in self.first.points() {
            aligned.entry(p.year).or_default().0 = Some(p.population);
        }
        for p in self.second.points() {
            aligned.entry(p.year).or_default().1 = Some(p.population);
        }

        let years: Vec<i64> = aligned.keys().copied().collect();
        let first: Vec<Option<f64>> = aligned.values().map(|v| v.0).collect();
        let second: Vec<Option<f64>> = aligned.values().map(|v| v.1).collect();

        let df = DataFrame::new(vec![
            Column::new(comparison::YEAR.into(), &years),
            Column::new(comparison::FIRST.into(), &first),
            Column::new(comparison::SECOND.into(), &second),
        ])?;
        Ok(df)
    }
}

pub fn compare_scenarios(
    table: &PopulationTable,
    first_key: &ScenarioKey,
    second_key: &ScenarioKey,
    scale_factor: f64,
    year: i64,
) -> Result<ScenarioComparison, PopsimError> {
    let first_rows = filter_by_scenario(table, first_key)?;
    let second_rows = filter_by_scenario(table, second_key)?;

    Ok(ScenarioComparison {
        first_key: first_key.clone(),
        second_key: second_key.clone(),
        first: projection_series(&first_rows, scale_factor)?,
        second: projection_series(&second_rows, scale_factor)?,
        year,
        first_snapshot: composition_snapshot(&first_rows, year, scale_factor)?,
        second_snapshot: composition_snapshot(&second_rows, year, scale_factor)?,
    })
}
