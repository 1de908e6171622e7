use std::collections::{BTreeMap, HashMap};

use polars::prelude::*;
use serde::Serialize;

use crate::config::YearRange;
use crate::dataset::{AgeGroup, Gender, PopulationTable};
use crate::error::{ComputationError, PopsimError};
use crate::labels::{self, LabelPlacement};
use crate::scenario::{resolve_key, AdjustmentRange, ScenarioKey};
use crate::schema::{composition, gender, population, projection, sensitivity};

// ── Filtering ───────────────────────────────────────────────────────────────

/// Rows of the dataset belonging to one scenario.
#[derive(Debug, Clone)]
pub struct FilteredSeries {
    key: ScenarioKey,
    frame: DataFrame,
}

impl FilteredSeries {
    pub fn key(&self) -> &ScenarioKey {
        &self.key
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// True when the key matched nothing.
    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }
}

/// Rows whose `Combination` equals `key`. An unknown key gives an empty
/// result, not an error.
pub fn filter_by_scenario(
    table: &PopulationTable,
    key: &ScenarioKey,
) -> Result<FilteredSeries, PopsimError> {
    let frame = table
        .frame()
        .clone()
        .lazy()
        .filter(col(population::COMBINATION).eq(lit(key.as_str())))
        .collect()?;
    if frame.height() == 0 {
        tracing::debug!(key = %key, "scenario key matched no rows");
    }
    Ok(FilteredSeries {
        key: key.clone(),
        frame,
    })
}

// ── Projection series ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearPopulation {
    pub year: i64,
    pub population: f64,
}

/// Scaled population per year, ascending by year with no duplicate years.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProjectionSeries {
    points: Vec<YearPopulation>,
}

impl ProjectionSeries {
    /// Sorts by year. Callers guarantee years are unique.
    pub(crate) fn from_points(mut points: Vec<YearPopulation>) -> Self {
        points.sort_by_key(|p| p.year);
        Self { points }
    }

    pub fn points(&self) -> &[YearPopulation] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn population_at(&self, year: i64) -> Option<f64> {
        self.points
            .binary_search_by_key(&year, |p| p.year)
            .ok()
            .map(|i| self.points[i].population)
    }

    pub fn last(&self) -> Option<&YearPopulation> {
        self.points.last()
    }

    /// Columns: Year (i64), Population (f64).
    pub fn to_frame(&self) -> Result<DataFrame, PopsimError> {
        let years: Vec<i64> = self.points.iter().map(|p| p.year).collect();
        let pops: Vec<f64> = self.points.iter().map(|p| p.population).collect();
        let df = DataFrame::new(vec![
            Column::new(projection::YEAR.into(), &years),
            Column::new(projection::POPULATION.into(), &pops),
        ])?;
        Ok(df)
    }
}

/// Sum of `Count` per year across all ages and genders, times `scale_factor`.
pub fn projection_series(
    filtered: &FilteredSeries,
    scale_factor: f64,
) -> Result<ProjectionSeries, PopsimError> {
    if filtered.is_empty() {
        return Ok(ProjectionSeries::default());
    }

    let grouped = filtered
        .frame
        .clone()
        .lazy()
        .group_by([col(population::YEAR)])
        .agg([col(population::COUNT).sum()])
        .sort_by_exprs([col(population::YEAR)], SortMultipleOptions::default())
        .collect()?;

    let years = grouped.column(population::YEAR)?.i64()?;
    let counts = grouped.column(population::COUNT)?.f64()?;

    let points = years
        .into_iter()
        .zip(counts.into_iter())
        .filter_map(|(year, count)| {
            Some(YearPopulation {
                year: year?,
                population: count.unwrap_or(0.0) * scale_factor,
            })
        })
        .collect();

    Ok(ProjectionSeries::from_points(points))
}

// ── Composition snapshot ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionBar {
    pub age_group: AgeGroup,
    pub count: f64,
}

/// Age pyramid for one scenario and year. Each side is sorted by age group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionSnapshot {
    pub year: i64,
    pub male: Vec<CompositionBar>,
    pub female: Vec<CompositionBar>,
}

impl CompositionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.male.is_empty() && self.female.is_empty()
    }

    /// Largest scaled count across both sexes; 0 when empty.
    pub fn axis_max(&self) -> f64 {
        self.male
            .iter()
            .chain(&self.female)
            .map(|b| b.count)
            .fold(0.0, f64::max)
    }

    pub fn side(&self, side: Gender) -> &[CompositionBar] {
        match side {
            Gender::Male => &self.male,
            Gender::Female => &self.female,
        }
    }

    /// Label placement for every bar on one side, in bar order.
    pub fn placements(&self, side: Gender) -> Vec<LabelPlacement> {
        let axis_max = self.axis_max();
        self.side(side)
            .iter()
            .map(|b| labels::label_placement(b.count, axis_max, side))
            .collect()
    }

    /// Columns: Gender, AgeGroup, Count, label_position. Male rows first.
    pub fn to_frame(&self) -> Result<DataFrame, PopsimError> {
        let axis_max = self.axis_max();
        let mut genders = Vec::new();
        let mut ages = Vec::new();
        let mut counts = Vec::new();
        let mut positions = Vec::new();
        for side in [Gender::Male, Gender::Female] {
            for bar in self.side(side) {
                genders.push(side.as_str());
                ages.push(bar.age_group.label().to_string());
                counts.push(bar.count);
                positions.push(labels::label_position(bar.count, axis_max).as_str());
            }
        }
        let df = DataFrame::new(vec![
            Column::new(composition::GENDER.into(), &genders),
            Column::new(composition::AGE_GROUP.into(), &ages),
            Column::new(composition::COUNT.into(), &counts),
            Column::new(composition::LABEL_POSITION.into(), &positions),
        ])?;
        Ok(df)
    }
}

pub fn composition_snapshot(
    filtered: &FilteredSeries,
    year: i64,
    scale_factor: f64,
) -> Result<CompositionSnapshot, PopsimError> {
    let grouped = filtered
        .frame
        .clone()
        .lazy()
        .filter(col(population::YEAR).eq(lit(year)))
        .group_by([col(population::GENDER), col(population::AGE_GROUP)])
        .agg([col(population::COUNT).sum()])
        .collect()?;

    let genders = grouped.column(population::GENDER)?.str()?;
    let ages = grouped.column(population::AGE_GROUP)?.str()?;
    let counts = grouped.column(population::COUNT)?.f64()?;

    let mut male = Vec::new();
    let mut female = Vec::new();
    for i in 0..grouped.height() {
        let (Some(g), Some(age)) = (genders.get(i), ages.get(i)) else {
            continue;
        };
        let bar = CompositionBar {
            age_group: AgeGroup::new(age),
            count: counts.get(i).unwrap_or(0.0) * scale_factor,
        };
        match g {
            gender::MALE => male.push(bar),
            gender::FEMALE => female.push(bar),
            _ => {}
        }
    }
    male.sort_by(|a, b| a.age_group.cmp(&b.age_group));
    female.sort_by(|a, b| a.age_group.cmp(&b.age_group));

    Ok(CompositionSnapshot { year, male, female })
}

// ── Grid analysis ───────────────────────────────────────────────────────────

/// Raw `Count` totals per (Combination, Year), computed in one pass so grid
/// analyses do not filter the table once per cell.
#[derive(Debug, Clone, Default)]
pub struct YearlyTotals {
    totals: HashMap<String, BTreeMap<i64, f64>>,
}

impl YearlyTotals {
    pub fn from_table(table: &PopulationTable) -> Result<Self, PopsimError> {
        let grouped = table
            .frame()
            .clone()
            .lazy()
            .group_by([col(population::COMBINATION), col(population::YEAR)])
            .agg([col(population::COUNT).sum()])
            .collect()?;

        let keys = grouped.column(population::COMBINATION)?.str()?;
        let years = grouped.column(population::YEAR)?.i64()?;
        let counts = grouped.column(population::COUNT)?.f64()?;

        let mut totals: HashMap<String, BTreeMap<i64, f64>> = HashMap::new();
        for i in 0..grouped.height() {
            let (Some(key), Some(year)) = (keys.get(i), years.get(i)) else {
                continue;
            };
            totals
                .entry(key.to_string())
                .or_default()
                .insert(year, counts.get(i).unwrap_or(0.0));
        }
        Ok(Self { totals })
    }

    /// Unscaled total, or `None` when the scenario has no rows that year.
    pub fn raw(&self, key: &ScenarioKey, year: i64) -> Option<f64> {
        self.totals.get(key.as_str())?.get(&year).copied()
    }

    /// Scaled total; a missing scenario or year contributes 0.
    pub fn scaled_or_zero(&self, key: &ScenarioKey, year: i64, scale_factor: f64) -> f64 {
        match self.raw(key, year) {
            Some(count) => count * scale_factor,
            None => 0.0,
        }
    }
}

/// Grid position with its population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridCell {
    pub mortality: i32,
    pub fertility: i32,
    pub population: f64,
}

/// Scaled population at one year for every slider position.
/// Rows are mortality values, columns fertility values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityMatrix {
    pub target_year: i64,
    pub mortality: Vec<i32>,
    pub fertility: Vec<i32>,
    pub cells: Vec<Vec<f64>>,
}

impl SensitivityMatrix {
    pub fn dims(&self) -> (usize, usize) {
        (self.mortality.len(), self.fertility.len())
    }

    pub fn get(&self, mortality: i32, fertility: i32) -> Option<f64> {
        let i = self.mortality.iter().position(|m| *m == mortality)?;
        let j = self.fertility.iter().position(|f| *f == fertility)?;
        Some(self.cells[i][j])
    }

    pub fn iter(&self) -> impl Iterator<Item = GridCell> + '_ {
        self.mortality.iter().enumerate().flat_map(move |(i, m)| {
            self.fertility.iter().enumerate().map(move |(j, f)| GridCell {
                mortality: *m,
                fertility: *f,
                population: self.cells[i][j],
            })
        })
    }

    /// First smallest cell in row-major order.
    pub fn min_cell(&self) -> Option<GridCell> {
        self.iter().fold(None, |best: Option<GridCell>, cell| match best {
            Some(b) if b.population <= cell.population => Some(b),
            _ => Some(cell),
        })
    }

    /// First largest cell in row-major order.
    pub fn max_cell(&self) -> Option<GridCell> {
        self.iter().fold(None, |best: Option<GridCell>, cell| match best {
            Some(b) if b.population >= cell.population => Some(b),
            _ => Some(cell),
        })
    }

    /// Long format. Columns: mortality, fertility, population.
    pub fn to_frame(&self) -> Result<DataFrame, PopsimError> {
        let (mut ms, mut fs, mut ps) = (Vec::new(), Vec::new(), Vec::new());
        for cell in self.iter() {
            ms.push(cell.mortality);
            fs.push(cell.fertility);
            ps.push(cell.population);
        }
        let df = DataFrame::new(vec![
            Column::new(sensitivity::MORTALITY.into(), &ms),
            Column::new(sensitivity::FERTILITY.into(), &fs),
            Column::new(sensitivity::POPULATION.into(), &ps),
        ])?;
        Ok(df)
    }
}

pub fn sensitivity_sweep(
    table: &PopulationTable,
    mortality: AdjustmentRange,
    fertility: AdjustmentRange,
    target_year: i64,
    scale_factor: f64,
) -> Result<SensitivityMatrix, PopsimError> {
    let totals = YearlyTotals::from_table(table)?;
    Ok(sweep_totals(
        &totals,
        mortality,
        fertility,
        target_year,
        scale_factor,
    ))
}

pub(crate) fn sweep_totals(
    totals: &YearlyTotals,
    mortality: AdjustmentRange,
    fertility: AdjustmentRange,
    target_year: i64,
    scale_factor: f64,
) -> SensitivityMatrix {
    let mortality_values: Vec<i32> = mortality.iter().collect();
    let fertility_values: Vec<i32> = fertility.iter().collect();

    let mut missing = 0usize;
    let cells: Vec<Vec<f64>> = mortality_values
        .iter()
        .map(|&m| {
            fertility_values
                .iter()
                .map(|&f| {
                    let key = resolve_key(m, f);
                    if totals.raw(&key, target_year).is_none() {
                        missing += 1;
                    }
                    totals.scaled_or_zero(&key, target_year, scale_factor)
                })
                .collect()
        })
        .collect();

    tracing::info!(
        rows = mortality_values.len(),
        cols = fertility_values.len(),
        target_year,
        missing,
        "sensitivity sweep"
    );

    SensitivityMatrix {
        target_year,
        mortality: mortality_values,
        fertility: fertility_values,
        cells,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PolicyMetrics {
    /// Relative change of the final-year population against the baseline.
    pub impact: f64,
    /// Population standard deviation of year-over-year relative changes.
    pub volatility: f64,
}

/// One grid position of the impact/volatility analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyCell {
    pub mortality: i32,
    pub fertility: i32,
    pub policy_strength: i32,
    pub metrics: Result<PolicyMetrics, ComputationError>,
}

/// Columns: mortality, fertility, policy_strength, impact, volatility, error.
/// Failed cells have null metrics and a message in `error`.
pub fn policy_cells_to_frame(cells: &[PolicyCell]) -> Result<DataFrame, PopsimError> {
    let ms: Vec<i32> = cells.iter().map(|c| c.mortality).collect();
    let fs: Vec<i32> = cells.iter().map(|c| c.fertility).collect();
    let strength: Vec<i32> = cells.iter().map(|c| c.policy_strength).collect();
    let impact: Vec<Option<f64>> = cells
        .iter()
        .map(|c| c.metrics.as_ref().ok().map(|m| m.impact))
        .collect();
    let volatility: Vec<Option<f64>> = cells
        .iter()
        .map(|c| c.metrics.as_ref().ok().map(|m| m.volatility))
        .collect();
    let errors: Vec<Option<String>> = cells
        .iter()
        .map(|c| c.metrics.as_ref().err().map(|e| e.to_string()))
        .collect();

    let df = DataFrame::new(vec![
        Column::new(sensitivity::MORTALITY.into(), &ms),
        Column::new(sensitivity::FERTILITY.into(), &fs),
        Column::new(sensitivity::POLICY_STRENGTH.into(), &strength),
        Column::new(sensitivity::IMPACT.into(), &impact),
        Column::new(sensitivity::VOLATILITY.into(), &volatility),
        Column::new(sensitivity::ERROR.into(), &errors),
    ])?;
    Ok(df)
}

/// Long-term impact and volatility for every slider position.
///
/// The baseline is the `(0, 0)` position's population in the last year of
/// `years`. Zero denominators fail only the affected cell.
pub fn volatility_and_impact(
    table: &PopulationTable,
    mortality: AdjustmentRange,
    fertility: AdjustmentRange,
    years: YearRange,
    scale_factor: f64,
) -> Result<Vec<PolicyCell>, PopsimError> {
    let totals = YearlyTotals::from_table(table)?;
    Ok(impact_totals(
        &totals,
        mortality,
        fertility,
        years,
        scale_factor,
    ))
}

pub(crate) fn impact_totals(
    totals: &YearlyTotals,
    mortality: AdjustmentRange,
    fertility: AdjustmentRange,
    years: YearRange,
    scale_factor: f64,
) -> Vec<PolicyCell> {
    let baseline = totals.scaled_or_zero(&ScenarioKey::baseline(), years.end, scale_factor);

    let mut cells = Vec::with_capacity(mortality.len() * fertility.len());
    for m in mortality.iter() {
        for f in fertility.iter() {
            let key = resolve_key(m, f);
            let yearly: Vec<f64> = years
                .years()
                .map(|year| totals.scaled_or_zero(&key, year, scale_factor))
                .collect();
            cells.push(PolicyCell {
                mortality: m,
                fertility: f,
                policy_strength: -m + f,
                metrics: cell_metrics(&yearly, years, baseline),
            });
        }
    }

    let failed = cells.iter().filter(|c| c.metrics.is_err()).count();
    if failed > 0 {
        tracing::warn!(failed, total = cells.len(), "impact/volatility cells failed");
    }
    tracing::info!(
        cells = cells.len(),
        start = years.start,
        end = years.end,
        "impact/volatility analysis"
    );
    cells
}

fn cell_metrics(
    yearly: &[f64],
    years: YearRange,
    baseline: f64,
) -> Result<PolicyMetrics, ComputationError> {
    let Some(&final_population) = yearly.last() else {
        return Err(ComputationError::EmptyYearRange);
    };
    if baseline == 0.0 {
        return Err(ComputationError::ZeroBaseline { year: years.end });
    }
    let impact = (final_population - baseline) / baseline;

    let mut changes = Vec::with_capacity(yearly.len().saturating_sub(1));
    for (offset, pair) in yearly.windows(2).enumerate() {
        let (prev, next) = (pair[0], pair[1]);
        if prev == 0.0 {
            return Err(ComputationError::ZeroPopulation {
                year: years.start + offset as i64,
            });
        }
        changes.push((next - prev) / prev);
    }

    Ok(PolicyMetrics {
        impact,
        volatility: population_std_dev(&changes),
    })
}

/// Standard deviation with divisor `n`; 0 for an empty slice.
fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}
