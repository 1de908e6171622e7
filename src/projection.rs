//! Contract for externally generated projections (e.g. from a language
//! model) and their substitution for dataset-derived series.
//!
//! A generated projection only carries yearly totals, so once one is in use
//! the age/gender composition views are unavailable.

use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::aggregation::{ProjectionSeries, YearPopulation};
use crate::config::YearRange;
use crate::error::ProjectionError;

/// A projection produced outside the dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GeneratedSeries {
    series: ProjectionSeries,
}

impl GeneratedSeries {
    pub fn series(&self) -> &ProjectionSeries {
        &self.series
    }

    pub fn into_series(self) -> ProjectionSeries {
        self.series
    }
}

/// A source of alternative projections.
pub trait ProjectionAdapter {
    /// Project population over `horizon` for a free-text scenario.
    fn generate(&self, scenario: &str, horizon: YearRange)
        -> Result<GeneratedSeries, ProjectionError>;
}

/// User message sent to the model for a scenario description.
pub fn projection_prompt(scenario: &str, horizon: YearRange) -> String {
    format!(
        "Generate a population projection from {} to {} based on this scenario: {}",
        horizon.start, horizon.end, scenario
    )
}

/// Years arrive as JSON numbers of any form; `2024` and `2024.0` are both
/// accepted.
#[derive(Debug, Deserialize)]
struct RawPoint {
    #[serde(rename = "Year")]
    year: f64,
    #[serde(rename = "Population")]
    population: f64,
}

impl RawPoint {
    fn integral_year(&self) -> Option<i64> {
        let in_range = self.year >= i64::MIN as f64 && self.year < i64::MAX as f64;
        (self.year.is_finite() && self.year.fract() == 0.0 && in_range).then(|| self.year as i64)
    }
}

fn code_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```(?:json)?\s*|\s*```").expect("static regex"))
}

/// Decode a model reply into a validated series.
///
/// The reply must be a JSON list of `{"Year": .., "Population": ..}` objects,
/// optionally wrapped in a Markdown code fence. Years must be unique, lie
/// inside `horizon` and include both its first and last year.
pub fn parse_generated_series(
    text: &str,
    horizon: YearRange,
) -> Result<GeneratedSeries, ProjectionError> {
    let json = code_fence().replace_all(text, "");
    let json = json.trim();

    let raw: Vec<RawPoint> = serde_json::from_str(json).map_err(|err| {
        tracing::warn!(error = %err, "generated projection is not valid JSON");
        ProjectionError::Parse {
            message: err.to_string(),
            raw: json.to_string(),
        }
    })?;

    if raw.is_empty() {
        return Err(ProjectionError::Validation("projection is empty".into()));
    }

    let mut points: Vec<YearPopulation> = Vec::with_capacity(raw.len());
    for point in raw {
        let Some(year) = point.integral_year() else {
            return Err(ProjectionError::Validation(format!(
                "year {} is not a whole number",
                point.year
            )));
        };
        if !horizon.contains(year) {
            return Err(ProjectionError::Validation(format!(
                "year {year} is outside {}-{}",
                horizon.start, horizon.end
            )));
        }
        if !point.population.is_finite() || point.population < 0.0 {
            return Err(ProjectionError::Validation(format!(
                "population for {year} must be a non-negative number, got {}",
                point.population
            )));
        }
        points.push(YearPopulation {
            year,
            population: point.population,
        });
    }

    points.sort_by_key(|p| p.year);
    if let Some(pair) = points.windows(2).find(|w| w[0].year == w[1].year) {
        return Err(ProjectionError::Validation(format!(
            "year {} appears more than once",
            pair[0].year
        )));
    }
    for year in [horizon.start, horizon.end] {
        if points.binary_search_by_key(&year, |p| p.year).is_err() {
            return Err(ProjectionError::Validation(format!("year {year} is missing")));
        }
    }

    Ok(GeneratedSeries {
        series: ProjectionSeries::from_points(points),
    })
}

/// The series a chart should show.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesSource {
    Dataset(ProjectionSeries),
    Generated(GeneratedSeries),
}

impl SeriesSource {
    /// A generated series, when present, replaces the dataset series.
    pub fn select(generated: Option<GeneratedSeries>, dataset: ProjectionSeries) -> Self {
        match generated {
            Some(g) => Self::Generated(g),
            None => Self::Dataset(dataset),
        }
    }

    pub fn series(&self) -> &ProjectionSeries {
        match self {
            Self::Dataset(s) => s,
            Self::Generated(g) => g.series(),
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Self::Generated(_))
    }

    pub fn supports_composition(&self) -> bool {
        !self.is_generated()
    }
}

/// Simulated progress while a generation request runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// Fraction in `[0, 1)` and the year being "simulated".
    Year { year: i64, fraction: f64 },
    /// The display finished; waiting on the real request.
    Finalizing,
}

/// Run `adapter` on a worker thread while emitting one simulated progress
/// step per horizon year on the calling thread, `tick` apart.
///
/// Both sides are joined before returning. The result is always the
/// adapter's, regardless of where the simulated display stood.
pub fn generate_with_progress<A, F>(
    adapter: &A,
    scenario: &str,
    horizon: YearRange,
    tick: Duration,
    mut on_progress: F,
) -> Result<GeneratedSeries, ProjectionError>
where
    A: ProjectionAdapter + Sync + ?Sized,
    F: FnMut(Progress),
{
    thread::scope(|scope| {
        let request = scope.spawn(|| adapter.generate(scenario, horizon));

        let steps = horizon.len().saturating_sub(1).max(1);
        for i in 0..steps {
            on_progress(Progress::Year {
                year: horizon.start + i as i64,
                fraction: i as f64 / steps as f64,
            });
            if !tick.is_zero() {
                thread::sleep(tick);
            }
        }
        on_progress(Progress::Finalizing);

        let result = request
            .join()
            .unwrap_or_else(|_| Err(ProjectionError::Transport("projection worker panicked".into())));
        if let Err(err) = &result {
            tracing::warn!(error = %err, "projection generation failed");
        }
        result
    })
}
