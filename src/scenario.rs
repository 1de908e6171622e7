//! Scenario resolution: slider positions and dropdown selections to the
//! `Combination` key used in the dataset.
//!
//! Slider-derived keys embed the *negated* slider values, so the slider
//! position `(mortality = 2, fertility = -1)` maps to `asmr_-2_asfr_1`. This
//! matches how the scenarios were named when simulated and must be kept.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dataset::PopulationTable;
use crate::schema::scenario::{FERTILITY_INFIX, NO_SELECTION, SLIDER_PREFIX};

/// A value of the dataset's `Combination` column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioKey(String);

impl ScenarioKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `(0, 0)` slider position.
    pub fn baseline() -> Self {
        resolve_key(0, 0)
    }

    pub fn is_slider_derived(&self) -> bool {
        self.0.starts_with(SLIDER_PREFIX)
    }

    /// Slider values that produce this key, or `None` for named scenarios.
    pub fn adjustments(&self) -> Option<(i32, i32)> {
        let rest = self.0.strip_prefix(SLIDER_PREFIX)?.strip_prefix('_')?;
        let (mortality, fertility) = rest.split_once(&format!("_{FERTILITY_INFIX}_"))?;
        let mortality: i32 = mortality.parse().ok()?;
        let fertility: i32 = fertility.parse().ok()?;
        Some((-mortality, -fertility))
    }
}

impl fmt::Display for ScenarioKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ScenarioKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ScenarioKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ScenarioKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Inclusive bounds of a slider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentRange {
    pub min: i32,
    pub max: i32,
}

impl AdjustmentRange {
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    pub const fn mortality() -> Self {
        Self::new(-5, 5)
    }

    pub const fn fertility() -> Self {
        Self::new(-5, 4)
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<i32> {
        self.min..=self.max
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn contains(&self, value: i32) -> bool {
        self.iter().contains(&value)
    }
}

/// Key for a slider position. Out-of-range values still produce a key;
/// bounds are the caller's concern.
pub fn resolve_key(mortality: i32, fertility: i32) -> ScenarioKey {
    ScenarioKey(format!(
        "{SLIDER_PREFIX}_{}_{FERTILITY_INFIX}_{}",
        -i64::from(mortality),
        -i64::from(fertility)
    ))
}

/// An explicit dropdown selection wins unless it is absent or `"None"`.
pub fn choose_key(explicit: Option<&str>, slider_derived: ScenarioKey) -> ScenarioKey {
    match explicit {
        Some(selection) if selection != NO_SELECTION => ScenarioKey::new(selection),
        _ => slider_derived,
    }
}

/// Named scenarios offered in the dropdown. Slider-space keys are excluded.
pub fn list_selectable_scenarios(table: &PopulationTable) -> BTreeSet<String> {
    table
        .combinations()
        .iter()
        .filter(|c| !c.starts_with(SLIDER_PREFIX))
        .cloned()
        .collect()
}
