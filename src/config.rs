//! Engine configuration, read from YAML.
//!
//! ```yaml
//! dataset_path: data/population_composition.csv
//! scale_factor: 190
//! mortality: { min: -5, max: 5 }
//! fertility: { min: -5, max: 4 }
//! horizon: { start: 2024, end: 2100 }
//! sensitivity_year: 2100
//! snapshot_years: [2024, 2100]
//! comparison_year: 2100
//! ```
//!
//! `scale_factor` has no default. The dashboard this engine was built for used
//! several different calibration constants (190, 195, 371 among them), so the
//! value must be chosen explicitly per deployment.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PopsimError;
use crate::scenario::AdjustmentRange;

/// Inclusive range of projection years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i64,
    pub end: i64,
}

impl YearRange {
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn years(&self) -> impl Iterator<Item = i64> {
        self.start..=self.end
    }

    /// Number of years, or `None` when the span does not fit in an `i64`.
    pub fn checked_len(&self) -> Option<usize> {
        if self.end < self.start {
            return Some(0);
        }
        let span = self.end.checked_sub(self.start)?.checked_add(1)?;
        usize::try_from(span).ok()
    }

    /// Number of years, saturating at `usize::MAX`.
    pub fn len(&self) -> usize {
        self.checked_len().unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, year: i64) -> bool {
        (self.start..=self.end).contains(&year)
    }
}

impl Default for YearRange {
    fn default() -> Self {
        Self::new(2024, 2100)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,

    /// Multiplier converting sampled-cohort counts to population estimates.
    pub scale_factor: f64,

    #[serde(default = "AdjustmentRange::mortality")]
    pub mortality: AdjustmentRange,

    #[serde(default = "AdjustmentRange::fertility")]
    pub fertility: AdjustmentRange,

    #[serde(default)]
    pub horizon: YearRange,

    #[serde(default = "default_final_year")]
    pub sensitivity_year: i64,

    #[serde(default = "default_snapshot_years")]
    pub snapshot_years: Vec<i64>,

    #[serde(default = "default_final_year")]
    pub comparison_year: i64,
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("data/population_composition.csv")
}

fn default_final_year() -> i64 {
    2100
}

fn default_snapshot_years() -> Vec<i64> {
    vec![2024, 2100]
}

impl EngineConfig {
    /// Config with default ranges and years for the given dataset and scale.
    pub fn new(dataset_path: impl Into<PathBuf>, scale_factor: f64) -> Self {
        Self {
            dataset_path: dataset_path.into(),
            scale_factor,
            mortality: AdjustmentRange::mortality(),
            fertility: AdjustmentRange::fertility(),
            horizon: YearRange::default(),
            sensitivity_year: default_final_year(),
            snapshot_years: default_snapshot_years(),
            comparison_year: default_final_year(),
        }
    }

    /// Parse and validate YAML text. Relative dataset paths are kept as-is.
    pub fn from_yaml_str(text: &str) -> Result<Self, PopsimError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file. A relative `dataset_path` is resolved against the
    /// directory containing the config file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, PopsimError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&text)?;
        if config.dataset_path.is_relative() {
            if let Some(dir) = path.parent() {
                config.dataset_path = dir.join(&config.dataset_path);
            }
        }
        tracing::debug!(config = %path.display(), dataset = %config.dataset_path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PopsimError> {
        if !self.scale_factor.is_finite() || self.scale_factor < 0.0 {
            return Err(PopsimError::Config(format!(
                "scale_factor must be a finite non-negative number, got {}",
                self.scale_factor
            )));
        }
        for (name, range) in [("mortality", &self.mortality), ("fertility", &self.fertility)] {
            if range.min > range.max {
                return Err(PopsimError::Config(format!(
                    "{name} range is inverted: min {} > max {}",
                    range.min, range.max
                )));
            }
        }
        let Some(horizon_len) = self.horizon.checked_len() else {
            return Err(PopsimError::Config(format!(
                "horizon {}-{} spans too many years",
                self.horizon.start, self.horizon.end
            )));
        };
        if horizon_len == 0 {
            return Err(PopsimError::Config(format!(
                "horizon is empty: start {} > end {}",
                self.horizon.start, self.horizon.end
            )));
        }
        let report_years = self
            .snapshot_years
            .iter()
            .map(|y| ("snapshot_years", *y))
            .chain([
                ("sensitivity_year", self.sensitivity_year),
                ("comparison_year", self.comparison_year),
            ]);
        for (name, year) in report_years {
            if !self.horizon.contains(year) {
                return Err(PopsimError::Config(format!(
                    "{name} {year} is outside the horizon {}-{}",
                    self.horizon.start, self.horizon.end
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn minimal_yaml_fills_defaults() {
        let config = EngineConfig::from_yaml_str("scale_factor: 190\n").unwrap();
        assert_eq!(config.scale_factor, 190.0);
        assert_eq!(config.mortality, AdjustmentRange::new(-5, 5));
        assert_eq!(config.fertility, AdjustmentRange::new(-5, 4));
        assert_eq!(config.horizon, YearRange::new(2024, 2100));
        assert_eq!(config.snapshot_years, vec![2024, 2100]);
        assert_eq!(config.sensitivity_year, 2100);
        assert_eq!(config.comparison_year, 2100);
        assert_eq!(
            config.dataset_path,
            PathBuf::from("data/population_composition.csv")
        );
    }

    #[test]
    fn scale_factor_is_required() {
        let err = EngineConfig::from_yaml_str("dataset_path: x.csv\n").unwrap_err();
        assert!(matches!(err, PopsimError::Yaml(_)));
    }

    #[test]
    fn fertility_bounds_are_configurable() {
        let yaml = "scale_factor: 371\nfertility: { min: -5, max: 5 }\n";
        let config = EngineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.fertility.iter().count(), 11);
    }

    #[test]
    fn rejects_bad_values() {
        for yaml in [
            "scale_factor: -1\n",
            "scale_factor: .nan\n",
            "scale_factor: 1\nmortality: { min: 3, max: -3 }\n",
            "scale_factor: 1\nhorizon: { start: 2100, end: 2024 }\n",
            "scale_factor: 1\nsensitivity_year: 2200\n",
            "scale_factor: 1\nsnapshot_years: [2000]\n",
            "scale_factor: 1\nhorizon: { start: -9223372036854775808, end: 9223372036854775807 }\n",
        ] {
            let err = EngineConfig::from_yaml_str(yaml).unwrap_err();
            assert!(matches!(err, PopsimError::Config(_)), "{yaml}: {err}");
        }
    }

    #[test]
    fn relative_dataset_path_resolves_against_config_dir() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "dataset_path: data/pop.csv\nscale_factor: 19").unwrap();
        let config = EngineConfig::from_yaml_file(file.path()).unwrap();
        let dir = file.path().parent().unwrap();
        assert_eq!(config.dataset_path, dir.join("data/pop.csv"));
    }

    #[test]
    fn year_range_len() {
        assert_eq!(YearRange::new(2024, 2100).len(), 77);
        assert_eq!(YearRange::new(2024, 2024).len(), 1);
        assert!(YearRange::new(2025, 2024).is_empty());
    }

    #[test]
    fn year_range_len_does_not_overflow() {
        let huge = YearRange::new(i64::MIN, i64::MAX);
        assert_eq!(huge.checked_len(), None);
        assert_eq!(huge.len(), usize::MAX);
        assert!(!huge.is_empty());
        assert_eq!(YearRange::new(i64::MAX, i64::MAX).checked_len(), Some(1));
        assert_eq!(YearRange::new(i64::MAX, i64::MIN).checked_len(), Some(0));

        let mut config = EngineConfig::new("x.csv", 1.0);
        config.horizon = huge;
        assert!(matches!(config.validate(), Err(PopsimError::Config(_))));
    }
}
