use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::PopsimError;
use crate::schema::{gender, population};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => gender::MALE,
            Self::Female => gender::FEMALE,
        }
    }
}

/// An age band label such as `0-4` or `80+`.
///
/// Ordered by the numeric lower bound, so `5-9` sorts before `10-14`.
/// Labels without a leading number sort after all numeric ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgeGroup(String);

impl AgeGroup {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }

    pub fn lower_bound(&self) -> Option<u32> {
        let digits: &str = {
            let end = self
                .0
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(self.0.len());
            &self.0[..end]
        };
        digits.parse().ok()
    }
}

impl Ord for AgeGroup {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.lower_bound(), other.lower_bound()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for AgeGroup {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The validated population dataset.
///
/// Columns: Combination (str), Year (i64), Gender (str, M|F),
/// AgeGroup (str), Count (f64). Immutable once built.
#[derive(Debug, Clone)]
pub struct PopulationTable {
    frame: DataFrame,
    combinations: BTreeSet<String>,
}

impl PopulationTable {
    /// Read a CSV or Parquet file (by extension).
    ///
    /// Any failure, from a missing file to a duplicated row, is reported as
    /// `SourceLoad`; nothing is partially loaded.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, PopsimError> {
        let path = path.as_ref();
        let started = Instant::now();
        let table = read_frame(path)
            .and_then(Self::from_frame)
            .map_err(|err| PopsimError::SourceLoad {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        tracing::info!(
            path = %path.display(),
            rows = table.height(),
            scenarios = table.combinations.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "loaded population dataset"
        );
        Ok(table)
    }

    /// Validate and normalize an in-memory frame.
    ///
    /// String columns are trimmed; Year is cast to Int64 and Count to Float64.
    /// Extra columns are dropped.
    pub fn from_frame(df: DataFrame) -> Result<Self, PopsimError> {
        require_columns(&df, &population::ALL)?;

        let mut exprs = Vec::with_capacity(population::ALL.len());
        for name in [population::COMBINATION, population::GENDER, population::AGE_GROUP] {
            exprs.push(text_column(&df, name)?);
        }
        exprs.push(numeric_column(&df, population::YEAR, DataType::Int64)?);
        exprs.push(numeric_column(&df, population::COUNT, DataType::Float64)?);

        let frame = df
            .lazy()
            .select(exprs)
            .select(population::ALL.iter().map(|c| col(*c)).collect::<Vec<_>>())
            .collect()?;

        for name in population::ALL {
            let nulls = frame.column(name)?.null_count();
            if nulls > 0 {
                return Err(PopsimError::InvalidData(format!(
                    "Column '{name}' has {nulls} missing or unparsable values"
                )));
            }
        }

        let bad_gender = frame
            .clone()
            .lazy()
            .filter(
                col(population::GENDER)
                    .neq(lit(gender::MALE))
                    .and(col(population::GENDER).neq(lit(gender::FEMALE))),
            )
            .collect()?;
        if bad_gender.height() > 0 {
            let sample = bad_gender.column(population::GENDER)?.str()?.get(0).unwrap_or("");
            return Err(PopsimError::InvalidData(format!(
                "{} rows have a Gender other than M or F (e.g. '{sample}')",
                bad_gender.height()
            )));
        }

        let counts = frame.column(population::COUNT)?.f64()?;
        let non_finite = counts.into_iter().flatten().filter(|v| !v.is_finite()).count();
        if non_finite > 0 {
            return Err(PopsimError::InvalidData(format!(
                "{non_finite} rows have a non-finite Count"
            )));
        }
        let negative = frame
            .clone()
            .lazy()
            .filter(col(population::COUNT).lt(lit(0.0)))
            .collect()?;
        if negative.height() > 0 {
            return Err(PopsimError::InvalidData(format!(
                "{} rows have a negative Count",
                negative.height()
            )));
        }

        let duplicates = frame
            .clone()
            .lazy()
            .group_by([
                col(population::COMBINATION),
                col(population::YEAR),
                col(population::GENDER),
                col(population::AGE_GROUP),
            ])
            .agg([col(population::COUNT).count().alias("_row_count")])
            .filter(col("_row_count").gt(lit(1)))
            .collect()?;
        if duplicates.height() > 0 {
            return Err(PopsimError::InvalidData(format!(
                "{} (Combination, Year, Gender, AgeGroup) keys appear more than once",
                duplicates.height()
            )));
        }

        let combinations = frame
            .column(population::COMBINATION)?
            .str()?
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect();

        Ok(Self {
            frame,
            combinations,
        })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Distinct `Combination` values, sorted.
    pub fn combinations(&self) -> &BTreeSet<String> {
        &self.combinations
    }
}

/// Loads the dataset once and hands out the same table afterwards.
#[derive(Debug)]
pub struct DatasetLoader {
    path: PathBuf,
    table: OnceLock<Arc<PopulationTable>>,
}

impl DatasetLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Arc<PopulationTable>, PopsimError> {
        if let Some(table) = self.table.get() {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(PopulationTable::read(&self.path)?);
        // A concurrent first load may have won; everyone shares its table.
        Ok(Arc::clone(self.table.get_or_init(|| table)))
    }
}

static SHARED_TABLES: OnceLock<Mutex<HashMap<PathBuf, Arc<PopulationTable>>>> = OnceLock::new();

/// Process-wide load: the first successful read of a path is kept for the
/// life of the process and returned to every later caller.
///
/// Paths are keyed by their canonical form when it can be resolved. Failed
/// reads are not cached.
pub fn load_shared(path: impl AsRef<Path>) -> Result<Arc<PopulationTable>, PopsimError> {
    let path = path.as_ref();
    let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let mut tables = SHARED_TABLES
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .map_err(|_| PopsimError::CachePoisoned)?;
    if let Some(table) = tables.get(&key) {
        tracing::debug!(path = %key.display(), "reusing cached population dataset");
        return Ok(Arc::clone(table));
    }
    let table = Arc::new(PopulationTable::read(path)?);
    tables.insert(key, Arc::clone(&table));
    Ok(table)
}

// ── Private helpers ─────────────────────────────────────────────────────────

/// Read with all columns as strings; types are fixed up in `from_frame`.
fn read_frame(path: &Path) -> Result<DataFrame, PopsimError> {
    if !path.exists() {
        return Err(PopsimError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        )));
    }

    let is_parquet = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));

    let mut df = if is_parquet {
        ParquetReader::new(File::open(path)?).finish()?
    } else {
        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0)) // all columns as String
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?
    };

    let trimmed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    df.set_column_names(trimmed.as_slice())?;

    Ok(df)
}

fn require_columns(df: &DataFrame, required: &[&str]) -> Result<(), PopsimError> {
    for &col_name in required {
        if df.column(col_name).is_err() {
            return Err(PopsimError::MissingColumn(col_name.to_string()));
        }
    }
    Ok(())
}

fn text_column(df: &DataFrame, name: &str) -> Result<Expr, PopsimError> {
    let expr = if df.column(name)?.dtype() == &DataType::String {
        col(name).str().strip_chars(lit(" \t\r\n"))
    } else {
        col(name).cast(DataType::String)
    };
    Ok(expr.alias(name))
}

fn numeric_column(df: &DataFrame, name: &str, dtype: DataType) -> Result<Expr, PopsimError> {
    let expr = if df.column(name)?.dtype() == &DataType::String {
        col(name).str().strip_chars(lit(" \t\r\n")).cast(dtype)
    } else {
        col(name).cast(dtype)
    };
    Ok(expr.alias(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        df!(
            "Combination" => ["asmr_0_asfr_0", "asmr_0_asfr_0", "vision"],
            "Year" => [2024i64, 2024, 2024],
            "Gender" => ["M", "F", "M"],
            "AgeGroup" => ["0-4", "0-4", "5-9"],
            "Count" => [1000.0, 900.0, 10.0],
        )
        .unwrap()
    }

    #[test]
    fn from_frame_keeps_schema() {
        let table = PopulationTable::from_frame(frame()).unwrap();
        assert_eq!(table.height(), 3);
        let schema = table.frame().schema();
        assert_eq!(schema.get(population::YEAR), Some(&DataType::Int64));
        assert_eq!(schema.get(population::COUNT), Some(&DataType::Float64));
        assert_eq!(table.combinations().len(), 2);
    }

    #[test]
    fn string_columns_are_parsed_and_trimmed() {
        let df = df!(
            "Combination" => [" vision "],
            "Year" => [" 2030"],
            "Gender" => ["F "],
            "AgeGroup" => ["10-14"],
            "Count" => ["12.5"],
            "extra" => ["dropped"],
        )
        .unwrap();
        let table = PopulationTable::from_frame(df).unwrap();
        let f = table.frame();
        assert_eq!(f.width(), 5);
        assert_eq!(f.column(population::COMBINATION).unwrap().str().unwrap().get(0), Some("vision"));
        assert_eq!(f.column(population::YEAR).unwrap().i64().unwrap().get(0), Some(2030));
        assert_eq!(f.column(population::GENDER).unwrap().str().unwrap().get(0), Some("F"));
        assert_eq!(f.column(population::COUNT).unwrap().f64().unwrap().get(0), Some(12.5));
    }

    #[test]
    fn rejects_missing_column() {
        let df = frame().drop(population::AGE_GROUP).unwrap();
        let err = PopulationTable::from_frame(df).unwrap_err();
        assert!(matches!(err, PopsimError::MissingColumn(c) if c == population::AGE_GROUP));
    }

    #[test]
    fn rejects_unknown_gender() {
        let df = df!(
            "Combination" => ["a"],
            "Year" => [2024i64],
            "Gender" => ["X"],
            "AgeGroup" => ["0-4"],
            "Count" => [1.0],
        )
        .unwrap();
        assert!(matches!(
            PopulationTable::from_frame(df),
            Err(PopsimError::InvalidData(_))
        ));
    }

    #[test]
    fn rejects_negative_count() {
        let df = df!(
            "Combination" => ["a"],
            "Year" => [2024i64],
            "Gender" => ["M"],
            "AgeGroup" => ["0-4"],
            "Count" => [-1.0],
        )
        .unwrap();
        assert!(matches!(
            PopulationTable::from_frame(df),
            Err(PopsimError::InvalidData(_))
        ));
    }

    fn single_count(count: f64) -> DataFrame {
        df!(
            "Combination" => ["a", "a"],
            "Year" => [2024i64, 2024],
            "Gender" => ["M", "F"],
            "AgeGroup" => ["0-4", "0-4"],
            "Count" => [1.0, count],
        )
        .unwrap()
    }

    #[test]
    fn rejects_nan_count() {
        let err = PopulationTable::from_frame(single_count(f64::NAN)).unwrap_err();
        assert!(matches!(err, PopsimError::InvalidData(ref m) if m.contains("non-finite")), "{err}");
    }

    #[test]
    fn rejects_infinite_count() {
        for count in [f64::INFINITY, f64::NEG_INFINITY] {
            let err = PopulationTable::from_frame(single_count(count)).unwrap_err();
            assert!(matches!(err, PopsimError::InvalidData(ref m) if m.contains("non-finite")), "{err}");
        }
    }

    #[test]
    fn parsed_nan_and_inf_counts_are_rejected() {
        let df = df!(
            "Combination" => ["a", "a"],
            "Year" => ["2100", "2100"],
            "Gender" => ["M", "F"],
            "AgeGroup" => ["0-4", "0-4"],
            "Count" => ["NaN", "inf"],
        )
        .unwrap();
        assert!(PopulationTable::from_frame(df).is_err());
    }

    #[test]
    fn rejects_unparsable_year() {
        let df = df!(
            "Combination" => ["a"],
            "Year" => ["next year"],
            "Gender" => ["M"],
            "AgeGroup" => ["0-4"],
            "Count" => ["1"],
        )
        .unwrap();
        assert!(PopulationTable::from_frame(df).is_err());
    }

    #[test]
    fn rejects_duplicate_keys() {
        let df = df!(
            "Combination" => ["a", "a"],
            "Year" => [2024i64, 2024],
            "Gender" => ["M", "M"],
            "AgeGroup" => ["0-4", "0-4"],
            "Count" => [1.0, 2.0],
        )
        .unwrap();
        assert!(matches!(
            PopulationTable::from_frame(df),
            Err(PopsimError::InvalidData(_))
        ));
    }

    #[test]
    fn missing_file_is_a_source_load_failure() {
        let loader = DatasetLoader::new("does/not/exist.csv");
        let err = loader.load().unwrap_err();
        assert!(matches!(err, PopsimError::SourceLoad { .. }));
    }

    #[test]
    fn age_groups_order_numerically() {
        let mut groups: Vec<AgeGroup> = ["10-14", "80+", "5-9", "0-4", "unknown"]
            .into_iter()
            .map(AgeGroup::new)
            .collect();
        groups.sort();
        let labels: Vec<&str> = groups.iter().map(AgeGroup::label).collect();
        assert_eq!(labels, vec!["0-4", "5-9", "10-14", "80+", "unknown"]);
        assert_eq!(AgeGroup::new("80+").lower_bound(), Some(80));
        assert_eq!(AgeGroup::new("all").lower_bound(), None);
    }
}
