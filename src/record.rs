//! Benchmark run records and the in-memory table they live in.
//!
//! A [`BenchmarkRun`] is one row of the benchmark CSV. Numeric cells are held as
//! [`Measure`] so that a cell which failed to parse stays visibly `Missing`
//! instead of turning into a NaN that silently poisons later statistics.

use serde::{Serialize, Serializer};

use crate::categorize::TaskCategory;

// ============================================================================
// Measured values
// ============================================================================

/// A numeric cell: either a finite value or explicitly missing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Measure {
    Value(f64),
    #[default]
    Missing,
}

impl Measure {
    /// Coerce a raw cell. Anything that is not a finite number becomes `Missing`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Self::Value(v),
            _ => Self::Missing,
        }
    }

    #[inline]
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Missing => None,
        }
    }

    #[cfg(test)]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Apply `f` to a present value, keeping `Missing` as is.
    #[inline]
    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self {
            Self::Value(v) => Self::Value(f(v)),
            Self::Missing => Self::Missing,
        }
    }
}

impl From<Option<f64>> for Measure {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Self::Value(v),
            _ => Self::Missing,
        }
    }
}

impl Serialize for Measure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => serializer.serialize_some(v),
            Self::Missing => serializer.serialize_none(),
        }
    }
}

/// The four measured columns of a benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Quality,
    Latency,
    Energy,
    Co2,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Self::Quality, Self::Latency, Self::Energy, Self::Co2];

    /// Normalized CSV column name.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Latency => "latency_s",
            Self::Energy => "energy_wh",
            Self::Co2 => "co2_g",
        }
    }

    /// Parse a column name or a short alias, case-insensitive.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "quality" => Some(Self::Quality),
            "latency_s" | "latency" => Some(Self::Latency),
            "energy_wh" | "energy" => Some(Self::Energy),
            "co2_g" | "co2" | "co_g" => Some(Self::Co2),
            _ => None,
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::Quality => "",
            Self::Latency => "s",
            Self::Energy => "Wh",
            Self::Co2 => "g",
        }
    }

    /// Latency, energy and CO2 are costs; only quality is a benefit.
    #[inline]
    pub fn lower_is_better(&self) -> bool {
        !matches!(self, Self::Quality)
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.column())
    }
}

// ============================================================================
// Benchmark runs
// ============================================================================

/// One recorded evaluation of a model on one task.
///
/// Identifier fields are `None` when the cell was empty or (for `task_id`) not an
/// integer. Such runs stay in the table but join no group keyed on that field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkRun {
    pub run_id: String,
    pub task_id: Option<i64>,
    pub task_label: String,
    pub model: Option<String>,
    pub model_size: Option<String>,
    pub quality: Measure,
    pub latency_s: Measure,
    pub energy_wh: Measure,
    pub co2_g: Measure,
    /// Derived from `task_id`, never read from the file.
    pub task_category: Option<TaskCategory>,
}

impl BenchmarkRun {
    #[inline]
    pub fn measure(&self, metric: Metric) -> Measure {
        match metric {
            Metric::Quality => self.quality,
            Metric::Latency => self.latency_s,
            Metric::Energy => self.energy_wh,
            Metric::Co2 => self.co2_g,
        }
    }

    /// True when every grouping identifier is present.
    pub fn is_groupable(&self) -> bool {
        self.task_category.is_some() && self.model.is_some() && self.model_size.is_some()
    }
}

/// The loaded benchmark table. Never mutated after construction; filtering
/// produces a new table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Normalized header names as they appeared in the file.
    pub columns: Vec<String>,
    pub runs: Vec<BenchmarkRun>,
}

impl Table {
    pub fn new(columns: Vec<String>, runs: Vec<BenchmarkRun>) -> Self {
        Self { columns, runs }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// A table with the same header and a different set of runs.
    pub fn with_runs(&self, runs: Vec<BenchmarkRun>) -> Self {
        Self {
            columns: self.columns.clone(),
            runs,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::categorize::categorize;
    use crate::loader::EXPECTED_COLUMNS;

    /// Build a run with every identifier present and CO2 left missing.
    pub fn run(task_id: i64, model: &str, size: &str, quality: f64, latency: f64, energy: f64) -> BenchmarkRun {
        BenchmarkRun {
            run_id: format!("{model}-{size}-{task_id}"),
            task_id: Some(task_id),
            task_label: format!("task {task_id}"),
            model: Some(model.to_string()),
            model_size: Some(size.to_string()),
            quality: Measure::Value(quality),
            latency_s: Measure::Value(latency),
            energy_wh: Measure::Value(energy),
            co2_g: Measure::Missing,
            task_category: Some(categorize(task_id)),
        }
    }

    pub fn table(runs: Vec<BenchmarkRun>) -> Table {
        Table::new(EXPECTED_COLUMNS.iter().map(|c| c.to_string()).collect(), runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_parse() {
        assert_eq!(Measure::parse("0.8"), Measure::Value(0.8));
        assert_eq!(Measure::parse("  12 "), Measure::Value(12.0));
        assert_eq!(Measure::parse("1e-3"), Measure::Value(0.001));
        assert_eq!(Measure::parse(""), Measure::Missing);
        assert_eq!(Measure::parse("n/a"), Measure::Missing);
        assert_eq!(Measure::parse("0,8"), Measure::Missing);
    }

    #[test]
    fn test_non_finite_is_missing() {
        assert!(Measure::parse("NaN").is_missing());
        assert!(Measure::parse("inf").is_missing());
        assert!(Measure::from(Some(f64::NAN)).is_missing());
    }

    #[test]
    fn test_metric_aliases() {
        assert_eq!(Metric::from_str("LATENCY_S"), Some(Metric::Latency));
        assert_eq!(Metric::from_str("co_g"), Some(Metric::Co2));
        assert_eq!(Metric::from_str("speed"), None);
        for metric in Metric::ALL {
            assert_eq!(Metric::from_str(metric.column()), Some(metric));
        }
    }

    #[test]
    fn test_measure_serializes_as_number_or_null() {
        let json = serde_json::to_string(&[Measure::Value(1.5), Measure::Missing]).unwrap();
        assert_eq!(json, "[1.5,null]");
    }

    #[test]
    fn test_groupable_requires_all_identifiers() {
        let mut run = fixtures::run(3, "A", "7B", 0.5, 1.0, 1.0);
        assert!(run.is_groupable());
        run.model_size = None;
        assert!(!run.is_groupable());
    }
}
