//! Grouped mean statistics.
//!
//! Runs are partitioned by the distinct values of the requested group keys and
//! each metric is averaged over the present values in the group. A run missing
//! any group key joins no group. Groups come back sorted by key tuple.

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::record::{BenchmarkRun, Measure, Metric, Table};

/// Default rounding applied to every mean.
pub const MEAN_DECIMALS: u32 = 3;

/// A column that can partition runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    TaskCategory,
    Model,
    ModelSize,
}

impl GroupKey {
    pub fn column(&self) -> &'static str {
        match self {
            Self::TaskCategory => "task_category",
            Self::Model => "model",
            Self::ModelSize => "model_size",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "task_category" | "category" => Some(Self::TaskCategory),
            "model" => Some(Self::Model),
            "model_size" | "size" => Some(Self::ModelSize),
            _ => None,
        }
    }

    /// The run's value for this key, if it has one.
    pub fn value(&self, run: &BenchmarkRun) -> Option<String> {
        match self {
            Self::TaskCategory => run.task_category.map(|c| c.label().to_string()),
            Self::Model => run.model.clone(),
            Self::ModelSize => run.model_size.clone(),
        }
    }
}

/// Means for one group.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub keys: Vec<(GroupKey, String)>,
    pub means: Vec<(Metric, Measure)>,
    /// Runs in the group, including those with missing metrics.
    pub runs: usize,
}

impl AggregateRow {
    pub fn key(&self, key: GroupKey) -> Option<&str> {
        self.keys
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Mean of `metric`, `Missing` if it was not aggregated or had no values.
    pub fn mean(&self, metric: Metric) -> Measure {
        self.means
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, v)| *v)
            .unwrap_or(Measure::Missing)
    }
}

impl Serialize for AggregateRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.keys.len() + self.means.len() + 1))?;
        for (key, value) in &self.keys {
            map.serialize_entry(key.column(), value)?;
        }
        for (metric, mean) in &self.means {
            map.serialize_entry(metric.column(), mean)?;
        }
        map.serialize_entry("runs", &self.runs)?;
        map.end()
    }
}

#[derive(Default)]
struct Accumulator {
    sums: Vec<f64>,
    counts: Vec<usize>,
    runs: usize,
}

/// Group and average, rounding means to three decimals.
pub fn aggregate(table: &Table, group_keys: &[GroupKey], metrics: &[Metric]) -> Vec<AggregateRow> {
    aggregate_with_precision(table, group_keys, metrics, MEAN_DECIMALS)
}

/// Group and average with an explicit rounding precision.
pub fn aggregate_with_precision(
    table: &Table,
    group_keys: &[GroupKey],
    metrics: &[Metric],
    decimals: u32,
) -> Vec<AggregateRow> {
    let mut groups: BTreeMap<Vec<String>, Accumulator> = BTreeMap::new();

    for run in &table.runs {
        let Some(key) = group_keys
            .iter()
            .map(|k| k.value(run))
            .collect::<Option<Vec<String>>>()
        else {
            continue;
        };

        let acc = groups.entry(key).or_insert_with(|| Accumulator {
            sums: vec![0.0; metrics.len()],
            counts: vec![0; metrics.len()],
            runs: 0,
        });
        acc.runs += 1;
        for (i, metric) in metrics.iter().enumerate() {
            if let Some(v) = run.measure(*metric).value() {
                acc.sums[i] += v;
                acc.counts[i] += 1;
            }
        }
    }

    groups
        .into_iter()
        .map(|(values, acc)| AggregateRow {
            keys: group_keys.iter().copied().zip(values).collect(),
            means: metrics
                .iter()
                .enumerate()
                .map(|(i, metric)| {
                    let mean = if acc.counts[i] == 0 {
                        Measure::Missing
                    } else {
                        Measure::Value(round_to(acc.sums[i] / acc.counts[i] as f64, decimals))
                    };
                    (*metric, mean)
                })
                .collect(),
            runs: acc.runs,
        })
        .collect()
}

/// Round to `decimals` places, halves to even.
#[inline]
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round_ties_even() / scale
}

#[inline]
pub fn round3(value: f64) -> f64 {
    round_to(value, MEAN_DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::{run, table};

    #[test]
    fn test_groups_sorted_and_averaged() {
        let t = table(vec![
            run(1, "B", "7B", 0.8, 2.0, 1.0),
            run(2, "A", "7B", 0.5, 1.0, 1.0),
            run(3, "B", "7B", 0.7, 4.0, 2.0),
        ]);
        let rows = aggregate(&t, &[GroupKey::Model], &[Metric::Quality, Metric::Latency]);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key(GroupKey::Model), Some("A"));
        assert_eq!(rows[1].key(GroupKey::Model), Some("B"));
        assert_eq!(rows[1].mean(Metric::Quality), Measure::Value(0.75));
        assert_eq!(rows[1].mean(Metric::Latency), Measure::Value(3.0));
        assert_eq!(rows[1].runs, 2);
    }

    #[test]
    fn test_missing_values_dropped_from_mean() {
        let mut second = run(2, "A", "7B", 0.0, 1.0, 1.0);
        second.quality = Measure::Missing;
        let t = table(vec![run(1, "A", "7B", 0.9, 1.0, 1.0), second]);

        let rows = aggregate(&t, &[GroupKey::Model], &[Metric::Quality, Metric::Co2]);
        assert_eq!(rows[0].mean(Metric::Quality), Measure::Value(0.9));
        // fixtures leave CO2 missing everywhere
        assert_eq!(rows[0].mean(Metric::Co2), Measure::Missing);
    }

    #[test]
    fn test_runs_missing_a_key_join_no_group() {
        let mut orphan = run(2, "A", "7B", 0.1, 1.0, 1.0);
        orphan.model_size = None;
        let t = table(vec![run(1, "A", "7B", 0.9, 1.0, 1.0), orphan]);

        let by_size = aggregate(&t, &[GroupKey::Model, GroupKey::ModelSize], &[Metric::Quality]);
        assert_eq!(by_size.len(), 1);
        assert_eq!(by_size[0].mean(Metric::Quality), Measure::Value(0.9));

        let by_model = aggregate(&t, &[GroupKey::Model], &[Metric::Quality]);
        assert_eq!(by_model[0].mean(Metric::Quality), Measure::Value(0.5));
    }

    #[test]
    fn test_means_rounded() {
        let t = table(vec![
            run(1, "A", "7B", 0.1, 1.0, 1.0),
            run(2, "A", "7B", 0.2, 1.0, 1.0),
            run(3, "A", "7B", 0.2, 1.0, 1.0),
        ]);
        let rows = aggregate(&t, &[GroupKey::Model], &[Metric::Quality]);
        assert_eq!(rows[0].mean(Metric::Quality), Measure::Value(0.167));

        let coarse = aggregate_with_precision(&t, &[GroupKey::Model], &[Metric::Quality], 2);
        assert_eq!(coarse[0].mean(Metric::Quality), Measure::Value(0.17));

        // exact halves go to the even neighbour
        let tie = table(vec![run(1, "A", "7B", 0.125, 1.0, 1.0), run(2, "A", "7B", 0.0, 1.0, 1.0)]);
        let rows = aggregate(&tie, &[GroupKey::Model], &[Metric::Quality]);
        assert_eq!(rows[0].mean(Metric::Quality), Measure::Value(0.062));
        assert_eq!(round_to(0.375, 2), 0.38);
        assert_eq!(round_to(2.5, 0), 2.0);
    }

    #[test]
    fn test_no_keys_is_one_group() {
        let t = table(vec![run(1, "A", "7B", 0.2, 1.0, 1.0), run(2, "B", "70B", 0.4, 3.0, 1.0)]);
        let rows = aggregate(&t, &[], &[Metric::Latency]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mean(Metric::Latency), Measure::Value(2.0));
    }

    #[test]
    fn test_row_serializes_flat() {
        let t = table(vec![run(12, "A", "7B", 0.5, 1.0, 1.0)]);
        let rows = aggregate(&t, &[GroupKey::TaskCategory], &[Metric::Quality, Metric::Co2]);
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "task_category": "Reasoning & quantitative",
                "quality": 0.5,
                "co2_g": null,
                "runs": 1
            })
        );
    }
}
