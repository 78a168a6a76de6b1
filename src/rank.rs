//! Weighted multi-criteria ranking of models per task category.
//!
//! Runs are first averaged per (task_category, model, model_size). Within each
//! task category, quality, latency and energy means are min-max normalized,
//! latency and energy are inverted (lower is better), and the weighted sum
//! gives the composite score. Scores are not comparable across categories.

use std::cmp::Ordering;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::aggregate::{aggregate, round3, GroupKey};
use crate::record::{Measure, Metric, Table};

/// Slack allowed on the weight total before it counts as above 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.001;

/// Rows shown per category by default.
pub const DEFAULT_TOP: usize = 5;

const RANK_KEYS: [GroupKey; 3] = [GroupKey::TaskCategory, GroupKey::Model, GroupKey::ModelSize];
const RANK_METRICS: [Metric; 3] = [Metric::Quality, Metric::Latency, Metric::Energy];

// ============================================================================
// Weights
// ============================================================================

/// Criteria weights for the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Weights {
    pub quality: f64,
    pub latency: f64,
    pub energy: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            quality: 0.5,
            latency: 0.25,
            energy: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeightError {
    #[error("{name} weight {value} is outside [0, 1]")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("total weight {total:.3} exceeds 1.0")]
    SumExceeded { total: f64 },
}

impl Weights {
    pub fn new(quality: f64, latency: f64, energy: f64) -> Self {
        Self {
            quality,
            latency,
            energy,
        }
    }

    pub fn total(&self) -> f64 {
        self.quality + self.latency + self.energy
    }

    /// Weight left to distribute before the total reaches 1.0.
    pub fn remaining(&self) -> f64 {
        (1.0 - self.total()).max(0.0)
    }

    pub fn validate(&self) -> Result<(), WeightError> {
        for (name, value) in [
            ("quality", self.quality),
            ("latency", self.latency),
            ("energy", self.energy),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(WeightError::OutOfRange { name, value });
            }
        }
        let total = self.total();
        if total > 1.0 + WEIGHT_SUM_TOLERANCE {
            return Err(WeightError::SumExceeded { total });
        }
        Ok(())
    }

    #[inline]
    fn of(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Quality => self.quality,
            Metric::Latency => self.latency,
            Metric::Energy => self.energy,
            Metric::Co2 => 0.0,
        }
    }
}

// ============================================================================
// Scoring
// ============================================================================

/// Aggregated means and composite score for one (category, model, size).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRow {
    pub task_category: String,
    pub model: String,
    pub model_size: String,
    pub quality_mean: Measure,
    pub latency_mean: Measure,
    pub energy_mean: Measure,
    /// `None` when a metric with non-zero weight had no value to normalize.
    pub score: Option<f64>,
}

impl ScoredRow {
    fn mean(&self, metric: Metric) -> Measure {
        match metric {
            Metric::Quality => self.quality_mean,
            Metric::Latency => self.latency_mean,
            Metric::Energy => self.energy_mean,
            Metric::Co2 => Measure::Missing,
        }
    }
}

/// Min-max normalize a column. A column without spread maps every present value
/// to 1.0; missing values stay missing.
pub fn normalize(values: &[Measure], invert: bool) -> Vec<Measure> {
    let present = values.iter().filter_map(Measure::value);
    let (min, max) = present.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });

    if min > max {
        return vec![Measure::Missing; values.len()];
    }
    if max == min {
        return values.iter().map(|v| v.map(|_| 1.0)).collect();
    }

    let span = max - min;
    values
        .iter()
        .map(|v| {
            v.map(|x| {
                let n = (x - min) / span;
                if invert {
                    1.0 - n
                } else {
                    n
                }
            })
        })
        .collect()
}

/// Score every (category, model, size) group. Rows come back in key order.
pub fn score(table: &Table, weights: &Weights) -> Result<Vec<ScoredRow>, WeightError> {
    weights.validate()?;

    let mut rows: Vec<ScoredRow> = aggregate(table, &RANK_KEYS, &RANK_METRICS)
        .into_iter()
        .map(|row| ScoredRow {
            task_category: row.key(GroupKey::TaskCategory).unwrap_or_default().to_string(),
            model: row.key(GroupKey::Model).unwrap_or_default().to_string(),
            model_size: row.key(GroupKey::ModelSize).unwrap_or_default().to_string(),
            quality_mean: row.mean(Metric::Quality),
            latency_mean: row.mean(Metric::Latency),
            energy_mean: row.mean(Metric::Energy),
            score: None,
        })
        .collect();

    // Aggregation sorts by key, so each category is one contiguous run.
    for partition in rows.chunk_by_mut(|a, b| a.task_category == b.task_category) {
        score_partition(partition, weights);
    }

    Ok(rows)
}

fn score_partition(rows: &mut [ScoredRow], weights: &Weights) {
    let mut totals: Vec<Option<f64>> = vec![Some(0.0); rows.len()];

    for metric in RANK_METRICS {
        let weight = weights.of(metric);
        let column: Vec<Measure> = rows.iter().map(|r| r.mean(metric)).collect();
        let normalized = normalize(&column, metric.lower_is_better());

        for (total, n) in totals.iter_mut().zip(normalized) {
            *total = match (*total, n.value()) {
                (Some(t), Some(v)) => Some(t + weight * v),
                (Some(t), None) if weight == 0.0 => Some(t),
                _ => None,
            };
        }
    }

    for (row, total) in rows.iter_mut().zip(totals) {
        row.score = total.map(round3);
    }
}

// ============================================================================
// Ranking
// ============================================================================

/// Rows of one task category, best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRanking {
    pub task_category: String,
    pub rows: Vec<ScoredRow>,
}

impl CategoryRanking {
    /// The recommended model for this category.
    pub fn recommended(&self) -> Option<&ScoredRow> {
        self.rows.first()
    }

    pub fn top(&self, n: usize) -> &[ScoredRow] {
        &self.rows[..n.min(self.rows.len())]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    pub weights: Weights,
    pub categories: Vec<CategoryRanking>,
}

impl Ranking {
    #[cfg(test)]
    pub fn category(&self, label: &str) -> Option<&CategoryRanking> {
        self.categories.iter().find(|c| c.task_category == label)
    }

    /// Every scored row, category by category, best first within each.
    pub fn rows(&self) -> impl Iterator<Item = &ScoredRow> {
        self.categories.iter().flat_map(|c| c.rows.iter())
    }
}

/// Descending by score; unscored rows last. Equal scores keep their order.
fn by_score_desc(a: &ScoredRow, b: &ScoredRow) -> Ordering {
    match (a.score, b.score) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Validate weights, score, and sort each category best first.
pub fn rank(table: &Table, weights: &Weights) -> Result<Ranking, WeightError> {
    let rows = score(table, weights)?;

    let mut categories: Vec<CategoryRanking> = Vec::new();
    for row in rows {
        match categories.last_mut() {
            Some(current) if current.task_category == row.task_category => current.rows.push(row),
            _ => categories.push(CategoryRanking {
                task_category: row.task_category.clone(),
                rows: vec![row],
            }),
        }
    }
    for category in &mut categories {
        category.rows.sort_by(by_score_desc);
    }

    debug!(categories = categories.len(), "ranked models");
    Ok(Ranking {
        weights: *weights,
        categories,
    })
}

// ============================================================================
// CSV export
// ============================================================================

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write ranking to {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("ranking CSV is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// One line of the exported ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RankingRecord {
    task_category: String,
    model: String,
    model_size: String,
    quality_mean: Option<f64>,
    latency_mean: Option<f64>,
    energy_mean: Option<f64>,
    score: Option<f64>,
}

impl From<&ScoredRow> for RankingRecord {
    fn from(row: &ScoredRow) -> Self {
        Self {
            task_category: row.task_category.clone(),
            model: row.model.clone(),
            model_size: row.model_size.clone(),
            quality_mean: row.quality_mean.value(),
            latency_mean: row.latency_mean.value(),
            energy_mean: row.energy_mean.value(),
            score: row.score,
        }
    }
}

#[cfg(test)]
impl From<RankingRecord> for ScoredRow {
    fn from(record: RankingRecord) -> Self {
        Self {
            task_category: record.task_category,
            model: record.model,
            model_size: record.model_size,
            quality_mean: record.quality_mean.into(),
            latency_mean: record.latency_mean.into(),
            energy_mean: record.energy_mean.into(),
            score: record.score,
        }
    }
}

/// Write the ranking as comma-separated UTF-8 with a header row.
pub fn write_ranking_csv<W: Write>(ranking: &Ranking, writer: W) -> Result<usize, ExportError> {
    let mut out = csv::Writer::from_writer(writer);
    let mut written = 0;
    for row in ranking.rows() {
        out.serialize(RankingRecord::from(row))?;
        written += 1;
    }
    if written == 0 {
        // serialize() emits the header lazily; keep it for empty rankings too.
        out.write_record([
            "task_category",
            "model",
            "model_size",
            "quality_mean",
            "latency_mean",
            "energy_mean",
            "score",
        ])?;
    }
    out.flush().map_err(csv::Error::from)?;
    Ok(written)
}

pub fn ranking_csv_string(ranking: &Ranking) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_ranking_csv(ranking, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}

/// Write the ranking CSV to `path`, returning the number of data rows.
pub fn export_ranking(ranking: &Ranking, path: impl AsRef<Path>) -> Result<usize, ExportError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    write_ranking_csv(ranking, file)
}

/// Read back a ranking CSV produced by [`write_ranking_csv`].
#[cfg(test)]
pub fn read_ranking_csv<R: std::io::Read>(reader: R) -> Result<Vec<ScoredRow>, ExportError> {
    let mut input = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for record in input.deserialize::<RankingRecord>() {
        rows.push(record?.into());
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::{run, table};

    #[test]
    fn test_weights_validation() {
        assert!(Weights::default().validate().is_ok());
        assert!(Weights::new(0.5, 0.3, 0.2005).validate().is_ok());
        assert_eq!(
            Weights::new(0.6, 0.3, 0.2).validate(),
            Err(WeightError::SumExceeded { total: 0.6 + 0.3 + 0.2 })
        );
        assert!(matches!(
            Weights::new(-0.1, 0.0, 0.0).validate(),
            Err(WeightError::OutOfRange { name: "quality", .. })
        ));
        assert!(Weights::new(f64::NAN, 0.0, 0.0).validate().is_err());
    }

    #[test]
    fn test_remaining_weight() {
        assert!((Weights::new(0.5, 0.2, 0.1).remaining() - 0.2).abs() < 1e-9);
        assert_eq!(Weights::new(0.5, 0.5, 0.5).remaining(), 0.0);
    }

    #[test]
    fn test_normalize() {
        let values = [Measure::Value(1.0), Measure::Value(3.0), Measure::Missing, Measure::Value(2.0)];
        assert_eq!(
            normalize(&values, false),
            vec![Measure::Value(0.0), Measure::Value(1.0), Measure::Missing, Measure::Value(0.5)]
        );
        assert_eq!(
            normalize(&values, true),
            vec![Measure::Value(1.0), Measure::Value(0.0), Measure::Missing, Measure::Value(0.5)]
        );
    }

    #[test]
    fn test_normalize_degenerate_is_one() {
        let tied = [Measure::Value(2.0), Measure::Value(2.0)];
        assert_eq!(normalize(&tied, false), vec![Measure::Value(1.0); 2]);
        assert_eq!(normalize(&tied, true), vec![Measure::Value(1.0); 2]);
        assert_eq!(normalize(&[Measure::Missing], false), vec![Measure::Missing]);
    }

    #[test]
    fn test_invalid_weights_refused() {
        let t = table(vec![run(1, "A", "7B", 0.8, 1.0, 1.0)]);
        assert!(rank(&t, &Weights::new(0.9, 0.9, 0.0)).is_err());
    }

    #[test]
    fn test_partitions_scored_independently() {
        let t = table(vec![
            run(1, "A", "7B", 0.9, 1.0, 1.0),
            run(2, "B", "7B", 0.1, 1.0, 1.0),
            // a single-option category scores the full weight sum
            run(12, "B", "7B", 0.1, 9.0, 9.0),
        ]);
        let ranking = rank(&t, &Weights::default()).unwrap();

        let easy = ranking.category("Easy factual & rewriting").unwrap();
        assert_eq!(easy.recommended().unwrap().model, "A");
        assert_eq!(easy.rows[0].score, Some(1.0));
        assert_eq!(easy.rows[1].score, Some(0.5));

        let reasoning = ranking.category("Reasoning & quantitative").unwrap();
        assert_eq!(reasoning.rows[0].score, Some(1.0));
    }

    #[test]
    fn test_missing_weighted_metric_ranks_last() {
        let mut no_energy = run(1, "B", "7B", 0.9, 1.0, 0.0);
        no_energy.energy_wh = Measure::Missing;
        let t = table(vec![run(2, "A", "7B", 0.1, 2.0, 2.0), no_energy]);

        let ranking = rank(&t, &Weights::default()).unwrap();
        let rows = &ranking.categories[0].rows;
        assert_eq!(rows[0].model, "A");
        assert_eq!(rows[1].score, None);

        // with the energy weight at zero the gap does not matter
        let ranking = rank(&t, &Weights::new(0.5, 0.5, 0.0)).unwrap();
        assert_eq!(ranking.categories[0].rows[0].model, "B");
        assert_eq!(ranking.categories[0].rows[0].score, Some(1.0));
    }

    #[test]
    fn test_top_is_bounded() {
        let t = table(vec![run(1, "A", "7B", 0.9, 1.0, 1.0), run(2, "B", "7B", 0.8, 1.0, 1.0)]);
        let ranking = rank(&t, &Weights::default()).unwrap();
        assert_eq!(ranking.categories[0].top(5).len(), 2);
        assert_eq!(ranking.categories[0].top(1)[0].model, "A");
    }

    #[test]
    fn test_csv_header_and_empty_ranking() {
        let ranking = rank(&Table::empty(), &Weights::default()).unwrap();
        let text = ranking_csv_string(&ranking).unwrap();
        assert_eq!(
            text.trim_end(),
            "task_category,model,model_size,quality_mean,latency_mean,energy_mean,score"
        );
    }

    #[test]
    fn test_csv_row_format() {
        let t = table(vec![run(26, "A", "7B", 0.9, 1.0, 1.0)]);
        let ranking = rank(&t, &Weights::default()).unwrap();
        let text = ranking_csv_string(&ranking).unwrap();
        let line = text.lines().nth(1).unwrap();
        assert!(line.starts_with("Advanced / creative & multi-step,A,7B,0.9,1.0,1.0,1.0"), "{line}");
    }
}
