//! Exploration views over filtered runs: quality trade-off series and latency
//! per model size.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregate::{aggregate, aggregate_with_precision, AggregateRow, GroupKey};
use crate::record::{Metric, Table};

/// Latency per size is shown with coarser rounding than the other tables.
pub const LATENCY_BY_SIZE_DECIMALS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeoffPoint {
    pub model: String,
    pub x: f64,
    pub y: f64,
}

/// One line of a trade-off chart: the models of one size, ordered by `x`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeoffSeries {
    pub model_size: String,
    pub x: Metric,
    pub y: Metric,
    pub points: Vec<TradeoffPoint>,
}

/// Build one series per model size from per-(model, size) means. Rows lacking
/// either key or either mean are skipped.
pub fn tradeoff_series(rows: &[AggregateRow], x: Metric, y: Metric) -> Vec<TradeoffSeries> {
    let mut by_size: BTreeMap<&str, Vec<TradeoffPoint>> = BTreeMap::new();

    for row in rows {
        let (Some(model), Some(size)) = (row.key(GroupKey::Model), row.key(GroupKey::ModelSize)) else {
            continue;
        };
        let (Some(xv), Some(yv)) = (row.mean(x).value(), row.mean(y).value()) else {
            continue;
        };
        by_size.entry(size).or_default().push(TradeoffPoint {
            model: model.to_string(),
            x: xv,
            y: yv,
        });
    }

    by_size
        .into_iter()
        .map(|(size, mut points)| {
            points.sort_by(|a, b| a.x.total_cmp(&b.x));
            TradeoffSeries {
                model_size: size.to_string(),
                x,
                y,
                points,
            }
        })
        .collect()
}

/// Everything the exploration view shows for one filtered table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exploration {
    pub by_model: Vec<AggregateRow>,
    pub quality_vs_energy: Vec<TradeoffSeries>,
    pub quality_vs_co2: Vec<TradeoffSeries>,
    pub latency_by_size: Vec<AggregateRow>,
}

pub fn explore(table: &Table) -> Exploration {
    let by_model = aggregate(table, &[GroupKey::Model, GroupKey::ModelSize], &Metric::ALL);
    let quality_vs_energy = tradeoff_series(&by_model, Metric::Quality, Metric::Energy);
    let quality_vs_co2 = tradeoff_series(&by_model, Metric::Quality, Metric::Co2);
    let latency_by_size = aggregate_with_precision(
        table,
        &[GroupKey::ModelSize],
        &[Metric::Latency],
        LATENCY_BY_SIZE_DECIMALS,
    );

    Exploration {
        by_model,
        quality_vs_energy,
        quality_vs_co2,
        latency_by_size,
    }
}
