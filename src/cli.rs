//! Command-line interface for the benchmark dashboard engine.
//!
//! Parameters are organized into categories:
//!
//! ## Data Source
//! - `--data`: benchmark CSV (or `COMPARIA_DATA`)
//! - `--encoding`: `utf-8-sig`, `utf-8` or `latin-1`
//! - `--delimiter`, `--alias`: CSV dialect and extra header renames
//!
//! ## Filters
//! - `--size`, `--category`, `--model`: comma-separated selections.
//!   Omitted means everything offered; an empty string selects nothing.
//!
//! ## Aggregation
//! - `--group-by`, `--metrics`: grouping columns and averaged metrics
//!
//! ## Ranking
//! - `--w-quality`, `--w-latency`, `--w-energy`: criteria weights (sum <= 1)
//! - `--top`: rows shown per category

use std::path::PathBuf;

use clap::Parser;
use tracing::warn;

use crate::aggregate::GroupKey;
use crate::categorize::TaskCategory;
use crate::filter::SelectionRequest;
use crate::loader::{LoadOptions, SourceEncoding};
use crate::rank::{Weights, DEFAULT_TOP};
use crate::record::{Measure, Metric};

#[derive(Parser, Debug)]
#[command(name = "comparia")]
#[command(author, version, about = "Aggregate LLM benchmark runs and rank models per task category")]
pub struct Cli {
    // =========================================================================
    // Data Source
    // =========================================================================

    /// Benchmark CSV file
    #[arg(long, env = "COMPARIA_DATA", default_value = "app/data/data.csv", help_heading = "Data Source")]
    pub data: PathBuf,

    /// Text encoding: utf-8-sig, utf-8 or latin-1
    #[arg(long, default_value = "utf-8-sig", help_heading = "Data Source")]
    pub encoding: String,

    /// Field delimiter
    #[arg(long, default_value = ";", help_heading = "Data Source")]
    pub delimiter: char,

    /// Extra header alias as from=to (repeatable; co_g=co2_g is always on)
    #[arg(long, help_heading = "Data Source")]
    pub alias: Vec<String>,

    // =========================================================================
    // Filters
    // =========================================================================

    /// Model sizes to keep (comma-separated)
    #[arg(long, help_heading = "Filters")]
    pub size: Option<String>,

    /// Task categories to keep, by label or slug (easy, reasoning, programming,
    /// harder, advanced, other)
    #[arg(long, help_heading = "Filters")]
    pub category: Option<String>,

    /// Models to keep (comma-separated)
    #[arg(long, help_heading = "Filters")]
    pub model: Option<String>,

    // =========================================================================
    // Aggregation
    // =========================================================================

    /// Group-by columns: task_category, model, model_size
    #[arg(long, help_heading = "Aggregation")]
    pub group_by: Option<String>,

    /// Metrics to average: quality, latency_s, energy_wh, co2_g
    #[arg(long, default_value = "quality,latency_s,energy_wh,co2_g", help_heading = "Aggregation")]
    pub metrics: String,

    // =========================================================================
    // Ranking
    // =========================================================================

    /// Quality weight [0, 1]
    #[arg(long, default_value = "0.5", help_heading = "Ranking")]
    pub w_quality: f64,

    /// Latency weight [0, 1]
    #[arg(long, default_value = "0.25", help_heading = "Ranking")]
    pub w_latency: f64,

    /// Energy weight [0, 1]
    #[arg(long, default_value = "0.25", help_heading = "Ranking")]
    pub w_energy: f64,

    /// Models listed per task category
    #[arg(long, default_value_t = DEFAULT_TOP, help_heading = "Ranking")]
    pub top: usize,

    // =========================================================================
    // Modes
    // =========================================================================

    /// Exploration view: per-model means and quality trade-offs
    #[arg(long, default_value = "false", help_heading = "Modes")]
    pub explore: bool,

    /// Print the filter options offered for the current selection
    #[arg(long, default_value = "false", help_heading = "Modes")]
    pub options: bool,

    /// Rank models per task category
    #[arg(long, default_value = "false", help_heading = "Modes")]
    pub rank: bool,

    /// Write the full ranking as CSV to this path
    #[arg(long, help_heading = "Modes")]
    pub export: Option<PathBuf>,

    /// Serve the JSON API instead of printing
    #[arg(long, default_value = "false", help_heading = "Modes")]
    pub serve: bool,

    /// Port for --serve
    #[arg(long, default_value = "8501", help_heading = "Modes")]
    pub port: u16,

    /// Log filter (overrides RUST_LOG), e.g. "debug" or "comparia=trace"
    #[arg(long, help_heading = "Modes")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Build loader options from the data-source flags.
    pub fn to_load_options(&self) -> LoadOptions {
        let encoding = SourceEncoding::from_str(&self.encoding).unwrap_or_else(|| {
            warn!(encoding = %self.encoding, "unknown encoding, using utf-8-sig");
            SourceEncoding::Utf8Sig
        });

        let delimiter = u8::try_from(self.delimiter).unwrap_or_else(|_| {
            warn!(delimiter = %self.delimiter, "delimiter must be a single byte, using ';'");
            b';'
        });

        let mut options = LoadOptions {
            delimiter,
            ..LoadOptions::default().with_encoding(encoding)
        };
        for alias in &self.alias {
            match alias.split_once('=') {
                Some((from, to)) if !from.trim().is_empty() && !to.trim().is_empty() => {
                    options = options.with_alias(from, to);
                }
                _ => warn!(alias = %alias, "ignoring alias, expected from=to"),
            }
        }
        options
    }

    pub fn to_request(&self) -> SelectionRequest {
        SelectionRequest {
            sizes: self.size.as_deref().map(split_list),
            categories: self.category.as_deref().map(|s| parse_categories(&split_list(s))),
            models: self.model.as_deref().map(split_list),
        }
    }

    pub fn to_weights(&self) -> Weights {
        Weights::new(self.w_quality, self.w_latency, self.w_energy)
    }

    /// Group keys, or `default` when `--group-by` is absent.
    pub fn group_keys(&self, default: &[GroupKey]) -> Vec<GroupKey> {
        match &self.group_by {
            Some(list) => split_list(list)
                .iter()
                .filter_map(|name| {
                    let key = GroupKey::from_str(name);
                    if key.is_none() {
                        warn!(column = %name, "ignoring unknown group-by column");
                    }
                    key
                })
                .collect(),
            None => default.to_vec(),
        }
    }

    pub fn metric_list(&self) -> Vec<Metric> {
        split_list(&self.metrics)
            .iter()
            .filter_map(|name| {
                let metric = Metric::from_str(name);
                if metric.is_none() {
                    warn!(metric = %name, "ignoring unknown metric");
                }
                metric
            })
            .collect()
    }
}

/// Split a comma-separated list, dropping blanks. `""` yields an empty list.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse category labels or slugs; unknown names are logged and skipped.
pub fn parse_categories(names: &[String]) -> Vec<TaskCategory> {
    names
        .iter()
        .filter_map(|name| {
            let category = TaskCategory::from_str(name);
            if category.is_none() {
                warn!(category = %name, "ignoring unknown task category");
            }
            category
        })
        .collect()
}

/// Format a measured value with its unit.
pub fn format_measure(metric: Metric, value: Measure) -> String {
    match value.value() {
        None => "n/a".to_string(),
        Some(v) => match metric {
            Metric::Quality => format!("{:.3}", v),
            Metric::Latency => format!("{:.2} s", v),
            Metric::Energy => format!("{:.3} Wh", v),
            Metric::Co2 => format!("{:.3} g", v),
        },
    }
}

/// Format a composite score.
pub fn format_score(score: Option<f64>) -> String {
    match score {
        Some(s) => format!("{:.3}", s),
        None => "n/a".to_string(),
    }
}
