//! LLM Benchmark Dashboard Engine
//!
//! Loads a CSV of benchmark runs (quality, latency, energy, CO2 per run),
//! filters it by model size, task category and model, prints grouped
//! averages, and ranks models per task category with a weighted score.

mod aggregate;
mod cache;
mod categorize;
mod cli;
mod explore;
mod filter;
mod loader;
mod rank;
mod record;
mod server;


use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use aggregate::{aggregate, GroupKey};
use cli::{format_measure, format_score, Cli};
use explore::explore;
use filter::{available_options, filter, resolve, Selection};
use loader::{load, Diagnostic};
use rank::{export_ranking, rank, Ranking};
use record::{Metric, Table};

fn main() -> ExitCode {
    let args = Cli::parse();
    init_tracing(args.log_level.as_deref());

    if args.serve {
        return match server::run_server(&args, args.port) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("server failed: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let loaded = load(&args.data, &args.to_load_options());
    print_diagnostics(&loaded.diagnostics);
    if !loaded.is_ok() {
        println!("No data available. Check {}.", args.data.display());
        return ExitCode::FAILURE;
    }

    let selection = resolve(&loaded.table, &args.to_request());
    let filtered = filter(&loaded.table, &selection);
    info!(rows = filtered.len(), total = loaded.table.len(), "applied filters");

    if args.options {
        print_options(&loaded.table, &selection);
        return ExitCode::SUCCESS;
    }

    if args.rank || args.export.is_some() {
        return run_ranking(&args, &filtered);
    }

    if args.explore {
        run_exploration(&args, &filtered);
    } else {
        run_overview(&args, &filtered);
    }
    ExitCode::SUCCESS
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        let tag = if diagnostic.is_fatal() { "ERROR" } else { "WARN" };
        println!("[{}] {}", tag, diagnostic);
    }
}

fn print_options(table: &Table, selection: &Selection) {
    let options = available_options(table, Some(&selection.sizes), Some(&selection.categories));

    println!("=== Filter Options ===\n");
    println!("Model sizes:");
    for size in &options.sizes {
        let mark = if selection.sizes.contains(size) { "x" } else { " " };
        println!("  [{}] {}", mark, size);
    }
    println!("Task categories (given sizes):");
    for category in &options.categories {
        let mark = if selection.categories.contains(category) { "x" } else { " " };
        let tasks = category
            .task_range()
            .map(|r| format!(", tasks {}-{}", r.start(), r.end()))
            .unwrap_or_default();
        println!("  [{}] {} ({}{})", mark, category, category.slug(), tasks);
    }
    println!("Models (given sizes and categories):");
    for model in &options.models {
        let mark = if selection.models.contains(model) { "x" } else { " " };
        println!("  [{}] {}", mark, model);
    }
}

fn run_overview(args: &Cli, filtered: &Table) {
    if filtered.is_empty() {
        println!("No data or task categories available for analysis.");
        return;
    }

    let keys = args.group_keys(&[GroupKey::TaskCategory, GroupKey::ModelSize]);
    // Metrics whose column is absent from the file are already reported.
    let metrics: Vec<Metric> = args
        .metric_list()
        .into_iter()
        .filter(|m| filtered.has_column(m.column()))
        .collect();
    let rows = aggregate(filtered, &keys, &metrics);

    println!("=== Averages ({} runs, {} groups) ===\n", filtered.len(), rows.len());
    for row in &rows {
        let label: Vec<&str> = row.keys.iter().map(|(_, v)| v.as_str()).collect();
        println!("{}  ({} runs)", label.join(" | "), row.runs);
        for (metric, mean) in &row.means {
            println!("  {:<10} {}", metric.column(), format_measure(*metric, *mean));
        }
    }
}

fn run_exploration(args: &Cli, filtered: &Table) {
    if filtered.is_empty() {
        println!("No data matches the selected filters.");
        return;
    }

    let view = explore(filtered);

    println!("=== Exploration ({} runs) ===\n", filtered.len());
    if args.group_by.is_some() {
        let keys = args.group_keys(&[GroupKey::Model, GroupKey::ModelSize]);
        let rows = aggregate(filtered, &keys, &args.metric_list());
        println!("--- Custom Grouping ---");
        for row in &rows {
            let label: Vec<&str> = row.keys.iter().map(|(_, v)| v.as_str()).collect();
            let means: Vec<String> = row
                .means
                .iter()
                .map(|(m, v)| format!("{}={}", m.column(), format_measure(*m, *v)))
                .collect();
            println!("  {:<32} {}", label.join(" | "), means.join("  "));
        }
        println!();
    }

    for (title, series) in [
        ("Quality vs Energy", &view.quality_vs_energy),
        ("Quality vs CO2", &view.quality_vs_co2),
    ] {
        println!("--- {} ---", title);
        if series.is_empty() {
            println!("  (no complete points)");
        }
        for line in series.iter() {
            println!("  {}:", line.model_size);
            for point in &line.points {
                println!(
                    "    {:<24} {:>8}  {:>12}",
                    point.model,
                    format!("{:.3}", point.x),
                    format!("{:.3} {}", point.y, line.y.unit())
                );
            }
        }
        println!();
    }

    println!("--- Average Latency by Model Size ---");
    for row in &view.latency_by_size {
        println!(
            "  {:<8} {}",
            row.key(GroupKey::ModelSize).unwrap_or_default(),
            format_measure(Metric::Latency, row.mean(Metric::Latency))
        );
    }
}

fn run_ranking(args: &Cli, filtered: &Table) -> ExitCode {
    let weights = args.to_weights();
    let ranking = match rank(filtered, &weights) {
        Ok(ranking) => ranking,
        Err(e) => {
            println!("[ERROR] {}. Adjust the weights.", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(path) = &args.export {
        match export_ranking(&ranking, path) {
            Ok(rows) => println!("Exported {} ranking rows to {}", rows, path.display()),
            Err(e) => {
                println!("[ERROR] {}", e);
                return ExitCode::FAILURE;
            }
        }
        if !args.rank {
            return ExitCode::SUCCESS;
        }
    }

    print_ranking(&ranking, args.top);
    ExitCode::SUCCESS
}

fn print_ranking(ranking: &Ranking, top: usize) {
    let w = ranking.weights;
    println!("=== Best Model per Task Category ===\n");
    println!(
        "Weights: quality={:.2} latency={:.2} energy={:.2} (total {:.2} / 1.0, remaining {:.2})\n",
        w.quality,
        w.latency,
        w.energy,
        w.total(),
        w.remaining()
    );

    if ranking.categories.is_empty() {
        println!("No scorable groups.");
        return;
    }

    for category in &ranking.categories {
        println!("--- {} ---", category.task_category);
        if let Some(best) = category.recommended() {
            println!(
                "  Recommended: {} ({})  score {}",
                best.model,
                best.model_size,
                format_score(best.score)
            );
            println!(
                "  Quality: {}  |  Latency: {}  |  Energy: {}",
                format_measure(Metric::Quality, best.quality_mean),
                format_measure(Metric::Latency, best.latency_mean),
                format_measure(Metric::Energy, best.energy_mean)
            );
        }
        println!("  Top {}:", top.min(category.rows.len()));
        for (i, row) in category.top(top).iter().enumerate() {
            println!(
                "    {}. {:<24} {:<6} {}",
                i + 1,
                row.model,
                row.model_size,
                format_score(row.score)
            );
        }
        println!();
    }
}
