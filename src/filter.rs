//! Conjunctive selection over model size, task category and model.
//!
//! Filtering itself is a plain AND of three set-membership tests against the
//! full table. The dependency order (size, then category, then model) only
//! shapes which options are offered: see [`available_options`] and [`resolve`].

use std::collections::BTreeSet;

use serde::Serialize;

use crate::categorize::TaskCategory;
use crate::record::{BenchmarkRun, Table};

/// Allowed values per dimension. An empty set selects nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub sizes: BTreeSet<String>,
    pub categories: BTreeSet<TaskCategory>,
    pub models: BTreeSet<String>,
}

impl Selection {
    /// Every value present in the table.
    #[cfg(test)]
    pub fn all(table: &Table) -> Self {
        let options = available_options(table, None, None);
        Self {
            sizes: options.sizes.into_iter().collect(),
            categories: options.categories.into_iter().collect(),
            models: options.models.into_iter().collect(),
        }
    }

    /// Nothing selected.
    #[cfg(test)]
    pub fn none() -> Self {
        Self::default()
    }

    #[inline]
    pub fn matches(&self, run: &BenchmarkRun) -> bool {
        run.model_size.as_ref().is_some_and(|s| self.sizes.contains(s))
            && run.task_category.is_some_and(|c| self.categories.contains(&c))
            && run.model.as_ref().is_some_and(|m| self.models.contains(m))
    }
}

/// Rows matching all three selections, in original order.
pub fn filter(table: &Table, selection: &Selection) -> Table {
    let runs = table
        .runs
        .iter()
        .filter(|run| selection.matches(run))
        .cloned()
        .collect();
    table.with_runs(runs)
}

// ============================================================================
// Option lists
// ============================================================================

/// Choices to offer for each dimension, sorted as the dashboard lists them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub sizes: Vec<String>,
    /// Sorted by label.
    pub categories: Vec<TaskCategory>,
    pub models: Vec<String>,
}

/// Derive option lists in dependency order.
///
/// Categories are restricted to rows whose size is in `sizes`; models to rows
/// matching both `sizes` and `categories`. `None` leaves a dimension open.
pub fn available_options(
    table: &Table,
    sizes: Option<&BTreeSet<String>>,
    categories: Option<&BTreeSet<TaskCategory>>,
) -> FilterOptions {
    let size_ok = |run: &BenchmarkRun| match (sizes, &run.model_size) {
        (None, _) => true,
        (Some(allowed), Some(size)) => allowed.contains(size),
        (Some(_), None) => false,
    };
    let category_ok = |run: &BenchmarkRun| match (categories, run.task_category) {
        (None, _) => true,
        (Some(allowed), Some(category)) => allowed.contains(&category),
        (Some(_), None) => false,
    };

    let all_sizes: BTreeSet<&String> = table.runs.iter().filter_map(|r| r.model_size.as_ref()).collect();

    let mut offered_categories: Vec<TaskCategory> = table
        .runs
        .iter()
        .filter(|&r| size_ok(r))
        .filter_map(|r| r.task_category)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    offered_categories.sort_by_key(|c| c.label());

    let offered_models: BTreeSet<&String> = table
        .runs
        .iter()
        .filter(|&r| size_ok(r) && category_ok(r))
        .filter_map(|r| r.model.as_ref())
        .collect();

    FilterOptions {
        sizes: all_sizes.into_iter().cloned().collect(),
        categories: offered_categories,
        models: offered_models.into_iter().cloned().collect(),
    }
}

/// A selection as requested by a caller. `None` means "everything offered",
/// which is what the dashboard widgets default to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionRequest {
    pub sizes: Option<Vec<String>>,
    pub categories: Option<Vec<TaskCategory>>,
    pub models: Option<Vec<String>>,
}

/// Turn a request into a concrete selection, filling open dimensions with the
/// options offered given the earlier dimensions.
pub fn resolve(table: &Table, request: &SelectionRequest) -> Selection {
    let sizes: BTreeSet<String> = match &request.sizes {
        Some(explicit) => explicit.iter().cloned().collect(),
        None => available_options(table, None, None).sizes.into_iter().collect(),
    };

    let categories: BTreeSet<TaskCategory> = match &request.categories {
        Some(explicit) => explicit.iter().copied().collect(),
        None => available_options(table, Some(&sizes), None)
            .categories
            .into_iter()
            .collect(),
    };

    let models: BTreeSet<String> = match &request.models {
        Some(explicit) => explicit.iter().cloned().collect(),
        None => available_options(table, Some(&sizes), Some(&categories))
            .models
            .into_iter()
            .collect(),
    };

    Selection {
        sizes,
        categories,
        models,
    }
}
