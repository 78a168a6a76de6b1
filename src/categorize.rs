//! Task categories derived from the numeric task identifier.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Serialize, Serializer};

/// Coarse task bucket. Declaration order follows the task-id ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskCategory {
    /// Tasks 1-10
    EasyFactual,
    /// Tasks 11-15
    Reasoning,
    /// Tasks 16-20
    Programming,
    /// Tasks 21-25
    HarderKnowledge,
    /// Tasks 26-30
    Advanced,
    /// Anything outside 1-30
    Other,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 6] = [
        Self::EasyFactual,
        Self::Reasoning,
        Self::Programming,
        Self::HarderKnowledge,
        Self::Advanced,
        Self::Other,
    ];

    /// Display label, also used as the grouping value and in exports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::EasyFactual => "Easy factual & rewriting",
            Self::Reasoning => "Reasoning & quantitative",
            Self::Programming => "Programming & debugging",
            Self::HarderKnowledge => "Harder knowledge & reasoning",
            Self::Advanced => "Advanced / creative & multi-step",
            Self::Other => "Other",
        }
    }

    /// Short identifier for command lines and query strings.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::EasyFactual => "easy",
            Self::Reasoning => "reasoning",
            Self::Programming => "programming",
            Self::HarderKnowledge => "harder",
            Self::Advanced => "advanced",
            Self::Other => "other",
        }
    }

    /// Parse a label or slug, case-insensitive.
    pub fn from_str(s: &str) -> Option<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.slug() == wanted || c.label().to_lowercase() == wanted)
    }

    /// Task ids covered by this category. `Other` has no single range.
    pub fn task_range(&self) -> Option<RangeInclusive<i64>> {
        match self {
            Self::EasyFactual => Some(1..=10),
            Self::Reasoning => Some(11..=15),
            Self::Programming => Some(16..=20),
            Self::HarderKnowledge => Some(21..=25),
            Self::Advanced => Some(26..=30),
            Self::Other => None,
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for TaskCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Map a task id to its category. Total over `i64`.
pub fn categorize(task_id: i64) -> TaskCategory {
    match task_id {
        1..=10 => TaskCategory::EasyFactual,
        11..=15 => TaskCategory::Reasoning,
        16..=20 => TaskCategory::Programming,
        21..=25 => TaskCategory::HarderKnowledge,
        26..=30 => TaskCategory::Advanced,
        _ => TaskCategory::Other,
    }
}
