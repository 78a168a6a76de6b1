//! CSV ingestion for benchmark runs.
//!
//! One loader for every producer of the benchmark file. Producers disagree on
//! text encoding, so [`SourceEncoding`] is part of [`LoadOptions`] rather than a
//! constant. Header names are trimmed and lower-cased, then passed through the
//! alias table (`co_g` becomes `co2_g` by default).
//!
//! [`load`] never fails: problems come back as [`Diagnostic`]s next to a table
//! that is empty (fatal problems) or partially populated (schema warnings).

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::categorize::categorize;
use crate::record::{BenchmarkRun, Measure, Table};

/// Minimal header set a complete benchmark file carries.
pub const EXPECTED_COLUMNS: [&str; 9] = [
    "run_id",
    "task_id",
    "task_label",
    "model",
    "model_size",
    "quality",
    "latency_s",
    "energy_wh",
    "co2_g",
];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// ============================================================================
// Options
// ============================================================================

/// Text encoding of a CSV source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceEncoding {
    /// UTF-8 with an optional leading byte-order mark.
    Utf8Sig,
    /// Plain UTF-8; a BOM would end up in the first header name.
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
}

impl SourceEncoding {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "utf-8-sig" | "utf8-sig" => Some(Self::Utf8Sig),
            "utf-8" | "utf8" => Some(Self::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => Some(Self::Latin1),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Utf8Sig => "utf-8-sig",
            Self::Utf8 => "utf-8",
            Self::Latin1 => "latin-1",
        }
    }

    /// Decode raw file bytes into text.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, std::string::FromUtf8Error> {
        match self {
            Self::Utf8Sig => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                String::from_utf8(body.to_vec())
            }
            Self::Utf8 => String::from_utf8(bytes.to_vec()),
            Self::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

/// How to read one CSV source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub delimiter: u8,
    pub quote: u8,
    pub encoding: SourceEncoding,
    /// Header renames applied after normalization, `(from, to)`.
    pub aliases: Vec<(String, String)>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: b';',
            quote: b'"',
            encoding: SourceEncoding::Utf8Sig,
            aliases: vec![("co_g".to_string(), "co2_g".to_string())],
        }
    }
}

impl LoadOptions {
    pub fn with_encoding(self, encoding: SourceEncoding) -> Self {
        Self { encoding, ..self }
    }

    /// Add a header alias. Both sides are normalized like header names.
    pub fn with_alias(mut self, from: &str, to: &str) -> Self {
        self.aliases.push((normalize_header(from), normalize_header(to)));
        self
    }

    fn resolve_header(&self, raw: &str) -> String {
        let name = normalize_header(raw);
        self.aliases
            .iter()
            .find(|(from, _)| *from == name)
            .map(|(_, to)| to.clone())
            .unwrap_or(name)
    }
}

/// Trim and lower-case a header name.
pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase()
}

// ============================================================================
// Errors and diagnostics
// ============================================================================

/// Structural problem in CSV text.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("line {line}: expected {expected} fields, saw {found}")]
    TooManyFields {
        line: u64,
        expected: usize,
        found: usize,
    },
}

/// Why a source could not be loaded at all.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no data file found at {path}")]
    NotFound { path: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not valid {encoding}: {source}")]
    Decode {
        path: String,
        encoding: &'static str,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("error while reading CSV {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ParseError,
    },
}

/// A problem found while loading, returned alongside the table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    /// Nothing could be loaded; the table is empty.
    #[error("{0}")]
    Fatal(String),

    #[error("missing columns in CSV: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("{count} row(s) lack a usable task_id, model or model_size and join no group")]
    UnusableRows { count: usize },

    #[error("{count} row(s) repeat an earlier run_id")]
    DuplicateRunIds { count: usize },
}

impl Diagnostic {
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Output of [`load`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Loaded {
    pub table: Table,
    pub diagnostics: Vec<Diagnostic>,
}

impl Loaded {
    /// True unless a fatal diagnostic was raised.
    pub fn is_ok(&self) -> bool {
        !self.diagnostics.iter().any(Diagnostic::is_fatal)
    }

    fn failed(err: LoadError) -> Self {
        Self {
            table: Table::empty(),
            diagnostics: vec![Diagnostic::Fatal(err.to_string())],
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Load a benchmark CSV. Never fails; see the module docs.
pub fn load(path: impl AsRef<Path>, options: &LoadOptions) -> Loaded {
    let path = path.as_ref();
    match try_load(path, options) {
        Ok(loaded) => {
            info!(
                path = %path.display(),
                encoding = options.encoding.name(),
                rows = loaded.table.len(),
                "loaded benchmark data"
            );
            for diagnostic in &loaded.diagnostics {
                warn!(path = %path.display(), "{diagnostic}");
            }
            loaded
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "benchmark data unavailable");
            Loaded::failed(err)
        }
    }
}

fn try_load(path: &Path, options: &LoadOptions) -> Result<Loaded, LoadError> {
    let display = path.display().to_string();

    let bytes = fs::read(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            LoadError::NotFound { path: display.clone() }
        } else {
            LoadError::Io {
                path: display.clone(),
                source,
            }
        }
    })?;

    let text = options
        .encoding
        .decode(&bytes)
        .map_err(|source| LoadError::Decode {
            path: display.clone(),
            encoding: options.encoding.name(),
            source,
        })?;

    parse_str(&text, options).map_err(|source| LoadError::Parse {
        path: display,
        source,
    })
}

/// Parse already-decoded CSV text.
pub fn parse_str(text: &str, options: &LoadOptions) -> Result<Loaded, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .quote(options.quote)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| options.resolve_header(h))
        .collect();

    // First occurrence wins when a header repeats.
    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, name) in columns.iter().enumerate() {
        index.entry(name.as_str()).or_insert(i);
    }

    let mut runs = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.len() > columns.len() {
            return Err(ParseError::TooManyFields {
                line: record.position().map(|p| p.line()).unwrap_or(0),
                expected: columns.len(),
                found: record.len(),
            });
        }
        // Short rows leave the trailing cells missing.
        let cell = |name: &str| index.get(name).and_then(|&i| record.get(i));
        runs.push(build_run(cell));
    }

    let mut diagnostics = Vec::new();

    let missing: Vec<String> = EXPECTED_COLUMNS
        .iter()
        .filter(|c| !index.contains_key(*c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        diagnostics.push(Diagnostic::MissingColumns(missing));
    }

    let unusable = runs.iter().filter(|r| !r.is_groupable()).count();
    if unusable > 0 {
        diagnostics.push(Diagnostic::UnusableRows { count: unusable });
    }

    let mut seen = HashSet::new();
    let duplicates = runs
        .iter()
        .filter(|r| !r.run_id.is_empty() && !seen.insert(r.run_id.as_str()))
        .count();
    if duplicates > 0 {
        diagnostics.push(Diagnostic::DuplicateRunIds { count: duplicates });
    }

    debug!(columns = ?columns, rows = runs.len(), "parsed benchmark CSV");

    Ok(Loaded {
        table: Table::new(columns, runs),
        diagnostics,
    })
}

fn build_run<'r>(cell: impl Fn(&str) -> Option<&'r str>) -> BenchmarkRun {
    let text = |name: &str| cell(name).unwrap_or("").to_string();
    let ident = |name: &str| cell(name).filter(|v| !v.trim().is_empty()).map(str::to_string);
    let measure = |name: &str| cell(name).map(Measure::parse).unwrap_or_default();

    let task_id = cell("task_id").and_then(parse_task_id);

    BenchmarkRun {
        run_id: text("run_id").trim().to_string(),
        task_id,
        task_label: text("task_label"),
        model: ident("model"),
        model_size: ident("model_size"),
        quality: measure("quality"),
        latency_s: measure("latency_s"),
        energy_wh: measure("energy_wh"),
        co2_g: measure("co2_g"),
        task_category: task_id.map(categorize),
    }
}

/// Integer task ids, also accepting integral floats such as `"5.0"`.
pub fn parse_task_id(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(id) = raw.parse::<i64>() {
        return Some(id);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Some(v as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::TaskCategory;

    const HEADER: &str = "run_id;task_id;task_label;model;model_size;quality;latency_s;energy_wh;co2_g";

    #[test]
    fn test_parse_complete_file() {
        let text = format!("{HEADER}\nr1;5;\"Summarise; briefly\";A;7B;0.8;2.0;1.0;0.3\n");
        let loaded = parse_str(&text, &LoadOptions::default()).unwrap();

        assert!(loaded.diagnostics.is_empty());
        assert_eq!(loaded.table.len(), 1);
        let run = &loaded.table.runs[0];
        assert_eq!(run.task_label, "Summarise; briefly");
        assert_eq!(run.task_category, Some(TaskCategory::EasyFactual));
        assert_eq!(run.co2_g, Measure::Value(0.3));
    }

    #[test]
    fn test_headers_normalized_and_aliased() {
        let text = " Run_ID ;TASK_ID;task_label;Model;model_size;quality;latency_s;energy_wh; CO_G \n\
                    r1;12;x;A;7B;0.5;1;1;0.7\n";
        let loaded = parse_str(text, &LoadOptions::default()).unwrap();

        assert!(loaded.diagnostics.is_empty(), "{:?}", loaded.diagnostics);
        assert!(loaded.table.has_column("co2_g"));
        assert!(!loaded.table.has_column("co_g"));
        assert_eq!(loaded.table.runs[0].co2_g, Measure::Value(0.7));
    }

    #[test]
    fn test_missing_columns_reported_not_fatal() {
        let text = "run_id;task_id;model;model_size;quality\nr1;3;A;7B;0.9\n";
        let loaded = parse_str(text, &LoadOptions::default()).unwrap();

        assert!(loaded.is_ok());
        assert_eq!(loaded.table.len(), 1);
        assert_eq!(
            loaded.diagnostics,
            vec![Diagnostic::MissingColumns(vec![
                "task_label".into(),
                "latency_s".into(),
                "energy_wh".into(),
                "co2_g".into(),
            ])]
        );
        assert!(loaded.table.runs[0].latency_s.is_missing());
    }

    #[test]
    fn test_bad_cells_become_missing() {
        let text = format!("{HEADER}\nr1;abc;x;;7B;oops;;1.0;\n");
        let loaded = parse_str(&text, &LoadOptions::default()).unwrap();
        let run = &loaded.table.runs[0];

        assert_eq!(run.task_id, None);
        assert_eq!(run.task_category, None);
        assert_eq!(run.model, None);
        assert!(run.quality.is_missing());
        assert!(run.latency_s.is_missing());
        assert_eq!(run.energy_wh, Measure::Value(1.0));
        assert!(loaded.diagnostics.contains(&Diagnostic::UnusableRows { count: 1 }));
    }

    #[test]
    fn test_duplicate_run_ids_reported() {
        let text = format!("{HEADER}\nr1;1;x;A;7B;1;1;1;1\nr1;2;x;A;7B;1;1;1;1\nr2;3;x;A;7B;1;1;1;1\n");
        let loaded = parse_str(&text, &LoadOptions::default()).unwrap();

        assert_eq!(loaded.table.len(), 3);
        assert_eq!(loaded.diagnostics, vec![Diagnostic::DuplicateRunIds { count: 1 }]);
    }

    #[test]
    fn test_short_row_padded_long_row_rejected() {
        let short = format!("{HEADER}\nr1;1;x;A;7B;0.5\n");
        let loaded = parse_str(&short, &LoadOptions::default()).unwrap();
        assert!(loaded.table.runs[0].energy_wh.is_missing());

        let long = format!("{HEADER}\nr1;1;x;A;7B;0.5;1;1;1;extra\n");
        assert!(matches!(
            parse_str(&long, &LoadOptions::default()),
            Err(ParseError::TooManyFields { expected: 9, found: 10, .. })
        ));
    }

    #[test]
    fn test_task_id_forms() {
        assert_eq!(parse_task_id("7"), Some(7));
        assert_eq!(parse_task_id(" 7.0 "), Some(7));
        assert_eq!(parse_task_id("-2"), Some(-2));
        assert_eq!(parse_task_id("7.5"), None);
        assert_eq!(parse_task_id("seven"), None);
    }

    #[test]
    fn test_encodings() {
        let bom = b"\xEF\xBB\xBFrun_id";
        assert_eq!(SourceEncoding::Utf8Sig.decode(bom).unwrap(), "run_id");
        assert_eq!(SourceEncoding::Utf8.decode(bom).unwrap(), "\u{feff}run_id");

        let latin = b"mod\xE8le";
        assert!(SourceEncoding::Utf8Sig.decode(latin).is_err());
        assert_eq!(SourceEncoding::Latin1.decode(latin).unwrap(), "modèle");
    }

    #[test]
    fn test_encoding_names_round_trip() {
        for encoding in [SourceEncoding::Utf8Sig, SourceEncoding::Utf8, SourceEncoding::Latin1] {
            assert_eq!(SourceEncoding::from_str(encoding.name()), Some(encoding));
        }
        assert_eq!(SourceEncoding::from_str("ISO_8859_1"), Some(SourceEncoding::Latin1));
        assert_eq!(SourceEncoding::from_str("cp1252"), None);
    }

    #[test]
    fn test_extra_alias() {
        let options = LoadOptions::default().with_alias("Score", "quality");
        let text = "run_id;task_id;task_label;model;model_size;score;latency_s;energy_wh;co2_g\n\
                    r1;1;x;A;7B;0.4;1;1;1\n";
        let loaded = parse_str(text, &options).unwrap();
        assert_eq!(loaded.table.runs[0].quality, Measure::Value(0.4));
    }
}
