//! Simple HTTP server exposing the engine as JSON.
//!
//! A browser front-end drives filters and weights through query strings and
//! renders the returned tables and series. Requests are handled one at a time;
//! the loaded table is shared through a [`TableCache`], so editing the data
//! file is picked up on the next request.
//!
//! Selections use repeated keys (`size=7B&size=70B`). An absent key means
//! "everything offered"; a key with an empty value (`size=`) selects nothing.

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::aggregate::{aggregate, GroupKey};
use crate::cache::TableCache;
use crate::cli::{parse_categories, split_list, Cli};
use crate::explore::explore;
use crate::filter::{available_options, filter, resolve, SelectionRequest};
use crate::loader::{LoadOptions, Loaded};
use crate::rank::{rank, ranking_csv_string, Weights};
use crate::record::{Metric, Table};

/// Everything a request needs besides its query string.
pub struct ServerState {
    cache: TableCache,
    data: PathBuf,
    options: LoadOptions,
    weights: Weights,
    top: usize,
}

impl ServerState {
    pub fn new(data: PathBuf, options: LoadOptions, weights: Weights, top: usize) -> Self {
        Self {
            cache: TableCache::new(),
            data,
            options,
            weights,
            top,
        }
    }

    pub fn from_cli(args: &Cli) -> Self {
        Self::new(args.data.clone(), args.to_load_options(), args.to_weights(), args.top)
    }

    fn loaded(&mut self) -> Arc<Loaded> {
        if self.cache.is_empty() {
            info!(path = %self.data.display(), "first load of benchmark data");
        }
        self.cache.get_or_load(&self.data, &self.options)
    }
}

/// Run the HTTP server on the specified port.
pub fn run_server(args: &Cli, port: u16) -> io::Result<()> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr)?;

    println!("=== ComparIA Benchmark API ===");
    println!("Server running at: http://{}", addr);
    println!("Data source:       {}", args.data.display());
    println!("Press Ctrl+C to stop\n");

    let mut state = ServerState::from_cli(args);
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => handle_connection(stream, &mut state),
            Err(e) => warn!("connection error: {}", e),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, state: &mut ServerState) {
    let mut buffer = [0; 4096];
    let n = match stream.read(&mut buffer) {
        Ok(n) => n,
        Err(e) => {
            debug!("read failed: {}", e);
            return;
        }
    };

    let request = String::from_utf8_lossy(&buffer[..n]);
    let first_line = request.lines().next().unwrap_or("");
    let response = route(first_line, state);
    info!(request = %first_line, status = response.status, "handled request");

    let _ = stream.write_all(response.to_http().as_bytes());
    let _ = stream.flush();
}

// ============================================================================
// Routing
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    fn json(status: u16, value: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string(),
        }
    }

    fn text(status: u16, content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    pub fn to_http(&self) -> String {
        let status_text = match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            500 => "Internal Server Error",
            _ => "Unknown",
        };

        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n{}",
            self.status, status_text, self.content_type, self.body.len(), self.body
        )
    }
}

/// Dispatch one request line such as `GET /api/ranking?w_quality=1 HTTP/1.1`.
pub fn route(request_line: &str, state: &mut ServerState) -> Response {
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let target = parts.next().unwrap_or("/");

    if method != "GET" {
        return Response::text(405, "text/plain", "Method Not Allowed");
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Query::parse(query)),
        None => (target, Query::default()),
    };

    match path {
        "/" | "/index" => serve_index(),
        "/api/options" => serve_options(&query, state),
        "/api/overview" => serve_overview(&query, state),
        "/api/explore" => serve_explore(&query, state),
        "/api/ranking" => serve_ranking(&query, state),
        "/api/ranking.csv" => serve_ranking_csv(&query, state),
        "/api/reload" => serve_reload(state),
        _ => Response::text(404, "text/plain", "Not Found"),
    }
}

fn serve_index() -> Response {
    Response::text(
        200,
        "text/plain",
        "ComparIA benchmark API\n\
         GET /api/options     ?size=&category=\n\
         GET /api/overview    ?size=&category=&model=&group_by=&metric=\n\
         GET /api/explore     ?size=&category=&model=\n\
         GET /api/ranking     ?size=&category=&model=&w_quality=&w_latency=&w_energy=&top=\n\
         GET /api/ranking.csv ?size=&category=&model=&w_quality=&w_latency=&w_energy=\n\
         GET /api/reload\n",
    )
}

fn diagnostics_json(loaded: &Loaded) -> Value {
    json!(loaded
        .diagnostics
        .iter()
        .map(|d| json!({ "fatal": d.is_fatal(), "message": d.to_string() }))
        .collect::<Vec<_>>())
}

/// Load (through the cache) and apply the query's selection.
fn filtered(query: &Query, state: &mut ServerState) -> (Arc<Loaded>, Table) {
    let loaded = state.loaded();
    let selection = resolve(&loaded.table, &query.selection_request());
    let table = filter(&loaded.table, &selection);
    (loaded, table)
}

fn serve_options(query: &Query, state: &mut ServerState) -> Response {
    let loaded = state.loaded();
    let selection = resolve(&loaded.table, &query.selection_request());
    let options = available_options(&loaded.table, Some(&selection.sizes), Some(&selection.categories));

    Response::json(
        200,
        json!({
            "options": options,
            "selected": {
                "sizes": selection.sizes,
                "categories": selection.categories.iter().map(|c| c.label()).collect::<Vec<_>>(),
                "models": selection.models,
            },
            "diagnostics": diagnostics_json(&loaded),
        }),
    )
}

fn serve_overview(query: &Query, state: &mut ServerState) -> Response {
    let (loaded, table) = filtered(query, state);

    let keys: Vec<GroupKey> = match query.list("group_by") {
        Some(names) => names.iter().filter_map(|n| GroupKey::from_str(n)).collect(),
        None => vec![GroupKey::TaskCategory, GroupKey::ModelSize],
    };
    let metrics: Vec<Metric> = match query.list("metric") {
        Some(names) => names.iter().filter_map(|n| Metric::from_str(n)).collect(),
        None => Metric::ALL.to_vec(),
    };
    let rows = aggregate(&table, &keys, &metrics);

    Response::json(
        200,
        json!({
            "runs": table.len(),
            "groups": rows,
            "diagnostics": diagnostics_json(&loaded),
        }),
    )
}

fn serve_explore(query: &Query, state: &mut ServerState) -> Response {
    let (loaded, table) = filtered(query, state);
    Response::json(
        200,
        json!({
            "runs": table.len(),
            "exploration": explore(&table),
            "diagnostics": diagnostics_json(&loaded),
        }),
    )
}

fn weights_from(query: &Query, defaults: Weights) -> Weights {
    Weights::new(
        query.parse_value("w_quality").unwrap_or(defaults.quality),
        query.parse_value("w_latency").unwrap_or(defaults.latency),
        query.parse_value("w_energy").unwrap_or(defaults.energy),
    )
}

fn serve_ranking(query: &Query, state: &mut ServerState) -> Response {
    let weights = weights_from(query, state.weights);
    let top = query.parse_value("top").unwrap_or(state.top);
    let (loaded, table) = filtered(query, state);

    let ranking = match rank(&table, &weights) {
        Ok(ranking) => ranking,
        Err(e) => return Response::json(400, json!({ "error": e.to_string() })),
    };

    let categories: Vec<Value> = ranking
        .categories
        .iter()
        .map(|c| {
            json!({
                "task_category": c.task_category,
                "recommended": c.recommended(),
                "top": c.top(top),
                "rows": c.rows.len(),
            })
        })
        .collect();

    Response::json(
        200,
        json!({
            "weights": weights,
            "total": weights.total(),
            "remaining": weights.remaining(),
            "categories": categories,
            "diagnostics": diagnostics_json(&loaded),
        }),
    )
}

fn serve_ranking_csv(query: &Query, state: &mut ServerState) -> Response {
    let weights = weights_from(query, state.weights);
    let (_, table) = filtered(query, state);

    let ranking = match rank(&table, &weights) {
        Ok(ranking) => ranking,
        Err(e) => return Response::text(400, "text/plain", e.to_string()),
    };
    match ranking_csv_string(&ranking) {
        Ok(csv) => Response::text(200, "text/csv; charset=utf-8", csv),
        Err(e) => Response::text(500, "text/plain", e.to_string()),
    }
}

fn serve_reload(state: &mut ServerState) -> Response {
    let loaded = state.cache.reload(&state.data, &state.options);
    Response::json(
        200,
        json!({
            "runs": loaded.table.len(),
            "cache": {
                "entries": state.cache.len(),
                "loads": state.cache.misses(),
            },
            "diagnostics": diagnostics_json(&loaded),
        }),
    )
}

// ============================================================================
// Query strings
// ============================================================================

/// Decoded query parameters in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn parse(raw: &str) -> Self {
        let pairs = raw
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) => (percent_decode(key), percent_decode(value)),
                None => (percent_decode(pair), String::new()),
            })
            .collect();
        Self { pairs }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First value for `key` parsed as `T`; unparseable values count as absent.
    pub fn parse_value<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    /// All values for `key`, comma lists expanded. `None` when the key is absent.
    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        let mut found = false;
        let mut values = Vec::new();
        for (k, v) in &self.pairs {
            if k == key {
                found = true;
                values.extend(split_list(v));
            }
        }
        found.then_some(values)
    }

    pub fn selection_request(&self) -> SelectionRequest {
        SelectionRequest {
            sizes: self.list("size"),
            categories: self.list("category").map(|names| parse_categories(&names)),
            models: self.list("model"),
        }
    }
}

/// Decode `%XX` escapes and `+` as space. Malformed escapes pass through.
pub fn percent_decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}
