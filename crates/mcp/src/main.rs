//! codecairn-mcp — stdio JSON-RPC adapter exposing the eight ToolSurface
//! operations as MCP tools. Wire framing (newline-delimited JSON-RPC 2.0,
//! initialize/tools-list/tools-call sequencing, init-before-any-other-call
//! enforcement) is out of scope for codecairn-core, so it lives here as a
//! thin adapter with no independent business logic.

use codecairn_core::chunk::ChunkKind;
use codecairn_core::tool_surface::SearchMode;
use codecairn_core::{ToolError, ToolSurface};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

const SERVER_NAME: &str = "codecairn";
const PROTOCOL_VERSION: &str = "2025-06-18";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("codecairn=warn".parse().unwrap()),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let root = std::env::var("CODECAIRN_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::current_dir().expect("could not determine current directory"));
    let surface = ToolSurface::open(&root)?;

    run_mcp(&surface);
    Ok(())
}

fn run_mcp(surface: &ToolSurface) {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let reader = stdin.lock();
    let mut initialized = false;

    tracing::info!("codecairn MCP server ready");

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let msg: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(_) => {
                write_line(
                    &stdout,
                    &serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": null,
                        "error": { "code": -32700, "message": "Parse error" }
                    }),
                );
                continue;
            }
        };

        let method = msg["method"].as_str().unwrap_or("");

        if method == "notifications/initialized" || method == "notifications/cancelled" {
            continue;
        }

        if !initialized && method != "initialize" && method != "ping" {
            if let Some(id) = msg.get("id").cloned() {
                write_line(
                    &stdout,
                    &serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {
                            "code": -32002,
                            "message": "Server not initialized. Send 'initialize' first."
                        }
                    }),
                );
            }
            continue;
        }

        if let Some(response) = dispatch(surface, &msg) {
            if method == "initialize" {
                initialized = true;
            }
            write_line(&stdout, &response);
        }
    }
}

fn write_line(stdout: &io::Stdout, value: &serde_json::Value) {
    let mut out = stdout.lock();
    let _ = writeln!(out, "{}", value);
    let _ = out.flush();
}

/// Process a single JSON-RPC request and return the response, or `None` for
/// notifications (no `id` field).
fn dispatch(surface: &ToolSurface, msg: &serde_json::Value) -> Option<serde_json::Value> {
    let method = msg["method"].as_str().unwrap_or("");
    let id = msg.get("id").cloned();

    if id.is_none() || method.starts_with("notifications/") {
        return None;
    }

    let response = match method {
        "initialize" => serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": { "listChanged": false },
                    "prompts": { "listChanged": false },
                    "resources": { "listChanged": false }
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                },
                "instructions": "codecairn maintains a semantic index of this codebase. Call cairn_index first if cairn_status reports no files. Use cairn_search for hybrid vector+keyword lookup, cairn_fuzzy_find for symbol lookup by name, and cairn_file_context to see every indexed chunk for a file."
            }
        }),
        "tools/list" => serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "tools": tool_definitions() }
        }),
        "tools/call" => {
            let tool_name = msg["params"]["name"].as_str().unwrap_or("");
            let arguments = msg["params"].get("arguments").cloned().unwrap_or(serde_json::json!({}));
            let text = call_tool(surface, tool_name, &arguments);
            // ToolSurface never panics; failures are rendered as a warning-prefixed
            // text block rather than isError:true, matching the convention that a
            // caller issuing several tool calls in parallel shouldn't have the rest
            // of the batch killed by one failure.
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "content": [{ "type": "text", "text": text }],
                    "isError": false
                }
            })
        }
        "ping" => serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": {} }),
        _ => serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": "Method not found" }
        }),
    };

    Some(response)
}

fn render_err(err: ToolError) -> String {
    format!("\u{26a0} {}", err.message)
}

fn render_ok(value: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "serialization error".to_string())
}

fn call_tool(surface: &ToolSurface, name: &str, args: &serde_json::Value) -> String {
    match name {
        "cairn_search" => {
            let query = args["query"].as_str().unwrap_or("");
            if query.is_empty() {
                return render_err(ToolError {
                    kind: "query_invalid".to_string(),
                    message: "'query' is required".to_string(),
                });
            }
            let top_k = args["top_k"].as_u64().unwrap_or(10) as usize;
            let mode = parse_mode(args["mode"].as_str().unwrap_or("hybrid"));
            let bm25_weight = args["bm25_weight"].as_f64().unwrap_or(0.5);
            match surface.search(query, top_k, mode, bm25_weight) {
                Ok(outcome) => render_ok(&outcome),
                Err(e) => render_err(e),
            }
        }
        "cairn_fuzzy_find" => {
            let symbol = args["symbol_name"].as_str().unwrap_or("");
            if symbol.is_empty() {
                return render_err(ToolError {
                    kind: "query_invalid".to_string(),
                    message: "'symbol_name' is required".to_string(),
                });
            }
            let symbol_type = args["symbol_type"].as_str().and_then(parse_kind);
            match surface.fuzzy_find(symbol, symbol_type) {
                Ok(results) => render_ok(&results),
                Err(e) => render_err(e),
            }
        }
        "cairn_index" => {
            let force = args["force"].as_bool().unwrap_or(false);
            match surface.index(force) {
                Ok(outcome) => render_ok(&outcome),
                Err(e) => render_err(e),
            }
        }
        "cairn_file_context" => {
            let filepath = args["filepath"].as_str().unwrap_or("");
            if filepath.is_empty() {
                return render_err(ToolError {
                    kind: "query_invalid".to_string(),
                    message: "'filepath' is required".to_string(),
                });
            }
            let include_related = args["include_related"].as_bool().unwrap_or(false);
            match surface.get_file_context(filepath, include_related) {
                Ok(context) => render_ok(&context),
                Err(e) => render_err(e),
            }
        }
        "cairn_stale_status" => match surface.get_stale_status() {
            Ok(status) => render_ok(&status),
            Err(e) => render_err(e),
        },
        "cairn_status" => match surface.status() {
            Ok(status) => render_ok(&status),
            Err(e) => render_err(e),
        },
        "cairn_config" => match surface.config() {
            Ok(config) => render_ok(&config),
            Err(e) => render_err(e),
        },
        "cairn_files" => match surface.files() {
            Ok(files) => render_ok(&files),
            Err(e) => render_err(e),
        },
        other => render_err(ToolError {
            kind: "query_invalid".to_string(),
            message: format!("unknown tool '{other}'"),
        }),
    }
}

fn parse_mode(s: &str) -> SearchMode {
    match s {
        "vector" => SearchMode::Vector,
        "bm25" => SearchMode::Bm25,
        "fuzzy" => SearchMode::Fuzzy,
        _ => SearchMode::Hybrid,
    }
}

fn parse_kind(s: &str) -> Option<ChunkKind> {
    match s {
        "function" => Some(ChunkKind::Function),
        "class" => Some(ChunkKind::Class),
        "method" => Some(ChunkKind::Method),
        "module" => Some(ChunkKind::Module),
        _ => None,
    }
}

fn tool_definitions() -> serde_json::Value {
    let ro = serde_json::json!({
        "readOnlyHint": true,
        "destructiveHint": false,
        "idempotentHint": true,
        "openWorldHint": false
    });
    let mutating = serde_json::json!({
        "readOnlyHint": false,
        "destructiveHint": false,
        "idempotentHint": true,
        "openWorldHint": false
    });

    serde_json::json!([
        {
            "name": "cairn_search",
            "annotations": ro,
            "description": "Hybrid vector + BM25 search over the semantic index, fused with reciprocal rank fusion. Use mode='vector' or mode='bm25' to force a single retrieval path, or mode='fuzzy' for approximate name matching.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Natural-language or keyword query" },
                    "top_k": { "type": "integer", "description": "Max results to return (default: 10)" },
                    "mode": { "type": "string", "enum": ["hybrid", "vector", "bm25", "fuzzy"], "description": "Retrieval mode (default: hybrid)" },
                    "bm25_weight": { "type": "number", "description": "Weight toward keyword matching in hybrid mode, 0.0-1.0 (default: 0.5)" }
                },
                "required": ["query"]
            }
        },
        {
            "name": "cairn_fuzzy_find",
            "annotations": ro,
            "description": "Find a symbol by approximate name match (Gestalt/Ratcliff-Obershelp ratio), optionally filtered by symbol kind.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "symbol_name": { "type": "string", "description": "Symbol name to look up" },
                    "symbol_type": { "type": "string", "enum": ["function", "class", "method", "module"], "description": "Restrict results to this chunk kind" }
                },
                "required": ["symbol_name"]
            }
        },
        {
            "name": "cairn_index",
            "annotations": mutating,
            "description": "(Re)build the semantic index incrementally from filesystem changes. Pass force=true to discard the existing index and rebuild from scratch.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "force": { "type": "boolean", "description": "Ignore existing state and rebuild from scratch (default: false)" }
                }
            }
        },
        {
            "name": "cairn_file_context",
            "annotations": ro,
            "description": "List every indexed chunk for a single file, optionally with files related by filename full-text match.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "filepath": { "type": "string", "description": "Project-relative file path" },
                    "include_related": { "type": "boolean", "description": "Also list related files (default: false)" }
                },
                "required": ["filepath"]
            }
        },
        {
            "name": "cairn_stale_status",
            "annotations": ro,
            "description": "Report whether the index is stale relative to the filesystem, and which files changed.",
            "inputSchema": { "type": "object", "properties": {} }
        },
        {
            "name": "cairn_status",
            "annotations": ro,
            "description": "Report index statistics: total files, total chunks, and manifest timestamps.",
            "inputSchema": { "type": "object", "properties": {} }
        },
        {
            "name": "cairn_config",
            "annotations": ro,
            "description": "Show the active configuration (embedding provider, chunk sizes, extensions, exclude patterns).",
            "inputSchema": { "type": "object", "properties": {} }
        },
        {
            "name": "cairn_files",
            "annotations": ro,
            "description": "List every indexed file with its chunk count and the set of chunk kinds it contains.",
            "inputSchema": { "type": "object", "properties": {} }
        }
    ])
}
