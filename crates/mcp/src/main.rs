//! RepoMapper MCP — a stdio JSON-RPC shell wrapping `repomapper-core`
//! in a single `repo_map` tool.
//!
//! Structurally a trimmed `codescope_server::mcp`: same initialize /
//! tools-list / tools-call / ping dispatch, same init-ordering
//! enforcement and never-`isError:true` convention, reduced to the one
//! tool this server exists to serve.

use std::collections::HashSet;
use std::io::{self, BufRead, Write as IoWrite};
use std::path::{Path, PathBuf};

use repomapper_core::cache::TagCache;
use repomapper_core::pipeline::{get_repo_map, RepoMapOptions};
use repomapper_core::tokenizer::create_tokenizer;
use repomapper_core::PipelineConfig;

const SUPPORTED_VERSIONS: &[&str] = &["2025-11-25", "2025-06-18"];
const LATEST_VERSION: &str = "2025-11-25";

fn negotiate_version(client_version: &str) -> &'static str {
    SUPPORTED_VERSIONS.iter().find(|&&v| v == client_version).copied().unwrap_or(LATEST_VERSION)
}

fn tool_definitions() -> serde_json::Value {
    serde_json::json!([
        {
            "name": "repo_map",
            "annotations": {
                "readOnlyHint": true,
                "destructiveHint": false,
                "idempotentHint": true,
                "openWorldHint": false
            },
            "description": "Generate a ranked, token-budgeted map of the repository: the most structurally important definitions, grouped by file with surrounding context. Use chat_files for files already in context (they shape ranking but are suppressed from output), and mentioned_fnames/mentioned_idents to bias toward specific files or identifiers.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "root": { "type": "string", "description": "Repository root (default: server cwd)" },
                    "chat_files": { "type": "array", "items": { "type": "string" }, "description": "Paths already in the caller's context" },
                    "mentioned_fnames": { "type": "array", "items": { "type": "string" } },
                    "mentioned_idents": { "type": "array", "items": { "type": "string" } },
                    "max_map_tokens": { "type": "integer", "description": "Token budget for the map (default: 4096)" },
                    "exclude_unranked": { "type": "boolean" }
                }
            }
        }
    ])
}

fn walk_repo(root: &Path, config: &PipelineConfig) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let walker = ignore::WalkBuilder::new(root).hidden(false).git_ignore(true).build();
    for entry in walker.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.components().any(|c| c.as_os_str().to_str().map(|s| config.should_skip_dir(s)).unwrap_or(false)) {
            continue;
        }
        let Ok(rel) = path.strip_prefix(root) else { continue };
        out.push((path.to_string_lossy().to_string(), rel.to_string_lossy().to_string()));
    }
    out
}

fn resolve_paths(root: &Path, values: &[serde_json::Value]) -> Vec<(String, String)> {
    values
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| {
            let p = PathBuf::from(s);
            let abs = if p.is_absolute() { p } else { root.join(&p) };
            let rel = abs.strip_prefix(root).unwrap_or(&abs).to_string_lossy().to_string();
            (abs.to_string_lossy().to_string(), rel)
        })
        .collect()
}

fn handle_repo_map(args: &serde_json::Value) -> (String, bool) {
    let root = match args.get("root").and_then(|v| v.as_str()) {
        Some(r) => PathBuf::from(r),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    let root = root.canonicalize().unwrap_or(root);
    let config = PipelineConfig::load(&root);
    let cache = TagCache::new(config.cache_dir());

    let chat_files = args
        .get("chat_files")
        .and_then(|v| v.as_array())
        .map(|a| resolve_paths(&root, a))
        .unwrap_or_default();
    let other_files = walk_repo(&root, &config);
    let mentioned_fnames: HashSet<String> = args
        .get("mentioned_fnames")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    let mentioned_idents: HashSet<String> = args
        .get("mentioned_idents")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    let max_map_tokens = args.get("max_map_tokens").and_then(|v| v.as_i64()).unwrap_or(4096);
    let exclude_unranked = args.get("exclude_unranked").and_then(|v| v.as_bool()).unwrap_or(false);

    let opts = RepoMapOptions {
        chat_files,
        other_files,
        mentioned_fnames,
        mentioned_idents,
        force_refresh: false,
        max_map_tokens,
        max_context_window: None,
        exclude_unranked,
        token_counter: create_tokenizer("bytes-estimate"),
    };

    let (map, _report) = get_repo_map(&cache, &opts);
    match map {
        Some(text) => (text, false),
        None => ("(empty)".to_string(), false),
    }
}

/// Dispatch a single JSON-RPC request, returning `None` for notifications.
fn dispatch_jsonrpc(msg: &serde_json::Value) -> Option<serde_json::Value> {
    let method = msg["method"].as_str().unwrap_or("");
    let id = msg.get("id").cloned();

    if id.is_none() || method.starts_with("notifications/") {
        return None;
    }

    let response = match method {
        "initialize" => {
            let client_version = msg["params"]["protocolVersion"].as_str().unwrap_or("");
            let negotiated = negotiate_version(client_version);
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": negotiated,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": { "name": "repomapper", "version": env!("CARGO_PKG_VERSION") },
                    "instructions": "RepoMapper — call repo_map to get a ranked, token-budgeted map of the repository's most important definitions."
                }
            })
        }
        "tools/list" => {
            serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": { "tools": tool_definitions() } })
        }
        "tools/call" => {
            let tool_name = msg["params"]["name"].as_str().unwrap_or("");
            let arguments = msg["params"].get("arguments").cloned().unwrap_or(serde_json::json!({}));
            let (text, is_error) = match tool_name {
                "repo_map" => handle_repo_map(&arguments),
                _ => (format!("Unknown tool '{tool_name}'"), true),
            };
            // Never set isError: true — prefix instead so the caller can
            // still detect failure without tripping sibling-call cascade
            // cancellation in some MCP clients.
            let content_text = if is_error { format!("\u{26a0} Error: {text}") } else { text };
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "content": [{ "type": "text", "text": content_text }], "isError": false }
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

fn run_mcp() {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let reader = stdin.lock();
    let mut initialized = false;

    tracing::info!("RepoMapper MCP server ready");

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
                let err = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": { "code": -32700, "message": "Parse error" }
                });
                let mut out = stdout.lock();
                let _ = writeln!(out, "{err}");
                let _ = out.flush();
                continue;
            }
        };

        let method = msg["method"].as_str().unwrap_or("");

        if method == "notifications/initialized" || method == "notifications/cancelled" {
            continue;
        }

        if !initialized && method != "initialize" && method != "ping" {
            if let Some(id) = msg.get("id").cloned() {
                let err = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32002, "message": "Server not initialized. Send 'initialize' first." }
                });
                let mut out = stdout.lock();
                let _ = writeln!(out, "{}", serde_json::to_string(&err).unwrap());
                let _ = out.flush();
            }
            continue;
        }

        if let Some(response) = dispatch_jsonrpc(&msg) {
            if method == "initialize" {
                initialized = true;
            }
            let mut out = stdout.lock();
            let _ = writeln!(out, "{}", serde_json::to_string(&response).unwrap());
            let _ = out.flush();
        }
    }
}


fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("repomapper=warn".parse().unwrap()),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    run_mcp();
}
