use std::fs;

use serde_json::{json, Value};
use walkdir::WalkDir;

use super::fs::is_hidden;
use super::{cap_chars, ToolArgs, ToolContext, ToolError, ToolSchema, ToolSpec};

const DEFAULT_MAX_RESULTS: u64 = 50;
const DEFAULT_MAX_FILE_BYTES: u64 = 400_000;
const SNIPPET_MAX_CHARS: usize = 300;

pub fn specs() -> Vec<ToolSpec> {
    vec![ToolSpec {
        name: "search_text",
        description: "Search for a text query in files under the workspace (grep-like). Returns matching file paths and line snippets.",
        mutating: false,
        schema: ToolSchema::object()
            .string("query", "Text to search for.")
            .string("path", "Directory to search under (relative to workspace).")
            .default_value(json!("."))
            .boolean("case_sensitive", "Case sensitive search.")
            .default_value(json!(false))
            .integer("max_results", "Max matches to return.")
            .default_value(json!(DEFAULT_MAX_RESULTS))
            .minimum(1)
            .integer("max_file_bytes", "Skip files larger than this (bytes).")
            .default_value(json!(DEFAULT_MAX_FILE_BYTES))
            .minimum(1)
            .boolean("include_hidden", "Include hidden files/folders.")
            .default_value(json!(false))
            .required(&["query"]),
        handler: search_text,
    }]
}

fn search_text(ctx: &mut ToolContext<'_>, args: ToolArgs<'_>) -> Result<Value, ToolError> {
    let query = args.required_str("query")?.trim();
    let path = args.str_or("path", ".");
    let case_sensitive = args.bool_or("case_sensitive", false);
    let max_results = usize::try_from(args.u64_or("max_results", DEFAULT_MAX_RESULTS))
        .unwrap_or(usize::MAX)
        .max(1);
    let max_file_bytes = args.u64_or("max_file_bytes", DEFAULT_MAX_FILE_BYTES);
    let include_hidden = args.bool_or("include_hidden", false);

    let root = ctx.sandbox().resolve(path)?;
    if !root.exists() {
        return Err(ToolError::NotFound {
            path: path.to_string(),
        });
    }
    if !root.is_dir() {
        return Err(ToolError::Validation(format!("Not a directory: {path}")));
    }

    let needle = if case_sensitive {
        query.to_string()
    } else {
        query.to_lowercase()
    };

    let walker = WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            include_hidden || entry.depth() == 0 || !is_hidden(entry.file_name())
        });

    let mut results = Vec::new();
    let mut files_scanned = 0usize;
    'files: for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let too_large = entry
            .metadata()
            .map_or(true, |metadata| metadata.len() > max_file_bytes);
        if too_large {
            continue;
        }
        let Ok(bytes) = fs::read(entry.path()) else {
            continue;
        };

        files_scanned += 1;
        let text = String::from_utf8_lossy(&bytes);
        for (index, line) in text.lines().enumerate() {
            let matched = if case_sensitive {
                line.contains(&needle)
            } else {
                line.to_lowercase().contains(&needle)
            };
            if !matched {
                continue;
            }

            results.push(json!({
                "path": ctx.sandbox().relative_display(entry.path()),
                "line": index + 1,
                "match": cap_chars(line.trim(), SNIPPET_MAX_CHARS, "…"),
            }));
            if results.len() >= max_results {
                break 'files;
            }
        }
    }

    let truncated = results.len() >= max_results;
    Ok(json!({
        "query": query,
        "path": path,
        "case_sensitive": case_sensitive,
        "files_scanned": files_scanned,
        "results": results,
        "truncated": truncated,
    }))
}
