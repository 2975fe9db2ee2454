use std::fs;
use std::path::Path;

use apply_patch_engine::{apply_patch, DiffPreview};
use serde_json::{json, Value};
use walkdir::WalkDir;

use super::{ToolArgs, ToolContext, ToolError, ToolSchema, ToolSpec};

const DEFAULT_WALK_MAX_DEPTH: u64 = 6;
const DEFAULT_WALK_MAX_FILES: u64 = 200;

pub fn specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "list_dir",
            description: "List files and folders in a directory under the workspace root.",
            mutating: false,
            schema: ToolSchema::object()
                .string("path", "Directory path relative to workspace root.")
                .default_value(json!(".")),
            handler: list_dir,
        },
        ToolSpec {
            name: "walk_dir",
            description:
                "Recursively list files under a directory (bounded by max_depth/max_files).",
            mutating: false,
            schema: ToolSchema::object()
                .string("path", "Directory path relative to workspace root.")
                .default_value(json!("."))
                .integer("max_depth", "Maximum depth to recurse.")
                .default_value(json!(DEFAULT_WALK_MAX_DEPTH))
                .minimum(0)
                .integer("max_files", "Maximum number of entries to return.")
                .default_value(json!(DEFAULT_WALK_MAX_FILES))
                .minimum(1),
            handler: walk_dir,
        },
        ToolSpec {
            name: "read_file",
            description: "Read a text file under the workspace root. Returns file content.",
            mutating: false,
            schema: ToolSchema::object()
                .string("path", "File path relative to workspace root.")
                .required(&["path"]),
            handler: read_file,
        },
        ToolSpec {
            name: "write_file",
            description: "Write a text file under the workspace root (creates parent directories). Shows diff preview before approval.",
            mutating: true,
            schema: ToolSchema::object()
                .string("path", "File path relative to workspace root.")
                .string("content", "Full file content to write.")
                .boolean("overwrite", "Overwrite if file exists.")
                .default_value(json!(true))
                .required(&["path", "content"]),
            handler: write_file,
        },
        ToolSpec {
            name: "delete_file",
            description: "Delete a file or directory under the workspace root.",
            mutating: true,
            schema: ToolSchema::object()
                .string("path", "Path relative to workspace root.")
                .required(&["path"]),
            handler: delete_file,
        },
        ToolSpec {
            name: "apply_patch",
            description: "Apply a unified diff patch to a file under the workspace root. Shows diff preview before approval.",
            mutating: true,
            schema: ToolSchema::object()
                .string("path", "File path relative to workspace root.")
                .string("patch", "Unified diff patch text.")
                .required(&["path", "patch"]),
            handler: apply_patch_tool,
        },
    ]
}

fn list_dir(ctx: &mut ToolContext<'_>, args: ToolArgs<'_>) -> Result<Value, ToolError> {
    let path = args.str_or("path", ".");
    let target = ctx.sandbox().resolve(path)?;
    ensure_dir(&target, path)?;

    let mut entries = Vec::new();
    for entry in fs::read_dir(&target).map_err(|error| ToolError::io("list", path, error))? {
        let entry = entry.map_err(|error| ToolError::io("list", path, error))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let metadata = entry.path().metadata().ok();
        let is_dir = metadata.as_ref().is_some_and(fs::Metadata::is_dir);
        entries.push((is_dir, name, metadata.map(|metadata| metadata.len())));
    }
    entries.sort_by(|(a_dir, a_name, _), (b_dir, b_name, _)| {
        b_dir
            .cmp(a_dir)
            .then_with(|| a_name.to_lowercase().cmp(&b_name.to_lowercase()))
    });

    let items: Vec<Value> = entries
        .into_iter()
        .map(|(is_dir, name, size)| {
            json!({
                "name": if is_dir { format!("{name}/") } else { name },
                "type": if is_dir { "dir" } else { "file" },
                "size": size,
            })
        })
        .collect();

    Ok(json!({ "path": path, "items": items }))
}

fn walk_dir(ctx: &mut ToolContext<'_>, args: ToolArgs<'_>) -> Result<Value, ToolError> {
    let path = args.str_or("path", ".");
    let max_depth = usize::try_from(args.u64_or("max_depth", DEFAULT_WALK_MAX_DEPTH))
        .unwrap_or(usize::MAX);
    let max_files = usize::try_from(args.u64_or("max_files", DEFAULT_WALK_MAX_FILES))
        .unwrap_or(usize::MAX)
        .max(1);

    let root = ctx.sandbox().resolve(path)?;
    ensure_dir(&root, path)?;

    let walker = WalkDir::new(&root)
        .min_depth(1)
        .max_depth(max_depth.saturating_add(1))
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

    let mut files = Vec::new();
    let mut truncated = false;
    for entry in walker.filter_map(Result::ok) {
        let is_dir = entry.file_type().is_dir();
        if is_dir && entry.depth() > max_depth {
            continue;
        }

        let display = ctx.sandbox().relative_display(entry.path());
        files.push(if is_dir { format!("{display}/") } else { display });
        if files.len() >= max_files {
            truncated = true;
            break;
        }
    }

    Ok(json!({ "path": path, "files": files, "truncated": truncated }))
}

fn read_file(ctx: &mut ToolContext<'_>, args: ToolArgs<'_>) -> Result<Value, ToolError> {
    let path = args.required_str("path")?;
    let target = ctx.sandbox().resolve(path)?;
    if !target.exists() {
        return Err(ToolError::NotFound {
            path: path.to_string(),
        });
    }
    if target.is_dir() {
        return Err(ToolError::Validation(format!("Is a directory: {path}")));
    }

    let bytes = fs::read(&target).map_err(|error| ToolError::io("read", path, error))?;
    let content = String::from_utf8_lossy(&bytes);

    Ok(json!({ "path": path, "content": content }))
}

fn write_file(ctx: &mut ToolContext<'_>, args: ToolArgs<'_>) -> Result<Value, ToolError> {
    let path = args.required_str("path")?;
    let content = args.str_or("content", "");
    let overwrite = args.bool_or("overwrite", true);

    let target = ctx.sandbox().resolve(path)?;
    if target.is_dir() {
        return Err(ToolError::Validation(format!("Is a directory: {path}")));
    }
    let exists = target.exists();
    if exists && !overwrite {
        return Err(ToolError::Validation(format!(
            "File exists and overwrite=false: {path}"
        )));
    }

    let old_text = if exists {
        read_lossy(&target, path)?
    } else {
        String::new()
    };
    let preview = DiffPreview::new(&old_text, content, path);
    ctx.approve(&format!("write_file {path}"), Some(&preview))?;

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|error| ToolError::io("create parent directories for", path, error))?;
    }
    fs::write(&target, content).map_err(|error| ToolError::io("write", path, error))?;

    Ok(json!({ "ok": true, "path": path, "bytes_written": content.len() }))
}

fn delete_file(ctx: &mut ToolContext<'_>, args: ToolArgs<'_>) -> Result<Value, ToolError> {
    let path = args.required_str("path")?;
    let target = ctx.sandbox().resolve(path)?;
    if !target.exists() {
        return Err(ToolError::NotFound {
            path: path.to_string(),
        });
    }
    if target == ctx.sandbox().root() {
        return Err(ToolError::Validation(
            "Refusing to delete the workspace root".to_string(),
        ));
    }

    ctx.approve(&format!("delete_file {path}"), None)?;

    if target.is_dir() {
        fs::remove_dir_all(&target).map_err(|error| ToolError::io("delete", path, error))?;
        Ok(json!({ "ok": true, "path": path, "deleted": "dir" }))
    } else {
        fs::remove_file(&target).map_err(|error| ToolError::io("delete", path, error))?;
        Ok(json!({ "ok": true, "path": path, "deleted": "file" }))
    }
}

fn apply_patch_tool(ctx: &mut ToolContext<'_>, args: ToolArgs<'_>) -> Result<Value, ToolError> {
    let path = args.required_str("path")?;
    let patch = args.required_str("patch")?;

    let target = ctx.sandbox().resolve(path)?;
    if !target.is_file() {
        return Err(ToolError::Validation(format!("Not a file: {path}")));
    }

    let original = read_lossy(&target, path)?;
    let updated = apply_patch(&original, patch)?;
    let preview = DiffPreview::new(&original, &updated, path);
    ctx.approve(&format!("apply_patch {path}"), Some(&preview))?;

    fs::write(&target, &updated).map_err(|error| ToolError::io("write", path, error))?;

    Ok(json!({ "ok": true, "path": path, "changed": original != updated }))
}

fn ensure_dir(target: &Path, path: &str) -> Result<(), ToolError> {
    if !target.exists() {
        return Err(ToolError::NotFound {
            path: path.to_string(),
        });
    }
    if !target.is_dir() {
        return Err(ToolError::Validation(format!("Not a directory: {path}")));
    }
    Ok(())
}

fn read_lossy(target: &Path, path: &str) -> Result<String, ToolError> {
    let bytes = fs::read(target).map_err(|error| ToolError::io("read", path, error))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub(crate) fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}
