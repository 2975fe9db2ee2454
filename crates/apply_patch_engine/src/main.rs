use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use apply_patch_engine::{apply_patch, DiffPreview};

const USAGE: &str = "usage: apply_patch [--dry-run] <file> [patch-file|-]";

fn main() {
    if let Err(error) = run() {
        let _ = writeln!(io::stderr(), "{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut dry_run = false;
    let mut positional = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--dry-run" => dry_run = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            _ => positional.push(arg),
        }
    }

    let (target, patch_source) = match positional.as_slice() {
        [target] => (PathBuf::from(target), "-".to_string()),
        [target, source] => (PathBuf::from(target), source.clone()),
        _ => bail!("{USAGE}"),
    };

    let patch_text = if patch_source == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read patch from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(&patch_source)
            .with_context(|| format!("Failed to read patch file {patch_source}"))?
    };

    let original = std::fs::read_to_string(&target)
        .with_context(|| format!("Failed to read file to update {}", target.display()))?;
    let updated = apply_patch(&original, &patch_text)?;

    let mut stdout = io::stdout().lock();
    if dry_run {
        let label = target.display().to_string();
        stdout.write_all(DiffPreview::new(&original, &updated, &label).render_plain().as_bytes())?;
        return Ok(());
    }

    std::fs::write(&target, updated)
        .with_context(|| format!("Failed to write file {}", target.display()))?;
    writeln!(stdout, "Success. Updated the following files:\nM {}", target.display())?;
    Ok(())
}
