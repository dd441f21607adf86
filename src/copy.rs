//! Idempotent file and directory copying into the output tree.
//!
//! The preferred implementation is a whitelisting rsync walk rooted at `/`,
//! which preserves ownership and permissions and can lift a single file out
//! of a deep tree without dragging its siblings along. When rsync is not
//! available, an in-crate recursive copy takes over.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::engine::context::EngineContext;
use crate::process::Tool;
use crate::resolve;

/// Copy `source` into the output tree, resolving symlinks along the way.
///
/// Protected paths are skipped silently, excluded paths with a warning, and
/// paths already in the ledger are not copied twice. The source must exist;
/// a missing source is the caller's error.
pub fn copy(ctx: &mut EngineContext, source: &Path, recursive: bool) -> Result<()> {
    let raw = source.as_os_str();
    if raw.is_empty() || source == Path::new(".") || source == Path::new("..") {
        bail!("Refusing to copy '{}'", source.display());
    }

    let resolved = resolve::resolve(&ctx.output_root, source);

    if ctx.rules.is_protected(&resolved) {
        debug!("Skipping protected path {}", resolved.display());
        return Ok(());
    }

    if let Some(prefix) = ctx.rules.excluded_by(&resolved) {
        warn!(
            "Skipping {} (matches exclusion '{}')",
            resolved.display(),
            prefix
        );
        return Ok(());
    }

    if ctx.ledger.contains(source, recursive) {
        return Ok(());
    }

    if fs::symlink_metadata(&resolved).is_err() {
        bail!("Source does not exist: {}", resolved.display());
    }

    debug!(
        "Copying {}{}",
        resolved.display(),
        if recursive { " (recursive)" } else { "" }
    );

    let outcome = if ctx.tools.rsync.is_some() {
        rsync_whitelist(ctx, &resolved, recursive)
    } else {
        copy_fallback(&ctx.output_root, &resolved, recursive)
    };

    // Materialize errors are reported but do not abort the pipeline;
    // partial output can still be inspected.
    if let Err(e) = outcome {
        warn!("Copy of {} failed: {:#}", resolved.display(), e);
    }

    ctx.ledger.record(source, recursive);
    Ok(())
}

/// Whitelisting rsync copy rooted at `/`.
///
/// The include chain names every ancestor of the source without a trailing
/// wildcard, then the source itself (plus `source/***` when recursive), then
/// the user's exclusions, then everything else is excluded.
fn rsync_whitelist(ctx: &EngineContext, source: &Path, recursive: bool) -> Result<()> {
    let rsync = ctx.tools.rsync.as_deref().unwrap_or("rsync");
    // --ignore-existing: destination files from an earlier run are never
    // overwritten, whatever the ledger says
    let mut cmd = Tool::new(rsync).arg("-a").arg("--ignore-existing");

    let mut ancestors: Vec<&Path> = source
        .ancestors()
        .skip(1)
        .filter(|a| *a != Path::new("/"))
        .collect();
    ancestors.reverse();
    for ancestor in ancestors {
        cmd = cmd.arg(format!("--include={}", ancestor.display()));
    }

    cmd = cmd.arg(format!("--include={}", source.display()));
    if recursive {
        cmd = cmd.arg(format!("--include={}/***", source.display()));
    }

    for prefix in ctx.rules.exclude_prefixes() {
        cmd = cmd.arg(format!("--exclude={}", prefix));
    }
    cmd = cmd.arg("--exclude=*");

    let mut dest = ctx.output_root.to_string_lossy().into_owned();
    if !dest.ends_with('/') {
        dest.push('/');
    }

    cmd.arg("/")
        .arg(&dest)
        .failure_context(format!("rsync of {} failed", source.display()))
        .run()?;
    Ok(())
}

/// Plain recursive copy used when rsync is unavailable. Preserves file
/// permissions and symlinks; never overwrites an existing destination.
fn copy_fallback(output_root: &Path, source: &Path, recursive: bool) -> Result<()> {
    let meta = fs::symlink_metadata(source)
        .with_context(|| format!("Cannot stat {}", source.display()))?;

    if meta.is_dir() {
        let dest = dest_path(output_root, source)?;
        if recursive {
            copy_tree(source, &dest)?;
        } else {
            fs::create_dir_all(&dest)
                .with_context(|| format!("Cannot create {}", dest.display()))?;
        }
    } else {
        copy_leaf(source, &dest_path(output_root, source)?)?;
    }
    Ok(())
}

fn dest_path(output_root: &Path, source: &Path) -> Result<PathBuf> {
    let stripped = source
        .strip_prefix("/")
        .with_context(|| format!("Source must be absolute: {}", source.display()))?;
    Ok(output_root.join(stripped))
}

fn copy_tree(source: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.with_context(|| format!("Cannot walk {}", source.display()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .expect("walkdir yields children of its root");
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Cannot create {}", target.display()))?;
        } else {
            copy_leaf(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn copy_leaf(source: &Path, dest: &Path) -> Result<()> {
    if fs::symlink_metadata(dest).is_ok() {
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }

    let meta = fs::symlink_metadata(source)
        .with_context(|| format!("Cannot stat {}", source.display()))?;
    if meta.file_type().is_symlink() {
        let target = fs::read_link(source)
            .with_context(|| format!("Cannot read link {}", source.display()))?;
        std::os::unix::fs::symlink(&target, dest)
            .with_context(|| format!("Cannot link {}", dest.display()))?;
    } else {
        fs::copy(source, dest)
            .with_context(|| format!("Cannot copy {} to {}", source.display(), dest.display()))?;
    }
    Ok(())
}
