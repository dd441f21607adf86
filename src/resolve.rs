//! Symlink topology resolution.
//!
//! Given an absolute source path, finds the real file it ultimately points
//! to while mirroring every intermediate symlink into the output tree as a
//! *relative* link. Relative links keep the reduced tree self-consistent no
//! matter where it is unpacked.

use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Resolve `path` through every symlink in its ancestor chain, mirroring
/// each link into `output_root` as it is found.
///
/// Returns the final non-symlink path. Relative inputs and `.`/`..` are
/// returned untouched. A broken link stops the walk; the last valid path is
/// returned and the caller detects absence.
pub fn resolve(output_root: &Path, path: &Path) -> PathBuf {
    if !path.is_absolute() {
        return path.to_path_buf();
    }

    let mut current = normalize(path);
    // Hop cap in the spirit of the kernel's ELOOP limit; self-referential
    // links would otherwise never advance.
    for _ in 0..40 {
        let link = match shallowest_symlink_ancestor(&current) {
            Some(l) => l,
            None => return current,
        };

        let target = match fs::read_link(&link) {
            Ok(t) => t,
            Err(e) => {
                debug!("Cannot read link {}: {}", link.display(), e);
                return current;
            }
        };

        let parent = link.parent().unwrap_or_else(|| Path::new("/"));
        let absolute = if target.is_absolute() {
            normalize(&target)
        } else {
            normalize(&parent.join(&target))
        };

        mirror_link(output_root, &link, &absolute);

        // Substitute the suffix past the link onto its target. Each
        // substitution advances the resolved portion, so cycles terminate.
        current = match current.strip_prefix(&link) {
            Ok(suffix) if suffix.as_os_str().is_empty() => absolute,
            Ok(suffix) => absolute.join(suffix),
            Err(_) => absolute,
        };
    }

    warn!("Too many symlink hops resolving {}", path.display());
    current
}

/// Find the symlink ancestor of `path` (including `path` itself) closest
/// to the root.
///
/// The shallowest link is resolved first: were the leaf handled first, its
/// mirror would materialize the linked ancestor directories as real
/// directories in the output tree.
fn shallowest_symlink_ancestor(path: &Path) -> Option<PathBuf> {
    let mut found = None;
    for ancestor in path.ancestors() {
        if ancestor.as_os_str().is_empty() || ancestor == Path::new("/") {
            break;
        }
        let is_link = fs::symlink_metadata(ancestor)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if is_link {
            found = Some(ancestor.to_path_buf());
        }
    }
    found
}

/// Materialize `link` inside the output tree as a relative symlink to
/// `target`. Failures are logged and ignored; the copy engine will still
/// attempt a direct copy of the underlying file.
fn mirror_link(output_root: &Path, link: &Path, target: &Path) {
    // Kernel-managed trees stay out of the output even as link topology
    // (/proc/self is a symlink, for instance)
    for protected in ["/proc", "/dev", "/sys"] {
        if link.starts_with(protected) {
            return;
        }
    }

    let parent = link.parent().unwrap_or_else(|| Path::new("/"));
    let relative = relative_from(parent, target);

    let dest = match link.strip_prefix("/") {
        Ok(stripped) => output_root.join(stripped),
        Err(_) => return,
    };

    if let Some(dest_parent) = dest.parent() {
        if let Err(e) = fs::create_dir_all(dest_parent) {
            warn!("Cannot create {}: {}", dest_parent.display(), e);
            return;
        }
    }

    match std::os::unix::fs::symlink(&relative, &dest) {
        Ok(()) => debug!(
            "Linked {} -> {}",
            dest.display(),
            relative.display()
        ),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(e) => warn!("Cannot link {}: {}", dest.display(), e),
    }
}

/// Collapse `.` and `..` components textually, without touching the
/// filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push("/");
    }
    out
}

/// Relative path from directory `base` to `target`. Both must be absolute
/// and normalized.
pub fn relative_from(base: &Path, target: &Path) -> PathBuf {
    let base_parts: Vec<Component> = base.components().collect();
    let target_parts: Vec<Component> = target.components().collect();

    let common = base_parts
        .iter()
        .zip(target_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &target_parts[common..] {
        out.push(part);
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
