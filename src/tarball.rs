//! Tarball emission for the reduced tree.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::info;

/// Archive the contents of `output_root` at the top level of a POSIX
/// tarball. A destination of `-` streams the archive to stdout.
pub fn create(tar: &str, output_root: &Path, dest: &str) -> Result<()> {
    let root = output_root.to_string_lossy();

    let status = Command::new(tar)
        .args(["-cf", dest, "-C", root.as_ref(), "."])
        .status()
        .context("Failed to run tar")?;

    if !status.success() {
        anyhow::bail!("tar failed with status: {}", status);
    }

    if dest != "-" {
        let metadata = fs::metadata(dest)
            .with_context(|| format!("Cannot stat tarball {}", dest))?;
        let size_mb = metadata.len() as f64 / 1024.0 / 1024.0;
        info!("Wrote {} ({:.2} MB)", dest, size_mb);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_tarball() {
        if crate::process::which("tar").is_none() {
            return;
        }

        let root = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("usr/bin")).unwrap();
        fs::write(root.path().join("usr/bin/tool"), b"x").unwrap();

        let dest = out.path().join("image.tar");
        create("tar", root.path(), dest.to_str().unwrap()).unwrap();

        assert!(dest.is_file());
        assert!(fs::metadata(&dest).unwrap().len() > 0);
    }
}
