//! Dynamic-loader configuration accumulated during analysis.
//!
//! Library directories are collected in memory as an ordered set and
//! flushed to the output tree once at finalization; lines already present
//! in the output copy of the file keep their position.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::process::Tool;

#[derive(Debug)]
pub struct LoaderConf {
    /// Location of the loader config, relative to the output root.
    rel_path: PathBuf,
    dirs: Vec<String>,
    seen: HashSet<String>,
}

impl LoaderConf {
    pub fn new(rel_path: impl Into<PathBuf>) -> Self {
        Self {
            rel_path: rel_path.into(),
            dirs: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Note a library directory. Returns true on first occurrence.
    pub fn note_dir(&mut self, dir: &Path) -> bool {
        let line = dir.to_string_lossy().into_owned();
        if line.is_empty() || !self.seen.insert(line.clone()) {
            return false;
        }
        debug!("Loader search path: {}", line);
        self.dirs.push(line);
        true
    }

    /// Directories noted so far, in first-occurrence order.
    pub fn dirs(&self) -> &[String] {
        &self.dirs
    }

    /// Write the config into the output tree, keeping any lines that a copy
    /// of the source file already put there, deduplicated by first
    /// occurrence.
    pub fn flush(&self, output_root: &Path) -> Result<PathBuf> {
        let path = output_root.join(&self.rel_path);

        let mut lines: Vec<String> = Vec::new();
        let mut written: HashSet<String> = HashSet::new();

        if path.exists() {
            let existing = fs::read_to_string(&path)
                .with_context(|| format!("Cannot read {}", path.display()))?;
            for line in existing.lines() {
                let line = line.trim();
                if !line.is_empty() && written.insert(line.to_string()) {
                    lines.push(line.to_string());
                }
            }
        }

        for dir in &self.dirs {
            if written.insert(dir.clone()) {
                lines.push(dir.clone());
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create {}", parent.display()))?;
        }
        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(&path, content)
            .with_context(|| format!("Cannot write {}", path.display()))?;

        info!(
            "Wrote {} loader search path(s) to {}",
            lines.len(),
            path.display()
        );
        Ok(path)
    }

    /// Rebuild the loader cache rooted at the output tree.
    pub fn refresh_cache(output_root: &Path, ldconfig: &str) {
        let result = Tool::new(ldconfig)
            .arg("-r")
            .arg(output_root.to_string_lossy())
            .allow_nonzero()
            .run();
        match result {
            Ok(r) if r.success() => debug!("Refreshed loader cache in {}", output_root.display()),
            Ok(r) => warn!("ldconfig exited with {}: {}", r.code(), r.stderr_trimmed()),
            Err(e) => warn!("Could not run ldconfig: {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_occurrence_order() {
        let mut conf = LoaderConf::new("etc/ld.so.conf");
        assert!(conf.note_dir(Path::new("/usr/lib")));
        assert!(conf.note_dir(Path::new("/lib64")));
        assert!(!conf.note_dir(Path::new("/usr/lib")));
        assert_eq!(conf.dirs(), &["/usr/lib", "/lib64"]);
    }

    #[test]
    fn test_flush_creates_file() {
        let out = TempDir::new().unwrap();
        let mut conf = LoaderConf::new("etc/ld.so.conf");
        conf.note_dir(Path::new("/usr/lib"));
        conf.note_dir(Path::new("/opt/app/lib"));

        let path = conf.flush(out.path()).unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content, "/usr/lib\n/opt/app/lib\n");
    }

    #[test]
    fn test_flush_preserves_existing_lines() {
        let out = TempDir::new().unwrap();
        fs::create_dir_all(out.path().join("etc")).unwrap();
        fs::write(
            out.path().join("etc/ld.so.conf"),
            "/lib64\n/usr/lib\n/lib64\n",
        )
        .unwrap();

        let mut conf = LoaderConf::new("etc/ld.so.conf");
        conf.note_dir(Path::new("/usr/lib"));
        conf.note_dir(Path::new("/opt/lib"));

        let path = conf.flush(out.path()).unwrap();
        let content = fs::read_to_string(path).unwrap();
        // Existing lines keep their order and are deduplicated; new
        // directories append in discovery order.
        assert_eq!(content, "/lib64\n/usr/lib\n/opt/lib\n");
    }
}
