//! Shared test utilities for minroot tests.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use minroot::config::Mode;
use minroot::engine::context::EngineContext;
use minroot::plugin::PluginConfig;
use minroot::preflight::Toolbox;
use minroot::rules::RuleSet;

/// Test environment with a mock source tree and an output root.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Mock source tree the engine lifts files from
    pub source: PathBuf,
    /// Output root the reduced tree is built at
    pub output: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let source = base.join("source");
        let output = base.join("output");
        fs::create_dir_all(&source).expect("Failed to create source dir");
        fs::create_dir_all(&output).expect("Failed to create output dir");

        Self {
            _temp_dir: temp_dir,
            source,
            output,
        }
    }

    /// Build an engine context over the output root.
    ///
    /// No external tools are configured, so copies take the in-crate
    /// fallback path and tests stay host-independent.
    pub fn context(&self) -> EngineContext {
        self.context_with(&[], Mode::Skinny)
    }

    pub fn context_with(&self, excludes: &[&str], mode: Mode) -> EngineContext {
        let excludes: Vec<String> = excludes.iter().map(|s| s.to_string()).collect();
        // The default /tmp exclusion is off: the mock trees live there
        EngineContext::new(
            self.output.clone(),
            RuleSet::new(&excludes, &[], false).unwrap(),
            None,
            PluginConfig::parse(&[], false).unwrap(),
            mode,
            self.output.join("tmp"),
            Toolbox::default(),
        )
    }

    /// Destination of a source path inside the output tree.
    pub fn in_output(&self, source_path: &Path) -> PathBuf {
        self.output
            .join(source_path.strip_prefix("/").expect("absolute path"))
    }
}

/// Create a mock executable file.
pub fn create_mock_binary(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir for binary");
    }
    fs::write(path, "#!/bin/sh\necho mock\n").expect("Failed to create mock binary");

    let mut perms = fs::metadata(path)
        .expect("Failed to get metadata")
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("Failed to set permissions");
}

/// Create a mock shared library file.
pub fn create_mock_library(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir for library");
    }
    fs::write(path, b"\x7fELF").expect("Failed to create mock library");
}

/// Assert that a symlink exists and points to the expected target.
pub fn assert_symlink(path: &Path, expected_target: &str) {
    assert!(
        path.is_symlink(),
        "Expected symlink at {}, but it's not a symlink",
        path.display()
    );

    let target = fs::read_link(path).expect("Failed to read symlink");
    assert_eq!(
        target.to_string_lossy(),
        expected_target,
        "Symlink {} points to {:?}, expected {}",
        path.display(),
        target,
        expected_target
    );
}

/// Assert that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "Expected file to exist: {}", path.display());
}
