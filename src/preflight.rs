//! Host tool availability checks.
//!
//! Tool presence is probed once at startup. Missing required tools fail the
//! run; missing optional tools deactivate the analyzer that needs them.

use anyhow::{bail, Result};
use tracing::{debug, warn};

use crate::process;

/// Resolved paths of the external tools the engine may invoke.
#[derive(Debug, Clone, Default)]
pub struct Toolbox {
    pub strace: Option<String>,
    pub file: Option<String>,
    pub ldd: Option<String>,
    pub ldconfig: Option<String>,
    pub tar: Option<String>,
    pub rsync: Option<String>,
}

impl Toolbox {
    /// Probe PATH for every tool the engine knows how to use.
    pub fn detect() -> Self {
        Self {
            strace: process::which("strace"),
            file: process::which("file"),
            ldd: process::which("ldd"),
            ldconfig: process::which("ldconfig"),
            tar: process::which("tar"),
            rsync: process::which("rsync"),
        }
    }
}

/// Result of a single preflight check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// Check passed.
    Pass,
    /// Check failed - the run cannot proceed.
    Fail,
    /// Tool missing but the run can degrade gracefully.
    Warn,
}

impl CheckResult {
    fn pass(name: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Pass,
            details: Some(details.to_string()),
        }
    }

    fn fail(name: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Fail,
            details: Some(details.to_string()),
        }
    }

    fn warn(name: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warn,
            details: Some(details.to_string()),
        }
    }
}

/// Check the toolbox against what this run needs.
///
/// `ldd` is always required; `tar` only when a tarball was requested. The
/// tracer, the file-typing tool, the cache refresher and rsync degrade.
pub fn check(tools: &Toolbox, need_tar: bool, want_strace: bool, want_ldconfig: bool) -> Result<()> {
    let mut results = Vec::new();

    results.push(required("ldd", &tools.ldd, "dynamic-library closure"));
    if need_tar {
        results.push(required("tar", &tools.tar, "archive emission"));
    }
    if want_strace {
        results.push(optional(
            "strace",
            &tools.strace,
            "runtime tracing disabled",
        ));
    }
    results.push(optional(
        "file",
        &tools.file,
        "script interpreter analysis disabled",
    ));
    if want_ldconfig {
        results.push(optional(
            "ldconfig",
            &tools.ldconfig,
            "loader cache will not be refreshed",
        ));
    }
    results.push(optional(
        "rsync",
        &tools.rsync,
        "falling back to plain recursive copy",
    ));

    let mut failed = Vec::new();
    for check in &results {
        let details = check.details.as_deref().unwrap_or("");
        match check.status {
            CheckStatus::Pass => debug!("{}: {}", check.name, details),
            CheckStatus::Warn => warn!("{} not found; {}", check.name, details),
            CheckStatus::Fail => failed.push(check.name.clone()),
        }
    }

    if !failed.is_empty() {
        bail!("Missing required tool(s): {}", failed.join(", "));
    }
    Ok(())
}

fn required(name: &str, path: &Option<String>, purpose: &str) -> CheckResult {
    match path {
        Some(p) => CheckResult::pass(name, p),
        None => CheckResult::fail(name, purpose),
    }
}

fn optional(name: &str, path: &Option<String>, consequence: &str) -> CheckResult {
    match path {
        Some(p) => CheckResult::pass(name, p),
        None => CheckResult::warn(name, consequence),
    }
}
