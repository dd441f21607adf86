//! Runtime tracing step.
//!
//! Runs a declared command vector under the syscall tracer for a bounded
//! interval and harvests every file path the process touched. How much of
//! the surrounding directory structure is pulled in depends on the mode.
//!
//! Unlike the other analyzers this one is driven two ways: the orchestrator
//! traces user-declared executions before the queue drain, and during the
//! drain any queued command matching a line of the configured execfile gets
//! that whole line traced.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Analyzer, Verdict};
use crate::cli::split_command;
use crate::config::Mode;
use crate::copy;
use crate::engine::context::EngineContext;
use crate::plugin::PluginConfig;
use crate::process::{self, Tool};

#[derive(Debug, Clone)]
pub struct Strace {
    seconds: u64,
    show_output: bool,
    /// Parsed execfile lines; a queued command matching any token of a
    /// line triggers tracing of the whole line.
    execfile: Vec<Vec<String>>,
}

impl Strace {
    pub fn from_config(plugins: &PluginConfig) -> Result<Self> {
        let mut execfile = Vec::new();
        if let Some(path) = plugins.param("strace", "execfile") {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Cannot read execfile {}", path))?;
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let vector = split_command(line)?;
                if !vector.is_empty() {
                    execfile.push(vector);
                }
            }
        }

        Ok(Self {
            seconds: plugins.param_u64("strace", "seconds", 3)?,
            show_output: plugins.param_bool("strace", "showoutput", false)?,
            execfile,
        })
    }

    /// Trace one command vector and ingest everything it touched.
    pub fn trace(&self, ctx: &mut EngineContext, vector: Vec<String>) -> Result<()> {
        if vector.is_empty() || ctx.traced.contains(&vector) {
            return Ok(());
        }
        ctx.traced.insert(vector.clone());

        let tracer = match ctx.tools.strace.clone() {
            Some(t) => t,
            None => {
                debug!("No tracer available, skipping {:?}", vector);
                return Ok(());
            }
        };

        info!("Tracing {:?} for up to {}s", vector, self.seconds);
        let log_path = ctx
            .trace_dir
            .join(format!("strace-{:03}.log", ctx.traced.len()));

        let status = Tool::new(&tracer)
            .arg("-f")
            .arg("-e")
            .arg("trace=file")
            .arg("-o")
            .arg(log_path.to_string_lossy())
            .args(vector.iter())
            .run_with_timeout(Duration::from_secs(self.seconds), self.show_output)?;
        if status.is_none() {
            // Hitting the timeout is the normal way long-running targets end
            debug!("Traced process killed after {}s", self.seconds);
        }

        let log = match fs::read_to_string(&log_path) {
            Ok(text) => text,
            Err(e) => {
                warn!("No trace log at {}: {}", log_path.display(), e);
                return Ok(());
            }
        };

        let report = parse_trace_log(&log);
        debug!(
            "Trace yielded {} path(s), {} exec(s), {} open/mkdir target(s)",
            report.all.len(),
            report.execs.len(),
            report.opened.len()
        );
        apply_report(ctx, &report);

        // The traced binary itself
        let program = &vector[0];
        let binary = if program.contains('/') {
            Some(program.clone())
        } else {
            process::which(program)
        };
        if let Some(binary) = binary {
            if let Err(e) = copy::copy(ctx, Path::new(&binary), false) {
                debug!("Could not copy traced binary {}: {:#}", binary, e);
            }
        }

        Ok(())
    }
}

impl Analyzer for Strace {
    fn name(&self) -> &'static str {
        "strace"
    }

    fn run(&self, ctx: &mut EngineContext, item: &str) -> Result<Verdict> {
        let matching: Vec<Vec<String>> = self
            .execfile
            .iter()
            .filter(|line| line.iter().any(|token| token == item))
            .cloned()
            .collect();
        for vector in matching {
            self.trace(ctx, vector)?;
        }
        Ok(Verdict::Continue)
    }
}

/// Paths harvested from one trace log, deduplicated and ordered.
#[derive(Debug, Default)]
pub struct TraceReport {
    /// Strings recorded by exec-family syscalls.
    pub execs: BTreeSet<String>,
    /// Strings recorded by open/mkdir-family syscalls.
    pub opened: BTreeSet<String>,
    /// Every quoted string in the log.
    pub all: BTreeSet<String>,
}

/// Extract and classify the quoted string arguments of a tracer log.
pub fn parse_trace_log(log: &str) -> TraceReport {
    // `pid  syscall(args) = ret`, with an optional [pid N] prefix
    let syscall_re = Regex::new(r"^(?:\[pid\s+\d+\]\s+|\d+\s+)?([a-z0-9_]+)\(").unwrap();
    let quoted_re = Regex::new(r#""((?:[^"\\]|\\.)*)""#).unwrap();

    let mut report = TraceReport::default();
    for line in log.lines() {
        let syscall = match syscall_re.captures(line) {
            Some(caps) => caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
            None => continue,
        };

        for caps in quoted_re.captures_iter(line) {
            let value = caps[1].to_string();
            if syscall.starts_with("exec") {
                report.execs.insert(value.clone());
            } else if syscall.starts_with("open")
                || syscall.starts_with("mkdir")
                || syscall == "creat"
            {
                report.opened.insert(value.clone());
            }
            report.all.insert(value);
        }
    }
    report
}

/// Enqueue and copy the report's paths according to the mode policy.
pub(crate) fn apply_report(ctx: &mut EngineContext, report: &TraceReport) {
    let copy_opened_dirs = ctx.mode != Mode::Skinny;
    let copy_opened_parents = matches!(ctx.mode, Mode::Regular | Mode::Loose);
    let copy_all_parents = ctx.mode == Mode::Loose;

    // Executables feed back into the queue
    for p in &report.execs {
        if is_usable_path(p) && Path::new(p).is_file() {
            ctx.queue.enqueue(p.clone());
        }
    }

    // Plain file accesses
    for p in &report.all {
        if report.execs.contains(p) || !is_usable_path(p) {
            continue;
        }
        let path = Path::new(p);
        if !path.is_file() {
            continue;
        }
        if is_lib_like(path) {
            ctx.queue.enqueue(p.clone());
        } else if let Err(e) = copy::copy(ctx, path, false) {
            debug!("Skipping traced file {}: {:#}", p, e);
        }
    }

    // Directories opened or created by the target
    if copy_opened_dirs {
        for p in &report.opened {
            if !is_usable_path(p) {
                continue;
            }
            let path = Path::new(p);
            if path.is_dir() {
                if let Err(e) = copy::copy(ctx, path, true) {
                    debug!("Skipping traced directory {}: {:#}", p, e);
                }
            }
        }
    }

    if copy_opened_parents {
        copy_parent_dirs(ctx, &report.opened);
    }
    if copy_all_parents {
        copy_parent_dirs(ctx, &report.all);
    }
}

/// Copy the parent directories of accessed files, refusing stock system
/// directories whose bulk copy would defeat minimization.
fn copy_parent_dirs(ctx: &mut EngineContext, paths: &BTreeSet<String>) {
    let mut parents: BTreeSet<String> = BTreeSet::new();
    for p in paths {
        if !is_usable_path(p) || !Path::new(p).is_file() {
            continue;
        }
        if let Some(parent) = Path::new(p).parent() {
            parents.insert(parent.to_string_lossy().into_owned());
        }
    }

    for parent in parents {
        let dir = Path::new(&parent);
        if ctx.rules.is_stock_dir(dir) {
            debug!("Not bulk-copying stock directory {}", parent);
            continue;
        }
        if !dir.is_dir() {
            continue;
        }
        if let Err(e) = copy::copy(ctx, dir, true) {
            debug!("Skipping parent directory {}: {:#}", parent, e);
        }
    }
}

/// A traced string is worth acting on when it is a plain path that still
/// resolves to a regular file or directory. Flags and tracer noise are
/// dropped here; symlinked paths count, the resolver mirrors them later.
fn is_usable_path(s: &str) -> bool {
    if s.is_empty() || s == "/" || s == "." || s == ".." {
        return false;
    }
    if s.starts_with('!') || s.starts_with('-') {
        return false;
    }
    match fs::metadata(s) {
        Ok(meta) => meta.is_file() || meta.is_dir(),
        Err(_) => false,
    }
}

/// Shared-object-looking name, routed through the library analyzer instead
/// of being copied verbatim.
fn is_lib_like(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.starts_with("lib") || name.ends_with(".so")
}
