//! Closure-discovery orchestration.
//!
//! Drives the run through its stages: validate and create the output root,
//! eagerly copy forced includes, trace the declared executions, drain the
//! work queue through the analyzer chain, then finalize the loader
//! configuration and emit the tarball.

pub mod context;
pub mod ledger;
pub mod loader;
pub mod queue;

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, debug_span, info, info_span, warn};
use walkdir::WalkDir;

use crate::analyzer::strace::Strace;
use crate::analyzer::{self, Analyzer, Verdict};
use crate::config::Config;
use crate::copy;
use crate::engine::context::EngineContext;
use crate::engine::loader::LoaderConf;
use crate::preflight::{self, Toolbox};
use crate::resolve;
use crate::rules::RuleSet;
use crate::tarball;

/// Output roots that would clobber the host system.
const DANGEROUS_ROOTS: &[&str] = &["/", "/etc", "/var", "/sys", "/proc"];

pub struct Engine {
    ctx: EngineContext,
    analyzers: Vec<Box<dyn Analyzer>>,
    /// Present when runtime tracing is active; also registered in the
    /// chain for execfile matching.
    tracer: Option<Strace>,
    executions: Vec<Vec<String>>,
    tarfile: Option<String>,
    temp: Option<TempDir>,
    keep_temp: bool,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        let tools = Toolbox::detect();
        let want_strace = config.plugins.is_active("strace");
        preflight::check(
            &tools,
            config.tarfile.is_some(),
            want_strace,
            config.ldconfig,
        )?;

        let output_root = prepare_output_root(&config.output_root, config.force)?;

        let temp = TempDir::new().context("Cannot create temporary directory")?;
        let trace_dir = temp.path().to_path_buf();

        let rules = RuleSet::new(&config.excludes, &config.includes, config.exclude_common)?;
        let loader = config
            .ldconfig
            .then(|| LoaderConf::new(config.loader_path.clone()));

        let analyzers = analyzer::registry(&config.plugins, &tools)?;
        let tracer = if want_strace && tools.strace.is_some() {
            Some(Strace::from_config(&config.plugins)?)
        } else {
            None
        };

        let ctx = EngineContext::new(
            output_root,
            rules,
            loader,
            config.plugins,
            config.mode,
            trace_dir,
            tools,
        );

        Ok(Self {
            ctx,
            analyzers,
            tracer,
            executions: config.executions,
            tarfile: config.tarfile,
            temp: Some(temp),
            keep_temp: config.keep_temp,
        })
    }

    /// Run all stages. The temporary directory is removed on the way out
    /// unless retention was requested.
    pub fn run(mut self) -> Result<()> {
        let outcome = self.run_stages();

        if self.keep_temp {
            if let Some(temp) = self.temp.take() {
                let path = temp.keep();
                info!("Retaining temporary directory {}", path.display());
            }
        }

        outcome
    }

    fn run_stages(&mut self) -> Result<()> {
        self.seed()?;
        self.trace_executions()?;
        self.drain();
        self.finalize()
    }

    /// Eagerly copy the forced includes and queue the declared commands.
    fn seed(&mut self) -> Result<()> {
        info!(
            "Building reduced tree at {}",
            self.ctx.output_root.display()
        );

        let includes: Vec<String> = self.ctx.rules.includes().to_vec();
        for include in includes {
            copy::copy(&mut self.ctx, Path::new(&include), true)
                .with_context(|| format!("Forced include '{}' failed", include))?;
        }

        for vector in &self.executions {
            if let Some(program) = vector.first() {
                self.ctx.queue.enqueue(program.clone());
            }
        }
        Ok(())
    }

    /// Trace the user-declared executions before the drain, so that
    /// execve-discovered executables join the queue in execution order.
    fn trace_executions(&mut self) -> Result<()> {
        if let Some(tracer) = &self.tracer {
            for vector in &self.executions {
                tracer.trace(&mut self.ctx, vector.clone())?;
            }
        }
        Ok(())
    }

    /// Pump every queued command through the analyzer chain, FIFO.
    fn drain(&mut self) {
        while let Some(item) = self.ctx.queue.next() {
            let _span = info_span!("analyze", command = %item).entered();
            debug!("Analyzing {}", item);

            for analyzer in &self.analyzers {
                let _inner = debug_span!("step", name = analyzer.name()).entered();
                match analyzer.run(&mut self.ctx, &item) {
                    Ok(Verdict::Continue) => {}
                    Ok(Verdict::Stop) => break,
                    // A single bad item never stops the pipeline
                    Err(e) => warn!("{} failed on {}: {:#}", analyzer.name(), item, e),
                }
            }
        }

        info!(
            "Analyzed {} command(s), performed {} copy operation(s)",
            self.ctx.queue.processed(),
            self.ctx.ledger.len()
        );
    }

    /// Flush the loader configuration, report the tree, emit the tarball.
    fn finalize(&mut self) -> Result<()> {
        if let Some(loader) = &self.ctx.loader {
            match loader.flush(&self.ctx.output_root) {
                Ok(_) => {
                    if let Some(ldconfig) = &self.ctx.tools.ldconfig {
                        LoaderConf::refresh_cache(&self.ctx.output_root, ldconfig);
                    }
                }
                Err(e) => warn!("Could not write loader config: {:#}", e),
            }
        }

        let stats = TreeStats::collect(&self.ctx.output_root);
        info!(
            "Output tree: {} file(s), {} symlink(s), {} dir(s), {:.2} MB",
            stats.files,
            stats.symlinks,
            stats.dirs,
            stats.bytes as f64 / 1024.0 / 1024.0
        );

        if let Some(dest) = &self.tarfile {
            let tar = self.ctx.tools.tar.as_deref().unwrap_or("tar");
            tarball::create(tar, &self.ctx.output_root, dest)?;
        }

        Ok(())
    }
}

/// Validate and create the output root and its scratch `tmp`.
fn prepare_output_root(requested: &Path, force: bool) -> Result<PathBuf> {
    let absolute = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Cannot determine working directory")?
            .join(requested)
    };
    let absolute = resolve::normalize(&absolute);

    let as_str = absolute.to_string_lossy();
    if DANGEROUS_ROOTS.iter().any(|d| *d == as_str) {
        bail!("Refusing to build into {}", as_str);
    }

    let parent = absolute
        .parent()
        .with_context(|| format!("Output root {} has no parent", as_str))?;
    if !parent.is_dir() {
        bail!("Parent of output root does not exist: {}", parent.display());
    }

    if absolute.is_dir() && !force {
        let occupied = fs::read_dir(&absolute)
            .with_context(|| format!("Cannot read {}", as_str))?
            .next()
            .is_some();
        if occupied {
            bail!("Output root {} is not empty (use --force to reuse it)", as_str);
        }
    }

    fs::create_dir_all(&absolute).with_context(|| format!("Cannot create {}", as_str))?;
    fs::create_dir_all(absolute.join("tmp"))
        .with_context(|| format!("Cannot create {}/tmp", as_str))?;

    Ok(absolute)
}

#[derive(Debug, Default)]
struct TreeStats {
    files: usize,
    symlinks: usize,
    dirs: usize,
    bytes: u64,
}

impl TreeStats {
    fn collect(root: &Path) -> Self {
        let mut stats = Self::default();
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let ft = entry.file_type();
            if ft.is_symlink() {
                stats.symlinks += 1;
            } else if ft.is_dir() {
                stats.dirs += 1;
            } else {
                stats.files += 1;
                stats.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        stats
    }
}
