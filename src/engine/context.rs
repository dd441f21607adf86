//! Shared state threaded through every analyzer.
//!
//! Analyzers are functions over this context: they read the rule sets and
//! toolbox, push onto the work queue, record copies in the ledger, and note
//! loader search paths. There is no other mutable state in a run.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::config::Mode;
use crate::engine::ledger::CopyLedger;
use crate::engine::loader::LoaderConf;
use crate::engine::queue::WorkQueue;
use crate::plugin::PluginConfig;
use crate::preflight::Toolbox;
use crate::rules::RuleSet;

pub struct EngineContext {
    /// Absolute directory the reduced tree is built at.
    pub output_root: PathBuf,
    pub rules: RuleSet,
    pub queue: WorkQueue,
    pub ledger: CopyLedger,
    /// None when loader rewriting is disabled.
    pub loader: Option<LoaderConf>,
    pub plugins: PluginConfig,
    pub mode: Mode,
    /// Command vectors already run under the tracer.
    pub traced: HashSet<Vec<String>>,
    /// Scratch directory holding trace logs.
    pub trace_dir: PathBuf,
    pub tools: Toolbox,
}

impl EngineContext {
    pub fn new(
        output_root: PathBuf,
        rules: RuleSet,
        loader: Option<LoaderConf>,
        plugins: PluginConfig,
        mode: Mode,
        trace_dir: PathBuf,
        tools: Toolbox,
    ) -> Self {
        Self {
            output_root,
            rules,
            queue: WorkQueue::new(),
            ledger: CopyLedger::new(),
            loader,
            plugins,
            mode,
            traced: HashSet::new(),
            trace_dir,
            tools,
        }
    }
}
