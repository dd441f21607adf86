//! The analyzer chain.
//!
//! Each queued command passes through the analyzers in a fixed order:
//! `link`, `which`, `folder`, `ldd`, `scripts`, and (when activated and an
//! execfile is configured) `strace`. An analyzer may stop the chain for the
//! current item, typically after enqueueing a replacement that will be
//! analyzed from the top.

pub mod folder;
pub mod ldd;
pub mod link;
pub mod scripts;
pub mod strace;
pub mod which;

use anyhow::Result;
use tracing::debug;

use crate::engine::context::EngineContext;
use crate::plugin::PluginConfig;
use crate::preflight::Toolbox;

/// What an analyzer decided about the current item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Hand the item to the next analyzer.
    Continue,
    /// Skip the remaining analyzers for this item.
    Stop,
}

pub trait Analyzer {
    fn name(&self) -> &'static str;
    fn run(&self, ctx: &mut EngineContext, item: &str) -> Result<Verdict>;
}

/// Build the ordered analyzer registry for this run.
///
/// Analyzers whose external tool is missing are left out; the preflight
/// check has already warned about them.
pub fn registry(plugins: &PluginConfig, tools: &Toolbox) -> Result<Vec<Box<dyn Analyzer>>> {
    let mut chain: Vec<Box<dyn Analyzer>> = vec![
        Box::new(link::Link),
        Box::new(which::Which),
        Box::new(folder::Folder),
        Box::new(ldd::Ldd),
    ];

    if plugins.is_active("scripts") && tools.file.is_some() {
        chain.push(Box::new(scripts::Scripts::from_config(plugins)?));
    } else {
        debug!("Script analyzer inactive");
    }

    if plugins.is_active("strace") && tools.strace.is_some() {
        chain.push(Box::new(strace::Strace::from_config(plugins)?));
    }

    Ok(chain)
}
