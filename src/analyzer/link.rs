//! Symlink resolution step of the chain.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{Analyzer, Verdict};
use crate::engine::context::EngineContext;
use crate::resolve;

/// Resolves symlinks in the command's path, mirroring the link topology
/// into the output tree. A command that resolves elsewhere is re-queued
/// under its real path and analysis of the alias stops.
pub struct Link;

impl Analyzer for Link {
    fn name(&self) -> &'static str {
        "link"
    }

    fn run(&self, ctx: &mut EngineContext, item: &str) -> Result<Verdict> {
        let path = Path::new(item);
        if !path.is_absolute() {
            return Ok(Verdict::Continue);
        }

        let resolved = resolve::resolve(&ctx.output_root, path);
        if resolved != PathBuf::from(item) {
            debug!("{} resolves to {}", item, resolved.display());
            ctx.queue.enqueue(resolved.to_string_lossy().into_owned());
            return Ok(Verdict::Stop);
        }
        Ok(Verdict::Continue)
    }
}
