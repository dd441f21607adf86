//! Directory handling step of the chain.

use anyhow::Result;
use std::path::Path;
use tracing::debug;

use super::{Analyzer, Verdict};
use crate::copy;
use crate::engine::context::EngineContext;

/// Copies directory work items recursively; files fall through to the
/// library and script analyzers.
pub struct Folder;

impl Analyzer for Folder {
    fn name(&self) -> &'static str {
        "folder"
    }

    fn run(&self, ctx: &mut EngineContext, item: &str) -> Result<Verdict> {
        let path = Path::new(item);
        if !path.is_dir() {
            return Ok(Verdict::Continue);
        }

        debug!("Copying directory {}", item);
        copy::copy(ctx, path, true)?;
        Ok(Verdict::Stop)
    }
}
