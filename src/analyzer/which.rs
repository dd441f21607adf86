//! PATH lookup step of the chain.

use anyhow::Result;
use tracing::{debug, warn};

use super::{Analyzer, Verdict};
use crate::engine::context::EngineContext;
use crate::process;

/// Turns bare command names into absolute paths via the system PATH.
pub struct Which;

impl Analyzer for Which {
    fn name(&self) -> &'static str {
        "which"
    }

    fn run(&self, ctx: &mut EngineContext, item: &str) -> Result<Verdict> {
        if item.contains('/') {
            return Ok(Verdict::Continue);
        }

        match process::which(item) {
            Some(path) if path != item => {
                debug!("{} found at {}", item, path);
                ctx.queue.enqueue(path);
                Ok(Verdict::Stop)
            }
            Some(_) => Ok(Verdict::Continue),
            None => {
                warn!("Command '{}' not found in PATH", item);
                Ok(Verdict::Stop)
            }
        }
    }
}
