//! Dynamic-library closure step of the chain.
//!
//! Runs the linker introspector on the command and enqueues every shared
//! object it reports, noting each library directory for the loader config.
//! Static binaries produce no library lines but are still copied.

use anyhow::Result;
use std::path::Path;
use tracing::debug;

use super::{Analyzer, Verdict};
use crate::copy;
use crate::engine::context::EngineContext;
use crate::process::Tool;

pub struct Ldd;

impl Analyzer for Ldd {
    fn name(&self) -> &'static str {
        "ldd"
    }

    fn run(&self, ctx: &mut EngineContext, item: &str) -> Result<Verdict> {
        let path = Path::new(item);
        if !path.is_file() {
            debug!("{} is not a regular file, skipping", item);
            return Ok(Verdict::Stop);
        }

        let ldd = ctx.tools.ldd.as_deref().unwrap_or("ldd");
        // ldd exits non-zero for static or non-ELF inputs; those still get
        // copied below.
        let output = Tool::new(ldd).arg(item).allow_nonzero().run()?;

        for lib in parse_ldd_output(output.stdout()) {
            let lib_path = Path::new(&lib);
            if let Some(loader) = ctx.loader.as_mut() {
                if let Some(dir) = lib_path.parent() {
                    loader.note_dir(dir);
                }
            }
            ctx.queue.enqueue(lib);
        }

        copy::copy(ctx, path, false)?;
        Ok(Verdict::Continue)
    }
}

/// Extract absolute library paths from introspector output.
///
/// Lines look like `libc.so.6 => /lib/x86_64-linux-gnu/libc.so.6 (0x...)`
/// or `/lib64/ld-linux-x86-64.so.2 (0x...)`. The virtual DSO and the
/// static-binary marker are dropped, as are unresolved libraries.
pub fn parse_ldd_output(output: &str) -> Vec<String> {
    let mut libs = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty()
            || line.contains("linux-vdso")
            || line.contains("linux-gate")
            || line.contains("statically linked")
            || line.contains("not found")
        {
            continue;
        }

        let candidate = match line.split_once("=>") {
            Some((_, rhs)) => rhs.trim(),
            None => line,
        };

        // Strip the trailing load address
        let path = match candidate.split_once(" (") {
            Some((p, _)) => p.trim(),
            None => candidate,
        };

        if path.starts_with('/') {
            libs.push(path.to_string());
        }
    }

    libs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ldd_output() {
        let output = "\
\tlinux-vdso.so.1 (0x00007ffd0a1f2000)
\tlibtinfo.so.6 => /lib/x86_64-linux-gnu/libtinfo.so.6 (0x00007f2f9e400000)
\tlibc.so.6 => /lib/x86_64-linux-gnu/libc.so.6 (0x00007f2f9e1d7000)
\t/lib64/ld-linux-x86-64.so.2 (0x00007f2f9e5cb000)
";
        let libs = parse_ldd_output(output);
        assert_eq!(
            libs,
            vec![
                "/lib/x86_64-linux-gnu/libtinfo.so.6",
                "/lib/x86_64-linux-gnu/libc.so.6",
                "/lib64/ld-linux-x86-64.so.2",
            ]
        );
    }

    #[test]
    fn test_parse_static_binary() {
        let output = "\tstatically linked\n";
        assert!(parse_ldd_output(output).is_empty());
    }

    #[test]
    fn test_parse_unresolved_dropped() {
        let output = "\tlibmagic.so.1 => not found\n";
        assert!(parse_ldd_output(output).is_empty());
    }

    #[test]
    fn test_parse_non_elf() {
        let output = "\tnot a dynamic executable\n";
        assert!(parse_ldd_output(output).is_empty());
    }
}
