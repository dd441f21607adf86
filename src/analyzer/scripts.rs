//! Script interpreter step of the chain.
//!
//! Classifies the command with the file-typing tool; scripts get their
//! shebang interpreter enqueued. The portable env launcher is followed to
//! its program argument, and for the recognized interpreters the standard
//! library search paths can be pulled in as well.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

use super::{Analyzer, Verdict};
use crate::engine::context::EngineContext;
use crate::plugin::PluginConfig;
use crate::process::{self, Tool};

/// Interpreters whose shebangs we know how to follow.
const RECOGNIZED: &[&str] = &["bash", "sh", "perl", "python", "env"];

#[derive(Debug, Clone)]
pub struct Scripts {
    include_folders: bool,
}

impl Scripts {
    pub fn from_config(plugins: &PluginConfig) -> Result<Self> {
        Ok(Self {
            include_folders: plugins.param_bool("scripts", "includefolders", false)?,
        })
    }
}

impl Analyzer for Scripts {
    fn name(&self) -> &'static str {
        "scripts"
    }

    fn run(&self, ctx: &mut EngineContext, item: &str) -> Result<Verdict> {
        let path = Path::new(item);
        if !path.is_file() {
            return Ok(Verdict::Continue);
        }

        let file_tool = ctx.tools.file.as_deref().unwrap_or("file");
        let kind = Tool::new(file_tool)
            .arg("--brief")
            .arg(item)
            .allow_nonzero()
            .run()?;
        if !kind.stdout().to_lowercase().contains("script") {
            return Ok(Verdict::Continue);
        }

        let shebang = match read_shebang(path)? {
            Some(s) => s,
            None => return Ok(Verdict::Continue),
        };
        debug!("{} is a script: #!{} {}", item, shebang.interpreter, shebang.args.join(" "));

        ctx.queue.enqueue(shebang.interpreter.clone());

        // The effective interpreter is what env eventually launches
        let mut effective = shebang.interpreter.clone();
        if interpreter_base(&shebang.interpreter) == "env" {
            if let Some(program) = shebang.args.iter().find(|a| !a.starts_with('-')) {
                let resolved = if program.contains('/') {
                    program.clone()
                } else {
                    process::which(program).unwrap_or_else(|| program.clone())
                };
                ctx.queue.enqueue(resolved.clone());
                effective = resolved;
            }
        }

        let base = interpreter_base(&effective);
        if !RECOGNIZED.contains(&base.as_str()) {
            warn!("Unrecognized interpreter '{}' for {}", effective, item);
            return Ok(Verdict::Stop);
        }

        if self.include_folders {
            for dir in library_search_paths(&effective, &base)? {
                ctx.queue.enqueue(dir);
            }
        }

        Ok(Verdict::Continue)
    }
}

/// Parsed `#!interpreter args...` line.
#[derive(Debug, PartialEq, Eq)]
pub struct Shebang {
    pub interpreter: String,
    pub args: Vec<String>,
}

/// Read the shebang line of a script, if it has one.
pub fn read_shebang(path: &Path) -> Result<Option<Shebang>> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut first_line = String::new();
    BufReader::new(file)
        .read_line(&mut first_line)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    Ok(parse_shebang(&first_line))
}

/// Parse a shebang line. Returns None for anything that does not start
/// with `#!` or names no interpreter.
pub fn parse_shebang(line: &str) -> Option<Shebang> {
    let rest = line.strip_prefix("#!")?.trim();
    let mut words = rest.split_whitespace();
    let interpreter = words.next()?.to_string();
    Some(Shebang {
        interpreter,
        args: words.map(|w| w.to_string()).collect(),
    })
}

/// Interpreter basename with any version suffix stripped: `python3.11`
/// and `python3` both map to `python`.
fn interpreter_base(interpreter: &str) -> String {
    let name = Path::new(interpreter)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.')
        .to_string()
}

/// Ask the interpreter for its library search paths. Only perl and python
/// have one; the shells do not.
fn library_search_paths(interpreter: &str, base: &str) -> Result<Vec<String>> {
    let result = match base {
        "perl" => Tool::new(interpreter)
            .arg("-e")
            .arg(r#"print join("\n", @INC)"#)
            .allow_nonzero()
            .run()?,
        "python" => Tool::new(interpreter)
            .arg("-c")
            .arg(r#"import sys; print("\n".join(sys.path))"#)
            .allow_nonzero()
            .run()?,
        _ => return Ok(Vec::new()),
    };

    if !result.success() {
        warn!(
            "Could not query search paths from {}: {}",
            interpreter,
            result.stderr_trimmed()
        );
        return Ok(Vec::new());
    }

    Ok(filter_search_paths(result.lines()))
}

/// Keep only absolute paths outside /home.
fn filter_search_paths<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<String> {
    lines
        .map(|l| l.trim())
        .filter(|l| l.starts_with('/') && !l.starts_with("/home"))
        .map(|l| l.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shebang_plain() {
        let s = parse_shebang("#!/bin/bash\n").unwrap();
        assert_eq!(s.interpreter, "/bin/bash");
        assert!(s.args.is_empty());
    }

    #[test]
    fn test_parse_shebang_env() {
        let s = parse_shebang("#!/usr/bin/env python3\n").unwrap();
        assert_eq!(s.interpreter, "/usr/bin/env");
        assert_eq!(s.args, vec!["python3"]);
    }

    #[test]
    fn test_parse_shebang_with_space() {
        let s = parse_shebang("#! /usr/bin/perl -w\n").unwrap();
        assert_eq!(s.interpreter, "/usr/bin/perl");
        assert_eq!(s.args, vec!["-w"]);
    }

    #[test]
    fn test_parse_shebang_rejects_plain_line() {
        assert!(parse_shebang("echo hello\n").is_none());
        assert!(parse_shebang("#!\n").is_none());
    }

    #[test]
    fn test_interpreter_base_strips_versions() {
        assert_eq!(interpreter_base("/usr/bin/python3.11"), "python");
        assert_eq!(interpreter_base("/usr/bin/python3"), "python");
        assert_eq!(interpreter_base("/usr/bin/perl"), "perl");
        assert_eq!(interpreter_base("/usr/bin/env"), "env");
        assert_eq!(interpreter_base("/bin/sh"), "sh");
    }

    #[test]
    fn test_filter_search_paths() {
        let lines = vec![
            "/usr/lib/python3.11",
            "",
            ".",
            "/home/user/.local/lib",
            "relative/path",
            "/usr/lib/python3.11/site-packages",
        ];
        assert_eq!(
            filter_search_paths(lines.into_iter()),
            vec![
                "/usr/lib/python3.11",
                "/usr/lib/python3.11/site-packages"
            ]
        );
    }
}
