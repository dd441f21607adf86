//! Command-line surface.

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

/// Reduce a root filesystem to the runtime closure of declared commands.
///
/// The resulting tree (and optional tarball) contains the target
/// executables, their libraries, interpreters and runtime-observed files,
/// and can be imported as a minimal container image.
#[derive(Parser, Debug)]
#[command(name = "minroot", version, about)]
pub struct Cli {
    /// Directory at which the reduced tree is built
    #[arg(short = 'r', long)]
    pub rootfs: PathBuf,

    /// Emit a tarball of the tree ("-" for stdout)
    #[arg(short = 't', long)]
    pub tarfile: Option<String>,

    /// Exclude paths matching this regex prefix (repeatable)
    #[arg(short = 'e', long = "exclude", value_name = "PREFIX")]
    pub excludes: Vec<String>,

    /// Force-include this path, copied recursively at startup (repeatable)
    #[arg(short = 'I', long = "include", value_name = "PATH")]
    pub includes: Vec<String>,

    /// Do not seed the default exclusions (/sys, /tmp, /dev, /proc)
    #[arg(short = 'C', long = "no-exclude-common")]
    pub no_exclude_common: bool,

    /// Record a command line to execute under the tracer (repeatable)
    #[arg(short = 'E', long = "execution", value_name = "CMD")]
    pub executions: Vec<String>,

    /// Rewrite the loader configuration in the output tree (default)
    #[arg(short = 'l', long = "ldconfig", overrides_with = "no_ldconfig")]
    pub ldconfig: bool,

    /// Do not touch the loader configuration
    #[arg(short = 'L', long = "no-ldconfig")]
    pub no_ldconfig: bool,

    /// Activate an analyzer, optionally with parameters
    /// (e.g. strace:seconds=5:mode=slim)
    #[arg(long = "plugin", value_name = "NAME[:k=v...]")]
    pub plugins: Vec<String>,

    /// Activate every known analyzer
    #[arg(long = "plugin-all")]
    pub plugin_all: bool,

    /// Also write log output to this file
    #[arg(short = 'g', long)]
    pub logfile: Option<PathBuf>,

    /// Only warnings and errors
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Debug-level output
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Trace-level output; retains the temporary directory for inspection
    #[arg(long)]
    pub debug: bool,

    /// Reuse a non-empty output directory
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Main execution vector
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl Cli {
    /// Loader rewriting is on unless explicitly disabled.
    pub fn ldconfig_enabled(&self) -> bool {
        !self.no_ldconfig
    }
}

/// Split a command string into a vector, honoring single and double quotes
/// and backslash escapes. The vector is preserved as-is through to the
/// tracer invocation.
pub fn split_command(input: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    'outer: loop {
        let c = match chars.next() {
            Some(c) => c,
            None => break,
        };
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => continue 'outer,
                        Some(c) => current.push(c),
                        None => bail!("Unterminated single quote in '{}'", input),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => continue 'outer,
                        Some('\\') => match chars.next() {
                            Some(e) => current.push(e),
                            None => bail!("Unterminated double quote in '{}'", input),
                        },
                        Some(c) => current.push(c),
                        None => bail!("Unterminated double quote in '{}'", input),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(e) => current.push(e),
                    None => bail!("Trailing backslash in '{}'", input),
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
