//! Run configuration assembled once from the parsed command line.
//!
//! Everything downstream reads from this struct (or the engine context
//! built from it); nothing re-parses activation strings or flags later.

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::str::FromStr;

use crate::cli::{split_command, Cli};
use crate::plugin::PluginConfig;

/// Aggressiveness of the trace analyzer's directory copying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Copy only the files actually touched.
    Skinny,
    /// Also copy directories that were opened or created.
    Slim,
    /// Additionally copy parent directories of opened files, outside the
    /// stock system paths.
    Regular,
    /// Like regular, for every traced path.
    Loose,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "skinny" | "default" => Ok(Mode::Skinny),
            "slim" => Ok(Mode::Slim),
            "regular" => Ok(Mode::Regular),
            "loose" => Ok(Mode::Loose),
            other => bail!("Unknown trace mode '{}'", other),
        }
    }
}

/// Validated run configuration.
#[derive(Debug)]
pub struct Config {
    pub output_root: PathBuf,
    pub tarfile: Option<String>,
    pub excludes: Vec<String>,
    pub includes: Vec<String>,
    pub exclude_common: bool,
    /// User-declared executions, main vector first.
    pub executions: Vec<Vec<String>>,
    pub ldconfig: bool,
    /// Loader config location, relative to the output root.
    pub loader_path: PathBuf,
    pub plugins: PluginConfig,
    pub mode: Mode,
    pub force: bool,
    pub keep_temp: bool,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let plugins = PluginConfig::parse(&cli.plugins, cli.plugin_all)?;

        let mode = match plugins.param("strace", "mode") {
            Some(m) => m.parse()?,
            None => Mode::Skinny,
        };

        let mut executions: Vec<Vec<String>> = Vec::new();
        if !cli.command.is_empty() {
            executions.push(cli.command.clone());
        }
        for spec in &cli.executions {
            let vector = split_command(spec)?;
            if !vector.is_empty() {
                executions.push(vector);
            }
        }

        if executions.is_empty() && cli.includes.is_empty() {
            bail!("Nothing to do: declare a command after '--' or use --execution/--include");
        }

        Ok(Self {
            output_root: cli.rootfs.clone(),
            tarfile: cli.tarfile.clone(),
            excludes: cli.excludes.clone(),
            includes: cli.includes.clone(),
            exclude_common: !cli.no_exclude_common,
            executions,
            ldconfig: cli.ldconfig_enabled(),
            loader_path: PathBuf::from("etc/ld.so.conf"),
            plugins,
            mode,
            force: cli.force,
            keep_temp: cli.debug,
        })
    }
}
