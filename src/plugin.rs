//! Analyzer activation grammar.
//!
//! Activation strings have the shape `name(:k=v)*(,name(:k=v)*)*`, e.g.
//! `strace:seconds=5:mode=slim,scripts:includefolders=true`. The string is
//! parsed once at startup into a parameter map; nothing re-parses it later.

use anyhow::{bail, Result};
use std::collections::HashMap;

/// Analyzers active in every run.
pub const DEFAULT_ANALYZERS: &[&str] = &["link", "which", "folder", "ldd", "scripts"];

/// Every analyzer the engine knows about. `strace` is opt-in.
pub const ALL_ANALYZERS: &[&str] = &["link", "which", "folder", "ldd", "scripts", "strace"];

/// Parsed analyzer activation and parameters.
#[derive(Debug, Clone, Default)]
pub struct PluginConfig {
    active: HashMap<String, HashMap<String, String>>,
}

impl PluginConfig {
    /// Parse activation strings. The default analyzers are always active;
    /// `all` additionally activates every known analyzer.
    pub fn parse(specs: &[String], all: bool) -> Result<Self> {
        let mut active: HashMap<String, HashMap<String, String>> = HashMap::new();

        for name in DEFAULT_ANALYZERS {
            active.entry(name.to_string()).or_default();
        }
        if all {
            for name in ALL_ANALYZERS {
                active.entry(name.to_string()).or_default();
            }
        }

        for spec in specs {
            for clause in spec.split(',').filter(|c| !c.is_empty()) {
                let mut parts = clause.split(':');
                let name = parts.next().unwrap_or_default();
                if !ALL_ANALYZERS.contains(&name) {
                    bail!("Unknown plugin '{}'", name);
                }
                let params = active.entry(name.to_string()).or_default();
                for kv in parts {
                    match kv.split_once('=') {
                        Some((k, v)) if !k.is_empty() => {
                            params.insert(k.to_string(), v.to_string());
                        }
                        _ => bail!("Malformed plugin parameter '{}' for '{}'", kv, name),
                    }
                }
            }
        }

        Ok(Self { active })
    }

    /// True when the named analyzer is active.
    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    /// Look up a string parameter.
    pub fn param(&self, plugin: &str, key: &str) -> Option<&str> {
        self.active.get(plugin)?.get(key).map(|s| s.as_str())
    }

    /// Look up a boolean parameter (`true`/`false`), defaulting when absent.
    pub fn param_bool(&self, plugin: &str, key: &str, default: bool) -> Result<bool> {
        match self.param(plugin, key) {
            None => Ok(default),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => bail!(
                "Plugin parameter {}:{} must be true or false, got '{}'",
                plugin,
                key,
                other
            ),
        }
    }

    /// Look up an integer parameter, defaulting when absent.
    pub fn param_u64(&self, plugin: &str, key: &str, default: u64) -> Result<u64> {
        match self.param(plugin, key) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|_| {
                anyhow::anyhow!("Plugin parameter {}:{} must be an integer, got '{}'", plugin, key, v)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(specs: &[&str]) -> PluginConfig {
        let specs: Vec<String> = specs.iter().map(|s| s.to_string()).collect();
        PluginConfig::parse(&specs, false).unwrap()
    }

    #[test]
    fn test_defaults_always_active() {
        let cfg = parse(&[]);
        for name in DEFAULT_ANALYZERS {
            assert!(cfg.is_active(name), "{} should be active by default", name);
        }
        assert!(!cfg.is_active("strace"));
    }

    #[test]
    fn test_opt_in_strace() {
        let cfg = parse(&["strace"]);
        assert!(cfg.is_active("strace"));
    }

    #[test]
    fn test_plugin_all() {
        let cfg = PluginConfig::parse(&[], true).unwrap();
        assert!(cfg.is_active("strace"));
        assert!(cfg.is_active("scripts"));
    }

    #[test]
    fn test_parameters() {
        let cfg = parse(&["strace:seconds=5:mode=slim,scripts:includefolders=true"]);
        assert_eq!(cfg.param("strace", "seconds"), Some("5"));
        assert_eq!(cfg.param("strace", "mode"), Some("slim"));
        assert_eq!(cfg.param_u64("strace", "seconds", 3).unwrap(), 5);
        assert!(cfg.param_bool("scripts", "includefolders", false).unwrap());
    }

    #[test]
    fn test_parameter_defaults() {
        let cfg = parse(&["strace"]);
        assert_eq!(cfg.param_u64("strace", "seconds", 3).unwrap(), 3);
        assert!(!cfg.param_bool("strace", "showoutput", false).unwrap());
    }

    #[test]
    fn test_unknown_plugin_rejected() {
        let specs = vec!["frobnicate".to_string()];
        assert!(PluginConfig::parse(&specs, false).is_err());
    }

    #[test]
    fn test_malformed_parameter_rejected() {
        let specs = vec!["strace:seconds".to_string()];
        assert!(PluginConfig::parse(&specs, false).is_err());
    }

    #[test]
    fn test_bad_bool_rejected() {
        let cfg = parse(&["scripts:includefolders=yes"]);
        assert!(cfg.param_bool("scripts", "includefolders", false).is_err());
    }
}
