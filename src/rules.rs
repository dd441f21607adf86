//! Path rule sets: user exclusions, forced includes, protected and stock paths.
//!
//! All sets are compiled to anchored prefix regexes once at startup and
//! consulted on every copy decision.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;

/// Default exclusion prefixes, seeded unless the user disables them.
pub const COMMON_EXCLUDES: &[&str] = &["/sys", "/tmp", "/dev", "/proc"];

/// Paths that are never copied, regardless of user rules.
const PROTECTED: &[&str] = &["^/$", "^/proc(/|$)", "^/dev(/|$)", "^/sys(/|$)"];

/// Standard system directories whose bulk copy would defeat minimization.
/// The trace analyzer refuses to copy a parent directory matching these.
const STOCK_DIRS: &[&str] = &[
    "^/$",
    "^/boot/?$",
    "^/home/?$",
    "^/sys/?$",
    "^/tmp/?$",
    "^/usr/?$",
    "^/bin/?$",
    "^/sbin/?$",
    "^/etc/?$",
    "^/var/?$",
    "^/proc/?$",
    "^/dev/?$",
    "^/lib/?$",
    "^/lib64/?$",
    "^/usr/lib/?$",
    "^/usr/lib64/?$",
    "^/usr/bin/?$",
    "^/usr/sbin/?$",
    "^/var/lib/?$",
];

/// Compiled inclusion/exclusion rules for one run.
pub struct RuleSet {
    /// Raw exclusion prefixes as given (handed to rsync verbatim).
    excluded_raw: Vec<String>,
    excluded: Vec<Regex>,
    /// Forced include paths, copied eagerly at startup.
    included: Vec<String>,
    protected: Vec<Regex>,
    stock: Vec<Regex>,
}

impl RuleSet {
    /// Build the rule set from user-supplied prefixes.
    ///
    /// `common` seeds the default exclusions for volatile system trees.
    pub fn new(excludes: &[String], includes: &[String], common: bool) -> Result<Self> {
        let mut excluded_raw: Vec<String> = Vec::new();
        if common {
            excluded_raw.extend(COMMON_EXCLUDES.iter().map(|s| s.to_string()));
        }
        excluded_raw.extend(excludes.iter().cloned());

        let excluded = excluded_raw
            .iter()
            .map(|p| {
                Regex::new(&format!("^{}", p))
                    .with_context(|| format!("Invalid exclusion pattern '{}'", p))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            excluded_raw,
            excluded,
            included: includes.to_vec(),
            protected: compile_fixed(PROTECTED),
            stock: compile_fixed(STOCK_DIRS),
        })
    }

    /// Forced include paths, in user order.
    pub fn includes(&self) -> &[String] {
        &self.included
    }

    /// Raw exclusion prefixes, for handing to the whitelisting copier.
    pub fn exclude_prefixes(&self) -> &[String] {
        &self.excluded_raw
    }

    /// True when the path may never appear in the output tree.
    pub fn is_protected(&self, path: &Path) -> bool {
        let s = path.to_string_lossy();
        self.protected.iter().any(|re| re.is_match(&s))
    }

    /// Returns the matching exclusion prefix, if any.
    pub fn excluded_by(&self, path: &Path) -> Option<&str> {
        let s = path.to_string_lossy();
        self.excluded
            .iter()
            .position(|re| re.is_match(&s))
            .map(|i| self.excluded_raw[i].as_str())
    }

    /// True when `dir` is a stock system directory that must not be
    /// bulk-copied by the trace analyzer.
    pub fn is_stock_dir(&self, dir: &Path) -> bool {
        let s = dir.to_string_lossy();
        self.stock.iter().any(|re| re.is_match(&s))
    }
}

fn compile_fixed(patterns: &[&str]) -> Vec<Regex> {
    // Built-in patterns are known-valid
    patterns
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
}
