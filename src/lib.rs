//! minroot: reduce a root filesystem to the runtime closure of declared
//! commands.
//!
//! The closure-discovery engine starts from symbolic command names and
//! iteratively expands to every file needed at runtime: symlink chains,
//! dynamic libraries, script interpreters, and paths observed under a
//! syscall tracer. The result is a self-consistent subtree that can be
//! imported as a minimal container image.

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod copy;
pub mod engine;
pub mod logging;
pub mod plugin;
pub mod preflight;
pub mod process;
pub mod resolve;
pub mod rules;
pub mod tarball;
