//! Host tool invocation.
//!
//! Every external tool the engine drives (the tracer, the linker
//! introspector, the file classifier, the cache refresher, rsync, tar)
//! funnels through here: captured output shaped for the line parsers,
//! errors that carry stderr and an install hint, and a bounded-timeout
//! variant for traced targets that only stop when killed.

use anyhow::{bail, Context, Result};
use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// Captured output of a finished tool.
#[derive(Debug)]
pub struct ToolOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, or -1 when the tool died to a signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    /// Raw stdout, for parsers that need the whole text.
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Trimmed, non-empty stdout lines; the shape the library and
    /// interpreter-path parsers consume.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty())
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// One host-tool invocation.
pub struct Tool {
    program: String,
    args: Vec<String>,
    /// ldd and file report through non-zero exits; those runs are data,
    /// not errors.
    nonzero_ok: bool,
    failure_context: Option<String>,
}

impl Tool {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            nonzero_ok: false,
            failure_context: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Treat a non-zero exit as a reported result rather than a failure.
    pub fn allow_nonzero(mut self) -> Self {
        self.nonzero_ok = true;
        self
    }

    /// Message to lead the error with when the tool fails.
    pub fn failure_context(mut self, msg: impl AsRef<str>) -> Self {
        self.failure_context = Some(msg.as_ref().to_string());
        self
    }

    /// Run to completion and capture output.
    pub fn run(self) -> Result<ToolOutput> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .with_context(|| {
                format!(
                    "Cannot run '{}'; is it installed on this host?",
                    self.program
                )
            })?;

        let result = ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() && !self.nonzero_ok {
            let what = self
                .failure_context
                .unwrap_or_else(|| format!("'{}' failed", self.program));
            let stderr = result.stderr_trimmed();
            if stderr.is_empty() {
                bail!("{} (exit code {})", what, result.code());
            }
            bail!("{} (exit code {}):\n{}", what, result.code(), stderr);
        }

        Ok(result)
    }

    /// Spawn and wait up to `timeout`, killing the child on expiry.
    ///
    /// Returns None when the child had to be killed; traced targets
    /// routinely end that way. Child stdout/stderr are discarded unless
    /// `show_output` is set.
    pub fn run_with_timeout(
        self,
        timeout: Duration,
        show_output: bool,
    ) -> Result<Option<ExitStatus>> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::null());
        if show_output {
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null());
            cmd.stderr(Stdio::null());
        }

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "Cannot run '{}'; is it installed on this host?",
                self.program
            )
        })?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait().context("Failed to poll child process")? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                // SIGKILL; the traced process may ignore anything softer
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

/// Locate a program the way the shell would, requiring the executable
/// bit. Names containing a slash are only checked, not searched.
///
/// Returns the full path if found, None otherwise.
pub fn which(program: &str) -> Option<String> {
    if program.contains('/') {
        return is_executable(Path::new(program)).then(|| program.to_string());
    }
    let path_var = std::env::var_os("PATH")?;
    search_path(program, &path_var).map(|p| p.to_string_lossy().into_owned())
}

/// Walk the entries of a PATH-style variable for `program`.
fn search_path(program: &str, path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
