//! Subprocess management for collaborator binaries.
//!
//! Handles locating collaborator executables and running them to completion.

use crate::error::{ExitCode, ProcessError, ProcessResult};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

/// Captured result of a finished collaborator run.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// A handle on one collaborator executable.
#[derive(Debug, Clone)]
pub struct ExternalProcess {
    name: String,
    binary_path: PathBuf,
    /// `None` waits indefinitely
    timeout: Option<Duration>,
}

impl ExternalProcess {
    pub fn new(name: impl Into<String>, binary_path: PathBuf) -> Self {
        Self {
            name: name.into(),
            binary_path,
            timeout: None,
        }
    }

    /// Locate `binary_name` and build a handle for it.
    ///
    /// Search order:
    /// 1. `explicit`, when given (must exist)
    /// 2. ~/.kcmc/bin/<binary_name>
    /// 3. System PATH
    pub fn locate(binary_name: &str, explicit: Option<&Path>) -> ProcessResult<Self> {
        let path = Self::find_binary(binary_name, explicit)?;
        Ok(Self::new(binary_name, path))
    }

    pub fn find_binary(binary_name: &str, explicit: Option<&Path>) -> ProcessResult<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(ProcessError::MissingBinary {
                path: path.to_path_buf(),
            });
        }

        if let Some(home) = dirs::home_dir() {
            let kcmc_path = home.join(".kcmc").join("bin").join(binary_name);
            if kcmc_path.exists() {
                return Ok(kcmc_path);
            }
        }

        if let Ok(path) = which::which(binary_name) {
            return Ok(path);
        }

        Err(ProcessError::NotInstalled {
            name: binary_name.to_string(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Run the binary with `args` and collect its output.
    ///
    /// A non-zero exit is an error carrying stderr. On timeout the child is
    /// killed when its handle drops.
    pub async fn run<I, S>(&self, args: I) -> ProcessResult<ProcessOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let start = Instant::now();
        let child = Command::new(&self.binary_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Start {
                name: self.name.clone(),
                source,
            })?;

        let output = match self.timeout {
            Some(limit) => timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ProcessError::Timeout {
                    name: self.name.clone(),
                    seconds: limit.as_secs(),
                })??,
            None => child.wait_with_output().await?,
        };

        let exit_code = ExitCode::from_raw(output.status.code());
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !exit_code.is_success() {
            return Err(ProcessError::Failed {
                name: self.name.clone(),
                exit_code,
                message: stderr.trim().to_string(),
            });
        }

        let elapsed = start.elapsed();
        tracing::debug!(
            process = %self.name,
            elapsed_ms = elapsed.as_millis() as u64,
            stdout_bytes = stdout.len(),
            "collaborator finished"
        );
        Ok(ProcessOutput {
            stdout,
            stderr,
            elapsed,
        })
    }

    /// Blocking version of [`run`](Self::run) for synchronous callers.
    ///
    /// Drives the async path on a private current-thread runtime so the
    /// timeout applies here too.
    pub fn run_blocking<I, S>(&self, args: I) -> ProcessResult<ProcessOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run(args))
    }
}

#[cfg(all(test, unix))]
pub(crate) mod test_support {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Writes an executable shell script into `dir`.
    pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }
}
