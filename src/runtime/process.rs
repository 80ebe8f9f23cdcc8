//! Child process execution with a wall-clock timeout.

use anyhow::{Context, Result};
use log::debug;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

use super::RealRuntime;

/// How a child process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The process exited on its own. `code` is `None` when it was killed by a signal.
    Exited { code: Option<i32>, stdout: String },
    /// The process was still running when the timeout elapsed and has been killed.
    TimedOut,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ProcessOutcome::Exited { code: Some(0), .. })
    }
}

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn run_with_timeout_impl(
        &self,
        program: &Path,
        args: &[String],
        timeout: Duration,
    ) -> Result<ProcessOutcome> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to execute {:?}", program))?;

        match child
            .wait_timeout(timeout)
            .with_context(|| format!("Failed to wait for {:?}", program))?
        {
            Some(status) => {
                let stdout = child
                    .stdout
                    .take()
                    .map(std::io::read_to_string)
                    .transpose()
                    .context("Failed to read process output")?
                    .unwrap_or_default();
                debug!("{:?} exited with {}", program, status);
                Ok(ProcessOutcome::Exited {
                    code: status.code(),
                    stdout,
                })
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                debug!("{:?} timed out after {:?}", program, timeout);
                Ok(ProcessOutcome::TimedOut)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    #[test]
    fn test_outcome_success() {
        let ok = ProcessOutcome::Exited {
            code: Some(0),
            stdout: "mars 0.1.0\n".into(),
        };
        assert!(ok.success());

        let failed = ProcessOutcome::Exited {
            code: Some(2),
            stdout: String::new(),
        };
        assert!(!failed.success());

        let signalled = ProcessOutcome::Exited {
            code: None,
            stdout: String::new(),
        };
        assert!(!signalled.success());
        assert!(!ProcessOutcome::TimedOut.success());
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let result = RealRuntime.run_with_timeout(
            Path::new("/nonexistent/bin/mars"),
            &["--version".to_string()],
            Duration::from_secs(5),
        );
        assert!(result.is_err());
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::tempdir;

        fn script(dir: &Path, body: &str) -> std::path::PathBuf {
            let path = dir.join("mars");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_captures_stdout_and_exit_code() {
            let dir = tempdir().unwrap();
            let program = script(dir.path(), "echo \"mars $1\"; exit 0");

            let outcome = RealRuntime
                .run_with_timeout(&program, &["--version".into()], Duration::from_secs(10))
                .unwrap();

            assert_eq!(
                outcome,
                ProcessOutcome::Exited {
                    code: Some(0),
                    stdout: "mars --version\n".into()
                }
            );
        }

        #[test]
        fn test_non_zero_exit() {
            let dir = tempdir().unwrap();
            let program = script(dir.path(), "exit 3");

            let outcome = RealRuntime
                .run_with_timeout(&program, &[], Duration::from_secs(10))
                .unwrap();

            assert!(matches!(
                outcome,
                ProcessOutcome::Exited { code: Some(3), .. }
            ));
        }

        #[test]
        fn test_kills_process_after_timeout() {
            let dir = tempdir().unwrap();
            let program = script(dir.path(), "exec sleep 30");

            let outcome = RealRuntime
                .run_with_timeout(&program, &[], Duration::from_millis(200))
                .unwrap();

            assert_eq!(outcome, ProcessOutcome::TimedOut);
        }
    }
}
