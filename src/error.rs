//! Error taxonomy for install, verify and uninstall.
//!
//! Every variant is terminal for the operation that produced it. Nothing
//! here is retried or recovered locally; the CLI reports it and exits
//! non-zero.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::descriptor::Sha256Digest;

/// Failures of the install pipeline and the package bookkeeping around it.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The descriptor failed validation before anything was fetched.
    #[error("invalid package descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    /// The archive could not be retrieved.
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// The fetched bytes do not hash to the published digest.
    #[error("checksum mismatch for {url}\n  expected: {expected}\n  actual:   {actual}")]
    Integrity {
        url: String,
        expected: Sha256Digest,
        actual: Sha256Digest,
    },

    /// The archive is malformed or does not contain the expected member.
    #[error("failed to extract `{member}` from {archive:?}: {message}")]
    Extraction {
        archive: PathBuf,
        member: String,
        message: String,
    },

    /// The binary directory (or install root) is not writable.
    #[error("permission denied writing {path:?}: {message}")]
    Permission { path: PathBuf, message: String },

    /// The placed executable failed its smoke test.
    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error("{name} is not installed")]
    NotInstalled { name: String },

    /// The installed binary no longer matches what was placed.
    #[error("{path:?} was modified after installation; use --force to remove it anyway")]
    Modified { path: PathBuf },

    /// Any other file system failure.
    #[error("{context}: {message}")]
    Io { context: String, message: String },
}

impl InstallError {
    /// Classify a file system failure while writing `path`.
    ///
    /// Permission problems become [`InstallError::Permission`], everything
    /// else [`InstallError::Io`].
    pub fn from_write(path: impl Into<PathBuf>, err: anyhow::Error) -> Self {
        let path = path.into();
        if is_permission_denied(&err) {
            InstallError::Permission {
                path,
                message: format!("{:#}", err),
            }
        } else {
            InstallError::Io {
                context: format!("failed to write {:?}", path),
                message: format!("{:#}", err),
            }
        }
    }

    pub fn io(context: impl Into<String>, err: anyhow::Error) -> Self {
        InstallError::Io {
            context: context.into(),
            message: format!("{:#}", err),
        }
    }
}

/// Failures of the post-install `--version` smoke test.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("failed to execute {path:?}: {message}")]
    Spawn { path: PathBuf, message: String },

    #[error("`{path:?} --version` exited with {}", describe_code(.code))]
    NonZeroExit { path: PathBuf, code: Option<i32> },

    #[error("`{path:?} --version` did not exit within {secs}s")]
    Timeout { path: PathBuf, secs: u64 },
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

fn is_permission_denied(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .any(|e| e.kind() == io::ErrorKind::PermissionDenied)
}
