use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::descriptor::Sha256Digest;
use crate::runtime::Runtime;

/// Record of a successfully installed and verified artifact.
///
/// Persisted as `receipt.json`; its presence is what "installed" means.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InstalledArtifact {
    pub name: String,
    pub version: String,
    /// Full path of the placed executable.
    pub install_path: PathBuf,
    pub source_url: String,
    /// Digest of the fetched archive.
    pub source_digest: Sha256Digest,
    /// Digest of the executable as placed, used to detect local modification.
    pub binary_digest: Sha256Digest,
}

impl InstalledArtifact {
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime.read_to_string(path)?;
        serde_json::from_str(&content).with_context(|| format!("Corrupt receipt {:?}", path))
    }

    /// Whether this receipt describes exactly the given release.
    pub fn matches(&self, version: &str, source_digest: &Sha256Digest) -> bool {
        self.version == version && &self.source_digest == source_digest
    }
}
