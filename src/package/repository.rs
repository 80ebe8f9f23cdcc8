//! Receipt store for installed packages.
//!
//! Layout under the install root:
//!
//! ```text
//! <root>/<name>/receipt.json
//! <root>/.staging/<name>-<version>/   (only while an install is running)
//! ```

use anyhow::{Context, Result};
use log::warn;
use std::path::PathBuf;

use crate::runtime::Runtime;

use super::InstalledArtifact;

const RECEIPT_FILE: &str = "receipt.json";
const STAGING_DIR: &str = ".staging";

pub struct ReceiptStore<'a, R: Runtime> {
    runtime: &'a R,
    install_root: PathBuf,
}

impl<'a, R: Runtime> ReceiptStore<'a, R> {
    pub fn new(runtime: &'a R, install_root: PathBuf) -> Self {
        Self {
            runtime,
            install_root,
        }
    }

    /// Returns: `<install_root>/<name>`
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.install_root.join(name)
    }

    /// Returns: `<install_root>/<name>/receipt.json`
    pub fn receipt_path(&self, name: &str) -> PathBuf {
        self.package_dir(name).join(RECEIPT_FILE)
    }

    /// Scratch directory for one install attempt.
    ///
    /// Returns: `<install_root>/.staging/<name>-<version>`
    pub fn staging_dir(&self, name: &str, version: &str) -> PathBuf {
        self.install_root
            .join(STAGING_DIR)
            .join(format!("{}-{}", name, version))
    }

    /// Returns `None` if the package is not installed.
    pub fn load(&self, name: &str) -> Result<Option<InstalledArtifact>> {
        let path = self.receipt_path(name);
        if !self.runtime.exists(&path) {
            return Ok(None);
        }
        InstalledArtifact::load(self.runtime, &path).map(Some)
    }

    /// Write the receipt, replacing any previous one atomically.
    pub fn save(&self, artifact: &InstalledArtifact) -> Result<()> {
        let package_dir = self.package_dir(&artifact.name);
        if !self.runtime.exists(&package_dir) {
            self.runtime.create_dir_all(&package_dir)?;
        }

        let path = self.receipt_path(&artifact.name);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(artifact)?;
        self.runtime
            .write(&tmp, content.as_bytes())
            .with_context(|| format!("Failed to save receipt to {:?}", path))?;
        self.runtime.rename(&tmp, &path)
    }

    /// Remove the receipt and everything else recorded for `name`.
    pub fn remove(&self, name: &str) -> Result<()> {
        let package_dir = self.package_dir(name);
        if self.runtime.exists(&package_dir) {
            self.runtime.remove_dir_all(&package_dir)?;
        }
        Ok(())
    }

    /// All readable receipts, sorted by name. Unreadable ones are logged and skipped.
    #[tracing::instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<InstalledArtifact>> {
        if !self.runtime.exists(&self.install_root) {
            return Ok(Vec::new());
        }

        let mut artifacts = Vec::new();
        for dir in self.runtime.read_dir(&self.install_root)? {
            if dir.file_name().is_some_and(|n| n == STAGING_DIR) || !self.runtime.is_dir(&dir) {
                continue;
            }
            let receipt = dir.join(RECEIPT_FILE);
            if !self.runtime.exists(&receipt) {
                continue;
            }
            match InstalledArtifact::load(self.runtime, &receipt) {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => warn!("Failed to load receipt {:?}: {:#}", receipt, e),
            }
        }

        artifacts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(artifacts)
    }
}
