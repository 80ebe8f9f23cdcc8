//! The install pipeline.
//!
//! ```text
//! fetch -> check digest -> extract member -> place in bin dir -> <bin> --version
//! ```
//!
//! Everything before placement happens in a staging directory under the
//! install root, so a failed fetch, digest mismatch or broken archive never
//! touches the binary directory. Placement goes through a hidden
//! `.<name>.partial` file and a rename; a binary that fails its smoke test
//! is removed and any previous one is put back.

mod config;
mod paths;

use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    archive::ArchiveExtractor,
    cleanup::{self, CleanupGuard, SharedCleanupContext, spawn_interrupt_handler},
    descriptor::{PackageDescriptor, Sha256Digest, compute_sha256, validate_package_name},
    download::{DownloadError, Downloader, download_file},
    error::{InstallError, VerifyError},
    package::{InstalledArtifact, ReceiptStore},
    runtime::{ProcessOutcome, Runtime},
};

pub use config::{Config, DEFAULT_FETCH_TIMEOUT, DEFAULT_VERIFY_TIMEOUT};
pub use paths::{default_bin_dir, default_install_root};

const VERSION_FLAG: &str = "--version";
const EXECUTABLE_MODE: u32 = 0o755;

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Reinstall even if the receipt says this exact release is in place.
    pub force: bool,
    /// Do not run `<binary> --version` after placement.
    pub skip_verify: bool,
}

pub struct Installer<R: Runtime, D: Downloader, E: ArchiveExtractor> {
    runtime: R,
    downloader: D,
    extractor: E,
    install_root: PathBuf,
    bin_dir: PathBuf,
    verify_timeout: Duration,
}

impl<R: Runtime, D: Downloader, E: ArchiveExtractor> Installer<R, D, E> {
    #[tracing::instrument(skip(runtime, downloader, extractor))]
    pub fn new(
        runtime: R,
        downloader: D,
        extractor: E,
        install_root: PathBuf,
        bin_dir: PathBuf,
    ) -> Self {
        Self {
            runtime,
            downloader,
            extractor,
            install_root,
            bin_dir,
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }

    pub fn with_verify_timeout(mut self, verify_timeout: Duration) -> Self {
        self.verify_timeout = verify_timeout;
        self
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    fn store(&self) -> ReceiptStore<'_, R> {
        ReceiptStore::new(&self.runtime, self.install_root.clone())
    }

    /// Install the release described by `descriptor`.
    ///
    /// Returns the existing receipt untouched when the same release is
    /// already installed and unmodified, unless `options.force` is set.
    #[tracing::instrument(skip(self, descriptor), fields(name = %descriptor.name))]
    pub async fn install(
        &self,
        descriptor: &PackageDescriptor,
        options: InstallOptions,
    ) -> Result<InstalledArtifact, InstallError> {
        descriptor.validate()?;
        let version = descriptor.resolved_version()?;
        let target = self.bin_dir.join(descriptor.binary_name());
        let store = self.store();

        let existing = store.load(&descriptor.name).map_err(|e| {
            InstallError::io(
                format!("failed to read receipt for {}", descriptor.name),
                e,
            )
        })?;
        if let Some(existing) = &existing {
            if !options.force && self.is_current(existing, descriptor, &version, &target) {
                println!(
                    "   {} {} is already installed at {}",
                    existing.name,
                    existing.version,
                    existing.install_path.display()
                );
                return Ok(existing.clone());
            }
            if existing.version != version {
                info!(
                    "Upgrading {} from {} to {}",
                    descriptor.name, existing.version, version
                );
                println!(
                    "   upgrading {} {} -> {}",
                    descriptor.name, existing.version, version
                );
            }
        }

        let staging = store.staging_dir(&descriptor.name, &version);
        self.reset_dir(&staging)?;

        let cleanup_ctx = cleanup::new_shared();
        let _staging_guard = CleanupGuard::new(Arc::clone(&cleanup_ctx), staging.clone());
        let interrupt_handler = spawn_interrupt_handler(Arc::clone(&cleanup_ctx));

        let result = self
            .run_pipeline(descriptor, &version, &staging, &target, options, &cleanup_ctx)
            .await;

        interrupt_handler.abort();
        self.discard(&staging);

        let artifact = result?;
        println!(
            "   installed {} {} to {}",
            artifact.name,
            artifact.version,
            artifact.install_path.display()
        );
        Ok(artifact)
    }

    fn is_current(
        &self,
        existing: &InstalledArtifact,
        descriptor: &PackageDescriptor,
        version: &str,
        target: &Path,
    ) -> bool {
        if !existing.matches(version, &descriptor.content_digest) || existing.install_path != target {
            return false;
        }
        if !self.runtime.exists(target) {
            info!("{:?} is missing, reinstalling", target);
            return false;
        }
        match compute_sha256(&self.runtime, target) {
            Ok(digest) if digest == existing.binary_digest => true,
            Ok(_) => {
                info!("{:?} was modified, reinstalling", target);
                false
            }
            Err(e) => {
                warn!("Failed to hash {:?}: {:#}", target, e);
                false
            }
        }
    }

    async fn run_pipeline(
        &self,
        descriptor: &PackageDescriptor,
        version: &str,
        staging: &Path,
        target: &Path,
        options: InstallOptions,
        cleanup_ctx: &SharedCleanupContext,
    ) -> Result<InstalledArtifact, InstallError> {
        let url = descriptor.source_url.as_str();
        let archive = staging.join(descriptor.archive_file_name());
        if !self.extractor.can_handle(&archive) {
            return Err(InstallError::Extraction {
                archive,
                member: descriptor.member(),
                message: "unsupported archive format".to_string(),
            });
        }

        println!("   fetching {}", url);
        download_file(&self.runtime, url, &archive, &self.downloader)
            .await
            .map_err(|e| match e {
                DownloadError::Create { path, cause } => InstallError::from_write(path, cause),
                DownloadError::Transfer { cause } => InstallError::Fetch {
                    url: url.to_string(),
                    message: format!("{:#}", cause),
                },
            })?;

        let actual = compute_sha256(&self.runtime, &archive)
            .map_err(|e| InstallError::io(format!("failed to hash {:?}", archive), e))?;
        if actual != descriptor.content_digest {
            return Err(InstallError::Integrity {
                url: url.to_string(),
                expected: descriptor.content_digest.clone(),
                actual,
            });
        }
        debug!("Checksum verified: {}", actual);

        let member = descriptor.member();
        let extracted = staging.join(descriptor.binary_name());
        println!("   extracting {}", member);
        self.extractor
            .extract_member(&self.runtime, &archive, Path::new(&member), &extracted)
            .map_err(|e| InstallError::Extraction {
                archive: archive.clone(),
                member: member.clone(),
                message: format!("{:#}", e),
            })?;

        let (binary_digest, backup) =
            self.place(&extracted, target, descriptor.binary_name(), cleanup_ctx)?;

        let artifact = InstalledArtifact {
            name: descriptor.name.clone(),
            version: version.to_string(),
            install_path: target.to_path_buf(),
            source_url: url.to_string(),
            source_digest: actual,
            binary_digest,
        };

        if !options.skip_verify {
            println!("   testing {} {}", target.display(), VERSION_FLAG);
            if let Err(e) = self.verify(&artifact) {
                self.roll_back(target, backup.as_deref());
                return Err(e.into());
            }
        }
        // The backup is only dropped once the receipt describes the new binary
        let store = self.store();
        if let Err(e) = store.save(&artifact) {
            self.roll_back(target, backup.as_deref());
            return Err(InstallError::from_write(store.receipt_path(&artifact.name), e));
        }
        if let Some(backup) = &backup {
            self.discard(backup);
        }
        Ok(artifact)
    }

    /// Move the extracted binary into the bin dir.
    ///
    /// Returns the placed file's digest and, when something was replaced,
    /// where the old file was moved to.
    fn place(
        &self,
        extracted: &Path,
        target: &Path,
        binary_name: &str,
        cleanup_ctx: &SharedCleanupContext,
    ) -> Result<(Sha256Digest, Option<PathBuf>), InstallError> {
        if !self.runtime.exists(&self.bin_dir) {
            self.runtime
                .create_dir_all(&self.bin_dir)
                .map_err(|e| InstallError::from_write(&self.bin_dir, e))?;
        }

        let partial = self.bin_dir.join(format!(".{}.partial", binary_name));
        let _partial_guard = CleanupGuard::new(Arc::clone(cleanup_ctx), partial.clone());

        let digest = match self.stage_executable(extracted, &partial) {
            Ok(digest) => digest,
            Err(e) => {
                self.discard(&partial);
                return Err(e);
            }
        };

        let backup = if self.runtime.exists(target) {
            let backup = self.bin_dir.join(format!(".{}.previous", binary_name));
            if let Err(e) = self.runtime.rename(target, &backup) {
                self.discard(&partial);
                return Err(InstallError::from_write(target, e));
            }
            Some(backup)
        } else {
            None
        };

        println!("   installing {}", target.display());
        if let Err(e) = self.runtime.rename(&partial, target) {
            self.discard(&partial);
            if let Some(backup) = &backup {
                self.restore(backup, target);
            }
            return Err(InstallError::from_write(target, e));
        }

        Ok((digest, backup))
    }

    fn stage_executable(&self, extracted: &Path, partial: &Path) -> Result<Sha256Digest, InstallError> {
        self.runtime
            .copy(extracted, partial)
            .map_err(|e| InstallError::from_write(partial, e))?;
        self.runtime
            .set_permissions(partial, EXECUTABLE_MODE)
            .map_err(|e| InstallError::from_write(partial, e))?;
        compute_sha256(&self.runtime, partial)
            .map_err(|e| InstallError::io(format!("failed to hash {:?}", partial), e))
    }

    fn roll_back(&self, target: &Path, backup: Option<&Path>) {
        warn!("Removing {:?} after a failed install", target);
        self.discard(target);
        if let Some(backup) = backup {
            self.restore(backup, target);
        }
    }

    fn restore(&self, backup: &Path, target: &Path) {
        if let Err(e) = self.runtime.rename(backup, target) {
            warn!(
                "Failed to restore {:?} from {:?}: {:#}",
                target, backup, e
            );
        }
    }

    /// Make `dir` exist and be empty.
    fn reset_dir(&self, dir: &Path) -> Result<(), InstallError> {
        if self.runtime.exists(dir) {
            self.runtime
                .remove_dir_all(dir)
                .map_err(|e| InstallError::from_write(dir, e))?;
        }
        self.runtime
            .create_dir_all(dir)
            .map_err(|e| InstallError::from_write(dir, e))
    }

    /// Best-effort removal of a file or directory.
    fn discard(&self, path: &Path) {
        if !self.runtime.exists(path) {
            return;
        }
        let result = if self.runtime.is_dir(path) {
            self.runtime.remove_dir_all(path)
        } else {
            self.runtime.remove_file(path)
        };
        if let Err(e) = result {
            warn!("Failed to remove {:?}: {:#}", path, e);
        }
    }

    /// Run `<install_path> --version`; only exit status 0 counts as success.
    #[tracing::instrument(skip(self, installed), fields(path = ?installed.install_path))]
    pub fn verify(&self, installed: &InstalledArtifact) -> Result<(), VerifyError> {
        let path = &installed.install_path;
        let outcome = self
            .runtime
            .run_with_timeout(path, &[VERSION_FLAG.to_string()], self.verify_timeout)
            .map_err(|e| VerifyError::Spawn {
                path: path.clone(),
                message: format!("{:#}", e),
            })?;

        match &outcome {
            ProcessOutcome::Exited { stdout, .. } if outcome.success() => {
                let reported = stdout.lines().next().unwrap_or_default().trim();
                info!("{} reports version: {}", installed.name, reported);
                Ok(())
            }
            ProcessOutcome::Exited { code, .. } => Err(VerifyError::NonZeroExit {
                path: path.clone(),
                code: *code,
            }),
            ProcessOutcome::TimedOut => Err(VerifyError::Timeout {
                path: path.clone(),
                secs: self.verify_timeout.as_secs(),
            }),
        }
    }

    /// The receipt for `name`.
    pub fn installed(&self, name: &str) -> Result<InstalledArtifact, InstallError> {
        validate_package_name(name)?;
        self.store()
            .load(name)
            .map_err(|e| InstallError::io(format!("failed to read receipt for {}", name), e))?
            .ok_or_else(|| InstallError::NotInstalled {
                name: name.to_string(),
            })
    }

    /// Remove the installed binary and its receipt.
    ///
    /// Refuses when the binary no longer matches the recorded digest,
    /// unless `force` is set. A binary that is already gone is not an error.
    #[tracing::instrument(skip(self))]
    pub fn uninstall(&self, name: &str, force: bool) -> Result<InstalledArtifact, InstallError> {
        let artifact = self.installed(name)?;
        let path = &artifact.install_path;

        if self.runtime.exists(path) {
            if !force {
                let digest = compute_sha256(&self.runtime, path)
                    .map_err(|e| InstallError::io(format!("failed to hash {:?}", path), e))?;
                if digest != artifact.binary_digest {
                    return Err(InstallError::Modified { path: path.clone() });
                }
            }
            println!("   removing {}", path.display());
            self.runtime
                .remove_file(path)
                .map_err(|e| InstallError::from_write(path, e))?;
        } else {
            warn!("{:?} is already gone", path);
        }

        let store = self.store();
        store
            .remove(name)
            .map_err(|e| InstallError::from_write(store.package_dir(name), e))?;
        println!("   uninstalled {} {}", artifact.name, artifact.version);
        Ok(artifact)
    }

    pub fn list(&self) -> Result<Vec<InstalledArtifact>, InstallError> {
        self.store()
            .list()
            .map_err(|e| InstallError::io(format!("failed to list {:?}", self.install_root), e))
    }
}
