mod tar_gz;
mod zip;

use crate::runtime::Runtime;
use anyhow::{Result, anyhow};
use std::path::{Component, Path, PathBuf};

pub use tar_gz::TarGzExtractor;
pub use zip::ZipExtractor;

/// Trait for format-specific archive extractors
pub trait ArchiveExtractor: Send + Sync {
    /// Check if this extractor can handle the given archive format
    fn can_handle(&self, archive_path: &Path) -> bool;

    /// Extract the single file `member` from the archive and write it to `dest`.
    ///
    /// `member` is matched against entry paths as-is first, then with the
    /// archive's single top-level directory stripped (source tarballs wrap
    /// everything in `<repo>-<tag>/`).
    fn extract_member<R: Runtime>(
        &self,
        runtime: &R,
        archive_path: &Path,
        member: &Path,
        dest: &Path,
    ) -> Result<()>;
}

/// Dispatcher that selects the appropriate extractor based on archive format.
pub struct ArchiveExtractorImpl {
    tar_gz: TarGzExtractor,
    zip: ZipExtractor,
}

impl Default for ArchiveExtractorImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveExtractorImpl {
    pub fn new() -> Self {
        Self {
            tar_gz: TarGzExtractor,
            zip: ZipExtractor,
        }
    }
}

impl ArchiveExtractor for ArchiveExtractorImpl {
    fn can_handle(&self, archive_path: &Path) -> bool {
        self.tar_gz.can_handle(archive_path) || self.zip.can_handle(archive_path)
    }

    #[tracing::instrument(skip(self, runtime))]
    fn extract_member<R: Runtime>(
        &self,
        runtime: &R,
        archive_path: &Path,
        member: &Path,
        dest: &Path,
    ) -> Result<()> {
        if self.tar_gz.can_handle(archive_path) {
            return self
                .tar_gz
                .extract_member(runtime, archive_path, member, dest);
        }
        if self.zip.can_handle(archive_path) {
            return self.zip.extract_member(runtime, archive_path, member, dest);
        }
        Err(anyhow!(
            "Unsupported archive format: {}",
            archive_path.display()
        ))
    }
}

/// Drop `.` components so `./dist/mars` and `dist/mars` compare equal.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Pick the entry that corresponds to `member`, or `None` if nothing does.
///
/// Returns the index into `entries`.
pub(crate) fn resolve_member(entries: &[PathBuf], member: &Path) -> Option<usize> {
    let member = normalize(member);
    let entries: Vec<PathBuf> = entries.iter().map(|p| normalize(p)).collect();

    if let Some(index) = entries.iter().position(|p| *p == member) {
        return Some(index);
    }

    let mut roots = entries.iter().filter_map(|p| p.components().next());
    let root = roots.next()?;
    if roots.any(|c| c != root) {
        return None;
    }

    entries
        .iter()
        .position(|p| {
            p.strip_prefix(root)
                .map(|rest| rest == member.as_path())
                .unwrap_or(false)
        })
}

pub(crate) fn member_not_found(member: &Path, entries: &[PathBuf]) -> anyhow::Error {
    if entries.is_empty() {
        return anyhow!("Archive appears to be empty.");
    }
    let preview = entries
        .iter()
        .take(10)
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    anyhow!(
        "member {:?} not found in archive ({} entries: {}{})",
        member,
        entries.len(),
        preview,
        if entries.len() > 10 { ", ..." } else { "" }
    )
}
