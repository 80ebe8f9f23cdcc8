use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow};
use flate2::read::GzDecoder;
use log::{debug, info};
use std::path::{Path, PathBuf};
use tar::{Archive, EntryType};

use super::{ArchiveExtractor, member_not_found, resolve_member};

/// Extractor for .tar.gz / .tgz archives
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".tar.gz") || name.ends_with(".tgz")
    }

    fn extract_member<R: Runtime>(
        &self,
        runtime: &R,
        archive_path: &Path,
        member: &Path,
        dest: &Path,
    ) -> Result<()> {
        // A gzip stream cannot seek: list entries first, then extract in a second pass.
        let (entries, indices) = self.list_entries(runtime, archive_path)?;
        debug!("Archive {:?} has {} entries", archive_path, entries.len());

        let index =
            resolve_member(&entries, member).ok_or_else(|| member_not_found(member, &entries))?;

        let mut archive = self.open(runtime, archive_path)?;
        let mut entry = archive
            .entries()
            .context("Failed to read tar.gz archive")?
            .nth(indices[index])
            .ok_or_else(|| anyhow!("Archive changed while it was being read"))?
            .context("Failed to read tar entry")?;

        if !entry.header().entry_type().is_file() {
            return Err(anyhow!(
                "member {:?} is not a regular file in the archive",
                entries[index]
            ));
        }

        let mut dest_file = runtime.create_file(dest)?;
        std::io::copy(&mut entry, &mut dest_file)
            .with_context(|| format!("Failed to extract {:?}", entries[index]))?;

        info!("Extracted {:?} to {:?}", entries[index], dest);
        Ok(())
    }
}

impl TarGzExtractor {
    fn open<R: Runtime>(
        &self,
        runtime: &R,
        archive_path: &Path,
    ) -> Result<Archive<GzDecoder<Box<dyn std::io::Read + Send>>>> {
        let file = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;
        Ok(Archive::new(GzDecoder::new(file)))
    }

    /// Entry paths, and for each one its position in the raw entry stream.
    ///
    /// Pax extended headers are skipped. `git archive` puts a
    /// `pax_global_header` entry in front of every tag tarball.
    fn list_entries<R: Runtime>(
        &self,
        runtime: &R,
        archive_path: &Path,
    ) -> Result<(Vec<PathBuf>, Vec<usize>)> {
        let mut archive = self.open(runtime, archive_path)?;
        let mut paths = Vec::new();
        let mut indices = Vec::new();
        for (i, entry) in archive
            .entries()
            .context("Failed to read tar.gz archive")?
            .enumerate()
        {
            let entry = entry.context("Failed to read tar entry")?;
            if matches!(
                entry.header().entry_type(),
                EntryType::XGlobalHeader | EntryType::XHeader
            ) {
                continue;
            }
            let path = entry.path().context("Invalid path in tar entry")?;
            paths.push(path.into_owned());
            indices.push(i);
        }
        Ok((paths, indices))
    }
}
