use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use super::{ArchiveExtractor, member_not_found, resolve_member};

/// Extractor for .zip archives
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".zip")
    }

    fn extract_member<R: Runtime>(
        &self,
        runtime: &R,
        archive_path: &Path,
        member: &Path,
        dest: &Path,
    ) -> Result<()> {
        let file = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

        // zip crate requires Read + Seek, but Runtime::open returns Box<dyn Read + Send>
        let mut buffer = Vec::new();
        let mut reader = file;
        reader
            .read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read archive {:?}", archive_path))?;
        let mut archive = ZipArchive::new(std::io::Cursor::new(buffer))
            .with_context(|| "Failed to parse ZIP archive")?;

        // Unsafe names are skipped; `indices` maps back to archive positions
        let mut entries: Vec<PathBuf> = Vec::with_capacity(archive.len());
        let mut indices: Vec<usize> = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive
                .by_index(i)
                .with_context(|| format!("Failed to read ZIP entry {}", i))?;
            match entry.enclosed_name() {
                Some(path) => {
                    entries.push(path.to_path_buf());
                    indices.push(i);
                }
                None => debug!("Skipping entry with invalid path: {}", entry.name()),
            }
        }

        let found =
            resolve_member(&entries, member).ok_or_else(|| member_not_found(member, &entries))?;

        let mut entry = archive
            .by_index(indices[found])
            .with_context(|| format!("Failed to read ZIP entry {:?}", entries[found]))?;
        if entry.is_dir() {
            return Err(anyhow!(
                "member {:?} is not a regular file in the archive",
                entries[found]
            ));
        }

        let mut dest_file = runtime.create_file(dest)?;
        std::io::copy(&mut entry, &mut dest_file)
            .with_context(|| format!("Failed to extract {:?}", entries[found]))?;

        info!("Extracted {:?} to {:?}", entries[found], dest);
        Ok(())
    }
}
