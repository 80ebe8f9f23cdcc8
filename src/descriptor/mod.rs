//! Package descriptors.
//!
//! A descriptor is the static, published description of one release
//! artifact: where to fetch it, what it must hash to, and which member of
//! the archive is the executable.

mod digest;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

use crate::error::InstallError;
use crate::runtime::Runtime;

pub use digest::{InvalidDigest, Sha256Digest, compute_sha256, sha256_bytes};

/// Archive extensions understood by the extractor, longest first.
const ARCHIVE_EXTENSIONS: &[&str] = &[".tar.gz", ".tgz", ".zip"];

/// Which archive member to install and under what name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BinarySpec {
    /// Path inside the archive, relative to its single top-level directory
    /// when it has one (e.g. `dist/mars`).
    pub member: String,
    /// File name in the binary directory.
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PackageDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(alias = "url")]
    pub source_url: String,
    #[serde(alias = "sha256")]
    pub content_digest: Sha256Digest,
    #[serde(default)]
    pub license: String,
    /// Explicit version. Derived from `source_url` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<BinarySpec>,
}

impl PackageDescriptor {
    /// The `mars` multi-repo workspace manager, v0.1.0 source release.
    ///
    /// The digest is not baked in: it must be supplied by whoever publishes
    /// the release.
    pub fn mars(content_digest: Sha256Digest) -> Self {
        PackageDescriptor {
            name: "mars".to_string(),
            description: "Multi-repo workspace manager for Git repositories".to_string(),
            homepage: "https://github.com/dean0x/mars".to_string(),
            source_url: "https://github.com/dean0x/mars/archive/refs/tags/v0.1.0.tar.gz"
                .to_string(),
            content_digest,
            license: "MIT".to_string(),
            version: None,
            binary: Some(BinarySpec {
                member: "dist/mars".to_string(),
                name: "mars".to_string(),
            }),
        }
    }

    /// Load a JSON descriptor file and validate it.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self, InstallError> {
        let content = runtime
            .read_to_string(path)
            .map_err(|e| InstallError::InvalidDescriptor {
                reason: format!("{:#}", e),
            })?;
        let descriptor: PackageDescriptor =
            serde_json::from_str(&content).map_err(|e| InstallError::InvalidDescriptor {
                reason: format!("{:?}: {}", path, e),
            })?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Check every invariant the installer relies on.
    pub fn validate(&self) -> Result<(), InstallError> {
        validate_package_name(&self.name)?;

        let url = Url::parse(&self.source_url)
            .map_err(|e| invalid(format!("source_url {:?}: {}", self.source_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(invalid(format!(
                "source_url {:?} must be an http(s) URL",
                self.source_url
            )));
        }

        if archive_extension(&self.archive_file_name()).is_none() {
            return Err(invalid(format!(
                "source_url {:?} does not name a supported archive ({})",
                self.source_url,
                ARCHIVE_EXTENSIONS.join(", ")
            )));
        }

        self.resolved_version()?;

        let name = self.binary_name();
        if !is_plain_file_name(name) {
            return Err(invalid(format!(
                "binary name {:?} must be a plain file name",
                name
            )));
        }

        let member = self.member();
        let member_path = Path::new(&member);
        if member.is_empty()
            || member_path
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(invalid(format!(
                "archive member {:?} must be a relative path inside the archive",
                member
            )));
        }

        Ok(())
    }

    /// The explicit version, or the one encoded in the source URL.
    pub fn resolved_version(&self) -> Result<String, InstallError> {
        if let Some(version) = self.version.as_deref().map(str::trim)
            && !version.is_empty()
        {
            return Ok(version.trim_start_matches('v').to_string());
        }
        version_from_file_name(&self.archive_file_name()).ok_or_else(|| {
            invalid(format!(
                "cannot determine a version from {:?}; set \"version\" explicitly",
                self.source_url
            ))
        })
    }

    pub fn binary_name(&self) -> &str {
        match &self.binary {
            Some(binary) => &binary.name,
            None => &self.name,
        }
    }

    pub fn member(&self) -> String {
        match &self.binary {
            Some(binary) => binary.member.clone(),
            None => format!("dist/{}", self.name),
        }
    }

    /// Last path segment of the source URL, without query or fragment.
    pub fn archive_file_name(&self) -> String {
        let path = match Url::parse(&self.source_url) {
            Ok(url) => url.path().to_string(),
            Err(_) => self.source_url.clone(),
        };
        path.rsplit('/').next().unwrap_or_default().to_string()
    }
}

/// Check that `name` can be used as a directory under the install root.
///
/// Names starting with `.` are reserved for the installer's own entries
/// such as `.staging`.
pub fn validate_package_name(name: &str) -> Result<(), InstallError> {
    if name.trim().is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if !is_plain_file_name(name) || name.starts_with('.') {
        return Err(invalid(format!(
            "package name {:?} must be a plain file name not starting with '.'",
            name
        )));
    }
    Ok(())
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

fn invalid(reason: impl Into<String>) -> InstallError {
    InstallError::InvalidDescriptor {
        reason: reason.into(),
    }
}

fn archive_extension(file_name: &str) -> Option<&'static str> {
    let lower = file_name.to_ascii_lowercase();
    ARCHIVE_EXTENSIONS
        .iter()
        .copied()
        .find(|ext| lower.ends_with(ext) && lower.len() > ext.len())
}

/// Pull a version out of an archive file name.
///
/// `v0.1.0.tar.gz` and `mars-0.1.0.tar.gz` both give `0.1.0`; the version
/// starts at the first digit that follows the start of the name or a `-`
/// (optionally after a `v`).
pub fn version_from_file_name(file_name: &str) -> Option<String> {
    let ext = archive_extension(file_name)?;
    let stem = &file_name[..file_name.len() - ext.len()];

    let starts_version = |s: &str| {
        let s = s.strip_prefix('v').unwrap_or(s);
        s.starts_with(|c: char| c.is_ascii_digit())
    };

    let candidate = if starts_version(stem) {
        Some(stem)
    } else {
        stem.match_indices('-')
            .map(|(i, _)| &stem[i + 1..])
            .find(|rest| starts_version(rest))
    }?;

    Some(candidate.strip_prefix('v').unwrap_or(candidate).to_string())
}
