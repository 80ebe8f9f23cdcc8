//! Entry points behind the CLI subcommands.

use anyhow::{Context, Result};
use log::debug;
use std::path::PathBuf;
use std::time::Duration;

use crate::{
    archive::ArchiveExtractor,
    descriptor::{PackageDescriptor, Sha256Digest},
    download::Downloader,
    error::InstallError,
    installer::{Config, InstallOptions},
    runtime::Runtime,
};

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Settings {
    pub install_root: Option<PathBuf>,
    pub bin_dir: Option<PathBuf>,
    pub fetch_timeout: Duration,
}

/// What to install, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    /// JSON descriptor file. The built-in `mars` descriptor is used when absent.
    pub descriptor_file: Option<PathBuf>,
    pub url: Option<String>,
    pub sha256: Option<String>,
    pub version: Option<String>,
    pub options: InstallOptions,
}

/// Build the descriptor for `request`, applying command line overrides.
#[tracing::instrument(skip(runtime))]
pub fn resolve_descriptor<R: Runtime>(
    runtime: &R,
    request: &InstallRequest,
) -> Result<PackageDescriptor, InstallError> {
    let mut descriptor = match &request.descriptor_file {
        Some(path) => PackageDescriptor::load(runtime, path)?,
        None => {
            let sha256 = request.sha256.as_deref().ok_or_else(|| {
                InstallError::InvalidDescriptor {
                    reason: "--sha256 is required unless --descriptor is given".to_string(),
                }
            })?;
            PackageDescriptor::mars(parse_digest(sha256)?)
        }
    };

    if let Some(url) = &request.url {
        debug!("Overriding source URL with {}", url);
        descriptor.source_url = url.clone();
    }
    if let Some(sha256) = &request.sha256 {
        descriptor.content_digest = parse_digest(sha256)?;
    }
    if let Some(version) = &request.version {
        descriptor.version = Some(version.clone());
    }

    descriptor.validate()?;
    Ok(descriptor)
}

fn parse_digest(value: &str) -> Result<Sha256Digest, InstallError> {
    Sha256Digest::try_from(value).map_err(|e| InstallError::InvalidDescriptor {
        reason: e.to_string(),
    })
}

#[tracing::instrument(skip(runtime))]
pub async fn install<R: Runtime>(
    runtime: R,
    request: InstallRequest,
    settings: Settings,
) -> Result<()> {
    let descriptor = resolve_descriptor(&runtime, &request)?;
    let config = Config::new(
        runtime,
        settings.install_root,
        settings.bin_dir,
        settings.fetch_timeout,
    )?;
    run_install(&descriptor, request.options, config).await
}

#[tracing::instrument(skip(descriptor, config))]
pub async fn run_install<R: Runtime, D: Downloader, E: ArchiveExtractor>(
    descriptor: &PackageDescriptor,
    options: InstallOptions,
    config: Config<R, D, E>,
) -> Result<()> {
    let installer = config.into_installer()?;
    installer.install(descriptor, options).await?;
    Ok(())
}

/// Re-run the `--version` smoke test for an installed package.
#[tracing::instrument(skip(runtime))]
pub fn verify<R: Runtime>(runtime: R, name: &str, settings: Settings) -> Result<()> {
    let installer = Config::new(
        runtime,
        settings.install_root,
        settings.bin_dir,
        settings.fetch_timeout,
    )?
    .into_installer()?;

    let artifact = installer.installed(name)?;
    installer
        .verify(&artifact)
        .map_err(InstallError::from)?;
    println!(
        "   {} {} at {} is working",
        artifact.name,
        artifact.version,
        artifact.install_path.display()
    );
    Ok(())
}

#[tracing::instrument(skip(runtime))]
pub fn uninstall<R: Runtime>(
    runtime: R,
    name: &str,
    force: bool,
    yes: bool,
    settings: Settings,
) -> Result<()> {
    let installer = Config::new(
        runtime,
        settings.install_root,
        settings.bin_dir,
        settings.fetch_timeout,
    )?
    .into_installer()?;

    let artifact = installer.installed(name)?;
    if !yes {
        let prompt = format!(
            "Remove {} {} ({})?",
            artifact.name,
            artifact.version,
            artifact.install_path.display()
        );
        if !installer
            .runtime()
            .confirm(&prompt)
            .context("Failed to read confirmation")?
        {
            println!("Uninstall cancelled.");
            return Ok(());
        }
    }

    installer.uninstall(name, force)?;
    Ok(())
}

/// Print `name version path` for every installed package.
#[tracing::instrument(skip(runtime))]
pub fn list<R: Runtime>(runtime: R, settings: Settings) -> Result<()> {
    let installer = Config::new(
        runtime,
        settings.install_root,
        settings.bin_dir,
        settings.fetch_timeout,
    )?
    .into_installer()?;

    let artifacts = installer.list()?;
    if artifacts.is_empty() {
        println!("No packages installed.");
        return Ok(());
    }

    debug!("Found {} package(s)", artifacts.len());
    for artifact in artifacts {
        println!(
            "{} {} {}",
            artifact.name,
            artifact.version,
            artifact.install_path.display()
        );
    }
    Ok(())
}
