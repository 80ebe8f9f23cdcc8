pub mod archive;
pub mod cleanup;
pub mod commands;
pub mod descriptor;
pub mod download;
pub mod error;
pub mod http;
pub mod installer;
pub mod package;
pub mod runtime;

pub use descriptor::PackageDescriptor;
pub use error::{InstallError, VerifyError};
pub use installer::{InstallOptions, Installer};
pub use package::InstalledArtifact;
