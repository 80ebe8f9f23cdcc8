use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::runtime::Runtime;

/// Where receipts and staging directories live when `--root` is not given.
#[tracing::instrument(skip(runtime))]
pub fn default_install_root<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    if runtime.is_privileged() {
        Ok(system_install_root())
    } else {
        let home_dir = runtime
            .home_dir()
            .context("Could not find home directory")?;
        Ok(home_dir.join(".mars-install"))
    }
}

/// Where executables are placed when `--bin-dir` is not given.
#[tracing::instrument(skip(runtime))]
pub fn default_bin_dir<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    if runtime.is_privileged() {
        Ok(system_bin_dir())
    } else {
        let home_dir = runtime
            .home_dir()
            .context("Could not find home directory")?;
        Ok(home_dir.join(".local").join("bin"))
    }
}

#[cfg(target_os = "windows")]
fn system_install_root() -> PathBuf {
    PathBuf::from(r"C:\ProgramData\mars-install")
}

#[cfg(not(target_os = "windows"))]
fn system_install_root() -> PathBuf {
    PathBuf::from("/usr/local/var/mars-install")
}

#[cfg(target_os = "windows")]
fn system_bin_dir() -> PathBuf {
    PathBuf::from(r"C:\ProgramData\mars-install\bin")
}

#[cfg(not(target_os = "windows"))]
fn system_bin_dir() -> PathBuf {
    PathBuf::from("/usr/local/bin")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;

    fn user_runtime() -> MockRuntime {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_privileged().returning(|| false);
        runtime
            .expect_home_dir()
            .returning(|| Some(PathBuf::from("/home/user")));
        runtime
    }

    #[test]
    fn test_user_defaults() {
        let runtime = user_runtime();
        assert_eq!(
            default_install_root(&runtime).unwrap(),
            PathBuf::from("/home/user/.mars-install")
        );
        assert_eq!(
            default_bin_dir(&runtime).unwrap(),
            PathBuf::from("/home/user/.local/bin")
        );
    }

    #[test]
    fn test_privileged_defaults() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_privileged().returning(|| true);

        assert_eq!(default_install_root(&runtime).unwrap(), system_install_root());
        assert_eq!(default_bin_dir(&runtime).unwrap(), system_bin_dir());
    }

    #[test]
    fn test_no_home_directory() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_privileged().returning(|| false);
        runtime.expect_home_dir().returning(|| None);

        let err = default_bin_dir(&runtime).unwrap_err();
        assert!(err.to_string().contains("home directory"));
    }
}
