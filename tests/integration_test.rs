use assert_cmd::Command;
use assert_cmd::cargo;
use flate2::Compression;
use flate2::write::GzEncoder;
use mars_install::descriptor::sha256_bytes;
use mockito::{Mock, Server, ServerGuard};
use predicates::prelude::*;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use tar::Builder;
use tempfile::{TempDir, tempdir};

const MARS_OK: &str = "#!/bin/sh\necho \"mars 0.1.0\"\n";
const MARS_BROKEN: &str = "#!/bin/sh\necho \"mars: missing runtime\" >&2\nexit 1\n";

fn create_tar_gz_with_executable(files: &[(&str, &str, u32)]) -> Vec<u8> {
    let mut tar_builder = Builder::new(Vec::new());
    for (name, content, mode) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_path(name).unwrap();
        header.set_mode(*mode);
        header.set_cksum();
        tar_builder.append(&header, content.as_bytes()).unwrap();
    }
    let tar = tar_builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap()
}

fn mars_release(script: &str) -> Vec<u8> {
    create_tar_gz_with_executable(&[
        ("mars-0.1.0/README.md", "# mars\n", 0o644),
        ("mars-0.1.0/dist/mars", script, 0o755),
    ])
}

/// Temporary root and bin dirs plus a server publishing one archive.
struct Env {
    server: ServerGuard,
    // Mocks are removed from the server when dropped
    mocks: Vec<Mock>,
    dirs: TempDir,
}

impl Env {
    fn new() -> Self {
        Self {
            server: Server::new(),
            mocks: Vec::new(),
            dirs: tempdir().unwrap(),
        }
    }

    fn publish(&mut self, archive: &[u8]) -> String {
        let mock = self
            .server
            .mock("GET", "/mars-0.1.0.tar.gz")
            .with_status(200)
            .with_body(archive)
            .create();
        self.mocks.push(mock);
        format!("{}/mars-0.1.0.tar.gz", self.server.url())
    }

    fn root(&self) -> PathBuf {
        self.dirs.path().join("root")
    }

    fn bin(&self) -> PathBuf {
        self.dirs.path().join("bin")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(cargo::cargo_bin!("mars-install"));
        cmd.env_remove("GITHUB_TOKEN")
            .env_remove("MARS_INSTALL_ROOT")
            .env_remove("MARS_INSTALL_BIN_DIR")
            .arg("--root")
            .arg(self.root())
            .arg("--bin-dir")
            .arg(self.bin());
        cmd
    }

    fn install(&self, url: &str, sha256: &str) -> Command {
        let mut cmd = self.cmd();
        cmd.arg("install")
            .arg("--url")
            .arg(url)
            .arg("--sha256")
            .arg(sha256);
        cmd
    }
}

fn dir_entries(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => {
            let mut names: Vec<String> = entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }
        Err(_) => Vec::new(),
    }
}

#[cfg(unix)]
#[test]
fn test_end_to_end_install() {
    let mut env = Env::new();
    let archive = mars_release(MARS_OK);
    let url = env.publish(&archive);
    let digest = sha256_bytes(&archive);

    env.install(&url, digest.as_str())
        .assert()
        .success()
        .stdout(predicate::str::contains("installed mars 0.1.0"));

    let binary = env.bin().join("mars");
    assert!(binary.exists());
    let status = std::process::Command::new(&binary)
        .arg("--version")
        .status()
        .unwrap();
    assert!(status.success());

    let receipt = std::fs::read_to_string(env.root().join("mars/receipt.json")).unwrap();
    assert!(receipt.contains("\"version\": \"0.1.0\""));
    assert!(receipt.contains(digest.as_str()));

    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("mars 0.1.0"));

    env.cmd().arg("verify").assert().success();
}

#[test]
fn test_tampered_digest_leaves_bin_dir_unchanged() {
    let mut env = Env::new();
    let url = env.publish(&mars_release(MARS_OK));
    std::fs::create_dir_all(env.bin()).unwrap();
    std::fs::write(env.bin().join("existing-tool"), "untouched").unwrap();

    env.install(&url, &"0".repeat(64))
        .assert()
        .failure()
        .stderr(predicate::str::contains("checksum mismatch"));

    assert_eq!(dir_entries(&env.bin()), vec!["existing-tool"]);
    assert!(!env.root().join("mars/receipt.json").exists());
}

#[cfg(unix)]
#[test]
fn test_reinstall_is_idempotent() {
    let mut env = Env::new();
    let archive = mars_release(MARS_OK);
    let url = env.publish(&archive);
    let digest = sha256_bytes(&archive);

    env.install(&url, digest.as_str()).assert().success();
    let first = std::fs::read(env.bin().join("mars")).unwrap();

    env.install(&url, digest.as_str())
        .assert()
        .success()
        .stdout(predicate::str::contains("already installed"));

    assert_eq!(std::fs::read(env.bin().join("mars")).unwrap(), first);
    assert_eq!(dir_entries(&env.bin()), vec!["mars"]);
}

#[cfg(unix)]
#[test]
fn test_failed_version_check_fails_install() {
    let mut env = Env::new();
    let archive = mars_release(MARS_BROKEN);
    let url = env.publish(&archive);

    env.install(&url, sha256_bytes(&archive).as_str())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--version"));

    assert!(dir_entries(&env.bin()).is_empty());
    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No packages installed."));
}

#[test]
fn test_missing_archive_is_fetch_error() {
    let mut env = Env::new();
    let _mock = env
        .server
        .mock("GET", "/mars-0.1.0.tar.gz")
        .with_status(404)
        .create();
    let url = format!("{}/mars-0.1.0.tar.gz", env.server.url());

    env.install(&url, &"a".repeat(64))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to fetch"));

    assert!(dir_entries(&env.bin()).is_empty());
}

#[test]
fn test_install_without_sha256_is_rejected() {
    let env = Env::new();
    env.cmd()
        .arg("install")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--sha256"));
}

#[cfg(unix)]
#[test]
fn test_uninstall() {
    let mut env = Env::new();
    let archive = mars_release(MARS_OK);
    let url = env.publish(&archive);

    env.install(&url, sha256_bytes(&archive).as_str())
        .assert()
        .success();

    env.cmd()
        .arg("uninstall")
        .arg("-y")
        .assert()
        .success()
        .stdout(predicate::str::contains("uninstalled mars 0.1.0"));

    assert!(!env.bin().join("mars").exists());
    assert!(!env.root().join("mars").exists());

    env.cmd()
        .arg("uninstall")
        .arg("-y")
        .assert()
        .failure()
        .stderr(predicate::str::contains("mars is not installed"));
}

#[cfg(unix)]
#[test]
fn test_uninstall_prompt_declined() {
    let mut env = Env::new();
    let archive = mars_release(MARS_OK);
    let url = env.publish(&archive);

    env.install(&url, sha256_bytes(&archive).as_str())
        .assert()
        .success();

    env.cmd()
        .arg("uninstall")
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Uninstall cancelled."));

    assert!(env.bin().join("mars").exists());
}
