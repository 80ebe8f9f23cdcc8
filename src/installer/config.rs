use anyhow::Result;
use log::debug;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;

use crate::{
    archive::{ArchiveExtractor, ArchiveExtractorImpl},
    download::{Downloader, HttpDownloader},
    http::HttpClient,
    runtime::Runtime,
};

use super::Installer;
use super::paths::{default_bin_dir, default_install_root};

/// Default limit for a whole archive download.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Default limit for `<binary> --version`.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to build an [`Installer`].
pub struct Config<R: Runtime, D: Downloader, E: ArchiveExtractor> {
    pub runtime: R,
    pub downloader: D,
    pub extractor: E,
    pub install_root: Option<PathBuf>,
    pub bin_dir: Option<PathBuf>,
    pub verify_timeout: Duration,
}

impl<R: Runtime> Config<R, HttpDownloader, ArchiveExtractorImpl> {
    pub fn new(
        runtime: R,
        install_root: Option<PathBuf>,
        bin_dir: Option<PathBuf>,
        fetch_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("mars-install/", env!("MARS_INSTALL_VERSION")))
            .timeout(fetch_timeout)
            .build()?;

        // The token is attached per request, and only for GitHub hosts
        let mut http_client = HttpClient::new(client);
        if let Ok(token) = runtime.env_var("GITHUB_TOKEN")
            && !token.is_empty()
        {
            debug!(
                "Using GITHUB_TOKEN for GitHub downloads: {}",
                mask_token(&token)
            );
            http_client = http_client.with_github_token(token);
        }

        Ok(Self {
            runtime,
            downloader: HttpDownloader::new(http_client),
            extractor: ArchiveExtractorImpl::new(),
            install_root,
            bin_dir,
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
        })
    }
}

impl<R: Runtime, D: Downloader, E: ArchiveExtractor> Config<R, D, E> {
    /// Resolve default directories and build the installer.
    pub fn into_installer(self) -> Result<Installer<R, D, E>> {
        let install_root = match self.install_root {
            Some(path) => path,
            None => default_install_root(&self.runtime)?,
        };
        let bin_dir = match self.bin_dir {
            Some(path) => path,
            None => default_bin_dir(&self.runtime)?,
        };
        debug!(
            "Using install root {:?} and bin dir {:?}",
            install_root, bin_dir
        );

        Ok(Installer::new(
            self.runtime,
            self.downloader,
            self.extractor,
            install_root,
            bin_dir,
        )
        .with_verify_timeout(self.verify_timeout))
    }
}

/// Show only enough of a token to recognise it in logs.
fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return "*********".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockito::{Matcher, Server};

    fn config_with_token(token: Option<&str>) -> Config<MockRuntime, HttpDownloader, ArchiveExtractorImpl> {
        let mut runtime = MockRuntime::new();
        let token = token.map(|t| t.to_string());
        runtime
            .expect_env_var()
            .with(mockall::predicate::eq("GITHUB_TOKEN"))
            .returning(move |_| token.clone().ok_or(std::env::VarError::NotPresent));
        Config::new(runtime, None, None, DEFAULT_FETCH_TIMEOUT).unwrap()
    }

    #[test]
    fn test_config_new_with_github_token() {
        let config = config_with_token(Some("ghp_test_token_1234567890"));
        let client = config.downloader.http_client();
        assert_eq!(
            client.token_for("https://github.com/dean0x/mars/archive/refs/tags/v0.1.0.tar.gz"),
            Some("ghp_test_token_1234567890")
        );
        assert_eq!(client.token_for("https://example.org/mars-0.1.0.tar.gz"), None);
    }

    #[test]
    fn test_config_new_ignores_empty_github_token() {
        let config = config_with_token(Some(""));
        assert_eq!(
            config
                .downloader
                .http_client()
                .token_for("https://github.com/dean0x/mars"),
            None
        );
    }

    #[tokio::test]
    async fn test_config_client_headers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/mars-0.1.0.tar.gz")
            .match_header("Authorization", Matcher::Missing)
            .match_header(
                "User-Agent",
                Matcher::Regex("^mars-install/".to_string()),
            )
            .with_body("archive")
            .create_async()
            .await;

        let config = config_with_token(Some("ghp_test_token_1234567890"));
        config
            .downloader
            .http_client()
            .download_file(&format!("{}/mars-0.1.0.tar.gz", server.url()), || {
                Ok(std::io::sink())
            })
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[test]
    fn test_into_installer_uses_explicit_dirs() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .returning(|_| Err(std::env::VarError::NotPresent));
        // Explicit paths: the runtime must not be asked for defaults

        let config = Config::new(
            runtime,
            Some(PathBuf::from("/srv/mars/root")),
            Some(PathBuf::from("/srv/mars/bin")),
            DEFAULT_FETCH_TIMEOUT,
        )
        .unwrap();
        let installer = config.into_installer().unwrap();

        assert_eq!(installer.install_root(), PathBuf::from("/srv/mars/root"));
        assert_eq!(installer.bin_dir(), PathBuf::from("/srv/mars/bin"));
    }

    #[test]
    fn test_into_installer_falls_back_to_defaults() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .returning(|_| Err(std::env::VarError::NotPresent));
        runtime.expect_is_privileged().returning(|| false);
        runtime
            .expect_home_dir()
            .returning(|| Some(PathBuf::from("/home/user")));

        let installer = Config::new(runtime, None, None, DEFAULT_FETCH_TIMEOUT)
            .unwrap()
            .into_installer()
            .unwrap();

        assert_eq!(
            installer.install_root(),
            PathBuf::from("/home/user/.mars-install")
        );
        assert_eq!(installer.bin_dir(), PathBuf::from("/home/user/.local/bin"));
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("short"), "*********");
        assert_eq!(
            mask_token("ghp_abcdefghijklmnop"),
            "ghp_*********mnop"
        );
    }
}
