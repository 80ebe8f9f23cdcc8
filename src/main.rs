use anyhow::Result;
use clap::Parser;
use mars_install::commands::{self, InstallRequest, Settings};
use mars_install::installer::InstallOptions;
use std::path::PathBuf;
use std::time::Duration;

/// mars-install - verified installer for the mars release binary
///
/// Downloads a release archive, checks its SHA-256 digest, extracts the
/// executable into a bin directory and runs `<binary> --version`.
///
/// If the GITHUB_TOKEN environment variable is set, it is sent as a bearer
/// token when downloading from github.com, api.github.com or
/// codeload.github.com. Other hosts never see it.
///
/// Examples:
///   mars-install install --sha256 <HEX>        # Install mars v0.1.0
///   mars-install install --descriptor pkg.json # Install from a descriptor file
///   mars-install verify                        # Re-run `mars --version`
#[derive(Parser, Debug)]
#[command(author, version = env!("MARS_INSTALL_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Install root for receipts (overrides defaults; also via MARS_INSTALL_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "MARS_INSTALL_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub install_root: Option<PathBuf>,

    /// Directory the executable is placed in (also via MARS_INSTALL_BIN_DIR)
    #[arg(
        long = "bin-dir",
        short = 'b',
        env = "MARS_INSTALL_BIN_DIR",
        value_name = "PATH",
        global = true
    )]
    pub bin_dir: Option<PathBuf>,

    /// Download timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 300, global = true)]
    pub timeout: u64,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Download, verify and install a release
    Install(InstallArgs),

    /// Run `<binary> --version` for an installed package
    Verify(VerifyArgs),

    /// Remove an installed package
    Uninstall(UninstallArgs),

    /// List installed packages
    List,
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// JSON package descriptor (defaults to the built-in mars release)
    #[arg(long, short = 'd', value_name = "FILE")]
    pub descriptor: Option<PathBuf>,

    /// Override the archive URL
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Expected SHA-256 of the archive (required without --descriptor)
    #[arg(long, value_name = "HEX")]
    pub sha256: Option<String>,

    /// Override the version derived from the URL
    #[arg(long, value_name = "VERSION")]
    pub version: Option<String>,

    /// Reinstall even if the same release is already installed
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Do not run `<binary> --version` after installing
    #[arg(long)]
    pub skip_verify: bool,
}

#[derive(clap::Args, Debug)]
pub struct VerifyArgs {
    /// Package name
    #[arg(default_value = "mars")]
    pub name: String,
}

#[derive(clap::Args, Debug)]
pub struct UninstallArgs {
    /// Package name
    #[arg(default_value = "mars")]
    pub name: String,

    /// Remove the binary even if it was modified after installation
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = mars_install::runtime::RealRuntime;
    let settings = Settings {
        install_root: cli.install_root,
        bin_dir: cli.bin_dir,
        fetch_timeout: Duration::from_secs(cli.timeout),
    };

    match cli.command {
        Commands::Install(args) => {
            let request = InstallRequest {
                descriptor_file: args.descriptor,
                url: args.url,
                sha256: args.sha256,
                version: args.version,
                options: InstallOptions {
                    force: args.force,
                    skip_verify: args.skip_verify,
                },
            };
            commands::install(runtime, request, settings).await?
        }
        Commands::Verify(args) => commands::verify(runtime, &args.name, settings)?,
        Commands::Uninstall(args) => {
            commands::uninstall(runtime, &args.name, args.force, args.yes, settings)?
        }
        Commands::List => commands::list(runtime, settings)?,
    }
    Ok(())
}
