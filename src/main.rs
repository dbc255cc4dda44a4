use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use overlay_autoupdate::config::{self, AppConfig};
use overlay_autoupdate::logging;
use overlay_autoupdate::transport::{HttpClient, RateLimiter};
use overlay_autoupdate::version::overlay::{OverlayDir, OverlaySource};
use overlay_autoupdate::version::{Cache, CheckResult, Checker, PendingQueue, PendingStatus};

#[derive(Parser)]
#[command(name = "overlay-autoupdate")]
#[command(version, about = "Detect upstream version updates for overlay packages")]
struct Cli {
    /// Overlay root directory
    #[arg(long, default_value = ".")]
    overlay: PathBuf,

    /// Configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check one package, or every tracked package
    Check {
        /// Package id (`category/name`)
        package: Option<String>,

        /// Ignore cached upstream versions
        #[arg(long)]
        force: bool,
    },
    /// List pending updates
    Pending {
        /// Only show entries with this status
        #[arg(long)]
        status: Option<String>,
    },
}

fn print_result(result: &CheckResult) {
    let current = result.current_version.as_deref().unwrap_or("-");
    match (&result.error, &result.upstream_version) {
        (Some(e), _) => println!("{}: error: {}", result.package, e),
        (None, Some(upstream)) if result.has_update => {
            println!("{}: {} -> {}", result.package, current, upstream)
        }
        (None, Some(upstream)) => {
            let cached = if result.from_cache { " (cached)" } else { "" };
            println!("{}: up to date ({}){}", result.package, upstream, cached)
        }
        (None, None) => println!("{}: no upstream version", result.package),
    }
}

async fn run(cli: Cli, app_config: AppConfig) -> anyhow::Result<()> {
    let pending = Arc::new(PendingQueue::new(&config::pending_path()));

    match cli.command {
        Command::Pending { status } => {
            let updates = match status {
                Some(status) => {
                    let status = PendingStatus::parse(&status)
                        .with_context(|| format!("Unknown status: {}", status))?;
                    pending.list_by_status(status)?
                }
                None => pending.list()?,
            };
            for update in updates {
                match update.error {
                    Some(error) => println!(
                        "{}\t{} -> {}\t{}\t{}",
                        update.package, update.current_version, update.new_version, update.status, error
                    ),
                    None => println!(
                        "{}\t{} -> {}\t{}",
                        update.package, update.current_version, update.new_version, update.status
                    ),
                }
            }
            Ok(())
        }
        Command::Check { package, force } => {
            let overlay = Arc::new(OverlayDir::new(&cli.overlay));
            let cache = Arc::new(Cache::new(&config::cache_path(), app_config.cache_ttl()));
            let client = Arc::new(HttpClient::new(app_config.http_client_config())?);
            let limiter = Arc::new(RateLimiter::new(app_config.rate_limit_config()));

            let removed = cache.cleanup()?;
            if removed > 0 {
                info!("Dropped {} stale cache entries", removed);
            }

            let mut specs = overlay.load_packages()?;
            if let Some(package) = package {
                specs.retain(|spec| spec.package == package);
                if specs.is_empty() {
                    anyhow::bail!("{} is not tracked in {:?}", package, overlay.packages_file());
                }
            }

            let checker = Checker::new(overlay, cache, pending, client, limiter);
            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling checks");
                    ctrl_c.cancel();
                }
            });

            let results = checker.check_all(&cancel, &specs, force).await;
            for result in &results {
                print_result(result);
            }

            let updates = results.iter().filter(|r| r.has_update).count();
            let failures = results.iter().filter(|r| !r.is_ok()).count();
            info!(
                "Checked {} packages: {} updates, {} failures",
                results.len(),
                updates,
                failures
            );
            Ok(())
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _guard = logging::init(cli.verbose, &config::log_dir())?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| config::data_dir().join("config.json"));
    let app_config = AppConfig::load(&config_path)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli, app_config))
}
