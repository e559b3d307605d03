use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use brickscout_sync::{RunTarget, SyncConfig, SyncPipeline, USAGE};
use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "brickscout")]
#[command(about = "Scrape LEGO listings from Vinted and Dealabs")]
struct Cli {
    /// Pipeline to run: `vinted` or `dealabs`.
    target: Option<String>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    watchlist: Option<PathBuf>,
    #[arg(long)]
    max_pages: Option<u32>,
    #[arg(long)]
    delay_secs: Option<u64>,
    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn run_target(&self) -> Option<RunTarget> {
        self.target.as_deref().and_then(|t| t.parse().ok())
    }

    fn apply_overrides(&self, config: &mut SyncConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(path) = &self.watchlist {
            config.watchlist_path = path.clone();
        }
        if let Some(max_pages) = self.max_pages {
            config.max_pages = max_pages;
        }
        if let Some(secs) = self.delay_secs {
            config.job_delay = Duration::from_secs(secs);
        }
    }
}

/// `None` when the arguments do not select a pipeline; the caller prints usage.
fn parse_invocation<I, T>(args: I) -> Result<Option<(Cli, RunTarget)>, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(cli.run_target().map(|target| (cli, target))),
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            Err(err)
        }
        Err(_) => Ok(None),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,reqwest=warn,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let (cli, target) = match parse_invocation(std::env::args_os()) {
        Ok(Some(selected)) => selected,
        Ok(None) => {
            println!("{USAGE}");
            return Ok(());
        }
        Err(err) => err.exit(),
    };

    init_tracing();

    let mut config = SyncConfig::from_env();
    cli.apply_overrides(&mut config);
    tracing::info!(%target, output_dir = %config.output_dir.display(), "starting run");

    let summary = SyncPipeline::new(config)?.run_once(target).await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{target} run complete: run_id={} requests={} kept={} dropped={} shape_failures={} failed_jobs={} output={}",
            summary.run_id,
            summary.requests,
            summary.kept,
            summary.dropped,
            summary.shape_failures,
            summary.failed_jobs.len(),
            summary.output_path
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_or_missing_target_selects_nothing() {
        assert_eq!(Cli::parse_from(["brickscout"]).run_target(), None);
        assert_eq!(Cli::parse_from(["brickscout", "ebay"]).run_target(), None);
        assert_eq!(
            Cli::parse_from(["brickscout", "dealabs"]).run_target(),
            Some(RunTarget::Dealabs)
        );
    }

    #[test]
    fn malformed_invocations_fall_back_to_usage() {
        for args in [
            vec!["brickscout"],
            vec!["brickscout", "ebay"],
            vec!["brickscout", "vinted", "dealabs"],
            vec!["brickscout", "vinted", "--verbose"],
            vec!["brickscout", "dealabs", "--max-pages", "many"],
        ] {
            assert!(
                matches!(parse_invocation(args.clone()), Ok(None)),
                "{args:?} should print usage"
            );
        }
    }

    #[test]
    fn valid_invocation_selects_pipeline() {
        let (cli, target) = parse_invocation(["brickscout", "vinted", "--json"])
            .unwrap()
            .expect("pipeline selected");
        assert_eq!(target, RunTarget::Vinted);
        assert!(cli.json);
        assert!(parse_invocation(["brickscout", "--help"]).is_err());
    }

    #[test]
    fn flags_override_environment_config() {
        let cli = Cli::parse_from([
            "brickscout",
            "vinted",
            "--output-dir",
            "/tmp/bs",
            "--delay-secs",
            "1",
            "--max-pages",
            "3",
        ]);
        let mut config = SyncConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/bs"));
        assert_eq!(config.job_delay, Duration::from_secs(1));
        assert_eq!(config.max_pages, 3);
        assert_eq!(config.watchlist_path, SyncConfig::default().watchlist_path);
    }
}
