mod config;
mod harness;
mod registry;

use clap::Parser;
use cli_common::{init_logging, LogArgs, OrBail};
use config::AgentConfig;
use std::path::PathBuf;

/// Smoke-test harness for the capture agent's enrichment and persistence
/// cores. Not a capture pipeline: it synthesizes sessions and packets and
/// runs them through the tagger, wise, and disk writer the same way a real
/// pipeline would on session finalization.
#[derive(Debug, Parser)]
#[command(name = "capture-agent")]
struct Args {
    /// Path to a JSON config file matching the key table. Falls back to
    /// built-in smoke-test defaults if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `dry_run` from the config file, if given.
    #[arg(long)]
    dry_run: bool,

    /// Directory the smoke test writes its PCAP output under.
    #[arg(long, default_value = "./capture-agent-out")]
    out_dir: PathBuf,

    #[command(flatten)]
    log: LogArgs,
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<AgentConfig> {
    match path {
        Some(path) => {
            let file = std::fs::File::open(path)?;
            Ok(serde_json::from_reader(file)?)
        }
        None => Ok(AgentConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log);

    let mut cfg = load_config(args.config.as_deref()).or_bail("failed to load agent config");
    cfg.dry_run = cfg.dry_run || args.dry_run;

    if cfg.dry_run {
        tracing::info!("dry_run is set, enrichment and disk writer cores are disabled");
        return Ok(());
    }

    let write_method = cfg.validate().or_bail("invalid agent config");
    std::fs::create_dir_all(&args.out_dir).or_bail("failed to create output directory");

    let summary = harness::run_smoke_test(&cfg, write_method, &args.out_dir).await?;
    tracing::info!(?summary, "capture agent smoke test finished");

    Ok(())
}
