//! The load-testing binary. See the library documentation for the scenario
//! and configuration surface.

use std::path::PathBuf;
use std::sync::Arc;

use abacus_client::Client;
use anyhow::Context;
use argh::FromArgs;
use loadtest::Config;
use tracing_subscriber::EnvFilter;

/// Load tester for an Abacus-style counter service
#[derive(Debug, FromArgs)]
pub struct Args {
    /// path to the yaml configuration file
    #[argh(option, short = 'c')]
    pub config: PathBuf,

    /// path to write the machine-readable JSON report to
    #[argh(option, short = 'o')]
    pub report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Args = argh::from_env();

    let config_file = std::fs::File::open(args.config).context("failed to open config file")?;
    let mut config: Config =
        serde_yaml::from_reader(config_file).context("failed to parse config YAML")?;
    if let Ok(remote) = std::env::var("ABACUS_BASE_URL") {
        config.remote = remote;
    }

    let client = Client::builder(config.remote.as_str())
        .build()
        .context("failed to build the counter service client")?;

    let report = loadtest::run(Arc::new(client), &config).await?;

    if let Some(path) = args.report {
        let file = std::fs::File::create(&path).context("failed to create the report file")?;
        serde_json::to_writer_pretty(file, &report).context("failed to write the report")?;
    }

    if !report.passed {
        std::process::exit(1);
    }
    Ok(())
}
