//! concord-sim: run a scripted Concord room and print a JSON report.
//!
//! Usage: `concord-sim [script.toml]`. Without an argument the bundled
//! three-party script runs.

use std::path::PathBuf;

use concord_sim::SimConfig;
use tracing::info;

const DEFAULT_SCRIPT: &str = include_str!("../sim.toml");

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("concord=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => {
            info!("Loading script from {:?}", path);
            SimConfig::load(&path)?
        }
        None => SimConfig::from_toml_str(DEFAULT_SCRIPT)?,
    };

    info!(room = %config.room, steps = config.steps.len(), "Running simulation");
    let report = config.run()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
