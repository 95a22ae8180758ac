//! ctp7_digi - acquire and decode CTP7 capture buffers
//!
//! Usage:
//!   cargo run --bin ctp7_digi -- --host ctp7-rct --port 5555 --cycles 10
//!   cargo run --bin ctp7_digi -- --test-file vectors.txt --json
//!   cargo run --bin ctp7_digi -- --config decoder.toml --link-file links.txt

use anyhow::Context;
use clap::Parser;
use ctp7_digi::common::cli::DecoderArgs;
use ctp7_digi::common::shutdown::setup_shutdown;
use ctp7_digi::config::Config;
use ctp7_digi::reader::{CycleOutcome, Reader, ReaderConfig};
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ctp7_digi=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = DecoderArgs::parse();

    let mut config = match &args.config_file {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            Config::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => Config::default(),
    };
    args.apply(&mut config.decoder);

    let reader_config = ReaderConfig::from_config(&config)?;
    let mut reader = Reader::new(reader_config)?;

    let (_shutdown_tx, mut shutdown_rx) = setup_shutdown();

    let mut cycle: u64 = 0;
    loop {
        if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
            break;
        }
        if args.cycles.is_some_and(|limit| cycle >= limit) {
            info!(cycles = cycle, "Cycle limit reached");
            break;
        }

        // Socket reads block; keep them off the runtime threads
        let (returned, result) = tokio::task::spawn_blocking(move || {
            let result = reader.run_cycle();
            (reader, result)
        })
        .await?;
        reader = returned;

        match result {
            Ok(CycleOutcome::Digis(digis)) => {
                cycle += 1;
                info!(
                    cycle,
                    crossings = digis.num_crossings(),
                    digis = digis.len(),
                    "Cycle complete"
                );
                if args.json {
                    println!("{}", serde_json::to_string(&digis)?);
                }
            }
            Ok(CycleOutcome::EndOfData) => {
                info!(cycles = cycle, "End of replay data");
                break;
            }
            Err(e) => {
                error!(error = %e, cycle, "Cycle failed");
                return Err(e.into());
            }
        }
    }

    info!(stats = ?reader.stats(), "Shutting down");
    Ok(())
}
