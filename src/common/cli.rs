//! CLI argument parsing for the decoder runner
//!
//! Every flag is optional and overrides the matching `[decoder]` key from
//! the config file.

use crate::config::DecoderFileConfig;
use clap::Parser;
use std::path::PathBuf;

/// Arguments for the `ctp7_digi` runner
#[derive(Parser, Debug, Clone)]
#[command(name = "ctp7_digi", about = "Acquire and decode CTP7 capture buffers")]
pub struct DecoderArgs {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short = 'f', long = "config")]
    pub config_file: Option<PathBuf>,

    /// CTP7 host
    #[arg(long, env = "CTP7_HOST")]
    pub host: Option<String>,

    /// CTP7 port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Replay this test-vector file instead of reading the board
    #[arg(short = 't', long = "test-file")]
    pub test_file: Option<PathBuf>,

    /// Use the MP7 link mapping
    #[arg(long, conflicts_with = "legacy")]
    pub mp7: bool,

    /// Use the legacy link mapping, even if the config file selects MP7
    #[arg(long)]
    pub legacy: bool,

    /// Write a per-field decode trace to this file
    #[arg(short = 'l', long = "link-file")]
    pub link_file: Option<PathBuf>,

    /// Append every raw buffer to this file in replay format
    #[arg(short = 'd', long = "dump-file")]
    pub dump_file: Option<PathBuf>,

    /// Bunch crossings per cycle
    #[arg(short = 'n', long)]
    pub crossings: Option<u32>,

    /// Stop after this many cycles
    #[arg(short = 'c', long)]
    pub cycles: Option<u64>,

    /// Print each decoded collection as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl DecoderArgs {
    /// Overlay command-line values onto the file configuration
    pub fn apply(&self, config: &mut DecoderFileConfig) {
        if let Some(host) = &self.host {
            config.ctp7_host = host.clone();
        }
        if let Some(port) = self.port {
            config.ctp7_port = port.to_string();
        }
        if let Some(path) = &self.test_file {
            config.test = true;
            config.test_file = path.clone();
        }
        if self.mp7 {
            config.mp7_mapping = true;
        } else if self.legacy {
            config.mp7_mapping = false;
        }
        if let Some(path) = &self.link_file {
            config.create_link_file = true;
            config.link_file = path.clone();
        }
        if let Some(path) = &self.dump_file {
            config.dump_file = Some(path.clone());
        }
        if let Some(crossings) = self.crossings {
            config.crossings = crossings;
        }
    }
}
