//! Command-line interface for `dualmint-server`.
//!
//! Chain and notifier settings come from `DUALMINT_*` environment variables
//! (see `AdapterConfig::from_env`); the flags here cover the HTTP surface.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Records mint and burn transactions submitted by authenticated operators.
#[derive(Parser, Debug)]
#[command(
    name = "dualmint-server",
    about = "Dual-chain token transaction recording service",
    version,
    propagate_version = true
)]
pub struct DualmintCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the recording service.
    Run(RunArgs),
    /// Print the resolved adapter configuration and exit.
    CheckConfig,
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Address the HTTP API listens on.
    #[arg(long, env = "DUALMINT_BIND", default_value = "127.0.0.1:8787")]
    pub bind: SocketAddr,

    /// Operator credential as `token=identity`. Repeatable.
    #[arg(
        long = "operator-token",
        env = "DUALMINT_OPERATOR_TOKENS",
        value_delimiter = ','
    )]
    pub operator_tokens: Vec<String>,

    /// JSON snapshot file for the record store. Records stay in memory when unset.
    #[arg(long, env = "DUALMINT_STORE_PATH")]
    pub store_path: Option<PathBuf>,

    /// Default tracing filter when `RUST_LOG` is unset.
    #[arg(
        long,
        env = "DUALMINT_LOG_LEVEL",
        default_value = "dualmint_server=info,dualmint_core=info,dualmint_adapters=info,tower_http=debug"
    )]
    pub log_level: String,

    /// `pretty` or `json`.
    #[arg(long, env = "DUALMINT_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}
