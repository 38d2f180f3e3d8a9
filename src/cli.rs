//! Command line interface for the probe agent.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Command line arguments, as parsed by [`clap`]. Flags override the
/// configuration file; the API token can also come from the environment so it
/// stays out of process listings.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Control-plane gRPC endpoint, `host:port`.
    #[arg(long)]
    pub api_server_address: Option<String>,

    /// API bearer token.
    #[arg(long, env = "SM_AGENT_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Allow a non-TLS control-plane connection.
    #[arg(long)]
    pub insecure_plaintext: bool,

    /// Name this probe announces to the control plane.
    #[arg(long)]
    pub probe_name: Option<String>,

    /// Admin HTTP listener address.
    #[arg(long)]
    pub listen_address: Option<SocketAddr>,

    /// Publisher variant to use.
    #[arg(long)]
    pub publisher: Option<String>,
}
