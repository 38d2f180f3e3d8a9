use clap::Parser;
use sm_probe_agent::agent::config::AgentConfig;
use sm_probe_agent::agent::run::run_agent;
use sm_probe_agent::cli::Cli;
use tracing::error;

fn main() {
    let cli = Cli::parse();

    let config = match AgentConfig::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = config.logging.try_init() {
        eprintln!("{err}");
        std::process::exit(1);
    }

    if let Err(err) = run_agent(config) {
        error!(%err, "agent failed");
        std::process::exit(1);
    }
}
