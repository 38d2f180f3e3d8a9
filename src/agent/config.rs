use crate::checks::secret::Secret;
use crate::cli::Cli;
use crate::logging::LoggingConfig;
use crate::publisher::DEFAULT_PUBLISHER;
use duration_str::deserialize_duration;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_API_SERVER_ADDRESS: &str = "localhost:4031";
const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:4050";
const DEFAULT_TENANT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);
const DEFAULT_TELEMETRY_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Startup-time configuration problems. All of them are fatal: the process
/// exits non-zero before any scraper starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("an api token is required (flag --api-token or SM_AGENT_API_TOKEN)")]
    MissingToken,
    #[error("api server address must not be empty")]
    MissingApiServer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Control-plane gRPC endpoint, `host:port`.
    pub api_server_address: String,
    pub api_token: Secret,
    /// Allow a non-TLS control-plane connection. Off by default.
    pub insecure_plaintext: bool,
    /// Name this probe announces to the control plane.
    pub probe_name: String,
    /// Admin HTTP listener (`/ready`, `/metrics`, `/disconnect`).
    pub listen_address: SocketAddr,
    /// Publisher variant, one of the registry names.
    pub publisher: String,
    #[serde(deserialize_with = "deserialize_duration")]
    pub tenant_cache_ttl: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub telemetry_period: Duration,
    /// Check label names forwarded as cost-attribution dimensions.
    pub cost_attribution_labels: Vec<String>,
    pub logging: LoggingConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_server_address: DEFAULT_API_SERVER_ADDRESS.to_string(),
            api_token: Secret::default(),
            insecure_plaintext: false,
            probe_name: "probe".to_string(),
            listen_address: DEFAULT_LISTEN_ADDRESS
                .parse()
                .expect("default listen address should parse"),
            publisher: DEFAULT_PUBLISHER.to_string(),
            tenant_cache_ttl: DEFAULT_TENANT_CACHE_TTL,
            telemetry_period: DEFAULT_TELEMETRY_PERIOD,
            cost_attribution_labels: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Builds the effective configuration: the file (when given), overridden
    /// by flags and environment, then validated.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(address) = &cli.api_server_address {
            config.api_server_address = address.clone();
        }
        if let Some(token) = &cli.api_token {
            config.api_token = Secret::new(token.clone());
        }
        if cli.insecure_plaintext {
            config.insecure_plaintext = true;
        }
        if let Some(probe_name) = &cli.probe_name {
            config.probe_name = probe_name.clone();
        }
        if let Some(listen_address) = cli.listen_address {
            config.listen_address = listen_address;
        }
        if let Some(publisher) = &cli.publisher {
            config.publisher = publisher.clone();
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_server_address.is_empty() {
            return Err(ConfigError::MissingApiServer);
        }
        if self.api_token.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use clap::Parser;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("sm-probe-agent").chain(args.iter().copied()))
            .expect("test arguments should parse")
    }

    #[test]
    fn defaults_with_token_from_flags() {
        let config = AgentConfig::load(&cli(&["--api-token", "t0ken"])).unwrap();
        assert_eq!(config.api_server_address, DEFAULT_API_SERVER_ADDRESS);
        assert_eq!(config.api_token.expose(), "t0ken");
        assert_eq!(config.publisher, "queued");
        assert!(!config.insecure_plaintext);
        assert_eq!(config.tenant_cache_ttl, DEFAULT_TENANT_CACHE_TTL);
    }

    #[test]
    fn missing_token_is_fatal() {
        assert_matches!(AgentConfig::load(&cli(&[])), Err(ConfigError::MissingToken));
    }

    #[test]
    fn file_values_loaded_and_overridden_by_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            concat!(
                "api_server_address: api.example.org:443\n",
                "api_token: from-file\n",
                "probe_name: probe-1\n",
                "tenant_cache_ttl: 1m\n",
                "telemetry_period: 30s\n",
                "cost_attribution_labels: [team]\n",
                "logging:\n",
                "  level: debug\n",
            )
        )
        .unwrap();

        let config = AgentConfig::load(&cli(&[
            "--config",
            file.path().to_str().unwrap(),
            "--probe-name",
            "probe-override",
        ]))
        .unwrap();

        assert_eq!(config.api_server_address, "api.example.org:443");
        assert_eq!(config.api_token.expose(), "from-file");
        assert_eq!(config.probe_name, "probe-override");
        assert_eq!(config.tenant_cache_ttl, Duration::from_secs(60));
        assert_eq!(config.telemetry_period, Duration::from_secs(30));
        assert_eq!(config.cost_attribution_labels, vec!["team".to_string()]);
        assert_eq!(config.logging.level, crate::logging::LogLevel::Debug);
    }

    #[test]
    fn unreadable_file_is_fatal() {
        let cli = cli(&["--config", "/definitely/not/here.yaml", "--api-token", "t"]);
        assert_matches!(AgentConfig::load(&cli), Err(ConfigError::Read { .. }));
    }

    #[test]
    fn serialized_config_redacts_the_token() {
        let config = AgentConfig {
            api_token: Secret::new("super-secret"),
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("super-secret"));
        assert!(yaml.contains("<encrypted>"));
    }
}
