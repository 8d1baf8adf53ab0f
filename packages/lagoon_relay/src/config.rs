use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

// =============================================================================
// Unified config (figment-deserialized from defaults / lagoon.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   lagoon.toml:     [server]
//                    port = 4400
//
//   env var:         LAGOON_SERVER__PORT=4400   (double underscore = nesting)
//
//   CLI flags on `lagoon serve` override both.

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub relay: RelayFileConfig,
}

/// Bind address knobs (lives under `[server]` in lagoon.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Relay tuning knobs (lives under `[relay]` in lagoon.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayFileConfig {
    /// Capacity of each connection's outbound event queue. A slow consumer
    /// that falls this far behind starts losing relay events; it recovers
    /// from the durable store on its next fetch.
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: default_send_queue_capacity(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4400
}

fn default_send_queue_capacity() -> usize {
    100
}

impl FileConfig {
    /// Merge defaults, an optional `lagoon.toml`, and `LAGOON_*` env vars.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        use figment::Figment;
        use figment::providers::{Env, Format, Serialized, Toml};

        let mut figment = Figment::from(Serialized::defaults(FileConfig::default()));
        match config_path {
            Some(path) => figment = figment.merge(Toml::file(path)),
            None => figment = figment.merge(Toml::file("lagoon.toml")),
        }
        figment
            .merge(Env::prefixed("LAGOON_").split("__"))
            .extract()
            .context("invalid configuration")
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid bind address {}:{}",
                    self.server.host, self.server.port
                )
            })
    }
}
