//! Service configuration.
//!
//! Loaded from YAML or JSON, chosen by file extension, and validated before
//! any socket is bound.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use simracing_telemetry_core::{FieldSchema, Game, StreamId};
use simracing_telemetry_pipeline::{DEFAULT_MAX_DATAGRAM, DEFAULT_QUEUE_CAPACITY, EndpointConfig};
use simracing_telemetry_sinks::{
    BestLapSink, FileSink, RelationalSink, RelationalStore, RelaySink, Retention, SqliteStore,
    TableSpec, TelemetrySink,
};
use tracing::debug;

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub endpoints: Vec<EndpointSettings>,
}

/// One listening port and the sinks fed from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointSettings {
    pub game: Game,
    /// Defaults to the game's usual port.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_datagram")]
    pub max_datagram: usize,
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// Output sink definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum SinkConfig {
    Csv {
        path: PathBuf,
        #[serde(default)]
        retention: Retention,
    },
    Sqlite {
        path: PathBuf,
    },
    SqliteBestLap {
        path: PathBuf,
        #[serde(default = "default_user_id")]
        user_id: i64,
    },
    Udp {
        destinations: Vec<String>,
    },
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_max_datagram() -> usize {
    DEFAULT_MAX_DATAGRAM
}

fn default_user_id() -> i64 {
    1
}

impl SinkConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SinkConfig::Csv { .. } => "csv",
            SinkConfig::Sqlite { .. } => "sqlite",
            SinkConfig::SqliteBestLap { .. } => "sqlite_best_lap",
            SinkConfig::Udp { .. } => "udp",
        }
    }
}

impl EndpointSettings {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.game.default_port())
    }

    pub fn endpoint_config(&self) -> EndpointConfig {
        let port = self.port();
        EndpointConfig {
            stream: StreamId::new(port),
            bind_addr: SocketAddr::new(self.bind_address, port),
            queue_capacity: self.queue_capacity,
            max_datagram: self.max_datagram,
        }
    }
}

impl ServiceConfig {
    /// Read a configuration file. `.json` files are parsed as JSON, anything
    /// else as YAML.
    pub async fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        debug!(path = %path.display(), endpoints = config.endpoints.len(), "loaded config");
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("invalid YAML configuration")
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("invalid JSON configuration")
    }

    /// Check the invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            bail!("No endpoints configured");
        }

        let mut ports = HashSet::new();
        for endpoint in &self.endpoints {
            let port = endpoint.port();
            if port == 0 {
                bail!("Invalid port 0 for {} endpoint", endpoint.game);
            }
            if !ports.insert(port) {
                bail!("Port {port} is configured more than once");
            }
            if endpoint.queue_capacity == 0 {
                bail!("Invalid queue capacity 0 for port {port}");
            }
            if endpoint.max_datagram == 0 {
                bail!("Invalid max datagram size 0 for port {port}");
            }
            for sink in &endpoint.sinks {
                if let SinkConfig::Udp { destinations } = sink
                    && destinations.is_empty()
                {
                    bail!("UDP sink on port {port} has no destinations");
                }
            }
        }
        Ok(())
    }
}

/// Builds sink instances, sharing one store per SQLite file and one parsed
/// schema per game.
#[derive(Default)]
pub struct SinkFactory {
    schemas: HashMap<Game, Arc<FieldSchema>>,
    stores: HashMap<PathBuf, Arc<SqliteStore>>,
}

impl SinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parsed schema of `game`, loaded on first request.
    pub fn schema(&mut self, game: Game) -> Result<Arc<FieldSchema>> {
        if let Some(schema) = self.schemas.get(&game) {
            return Ok(Arc::clone(schema));
        }
        let schema = Arc::new(
            game.load_schema()
                .with_context(|| format!("Invalid packet definition for {game}"))?,
        );
        self.schemas.insert(game, Arc::clone(&schema));
        Ok(schema)
    }

    fn store(&mut self, path: &Path) -> Arc<dyn RelationalStore> {
        let store = self
            .stores
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(SqliteStore::new(path)));
        Arc::clone(store) as Arc<dyn RelationalStore>
    }

    pub fn build(&mut self, game: Game, sink: &SinkConfig) -> Result<Arc<dyn TelemetrySink>> {
        let schema = self.schema(game)?;
        let built: Arc<dyn TelemetrySink> = match sink {
            SinkConfig::Csv { path, retention } => {
                Arc::new(FileSink::new(game, path.clone(), *retention))
            }
            SinkConfig::Sqlite { path } => Arc::new(RelationalSink::new(
                self.store(path),
                TableSpec::for_schema(game.telemetry_table(), &schema),
            )),
            SinkConfig::SqliteBestLap { path, user_id } => Arc::new(BestLapSink::new(
                self.store(path),
                game.best_lap_table(),
                &schema,
                *user_id,
            )?),
            SinkConfig::Udp { destinations } => {
                Arc::new(RelaySink::new(destinations.iter().cloned())?)
            }
        };
        Ok(built)
    }

    pub fn build_all(
        &mut self,
        endpoint: &EndpointSettings,
    ) -> Result<Vec<Arc<dyn TelemetrySink>>> {
        endpoint
            .sinks
            .iter()
            .map(|sink| {
                self.build(endpoint.game, sink).with_context(|| {
                    format!(
                        "Failed to build {} sink on port {}",
                        sink.kind(),
                        endpoint.port()
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const EXAMPLE: &str = include_str!("../config/simtelemetryd.example.yaml");

    fn minimal(port: u16) -> EndpointSettings {
        EndpointSettings {
            game: Game::ForzaMotorsport2023,
            port: Some(port),
            bind_address: default_bind_address(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_datagram: DEFAULT_MAX_DATAGRAM,
            sinks: Vec::new(),
        }
    }

    #[test]
    fn test_example_config_parses_and_validates() -> TestResult {
        let config = ServiceConfig::from_yaml_str(EXAMPLE)?;
        config.validate()?;

        let endpoint = config.endpoints.first().ok_or("no endpoint")?;
        assert_eq!(endpoint.game, Game::ForzaMotorsport2023);
        assert_eq!(endpoint.port(), 5300);
        let kinds: Vec<_> = endpoint.sinks.iter().map(SinkConfig::kind).collect();
        assert_eq!(kinds, ["csv", "sqlite", "sqlite_best_lap", "udp"]);
        assert_eq!(
            endpoint.sinks.first(),
            Some(&SinkConfig::Csv {
                path: PathBuf::from("/var/log/simracing-telemetry"),
                retention: Retention::Daily,
            })
        );
        Ok(())
    }

    #[test]
    fn test_defaults() -> TestResult {
        let config = ServiceConfig::from_yaml_str(
            "endpoints:\n  - game: fms2023\n    sinks:\n      - { type: sqlite_best_lap, path: laps.db }\n      - { type: csv, path: out.csv }\n",
        )?;
        let endpoint = config.endpoints.first().ok_or("no endpoint")?;
        assert_eq!(endpoint.port(), 5300);
        assert_eq!(endpoint.queue_capacity, 256);
        assert_eq!(endpoint.endpoint_config().bind_addr.to_string(), "0.0.0.0:5300");
        assert_eq!(
            endpoint.sinks,
            [
                SinkConfig::SqliteBestLap {
                    path: PathBuf::from("laps.db"),
                    user_id: 1,
                },
                SinkConfig::Csv {
                    path: PathBuf::from("out.csv"),
                    retention: Retention::None,
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn test_json_config() -> TestResult {
        let config = ServiceConfig::from_json_str(
            r#"{"endpoints":[{"game":"fms2023","port":5301,"sinks":[{"type":"udp","destinations":["127.0.0.1:9000"]}]}]}"#,
        )?;
        config.validate()?;
        assert_eq!(config.endpoints.first().map(EndpointSettings::port), Some(5301));
        Ok(())
    }

    #[test]
    fn test_unknown_values_are_rejected() {
        let documents = [
            "endpoints:\n  - game: gt7\n",
            "endpoints:\n  - game: fms2023\n    sinks:\n      - { type: csv, path: x, retention: weekly }\n",
            "endpoints:\n  - game: fms2023\n    sinks:\n      - { type: mysql, path: x }\n",
            "endpoints:\n  - game: fms2023\n    colour: red\n",
        ];
        for document in documents {
            assert!(
                matches!(ServiceConfig::from_yaml_str(document), Err(_)),
                "accepted: {document}"
            );
        }
    }

    #[test]
    fn test_validate_rejections() {
        let cases = [
            (ServiceConfig { endpoints: vec![] }, "No endpoints"),
            (ServiceConfig { endpoints: vec![minimal(0)] }, "Invalid port 0"),
            (
                ServiceConfig {
                    endpoints: vec![minimal(5300), minimal(5300)],
                },
                "more than once",
            ),
            (
                ServiceConfig {
                    endpoints: vec![EndpointSettings {
                        queue_capacity: 0,
                        ..minimal(5300)
                    }],
                },
                "queue capacity",
            ),
            (
                ServiceConfig {
                    endpoints: vec![EndpointSettings {
                        sinks: vec![SinkConfig::Udp {
                            destinations: vec![],
                        }],
                        ..minimal(5300)
                    }],
                },
                "no destinations",
            ),
        ];

        for (config, expected) in cases {
            let message = config.validate().map_err(|e| e.to_string()).err();
            assert!(
                message.as_deref().is_some_and(|m| m.contains(expected)),
                "expected '{expected}', got {message:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_load_from_path_by_extension() -> TestResult {
        let dir = tempfile::tempdir()?;
        let yaml = dir.path().join("config.yaml");
        let json = dir.path().join("config.json");
        tokio::fs::write(&yaml, EXAMPLE).await?;
        tokio::fs::write(
            &json,
            r#"{"endpoints":[{"game":"fms2023","sinks":[]}]}"#,
        )
        .await?;

        assert_eq!(ServiceConfig::load_from_path(&yaml).await?.endpoints.len(), 1);
        assert_eq!(ServiceConfig::load_from_path(&json).await?.endpoints.len(), 1);

        let missing = ServiceConfig::load_from_path(dir.path().join("nope.yaml")).await;
        assert!(matches!(missing, Err(_)));
        Ok(())
    }

    #[test]
    fn test_factory_shares_stores_and_schemas() -> TestResult {
        let mut factory = SinkFactory::new();
        let game = Game::ForzaMotorsport2023;
        let db = PathBuf::from("shared.db");

        let plain = factory.build(game, &SinkConfig::Sqlite { path: db.clone() })?;
        let best = factory.build(
            game,
            &SinkConfig::SqliteBestLap {
                path: db,
                user_id: 7,
            },
        )?;
        assert_eq!(plain.name(), "sqlite");
        assert_eq!(best.name(), "sqlite_best_lap");
        assert_eq!(factory.stores.len(), 1);
        assert_eq!(factory.schemas.len(), 1);

        let udp = factory.build(
            game,
            &SinkConfig::Udp {
                destinations: vec![],
            },
        );
        assert!(matches!(udp, Err(_)));
        Ok(())
    }
}
