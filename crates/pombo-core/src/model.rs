//! Application configuration model.

use std::time::Duration;

use pombo_common::{PomboError, local_ip};

/// Typed view over the layered application configuration.
///
/// Values come from `conf/application.yml` plus `POMBO_*` environment
/// overrides; every accessor falls back to a sensible default so a bare
/// process starts in standalone mode with no config file at all.
#[derive(Clone, Debug)]
pub struct Configuration {
    pub config: config::Config,
}

impl Configuration {
    pub fn new() -> Result<Self, PomboError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("conf/application").required(false))
            .add_source(config::Environment::with_prefix("POMBO").separator("__"))
            .build()
            .map_err(|e| PomboError::ConfigError(e.to_string()))?;

        Ok(Self { config })
    }

    pub fn from_config(config: config::Config) -> Self {
        Self { config }
    }

    pub fn server_address(&self) -> String {
        self.config
            .get_string("server.address")
            .unwrap_or_else(|_| "0.0.0.0".to_string())
    }

    /// Port of the admin API and the internal cluster RPC surface.
    pub fn server_port(&self) -> u16 {
        self.config.get_int("server.port").unwrap_or(9190) as u16
    }

    /// Port of the WebSocket listener clients connect to.
    pub fn ws_port(&self) -> u16 {
        self.config.get_int("ws.port").unwrap_or(9191) as u16
    }

    /// The address other nodes reach this process on. This is the identity
    /// registered in the coordination store and embedded into client ids.
    pub fn local_address(&self) -> String {
        let ip = self
            .config
            .get_string("server.advertise_ip")
            .unwrap_or_else(|_| local_ip());
        format!("{}:{}", ip, self.server_port())
    }

    pub fn etcd_endpoints(&self) -> Vec<String> {
        self.config
            .get_string("etcd.endpoints")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Cluster mode is simply "a coordination store is configured".
    pub fn is_cluster(&self) -> bool {
        !self.etcd_endpoints().is_empty()
    }

    pub fn lease_ttl(&self) -> i64 {
        self.config.get_int("cluster.lease_ttl").unwrap_or(5)
    }

    /// Base64 AES-256 key shared by every node; client ids minted by one
    /// node must be resolvable by all others.
    pub fn cluster_secret(&self) -> Option<String> {
        self.config
            .get_string("cluster.secret")
            .ok()
            .filter(|s| !s.is_empty())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        let secs = self.config.get_int("heartbeat.interval_secs").unwrap_or(25);
        Duration::from_secs(secs.max(1) as u64)
    }

    pub fn heartbeat_probe_timeout(&self) -> Duration {
        let millis = self
            .config
            .get_int("heartbeat.probe_timeout_ms")
            .unwrap_or(1000);
        Duration::from_millis(millis.max(1) as u64)
    }

    pub fn delivery_queue_size(&self) -> usize {
        self.config.get_int("delivery.queue_size").unwrap_or(1000) as usize
    }

    pub fn peer_timeout(&self) -> Duration {
        let secs = self.config.get_int("peer.timeout_secs").unwrap_or(5);
        Duration::from_secs(secs.max(1) as u64)
    }

    pub fn log_dir(&self) -> Option<String> {
        self.config.get_string("logging.dir").ok()
    }

    pub fn log_console(&self) -> bool {
        self.config.get_bool("logging.console").unwrap_or(true)
    }

    pub fn log_file(&self) -> bool {
        self.config.get_bool("logging.file").unwrap_or(true)
    }

    pub fn log_level(&self) -> String {
        self.config
            .get_string("logging.level")
            .unwrap_or_else(|_| "info".to_string())
    }
}
