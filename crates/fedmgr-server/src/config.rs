//! Controller configuration and federation definition files.
//!
//! Settings resolve in order: defaults, then a TOML file, then env vars
//! and CLI flags (applied in `main`). Federation definitions stand in for
//! the database feed and are read from their own TOML file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fedmgr_federation::{
    ClusterRecord, FederationConfig, FederationRecord, FederationUpdate, MonitorConfig,
    TransportConfig,
};
use serde::{Deserialize, Serialize};

/// Top-level controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Name of the local cluster.
    pub cluster_name: String,
    /// Address the controller listens on.
    pub bind: String,
    pub port: u16,
    /// Directory holding the federation state file.
    pub state_dir: String,
    /// TOML file with federation definitions. Empty means none.
    pub federations_file: String,
    /// Shared secret for controller-to-controller frames. Empty disables auth.
    pub auth_pass: String,
    /// Maximum concurrent inbound controller connections.
    pub max_connections: usize,
    pub federation: FederationSection,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cluster_name: String::new(),
            bind: "127.0.0.1".into(),
            port: 6817,
            state_dir: String::new(),
            federations_file: String::new(),
            auth_pass: String::new(),
            max_connections: 1024,
            federation: FederationSection::default(),
        }
    }
}

/// The `[federation]` table: timers for the monitor and transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationSection {
    pub ping_interval_secs: u64,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
}

impl Default for FederationSection {
    fn default() -> Self {
        let monitor = MonitorConfig::default();
        let transport = TransportConfig::default();
        Self {
            ping_interval_secs: monitor.ping_interval.as_secs(),
            connect_timeout_ms: transport.connect_timeout.as_millis() as u64,
            request_timeout_ms: transport.request_timeout.as_millis() as u64,
            shutdown_timeout_ms: monitor.shutdown_timeout.as_millis() as u64,
        }
    }
}

impl ControllerConfig {
    /// Loads a config file. Keys missing from the file keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file '{}': {e}", path.display()))?;
        Self::parse(&content)
            .map_err(|e| format!("invalid config file '{}': {e}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Renders the config as TOML, for `--config-template`.
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| e.to_string())
    }

    /// The state directory, or `None` when persistence is disabled.
    pub fn state_dir_path(&self) -> Option<PathBuf> {
        (!self.state_dir.is_empty()).then(|| PathBuf::from(&self.state_dir))
    }

    pub fn federations_path(&self) -> Option<PathBuf> {
        (!self.federations_file.is_empty()).then(|| PathBuf::from(&self.federations_file))
    }

    pub fn federation_config(&self) -> FederationConfig {
        FederationConfig {
            cluster_name: self.cluster_name.clone(),
            monitor: MonitorConfig {
                ping_interval: Duration::from_secs(self.federation.ping_interval_secs),
                shutdown_timeout: Duration::from_millis(self.federation.shutdown_timeout_ms),
            },
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_millis(self.federation.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.federation.request_timeout_ms),
        }
    }

    /// Checks values that serde cannot.
    pub fn validate(&self) -> Result<(), String> {
        if self.cluster_name.trim().is_empty() {
            return Err("cluster-name is required".into());
        }
        if self.federation.ping_interval_secs == 0 {
            return Err("federation.ping_interval_secs must be at least 1".into());
        }
        if self.max_connections == 0 {
            return Err("max_connections must be at least 1".into());
        }
        Ok(())
    }
}

/// A federation definitions file:
///
/// ```toml
/// [[federation]]
/// name = "fed1"
///
/// [[federation.cluster]]
/// name = "alpha"
/// host = "10.0.0.1"
/// port = 6817
/// id = 1
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionsFile {
    #[serde(default)]
    pub federation: Vec<FederationDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationDef {
    pub name: String,
    #[serde(default)]
    pub cluster: Vec<ClusterDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDef {
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    /// Cluster id within the federation.
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub state: u32,
    #[serde(default)]
    pub flags: u32,
}

impl DefinitionsFile {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            format!("failed to read federations file '{}': {e}", path.display())
        })?;
        toml::from_str(&content)
            .map_err(|e| format!("invalid federations file '{}': {e}", path.display()))
    }

    /// Converts the definitions into the update the manager consumes.
    /// Every cluster is tagged with the federation that lists it.
    pub fn into_update(self) -> FederationUpdate {
        let federations = self
            .federation
            .into_iter()
            .map(|fed| {
                let clusters = fed
                    .cluster
                    .into_iter()
                    .map(|c| {
                        let mut record = ClusterRecord::new(c.name, c.host, c.port)
                            .in_federation(fed.name.clone(), c.id);
                        record.fed.state = c.state;
                        record.fed.flags = c.flags;
                        record
                    })
                    .collect();
                FederationRecord {
                    name: fed.name,
                    clusters,
                }
            })
            .collect();
        FederationUpdate::new(federations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = ControllerConfig::parse(
            r#"
            cluster_name = "alpha"
            port = 7000

            [federation]
            ping_interval_secs = 2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.cluster_name, "alpha");
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.bind, "127.0.0.1");
        assert_eq!(cfg.federation.ping_interval_secs, 2);
        assert_eq!(cfg.federation.request_timeout_ms, 10_000);
    }

    #[test]
    fn template_round_trips() {
        let toml = ControllerConfig::default().to_toml().unwrap();
        let parsed = ControllerConfig::parse(&toml).unwrap();
        assert_eq!(parsed.port, 6817);
        assert_eq!(parsed.federation.ping_interval_secs, 5);
    }

    #[test]
    fn unknown_types_rejected() {
        assert!(ControllerConfig::parse("port = \"abc\"").is_err());
    }

    #[test]
    fn validate_requires_cluster_name() {
        let mut cfg = ControllerConfig::default();
        assert!(cfg.validate().is_err());
        cfg.cluster_name = "alpha".into();
        assert!(cfg.validate().is_ok());
        cfg.federation.ping_interval_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn federation_config_uses_section_timers() {
        let mut cfg = ControllerConfig::default();
        cfg.cluster_name = "alpha".into();
        cfg.federation.ping_interval_secs = 3;
        cfg.federation.connect_timeout_ms = 250;
        assert_eq!(
            cfg.federation_config().monitor.ping_interval,
            Duration::from_secs(3)
        );
        assert_eq!(
            cfg.transport_config().connect_timeout,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn empty_paths_disable_features() {
        let cfg = ControllerConfig::default();
        assert!(cfg.state_dir_path().is_none());
        assert!(cfg.federations_path().is_none());
    }

    #[test]
    fn definitions_become_tagged_records() {
        let defs: DefinitionsFile = toml::from_str(
            r#"
            [[federation]]
            name = "fed1"

            [[federation.cluster]]
            name = "alpha"
            host = "10.0.0.1"
            port = 6817
            id = 1

            [[federation.cluster]]
            name = "beta"
            host = "10.0.0.2"
            port = 6817
            id = 2
            "#,
        )
        .unwrap();
        let update = defs.into_update();
        let feds = update.federations.unwrap();
        assert_eq!(feds.len(), 1);
        let beta = feds[0].find_cluster("beta").unwrap();
        assert_eq!(beta.fed.name, "fed1");
        assert_eq!(beta.fed.id, 2);
        assert_eq!(beta.control_host, "10.0.0.2");
    }

    #[test]
    fn empty_definitions_file_is_an_empty_update() {
        let defs: DefinitionsFile = toml::from_str("").unwrap();
        assert_eq!(defs.into_update().federations, Some(Vec::new()));
    }
}
