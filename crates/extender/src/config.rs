//! Extender configuration

use anyhow::{Context, Result};
use extender_lib::binpack::DISTRIBUTE_EVENLY;
use extender_lib::extender::DEFAULT_INSTANCE_GROUP_LABEL;
use extender_lib::priority::{LabelPriorityOrder, NodePriority};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "EXTENDER";

#[derive(Debug, Clone, Deserialize)]
pub struct ExtenderConfig {
    /// Port serving the extender, health and metrics endpoints
    #[serde(default = "default_port")]
    pub port: u16,

    /// Hold drivers back while earlier drivers of their instance group do not fit
    #[serde(default)]
    pub fifo: bool,

    #[serde(default = "default_binpack_algo")]
    pub binpack_algo: String,

    /// Node label (and node selector key) naming a pod's instance group
    #[serde(default = "default_instance_group_label")]
    pub instance_group_label: String,

    #[serde(default)]
    pub use_experimental_host_priorities: bool,

    #[serde(default)]
    pub driver_prioritized_node_label: Option<LabelPriorityOrder>,

    #[serde(default)]
    pub executor_prioritized_node_label: Option<LabelPriorityOrder>,

    /// Maximum age of the reservation and demand caches
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,

    /// Rewrite stored reservations to the current storage version at start-up
    #[serde(default = "default_run_migration")]
    pub run_migration: bool,

    /// Identity stamped on structured events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
}

fn default_port() -> u16 {
    8484
}

fn default_binpack_algo() -> String {
    DISTRIBUTE_EVENLY.to_string()
}

fn default_instance_group_label() -> String {
    DEFAULT_INSTANCE_GROUP_LABEL.to_string()
}

fn default_resync_interval() -> u64 {
    15
}

fn default_run_migration() -> bool {
    true
}

fn default_instance_name() -> String {
    std::env::var("POD_NAME").unwrap_or_else(|_| "spark-scheduler-extender".to_string())
}

impl ExtenderConfig {
    /// Load configuration from an optional file, then `EXTENDER_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn node_priority(&self) -> NodePriority {
        NodePriority::new(
            self.use_experimental_host_priorities,
            self.driver_prioritized_node_label.as_ref(),
            self.executor_prioritized_node_label.as_ref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const UNUSED_PREFIX: &str = "EXTENDER_CONFIG_TEST_UNSET";

    #[test]
    fn test_defaults_without_sources() {
        let config = ExtenderConfig::load_with_prefix(None, UNUSED_PREFIX).unwrap();

        assert_eq!(config.port, 8484);
        assert!(!config.fifo);
        assert_eq!(config.binpack_algo, "distribute-evenly");
        assert_eq!(config.instance_group_label, "instance-group");
        assert_eq!(config.resync_interval(), Duration::from_secs(15));
        assert!(config.run_migration);
        assert!(config.driver_prioritized_node_label.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            r#"
port: 9000
fifo: true
binpack_algo: single-az-tightly-pack
resync_interval_secs: 30
driver_prioritized_node_label:
  name: lifecycle
  descending_priority_values: [on-demand, spot]
"#
        )
        .unwrap();

        let config = ExtenderConfig::load_with_prefix(Some(file.path()), UNUSED_PREFIX).unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.fifo);
        assert_eq!(config.binpack_algo, "single-az-tightly-pack");
        assert_eq!(config.resync_interval_secs, 30);
        assert_eq!(
            config.driver_prioritized_node_label,
            Some(LabelPriorityOrder {
                name: "lifecycle".to_string(),
                descending_priority_values: vec!["on-demand".to_string(), "spot".to_string()],
            })
        );
        assert!(config.executor_prioritized_node_label.is_none());
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "port: 9000\nfifo: false").unwrap();

        std::env::set_var("EXTENDER_CONFIG_TEST_ENV_PORT", "9100");
        std::env::set_var("EXTENDER_CONFIG_TEST_ENV_FIFO", "true");
        let config =
            ExtenderConfig::load_with_prefix(Some(file.path()), "EXTENDER_CONFIG_TEST_ENV").unwrap();
        std::env::remove_var("EXTENDER_CONFIG_TEST_ENV_PORT");
        std::env::remove_var("EXTENDER_CONFIG_TEST_ENV_FIFO");

        assert_eq!(config.port, 9100);
        assert!(config.fifo);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "port: not-a-number").unwrap();

        assert!(ExtenderConfig::load_with_prefix(Some(file.path()), UNUSED_PREFIX).is_err());
    }
}
