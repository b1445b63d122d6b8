//! The node binary's aggregated configuration: one `toml`-deserializable
//! struct per crate, folded into a single `NodeConfig` (§1 ambient stack,
//! §6).

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level `subtree-node` configuration: the union of every crate's
/// recognised options (§6), plus the handful of process-wiring settings
/// (bind addresses, log filter) that belong to the binary itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub tracing: TracingConfig,
    pub assembler: subtree_assembler::Config,
    pub validator: block_validator::Config,
    pub mined_status: mined_status::Config,
}

impl NodeConfig {
    /// Loads configuration from a TOML file, falling back to every
    /// section's defaults for keys the file omits, so a near-empty config
    /// file is always valid.
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|error| color_eyre::eyre::eyre!("reading config file {}: {error}", path.display()))?;
        let config: NodeConfig = toml::from_str(&text)
            .map_err(|error| color_eyre::eyre::eyre!("parsing config file {}: {error}", path.display()))?;
        config.validate();
        Ok(config)
    }

    /// Startup sanity checks that warn, rather than fail, on a nonsensical
    /// combination of otherwise individually-valid values (§3 "Supplemented
    /// features").
    pub fn validate(&self) {
        if self.mined_status.max_mined_batch_latency_millis > self.assembler.double_spend_window_millis {
            tracing::warn!(
                mined_status_batch_latency_ms = self.mined_status.max_mined_batch_latency_millis,
                double_spend_window_ms = self.assembler.double_spend_window_millis,
                "mined-status batch latency exceeds the double-spend window; mined-status \
                 acknowledgements may lag behind the window they're meant to race",
            );
        }

        if self.validator.leaf_capacity != self.assembler.initial_merkle_items_per_subtree {
            tracing::warn!(
                validator_leaf_capacity = self.validator.leaf_capacity,
                assembler_leaf_capacity = self.assembler.initial_merkle_items_per_subtree,
                "validator.leaf_capacity and assembler.initial_merkle_items_per_subtree disagree; \
                 subtrees the assembler publishes may fail deserialization in the validator",
            );
        }
    }
}

/// Logging and metrics-endpoint configuration for the binary itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// An `EnvFilter` directive string, e.g. `"info,block_validator=debug"`.
    pub filter: Option<String>,
    /// Whether to enable the Prometheus metrics endpoint (requires the
    /// `prometheus` feature).
    pub metrics_enabled: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        TracingConfig { filter: None, metrics_enabled: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn an_empty_document_resolves_to_every_section_default() {
        let config: NodeConfig = toml::from_str("").unwrap();
        assert_eq!(config.assembler.double_spend_window_millis, 2_000);
        assert_eq!(config.validator.bloom_filter_recent_blocks, 288);
        assert_eq!(config.mined_status.max_retries, 10);
    }

    #[test]
    fn a_partial_document_overrides_only_the_keys_it_sets() {
        let config: NodeConfig = toml::from_str(
            r#"
            [assembler]
            double_spend_window_millis = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.assembler.double_spend_window_millis, 5_000);
        assert_eq!(config.assembler.batcher_size, 1_000);
    }
}
