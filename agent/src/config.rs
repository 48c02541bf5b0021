//! Agent configuration options.
//!
//! We use `serde` to parse these options from the TOML config file,
//! therefore the structs derive [`serde::Deserialize`] and [`serde::Serialize`].

use std::{path::Path, time::Duration};

use anyhow::Context;
use pipeliner::{module::ParameterMap, pipeline::RelayConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default)]
    pub relay: RelayOptions,

    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
}

/// Settings applied to the relay of every output.
#[derive(Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RelayOptions {
    /// Maximum time to wait for a sink to accept an item.
    pub forward_timeout: Option<humantime_serde::Serde<Duration>>,
}

/// One output module instance.
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Generic id of the module, for instance `email`.
    pub module: String,
    /// Specific id of this instance, must not be empty.
    pub id: String,
    #[serde(default)]
    pub params: ParameterMap,
}

impl AgentConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).with_context(|| format!("could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: AgentConfig = toml::from_str(content)?;
        for output in &config.outputs {
            if output.id.is_empty() {
                anyhow::bail!("output of module {:?} has an empty id", output.module);
            }
        }
        Ok(config)
    }
}

impl RelayOptions {
    pub fn to_relay_config(&self) -> RelayConfig {
        RelayConfig {
            forward_timeout: self.forward_timeout.map(|t| t.into_inner()),
        }
    }
}
