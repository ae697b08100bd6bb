pub mod common;
pub mod digitalocean;
pub mod registry;
pub mod vercel;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::PluginError;

pub use registry::{DuplicatePolicy, PluginEntry, Registry};

/// Options decoded from `AUTHENTICATOR_CONFIG`, keyed by their unprefixed names.
pub type RawOptions = serde_json::Map<String, Value>;

/// Options renamed into a plugin's `{prefix}_{name}` namespace.
pub type SynthesizedConfig = BTreeMap<String, Value>;

/// A DNS authenticator plugin, instantiated once per invocation.
#[async_trait]
pub trait Authenticator: Send {
    /// Reads back an option by its unprefixed name, e.g. `propagation-seconds`.
    fn conf(&self, name: &str) -> Option<&Value>;

    /// Loads whatever secrets the plugin needs to talk to its DNS provider.
    async fn setup_credentials(&mut self) -> Result<(), PluginError>;

    /// Creates the TXT record `validation_domain` with the value `validation`.
    async fn perform(
        &mut self,
        domain: &str,
        validation_domain: &str,
        validation: &str,
    ) -> Result<(), PluginError>;

    /// Removes the record created by `perform`.
    async fn cleanup(
        &mut self,
        domain: &str,
        validation_domain: &str,
        validation: &str,
    ) -> Result<(), PluginError>;
}

/// How a plugin type name is looked up and how its options are namespaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginIdentity {
    pub type_name: String,
    pub registry_name: String,
    pub config_prefix: String,
}

impl PluginIdentity {
    pub fn new(type_name: &str) -> Self {
        PluginIdentity {
            type_name: type_name.to_string(),
            registry_name: type_name.to_string(),
            config_prefix: config_prefix(type_name),
        }
    }
}

/// `acme-plugin:dns` becomes `acme_plugin_dns`.
pub fn config_prefix(type_name: &str) -> String {
    type_name.replace(['-', ':', '.'], "_")
}

/// Builds the configuration a plugin with `prefix` expects. Options are applied after the
/// propagation default, so an explicit `propagation_seconds` option wins.
pub fn synthesize_config(
    options: &RawOptions,
    propagation_seconds: u64,
    prefix: &str,
) -> SynthesizedConfig {
    let mut config = SynthesizedConfig::new();
    config.insert(
        format!("{prefix}_propagation_seconds"),
        Value::from(propagation_seconds),
    );
    for (name, value) in options {
        config.insert(format!("{prefix}_{name}"), value.clone());
    }
    config
}

/// Prefix-aware view over a [`SynthesizedConfig`], shared by the bundled plugins.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    prefix: String,
    values: SynthesizedConfig,
}

impl PluginConfig {
    pub fn new(values: SynthesizedConfig, prefix: &str) -> Self {
        PluginConfig {
            prefix: prefix.to_string(),
            values,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full key for an option name. Dashes in `name` become underscores.
    pub fn dest(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name.replace('-', "_"))
    }

    pub fn conf(&self, name: &str) -> Option<&Value> {
        self.values.get(&self.dest(name))
    }

    pub fn conf_str(&self, name: &str) -> Option<&str> {
        self.conf(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Integer option, also accepting a string holding an integer.
    pub fn conf_u64(&self, name: &str) -> Result<Option<u64>, PluginError> {
        match self.conf(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value_as_u64(value)
                .map(Some)
                .ok_or_else(|| {
                    PluginError::Config(format!(
                        "{} must be a non-negative integer, got {value}",
                        self.dest(name)
                    ))
                }),
        }
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let key = self.dest(name);
        self.values.insert(key, value.into());
    }
}

pub(crate) fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
