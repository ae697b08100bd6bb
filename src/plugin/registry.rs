use std::{fmt, sync::Arc};

use strum::{Display, EnumString, EnumVariantNames};
use tracing::{event, Level};

use super::{digitalocean, vercel, Authenticator, SynthesizedConfig};
use crate::error::{AdapterError, PluginError};

/// Builds a plugin from its synthesized configuration and config prefix.
pub type PluginConstructor = Arc<
    dyn Fn(SynthesizedConfig, &str) -> Result<Box<dyn Authenticator>, PluginError> + Send + Sync,
>;

/// What to do when more than one registered plugin advertises the requested name.
#[derive(Clone, Copy, Debug, Default, Display, EnumString, EnumVariantNames, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail with an ambiguity error.
    #[default]
    Reject,
    /// Take whichever entry was registered first.
    First,
}

#[derive(Clone)]
pub struct PluginEntry {
    name: String,
    description: String,
    constructor: PluginConstructor,
}

impl PluginEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn instantiate(
        &self,
        config: SynthesizedConfig,
        prefix: &str,
    ) -> Result<Box<dyn Authenticator>, PluginError> {
        (self.constructor)(config, prefix)
    }
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Name-indexed table of the authenticator plugins available to this process.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    entries: Vec<PluginEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// The plugins compiled into this binary.
    pub fn builtin() -> Self {
        let mut registry = Registry::new();
        registry.register(
            vercel::PLUGIN_NAME,
            "Obtain certificates using a DNS TXT record on Vercel DNS",
            |config, prefix| Ok(Box::new(vercel::VercelAuthenticator::new(config, prefix)?)),
        );
        registry.register(
            digitalocean::PLUGIN_NAME,
            "Obtain certificates using a DNS TXT record on DigitalOcean DNS",
            |config, prefix| {
                Ok(Box::new(digitalocean::DigitalOceanAuthenticator::new(
                    config, prefix,
                )?))
            },
        );
        registry
    }

    pub fn register<F>(&mut self, name: &str, description: &str, constructor: F)
    where
        F: Fn(SynthesizedConfig, &str) -> Result<Box<dyn Authenticator>, PluginError>
            + Send
            + Sync
            + 'static,
    {
        self.entries.push(PluginEntry {
            name: name.to_string(),
            description: description.to_string(),
            constructor: Arc::new(constructor),
        });
    }

    pub fn entries(&self) -> &[PluginEntry] {
        &self.entries
    }

    /// Finds the plugin advertised as `name`. Nothing is instantiated here.
    pub fn resolve(&self, name: &str, policy: DuplicatePolicy) -> Result<&PluginEntry, AdapterError> {
        let matches = self
            .entries
            .iter()
            .filter(|e| e.name == name)
            .collect::<Vec<_>>();

        match (matches.as_slice(), policy) {
            ([], _) => Err(AdapterError::PluginNotFound(name.to_string())),
            ([entry], _) => Ok(*entry),
            ([first, ..], DuplicatePolicy::First) => {
                event!(
                    Level::WARN,
                    "{} plugins are registered as {name}, using the first one",
                    matches.len()
                );
                Ok(*first)
            }
            (_, DuplicatePolicy::Reject) => Err(AdapterError::AmbiguousPlugin {
                name: name.to_string(),
                count: matches.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::plugin::PluginConfig;

    struct Tagged {
        config: PluginConfig,
    }

    #[async_trait]
    impl Authenticator for Tagged {
        fn conf(&self, name: &str) -> Option<&Value> {
            self.config.conf(name)
        }

        async fn setup_credentials(&mut self) -> Result<(), PluginError> {
            Ok(())
        }

        async fn perform(&mut self, _: &str, _: &str, _: &str) -> Result<(), PluginError> {
            Ok(())
        }

        async fn cleanup(&mut self, _: &str, _: &str, _: &str) -> Result<(), PluginError> {
            Ok(())
        }
    }

    fn tagged(
        tag: &'static str,
    ) -> impl Fn(SynthesizedConfig, &str) -> Result<Box<dyn Authenticator>, PluginError>
           + Send
           + Sync
           + 'static {
        move |mut config: SynthesizedConfig, prefix: &str| {
            config.insert(format!("{prefix}_tag"), json!(tag));
            Ok(Box::new(Tagged {
                config: PluginConfig::new(config, prefix),
            }) as Box<dyn Authenticator>)
        }
    }

    fn duplicated() -> Registry {
        let mut registry = Registry::new();
        registry.register("dup:dns", "first", tagged("first"));
        registry.register("other:dns", "other", tagged("other"));
        registry.register("dup:dns", "second", tagged("second"));
        registry
    }

    #[test]
    fn builtin_names() {
        let registry = Registry::builtin();
        let names = registry.entries().iter().map(|e| e.name()).collect::<Vec<_>>();
        assert_eq!(names, vec!["dns-vercel", "dns-digitalocean"]);
    }

    #[test]
    fn resolves_unique_name() {
        let registry = duplicated();
        let entry = registry.resolve("other:dns", DuplicatePolicy::Reject).unwrap();
        assert_eq!(entry.description(), "other");

        let plugin = entry.instantiate(SynthesizedConfig::new(), "other_dns").unwrap();
        assert_eq!(plugin.conf("tag"), Some(&json!("other")));
    }

    #[test]
    fn unknown_name() {
        let err = duplicated()
            .resolve("missing:dns", DuplicatePolicy::First)
            .unwrap_err();
        assert!(matches!(err, AdapterError::PluginNotFound(n) if n == "missing:dns"));
    }

    #[test]
    fn duplicate_rejected() {
        let err = duplicated()
            .resolve("dup:dns", DuplicatePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, AdapterError::AmbiguousPlugin { count: 2, .. }));
    }

    #[test]
    fn duplicate_first_wins() {
        let registry = duplicated();
        let entry = registry.resolve("dup:dns", DuplicatePolicy::First).unwrap();
        assert_eq!(entry.description(), "first");
    }

    #[test]
    fn policy_names() {
        assert_eq!("first".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::First);
        assert_eq!("reject".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::Reject);
        assert!("random".parse::<DuplicatePolicy>().is_err());
        assert_eq!(DuplicatePolicy::default().to_string(), "reject");
    }
}
