use std::ffi::OsString;

use config::{Config, Environment};
use serde::Deserialize;
use serde_json::Value;
use strum::VariantNames;
use tracing::{event, Level};

use crate::{
    error::AdapterError,
    plugin::{DuplicatePolicy, RawOptions},
};

pub const DEFAULT_PROPAGATION_SECONDS: u64 = 120;
pub const DEFAULT_POLLING_INTERVAL: u64 = 5;

/// Environment variables as the `config` crate sees them: lowercased, no separator.
/// The `legocertbot_`/`exec_` names are accepted when the plain name is unset.
#[derive(Debug, Default, Deserialize)]
struct RawEnv {
    authenticator_type: Option<String>,
    legocertbot_authenticator_type: Option<String>,
    authenticator_config: Option<String>,
    legocertbot_authenticator_config: Option<String>,
    propagation_timeout: Option<u64>,
    exec_propagation_timeout: Option<u64>,
    polling_interval: Option<u64>,
    exec_polling_interval: Option<u64>,
    authenticator_duplicate_policy: Option<String>,
}

/// Everything the adapter takes from its environment, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvConfig {
    pub authenticator_type: String,
    pub options: RawOptions,
    pub propagation_seconds: u64,
    pub polling_interval: u64,
    pub duplicate_policy: DuplicatePolicy,
}

impl EnvConfig {
    pub fn from_env() -> Result<EnvConfig, AdapterError> {
        Self::from_vars(unicode_vars(std::env::vars_os()))
    }

    /// Reads the given variables instead of the process environment.
    pub fn from_vars<I, K, V>(vars: I) -> Result<EnvConfig, AdapterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let source = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<config::Map<String, String>>();
        Self::load(Environment::default().source(Some(source)))
    }

    fn load(env: Environment) -> Result<EnvConfig, AdapterError> {
        let raw: RawEnv = Config::builder()
            .add_source(env.ignore_empty(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AdapterError::MalformedConfig(e.to_string()))?;

        let authenticator_type = raw
            .authenticator_type
            .or(raw.legocertbot_authenticator_type)
            .ok_or(AdapterError::MissingConfig("AUTHENTICATOR_TYPE"))?;

        let options = match raw
            .authenticator_config
            .or(raw.legocertbot_authenticator_config)
        {
            Some(json) => parse_options(&json)?,
            None => RawOptions::new(),
        };

        let duplicate_policy = match raw.authenticator_duplicate_policy {
            Some(policy) => policy.parse().map_err(|_| {
                AdapterError::MalformedConfig(format!(
                    "AUTHENTICATOR_DUPLICATE_POLICY must be one of {}, got '{policy}'",
                    DuplicatePolicy::VARIANTS.join(", ")
                ))
            })?,
            None => DuplicatePolicy::default(),
        };

        Ok(EnvConfig {
            authenticator_type,
            options,
            propagation_seconds: raw
                .propagation_timeout
                .or(raw.exec_propagation_timeout)
                .unwrap_or(DEFAULT_PROPAGATION_SECONDS),
            polling_interval: raw
                .polling_interval
                .or(raw.exec_polling_interval)
                .unwrap_or(DEFAULT_POLLING_INTERVAL),
            duplicate_policy,
        })
    }
}

/// Drops variables whose name or value is not valid Unicode. None of the variables the
/// adapter reads can be like that, and a stray one elsewhere in the environment must not
/// stop it from starting.
fn unicode_vars<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (key, _) => {
                let key = match key {
                    Ok(key) => key,
                    Err(key) => key.to_string_lossy().into_owned(),
                };
                event!(Level::DEBUG, %key, "Skipping non-Unicode environment variable");
                None
            }
        })
        .collect()
}

fn parse_options(json: &str) -> Result<RawOptions, AdapterError> {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(options)) => Ok(options),
        Ok(other) => Err(AdapterError::MalformedConfig(format!(
            "AUTHENTICATOR_CONFIG must be a JSON object, got {other}"
        ))),
        Err(e) => Err(AdapterError::MalformedConfig(format!(
            "AUTHENTICATOR_CONFIG is not valid JSON: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults() {
        let env = EnvConfig::from_vars([("AUTHENTICATOR_TYPE", "acme-plugin:dns")]).unwrap();
        assert_eq!(
            env,
            EnvConfig {
                authenticator_type: "acme-plugin:dns".to_string(),
                options: RawOptions::new(),
                propagation_seconds: 120,
                polling_interval: 5,
                duplicate_policy: DuplicatePolicy::Reject,
            }
        );
    }

    #[test]
    fn reads_everything() {
        let env = EnvConfig::from_vars([
            ("AUTHENTICATOR_TYPE", "acme-plugin:dns"),
            ("AUTHENTICATOR_CONFIG", r#"{"api_key": "xyz", "retries": 3}"#),
            ("PROPAGATION_TIMEOUT", "60"),
            ("POLLING_INTERVAL", "10"),
            ("AUTHENTICATOR_DUPLICATE_POLICY", "first"),
            ("HOME", "/root"),
        ])
        .unwrap();

        assert_eq!(env.options.get("api_key"), Some(&json!("xyz")));
        assert_eq!(env.options.get("retries"), Some(&json!(3)));
        assert_eq!(env.propagation_seconds, 60);
        assert_eq!(env.polling_interval, 10);
        assert_eq!(env.duplicate_policy, DuplicatePolicy::First);
    }

    #[test]
    fn compatibility_names() {
        let env = EnvConfig::from_vars([
            ("LEGOCERTBOT_AUTHENTICATOR_TYPE", "dns-vercel"),
            ("LEGOCERTBOT_AUTHENTICATOR_CONFIG", r#"{"zone": "example.com"}"#),
            ("EXEC_PROPAGATION_TIMEOUT", "90"),
            ("EXEC_POLLING_INTERVAL", "2"),
        ])
        .unwrap();

        assert_eq!(env.authenticator_type, "dns-vercel");
        assert_eq!(env.options.get("zone"), Some(&json!("example.com")));
        assert_eq!(env.propagation_seconds, 90);
        assert_eq!(env.polling_interval, 2);
    }

    #[test]
    fn plain_names_take_precedence() {
        let env = EnvConfig::from_vars([
            ("AUTHENTICATOR_TYPE", "dns-digitalocean"),
            ("LEGOCERTBOT_AUTHENTICATOR_TYPE", "dns-vercel"),
            ("PROPAGATION_TIMEOUT", "30"),
            ("EXEC_PROPAGATION_TIMEOUT", "90"),
        ])
        .unwrap();

        assert_eq!(env.authenticator_type, "dns-digitalocean");
        assert_eq!(env.propagation_seconds, 30);
    }

    #[test]
    fn missing_type() {
        let err = EnvConfig::from_vars([("AUTHENTICATOR_CONFIG", "{}")]).unwrap_err();
        assert!(matches!(err, AdapterError::MissingConfig("AUTHENTICATOR_TYPE")));

        let err = EnvConfig::from_vars([("AUTHENTICATOR_TYPE", "")]).unwrap_err();
        assert!(matches!(err, AdapterError::MissingConfig(_)));
    }

    #[test]
    fn malformed_options() {
        for blob in ["[1, 2]", "\"text\"", "{not json", "42"] {
            let err = EnvConfig::from_vars([
                ("AUTHENTICATOR_TYPE", "acme-plugin:dns"),
                ("AUTHENTICATOR_CONFIG", blob),
            ])
            .unwrap_err();
            assert!(matches!(err, AdapterError::MalformedConfig(_)), "{blob}");
        }
    }

    #[test]
    fn malformed_numbers() {
        let err = EnvConfig::from_vars([
            ("AUTHENTICATOR_TYPE", "acme-plugin:dns"),
            ("PROPAGATION_TIMEOUT", "soon"),
        ])
        .unwrap_err();
        assert!(matches!(err, AdapterError::MalformedConfig(_)));
    }

    #[cfg(unix)]
    #[test]
    fn non_unicode_variables_are_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let vars = unicode_vars([
            (OsString::from("AUTHENTICATOR_TYPE"), OsString::from("acme-plugin:dns")),
            (OsString::from("JUNK"), OsString::from_vec(vec![0xff, 0xfe])),
            (OsString::from_vec(vec![0x80, b'X']), OsString::from("value")),
        ]);
        assert_eq!(
            vars,
            vec![("AUTHENTICATOR_TYPE".to_string(), "acme-plugin:dns".to_string())]
        );

        let env = EnvConfig::from_vars(vars).unwrap();
        assert_eq!(env.authenticator_type, "acme-plugin:dns");
    }

    #[cfg(unix)]
    #[test]
    fn from_env_tolerates_non_unicode_environment() {
        use std::os::unix::ffi::OsStringExt;

        // No other unit test reads these two variables.
        std::env::set_var("DNS01_ADAPTER_TEST_JUNK", OsString::from_vec(vec![0xff, 0xfe]));
        std::env::set_var("AUTHENTICATOR_TYPE", "acme-plugin:dns");

        let env = EnvConfig::from_env().unwrap();
        assert_eq!(env.authenticator_type, "acme-plugin:dns");
    }

    #[test]
    fn unknown_policy() {
        let err = EnvConfig::from_vars([
            ("AUTHENTICATOR_TYPE", "acme-plugin:dns"),
            ("AUTHENTICATOR_DUPLICATE_POLICY", "random"),
        ])
        .unwrap_err();
        assert!(matches!(err, AdapterError::MalformedConfig(m) if m.contains("reject, first")));
    }
}
