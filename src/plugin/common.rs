//! Helpers shared by the bundled DNS plugins.

use std::path::Path;

use config::{Config, File, FileFormat};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{event, Level};

use super::PluginConfig;
use crate::error::PluginError;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub fn http_client() -> Result<Client, PluginError> {
    Ok(Client::builder().user_agent(USER_AGENT).build()?)
}

/// Turns a non-success response into a [`PluginError::Api`] carrying the response body.
pub async fn check_response(res: Response, action: &'static str) -> Result<Response, PluginError> {
    let status = res.status();
    if status.is_success() {
        Ok(res)
    } else {
        let body = res.text().await.unwrap_or_default();
        Err(PluginError::Api {
            action,
            status,
            body,
        })
    }
}

/// A credentials INI file. Keys carry the plugin's prefix, e.g. `dns_vercel_token = ...`.
pub struct CredentialsFile {
    prefix: String,
    values: Config,
}

impl CredentialsFile {
    pub fn load(path: &Path, prefix: &str) -> Result<CredentialsFile, PluginError> {
        if !path.is_file() {
            return Err(PluginError::Credentials(format!(
                "credentials file {} does not exist",
                path.display()
            )));
        }
        warn_if_exposed(path);

        let values = Config::builder()
            .add_source(File::from(path).format(FileFormat::Ini))
            .build()
            .map_err(|e| {
                PluginError::Credentials(format!("reading {}: {e}", path.display()))
            })?;

        Ok(CredentialsFile {
            prefix: prefix.to_string(),
            values,
        })
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.values
            .get_string(&format!("{}_{name}", self.prefix))
            .ok()
            .filter(|v| !v.is_empty())
    }
}

#[cfg(unix)]
fn warn_if_exposed(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(meta) = std::fs::metadata(path) {
        if meta.permissions().mode() & 0o077 != 0 {
            event!(
                Level::WARN,
                "Unsafe permissions on credentials file {}, it is readable by other users",
                path.display()
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_exposed(_path: &Path) {}

/// Finds a secret: the plain option first, then the credentials file, then the environment.
pub fn lookup_secret(
    config: &PluginConfig,
    name: &str,
    env_var: &str,
) -> Result<String, PluginError> {
    if let Some(value) = config.conf_str(name) {
        return Ok(value.to_string());
    }

    if let Some(path) = config.conf_str("credentials") {
        let creds = CredentialsFile::load(Path::new(path), config.prefix())?;
        return creds.get(name).ok_or_else(|| {
            PluginError::Credentials(format!(
                "{path} does not contain {}_{name}",
                config.prefix()
            ))
        });
    }

    std::env::var(env_var)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            PluginError::Credentials(format!(
                "set {} or {}, or export {env_var}",
                config.dest(name),
                config.dest("credentials")
            ))
        })
}

/// Candidate zone names for `domain`, longest first.
pub fn base_domain_name_guesses(domain: &str) -> Vec<&str> {
    let mut guesses = vec![domain];
    let mut rest = domain;
    while let Some((_, parent)) = rest.split_once('.') {
        if parent.is_empty() {
            break;
        }
        guesses.push(parent);
        rest = parent;
    }
    guesses
}

/// Asks the provider about each of `domain`'s [`base_domain_name_guesses`] in turn, and
/// returns the first one it does not answer with a 404.
pub async fn find_zone<F>(domain: &str, lookup: F) -> Result<String, PluginError>
where
    F: Fn(&str) -> Result<RequestBuilder, PluginError>,
{
    for guess in base_domain_name_guesses(domain) {
        let res = lookup(guess)?.send().await?;
        if res.status() == StatusCode::NOT_FOUND {
            continue;
        }

        check_response(res, "look up domain").await?;
        event!(Level::DEBUG, "Using zone {guess} for {domain}");
        return Ok(guess.to_string());
    }

    Err(PluginError::ZoneNotFound(domain.to_string()))
}

/// The record name relative to `zone`, or `@` for the apex itself.
pub fn relative_name<'a>(validation_domain: &'a str, zone: &str) -> &'a str {
    if validation_domain == zone {
        return "@";
    }
    validation_domain
        .strip_suffix(zone)
        .and_then(|n| n.strip_suffix('.'))
        .unwrap_or(validation_domain)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;
    use crate::plugin::{synthesize_config, RawOptions};

    #[test]
    fn guesses() {
        assert_eq!(
            base_domain_name_guesses("a.b.example.com"),
            vec!["a.b.example.com", "b.example.com", "example.com", "com"]
        );
        assert_eq!(base_domain_name_guesses("localhost"), vec!["localhost"]);
    }

    #[test]
    fn relative_names() {
        assert_eq!(
            relative_name("_acme-challenge.www.example.com", "example.com"),
            "_acme-challenge.www"
        );
        assert_eq!(relative_name("example.com", "example.com"), "@");
        assert_eq!(relative_name("_acme-challenge.other.org", "example.com"), "_acme-challenge.other.org");
        assert_eq!(relative_name("_acme-challenge.notexample.com", "example.com"), "_acme-challenge.notexample.com");
    }

    #[test]
    fn reads_credentials_file() {
        let mut file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        writeln!(file, "# token for the test zone").unwrap();
        writeln!(file, "dns_test_token = abc123").unwrap();
        writeln!(file, "dns_test_empty =").unwrap();

        let creds = CredentialsFile::load(file.path(), "dns_test").unwrap();
        assert_eq!(creds.get("token").as_deref(), Some("abc123"));
        assert_eq!(creds.get("empty"), None);
        assert_eq!(creds.get("missing"), None);
    }

    #[test]
    fn missing_credentials_file() {
        let err = CredentialsFile::load(Path::new("/nonexistent/creds.ini"), "dns_test")
            .err()
            .unwrap();
        assert!(matches!(err, PluginError::Credentials(_)));
    }

    #[test]
    fn secret_from_option_first() {
        let mut options = RawOptions::new();
        options.insert("token".into(), json!("direct"));
        options.insert("credentials".into(), json!("/nonexistent/creds.ini"));
        let config = PluginConfig::new(synthesize_config(&options, 120, "dns_test"), "dns_test");

        assert_eq!(
            lookup_secret(&config, "token", "DNS01_ADAPTER_TEST_UNSET").unwrap(),
            "direct"
        );
    }

    #[test]
    fn secret_from_credentials_file() {
        let mut file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        writeln!(file, "dns_test_token = from-file").unwrap();

        let mut options = RawOptions::new();
        options.insert(
            "credentials".into(),
            json!(file.path().to_string_lossy().to_string()),
        );
        let config = PluginConfig::new(synthesize_config(&options, 120, "dns_test"), "dns_test");

        assert_eq!(
            lookup_secret(&config, "token", "DNS01_ADAPTER_TEST_UNSET").unwrap(),
            "from-file"
        );
    }

    #[test]
    fn secret_missing_everywhere() {
        let config = PluginConfig::new(synthesize_config(&RawOptions::new(), 120, "dns_test"), "dns_test");
        let err = lookup_secret(&config, "token", "DNS01_ADAPTER_TEST_UNSET").unwrap_err();
        assert!(matches!(err, PluginError::Credentials(_)));
    }
}
