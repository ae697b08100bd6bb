use reqwest::StatusCode;
use thiserror::Error;

/// Everything that can end an invocation early.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("missing required environment variable {0}")]
    MissingConfig(&'static str),

    #[error("malformed configuration: {0}")]
    MalformedConfig(String),

    #[error("no authenticator plugin named '{0}' is registered")]
    PluginNotFound(String),

    #[error("{count} authenticator plugins are registered as '{name}'")]
    AmbiguousPlugin { name: String, count: usize },

    #[error("invalid ACME challenge FQDN '{0}'")]
    InvalidFqdn(String),

    #[error("plugin '{plugin}' failed")]
    PluginExecution {
        plugin: String,
        #[source]
        source: PluginError,
    },
}

/// Errors raised by an authenticator plugin's own operations.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("credentials: {0}")]
    Credentials(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error("no DNS zone found for {0}")]
    ZoneNotFound(String),

    #[error("failed to {action}: {status}: {body}")]
    Api {
        action: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
