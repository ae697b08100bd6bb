use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use tracing::{event, Level};

use crate::{
    challenge::{extract_domain, validation_domain},
    cmd::{ChallengeCommand, ChallengeRequest},
    env_config::EnvConfig,
    error::{AdapterError, PluginError},
    plugin::{synthesize_config, value_as_u64, PluginIdentity, Registry},
};

/// Reply to the `timeout` command, in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TimeoutReply {
    pub timeout: u64,
    pub interval: u64,
}

impl TimeoutReply {
    /// Single-line JSON with a space after each `:` and `,`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut out = Vec::new();
        self.serialize(&mut Serializer::with_formatter(&mut out, SpacedFormatter))?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

/// Compact JSON, except `{"a": 1, "b": 2}` instead of `{"a":1,"b":2}`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengeResponse {
    /// `present` or `cleanup` finished; nothing to print.
    Done,
    Timeout(TimeoutReply),
}

/// What `present` and `cleanup` do to the TXT record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RecordChange {
    Create,
    Remove,
}

impl RecordChange {
    /// `None` for `timeout`, which never touches DNS.
    fn for_command(command: ChallengeCommand) -> Option<RecordChange> {
        match command {
            ChallengeCommand::Present => Some(RecordChange::Create),
            ChallengeCommand::Cleanup => Some(RecordChange::Remove),
            ChallengeCommand::Timeout => None,
        }
    }
}

fn require<'a>(
    value: &'a Option<String>,
    argument: &str,
    command: ChallengeCommand,
) -> Result<&'a str, AdapterError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AdapterError::InvalidArguments(format!(
                "argument '{argument}' is required for command '{command}'"
            ))
        })
}

/// Runs one challenge command against the plugin named in `env`.
pub async fn dispatch(
    request: &ChallengeRequest,
    env: &EnvConfig,
    registry: &Registry,
) -> Result<ChallengeResponse, AdapterError> {
    let targets = match RecordChange::for_command(request.command) {
        Some(change) => Some((
            change,
            require(&request.fqdn, "fqdn", request.command)?,
            require(&request.record, "record", request.command)?,
        )),
        None => None,
    };

    let identity = PluginIdentity::new(&env.authenticator_type);
    let entry = registry.resolve(&identity.registry_name, env.duplicate_policy)?;
    let plugin_failed = |source: PluginError| AdapterError::PluginExecution {
        plugin: identity.type_name.clone(),
        source,
    };

    let config = synthesize_config(
        &env.options,
        env.propagation_seconds,
        &identity.config_prefix,
    );
    let mut plugin = entry
        .instantiate(config, &identity.config_prefix)
        .map_err(plugin_failed)?;

    let Some((change, fqdn, record)) = targets else {
        let timeout = match plugin.conf("propagation-seconds") {
            Some(value) => value_as_u64(value).ok_or_else(|| {
                plugin_failed(PluginError::Config(format!(
                    "propagation-seconds must be a non-negative integer, got {value}"
                )))
            })?,
            None => env.propagation_seconds,
        };

        return Ok(ChallengeResponse::Timeout(TimeoutReply {
            timeout,
            interval: env.polling_interval,
        }));
    };

    let domain = extract_domain(fqdn)?;
    let validation_domain = validation_domain(fqdn);

    plugin.setup_credentials().await.map_err(plugin_failed)?;

    match change {
        RecordChange::Create => {
            event!(Level::INFO, "Creating TXT record {validation_domain} for {domain}");
            plugin
                .perform(domain, validation_domain, record)
                .await
                .map_err(plugin_failed)?;
        }
        RecordChange::Remove => {
            event!(Level::INFO, "Removing TXT record {validation_domain} for {domain}");
            plugin
                .cleanup(domain, validation_domain, record)
                .await
                .map_err(plugin_failed)?;
        }
    }

    Ok(ChallengeResponse::Done)
}
