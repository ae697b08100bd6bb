use std::ffi::OsString;

use clap::{Parser, ValueEnum};
use eyre::Result;
use strum::Display;
use tracing::{event, Level};

use crate::{
    dispatch::{dispatch, ChallengeResponse},
    env_config::EnvConfig,
    error::AdapterError,
    plugin::Registry,
};

#[derive(Parser, Debug)]
#[command(about, version)]
struct Args {
    /// ACME challenge command type
    #[arg(value_enum)]
    command: ChallengeCommand,
    /// Domain name (including subdomain) to use for the ACME challenge
    #[arg(allow_hyphen_values = true)]
    fqdn: Option<String>,
    /// TXT record challenge response value
    #[arg(allow_hyphen_values = true)]
    record: Option<String>,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, ValueEnum)]
#[strum(serialize_all = "lowercase")]
pub enum ChallengeCommand {
    /// Create the challenge TXT record
    Present,
    /// Remove the challenge TXT record
    Cleanup,
    /// Print how long to wait for propagation and how often to poll
    Timeout,
}

/// One invocation's worth of arguments. Whether `fqdn` and `record` are required depends on
/// the command and is checked by the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeRequest {
    pub command: ChallengeCommand,
    pub fqdn: Option<String>,
    pub record: Option<String>,
}

impl ChallengeRequest {
    pub fn new(command: ChallengeCommand, fqdn: Option<&str>, record: Option<&str>) -> Self {
        ChallengeRequest {
            command,
            fqdn: fqdn.map(str::to_string),
            record: record.map(str::to_string),
        }
    }

    /// Parses a full argument list, program name first.
    pub fn try_parse_from<I, T>(args: I) -> Result<ChallengeRequest, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = Args::try_parse_from(args)?;
        Ok(ChallengeRequest {
            command: args.command,
            fqdn: args.fqdn,
            record: args.record,
        })
    }

    /// Like [`ChallengeRequest::try_parse_from`], but with parse failures reported as
    /// [`AdapterError::InvalidArguments`]. `--help` and `--version` print their output and
    /// return `Ok(None)`.
    pub fn parse_args<I, T>(args: I) -> Result<Option<ChallengeRequest>, AdapterError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match Self::try_parse_from(args) {
            Ok(request) => Ok(Some(request)),
            Err(e) if !e.use_stderr() => {
                // Same as clap's own `Error::exit`, a failed write is not an argument error.
                let _ = e.print();
                Ok(None)
            }
            Err(e) => Err(AdapterError::InvalidArguments(e.to_string())),
        }
    }
}

pub async fn run() -> Result<()> {
    let Some(request) = ChallengeRequest::parse_args(std::env::args_os())? else {
        return Ok(());
    };

    let env = EnvConfig::from_env()?;
    let registry = Registry::builtin();

    event!(
        Level::DEBUG,
        command = %request.command,
        authenticator = %env.authenticator_type,
        "Dispatching challenge command"
    );

    if let ChallengeResponse::Timeout(reply) = dispatch(&request, &env, &registry).await? {
        println!("{}", reply.to_json()?);
    }

    Ok(())
}
