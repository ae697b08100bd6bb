//! Adapter that lets an exec-style DNS-01 client (`present`, `cleanup`, `timeout`) drive DNS
//! authenticator plugins written for a prefix-namespaced plugin interface.

pub mod challenge;
pub mod cmd;
pub mod dispatch;
pub mod env_config;
pub mod error;
pub mod plugin;
pub mod tracing_config;

pub use cmd::{ChallengeCommand, ChallengeRequest};
pub use dispatch::{dispatch, ChallengeResponse, TimeoutReply};
pub use env_config::EnvConfig;
pub use error::{AdapterError, PluginError};
