use std::io::{self, Stderr};

use eyre::Result;
use tracing::subscriber::set_global_default;
use tracing_error::ErrorLayer;
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};
use tracing_tree::HierarchicalLayer;

/// Used when `LOG` is unset or unparseable. Dependencies only get to say something when it
/// is a warning.
const DEFAULT_DIRECTIVES: &str = "warn,dns01_plugin_adapter=info";

/// `log` records from the HTTP stack under reqwest. Their per-connection chatter is never
/// useful for a single challenge request, even with `LOG=debug`.
const QUIET_LOG_CRATES: [&str; 3] = ["hyper", "want", "mio"];

fn env_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// The adapter's stdout is the hook protocol (the `timeout` reply), so the tree goes to stderr.
fn stderr_tree() -> HierarchicalLayer<fn() -> Stderr> {
    HierarchicalLayer::new(2)
        .with_writer(io::stderr as fn() -> Stderr)
        .with_targets(true)
        .with_bracketed_fields(true)
}

pub fn init_tracing() -> Result<()> {
    LogTracer::builder()
        .ignore_all(QUIET_LOG_CRATES)
        .with_max_level(log::LevelFilter::Debug)
        .init()?;

    let directives = std::env::var("LOG").ok();
    let subscriber = Registry::default()
        .with(env_filter(directives.as_deref()))
        .with(stderr_tree())
        .with(ErrorLayer::default());
    set_global_default(subscriber)?;
    Ok(())
}
