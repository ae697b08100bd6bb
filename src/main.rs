use dns01_plugin_adapter::{cmd, tracing_config};
use eyre::Result;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_config::init_tracing()?;

    cmd::run().await?;
    Ok(())
}
