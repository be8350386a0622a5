use anyhow::{Context, Result};
use naive_mail::{config::Config, smtp::server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;
    tracing::info!(
        "Storing messages in {:?} and attachments in {:?}",
        config.message_dir,
        config.attachment_dir
    );

    server::listen(config).await
}
