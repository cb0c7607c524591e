use std::sync::Arc;

use issue_bot::config::{FileConfigProvider, RunSettings};
use issue_bot::pipeline::Pipeline;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let settings = RunSettings::from_env()?;
    let provider = FileConfigProvider::from_env();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config_dir = %provider.dir().display(),
        "Issue bot starting"
    );

    let pipeline = Pipeline::with_defaults(Arc::new(provider))?;
    let report = pipeline.run().await;

    if settings.strict_exit && !report.is_clean() {
        std::process::exit(1);
    }

    Ok(())
}
