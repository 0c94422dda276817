use anyhow::{Context, Result};
use dotenv::dotenv;
use enrichment_service_rust::{build_pipeline, open_input, EnrichmentConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting enrichment_service_rust...");

    let config = EnrichmentConfig::from_env()?;
    config.log_config();

    let mut pipeline = build_pipeline(&config).await?;
    let input = open_input(&config.input_path)?;

    let report = pipeline
        .run(input)
        .await
        .with_context(|| format!("Enrichment failed in state {:?}", pipeline.state()))?;

    if report.delivery_failed > 0 {
        warn!(
            "{} records were neither delivered nor dead-lettered",
            report.delivery_failed
        );
    }
    info!("Enrichment complete: {}", report);
    Ok(())
}
