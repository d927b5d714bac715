use std::sync::Arc;

use pulpo_bot::clock::BerlinClock;
use pulpo_bot::config::AppConfig;
use pulpo_bot::logger::init_tracing;
use pulpo_bot::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("Starting pulpo-bot...");

    let cfg = AppConfig::from_env();
    let orchestrator = Orchestrator::new(cfg, Arc::new(BerlinClock));

    let summary = orchestrator.run().await?;
    println!("{}", serde_json::to_string(&summary)?);

    Ok(())
}
