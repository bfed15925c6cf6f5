//! Models command handler.

use std::sync::Arc;
use trendvault::clock::{SystemClock, ThreadSleeper};
use trendvault::config::TrendvaultConfig;
use trendvault::llm::CatalogSource;
use trendvault::services::Engine;

/// Prints each provider's ranked candidates and where they came from.
pub fn cmd_models(
    config: &TrendvaultConfig,
    provider: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Engine::from_config(config, 0, Arc::new(SystemClock), Arc::new(ThreadSleeper))?;

    let mut shown = 0;
    for (tier, resolution) in engine.resolve().into_iter().enumerate() {
        if provider
            .as_deref()
            .is_some_and(|name| name != resolution.provider)
        {
            continue;
        }
        shown += 1;
        let source = match resolution.resolved.source {
            CatalogSource::Discovered => "discovered",
            CatalogSource::Cached => "cached",
            CatalogSource::Static => "static fallback (discovery unavailable)",
        };
        println!("Tier {}: {} [{source}]", tier + 1, resolution.provider);
        for (rank, model) in resolution.resolved.models.iter().enumerate() {
            println!("  {:>2}. {:<48} {:>8.1}", rank + 1, model.id, model.preference);
        }
        println!();
    }

    if shown == 0
        && let Some(name) = provider
    {
        return Err(format!("no enabled provider named '{name}'").into());
    }
    Ok(())
}
