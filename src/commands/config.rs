//! Config command handler.

use trendvault::config::{StoreBackend, TrendvaultConfig};
use trendvault::llm::{BackoffPolicy, CredentialPool};

/// Prints the resolved configuration. Credentials are shown only as counts.
pub fn cmd_config(config: &TrendvaultConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Current Configuration");
    println!("=====================");
    println!();

    println!("Store:");
    println!("  Capacity: {}", config.store.capacity);
    println!("  Freshness: {}h", config.store.freshness_hours);
    println!("  Min Score: {:.2}", config.store.min_score);
    println!("  Archive Threshold: {:.2}", config.store.archive_threshold);
    match config.store.backend {
        StoreBackend::Memory => println!("  Backend: memory"),
        StoreBackend::Sqlite => {
            println!("  Backend: sqlite ({})", config.store.db_path.display());
        },
    }
    println!();

    let policy = BackoffPolicy::from_config(&config.cascade).with_env_overrides();
    println!("Cascade:");
    println!("  Rate Limit Policy: {}", policy.rate_limit_policy);
    println!("  Transient Retries: {}", policy.max_transient_retries);
    println!(
        "  Backoff: {}ms base, {}ms cap, {:.0}% jitter",
        policy.base_delay_ms,
        policy.max_delay_ms,
        policy.jitter_ratio * 100.0
    );
    println!("  Deadline: {}ms", policy.deadline_ms);
    println!("  Attempt Timeout: {}ms", policy.attempt_timeout_ms);
    println!("  Discovery TTL: {}s", config.catalog.discovery_ttl_secs);
    println!();

    println!("Providers (tier order):");
    for provider in &config.providers {
        let keys = CredentialPool::from_env_vars(&provider.api_key_env).len();
        println!(
            "  - {} ({:?}) {}{}",
            provider.name,
            provider.kind,
            provider.base_url,
            if provider.enabled { "" } else { " [disabled]" }
        );
        println!(
            "      keys: {keys} of {} set, static models: {}",
            provider.api_key_env.len(),
            provider.models.join(", ")
        );
    }
    println!();

    println!("Categories: {}", config.categories.order.join(", "));
    println!(
        "Pipeline: pause {}ms, cooldown {}h, temperature {:.2}",
        config.pipeline.category_pause_ms,
        config.pipeline.cooldown_hours,
        config.pipeline.temperature
    );
    println!(
        "Logging: {:?}{}",
        config.logging.format,
        config
            .logging
            .file
            .as_ref()
            .map_or_else(String::new, |p| format!(" -> {}", p.display()))
    );
    println!(
        "Metrics: {}",
        match (config.metrics.enabled, config.metrics.port) {
            (false, _) => "disabled".to_string(),
            (true, Some(port)) => format!("enabled, listening on :{port}"),
            (true, None) => "enabled".to_string(),
        }
    );
    Ok(())
}
