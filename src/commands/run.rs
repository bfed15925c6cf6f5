//! Run command handler.

use chrono::Utc;
use trendvault::config::TrendvaultConfig;
use trendvault::llm::CredentialPool;
use trendvault::services::{CategoryOutcome, Pipeline};

/// Runs one cycle over `categories`, or over every configured category.
pub fn cmd_run(
    config: &TrendvaultConfig,
    categories: Vec<String>,
    cycle: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let cycle = cycle.unwrap_or_else(|| CredentialPool::hourly_cycle(Utc::now()));
    let categories = if categories.is_empty() {
        config.categories.order.clone()
    } else {
        categories
    };

    let pipeline = Pipeline::from_config(config, cycle)?;
    let summary = pipeline.run_cycle(&categories);

    for report in &summary.reports {
        match &report.outcome {
            CategoryOutcome::Published {
                stored,
                dropped,
                evicted,
                archived,
                ranked,
            } => println!(
                "{:<12} published: {stored} stored, {dropped} dropped, {evicted} evicted, {archived} archived, {ranked} ranked",
                report.category
            ),
            CategoryOutcome::Skipped { reason } => {
                println!("{:<12} skipped: {reason}", report.category);
            },
            CategoryOutcome::Failed { error } => {
                println!("{:<12} failed: {error}", report.category);
            },
        }
    }
    println!(
        "\nCycle {cycle}: {} succeeded, {} skipped, {} failed",
        summary.succeeded, summary.skipped, summary.failed
    );
    Ok(())
}
