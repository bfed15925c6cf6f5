//! Store command handlers.

use std::sync::Arc;
use trendvault::clock::SystemClock;
use trendvault::config::TrendvaultConfig;
use trendvault::models::Score;
use trendvault::services::{ArchiveService, BoundedRankedStore, StorePolicy, open_storage};
use trendvault::storage::RankingStore;

fn open_store(
    config: &TrendvaultConfig,
) -> Result<(BoundedRankedStore, ArchiveService), Box<dyn std::error::Error>> {
    let storage = open_storage(config)?;
    let store = BoundedRankedStore::new(
        StorePolicy::from_config(&config.store)?,
        storage.repository,
        Arc::new(SystemClock),
    );
    let archive = ArchiveService::new(storage.archive, Score::new(config.store.archive_threshold)?);
    Ok((store, archive))
}

/// Lists live items in `category`, highest score first.
pub fn cmd_query(
    config: &TrendvaultConfig,
    category: &str,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let (store, _) = open_store(config)?;
    let items = store.query(category)?;
    if items.is_empty() {
        println!("No live items in {category}");
        return Ok(());
    }

    println!("{category}: {} live items", items.len());
    for (rank, item) in items.iter().take(limit).enumerate() {
        println!(
            "{:>3}. [{}] {} ({})",
            rank + 1,
            item.score,
            item.title,
            item.observed_at().format("%Y-%m-%d %H:%M")
        );
        println!("     {}", item.link);
        if let Some(image) = &item.image_url {
            println!("     image: {image}");
        }
    }
    Ok(())
}

/// Runs the eviction pass for `category`.
pub fn cmd_maintain(
    config: &TrendvaultConfig,
    category: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let (store, _) = open_store(config)?;
    let report = store.maintain(category)?;
    println!(
        "{category}: evicted {} stale, {} low-score; {} live (capacity {})",
        report.plan.stale.len(),
        report.plan.low_score.len(),
        report.size,
        store.policy().capacity
    );
    Ok(())
}

/// Prints the latest trending ranking of `category`.
pub fn cmd_rankings(
    config: &TrendvaultConfig,
    category: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let storage = open_storage(config)?;
    let Some(snapshot) = storage.rankings.select_rankings(category)? else {
        println!("No ranking stored for {category}");
        return Ok(());
    };

    println!(
        "{category}: top {} as of {}",
        snapshot.len(),
        snapshot.updated_at.format("%Y-%m-%d %H:%M")
    );
    for entry in &snapshot.entries {
        let score = entry.score.map(|s| format!(" [{s}]")).unwrap_or_default();
        println!("{:>3}. {}{score}", entry.rank, entry.title);
        if let Some(keyword) = &entry.keyword {
            println!("     keyword: {keyword}");
        }
        if let Some(note) = &entry.note {
            println!("     {note}");
        }
    }
    Ok(())
}

/// Sweeps every live item at or above the threshold into the archive.
pub fn cmd_archive(config: &TrendvaultConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (store, archive) = open_store(config)?;
    let written = archive.sweep(store.repository().as_ref())?;
    println!(
        "Archived {written} items at or above {}; archive holds {}",
        archive.threshold(),
        archive.sink().count()?
    );
    Ok(())
}
