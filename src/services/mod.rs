//! Business logic services.
//!
//! Services sit between the provider layer and storage: the ranked store and
//! its eviction planner, the archive copy-out, and the cycle pipeline that
//! drives them.

mod archive;
mod cooldown;
mod engine;
mod enrichment;
mod eviction;
mod pipeline;
mod ranked_store;

pub use archive::ArchiveService;
pub use cooldown::SubjectCooldown;
pub use engine::{Engine, Generated, ProviderTier, TierResolution};
pub use enrichment::{Enricher, Enrichment, ImageFilter, NoopEnricher, enrich_item};
pub use eviction::{EvictionPlan, plan_evictions};
pub use pipeline::{
    CategoryOutcome, CategoryReport, CycleSummary, Pipeline, PipelineSettings, PromptTemplates,
    StorageBackends, open_storage,
};
pub use ranked_store::{BoundedRankedStore, InsertOutcome, MaintenanceReport, StorePolicy};
