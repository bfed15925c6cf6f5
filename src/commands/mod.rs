//! Command handlers.
//!
//! - `run.rs`: one pipeline cycle
//! - `models.rs`: ranked model candidates per provider
//! - `store.rs`: query, maintain, rankings and archive against the configured storage
//! - `config.rs`: resolved configuration display

mod config;
mod models;
mod run;
mod store;

pub use config::cmd_config;
pub use models::cmd_models;
pub use run::cmd_run;
pub use store::{cmd_archive, cmd_maintain, cmd_query, cmd_rankings};
