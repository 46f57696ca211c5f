//! 🍿 popcorn: a queue-driven TV series enrichment worker.
//!
//! A message says `{"name": "Supernatural"}`. The worker asks the provider who
//! that is, upserts one document per series, writes one row per episode,
//! optionally tells a downstream queue about it, and only then acknowledges
//! the message. One message at a time. No retries of its own: if anything
//! fails, the message is not acknowledged and the broker brings it back.

pub mod app_config;
mod backends;
mod common;
pub mod errors;
pub mod lookup;
mod report;
mod supervisors;
#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};

pub use app_config::AppConfig;
pub use backends::{
    AmqpConfig, EpisodeWriteMode, InMemoryEpisodeStoreConfig, InMemoryTransportConfig,
    MongoConfig, PostgresConfig,
};
pub use common::{CanonicalSeriesRecord, Episode, OutboundAnnouncement, SeriesRequest};
pub use report::WorkerReport;

use crate::supervisors::Supervisor;

/// 🚀 Connect everything, consume until the source closes or Ctrl-C, report back.
pub async fn run(app_config: AppConfig) -> Result<WorkerReport> {
    Supervisor::new(app_config)
        .run()
        .await
        .context("💀 the enrichment worker did not finish cleanly")
}
