use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::backends::{in_mem, postgres};
use crate::common::Episode;

/// ✍️ What to do when a series' rows might already be there.
///
/// - `Insert`: plain batch insert. Reprocessing the same series trips the
///   `(serie_id, season, episode)` constraint and the whole batch fails.
///   The message goes unacknowledged and keeps failing until someone cleans up.
/// - `Replace`: delete the series' rows, then insert, in one transaction.
///   Reprocessing becomes idempotent at the cost of rewriting every row.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeWriteMode {
    #[default]
    Insert,
    Replace,
}

/// 🧾 Per-episode rows, unique on `(serie_id, season, episode)`.
///
/// # Contract 📜
/// - `ensure_table` creates the table and its uniqueness constraint when absent.
/// - `insert_episodes` writes the whole batch or nothing. Returns rows written.
#[async_trait]
pub(crate) trait EpisodeStore: std::fmt::Debug {
    async fn ensure_table(&self) -> Result<()>;
    async fn insert_episodes(&self, series_id: &str, episodes: &[Episode]) -> Result<u64>;
}

#[derive(Debug)]
pub(crate) enum EpisodeStoreBackend {
    InMemory(in_mem::InMemoryEpisodeStore),
    Postgres(postgres::PostgresEpisodeStore),
}

#[async_trait]
impl EpisodeStore for EpisodeStoreBackend {
    async fn ensure_table(&self) -> Result<()> {
        match self {
            EpisodeStoreBackend::InMemory(store) => store.ensure_table().await,
            EpisodeStoreBackend::Postgres(store) => store.ensure_table().await,
        }
    }

    async fn insert_episodes(&self, series_id: &str, episodes: &[Episode]) -> Result<u64> {
        match self {
            EpisodeStoreBackend::InMemory(store) => store.insert_episodes(series_id, episodes).await,
            EpisodeStoreBackend::Postgres(store) => store.insert_episodes(series_id, episodes).await,
        }
    }
}
