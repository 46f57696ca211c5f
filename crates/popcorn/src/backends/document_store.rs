use anyhow::Result;
use async_trait::async_trait;

use crate::backends::{in_mem, mongo};
use crate::common::{CanonicalSeriesRecord, UpsertOutcome};

/// 🗄️ Keeps one document per `series_id`, no matter how many times we're asked.
///
/// # Contract 📜
/// - `ensure_unique_index` is check-then-create and safe to call on every startup.
/// - `upsert_series` matches on `series_id`. Match: overwrite title (and episode
///   count when known), bump `updatedAt`. No match: insert with `createdAt` and
///   `updatedAt` both set to now. `createdAt` is never touched afterwards.
/// - Errors come back as-is. No partial-write recovery.
#[async_trait]
pub(crate) trait DocumentStore: std::fmt::Debug {
    async fn ensure_unique_index(&self) -> Result<()>;
    async fn upsert_series(&self, record: &CanonicalSeriesRecord) -> Result<UpsertOutcome>;
}

#[derive(Debug)]
pub(crate) enum DocumentStoreBackend {
    InMemory(in_mem::InMemoryDocumentStore),
    Mongo(mongo::MongoDocumentStore),
}

#[async_trait]
impl DocumentStore for DocumentStoreBackend {
    async fn ensure_unique_index(&self) -> Result<()> {
        match self {
            DocumentStoreBackend::InMemory(store) => store.ensure_unique_index().await,
            DocumentStoreBackend::Mongo(store) => store.ensure_unique_index().await,
        }
    }

    async fn upsert_series(&self, record: &CanonicalSeriesRecord) -> Result<UpsertOutcome> {
        match self {
            DocumentStoreBackend::InMemory(store) => store.upsert_series(record).await,
            DocumentStoreBackend::Mongo(store) => store.upsert_series(record).await,
        }
    }
}
