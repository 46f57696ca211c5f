//! 🍃 MongoDB document store: one document per `seriesId`, upserted, never duplicated.
//!
//! Document shape: `{ seriesId, title, numberOfEpisodes?, createdAt, updatedAt }`.
//! `createdAt` rides in `$setOnInsert`, so only the very first write ever sets it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use mongodb::bson::{DateTime, Document, doc};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use serde::Deserialize;
use tracing::{debug, info};

use crate::backends::DocumentStore;
use crate::common::{CanonicalSeriesRecord, UpsertOutcome};

const SERIES_ID_INDEX: &str = "seriesId_1";

/// 🔧 Where the documents go.
#[derive(Debug, Deserialize, Clone)]
pub struct MongoConfig {
    /// 📡 `mongodb://host:27017/db`. The path picks the database unless `database` is set.
    pub url: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_collection() -> String {
    "tvseries".to_string()
}

#[derive(Debug)]
pub(crate) struct MongoDocumentStore {
    database: Database,
    collection: Collection<Document>,
    collection_name: String,
}

impl MongoDocumentStore {
    pub(crate) async fn connect(config: MongoConfig) -> Result<Self> {
        let client = Client::with_uri_str(&config.url)
            .await
            .context("💀 MongoDB connection string did not parse or the driver would not start")?;
        let database = match &config.database {
            Some(name) => client.database(name),
            None => client.default_database().context(
                "💀 no database in the MongoDB URL and no `database` in config. pick one, any one.",
            )?,
        };
        let collection = database.collection::<Document>(&config.collection);
        info!(
            "🍃 document store ready: {}.{}",
            database.name(),
            config.collection
        );
        Ok(Self {
            database,
            collection,
            collection_name: config.collection,
        })
    }
}

/// 📝 The update half of the upsert. `createdAt` only ever lives under
/// `$setOnInsert`; an unknown episode count is left out so it can't erase a known one.
fn upsert_update(record: &CanonicalSeriesRecord, now: DateTime) -> Document {
    let mut set = doc! {
        "title": record.title.as_str(),
        "updatedAt": now,
    };
    if let Some(count) = record.number_of_episodes {
        set.insert("numberOfEpisodes", i64::from(count));
    }
    doc! {
        "$set": set,
        "$setOnInsert": { "createdAt": now },
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn ensure_unique_index(&self) -> Result<()> {
        let collections = self
            .database
            .list_collection_names()
            .await
            .context("💀 could not list collections to look for our index")?;

        // 🔍 listIndexes on a missing collection is an error, so only ask when it exists
        if collections.contains(&self.collection_name) {
            let indexes = self
                .collection
                .list_index_names()
                .await
                .context("💀 could not list indexes on the series collection")?;
            if indexes.iter().any(|name| name == SERIES_ID_INDEX) {
                debug!("✅ unique index '{}' already there", SERIES_ID_INDEX);
                return Ok(());
            }
        }

        let index = IndexModel::builder()
            .keys(doc! { "seriesId": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name(SERIES_ID_INDEX.to_string())
                    .build(),
            )
            .build();
        self.collection
            .create_index(index)
            .await
            .context("💀 could not create the unique seriesId index")?;
        info!("🏗️ created unique index '{}'", SERIES_ID_INDEX);
        Ok(())
    }

    async fn upsert_series(&self, record: &CanonicalSeriesRecord) -> Result<UpsertOutcome> {
        let update = upsert_update(record, DateTime::now());

        let result = self
            .collection
            .update_one(doc! { "seriesId": record.series_id.as_str() }, update)
            .upsert(true)
            .await
            .with_context(|| format!("💀 upsert of {} failed", record.series_id))?;

        Ok(if result.upserted_id.is_some() {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }
}
