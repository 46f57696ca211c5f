//! # Previously, on Popcorn...
//!
//! 🎬 No broker. No Mongo. No Postgres. Just a process, some heap, and a list
//! of series names somebody typed into a TOML file at 2am.
//!
//! `in_mem` provides a queue, a document store, an episode store and an
//! announcer that live entirely in RAM. They back the test suite and the
//! broker-less dry run (`[transport.InMemory]`). They are not mocks: the
//! episode store enforces the same `(serie_id, season, episode)` constraint the
//! real table does, and the queue keeps a ledger of every ack, requeue, reject
//! and hold so tests can check the acknowledgment discipline.
//!
//! 🦆
//!
//! ⚠️ Gone the moment you blink. Do not keep your only copy of anything in here.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_channel::{Receiver, Sender};
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backends::{
    Announcer, DocumentStore, EpisodeStore, EpisodeWriteMode, InboundMessage, Receipt, Source,
};
use crate::common::{
    CanonicalSeriesRecord, Episode, EpisodeRow, OutboundAnnouncement, SeriesDocument,
    SeriesRequest, UpsertOutcome,
};

// ============================================================
// 🐇 The queue
// ============================================================

/// 🔧 Dry-run transport: these names are queued at startup, the queue is closed,
/// and the worker exits once it has drained them.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InMemoryTransportConfig {
    #[serde(default)]
    pub names: Vec<String>,
    /// 📣 Keep an in-memory announcement queue too, so the summary can count publishes.
    #[serde(default)]
    pub announce: bool,
}

/// 🔧 RAM-backed episode rows. Same constraint as the real table, same write modes.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InMemoryEpisodeStoreConfig {
    #[serde(default)]
    pub write_mode: EpisodeWriteMode,
}

/// 📦 A message as the in-memory queue holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueuedMessage {
    pub(crate) body: Vec<u8>,
    pub(crate) persistent: bool,
    pub(crate) redelivered: bool,
}

/// 📒 Who got settled how. Append-only, in settlement order.
#[derive(Debug, Default, Clone)]
pub(crate) struct Ledger {
    pub(crate) acked: Vec<Vec<u8>>,
    pub(crate) requeued: Vec<Vec<u8>>,
    pub(crate) rejected: Vec<Vec<u8>>,
    pub(crate) held: Vec<Vec<u8>>,
}

#[derive(Debug)]
struct QueueInner {
    tx: Sender<QueuedMessage>,
    rx: Receiver<QueuedMessage>,
    /// ⏮️ Requeued deliveries, served before anything in the channel.
    redeliveries: Mutex<VecDeque<QueuedMessage>>,
    ledger: Mutex<Ledger>,
}

/// 🐇 An unbounded FIFO with at-least-once manners.
///
/// Clone it freely: every clone is the same queue. Requeued messages go back to
/// the head of the line marked `redelivered`, like a broker puts them back at
/// their original position. Once the queue has been closed they only show up in
/// the ledger.
#[derive(Debug, Clone)]
pub(crate) struct InMemoryQueue {
    inner: Arc<QueueInner>,
}

impl InMemoryQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self {
            inner: Arc::new(QueueInner {
                tx,
                rx,
                redeliveries: Mutex::new(VecDeque::new()),
                ledger: Mutex::new(Ledger::default()),
            }),
        }
    }

    /// 🌱 Queue seeded with one `{"name": ...}` request per name, then closed.
    pub(crate) async fn seeded(names: &[String]) -> Result<Self> {
        let queue = Self::new();
        for name in names {
            let body = serde_json::to_vec(&SeriesRequest { name: name.clone() })
                .context("💀 could not serialize a seed request. it was one string.")?;
            queue.publish(body, true).await?;
        }
        queue.close();
        Ok(queue)
    }

    pub(crate) async fn publish(&self, body: Vec<u8>, persistent: bool) -> Result<()> {
        self.inner
            .tx
            .send(QueuedMessage {
                body,
                persistent,
                redelivered: false,
            })
            .await
            .context("💀 the in-memory queue is closed. nobody is taking new messages.")
    }

    /// 🚪 No new messages. Whatever is already queued can still be consumed.
    pub(crate) fn close(&self) {
        self.inner.tx.close();
    }

    /// 🧹 Takes every message currently waiting, without settling anything.
    pub(crate) async fn drain(&self) -> Vec<QueuedMessage> {
        let mut drained: Vec<QueuedMessage> =
            self.inner.redeliveries.lock().await.drain(..).collect();
        while let Ok(message) = self.inner.rx.try_recv() {
            drained.push(message);
        }
        drained
    }

    pub(crate) async fn ledger(&self) -> Ledger {
        self.inner.ledger.lock().await.clone()
    }

    pub(crate) fn source(&self) -> InMemorySource {
        InMemorySource {
            queue: self.clone(),
        }
    }
}

/// 🚰 Consumes from an [`InMemoryQueue`]. Ends when the queue is closed and empty.
#[derive(Debug)]
pub(crate) struct InMemorySource {
    queue: InMemoryQueue,
}

#[async_trait::async_trait]
impl Source for InMemorySource {
    async fn next_message(&mut self) -> Result<Option<InboundMessage>> {
        let redelivery = self.queue.inner.redeliveries.lock().await.pop_front();
        let next = match redelivery {
            Some(message) => Ok(message),
            None => self.queue.inner.rx.recv().await,
        };
        match next {
            Ok(message) => Ok(Some(InboundMessage {
                body: message.body.clone(),
                redelivered: message.redelivered,
                receipt: Receipt::InMemory(InMemoryReceipt {
                    queue: self.queue.clone(),
                    message,
                }),
            })),
            Err(_) => {
                debug!("🏁 in-memory queue closed and drained");
                Ok(None)
            }
        }
    }
}

/// 🧾 Settles one in-memory delivery into the queue's ledger.
#[derive(Debug)]
pub(crate) struct InMemoryReceipt {
    queue: InMemoryQueue,
    message: QueuedMessage,
}

impl InMemoryReceipt {
    pub(crate) async fn ack(self) -> Result<()> {
        self.queue.inner.ledger.lock().await.acked.push(self.message.body);
        Ok(())
    }

    pub(crate) async fn requeue(self) -> Result<()> {
        let body = self.message.body.clone();
        let redelivery = QueuedMessage {
            redelivered: true,
            ..self.message
        };
        if self.queue.inner.tx.is_closed() {
            debug!("🚪 queue is closed, requeued message stays in the ledger only");
        } else {
            self.queue.inner.redeliveries.lock().await.push_front(redelivery);
        }
        self.queue.inner.ledger.lock().await.requeued.push(body);
        Ok(())
    }

    pub(crate) async fn reject(self) -> Result<()> {
        self.queue.inner.ledger.lock().await.rejected.push(self.message.body);
        Ok(())
    }

    pub(crate) async fn hold(self) {
        self.queue.inner.ledger.lock().await.held.push(self.message.body);
    }
}

/// 📣 Publishes announcements into an [`InMemoryQueue`], persistent flag and all.
#[derive(Debug)]
pub(crate) struct InMemoryAnnouncer {
    queue: InMemoryQueue,
}

impl InMemoryAnnouncer {
    pub(crate) fn new(queue: InMemoryQueue) -> Self {
        Self { queue }
    }
}

#[async_trait::async_trait]
impl Announcer for InMemoryAnnouncer {
    async fn announce(&mut self, announcement: &OutboundAnnouncement) -> Result<()> {
        let body = serde_json::to_vec(announcement)
            .context("💀 could not serialize the announcement")?;
        self.queue.publish(body, true).await
    }
}

// ============================================================
// 🗄️ The document store
// ============================================================

/// 🗄️ A `BTreeMap` keyed by `series_id`. The map *is* the unique index.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryDocumentStore {
    documents: Arc<Mutex<BTreeMap<String, SeriesDocument>>>,
    #[cfg(test)]
    outage: Arc<Mutex<Option<String>>>,
}

impl InMemoryDocumentStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn documents(&self) -> Vec<SeriesDocument> {
        self.documents.lock().await.values().cloned().collect()
    }

    /// 🔌 Every write fails with `reason` until further notice.
    #[cfg(test)]
    pub(crate) async fn simulate_outage(&self, reason: &str) {
        *self.outage.lock().await = Some(reason.to_string());
    }

    #[cfg(test)]
    async fn check_outage(&self) -> Result<()> {
        if let Some(reason) = self.outage.lock().await.as_ref() {
            bail!("💀 simulated document store outage: {reason}");
        }
        Ok(())
    }

    #[cfg(not(test))]
    async fn check_outage(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn ensure_unique_index(&self) -> Result<()> {
        debug!("🗄️ in-memory documents are keyed by series_id already, nothing to create");
        Ok(())
    }

    async fn upsert_series(&self, record: &CanonicalSeriesRecord) -> Result<UpsertOutcome> {
        self.check_outage().await?;
        let now = Utc::now();
        let mut documents = self.documents.lock().await;
        match documents.get_mut(&record.series_id) {
            Some(existing) => {
                existing.title = record.title.clone();
                if record.number_of_episodes.is_some() {
                    existing.number_of_episodes = record.number_of_episodes;
                }
                existing.updated_at = now;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                documents.insert(
                    record.series_id.clone(),
                    SeriesDocument {
                        series_id: record.series_id.clone(),
                        title: record.title.clone(),
                        number_of_episodes: record.number_of_episodes,
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(UpsertOutcome::Inserted)
            }
        }
    }
}

// ============================================================
// 🧾 The episode store
// ============================================================

#[derive(Debug, Default)]
struct EpisodeTable {
    rows: Vec<EpisodeRow>,
    next_id: i64,
}

/// 🧾 A `Vec` of rows with a uniqueness constraint and an identity counter.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryEpisodeStore {
    table: Arc<Mutex<EpisodeTable>>,
    write_mode: EpisodeWriteMode,
}

impl InMemoryEpisodeStore {
    pub(crate) fn new(write_mode: EpisodeWriteMode) -> Self {
        Self {
            table: Arc::default(),
            write_mode,
        }
    }

    /// 📋 Rows for one series, in insertion order.
    pub(crate) async fn rows_for(&self, series_id: &str) -> Vec<EpisodeRow> {
        self.table
            .lock()
            .await
            .rows
            .iter()
            .filter(|row| row.serie_id == series_id)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl EpisodeStore for InMemoryEpisodeStore {
    async fn ensure_table(&self) -> Result<()> {
        debug!("🧾 in-memory episode table exists as soon as it is imagined");
        Ok(())
    }

    async fn insert_episodes(&self, series_id: &str, episodes: &[Episode]) -> Result<u64> {
        let mut table = self.table.lock().await;

        // 🔒 stage everything first so a violation leaves the table untouched
        let mut staged: Vec<EpisodeRow> = match self.write_mode {
            EpisodeWriteMode::Insert => table.rows.clone(),
            EpisodeWriteMode::Replace => table
                .rows
                .iter()
                .filter(|row| row.serie_id != series_id)
                .cloned()
                .collect(),
        };
        let mut taken: HashSet<(String, i32, i32)> = staged
            .iter()
            .map(|row| (row.serie_id.clone(), row.season, row.episode))
            .collect();

        let mut next_id = table.next_id;
        for episode in episodes {
            let key = (series_id.to_string(), episode.season, episode.episode);
            if !taken.insert(key) {
                bail!(
                    "💀 duplicate key value violates unique constraint: (serie_id, season, episode)=({}, {}, {}) already exists",
                    series_id,
                    episode.season,
                    episode.episode
                );
            }
            next_id += 1;
            staged.push(EpisodeRow {
                id: next_id,
                serie_id: series_id.to_string(),
                season: episode.season,
                episode: episode.episode,
            });
        }

        table.rows = staged;
        table.next_id = next_id;
        Ok(episodes.len() as u64)
    }
}
