//! 📦 Common data structures: the cast list of popcorn.
//!
//! 🎬 A message walks in carrying one name. By the end of the episode it has
//! become a record, a document, a few hundred rows and (maybe) an announcement.
//! Every one of those shapes lives here, so nobody has to go spelunking for
//! them at 3am while the queue depth climbs.
//!
//! 🧠 Knowledge graph:
//! - `SeriesRequest`: the inbound message body. Born on receipt, gone after processing.
//! - `CanonicalSeriesRecord`: what the lookup client resolves a name into.
//! - `SeriesDocument`: what the document store keeps, one per `series_id`.
//! - `EpisodeRow`: what the episode store keeps, one per (series, season, episode).
//! - `OutboundAnnouncement`: the "it's saved" postcard for the downstream queue.
//!
//! 🦆

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 📨 The inbound message body: `{"name": "<series name>"}`.
///
/// That's it. One field. The entire pipeline runs on a single string
/// and a dream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SeriesRequest {
    pub name: String,
}

/// 🎞️ One episode coordinate. Season first, episode second, just like the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Episode {
    pub season: i32,
    pub episode: i32,
}

/// 🎯 The resolved series, normalized away from whatever the provider felt like returning.
///
/// `episodes` keeps the provider's order (season then episode, as delivered).
/// It is empty when episode detail fetching is switched off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalSeriesRecord {
    pub series_id: String,
    pub title: String,
    /// 📏 Provider's count when it bothers to send one, else the length of `episodes`.
    pub number_of_episodes: Option<u32>,
    pub episodes: Vec<Episode>,
}

impl CanonicalSeriesRecord {
    /// ✅ True when there is episode-level data worth sending to the relational sink.
    pub fn has_episodes(&self) -> bool {
        !self.episodes.is_empty()
    }
}

/// 🗄️ The stored shape of a series, one per `series_id`.
///
/// `created_at` is written once, on the very first upsert, and never again.
/// `updated_at` moves forward on every write. If you see them equal on a
/// series that was processed twice, something skipped the update path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesDocument {
    pub series_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_episodes: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 🧾 One relational row. `id` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRow {
    pub id: i64,
    pub serie_id: String,
    pub season: i32,
    pub episode: i32,
}

/// 📣 What goes out on the announcement queue after a successful persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundAnnouncement {
    pub title: String,
}

impl OutboundAnnouncement {
    pub fn for_record(record: &CanonicalSeriesRecord) -> Self {
        Self {
            title: record.title.clone(),
        }
    }
}

/// 🔄 What the document store did with an upsert. Either way, the document is there now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}
