//! 🔍 Lookup: turning a free-text series name into something we can store.
//!
//! 🎬 "Supernatural," says the message. The provider squints, rummages through
//! its filing cabinet, and hands back `/title/tt0460681/`. We peel the id out of
//! that path like a sticker off a laptop, then (optionally) ask for every season
//! and flatten the lot into one long ordered list.
//!
//! 🧠 Knowledge graph:
//! - `ProviderConfig`: where the provider lives and how to knock (static API key).
//! - `ImdbClient`: two sequential GETs, find then get-seasons. No retries.
//! - `extract_series_id`: the `/title/<id>/` peeler. Drift here is fatal, not retryable.
//! - `dto`: the provider's wire shapes, kept private to this module.

mod dto;
mod imdb_client;

use std::sync::LazyLock;

use regex::Regex;

pub use imdb_client::{ImdbClient, ProviderConfig};

use crate::errors::LookupError;

static SERIES_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/title/(\w+)/$").expect("series id pattern is a valid regex"));

/// 🔪 Pull `tt0460681` out of `/title/tt0460681/`.
///
/// Anything else (missing slashes, extra path segments, punctuation in the id)
/// is `LookupError::MalformedIdentifier`.
pub fn extract_series_id(raw: &str) -> Result<String, LookupError> {
    SERIES_ID_PATTERN
        .captures(raw)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
        .ok_or_else(|| LookupError::MalformedIdentifier {
            raw: raw.to_string(),
        })
}
