//! 💀 The named ways a message can fail to reach `ACKNOWLEDGED`.
//!
//! Everything in here ends the same way: the inbound message is not acknowledged
//! and the transport gets to decide when we see it again. The variants only
//! differ in what we write in the logs while we wait.

use std::fmt;

use thiserror::Error;

/// 📦 A boxed, thread-safe error. Where anyhow chains go to be carried across a typed seam.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 🔍 Failures from the external lookup client.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The provider's find endpoint came back empty-handed.
    #[error("💀 the provider has never heard of '{name}'. no candidates, no ranking, no dice.")]
    NotFound { name: String },

    /// The provider's identifier didn't look like `/title/<word chars>/`. Contract drift.
    #[error("💀 provider identifier '{raw}' does not look like '/title/<id>/'. the provider changed the script without telling us.")]
    MalformedIdentifier { raw: String },

    /// Network trouble, timeouts, or a non-2xx status.
    #[error("💀 the provider call to {endpoint} failed in transit")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// A 2xx response whose body we could not make sense of.
    #[error("💀 the provider answered {endpoint} with a body we can't decode")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// 🗄️ Which persistence step blew up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Document,
    Episode,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Document => f.write_str("document"),
            StoreKind::Episode => f.write_str("episode"),
        }
    }
}

/// 🧨 Everything the enrichment worker can trip over while handling one message.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The body was not `{"name": "..."}`. Rejected without requeue.
    #[error("💀 inbound message is not a series request")]
    MalformedMessage(#[source] serde_json::Error),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("💀 the {store} store refused the write")]
    StoreWrite {
        store: StoreKind,
        #[source]
        source: BoxError,
    },

    /// Persistence already succeeded when this happens. Redelivery will re-persist
    /// (harmless) and may announce twice (downstream copes).
    #[error("💀 the announcement never made it to the downstream queue")]
    Publish(#[source] BoxError),
}

impl PipelineError {
    pub(crate) fn store_write(store: StoreKind, source: anyhow::Error) -> Self {
        PipelineError::StoreWrite {
            store,
            source: source.into(),
        }
    }

    pub(crate) fn publish(source: anyhow::Error) -> Self {
        PipelineError::Publish(source.into())
    }

    /// 🪦 Malformed bodies never get better on redelivery, so they are not requeued.
    pub fn is_poison(&self) -> bool {
        matches!(self, PipelineError::MalformedMessage(_))
    }
}
