//! 🔌 Backends: where the real I/O happens.
//!
//! 🐇 The transport pours messages in, the stores soak records up, and the
//! announcer shouts "saved!" down the hall. Each concern is a trait, each trait
//! has a `*Backend` enum in front of it, and the enum is all the worker ever
//! sees. It does not know whether it is talking to RabbitMQ or a `Vec`.
//! It is happier that way.
//!
//! 🧠 Knowledge graph:
//! - `Source` / `SourceBackend`: yields one `InboundMessage` at a time (AMQP or in-memory).
//! - `Receipt`: the settle-up half of a message: ack, requeue, reject, or hold.
//! - `DocumentStore` / `DocumentStoreBackend`: upsert-by-`series_id` (MongoDB or in-memory).
//! - `EpisodeStore` / `EpisodeStoreBackend`: batch episode rows (PostgreSQL or in-memory).
//! - `Announcer` / `AnnouncerBackend`: persistent publish of `{"title": ...}`.
//!
//! ⚠️ The in-memory variants are real backends, not mocks: they enforce the same
//! uniqueness rules the databases do, which is the whole point of testing with them.
//!
//! 🦆

pub(crate) mod amqp;
pub(crate) mod announcer;
pub(crate) mod document_store;
pub(crate) mod episode_store;
pub(crate) mod in_mem;
pub(crate) mod mongo;
pub(crate) mod postgres;
pub(crate) mod source;

pub(crate) use announcer::{Announcer, AnnouncerBackend};
pub(crate) use document_store::{DocumentStore, DocumentStoreBackend};
pub(crate) use episode_store::{EpisodeStore, EpisodeStoreBackend};
pub use episode_store::EpisodeWriteMode;
pub(crate) use source::{HeldDelivery, InboundMessage, Receipt, Source, SourceBackend};

// 🎯 Backend configs, re-exported so `app_config` doesn't go spelunking.
pub use amqp::AmqpConfig;
pub use in_mem::{InMemoryEpisodeStoreConfig, InMemoryTransportConfig};
pub use mongo::MongoConfig;
pub use postgres::PostgresConfig;
