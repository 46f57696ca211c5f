//! 🔧 App Configuration: env vars, more env vars, and a TOML file, in that order.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the `.env`. Nothing." -- every developer at 3am 🦆
//!
//! 🏗️ Three layers, merged by Figment, later layers win:
//! 1. The legacy connection-string variables (`RABBITMQ_CONN_STRING`,
//!    `MONGODB_CONN_STRING`, `POSTGRES_CONN_STRING`, `IMDB8_API_KEY`), so an
//!    existing deployment's environment keeps working untouched.
//! 2. `POPCORN_*` variables, nested with `__`
//!    (`POPCORN_WORKER__ON_FAILURE=hold`).
//! 3. An optional TOML file.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::{
    AmqpConfig, InMemoryEpisodeStoreConfig, InMemoryTransportConfig, MongoConfig, PostgresConfig,
};
use crate::lookup::ProviderConfig;

/// 🗝️ Legacy env var → config key. Figment lowercases keys, hence the lowercase variants.
const LEGACY_ENV_KEYS: [(&str, &str); 4] = [
    ("RABBITMQ_CONN_STRING", "transport.amqp.url"),
    ("MONGODB_CONN_STRING", "document_store.mongo.url"),
    ("POSTGRES_CONN_STRING", "episode_store.postgres.url"),
    ("IMDB8_API_KEY", "provider.api_key"),
];

/// 📦 Everything the worker needs to know before it takes its first message.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub transport: TransportConfig,
    pub provider: ProviderConfig,
    pub document_store: DocumentStoreConfig,
    /// 🧾 None = no relational writes at all. Records are still upserted and announced.
    #[serde(default)]
    pub episode_store: Option<EpisodeStoreConfig>,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// 🐇 Where messages come from (and where announcements go).
#[derive(Debug, Deserialize, Clone)]
pub enum TransportConfig {
    #[serde(alias = "amqp")]
    Amqp(AmqpConfig),
    /// 🧪 Broker-less dry run over a fixed list of names.
    #[serde(alias = "in_memory", alias = "inmemory")]
    InMemory(InMemoryTransportConfig),
}

#[derive(Debug, Deserialize, Clone)]
pub enum DocumentStoreConfig {
    #[serde(alias = "mongo")]
    Mongo(MongoConfig),
    #[serde(alias = "in_memory", alias = "inmemory")]
    InMemory,
}

#[derive(Debug, Deserialize, Clone)]
pub enum EpisodeStoreConfig {
    #[serde(alias = "postgres")]
    Postgres(PostgresConfig),
    #[serde(alias = "in_memory", alias = "inmemory")]
    InMemory(InMemoryEpisodeStoreConfig),
}

/// 💀 What to do with a message whose processing failed (malformed bodies excepted, those are rejected).
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// 🔁 nack with requeue. The broker puts it back at the head of the queue and
    /// hands it out again right away, so with prefetch 1 a failure that is not
    /// transient (`NotFound`, a renamed provider path) spins on the same message,
    /// one paid lookup per lap, and nothing behind it moves. Only for outages
    /// that are expected to clear on their own.
    Requeue,
    /// ⏸️ Leave it unsettled. With prefetch 1 the consumer stalls until the channel closes.
    #[default]
    Hold,
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
pub struct WorkerConfig {
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

fn legacy_key(raw: &str) -> Option<&'static str> {
    LEGACY_ENV_KEYS
        .iter()
        .find(|(env_name, _)| env_name.eq_ignore_ascii_case(raw))
        .map(|(_, config_key)| *config_key)
}

fn legacy_env() -> Env {
    let names: Vec<&str> = LEGACY_ENV_KEYS.iter().map(|(env_name, _)| *env_name).collect();
    Env::raw().only(&names).map(|key| {
        legacy_key(key.as_str())
            .map(Into::into)
            .unwrap_or_else(|| key.as_str().to_string().into())
    })
}

/// 🚀 Load the config: legacy env, then `POPCORN_*` env, then the TOML file if one was given.
///
/// 📐 No file means env only. No "config.toml" fallback, no surprises.
///
/// 💀 Returns an error if the merged result doesn't deserialize, with a message that
/// says which layers were involved.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new()
        .merge(legacy_env())
        .merge(Env::prefixed("POPCORN_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables \
             (POPCORN_*, RABBITMQ_CONN_STRING and friends). The file exists in our hearts, \
             but apparently not on disk. Or it has a typo. Probably a typo.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables \
                 (POPCORN_*, RABBITMQ_CONN_STRING and friends). No file was provided, \
                 so this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}
