//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where messages arrive one at a time..."
//! 🎬 "One supervisor dared to wire them all up."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor: connects to everything, makes sure the index, the table
//! and the queues exist, hands the worker its span and its off-switch, then
//! hovers. On Ctrl-C it flips the switch, waits for the worker to finish the
//! message in hand, and closes the transport.
//!
//! ⚠️ DO NOT MAKE THIS PUB EVER
//! 💀 WORKERS ARE SUPERVISORS PRIVATE LITTLE MINIONS WHOM THE WORLD FORGOT ABOUT

mod workers;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn};

use crate::app_config::{AppConfig, DocumentStoreConfig, EpisodeStoreConfig, TransportConfig};
use crate::backends::amqp::AmqpTransport;
use crate::backends::in_mem::{
    InMemoryAnnouncer, InMemoryDocumentStore, InMemoryEpisodeStore, InMemoryQueue,
};
use crate::backends::mongo::MongoDocumentStore;
use crate::backends::postgres::PostgresEpisodeStore;
use crate::backends::{
    AnnouncerBackend, DocumentStore, DocumentStoreBackend, EpisodeStore, EpisodeStoreBackend,
    SourceBackend,
};
use crate::lookup::ImdbClient;
use crate::report::WorkerReport;
use workers::{EnrichmentWorker, Worker};

pub(crate) struct Supervisor {
    app_config: AppConfig,
}

/// 🗄️ The backends every transport shares, plus RAM-side handles for the dry-run summary.
struct Stores {
    documents: DocumentStoreBackend,
    episodes: Option<EpisodeStoreBackend>,
    in_mem_documents: Option<InMemoryDocumentStore>,
    in_mem_episodes: Option<InMemoryEpisodeStore>,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig) -> Self {
        Self { app_config }
    }

    /// 🚀 Bootstrap, run the worker to completion, tear down. Returns what the worker did.
    pub(crate) async fn run(self) -> Result<WorkerReport> {
        let config = self.app_config;
        let client = ImdbClient::new(config.provider.clone())
            .context("💀 could not build the provider client")?;
        let stores = build_stores(&config).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let report = match config.transport {
            TransportConfig::Amqp(amqp_config) => {
                let span = info_span!("enrichment_worker", queue = %amqp_config.queue);
                let transport = AmqpTransport::connect(amqp_config).await?;
                let source = SourceBackend::Amqp(transport.source().await?);
                let announcer = transport.announcer().map(AnnouncerBackend::Amqp);

                let worker = EnrichmentWorker::new(source, client, stores.documents, shutdown_rx, span)
                    .with_episode_store(stores.episodes)
                    .with_announcer(announcer)
                    .with_failure_policy(config.worker.on_failure);
                let outcome = supervise(worker.start(), shutdown_tx).await;

                // 🔒 close even when the worker failed, so a held delivery goes back to the broker
                if let Err(err) = transport.close().await {
                    warn!("⚠️ {:#}", err);
                }
                outcome?
            }
            TransportConfig::InMemory(dry_run) => {
                let span = info_span!("enrichment_worker", queue = "in-memory");
                info!(
                    "🧪 dry run: {} series names, no broker involved",
                    dry_run.names.len()
                );
                let inbound = InMemoryQueue::seeded(&dry_run.names).await?;
                let announcements = dry_run.announce.then(InMemoryQueue::new);
                let announcer = announcements
                    .clone()
                    .map(|queue| AnnouncerBackend::InMemory(InMemoryAnnouncer::new(queue)));

                let worker = EnrichmentWorker::new(
                    SourceBackend::InMemory(inbound.source()),
                    client,
                    stores.documents,
                    shutdown_rx,
                    span,
                )
                .with_episode_store(stores.episodes)
                .with_announcer(announcer)
                .with_failure_policy(config.worker.on_failure);
                let report = supervise(worker.start(), shutdown_tx).await?;

                summarize_dry_run(&inbound, announcements.as_ref()).await;
                report
            }
        };

        summarize_in_memory_stores(
            stores.in_mem_documents.as_ref(),
            stores.in_mem_episodes.as_ref(),
        )
        .await;
        Ok(report)
    }
}

/// 🏗️ Connect the stores and run their check-then-create steps.
async fn build_stores(config: &AppConfig) -> Result<Stores> {
    let (documents, in_mem_documents) = match &config.document_store {
        DocumentStoreConfig::Mongo(mongo) => (
            DocumentStoreBackend::Mongo(MongoDocumentStore::connect(mongo.clone()).await?),
            None,
        ),
        DocumentStoreConfig::InMemory => {
            let store = InMemoryDocumentStore::new();
            (DocumentStoreBackend::InMemory(store.clone()), Some(store))
        }
    };
    documents
        .ensure_unique_index()
        .await
        .context("💀 could not make sure the seriesId index exists")?;

    let (episodes, in_mem_episodes) = match &config.episode_store {
        Some(EpisodeStoreConfig::Postgres(pg)) => (
            Some(EpisodeStoreBackend::Postgres(
                PostgresEpisodeStore::connect(pg.clone()).await?,
            )),
            None,
        ),
        Some(EpisodeStoreConfig::InMemory(mem)) => {
            let store = InMemoryEpisodeStore::new(mem.write_mode);
            (Some(EpisodeStoreBackend::InMemory(store.clone())), Some(store))
        }
        None => {
            info!("🧾 no episode store configured, episode rows will not be written");
            (None, None)
        }
    };
    if let Some(store) = &episodes {
        store
            .ensure_table()
            .await
            .context("💀 could not make sure the episode table exists")?;
    }

    Ok(Stores {
        documents,
        episodes,
        in_mem_documents,
        in_mem_episodes,
    })
}

/// 👀 Wait for the worker. If Ctrl-C comes first, flip the switch and keep waiting.
async fn supervise(
    mut handle: JoinHandle<Result<WorkerReport>>,
    shutdown: watch::Sender<bool>,
) -> Result<WorkerReport> {
    tokio::select! {
        joined = &mut handle => {
            return joined.context("💀 the enrichment worker panicked")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("💀 could not listen for Ctrl-C")?;
            info!("🛑 Ctrl-C received. finishing the message in hand, then stopping.");
            shutdown.send_replace(true);
        }
    }
    handle
        .await
        .context("💀 the enrichment worker panicked on its way out")?
}

async fn summarize_dry_run(inbound: &InMemoryQueue, announcements: Option<&InMemoryQueue>) {
    let ledger = inbound.ledger().await;
    info!(
        "📒 dry run settlements: {} acked, {} requeued, {} rejected, {} held",
        ledger.acked.len(),
        ledger.requeued.len(),
        ledger.rejected.len(),
        ledger.held.len()
    );
    if let Some(queue) = announcements {
        for message in queue.drain().await {
            info!(
                "📣 would announce {} (persistent: {})",
                String::from_utf8_lossy(&message.body),
                message.persistent
            );
        }
    }
}

async fn summarize_in_memory_stores(
    documents: Option<&InMemoryDocumentStore>,
    episodes: Option<&InMemoryEpisodeStore>,
) {
    let Some(documents) = documents else {
        return;
    };
    for document in documents.documents().await {
        let rows = match episodes {
            Some(store) => store.rows_for(&document.series_id).await.len(),
            None => 0,
        };
        info!(
            "🗄️ {} '{}' ({:?} episodes reported, {} rows kept)",
            document.series_id, document.title, document.number_of_episodes, rows
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::{FailurePolicy, WorkerConfig};
    use crate::backends::{EpisodeWriteMode, InMemoryEpisodeStoreConfig, InMemoryTransportConfig};
    use crate::test_support::{SUPERNATURAL_EPISODES, mount_supernatural, provider_config};
    use wiremock::MockServer;

    fn dry_run_config(server: &MockServer, names: &[&str]) -> AppConfig {
        AppConfig {
            transport: TransportConfig::InMemory(InMemoryTransportConfig {
                names: names.iter().map(|name| name.to_string()).collect(),
                announce: true,
            }),
            provider: provider_config(&server.uri()),
            document_store: DocumentStoreConfig::InMemory,
            episode_store: Some(EpisodeStoreConfig::InMemory(InMemoryEpisodeStoreConfig {
                write_mode: EpisodeWriteMode::Replace,
            })),
            worker: WorkerConfig {
                on_failure: FailurePolicy::Requeue,
            },
        }
    }

    #[tokio::test]
    async fn the_one_where_the_dry_run_enriches_without_a_broker() -> Result<()> {
        let server = MockServer::start().await;
        mount_supernatural(&server).await;

        let report = Supervisor::new(dry_run_config(&server, &["Supernatural"]))
            .run()
            .await?;

        assert_eq!(report.received, 1);
        assert_eq!(report.acknowledged, 1);
        assert_eq!(report.episode_rows_written, SUPERNATURAL_EPISODES as u64);
        assert_eq!(report.announcements_published, 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_empty_guest_list_ends_the_party_early() -> Result<()> {
        let server = MockServer::start().await;

        let report = Supervisor::new(dry_run_config(&server, &[])).run().await?;

        assert_eq!(report.received, 0);
        assert_eq!(report.failed(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_bad_provider_url_stops_the_show_before_it_starts() {
        let server = MockServer::start().await;
        let mut config = dry_run_config(&server, &["Supernatural"]);
        config.provider.base_url = "not a url".to_string();

        assert!(Supervisor::new(config).run().await.is_err());
    }
}
