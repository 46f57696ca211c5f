//! 🎬 *[a name arrives on the queue. just a name.]*
//! *[somewhere, a provider is about to be asked a question it has answered 4,000 times.]*
//! *[the episode table braces itself for 327 rows.]*
//!
//! 🍿 The EnrichmentWorker: takes one series name at a time and turns it into
//! a document, a pile of episode rows and (optionally) an announcement. Then,
//! and only then, it acknowledges the message.
//!
//! 🧠 Per-message state machine:
//! ```text
//! RECEIVED ──parse──▶ RESOLVING ──find/seasons──▶ PERSISTING ──upsert/rows──▶ ANNOUNCING ──publish──▶ ACKNOWLEDGED
//!     │                   │                            │                          │
//!     └───────────────────┴────────────────────────────┴──────────────────────────┴──▶ FAILED (never acked)
//! ```
//! A malformed body fails at RECEIVED and is rejected without requeue. Any
//! other failure is settled per the configured `FailurePolicy`.
//!
//! 🦆 (the duck processes one message at a time too. it's a good duck.)

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use super::Worker;
use crate::app_config::FailurePolicy;
use crate::backends::{
    Announcer, AnnouncerBackend, DocumentStore, DocumentStoreBackend, EpisodeStore,
    EpisodeStoreBackend, HeldDelivery, InboundMessage, Source, SourceBackend,
};
use crate::common::{CanonicalSeriesRecord, OutboundAnnouncement, SeriesRequest};
use crate::errors::{PipelineError, StoreKind};
use crate::lookup::ImdbClient;
use crate::report::WorkerReport;

/// 🚦 Where a message is in its short life. Logged when things go sideways.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    Resolving,
    Persisting,
    Announcing,
    Acknowledged,
    Failed,
}

#[derive(Debug)]
pub(crate) struct EnrichmentWorker {
    source: SourceBackend,
    client: ImdbClient,
    documents: DocumentStoreBackend,
    episodes: Option<EpisodeStoreBackend>,
    announcer: Option<AnnouncerBackend>,
    on_failure: FailurePolicy,
    shutdown: watch::Receiver<bool>,
    /// ⏸️ Deliveries left unsettled under `FailurePolicy::Hold`. Released when the worker ends.
    held: Vec<HeldDelivery>,
    /// 📡 Handed in by whoever spawned us. Every delivery gets a child span under it.
    span: Span,
}

impl EnrichmentWorker {
    /// 🏗️ The minimum viable worker: a source, a provider, a document store.
    /// Episode rows and announcements are opt-in.
    pub(crate) fn new(
        source: SourceBackend,
        client: ImdbClient,
        documents: DocumentStoreBackend,
        shutdown: watch::Receiver<bool>,
        span: Span,
    ) -> Self {
        Self {
            source,
            client,
            documents,
            episodes: None,
            announcer: None,
            on_failure: FailurePolicy::default(),
            shutdown,
            held: Vec::new(),
            span,
        }
    }

    pub(crate) fn with_episode_store(mut self, episodes: Option<EpisodeStoreBackend>) -> Self {
        self.episodes = episodes;
        self
    }

    pub(crate) fn with_announcer(mut self, announcer: Option<AnnouncerBackend>) -> Self {
        self.announcer = announcer;
        self
    }

    pub(crate) fn with_failure_policy(mut self, on_failure: FailurePolicy) -> Self {
        self.on_failure = on_failure;
        self
    }

    /// 🔄 Take, handle, settle, repeat. Until the source runs dry or someone says stop.
    async fn run(mut self) -> Result<WorkerReport> {
        let mut report = WorkerReport::new();
        info!(
            "🍿 enrichment worker up (on_failure = {:?}, episodes {}, announcements {})",
            self.on_failure,
            if self.episodes.is_some() { "on" } else { "off" },
            if self.announcer.is_some() { "on" } else { "off" },
        );

        loop {
            if *self.shutdown.borrow() {
                info!("🛑 shutdown requested, not taking another message");
                break;
            }

            let next = tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        info!("🛑 supervisor is gone, treating that as a shutdown");
                        break;
                    }
                    continue;
                }
                next = self.source.next_message() => next?,
            };

            let Some(message) = next else {
                info!("🏁 source closed. nothing left to enrich.");
                break;
            };

            let delivery_span = info_span!(
                "delivery",
                n = report.received + 1,
                redelivered = message.redelivered
            );
            self.handle(message, &mut report)
                .instrument(delivery_span)
                .await?;
        }

        info!(
            "🏁 enrichment worker done: {} received, {} acknowledged, {} failed",
            report.received,
            report.acknowledged,
            report.failed()
        );
        Ok(report)
    }

    /// ⚖️ Process one delivery and settle it. Only transport errors while settling
    /// escape from here; processing errors are absorbed into the settlement.
    async fn handle(&mut self, message: InboundMessage, report: &mut WorkerReport) -> Result<()> {
        let InboundMessage {
            body,
            redelivered,
            receipt,
        } = message;
        report.received += 1;
        if redelivered {
            report.redelivered += 1;
        }

        let mut stage = Stage::Received;
        match self.process(&body, &mut stage, report).await {
            Ok(record) => {
                receipt.ack().await?;
                stage = Stage::Acknowledged;
                report.acknowledged += 1;
                info!(
                    "✅ {} '{}' enriched ({} episodes), stage {:?}",
                    record.series_id,
                    record.title,
                    record.episodes.len(),
                    stage
                );
            }
            Err(err) => {
                let failed_at = stage;
                stage = Stage::Failed;
                warn!(
                    "💀 message failed while {:?}, now {:?}: {}",
                    failed_at,
                    stage,
                    error_chain(&err)
                );
                if err.is_poison() {
                    receipt.reject().await?;
                    report.rejected += 1;
                    warn!("🪦 rejected without requeue. it will not be back.");
                } else {
                    match self.on_failure {
                        FailurePolicy::Requeue => {
                            receipt.requeue().await?;
                            report.requeued += 1;
                            debug!("🔁 handed back for redelivery");
                        }
                        FailurePolicy::Hold => {
                            self.held.push(receipt.hold().await);
                            report.held += 1;
                            warn!("⏸️ left unacknowledged. the broker gets it back when the channel closes.");
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// 🎯 RECEIVED → RESOLVING → PERSISTING → ANNOUNCING. `stage` tracks how far we got.
    async fn process(
        &mut self,
        body: &[u8],
        stage: &mut Stage,
        report: &mut WorkerReport,
    ) -> Result<CanonicalSeriesRecord, PipelineError> {
        *stage = Stage::Received;
        let request: SeriesRequest =
            serde_json::from_slice(body).map_err(PipelineError::MalformedMessage)?;
        debug!("📨 asked to enrich '{}'", request.name);

        *stage = Stage::Resolving;
        let record = self.client.resolve(&request.name).await?;

        *stage = Stage::Persisting;
        let outcome = self
            .documents
            .upsert_series(&record)
            .await
            .map_err(|err| PipelineError::store_write(StoreKind::Document, err))?;
        report.record_upsert(outcome);
        debug!("🗄️ document for {} {:?}", record.series_id, outcome);

        if let Some(episodes) = &self.episodes {
            if record.has_episodes() {
                let written = episodes
                    .insert_episodes(&record.series_id, &record.episodes)
                    .await
                    .map_err(|err| PipelineError::store_write(StoreKind::Episode, err))?;
                report.episode_rows_written += written;
                debug!("🧾 {} episode rows for {}", written, record.series_id);
            }
        }

        *stage = Stage::Announcing;
        if let Some(announcer) = &mut self.announcer {
            announcer
                .announce(&OutboundAnnouncement::for_record(&record))
                .await
                .map_err(PipelineError::publish)?;
            report.announcements_published += 1;
        }

        Ok(record)
    }
}

/// 🧅 "outer: middle: inner", one layer of the onion per colon.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        chain.push_str(": ");
        chain.push_str(&inner.to_string());
        cause = inner.source();
    }
    chain
}

impl Worker for EnrichmentWorker {
    fn start(self) -> JoinHandle<Result<WorkerReport>> {
        let span = self.span.clone();
        tokio::spawn(self.run().instrument(span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::EpisodeWriteMode;
    use crate::backends::in_mem::{
        InMemoryAnnouncer, InMemoryDocumentStore, InMemoryEpisodeStore, InMemoryQueue,
    };
    use crate::test_support::{SUPERNATURAL_EPISODES, mount_supernatural, provider_config};
    use std::time::Duration;
    use wiremock::matchers::{any, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// 🧪 Every in-memory backend, plus clones we keep to peek at afterwards.
    struct Rig {
        inbound: InMemoryQueue,
        announcements: InMemoryQueue,
        documents: InMemoryDocumentStore,
        episodes: InMemoryEpisodeStore,
        shutdown: watch::Sender<bool>,
    }

    impl Rig {
        fn new(inbound: InMemoryQueue, write_mode: EpisodeWriteMode) -> Self {
            let (shutdown, _) = watch::channel(false);
            Self {
                inbound,
                announcements: InMemoryQueue::new(),
                documents: InMemoryDocumentStore::new(),
                episodes: InMemoryEpisodeStore::new(write_mode),
                shutdown,
            }
        }

        async fn seeded(names: &[&str], write_mode: EpisodeWriteMode) -> Result<Self> {
            let names: Vec<String> = names.iter().map(|name| name.to_string()).collect();
            Ok(Self::new(InMemoryQueue::seeded(&names).await?, write_mode))
        }

        fn worker(&self, server: &MockServer, on_failure: FailurePolicy) -> Result<EnrichmentWorker> {
            let client = ImdbClient::new(provider_config(&server.uri()))?;
            Ok(EnrichmentWorker::new(
                SourceBackend::InMemory(self.inbound.source()),
                client,
                DocumentStoreBackend::InMemory(self.documents.clone()),
                self.shutdown.subscribe(),
                Span::current(),
            )
            .with_episode_store(Some(EpisodeStoreBackend::InMemory(self.episodes.clone())))
            .with_announcer(Some(AnnouncerBackend::InMemory(InMemoryAnnouncer::new(
                self.announcements.clone(),
            ))))
            .with_failure_policy(on_failure))
        }
    }

    async fn mount_nobody(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/title/find"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn the_one_where_supernatural_goes_all_the_way_through() -> Result<()> {
        let server = MockServer::start().await;
        mount_supernatural(&server).await;
        let rig = Rig::seeded(&["Supernatural"], EpisodeWriteMode::Insert).await?;

        let report = rig.worker(&server, FailurePolicy::Requeue)?.start().await??;

        let documents = rig.documents.documents().await;
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].series_id, "tt0460681");
        assert_eq!(documents[0].title, "Supernatural");
        assert_eq!(documents[0].number_of_episodes, Some(327));

        let rows = rig.episodes.rows_for("tt0460681").await;
        assert_eq!(rows.len(), SUPERNATURAL_EPISODES);
        assert_eq!((rows[0].season, rows[0].episode), (1, 1));
        assert_eq!((rows[1].season, rows[1].episode), (1, 2));

        let ledger = rig.inbound.ledger().await;
        assert_eq!(ledger.acked, vec![br#"{"name":"Supernatural"}"#.to_vec()]);
        assert!(ledger.requeued.is_empty() && ledger.rejected.is_empty());

        assert_eq!(report.received, 1);
        assert_eq!(report.acknowledged, 1);
        assert_eq!(report.documents_inserted, 1);
        assert_eq!(report.episode_rows_written, SUPERNATURAL_EPISODES as u64);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_exactly_one_persistent_announcement_goes_out() -> Result<()> {
        let server = MockServer::start().await;
        mount_supernatural(&server).await;
        let rig = Rig::seeded(&["Supernatural"], EpisodeWriteMode::Insert).await?;

        let report = rig.worker(&server, FailurePolicy::Requeue)?.start().await??;

        let announced = rig.announcements.drain().await;
        assert_eq!(announced.len(), 1);
        assert!(announced[0].persistent, "announcements must survive a broker restart");
        let body: serde_json::Value = serde_json::from_slice(&announced[0].body)?;
        assert_eq!(body, serde_json::json!({"title": "Supernatural"}));
        assert_eq!(report.announcements_published, 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_replace_mode_shrugs_at_the_same_series_twice() -> Result<()> {
        let server = MockServer::start().await;
        mount_supernatural(&server).await;
        let rig = Rig::seeded(&["Supernatural", "Supernatural"], EpisodeWriteMode::Replace).await?;

        let report = rig.worker(&server, FailurePolicy::Requeue)?.start().await??;

        assert_eq!(report.acknowledged, 2);
        assert_eq!(report.documents_inserted, 1);
        assert_eq!(report.documents_updated, 1);
        let documents = rig.documents.documents().await;
        assert_eq!(documents.len(), 1);
        assert!(documents[0].updated_at >= documents[0].created_at);
        assert_eq!(
            rig.episodes.rows_for("tt0460681").await.len(),
            SUPERNATURAL_EPISODES
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_insert_mode_refuses_the_rerun_and_holds_back_the_ack() -> Result<()> {
        let server = MockServer::start().await;
        mount_supernatural(&server).await;
        let rig = Rig::seeded(&["Supernatural", "Supernatural"], EpisodeWriteMode::Insert).await?;

        let report = rig.worker(&server, FailurePolicy::Requeue)?.start().await??;

        assert_eq!(report.acknowledged, 1);
        assert_eq!(report.requeued, 1);
        let ledger = rig.inbound.ledger().await;
        assert_eq!(ledger.acked.len(), 1);
        assert_eq!(ledger.requeued.len(), 1);
        assert_eq!(
            rig.episodes.rows_for("tt0460681").await.len(),
            SUPERNATURAL_EPISODES,
            "the failed batch must not leave half a season behind"
        );
        assert_eq!(
            rig.announcements.drain().await.len(),
            1,
            "no announcement for the failed rerun"
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_nobody_is_found_and_nothing_is_written() -> Result<()> {
        let server = MockServer::start().await;
        mount_nobody(&server).await;
        let rig = Rig::seeded(&["Definitely Not A Show"], EpisodeWriteMode::Insert).await?;

        let report = rig.worker(&server, FailurePolicy::Requeue)?.start().await??;

        assert!(rig.documents.documents().await.is_empty());
        assert!(rig.announcements.drain().await.is_empty());
        let ledger = rig.inbound.ledger().await;
        assert!(ledger.acked.is_empty());
        assert_eq!(ledger.requeued.len(), 1);
        assert_eq!(report.failed(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_hold_means_nobody_settles_anything() -> Result<()> {
        let server = MockServer::start().await;
        mount_nobody(&server).await;
        let rig = Rig::seeded(&["Definitely Not A Show"], EpisodeWriteMode::Insert).await?;

        let report = rig.worker(&server, FailurePolicy::Hold)?.start().await??;

        let ledger = rig.inbound.ledger().await;
        assert!(ledger.acked.is_empty() && ledger.requeued.is_empty());
        assert_eq!(ledger.held.len(), 1);
        assert_eq!(report.held, 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_unknown_show_does_not_spin_by_default() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/title/find"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})),
            )
            .expect(2)
            .mount(&server)
            .await;
        // 🐇 open queue, like a live broker: a requeue here would come straight back
        let inbound = InMemoryQueue::new();
        inbound.publish(br#"{"name":"Definitely Not A Show"}"#.to_vec(), true).await?;
        inbound.publish(br#"{"name":"Also Not A Show"}"#.to_vec(), true).await?;
        let rig = Rig::new(inbound, EpisodeWriteMode::Insert);

        let handle = rig.worker(&server, FailurePolicy::default())?.start();
        tokio::time::timeout(Duration::from_secs(5), async {
            while rig.inbound.ledger().await.held.len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await?;
        rig.shutdown.send_replace(true);
        let report = handle.await??;

        assert_eq!(report.received, 2);
        assert_eq!(report.held, 2);
        assert_eq!(report.redelivered, 0, "nothing was handed back to spin on");
        assert!(rig.inbound.ledger().await.requeued.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_document_store_is_down_and_the_message_waits() -> Result<()> {
        let server = MockServer::start().await;
        mount_supernatural(&server).await;
        let rig = Rig::seeded(&["Supernatural"], EpisodeWriteMode::Insert).await?;
        rig.documents.simulate_outage("connection reset by peer").await;

        let report = rig.worker(&server, FailurePolicy::Requeue)?.start().await??;

        assert_eq!(report.acknowledged, 0);
        assert_eq!(report.requeued, 1);
        assert!(rig.episodes.rows_for("tt0460681").await.is_empty());
        assert!(rig.announcements.drain().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_announcement_bounces_and_the_ack_stays_home() -> Result<()> {
        let server = MockServer::start().await;
        mount_supernatural(&server).await;
        let rig = Rig::seeded(&["Supernatural"], EpisodeWriteMode::Replace).await?;
        rig.announcements.close();

        let report = rig.worker(&server, FailurePolicy::Requeue)?.start().await??;

        // 🔁 persisted already, the redelivery will upsert again and announce (again)
        assert_eq!(rig.documents.documents().await.len(), 1);
        assert_eq!(report.announcements_published, 0);
        assert_eq!(report.acknowledged, 0);
        assert_eq!(rig.inbound.ledger().await.requeued.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_garbage_is_rejected_without_bothering_the_provider() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let inbound = InMemoryQueue::new();
        inbound.publish(b"definitely not json".to_vec(), true).await?;
        inbound.publish(br#"{"title":"Supernatural"}"#.to_vec(), true).await?;
        inbound.close();
        let rig = Rig::new(inbound, EpisodeWriteMode::Insert);

        let report = rig.worker(&server, FailurePolicy::Requeue)?.start().await??;

        assert_eq!(report.rejected, 2);
        let ledger = rig.inbound.ledger().await;
        assert_eq!(ledger.rejected.len(), 2);
        assert!(ledger.requeued.is_empty(), "poison does not go back in the bottle");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_shutdown_is_heard_while_the_queue_is_quiet() -> Result<()> {
        let server = MockServer::start().await;
        let rig = Rig::new(InMemoryQueue::new(), EpisodeWriteMode::Insert);

        let handle = rig.worker(&server, FailurePolicy::Requeue)?.start();
        rig.shutdown.send_replace(true);
        let report = handle.await??;

        assert_eq!(report.received, 0);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_stopped_worker_leaves_the_queue_alone() -> Result<()> {
        let server = MockServer::start().await;
        let rig = Rig::seeded(&["Supernatural"], EpisodeWriteMode::Insert).await?;
        rig.shutdown.send_replace(true);

        let report = rig.worker(&server, FailurePolicy::Requeue)?.start().await??;

        assert_eq!(report.received, 0);
        assert_eq!(rig.inbound.drain().await.len(), 1, "the message is still waiting");
        Ok(())
    }

    #[test]
    fn the_one_where_the_onion_is_peeled_in_order() {
        let err = PipelineError::store_write(
            StoreKind::Episode,
            anyhow::anyhow!("duplicate key").context("batch insert failed"),
        );
        let chain = error_chain(&err);
        assert!(chain.starts_with("💀 the episode store refused the write"));
        assert!(chain.contains("batch insert failed"));
    }
}
