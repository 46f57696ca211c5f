use anyhow::{Context, Result};
use async_trait::async_trait;
use lapin::options::{BasicAckOptions, BasicNackOptions};

use crate::backends::{amqp, in_mem};

/// 📨 One delivery from the transport: the bytes, plus the means to settle them.
///
/// The body and the receipt travel separately on purpose so the worker can parse
/// and process the body while the receipt waits in its pocket for the verdict.
#[derive(Debug)]
pub(crate) struct InboundMessage {
    pub(crate) body: Vec<u8>,
    /// 🔁 Transport says it has handed this one out before.
    pub(crate) redelivered: bool,
    pub(crate) receipt: Receipt,
}

/// 🚰 A source of inbound messages, one at a time.
///
/// # Contract 📜
/// - `next_message` yields `Ok(Some(_))` per delivery, `Ok(None)` once the
///   consumer is cancelled or the queue is closed for good.
/// - A yielded message stays unsettled until its `Receipt` says otherwise.
///   With prefetch 1 the transport will not hand out another one until then.
#[async_trait]
pub(crate) trait Source: std::fmt::Debug {
    async fn next_message(&mut self) -> Result<Option<InboundMessage>>;
}

/// 🎭 The many faces of a Source.
#[derive(Debug)]
pub(crate) enum SourceBackend {
    InMemory(in_mem::InMemorySource),
    Amqp(amqp::AmqpSource),
}

#[async_trait]
impl Source for SourceBackend {
    async fn next_message(&mut self) -> Result<Option<InboundMessage>> {
        match self {
            SourceBackend::InMemory(source) => source.next_message().await,
            SourceBackend::Amqp(source) => source.next_message().await,
        }
    }
}

/// 🧾 How a delivery gets settled. Consumed on use: a receipt settles exactly once.
#[derive(Debug)]
pub(crate) enum Receipt {
    InMemory(in_mem::InMemoryReceipt),
    Amqp(lapin::acker::Acker),
}

impl Receipt {
    /// ✅ Done. Transport may forget this message ever existed.
    pub(crate) async fn ack(self) -> Result<()> {
        match self {
            Receipt::InMemory(receipt) => receipt.ack().await,
            Receipt::Amqp(acker) => {
                acker
                    .ack(BasicAckOptions::default())
                    .await
                    .context("💀 basic.ack never reached the broker. it will redeliver; the upsert will shrug.")?;
                Ok(())
            }
        }
    }

    /// 🔁 Not acknowledged, hand it straight back for redelivery.
    pub(crate) async fn requeue(self) -> Result<()> {
        match self {
            Receipt::InMemory(receipt) => receipt.requeue().await,
            Receipt::Amqp(acker) => {
                acker
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..BasicNackOptions::default()
                    })
                    .await
                    .context("💀 basic.nack(requeue) bounced off the broker")?;
                Ok(())
            }
        }
    }

    /// 🪦 Not acknowledged and not coming back (poison bodies only).
    pub(crate) async fn reject(self) -> Result<()> {
        match self {
            Receipt::InMemory(receipt) => receipt.reject().await,
            Receipt::Amqp(acker) => {
                acker
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..BasicNackOptions::default()
                    })
                    .await
                    .context("💀 basic.nack(no requeue) bounced off the broker")?;
                Ok(())
            }
        }
    }

    /// ⏸️ Not acknowledged, not settled either. The broker takes it back when the channel closes.
    /// Keep the returned [`HeldDelivery`] around until then.
    pub(crate) async fn hold(self) -> HeldDelivery {
        match self {
            Receipt::InMemory(receipt) => {
                receipt.hold().await;
                HeldDelivery { _acker: None }
            }
            Receipt::Amqp(acker) => HeldDelivery {
                _acker: Some(acker),
            },
        }
    }
}

/// ⏸️ A delivery we decided not to settle, parked until the worker exits.
#[derive(Debug)]
pub(crate) struct HeldDelivery {
    _acker: Option<lapin::acker::Acker>,
}
