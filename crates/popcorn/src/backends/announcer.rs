use anyhow::Result;
use async_trait::async_trait;

use crate::backends::{amqp, in_mem};
use crate::common::OutboundAnnouncement;

/// 📣 Tells the downstream queue a series was saved.
///
/// # Contract 📜
/// - The body is `{"title": "..."}` and nothing else.
/// - Delivery is marked persistent.
/// - `Ok(())` means the transport took responsibility for it (publisher confirm
///   for AMQP), not merely that bytes left the socket.
#[async_trait]
pub(crate) trait Announcer: std::fmt::Debug {
    async fn announce(&mut self, announcement: &OutboundAnnouncement) -> Result<()>;
}

#[derive(Debug)]
pub(crate) enum AnnouncerBackend {
    InMemory(in_mem::InMemoryAnnouncer),
    Amqp(amqp::AmqpAnnouncer),
}

#[async_trait]
impl Announcer for AnnouncerBackend {
    async fn announce(&mut self, announcement: &OutboundAnnouncement) -> Result<()> {
        match self {
            AnnouncerBackend::InMemory(announcer) => announcer.announce(announcement).await,
            AnnouncerBackend::Amqp(announcer) => announcer.announce(announcement).await,
        }
    }
}
