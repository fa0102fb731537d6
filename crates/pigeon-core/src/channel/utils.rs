//! Channel Utilities
//!
//! Raw platform notifications arrive from arbitrary threads, often inside callbacks
//! that must not block, so the raw event channel is unbounded and never drops.
//! Notices are broadcast to any number of subscribers.

use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::channel::communication::Notice;
use crate::config::ChannelConfig;
use crate::normalizer::RawEvent;

pub type RawEventReceiver = mpsc::UnboundedReceiver<RawEvent>;
pub type NoticeSender = broadcast::Sender<Notice>;
pub type NoticeReceiver = broadcast::Receiver<Notice>;

/// Handle a platform adapter uses to deliver notifications and replies
///
/// This is the listener registration of the platform: every callback forwards
/// into it. Cloning is cheap and delivery never blocks.
#[derive(Debug, Clone)]
pub struct RawEventSink {
    sender: mpsc::UnboundedSender<RawEvent>,
}

impl RawEventSink {
    /// Deliver a raw event; returns false once the session task is gone
    pub fn deliver(&self, event: impl Into<RawEvent>) -> bool {
        match self.sender.send(event.into()) {
            Ok(()) => true,
            Err(err) => {
                debug!("Session task gone, dropping raw event {:?}", err.0);
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Create the raw event channel (platform → session task)
pub fn create_raw_event_channel() -> (RawEventSink, RawEventReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (RawEventSink { sender }, receiver)
}

/// Create the notice broadcast (session task → subscribers)
pub fn create_notice_channel(config: &ChannelConfig) -> (NoticeSender, NoticeReceiver) {
    broadcast::channel(config.notice_buffer_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::RawBroadcast;

    #[tokio::test]
    async fn test_raw_event_sink_delivery() {
        let (sink, mut receiver) = create_raw_event_channel();
        assert!(sink.deliver(RawBroadcast::PeersChanged));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received, RawEvent::Broadcast(RawBroadcast::PeersChanged));
    }

    #[tokio::test]
    async fn test_sink_reports_closed_session() {
        let (sink, receiver) = create_raw_event_channel();
        drop(receiver);
        assert!(sink.is_closed());
        assert!(!sink.deliver(RawBroadcast::PeersChanged));
    }
}
