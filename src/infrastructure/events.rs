use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::protocol::Packet;
use crate::utils;

/// Something a listener received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// A packet delivered as a plain message
    MessageReceived(Packet),
    /// A file transfer completed; carries the path of the rebuilt file
    FileReceived(PathBuf),
}

/// Channel-backed publisher handed to listeners and connection readers
#[derive(Debug, Clone)]
pub struct EventPublisher {
    event_tx: mpsc::UnboundedSender<TransferEvent>,
}

impl EventPublisher {
    /// Create a publisher together with the receiver the caller drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (Self { event_tx }, event_rx)
    }

    pub fn publish(&self, event: TransferEvent) {
        if let Err(e) = self.event_tx.send(event) {
            debug!("Dropping event, nobody is listening: {:?}", e.0);
        }
    }
}

/// Event handler trait for received messages and files
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: TransferEvent) -> Result<()>;
}

/// Drain `event_rx` into `handler` until every publisher is gone
pub async fn run_event_loop<H>(mut event_rx: mpsc::UnboundedReceiver<TransferEvent>, handler: H)
where
    H: EventHandler,
{
    while let Some(event) = event_rx.recv().await {
        if let Err(e) = handler.handle_event(event).await {
            error!("Error in event handler: {}", e);
        }
    }
}

/// Event handler for logging received messages and files
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: TransferEvent) -> Result<()> {
        match &event {
            TransferEvent::MessageReceived(packet) => {
                info!(
                    "Message received ({}): {}",
                    packet,
                    String::from_utf8_lossy(&packet.payload)
                );
            }
            TransferEvent::FileReceived(path) => {
                let size = tokio::fs::metadata(path).await?.len();
                match utils::sha256_file(path).await {
                    Ok(digest) => info!(
                        "File received: {} ({}, sha256 {})",
                        path.display(),
                        utils::format_size(size),
                        digest
                    ),
                    Err(e) => warn!("File received: {} but hashing failed: {}", path.display(), e),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_channel_event_publisher() {
        let (publisher, mut event_rx) = EventPublisher::channel();

        publisher.publish(TransferEvent::MessageReceived(Packet::message(b"hi".to_vec())));

        match event_rx.recv().await.unwrap() {
            TransferEvent::MessageReceived(packet) => assert_eq!(packet.payload, b"hi"),
            other => panic!("Unexpected event type: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_receiver_is_harmless() {
        let (publisher, event_rx) = EventPublisher::channel();
        drop(event_rx);
        publisher.publish(TransferEvent::FileReceived(PathBuf::from("/nowhere")));
    }

    struct Recording(Arc<Mutex<Vec<TransferEvent>>>);

    #[async_trait]
    impl EventHandler for Recording {
        async fn handle_event(&self, event: TransferEvent) -> Result<()> {
            self.0.lock().unwrap().push(event);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_event_loop_drains_until_publishers_drop() {
        let (publisher, event_rx) = EventPublisher::channel();
        let seen = Arc::new(Mutex::new(Vec::new()));

        publisher.publish(TransferEvent::MessageReceived(Packet::message(b"a".to_vec())));
        publisher.publish(TransferEvent::MessageReceived(Packet::message(b"b".to_vec())));
        drop(publisher);

        run_event_loop(event_rx, Recording(seen.clone())).await;
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
