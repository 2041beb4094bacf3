// transport/memory.rs: in-process transport for dry runs and tests
use super::{InboundMessage, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

const INBOUND_DEPTH: usize = 256;

#[derive(Debug)]
struct Inner {
    connected: AtomicBool,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    inbound: mpsc::Sender<InboundMessage>,
}

/// Records every accepted publish; refuses publishes while disconnected.
#[derive(Clone, Debug)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

impl MemoryTransport {
    pub fn new(connected: bool) -> (Self, mpsc::Receiver<InboundMessage>) {
        let (tx, rx) = mpsc::channel(INBOUND_DEPTH);
        let t = Self {
            inner: Arc::new(Inner {
                connected: AtomicBool::new(connected),
                published: Mutex::new(Vec::new()),
                inbound: tx,
            }),
        };
        (t, rx)
    }

    pub fn set_connected(&self, on: bool) {
        self.inner.connected.store(on, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.inner.published.lock().clone()
    }

    pub fn take_published(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *self.inner.published.lock())
    }

    /// Delivers an inbound message as if the broker had sent it.
    pub async fn inject(&self, topic: &str, payload: &[u8]) -> bool {
        self.inner
            .inbound
            .send(InboundMessage::new(topic, payload))
            .await
            .is_ok()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, topic: &str, payload: &[u8]) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.inner
            .published
            .lock()
            .push((topic.to_string(), payload.to_vec()));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refuses_while_disconnected() {
        let (t, _rx) = MemoryTransport::new(false);
        assert!(!t.publish("TSP/RSMS", &[1]).await);
        t.set_connected(true);
        assert!(t.publish("TSP/RSMS", &[2]).await);
        assert_eq!(t.take_published(), vec![("TSP/RSMS".to_string(), vec![2])]);
        assert!(t.published().is_empty());
    }

    #[tokio::test]
    async fn inject_reaches_receiver() {
        let (t, mut rx) = MemoryTransport::new(true);
        assert!(t.inject("GLOBAL/TSP_CONNECT", b"1").await);
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg, InboundMessage::new("GLOBAL/TSP_CONNECT", b"1".to_vec()));
    }
}
