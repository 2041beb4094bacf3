// transport/mod.rs: the narrow publish/receive seam to the message broker
pub mod framing;
pub mod memory;
pub mod udp;

use async_trait::async_trait;

pub use memory::MemoryTransport;
pub use udp::UdpBridge;

/// One inbound `(topic, payload)` delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// `true` once the payload is handed to the transport for sending; says
    /// nothing about delivery.
    async fn publish(&self, topic: &str, payload: &[u8]) -> bool;
}
