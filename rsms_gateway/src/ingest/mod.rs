// ingest/mod.rs: inbound topic routing
pub mod decoder;

use crate::cache::SignalCache;
use crate::config::TopicConfig;
use crate::session::SessionEvent;
use crate::transport::InboundMessage;
use decoder::SignalDecoder;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub use decoder::JsonSignalDecoder;

/// What an inbound topic means to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    PlatformConnected,
    ControllerData,
    Ignored,
}

impl Route {
    pub fn resolve(topic: &str, topics: &TopicConfig) -> Route {
        if topic == topics.platform_connected {
            Route::PlatformConnected
        } else if topic == topics.controller_data {
            Route::ControllerData
        } else {
            Route::Ignored
        }
    }
}

#[derive(Clone)]
pub struct Router {
    topics: TopicConfig,
    cache: SignalCache,
    decoder: Arc<dyn SignalDecoder>,
    events: mpsc::Sender<SessionEvent>,
}

impl Router {
    pub fn new(
        topics: TopicConfig,
        cache: SignalCache,
        decoder: Arc<dyn SignalDecoder>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            topics,
            cache,
            decoder,
            events,
        }
    }

    pub async fn handle(&self, msg: &InboundMessage) -> Route {
        let route = Route::resolve(&msg.topic, &self.topics);
        match route {
            Route::PlatformConnected => on_platform_connected(self, &msg.payload).await,
            Route::ControllerData => on_controller_data(self, &msg.payload),
            Route::Ignored => debug!(topic = %msg.topic, "no route for topic"),
        }
        route
    }

    /// Drains inbound messages until shutdown or the sender side closes.
    pub async fn run(
        self,
        mut inbound: mpsc::Receiver<InboundMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                msg = inbound.recv() => match msg {
                    Some(msg) => { self.handle(&msg).await; }
                    None => break,
                },
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("router stopped");
    }
}

async fn on_platform_connected(router: &Router, payload: &[u8]) {
    info!(event = "platform_connected", payload = %String::from_utf8_lossy(payload));
    if router.events.send(SessionEvent::PlatformConnected).await.is_err() {
        warn!("session is gone; platform connect dropped");
    }
}

fn on_controller_data(router: &Router, payload: &[u8]) {
    match router.decoder.decode(payload) {
        Ok(pairs) => {
            for (id, value) in &pairs {
                router.cache.set_value(*id, value);
            }
            debug!(signals = pairs.len(), "controller data applied");
        }
        Err(e) => warn!(%e, bytes = payload.len(), "controller payload rejected"),
    }
}
