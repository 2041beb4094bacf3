// src/main.rs
use anyhow::Result;
use rsms_gateway::config::{Cli, TransportMode};
use rsms_gateway::ingest::{JsonSignalDecoder, Router};
use rsms_gateway::logging::{self, PacketLog};
use rsms_gateway::session::{FileIdentity, Identity, IdentityProvider, StaticIdentity};
use rsms_gateway::{
    health, sim, MemoryTransport, SessionController, SessionSettings, SignalCache, Transport,
    UdpBridge,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const EVENT_DEPTH: usize = 16;
const JOIN_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    // -------- config + logging ----------
    let (cli, cfg) = Cli::parse_and_build_config()?;
    let _log_guard = logging::init(cfg.logging.log_dir.as_deref())?;
    info!(?cli, ?cfg, "RSMS gateway starting");

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut background: Vec<JoinHandle<()>> = Vec::new();

    // -------- signal cache ----------
    let cache = SignalCache::new(&cfg.storage.signal_cache_path, cfg.storage.snapshot_interval());
    let restored = cache.start().await?;
    info!(restored, path = %cfg.storage.signal_cache_path.display(), "signal cache ready");

    // -------- identity + packet log ----------
    let identity: Arc<dyn IdentityProvider> = match &cfg.vehicle.identity_file {
        Some(path) => Arc::new(FileIdentity::new(path)),
        None => Arc::new(StaticIdentity(Identity {
            vin: cfg.vehicle.vin.clone(),
            iccid: cfg.vehicle.iccid.clone(),
            battery_pack_sns: cfg.vehicle.battery_pack_sn.clone(),
        })),
    };
    let packets = match &cfg.logging.packet_log {
        Some(path) => Some(PacketLog::open(path).await?),
        None => None,
    };

    // -------- transport ----------
    let (transport, inbound) = match cfg.transport.mode {
        TransportMode::Udp => {
            let (bridge, inbound, rx_task) = UdpBridge::connect(
                &cfg.transport.relay_addr,
                &cfg.transport.bind_addr,
                stop_rx.clone(),
            )
            .await?;
            background.push(rx_task);
            let bridge: Arc<dyn Transport> = Arc::new(bridge);
            (bridge, inbound)
        }
        TransportMode::Memory => {
            let (mem, inbound) = MemoryTransport::new(true);
            // loopback has no broker to announce the platform
            mem.inject(&cfg.topics.platform_connected, b"memory").await;
            let mem: Arc<dyn Transport> = Arc::new(mem);
            (mem, inbound)
        }
    };

    // -------- session + inbound routing ----------
    let (events_tx, events_rx) = mpsc::channel(EVENT_DEPTH);
    let session = SessionController::new(
        cache.clone(),
        transport,
        identity,
        SessionSettings::from_config(&cfg),
        packets,
    );
    let router = Router::new(
        cfg.topics.clone(),
        cache.clone(),
        Arc::new(JsonSignalDecoder),
        events_tx,
    );
    background.push(tokio::spawn(router.run(inbound, stop_rx.clone())));
    let handle = session.spawn(events_rx);

    // -------- background services ----------
    background.push(health::spawn_heartbeat(
        session.clone(),
        cache.clone(),
        Duration::from_secs(cfg.logging.heartbeat_secs.max(1)),
        stop_rx.clone(),
    ));
    if cfg.simulate {
        background.push(sim::spawn_simulator(cache.clone(), stop_rx.clone()));
    }

    info!("gateway running. Press Ctrl+C to stop");

    // -------- graceful shutdown ----------
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(?e, "failed to install Ctrl+C handler");
    }
    info!("shutdown signal received");
    let _ = stop_tx.send(true);
    handle.stop().await;
    for task in background {
        if tokio::time::timeout(JOIN_TIMEOUT, task).await.is_err() {
            warn!("background task did not stop in time");
        }
    }
    if let Err(e) = cache.stop().await {
        warn!(%e, "final signal cache write failed");
    }
    info!("gateway stopped");
    Ok(())
}
