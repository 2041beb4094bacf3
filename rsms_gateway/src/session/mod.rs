// session/mod.rs: vehicle login state, collection tick and reissue dispatch
//
// NotStarted → Initializing → AwaitingPlatformLogin ⇄ VehicleLoggedIn → Stopped
//
// Each loop runs as its own task. The platform-connected signal arrives as a
// SessionEvent; the current state is published on a watch channel.

pub mod collector;
pub mod identity;
pub mod store;

use crate::cache::SignalCache;
use crate::config::GatewayConfig;
use crate::logging::{Outcome, PacketLog};
use crate::telemetry::ReissueQueue;
use crate::transport::Transport;
use chrono::{Local, NaiveDateTime};
use parking_lot::Mutex;
use rsms_protocol::{codec, CommandFlag, MessageBuilder, ReportOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub use collector::{CollectPolicy, Collector, Dispatch, TickOutcome};
pub use identity::{FileIdentity, Identity, IdentityProvider, StaticIdentity};

const JOIN_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    PlatformConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    NotStarted,
    Initializing,
    AwaitingPlatformLogin,
    VehicleLoggedIn,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub report_topic: String,
    pub session_path: PathBuf,
    pub reissue_path: PathBuf,
    pub policy: CollectPolicy,
    pub reissue_per_tick: usize,
    pub report: ReportOptions,
    pub tick: Duration,
    pub reissue_flush: Duration,
    pub identity_retry: Duration,
}

impl SessionSettings {
    pub fn from_config(cfg: &GatewayConfig) -> Self {
        Self {
            report_topic: cfg.topics.report.clone(),
            session_path: cfg.storage.session_path.clone(),
            reissue_path: cfg.storage.reissue_path.clone(),
            policy: CollectPolicy {
                initial_interval: cfg.session.initial_interval_secs,
                relaxed_interval: cfg.session.relaxed_interval_secs,
                alarm_window: cfg.session.alarm_window_secs,
                retention: cfg.session.retention_capacity,
            },
            reissue_per_tick: cfg.session.reissue_per_tick,
            report: ReportOptions {
                include_engine: cfg.vehicle.report_engine,
            },
            tick: cfg.session.tick(),
            reissue_flush: cfg.storage.reissue_flush(),
            identity_retry: Duration::from_secs(1),
        }
    }
}

/// Point-in-time view for the status heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: LinkState,
    pub platform_logged_in: bool,
    pub vehicle_logged_in: bool,
    pub login_sn: u16,
    pub interval_secs: u64,
    pub in_alarm_window: bool,
    pub ring_depth: usize,
    pub reissue_depth: usize,
}

struct Shared {
    cache: SignalCache,
    transport: Arc<dyn Transport>,
    identity_provider: Arc<dyn IdentityProvider>,
    settings: SessionSettings,
    packets: Option<PacketLog>,
    identity: Mutex<Option<Identity>>,
    login_sn: AtomicU16,
    platform_logged_in: AtomicBool,
    vehicle_logged_in: AtomicBool,
    collector: Mutex<Collector>,
    reissue: ReissueQueue,
    state_tx: watch::Sender<LinkState>,
    epoch: Instant,
}

#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
}

fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Resolves once `stop` turns true or its sender is gone.
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

async fn reached_running(state: &mut watch::Receiver<LinkState>) -> bool {
    state
        .wait_for(|s| matches!(s, LinkState::AwaitingPlatformLogin | LinkState::VehicleLoggedIn))
        .await
        .is_ok()
}

impl SessionController {
    pub fn new(
        cache: SignalCache,
        transport: Arc<dyn Transport>,
        identity_provider: Arc<dyn IdentityProvider>,
        settings: SessionSettings,
        packets: Option<PacketLog>,
    ) -> Self {
        let (state_tx, _) = watch::channel(LinkState::NotStarted);
        let collector = Collector::new(settings.policy);
        Self {
            shared: Arc::new(Shared {
                cache,
                transport,
                identity_provider,
                settings,
                packets,
                identity: Mutex::new(None),
                login_sn: AtomicU16::new(0),
                platform_logged_in: AtomicBool::new(false),
                vehicle_logged_in: AtomicBool::new(false),
                collector: Mutex::new(collector),
                reissue: ReissueQueue::new(),
                state_tx,
                epoch: Instant::now(),
            }),
        }
    }

    pub fn state(&self) -> watch::Receiver<LinkState> {
        self.shared.state_tx.subscribe()
    }

    pub fn reissue(&self) -> &ReissueQueue {
        &self.shared.reissue
    }

    pub fn login_sn(&self) -> u16 {
        self.shared.login_sn.load(Ordering::SeqCst)
    }

    /// Both the platform and the vehicle are logged in.
    pub fn is_logged_in(&self) -> bool {
        self.shared.platform_logged_in.load(Ordering::SeqCst)
            && self.shared.vehicle_logged_in.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SessionStatus {
        let s = &self.shared;
        let (interval_secs, in_alarm_window, ring_depth) = {
            let c = s.collector.lock();
            (c.interval(), c.in_alarm_window(), c.ring().len())
        };
        SessionStatus {
            state: *s.state_tx.borrow(),
            platform_logged_in: s.platform_logged_in.load(Ordering::SeqCst),
            vehicle_logged_in: s.vehicle_logged_in.load(Ordering::SeqCst),
            login_sn: self.login_sn(),
            interval_secs,
            in_alarm_window,
            ring_depth,
            reissue_depth: s.reissue.len(),
        }
    }

    fn set_state(&self, next: LinkState) {
        let prev = self.shared.state_tx.send_replace(next);
        if prev != next {
            info!(event = "session_state", from = ?prev, to = ?next);
        }
    }

    // ----------------------------- init -------------------------------------

    /// Loads the persisted login sequence number and reissue backlog, then
    /// waits for a complete vehicle identity, retrying until one appears.
    /// Returns `false` if shutdown was requested while waiting.
    pub async fn initialize(&self, stop: &mut watch::Receiver<bool>) -> bool {
        let s = &self.shared;
        self.set_state(LinkState::Initializing);

        match store::load_login_sn(&s.settings.session_path).await {
            Ok(sn) => s.login_sn.store(sn, Ordering::SeqCst),
            Err(e) => warn!(%e, "session config unreadable; login_sn starts at 0"),
        }
        if let Err(e) = s.reissue.load(&s.settings.reissue_path).await {
            warn!(%e, "reissue backlog unreadable; starting empty");
        }

        let mut attempts = 0u64;
        loop {
            match s.identity_provider.identity().await {
                Ok(identity) => {
                    info!(
                        event = "identity_ready",
                        vin = %identity.vin,
                        packs = identity.battery_pack_sns.len()
                    );
                    *s.identity.lock() = Some(identity);
                    break;
                }
                Err(e) => {
                    if attempts == 0 {
                        warn!(%e, "vehicle identity not provisioned; retrying");
                    } else {
                        debug!(%e, attempts, "identity still missing");
                    }
                    attempts += 1;
                }
            }
            tokio::select! {
                _ = time::sleep(s.settings.identity_retry) => {}
                _ = stopped(stop) => return false,
            }
        }

        self.set_state(LinkState::AwaitingPlatformLogin);
        true
    }

    fn identity(&self) -> Option<Identity> {
        self.shared.identity.lock().clone()
    }

    // ----------------------------- publish ----------------------------------

    /// Frames `unit` under `command` and hands it to the transport.
    async fn publish(&self, command: CommandFlag, unit: &[u8]) -> bool {
        let s = &self.shared;
        let Some(identity) = self.identity() else {
            debug!(command = command.as_str(), "no identity yet; not publishing");
            return false;
        };
        let frame = match MessageBuilder::new(&identity.vin).build(command, unit) {
            Ok(f) => f,
            Err(e) => {
                warn!(%e, command = command.as_str(), "cannot frame data unit");
                return false;
            }
        };

        let ok = s.transport.publish(&s.settings.report_topic, &frame).await;
        if ok {
            debug!(
                command = command.as_str(),
                bytes = frame.len(),
                frame = %hex::encode(&frame),
                "published"
            );
        } else {
            debug!(command = command.as_str(), bytes = frame.len(), "transport refused publish");
        }
        if let Some(log) = &s.packets {
            let outcome = if ok { Outcome::Sent } else { Outcome::Refused };
            log.record(command, frame.len(), outcome).await;
        }
        ok
    }

    // ----------------------------- login / logout ---------------------------

    /// Platform-connected signal. Logs the vehicle in unless it already is.
    /// A refused login leaves the vehicle logged out; the next signal retries.
    pub async fn on_platform_connected(&self) -> bool {
        let s = &self.shared;
        s.platform_logged_in.store(true, Ordering::SeqCst);
        if s.vehicle_logged_in.load(Ordering::SeqCst) {
            debug!("platform connected while already logged in");
            return true;
        }
        let Some(identity) = self.identity() else {
            info!("platform connected before initialization; login deferred");
            return false;
        };

        let sn = s.login_sn.load(Ordering::SeqCst).wrapping_add(1);
        s.login_sn.store(sn, Ordering::SeqCst);
        let unit = codec::login_unit(&now_local(), sn, &identity.iccid, &identity.battery_pack_sns);
        let sent = self.publish(CommandFlag::VehicleLogin, &unit).await;

        if let Err(e) = store::save_login_sn(&s.settings.session_path, sn).await {
            warn!(%e, login_sn = sn, "login_sn not persisted");
        }

        if sent {
            s.vehicle_logged_in.store(true, Ordering::SeqCst);
            self.set_state(LinkState::VehicleLoggedIn);
            info!(event = "vehicle_login", login_sn = sn);
        } else {
            warn!(login_sn = sn, "login refused by transport; waiting for next platform connect");
        }
        sent
    }

    /// Publishes a logout with the current sequence number. Does not wait
    /// for any acknowledgment.
    pub async fn logout(&self) -> bool {
        let s = &self.shared;
        if !s.vehicle_logged_in.swap(false, Ordering::SeqCst) {
            return false;
        }
        let sn = self.login_sn();
        let sent = self
            .publish(CommandFlag::VehicleLogout, &codec::logout_unit(&now_local(), sn))
            .await;
        self.set_state(LinkState::AwaitingPlatformLogin);
        info!(event = "vehicle_logout", login_sn = sn, sent);
        sent
    }

    // ----------------------------- loops bodies -----------------------------

    /// One collection tick: build from a consistent snapshot, update the
    /// ring and alarm window, then send or queue.
    pub async fn collect_once(&self) -> Dispatch {
        let s = &self.shared;
        let snap = s.cache.snapshot();
        let unit = codec::realtime_unit(&snap, &now_local(), s.settings.report);
        let max_alarm = codec::is_max_alarm(&snap);
        let now = s.epoch.elapsed().as_secs();
        let logged_in = self.is_logged_in();

        let outcome = s.collector.lock().tick(now, &unit, max_alarm, logged_in);

        if !outcome.backfill.is_empty() {
            info!(event = "alarm_backfill", samples = outcome.backfill.len());
            s.reissue.extend(outcome.backfill);
        }
        match outcome.dispatch {
            Dispatch::Send => {
                if !self.publish(CommandFlag::RealtimeReport, &unit).await {
                    s.reissue.push_back(unit);
                }
            }
            Dispatch::Enqueue => s.reissue.push_back(unit),
            Dispatch::Skip => {}
        }
        outcome.dispatch
    }

    /// Sends up to the per-tick budget of the oldest queued units as reissue
    /// reports. Returns how many were handed to the transport.
    pub async fn dispatch_once(&self) -> usize {
        let s = &self.shared;
        if !self.is_logged_in() {
            return 0;
        }
        let mut pending = s.reissue.take_batch(s.settings.reissue_per_tick).into_iter();
        let mut sent = 0;
        while let Some(unit) = pending.next() {
            if self.publish(CommandFlag::ReissueReport, &unit).await {
                sent += 1;
                continue;
            }
            let mut rest = vec![unit];
            rest.extend(pending.by_ref());
            s.reissue.requeue_front(rest);
            break;
        }
        sent
    }

    pub async fn flush_reissue(&self) {
        let path = &self.shared.settings.reissue_path;
        match self.shared.reissue.save_if_dirty(path).await {
            Ok(true) => debug!(depth = self.shared.reissue.len(), "reissue backlog persisted"),
            Ok(false) => {}
            Err(e) => warn!(%e, "reissue backlog write failed; previous file kept"),
        }
    }

    // ----------------------------- tasks ------------------------------------

    pub fn spawn(&self, events: mpsc::Receiver<SessionEvent>) -> SessionHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(self.clone().event_loop(events, stop_rx.clone())),
            tokio::spawn(self.clone().collect_loop(stop_rx.clone())),
            tokio::spawn(self.clone().dispatch_loop(stop_rx.clone())),
            tokio::spawn(self.clone().flush_loop(stop_rx)),
        ];
        SessionHandle {
            controller: self.clone(),
            stop_tx,
            tasks,
        }
    }

    async fn wait_ready(&self, stop: &mut watch::Receiver<bool>) -> bool {
        let mut state = self.state();
        tokio::select! {
            ready = reached_running(&mut state) => ready,
            _ = stopped(stop) => false,
        }
    }

    async fn event_loop(
        self,
        mut events: mpsc::Receiver<SessionEvent>,
        mut stop: watch::Receiver<bool>,
    ) {
        if !self.initialize(&mut stop).await {
            return;
        }
        if self.shared.platform_logged_in.load(Ordering::SeqCst) {
            self.on_platform_connected().await;
        }
        loop {
            tokio::select! {
                ev = events.recv() => match ev {
                    Some(SessionEvent::PlatformConnected) => {
                        self.on_platform_connected().await;
                    }
                    None => break,
                },
                _ = stopped(&mut stop) => break,
            }
        }
        debug!("session event loop stopped");
    }

    async fn collect_loop(self, mut stop: watch::Receiver<bool>) {
        if !self.wait_ready(&mut stop).await {
            return;
        }
        let mut ticker = time::interval(self.shared.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.collect_once().await;
                }
                _ = stopped(&mut stop) => break,
            }
        }
        debug!("collection loop stopped");
    }

    async fn dispatch_loop(self, mut stop: watch::Receiver<bool>) {
        if !self.wait_ready(&mut stop).await {
            return;
        }
        let mut ticker = time::interval(self.shared.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let sent = self.dispatch_once().await;
                    if sent > 0 {
                        debug!(sent, remaining = self.shared.reissue.len(), "reissue dispatched");
                    }
                }
                _ = stopped(&mut stop) => break,
            }
        }
        debug!("dispatch loop stopped");
    }

    async fn flush_loop(self, mut stop: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.shared.settings.reissue_flush);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => self.flush_reissue().await,
                _ = stopped(&mut stop) => break,
            }
        }
    }

    /// Logout, final backlog write, `Stopped`.
    async fn finish(&self) {
        self.logout().await;
        if let Err(e) = self.shared.reissue.save(&self.shared.settings.reissue_path).await {
            warn!(%e, "final reissue backlog write failed");
        }
        self.set_state(LinkState::Stopped);
    }
}

/// Running session tasks.
pub struct SessionHandle {
    controller: SessionController,
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Signals every loop, waits a bounded time for each, then logs out and
    /// persists the backlog.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        for task in self.tasks {
            match time::timeout(JOIN_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(?e, "session task ended abnormally"),
                Err(_) => warn!("session task did not stop in time"),
            }
        }
        self.controller.finish().await;
    }
}
