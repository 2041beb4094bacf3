// health/heartbeat.rs
use crate::cache::SignalCache;
use crate::session::{stopped, SessionController};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::info;

/// Logs one status line every `every` until `stop` flips.
pub fn spawn_heartbeat(
    session: SessionController,
    cache: SignalCache,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = time::interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.tick().await;
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let st = session.status();
                    info!(
                        event = "status",
                        state = ?st.state,
                        platform = st.platform_logged_in,
                        vehicle = st.vehicle_logged_in,
                        login_sn = st.login_sn,
                        interval_s = st.interval_secs,
                        alarm_window = st.in_alarm_window,
                        ring = st.ring_depth,
                        reissue = st.reissue_depth,
                        signals = cache.len()
                    );
                }
                _ = stopped(&mut stop) => break,
            }
        }
    })
}
