// sim/mod.rs: synthetic vehicle signals for bench runs (--simulate)
//
// Drives a slow speed/SOC profile and raises alarm level 3 for a few
// seconds out of every few minutes so the alarm path can be observed.

use crate::cache::SignalCache;
use crate::session::stopped;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rsms_protocol::SignalId;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::info;

const ALARM_EVERY: u64 = 180;
const ALARM_FOR: u64 = 5;
const CELLS: [SignalId; 16] = [
    SignalId::BATTERY1_CELL1_VOLTAGE,
    SignalId::BATTERY1_CELL2_VOLTAGE,
    SignalId::BATTERY1_CELL3_VOLTAGE,
    SignalId::BATTERY1_CELL4_VOLTAGE,
    SignalId::BATTERY1_CELL5_VOLTAGE,
    SignalId::BATTERY1_CELL6_VOLTAGE,
    SignalId::BATTERY1_CELL7_VOLTAGE,
    SignalId::BATTERY1_CELL8_VOLTAGE,
    SignalId::BATTERY1_CELL9_VOLTAGE,
    SignalId::BATTERY1_CELL10_VOLTAGE,
    SignalId::BATTERY1_CELL11_VOLTAGE,
    SignalId::BATTERY1_CELL12_VOLTAGE,
    SignalId::BATTERY1_CELL13_VOLTAGE,
    SignalId::BATTERY1_CELL14_VOLTAGE,
    SignalId::BATTERY1_CELL15_VOLTAGE,
    SignalId::BATTERY1_CELL16_VOLTAGE,
];
const PROBES: [SignalId; 15] = [
    SignalId::BATTERY1_PROBE1_TEMPERATURE,
    SignalId::BATTERY1_PROBE2_TEMPERATURE,
    SignalId::BATTERY1_PROBE3_TEMPERATURE,
    SignalId::BATTERY1_PROBE4_TEMPERATURE,
    SignalId::BATTERY1_PROBE5_TEMPERATURE,
    SignalId::BATTERY1_PROBE6_TEMPERATURE,
    SignalId::BATTERY1_PROBE7_TEMPERATURE,
    SignalId::BATTERY1_PROBE8_TEMPERATURE,
    SignalId::BATTERY1_PROBE9_TEMPERATURE,
    SignalId::BATTERY1_PROBE10_TEMPERATURE,
    SignalId::BATTERY1_PROBE11_TEMPERATURE,
    SignalId::BATTERY1_PROBE12_TEMPERATURE,
    SignalId::BATTERY1_PROBE13_TEMPERATURE,
    SignalId::BATTERY1_PROBE14_TEMPERATURE,
    SignalId::BATTERY1_PROBE15_TEMPERATURE,
];

pub struct Simulator {
    rng: StdRng,
    step: u64,
    odometer: u32,
}

impl Simulator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            step: 0,
            odometer: 12_000,
        }
    }

    pub fn alarm_active(step: u64) -> bool {
        step % ALARM_EVERY >= ALARM_EVERY - ALARM_FOR
    }

    /// Writes one second worth of signals.
    pub fn step(&mut self, cache: &SignalCache) {
        let step = self.step;
        self.step += 1;
        let rng = &mut self.rng;

        let speed: u16 = 400 + rng.random_range(0..200); // 0.1 km/h
        self.odometer += u32::from(speed / 36);
        let soc = 90u8.saturating_sub((step / 600) as u8).max(20);

        cache.set_byte(SignalId::VEHICLE_STATE, 1);
        cache.set_byte(SignalId::CHARGING_STATE, 3);
        cache.set_byte(SignalId::RUNNING_MODE, 1);
        cache.set_word(SignalId::SPEED, speed);
        cache.set_dword(SignalId::TOTAL_ODOMETER, self.odometer / 100);
        cache.set_word(SignalId::TOTAL_VOLTAGE, 3_500 + rng.random_range(0..100));
        cache.set_word(SignalId::TOTAL_CURRENT, 10_000 + rng.random_range(0..300));
        cache.set_byte(SignalId::SOC, soc);
        cache.set_byte(SignalId::DCDC_STATE, 1);
        cache.set_byte(SignalId::GEAR, 0x0E);
        cache.set_boolean(SignalId::DRIVING, true);
        cache.set_boolean(SignalId::BRAKING, rng.random_bool(0.1));
        cache.set_word(SignalId::INSULATION_RESISTANCE, 5_000);

        cache.set_byte(SignalId::DM1_STATE, 1);
        cache.set_word(SignalId::DM1_SPEED, 20_000 + speed * 5);
        cache.set_word(SignalId::DM1_TORQUE, 20_000 + rng.random_range(0..500));
        cache.set_byte(SignalId::DM1_TEMPERATURE, 80 + rng.random_range(0..10));
        cache.set_byte(SignalId::DM2_STATE, 4);

        cache.set_boolean(SignalId::POSITION_VALID, true);
        cache.set_boolean(SignalId::SOUTH_LATITUDE, false);
        cache.set_boolean(SignalId::WEST_LONGITUDE, false);
        cache.set_dword(SignalId::LONGITUDE, 121_473_701 + rng.random_range(0..50));
        cache.set_dword(SignalId::LATITUDE, 31_230_416 + rng.random_range(0..50));

        cache.set_word(SignalId::BATTERY1_CELL_COUNT, CELLS.len() as u16);
        for id in CELLS {
            cache.set_word(id, 3_600 + rng.random_range(0..60));
        }
        cache.set_word(SignalId::BATTERY1_PROBE_COUNT, PROBES.len() as u16);
        for id in PROBES {
            cache.set_byte(id, 65 + rng.random_range(0..5));
        }

        let alarm = Self::alarm_active(step);
        cache.set_byte(SignalId::MAX_ALARM_LEVEL, if alarm { 3 } else { 0 });
        cache.set_dword(SignalId::ALARM_FLAG, if alarm { 0x0000_0001 } else { 0 });
        cache.set_byte(SignalId::BATTERY_FAULT_COUNT, 0);
        cache.set_byte(SignalId::DRIVE_MOTOR_FAULT_COUNT, 0);
        cache.set_byte(SignalId::ENGINE_FAULT_COUNT, 0);
        cache.set_byte(SignalId::OTHER_FAULT_COUNT, 0);
    }
}

pub fn spawn_simulator(cache: SignalCache, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sim = Simulator::new(rand::random());
        let mut ticker = time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("signal simulator running");
        loop {
            tokio::select! {
                _ = ticker.tick() => sim.step(&cache),
                _ = stopped(&mut stop) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsms_protocol::{codec, ReportOptions};

    #[test]
    fn alarm_schedule() {
        assert!(!Simulator::alarm_active(0));
        assert!(!Simulator::alarm_active(ALARM_EVERY - ALARM_FOR - 1));
        assert!(Simulator::alarm_active(ALARM_EVERY - 1));
        assert!(!Simulator::alarm_active(ALARM_EVERY));
    }

    #[test]
    fn fills_every_reported_unit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SignalCache::new(dir.path().join("c.dat"), Duration::from_secs(5));
        let mut sim = Simulator::new(7);
        sim.step(&cache);

        let snap = cache.snapshot();
        assert!(!codec::alarm_unit(&snap).is_empty());
        let at = chrono::Local::now().naive_local();
        let body = codec::realtime_unit(&snap, &at, ReportOptions::default());
        assert_eq!(body.len(), 6 + 21 + 26 + 10 + 15 + 10 + 44 + 20);
        assert!(!codec::is_max_alarm(&snap));
    }
}
