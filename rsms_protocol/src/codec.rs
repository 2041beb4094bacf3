// codec.rs: data-unit builders (realtime report, login, logout)

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::layout;
use crate::signal::{SignalId, SignalSource};
use crate::InfoType;

pub const TIME_LEN: usize = 6;
pub const ICCID_LEN: usize = 20;
/// Alarm level that opens an alarm window.
pub const MAX_ALARM_LEVEL: u8 = 3;

/// `YY MM DD hh mm ss`, year modulo 100.
pub fn time_bytes(at: &NaiveDateTime) -> [u8; TIME_LEN] {
    [
        (at.year().rem_euclid(100)) as u8,
        at.month() as u8,
        at.day() as u8,
        at.hour() as u8,
        at.minute() as u8,
        at.second() as u8,
    ]
}

pub fn vehicle_unit<S: SignalSource + ?Sized>(src: &S) -> Vec<u8> {
    layout::VEHICLE.fill(src)
}

pub fn drive_motor_unit<S: SignalSource + ?Sized>(src: &S) -> Vec<u8> {
    layout::DRIVE_MOTOR.fill(src)
}

pub fn engine_unit<S: SignalSource + ?Sized>(src: &S) -> Vec<u8> {
    layout::ENGINE.fill(src)
}

pub fn position_unit<S: SignalSource + ?Sized>(src: &S) -> Vec<u8> {
    layout::POSITION.fill(src)
}

pub fn extremum_unit<S: SignalSource + ?Sized>(src: &S) -> Vec<u8> {
    layout::EXTREMUM.fill(src)
}

pub fn battery_voltage_unit<S: SignalSource + ?Sized>(src: &S) -> Vec<u8> {
    layout::BATTERY_VOLTAGE.fill(src)
}

pub fn battery_temperature_unit<S: SignalSource + ?Sized>(src: &S) -> Vec<u8> {
    layout::BATTERY_TEMPERATURE.fill(src)
}

/// Alarm unit, sized from the four fault counts. Empty when any count is
/// missing; callers skip an empty unit.
pub fn alarm_unit<S: SignalSource + ?Sized>(src: &S) -> Vec<u8> {
    let counts = [
        SignalId::BATTERY_FAULT_COUNT,
        SignalId::DRIVE_MOTOR_FAULT_COUNT,
        SignalId::ENGINE_FAULT_COUNT,
        SignalId::OTHER_FAULT_COUNT,
    ]
    .map(|id| src.get::<u8>(id));
    let [Some(battery), Some(motor), Some(engine), Some(other)] = counts else {
        return Vec::new();
    };

    // fault code lists stay zero-filled
    let total = 10 + 4 * (battery as usize + motor as usize + engine as usize + other as usize);
    let mut buf = vec![0u8; total];
    buf[0] = InfoType::Alarm as u8;
    if let Some(level) = src.get::<u8>(SignalId::MAX_ALARM_LEVEL) {
        buf[1] = level;
    }
    if let Some(flag) = src.get::<u32>(SignalId::ALARM_FLAG) {
        buf[2..6].copy_from_slice(&flag.to_be_bytes());
    }
    buf[6] = battery;
    buf[7] = motor;
    buf[8] = engine;
    buf[9] = other;
    buf
}

pub fn is_max_alarm<S: SignalSource + ?Sized>(src: &S) -> bool {
    src.get::<u8>(SignalId::MAX_ALARM_LEVEL) == Some(MAX_ALARM_LEVEL)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    /// Append the engine unit (hybrid / range-extender vehicles).
    pub include_engine: bool,
}

/// Full realtime report body: time, then every unit in standard order.
pub fn realtime_unit<S: SignalSource + ?Sized>(
    src: &S,
    at: &NaiveDateTime,
    opts: ReportOptions,
) -> Vec<u8> {
    let parts = [
        vehicle_unit(src),
        drive_motor_unit(src),
        if opts.include_engine { engine_unit(src) } else { Vec::new() },
        position_unit(src),
        extremum_unit(src),
        alarm_unit(src),
        battery_voltage_unit(src),
        battery_temperature_unit(src),
    ];
    let total = TIME_LEN + parts.iter().map(Vec::len).sum::<usize>();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&time_bytes(at));
    for p in &parts {
        out.extend_from_slice(p);
    }
    out
}

/// Copies `text` into a zeroed field of `width` bytes, truncating if longer.
pub fn fixed_ascii(text: &str, width: usize) -> Vec<u8> {
    let mut field = vec![0u8; width];
    let n = text.len().min(width);
    field[..n].copy_from_slice(&text.as_bytes()[..n]);
    field
}

/// Vehicle login body. Every pack serial is written at the length of the first.
pub fn login_unit(at: &NaiveDateTime, login_sn: u16, iccid: &str, pack_sns: &[String]) -> Vec<u8> {
    let code_len = pack_sns.first().map(|s| s.len().min(u8::MAX as usize)).unwrap_or(0);
    let mut out = Vec::with_capacity(30 + pack_sns.len() * code_len);
    out.extend_from_slice(&time_bytes(at));
    out.extend_from_slice(&login_sn.to_be_bytes());
    out.extend_from_slice(&fixed_ascii(iccid, ICCID_LEN));
    out.push(pack_sns.len() as u8);
    out.push(code_len as u8);
    for sn in pack_sns {
        out.extend_from_slice(&fixed_ascii(sn, code_len));
    }
    out
}

pub fn logout_unit(at: &NaiveDateTime, login_sn: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(TIME_LEN + 2);
    out.extend_from_slice(&time_bytes(at));
    out.extend_from_slice(&login_sn.to_be_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalMap;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 8, 14)
            .and_then(|d| d.and_hms_opt(9, 30, 5))
            .expect("valid date")
    }

    fn with_fault_counts(m: &mut SignalMap, counts: [u8; 4]) {
        m.set(SignalId::BATTERY_FAULT_COUNT, counts[0]);
        m.set(SignalId::DRIVE_MOTOR_FAULT_COUNT, counts[1]);
        m.set(SignalId::ENGINE_FAULT_COUNT, counts[2]);
        m.set(SignalId::OTHER_FAULT_COUNT, counts[3]);
    }

    #[test]
    fn time_prefix() {
        assert_eq!(time_bytes(&at()), [25, 8, 14, 9, 30, 5]);
    }

    #[test]
    fn alarm_requires_all_fault_counts() {
        let mut m = SignalMap::new();
        m.set(SignalId::BATTERY_FAULT_COUNT, 0u8);
        m.set(SignalId::DRIVE_MOTOR_FAULT_COUNT, 0u8);
        m.set(SignalId::ENGINE_FAULT_COUNT, 0u8);
        assert!(alarm_unit(&m).is_empty());

        m.set(SignalId::OTHER_FAULT_COUNT, 0u8);
        assert_eq!(alarm_unit(&m).len(), 10);
    }

    #[test]
    fn alarm_length_tracks_fault_counts() {
        let mut m = SignalMap::new();
        with_fault_counts(&mut m, [1, 2, 0, 3]);
        m.set(SignalId::MAX_ALARM_LEVEL, 3u8);
        m.set(SignalId::ALARM_FLAG, 0x0000_0101u32);
        let unit = alarm_unit(&m);
        assert_eq!(unit.len(), 10 + 4 * 6);
        assert_eq!(unit[0], 0x07);
        assert_eq!(unit[1], 3);
        assert_eq!(&unit[2..6], &[0, 0, 1, 1]);
        assert_eq!(&unit[6..10], &[1, 2, 0, 3]);
        assert!(is_max_alarm(&m));
    }

    #[test]
    fn realtime_skips_empty_alarm_and_engine_by_default() {
        let m = SignalMap::new();
        let body = realtime_unit(&m, &at(), ReportOptions::default());
        assert_eq!(body.len(), 6 + 21 + 26 + 10 + 15 + 44 + 20);

        let with_engine = realtime_unit(&m, &at(), ReportOptions { include_engine: true });
        assert_eq!(with_engine.len(), body.len() + 6);
        // engine follows drive motor
        assert_eq!(with_engine[6 + 21 + 26], 0x04);
    }

    #[test]
    fn login_layout() {
        let unit = login_unit(&at(), 7, "89860012345678901234", &["BP0001".to_string()]);
        assert_eq!(unit.len(), 30 + 6);
        assert_eq!(&unit[6..8], &[0, 7]);
        assert_eq!(&unit[8..28], b"89860012345678901234");
        assert_eq!(unit[28], 1);
        assert_eq!(unit[29], 6);
        assert_eq!(&unit[30..], b"BP0001");
    }

    #[test]
    fn login_pads_short_iccid() {
        let unit = login_unit(&at(), 1, "898600", &["BP0001".to_string()]);
        assert_eq!(&unit[8..14], b"898600");
        assert!(unit[14..28].iter().all(|b| *b == 0));
    }

    #[test]
    fn logout_layout() {
        let unit = logout_unit(&at(), 0x0102);
        assert_eq!(unit, vec![25, 8, 14, 9, 30, 5, 1, 2]);
    }
}
