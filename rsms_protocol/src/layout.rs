// layout.rs: fixed-offset field tables for the data-unit kinds
//
// Each table entry names where one signal lands in the unit. Missing
// signals leave their bytes at zero.

use crate::InfoType;
use crate::signal::{SignalId, SignalSource};

#[derive(Debug, Clone, Copy)]
pub enum Field {
    /// Constant byte not taken from the cache.
    Fixed { offset: usize, value: u8 },
    Byte { offset: usize, signal: SignalId },
    Word { offset: usize, signal: SignalId },
    Dword { offset: usize, signal: SignalId },
    /// Base byte with boolean flags OR-ed in at the given bit positions.
    /// Written only when the base signal is present.
    Packed {
        offset: usize,
        base: PackedBase,
        flags: &'static [(u8, SignalId)],
    },
    /// Cell count word, then frame start cell number (always 1) and the
    /// frame cell count byte. Written only when the count is present.
    CellFrame { offset: usize, signal: SignalId },
}

#[derive(Debug, Clone, Copy)]
pub enum PackedBase {
    /// Numeric byte signal used as-is.
    Byte(SignalId),
    /// Boolean signal whose negation lands in bit 0.
    NotFlag(SignalId),
}

impl Field {
    /// Byte just past the last one this field may touch.
    pub const fn end(&self) -> usize {
        match *self {
            Field::Fixed { offset, .. } | Field::Byte { offset, .. } => offset + 1,
            Field::Packed { offset, .. } => offset + 1,
            Field::Word { offset, .. } => offset + 2,
            Field::Dword { offset, .. } => offset + 4,
            Field::CellFrame { offset, .. } => offset + 5,
        }
    }

    fn write<S: SignalSource + ?Sized>(&self, buf: &mut [u8], src: &S) {
        match *self {
            Field::Fixed { offset, value } => buf[offset] = value,
            Field::Byte { offset, signal } => {
                if let Some(v) = src.get::<u8>(signal) {
                    buf[offset] = v;
                }
            }
            Field::Word { offset, signal } => {
                if let Some(v) = src.get::<u16>(signal) {
                    buf[offset..offset + 2].copy_from_slice(&v.to_be_bytes());
                }
            }
            Field::Dword { offset, signal } => {
                if let Some(v) = src.get::<u32>(signal) {
                    buf[offset..offset + 4].copy_from_slice(&v.to_be_bytes());
                }
            }
            Field::Packed { offset, base, flags } => {
                let base = match base {
                    PackedBase::Byte(id) => src.get::<u8>(id),
                    PackedBase::NotFlag(id) => src.get::<bool>(id).map(|ok| u8::from(!ok)),
                };
                if let Some(mut byte) = base {
                    for &(bit, id) in flags {
                        if src.get::<bool>(id).unwrap_or(false) {
                            byte |= 1 << bit;
                        }
                    }
                    buf[offset] = byte;
                }
            }
            Field::CellFrame { offset, signal } => {
                if let Some(count) = src.get::<u16>(signal) {
                    buf[offset..offset + 2].copy_from_slice(&count.to_be_bytes());
                    buf[offset + 2..offset + 4].copy_from_slice(&1u16.to_be_bytes());
                    buf[offset + 4] = count as u8;
                }
            }
        }
    }
}

/// A fixed-size data unit: type tag at byte 0, then the field table.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub info_type: InfoType,
    pub len: usize,
    pub fields: &'static [Field],
}

impl Layout {
    pub fn fill<S: SignalSource + ?Sized>(&self, src: &S) -> Vec<u8> {
        let mut buf = vec![0u8; self.len];
        buf[0] = self.info_type as u8;
        for f in self.fields {
            f.write(&mut buf, src);
        }
        buf
    }
}

use Field::{Byte, CellFrame, Dword, Fixed, Packed, Word};

pub const VEHICLE: Layout = Layout {
    info_type: InfoType::Vehicle,
    len: 21,
    fields: &[
        Byte { offset: 1, signal: SignalId::VEHICLE_STATE },
        Byte { offset: 2, signal: SignalId::CHARGING_STATE },
        Byte { offset: 3, signal: SignalId::RUNNING_MODE },
        Word { offset: 4, signal: SignalId::SPEED },
        Dword { offset: 6, signal: SignalId::TOTAL_ODOMETER },
        Word { offset: 10, signal: SignalId::TOTAL_VOLTAGE },
        Word { offset: 12, signal: SignalId::TOTAL_CURRENT },
        Byte { offset: 14, signal: SignalId::SOC },
        Byte { offset: 15, signal: SignalId::DCDC_STATE },
        Packed {
            offset: 16,
            base: PackedBase::Byte(SignalId::GEAR),
            flags: &[(5, SignalId::DRIVING), (4, SignalId::BRAKING)],
        },
        Word { offset: 17, signal: SignalId::INSULATION_RESISTANCE },
        Byte { offset: 19, signal: SignalId::ACCELERATOR_PEDAL_POSITION },
        Byte { offset: 20, signal: SignalId::BRAKE_PEDAL_POSITION },
    ],
};

pub const DRIVE_MOTOR: Layout = Layout {
    info_type: InfoType::DriveMotor,
    len: 26,
    fields: &[
        Fixed { offset: 1, value: 2 },
        // motor 1
        Fixed { offset: 2, value: 1 },
        Byte { offset: 3, signal: SignalId::DM1_STATE },
        Byte { offset: 4, signal: SignalId::DM1_CONTROLLER_TEMPERATURE },
        Word { offset: 5, signal: SignalId::DM1_SPEED },
        Word { offset: 7, signal: SignalId::DM1_TORQUE },
        Byte { offset: 9, signal: SignalId::DM1_TEMPERATURE },
        Word { offset: 10, signal: SignalId::DM1_CONTROLLER_INPUT_VOLTAGE },
        Word { offset: 12, signal: SignalId::DM1_CONTROLLER_DC_BUS_CURRENT },
        // motor 2
        Fixed { offset: 14, value: 2 },
        Byte { offset: 15, signal: SignalId::DM2_STATE },
        Byte { offset: 16, signal: SignalId::DM2_CONTROLLER_TEMPERATURE },
        Word { offset: 17, signal: SignalId::DM2_SPEED },
        Word { offset: 19, signal: SignalId::DM2_TORQUE },
        Byte { offset: 21, signal: SignalId::DM2_TEMPERATURE },
        Word { offset: 22, signal: SignalId::DM2_CONTROLLER_INPUT_VOLTAGE },
        Word { offset: 24, signal: SignalId::DM2_CONTROLLER_DC_BUS_CURRENT },
    ],
};

pub const ENGINE: Layout = Layout {
    info_type: InfoType::Engine,
    len: 6,
    fields: &[
        Byte { offset: 1, signal: SignalId::ENGINE_STATE },
        Word { offset: 2, signal: SignalId::ENGINE_CRANKSHAFT_SPEED },
        Word { offset: 4, signal: SignalId::ENGINE_CONSUMPTION_RATE },
    ],
};

pub const POSITION: Layout = Layout {
    info_type: InfoType::Position,
    len: 10,
    fields: &[
        Packed {
            offset: 1,
            base: PackedBase::NotFlag(SignalId::POSITION_VALID),
            flags: &[(1, SignalId::SOUTH_LATITUDE), (2, SignalId::WEST_LONGITUDE)],
        },
        Dword { offset: 2, signal: SignalId::LONGITUDE },
        Dword { offset: 6, signal: SignalId::LATITUDE },
    ],
};

pub const EXTREMUM: Layout = Layout {
    info_type: InfoType::Extremum,
    len: 15,
    fields: &[
        Byte { offset: 1, signal: SignalId::MAX_VOLTAGE_BATTERY_DEVICE_NO },
        Byte { offset: 2, signal: SignalId::MAX_VOLTAGE_CELL_NO },
        Word { offset: 3, signal: SignalId::CELL_MAX_VOLTAGE },
        Byte { offset: 5, signal: SignalId::MIN_VOLTAGE_BATTERY_DEVICE_NO },
        Byte { offset: 6, signal: SignalId::MIN_VOLTAGE_CELL_NO },
        Word { offset: 7, signal: SignalId::CELL_MIN_VOLTAGE },
        Byte { offset: 9, signal: SignalId::MAX_TEMPERATURE_DEVICE_NO },
        Byte { offset: 10, signal: SignalId::MAX_TEMPERATURE_PROBE_NO },
        Byte { offset: 11, signal: SignalId::MAX_TEMPERATURE },
        Byte { offset: 12, signal: SignalId::MIN_TEMPERATURE_DEVICE_NO },
        Byte { offset: 13, signal: SignalId::MIN_TEMPERATURE_PROBE_NO },
        Byte { offset: 14, signal: SignalId::MIN_TEMPERATURE },
    ],
};

/// Single pack, 16 cells.
pub const BATTERY_VOLTAGE: Layout = Layout {
    info_type: InfoType::BatteryVoltage,
    len: 44,
    fields: &[
        Fixed { offset: 1, value: 1 },
        Fixed { offset: 2, value: 1 },
        Word { offset: 3, signal: SignalId::BATTERY1_VOLTAGE },
        Word { offset: 5, signal: SignalId::BATTERY1_CURRENT },
        CellFrame { offset: 7, signal: SignalId::BATTERY1_CELL_COUNT },
        Word { offset: 12, signal: SignalId::BATTERY1_CELL1_VOLTAGE },
        Word { offset: 14, signal: SignalId::BATTERY1_CELL2_VOLTAGE },
        Word { offset: 16, signal: SignalId::BATTERY1_CELL3_VOLTAGE },
        Word { offset: 18, signal: SignalId::BATTERY1_CELL4_VOLTAGE },
        Word { offset: 20, signal: SignalId::BATTERY1_CELL5_VOLTAGE },
        Word { offset: 22, signal: SignalId::BATTERY1_CELL6_VOLTAGE },
        Word { offset: 24, signal: SignalId::BATTERY1_CELL7_VOLTAGE },
        Word { offset: 26, signal: SignalId::BATTERY1_CELL8_VOLTAGE },
        Word { offset: 28, signal: SignalId::BATTERY1_CELL9_VOLTAGE },
        Word { offset: 30, signal: SignalId::BATTERY1_CELL10_VOLTAGE },
        Word { offset: 32, signal: SignalId::BATTERY1_CELL11_VOLTAGE },
        Word { offset: 34, signal: SignalId::BATTERY1_CELL12_VOLTAGE },
        Word { offset: 36, signal: SignalId::BATTERY1_CELL13_VOLTAGE },
        Word { offset: 38, signal: SignalId::BATTERY1_CELL14_VOLTAGE },
        Word { offset: 40, signal: SignalId::BATTERY1_CELL15_VOLTAGE },
        Word { offset: 42, signal: SignalId::BATTERY1_CELL16_VOLTAGE },
    ],
};

/// Single pack, 15 probes.
pub const BATTERY_TEMPERATURE: Layout = Layout {
    info_type: InfoType::BatteryTemperature,
    len: 20,
    fields: &[
        Fixed { offset: 1, value: 1 },
        Fixed { offset: 2, value: 1 },
        Word { offset: 3, signal: SignalId::BATTERY1_PROBE_COUNT },
        Byte { offset: 5, signal: SignalId::BATTERY1_PROBE1_TEMPERATURE },
        Byte { offset: 6, signal: SignalId::BATTERY1_PROBE2_TEMPERATURE },
        Byte { offset: 7, signal: SignalId::BATTERY1_PROBE3_TEMPERATURE },
        Byte { offset: 8, signal: SignalId::BATTERY1_PROBE4_TEMPERATURE },
        Byte { offset: 9, signal: SignalId::BATTERY1_PROBE5_TEMPERATURE },
        Byte { offset: 10, signal: SignalId::BATTERY1_PROBE6_TEMPERATURE },
        Byte { offset: 11, signal: SignalId::BATTERY1_PROBE7_TEMPERATURE },
        Byte { offset: 12, signal: SignalId::BATTERY1_PROBE8_TEMPERATURE },
        Byte { offset: 13, signal: SignalId::BATTERY1_PROBE9_TEMPERATURE },
        Byte { offset: 14, signal: SignalId::BATTERY1_PROBE10_TEMPERATURE },
        Byte { offset: 15, signal: SignalId::BATTERY1_PROBE11_TEMPERATURE },
        Byte { offset: 16, signal: SignalId::BATTERY1_PROBE12_TEMPERATURE },
        Byte { offset: 17, signal: SignalId::BATTERY1_PROBE13_TEMPERATURE },
        Byte { offset: 18, signal: SignalId::BATTERY1_PROBE14_TEMPERATURE },
        Byte { offset: 19, signal: SignalId::BATTERY1_PROBE15_TEMPERATURE },
    ],
};

pub const ALL: [&Layout; 7] = [
    &VEHICLE,
    &DRIVE_MOTOR,
    &ENGINE,
    &POSITION,
    &EXTREMUM,
    &BATTERY_VOLTAGE,
    &BATTERY_TEMPERATURE,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{SignalMap, SignalType, ValueKind};

    #[test]
    fn fields_fit_and_match_registered_kinds() {
        for layout in ALL {
            for f in layout.fields {
                assert!(f.end() <= layout.len, "{:?} overruns {:?}", f, layout.info_type);
                let (id, want) = match *f {
                    Field::Byte { signal, .. } => (signal, ValueKind::Byte),
                    Field::Word { signal, .. } | Field::CellFrame { signal, .. } => {
                        (signal, ValueKind::Word)
                    }
                    Field::Dword { signal, .. } => (signal, ValueKind::Dword),
                    _ => continue,
                };
                assert_eq!(id.kind(), Some(want), "{id} kind");
            }
        }
    }

    #[test]
    fn empty_source_yields_tag_and_fixed_bytes_only() {
        let m = SignalMap::new();
        let unit = DRIVE_MOTOR.fill(&m);
        assert_eq!(unit.len(), 26);
        assert_eq!(&unit[..3], &[0x02, 2, 1]);
        assert_eq!(unit[14], 2);
        assert!(unit[3..14].iter().all(|b| *b == 0));
    }

    #[test]
    fn gear_packs_driving_and_braking_bits() {
        let mut m = SignalMap::new();
        m.set(SignalId::GEAR, 0x0Du8);
        m.set(SignalId::DRIVING, true);
        m.set(SignalId::BRAKING, true);
        assert_eq!(VEHICLE.fill(&m)[16], 0x0D | 0x20 | 0x10);

        m.set(SignalId::BRAKING, false);
        assert_eq!(VEHICLE.fill(&m)[16], 0x0D | 0x20);
    }

    #[test]
    fn gear_flags_without_gear_leave_zero() {
        let mut m = SignalMap::new();
        m.set(SignalId::DRIVING, true);
        assert_eq!(VEHICLE.fill(&m)[16], 0);
    }

    #[test]
    fn position_status_bits() {
        let mut m = SignalMap::new();
        m.set(SignalId::POSITION_VALID, true);
        m.set(SignalId::SOUTH_LATITUDE, true);
        m.set(SignalId::WEST_LONGITUDE, false);
        m.set(SignalId::LONGITUDE, 121_473_701u32);
        let unit = POSITION.fill(&m);
        assert_eq!(unit[1], 0b010);
        assert_eq!(&unit[2..6], &121_473_701u32.to_be_bytes());

        m.set(SignalId::POSITION_VALID, false);
        assert_eq!(POSITION.fill(&m)[1], 0b011);
    }

    #[test]
    fn cell_frame_header() {
        let mut m = SignalMap::new();
        m.set(SignalId::BATTERY1_CELL_COUNT, 16u16);
        m.set(SignalId::BATTERY1_CELL16_VOLTAGE, 3_650u16);
        let unit = BATTERY_VOLTAGE.fill(&m);
        assert_eq!(&unit[7..12], &[0, 16, 0, 1, 16]);
        assert_eq!(&unit[42..44], &3_650u16.to_be_bytes());
    }

    #[test]
    fn text_value_in_numeric_slot_reads_absent() {
        let mut m = SignalMap::new();
        m.insert_text(SignalId::SPEED, "fast");
        assert_eq!(u16::from_text("fast"), None);
        assert_eq!(&VEHICLE.fill(&m)[4..6], &[0, 0]);
    }
}
