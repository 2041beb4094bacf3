// signal.rs: signal identifiers, value kinds and the typed text encoding

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// =============================== Identifiers ================================

/// Stable identifier of one physical vehicle signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Byte,
    Word,
    Dword,
    Text,
    Boolean,
}

/// One registry entry: every id has exactly one name and one kind.
#[derive(Debug, Clone, Copy)]
pub struct SignalDef {
    pub id: SignalId,
    pub name: &'static str,
    pub kind: ValueKind,
}

macro_rules! signal_registry {
    ($( $konst:ident = $id:literal, $name:literal, $kind:ident; )*) => {
        impl SignalId {
            $( pub const $konst: SignalId = SignalId($id); )*
        }

        /// All known signals, sorted by id.
        pub static REGISTRY: &[SignalDef] = &[
            $( SignalDef { id: SignalId($id), name: $name, kind: ValueKind::$kind }, )*
        ];
    };
}

signal_registry! {
    // vehicle
    VEHICLE_STATE = 101, "vehicle_state", Byte;
    CHARGING_STATE = 102, "charging_state", Byte;
    RUNNING_MODE = 103, "running_mode", Byte;
    SPEED = 104, "speed", Word;
    TOTAL_ODOMETER = 105, "total_odometer", Dword;
    TOTAL_VOLTAGE = 106, "total_voltage", Word;
    TOTAL_CURRENT = 107, "total_current", Word;
    SOC = 108, "soc", Byte;
    DCDC_STATE = 109, "dcdc_state", Byte;
    DRIVING = 110, "driving", Boolean;
    BRAKING = 111, "braking", Boolean;
    GEAR = 112, "gear", Byte;
    INSULATION_RESISTANCE = 113, "insulation_resistance", Word;
    ACCELERATOR_PEDAL_POSITION = 114, "accelerator_pedal_position", Byte;
    BRAKE_PEDAL_POSITION = 115, "brake_pedal_position", Byte;

    // drive motors
    DM1_STATE = 201, "dm1_state", Byte;
    DM1_CONTROLLER_TEMPERATURE = 202, "dm1_controller_temperature", Byte;
    DM1_SPEED = 203, "dm1_speed", Word;
    DM1_TORQUE = 204, "dm1_torque", Word;
    DM1_TEMPERATURE = 205, "dm1_temperature", Byte;
    DM1_CONTROLLER_INPUT_VOLTAGE = 206, "dm1_controller_input_voltage", Word;
    DM1_CONTROLLER_DC_BUS_CURRENT = 207, "dm1_controller_dc_bus_current", Word;
    DM2_STATE = 221, "dm2_state", Byte;
    DM2_CONTROLLER_TEMPERATURE = 222, "dm2_controller_temperature", Byte;
    DM2_SPEED = 223, "dm2_speed", Word;
    DM2_TORQUE = 224, "dm2_torque", Word;
    DM2_TEMPERATURE = 225, "dm2_temperature", Byte;
    DM2_CONTROLLER_INPUT_VOLTAGE = 226, "dm2_controller_input_voltage", Word;
    DM2_CONTROLLER_DC_BUS_CURRENT = 227, "dm2_controller_dc_bus_current", Word;

    // engine
    ENGINE_STATE = 301, "engine_state", Byte;
    ENGINE_CRANKSHAFT_SPEED = 302, "engine_crankshaft_speed", Word;
    ENGINE_CONSUMPTION_RATE = 303, "engine_consumption_rate", Word;

    // position
    POSITION_VALID = 401, "position_valid", Boolean;
    SOUTH_LATITUDE = 402, "south_latitude", Boolean;
    WEST_LONGITUDE = 403, "west_longitude", Boolean;
    LONGITUDE = 404, "longitude", Dword;
    LATITUDE = 405, "latitude", Dword;

    // extremum
    MAX_VOLTAGE_BATTERY_DEVICE_NO = 501, "max_voltage_battery_device_no", Byte;
    MAX_VOLTAGE_CELL_NO = 502, "max_voltage_cell_no", Byte;
    CELL_MAX_VOLTAGE = 503, "cell_max_voltage", Word;
    MIN_VOLTAGE_BATTERY_DEVICE_NO = 504, "min_voltage_battery_device_no", Byte;
    MIN_VOLTAGE_CELL_NO = 505, "min_voltage_cell_no", Byte;
    CELL_MIN_VOLTAGE = 506, "cell_min_voltage", Word;
    MAX_TEMPERATURE_DEVICE_NO = 507, "max_temperature_device_no", Byte;
    MAX_TEMPERATURE_PROBE_NO = 508, "max_temperature_probe_no", Byte;
    MAX_TEMPERATURE = 509, "max_temperature", Byte;
    MIN_TEMPERATURE_DEVICE_NO = 510, "min_temperature_device_no", Byte;
    MIN_TEMPERATURE_PROBE_NO = 511, "min_temperature_probe_no", Byte;
    MIN_TEMPERATURE = 512, "min_temperature", Byte;

    // alarm
    MAX_ALARM_LEVEL = 601, "max_alarm_level", Byte;
    ALARM_FLAG = 602, "alarm_flag", Dword;
    BATTERY_FAULT_COUNT = 620, "battery_fault_count", Byte;
    DRIVE_MOTOR_FAULT_COUNT = 640, "drive_motor_fault_count", Byte;
    ENGINE_FAULT_COUNT = 660, "engine_fault_count", Byte;
    OTHER_FAULT_COUNT = 680, "other_fault_count", Byte;

    // battery pack 1 voltage
    BATTERY1_VOLTAGE = 701, "battery1_voltage", Word;
    BATTERY1_CURRENT = 702, "battery1_current", Word;
    BATTERY1_CELL_COUNT = 703, "battery1_cell_count", Word;
    BATTERY1_CELL1_VOLTAGE = 704, "battery1_cell1_voltage", Word;
    BATTERY1_CELL2_VOLTAGE = 705, "battery1_cell2_voltage", Word;
    BATTERY1_CELL3_VOLTAGE = 706, "battery1_cell3_voltage", Word;
    BATTERY1_CELL4_VOLTAGE = 707, "battery1_cell4_voltage", Word;
    BATTERY1_CELL5_VOLTAGE = 708, "battery1_cell5_voltage", Word;
    BATTERY1_CELL6_VOLTAGE = 709, "battery1_cell6_voltage", Word;
    BATTERY1_CELL7_VOLTAGE = 710, "battery1_cell7_voltage", Word;
    BATTERY1_CELL8_VOLTAGE = 711, "battery1_cell8_voltage", Word;
    BATTERY1_CELL9_VOLTAGE = 712, "battery1_cell9_voltage", Word;
    BATTERY1_CELL10_VOLTAGE = 713, "battery1_cell10_voltage", Word;
    BATTERY1_CELL11_VOLTAGE = 714, "battery1_cell11_voltage", Word;
    BATTERY1_CELL12_VOLTAGE = 715, "battery1_cell12_voltage", Word;
    BATTERY1_CELL13_VOLTAGE = 716, "battery1_cell13_voltage", Word;
    BATTERY1_CELL14_VOLTAGE = 717, "battery1_cell14_voltage", Word;
    BATTERY1_CELL15_VOLTAGE = 718, "battery1_cell15_voltage", Word;
    BATTERY1_CELL16_VOLTAGE = 719, "battery1_cell16_voltage", Word;

    // battery pack 1 temperature
    BATTERY1_PROBE_COUNT = 800, "battery1_probe_count", Word;
    BATTERY1_PROBE1_TEMPERATURE = 801, "battery1_probe1_temperature", Byte;
    BATTERY1_PROBE2_TEMPERATURE = 802, "battery1_probe2_temperature", Byte;
    BATTERY1_PROBE3_TEMPERATURE = 803, "battery1_probe3_temperature", Byte;
    BATTERY1_PROBE4_TEMPERATURE = 804, "battery1_probe4_temperature", Byte;
    BATTERY1_PROBE5_TEMPERATURE = 805, "battery1_probe5_temperature", Byte;
    BATTERY1_PROBE6_TEMPERATURE = 806, "battery1_probe6_temperature", Byte;
    BATTERY1_PROBE7_TEMPERATURE = 807, "battery1_probe7_temperature", Byte;
    BATTERY1_PROBE8_TEMPERATURE = 808, "battery1_probe8_temperature", Byte;
    BATTERY1_PROBE9_TEMPERATURE = 809, "battery1_probe9_temperature", Byte;
    BATTERY1_PROBE10_TEMPERATURE = 810, "battery1_probe10_temperature", Byte;
    BATTERY1_PROBE11_TEMPERATURE = 811, "battery1_probe11_temperature", Byte;
    BATTERY1_PROBE12_TEMPERATURE = 812, "battery1_probe12_temperature", Byte;
    BATTERY1_PROBE13_TEMPERATURE = 813, "battery1_probe13_temperature", Byte;
    BATTERY1_PROBE14_TEMPERATURE = 814, "battery1_probe14_temperature", Byte;
    BATTERY1_PROBE15_TEMPERATURE = 815, "battery1_probe15_temperature", Byte;
}

impl SignalId {
    pub fn def(self) -> Option<&'static SignalDef> {
        REGISTRY
            .binary_search_by_key(&self.0, |d| d.id.0)
            .ok()
            .map(|i| &REGISTRY[i])
    }

    /// Fixed value kind, `None` for ids outside the registry.
    pub fn kind(self) -> Option<ValueKind> {
        self.def().map(|d| d.kind)
    }

    pub fn name(self) -> Option<&'static str> {
        self.def().map(|d| d.name)
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SignalId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u16>().map(SignalId)
    }
}

// ================================ Values ====================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SignalValue {
    Byte(u8),
    Word(u16),
    Dword(u32),
    Text(String),
    Boolean(bool),
}

impl SignalValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            SignalValue::Byte(_) => ValueKind::Byte,
            SignalValue::Word(_) => ValueKind::Word,
            SignalValue::Dword(_) => ValueKind::Dword,
            SignalValue::Text(_) => ValueKind::Text,
            SignalValue::Boolean(_) => ValueKind::Boolean,
        }
    }

    /// Single textual form shared by every kind: decimal digits, raw text, "0"/"1".
    pub fn to_text(&self) -> String {
        match self {
            SignalValue::Byte(v) => v.to_text(),
            SignalValue::Word(v) => v.to_text(),
            SignalValue::Dword(v) => v.to_text(),
            SignalValue::Text(v) => v.clone(),
            SignalValue::Boolean(v) => v.to_text(),
        }
    }

    pub fn from_text(kind: ValueKind, text: &str) -> Option<Self> {
        match kind {
            ValueKind::Byte => u8::from_text(text).map(SignalValue::Byte),
            ValueKind::Word => u16::from_text(text).map(SignalValue::Word),
            ValueKind::Dword => u32::from_text(text).map(SignalValue::Dword),
            ValueKind::Text => Some(SignalValue::Text(text.to_string())),
            ValueKind::Boolean => bool::from_text(text).map(SignalValue::Boolean),
        }
    }
}

/// Rust types that can be stored in and read back from the signal text form.
pub trait SignalType: Sized {
    const KIND: ValueKind;
    fn to_text(&self) -> String;
    fn from_text(text: &str) -> Option<Self>;
}

macro_rules! numeric_signal_type {
    ($t:ty, $kind:ident) => {
        impl SignalType for $t {
            const KIND: ValueKind = ValueKind::$kind;
            fn to_text(&self) -> String {
                self.to_string()
            }
            fn from_text(text: &str) -> Option<Self> {
                text.trim().parse::<$t>().ok()
            }
        }
    };
}

numeric_signal_type!(u8, Byte);
numeric_signal_type!(u16, Word);
numeric_signal_type!(u32, Dword);

impl SignalType for String {
    const KIND: ValueKind = ValueKind::Text;
    fn to_text(&self) -> String {
        self.clone()
    }
    fn from_text(text: &str) -> Option<Self> {
        Some(text.to_string())
    }
}

impl SignalType for bool {
    const KIND: ValueKind = ValueKind::Boolean;
    fn to_text(&self) -> String {
        if *self { "1".into() } else { "0".into() }
    }
    fn from_text(text: &str) -> Option<Self> {
        Some(text == "1")
    }
}

// ================================ Sources ===================================

/// Read access to last-known signal values. Absence means "never observed".
pub trait SignalSource {
    fn text(&self, id: SignalId) -> Option<Cow<'_, str>>;

    fn get<T: SignalType>(&self, id: SignalId) -> Option<T> {
        self.text(id).and_then(|t| T::from_text(&t))
    }
}

/// Plain id → text mapping; what a cache snapshot looks like.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalMap {
    entries: HashMap<SignalId, String>,
}

impl SignalMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: SignalType>(&mut self, id: SignalId, value: T) {
        self.entries.insert(id, value.to_text());
    }

    pub fn set_value(&mut self, id: SignalId, value: &SignalValue) {
        self.entries.insert(id, value.to_text());
    }

    pub fn insert_text(&mut self, id: SignalId, text: impl Into<String>) {
        self.entries.insert(id, text.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SignalId, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Entries ordered by id.
    pub fn sorted(&self) -> Vec<(SignalId, &str)> {
        let mut v: Vec<_> = self.iter().collect();
        v.sort_by_key(|(id, _)| *id);
        v
    }
}

impl SignalSource for SignalMap {
    fn text(&self, id: SignalId) -> Option<Cow<'_, str>> {
        self.entries.get(&id).map(|s| Cow::Borrowed(s.as_str()))
    }
}

impl FromIterator<(SignalId, String)> for SignalMap {
    fn from_iter<I: IntoIterator<Item = (SignalId, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
