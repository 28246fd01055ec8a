use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared wire type of a data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DpType {
    Boolean,
    Integer,
    Float,
    String,
    Enum,
    Bitfield,
}

/// Linear unit conversion applied after scaling. Named after the direction
/// from the device's unit to the displayed unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempConvert {
    CToF,
    FToC,
}

impl TempConvert {
    pub fn to_display(self, device_value: f64) -> f64 {
        match self {
            TempConvert::CToF => device_value * 9.0 / 5.0 + 32.0,
            TempConvert::FToC => (device_value - 32.0) * 5.0 / 9.0,
        }
    }

    pub fn to_device(self, display_value: f64) -> f64 {
        match self {
            TempConvert::CToF => (display_value - 32.0) * 5.0 / 9.0,
            TempConvert::FToC => display_value * 9.0 / 5.0 + 32.0,
        }
    }

    pub fn display_unit(self) -> TemperatureUnit {
        match self {
            TempConvert::CToF => TemperatureUnit::Fahrenheit,
            TempConvert::FToC => TemperatureUnit::Celsius,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemperatureUnit::Celsius => write!(f, "\u{00b0}C"),
            TemperatureUnit::Fahrenheit => write!(f, "\u{00b0}F"),
        }
    }
}

/// Abstract HVAC state exposed by climate entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    HeatCool,
    Auto,
    Dry,
    FanOnly,
}

impl HvacMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HvacMode::Off => "off",
            HvacMode::Heat => "heat",
            HvacMode::Cool => "cool",
            HvacMode::HeatCool => "heat_cool",
            HvacMode::Auto => "auto",
            HvacMode::Dry => "dry",
            HvacMode::FanOnly => "fan_only",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(HvacMode::Off),
            "heat" => Some(HvacMode::Heat),
            "cool" => Some(HvacMode::Cool),
            "heat_cool" => Some(HvacMode::HeatCool),
            "auto" => Some(HvacMode::Auto),
            "dry" => Some(HvacMode::Dry),
            "fan_only" => Some(HvacMode::FanOnly),
            _ => None,
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Switch,
    Sensor,
    Number,
    Climate,
    BinarySensor,
    Select,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Switch => "switch",
            EntityKind::Sensor => "sensor",
            EntityKind::Number => "number",
            EntityKind::Climate => "climate",
            EntityKind::BinarySensor => "binary_sensor",
            EntityKind::Select => "select",
        }
    }
}

/// User action routed to an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    TurnOn,
    TurnOff,
    SetValue(f64),
    SelectOption(String),
    SetTemperature(f64),
    SetHvacMode(HvacMode),
}

/// Published whenever an entity's value changes through a poll or a
/// confirmed command.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityUpdate {
    pub device_id: String,
    pub code: String,
    pub unique_id: String,
    pub kind: EntityKind,
    pub value: serde_json::Value,
}
