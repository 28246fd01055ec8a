use indexmap::IndexMap;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::{
    BinarySensorSpec, ClimateSpec, DEFAULT_FLOAT_SCALE, Device, EntitySpec, NumberSpec,
    SelectSpec, SensorSpec, SwitchSpec,
};
use crate::convert::{
    bitfield_labels, matches_on_value, scaled, to_wire, translate, truthy, value_text,
};
use crate::protocol::DpCommand;
use crate::types::{Command, DpType, EntityKind, EntityUpdate, HvacMode, TempConvert};
use crate::{Error, Result};

/// Lowercase, runs of anything but `[a-z0-9_]` collapsed to `_`.
pub fn sanitize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out
}

fn title_case(slug: &str) -> String {
    slug.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Identity and presentation data shared by all entity kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    pub unique_id: String,
    pub name: String,
    pub device_id: String,
    pub unit: Option<String>,
    pub device_class: Option<String>,
}

impl EntityInfo {
    fn new(device: &Device, base: &str, name: Option<&str>) -> Self {
        let slug = sanitize(base);
        Self {
            unique_id: format!("{}_{slug}", device.id),
            name: name.map_or_else(|| title_case(&slug), str::to_string),
            device_id: device.id.clone(),
            unit: None,
            device_class: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    pub info: EntityInfo,
    code: String,
    dp_type: DpType,
    on_value: Option<Value>,
    passive: bool,
    is_on: Option<bool>,
}

impl Switch {
    fn new(device: &Device, spec: &SwitchSpec) -> Self {
        Self {
            info: EntityInfo::new(device, &spec.code, spec.name.as_deref()),
            code: spec.code.clone(),
            dp_type: spec.dp_type,
            on_value: spec.on_value.clone(),
            passive: spec.passive,
            is_on: None,
        }
    }

    pub fn is_on(&self) -> Option<bool> {
        self.is_on
    }

    fn apply(&mut self, raw: &Value) {
        let on = match (&self.on_value, self.dp_type) {
            (Some(on_value), _) => matches_on_value(raw, on_value),
            (None, DpType::Boolean | DpType::Bitfield) => {
                matches_on_value(raw, &Value::Bool(true))
            }
            (None, dp_type) => truthy(raw, dp_type),
        };
        self.is_on = Some(on);
    }

    fn wire_value(&self, on: bool) -> Value {
        match self.dp_type {
            DpType::Integer => json!(i64::from(on)),
            DpType::Float => json!(if on { 1.0 } else { 0.0 }),
            DpType::Enum | DpType::String => match (&self.on_value, on) {
                (Some(on_value), true) => on_value.clone(),
                _ => Value::String(on.to_string()),
            },
            DpType::Boolean | DpType::Bitfield => Value::Bool(on),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub info: EntityInfo,
    code: String,
    dp_type: Option<DpType>,
    scale: Option<f64>,
    temp_convert: Option<TempConvert>,
    translation: Option<IndexMap<String, String>>,
    value: Option<Value>,
}

impl Sensor {
    fn new(device: &Device, spec: &SensorSpec) -> Self {
        let mut info = EntityInfo::new(device, &spec.code, spec.name.as_deref());
        info.unit = spec
            .unit_of_measurement
            .clone()
            .or_else(|| spec.temp_convert.map(|c| c.display_unit().to_string()));
        info.device_class = spec.device_class.clone();
        Self {
            info,
            code: spec.code.clone(),
            dp_type: spec.dp_type,
            scale: spec.scale,
            temp_convert: spec.temp_convert,
            translation: spec.translation.clone(),
            value: None,
        }
    }

    pub fn native_value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    fn convert(&self, raw: &Value) -> Value {
        if let Some(ref table) = self.translation {
            return match self.dp_type {
                Some(DpType::Bitfield) => bitfield_labels(raw, table),
                _ => translate(raw, table),
            };
        }
        match (self.dp_type, self.scale, self.temp_convert) {
            (Some(DpType::Float), scale, convert) => {
                scaled(raw, scale.unwrap_or(DEFAULT_FLOAT_SCALE), convert)
            }
            (_, Some(scale), convert) => scaled(raw, scale, convert),
            (_, None, Some(convert)) => scaled(raw, 1.0, Some(convert)),
            _ => raw.clone(),
        }
    }

    fn apply(&mut self, raw: &Value) {
        self.value = Some(self.convert(raw));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Number {
    pub info: EntityInfo,
    code: String,
    dp_type: DpType,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    scale: f64,
    passive: bool,
    value: Option<Value>,
}

impl Number {
    fn new(device: &Device, spec: &NumberSpec) -> Self {
        let mut info = EntityInfo::new(device, &spec.code, spec.name.as_deref());
        info.unit = spec.unit_of_measurement.clone();
        Self {
            info,
            code: spec.code.clone(),
            dp_type: spec.dp_type,
            min: spec.min,
            max: spec.max,
            step: spec.step,
            scale: spec.scale.unwrap_or(1.0),
            passive: spec.passive,
            value: None,
        }
    }

    pub fn native_value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    fn apply(&mut self, raw: &Value) {
        self.value = Some(scaled(raw, self.scale, None));
    }

    fn plan(&self, value: f64) -> Result<Vec<DpCommand>> {
        if self.min.is_some_and(|min| value < min) || self.max.is_some_and(|max| value > max) {
            return Err(Error::InvalidCommand(format!(
                "{value} outside {:?}..{:?} for {}",
                self.min, self.max, self.info.unique_id
            )));
        }
        let wire = match self.dp_type {
            DpType::Float => json!(value * self.scale),
            _ => to_wire(value, self.scale, None),
        };
        Ok(vec![DpCommand::new(&self.code, wire)])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinarySensor {
    pub info: EntityInfo,
    code: String,
    on_value: Value,
    translation: Option<IndexMap<String, String>>,
    is_on: Option<bool>,
    label: Option<Value>,
}

impl BinarySensor {
    fn new(device: &Device, spec: &BinarySensorSpec) -> Self {
        let mut info = EntityInfo::new(device, &spec.code, spec.name.as_deref());
        info.device_class = spec.device_class.clone();
        Self {
            info,
            code: spec.code.clone(),
            on_value: spec.on_value.clone().unwrap_or(Value::Bool(true)),
            translation: spec.translation.clone(),
            is_on: None,
            label: None,
        }
    }

    pub fn is_on(&self) -> Option<bool> {
        self.is_on
    }

    /// Translated raw value, when a translation table is configured.
    pub fn label(&self) -> Option<&Value> {
        self.label.as_ref()
    }

    fn apply(&mut self, raw: &Value) {
        self.is_on = Some(matches_on_value(raw, &self.on_value));
        self.label = self.translation.as_ref().map(|t| translate(raw, t));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub info: EntityInfo,
    code: String,
    dp_type: DpType,
    options: IndexMap<String, String>,
    passive: bool,
    current: Option<String>,
}

impl Select {
    fn new(device: &Device, spec: &SelectSpec) -> Self {
        Self {
            info: EntityInfo::new(device, &spec.code, spec.name.as_deref()),
            code: spec.code.clone(),
            dp_type: spec.dp_type,
            options: spec.options.clone(),
            passive: spec.passive,
            current: None,
        }
    }

    pub fn options(&self) -> impl Iterator<Item = &str> {
        self.options.values().map(String::as_str)
    }

    pub fn current_option(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Raw key → label; unknown keys are shown as-is.
    pub fn label_for(&self, raw: &Value) -> String {
        let key = value_text(raw);
        self.options.get(&key).cloned().unwrap_or(key)
    }

    /// Label → raw key as sent to the device.
    pub fn key_for(&self, label: &str) -> Option<Value> {
        let key = self
            .options
            .iter()
            .find_map(|(key, l)| (l == label).then_some(key))?;
        let wire = match self.dp_type {
            DpType::Integer => key.parse::<i64>().map(Value::from).ok(),
            DpType::Boolean => key.parse::<bool>().map(Value::Bool).ok(),
            _ => None,
        };
        Some(wire.unwrap_or_else(|| Value::String(key.clone())))
    }

    fn apply(&mut self, raw: &Value) {
        self.current = Some(self.label_for(raw));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Climate {
    pub info: EntityInfo,
    current_code: String,
    target_code: Option<String>,
    mode_code: String,
    switch_code: Option<String>,
    scale: f64,
    temp_convert: Option<TempConvert>,
    modes: IndexMap<HvacMode, Value>,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub precision: Option<f64>,
    passive: bool,
    current_temperature: Option<Value>,
    target_temperature: Option<Value>,
    mode_value: Option<Value>,
    switch_on: Option<bool>,
}

impl Climate {
    fn new(device: &Device, spec: &ClimateSpec) -> Self {
        let base = spec
            .unique_id
            .as_deref()
            .or(spec.name.as_deref())
            .unwrap_or("climate");
        let mut info = EntityInfo::new(device, base, spec.name.as_deref());
        info.unit = spec.temp_convert.map(|c| c.display_unit().to_string());
        let target = spec.target_temperature.as_ref();
        Self {
            info,
            current_code: spec.current_temperature.code.clone(),
            target_code: target.map(|t| t.code.clone()),
            mode_code: spec.hvac_mode.code.clone(),
            switch_code: spec.on_off.as_ref().map(|s| s.code.clone()),
            scale: spec.scale,
            temp_convert: spec.temp_convert,
            modes: spec.hvac_mode.modes.clone(),
            min_temp: target.map(|t| t.min_temp),
            max_temp: target.map(|t| t.max_temp),
            precision: target.map(|t| t.precision),
            passive: spec.passive,
            current_temperature: None,
            target_temperature: None,
            mode_value: None,
            switch_on: None,
        }
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.current_temperature.as_ref().and_then(Value::as_f64)
    }

    pub fn target_temperature(&self) -> Option<f64> {
        self.target_temperature.as_ref().and_then(Value::as_f64)
    }

    /// Modes this entity can be set to; `off` is always available.
    pub fn hvac_modes(&self) -> Vec<HvacMode> {
        let mut modes = vec![HvacMode::Off];
        modes.extend(self.modes.keys().copied().filter(|m| *m != HvacMode::Off));
        modes
    }

    /// A reported-off power switch wins over the mode data point.
    pub fn hvac_mode(&self) -> HvacMode {
        if self.switch_code.is_some() && self.switch_on == Some(false) {
            return HvacMode::Off;
        }
        self.mode_value
            .as_ref()
            .and_then(|raw| {
                self.modes
                    .iter()
                    .find_map(|(mode, v)| matches_on_value(raw, v).then_some(*mode))
            })
            .unwrap_or(HvacMode::Off)
    }

    fn apply(&mut self, code: &str, raw: &Value) {
        if code == self.current_code {
            self.current_temperature = Some(scaled(raw, self.scale, self.temp_convert));
        } else if self.target_code.as_deref() == Some(code) {
            self.target_temperature = Some(scaled(raw, self.scale, self.temp_convert));
        } else if code == self.mode_code {
            self.mode_value = Some(raw.clone());
        } else if self.switch_code.as_deref() == Some(code) {
            self.switch_on = Some(matches_on_value(raw, &Value::Bool(true)));
        }
    }

    fn plan_temperature(&self, temp: f64) -> Result<Vec<DpCommand>> {
        let Some(ref code) = self.target_code else {
            return Err(Error::InvalidCommand(format!(
                "{} has no target temperature",
                self.info.unique_id
            )));
        };
        if self.min_temp.is_some_and(|min| temp < min)
            || self.max_temp.is_some_and(|max| temp > max)
        {
            return Err(Error::InvalidCommand(format!(
                "{temp} outside {:?}..{:?} for {}",
                self.min_temp, self.max_temp, self.info.unique_id
            )));
        }
        Ok(vec![DpCommand::new(
            code,
            to_wire(temp, self.scale, self.temp_convert),
        )])
    }

    fn plan_mode(&self, mode: HvacMode) -> Result<Vec<DpCommand>> {
        if mode == HvacMode::Off {
            if let Some(ref switch) = self.switch_code {
                return Ok(vec![DpCommand::new(switch, false)]);
            }
            if let Some(raw) = self.modes.get(&HvacMode::Off) {
                return Ok(vec![DpCommand::new(&self.mode_code, raw.clone())]);
            }
            return Err(Error::InvalidCommand(format!(
                "{} cannot be turned off",
                self.info.unique_id
            )));
        }

        let Some(raw) = self.modes.get(&mode) else {
            return Err(Error::InvalidCommand(format!(
                "{} does not support mode {mode}",
                self.info.unique_id
            )));
        };
        let mut commands = Vec::with_capacity(2);
        if let Some(ref switch) = self.switch_code {
            commands.push(DpCommand::new(switch, true));
        }
        commands.push(DpCommand::new(&self.mode_code, raw.clone()));
        Ok(commands)
    }

    fn confirm_mode(&mut self, mode: HvacMode) {
        if mode == HvacMode::Off && self.switch_code.is_some() {
            self.switch_on = Some(false);
            return;
        }
        if self.switch_code.is_some() {
            self.switch_on = Some(true);
        }
        if let Some(raw) = self.modes.get(&mode) {
            self.mode_value = Some(raw.clone());
        }
    }

    fn state(&self) -> Value {
        json!({
            "current_temperature": self.current_temperature,
            "target_temperature": self.target_temperature,
            "hvac_mode": self.hvac_mode().as_str(),
        })
    }
}

/// A registered entity: one variant per kind over the common capability set
/// (current value, raw update, command planning, optimistic confirmation).
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Switch(Switch),
    Sensor(Sensor),
    Number(Number),
    Climate(Climate),
    BinarySensor(BinarySensor),
    Select(Select),
}

impl Entity {
    pub fn from_spec(device: &Device, spec: &EntitySpec) -> Self {
        match spec {
            EntitySpec::Switch(s) => Entity::Switch(Switch::new(device, s)),
            EntitySpec::Sensor(s) => Entity::Sensor(Sensor::new(device, s)),
            EntitySpec::Number(s) => Entity::Number(Number::new(device, s)),
            EntitySpec::Climate(s) => Entity::Climate(Climate::new(device, s)),
            EntitySpec::BinarySensor(s) => Entity::BinarySensor(BinarySensor::new(device, s)),
            EntitySpec::Select(s) => Entity::Select(Select::new(device, s)),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Switch(_) => EntityKind::Switch,
            Entity::Sensor(_) => EntityKind::Sensor,
            Entity::Number(_) => EntityKind::Number,
            Entity::Climate(_) => EntityKind::Climate,
            Entity::BinarySensor(_) => EntityKind::BinarySensor,
            Entity::Select(_) => EntityKind::Select,
        }
    }

    pub fn info(&self) -> &EntityInfo {
        match self {
            Entity::Switch(e) => &e.info,
            Entity::Sensor(e) => &e.info,
            Entity::Number(e) => &e.info,
            Entity::Climate(e) => &e.info,
            Entity::BinarySensor(e) => &e.info,
            Entity::Select(e) => &e.info,
        }
    }

    /// Every data point code this entity listens to.
    pub fn codes(&self) -> Vec<&str> {
        match self {
            Entity::Switch(e) => vec![e.code.as_str()],
            Entity::Sensor(e) => vec![e.code.as_str()],
            Entity::Number(e) => vec![e.code.as_str()],
            Entity::BinarySensor(e) => vec![e.code.as_str()],
            Entity::Select(e) => vec![e.code.as_str()],
            Entity::Climate(e) => {
                let mut codes = vec![e.current_code.as_str()];
                codes.extend(e.target_code.as_deref());
                codes.push(e.mode_code.as_str());
                codes.extend(e.switch_code.as_deref());
                codes
            }
        }
    }

    pub fn is_passive(&self) -> bool {
        match self {
            Entity::Switch(e) => e.passive,
            Entity::Number(e) => e.passive,
            Entity::Climate(e) => e.passive,
            Entity::Select(e) => e.passive,
            Entity::Sensor(_) | Entity::BinarySensor(_) => false,
        }
    }

    /// The display value as published outward. `null` until the first update.
    pub fn current_value(&self) -> Value {
        match self {
            Entity::Switch(e) => e.is_on.map_or(Value::Null, Value::Bool),
            Entity::Sensor(e) => e.value.clone().unwrap_or(Value::Null),
            Entity::Number(e) => e.value.clone().unwrap_or(Value::Null),
            Entity::BinarySensor(e) => e.is_on.map_or(Value::Null, Value::Bool),
            Entity::Select(e) => e.current.clone().map_or(Value::Null, Value::String),
            Entity::Climate(e) => e.state(),
        }
    }

    /// Feed one raw data point through this entity's conversion rule.
    pub fn apply_raw(&mut self, code: &str, raw: &Value) {
        match self {
            Entity::Switch(e) => e.apply(raw),
            Entity::Sensor(e) => e.apply(raw),
            Entity::Number(e) => e.apply(raw),
            Entity::BinarySensor(e) => e.apply(raw),
            Entity::Select(e) => e.apply(raw),
            Entity::Climate(e) => e.apply(code, raw),
        }
        debug!(unique_id = %self.info().unique_id, code, raw = %raw, "entity updated");
    }

    /// Data point commands that carry out `command`, without side effects.
    pub fn plan(&self, command: &Command) -> Result<Vec<DpCommand>> {
        match (self, command) {
            (Entity::Switch(e), Command::TurnOn | Command::TurnOff) => {
                let on = *command == Command::TurnOn;
                Ok(vec![DpCommand::new(&e.code, e.wire_value(on))])
            }
            (Entity::Number(e), Command::SetValue(v)) => e.plan(*v),
            (Entity::Select(e), Command::SelectOption(label)) => match e.key_for(label) {
                Some(key) => Ok(vec![DpCommand::new(&e.code, key)]),
                None => Err(Error::InvalidCommand(format!(
                    "unknown option {label:?} for {}",
                    e.info.unique_id
                ))),
            },
            (Entity::Climate(e), Command::SetTemperature(t)) => e.plan_temperature(*t),
            (Entity::Climate(e), Command::SetHvacMode(mode)) => e.plan_mode(*mode),
            (entity, command) => Err(Error::InvalidCommand(format!(
                "{command:?} not supported by {} {}",
                entity.kind().as_str(),
                entity.info().unique_id
            ))),
        }
    }

    /// Optimistic local update after a command was accepted.
    pub fn confirm(&mut self, command: &Command) {
        match (self, command) {
            (Entity::Switch(e), Command::TurnOn) => e.is_on = Some(true),
            (Entity::Switch(e), Command::TurnOff) => e.is_on = Some(false),
            (Entity::Number(e), Command::SetValue(v)) => e.value = Some(json!(v)),
            (Entity::Select(e), Command::SelectOption(label)) => e.current = Some(label.clone()),
            (Entity::Climate(e), Command::SetTemperature(t)) => {
                e.target_temperature = Some(json!(t));
            }
            (Entity::Climate(e), Command::SetHvacMode(mode)) => e.confirm_mode(*mode),
            _ => {}
        }
    }

    pub fn update_for(&self, code: &str) -> EntityUpdate {
        let info = self.info();
        EntityUpdate {
            device_id: info.device_id.clone(),
            code: code.to_string(),
            unique_id: info.unique_id.clone(),
            kind: self.kind(),
            value: self.current_value(),
        }
    }

    pub fn as_switch(&self) -> Option<&Switch> {
        match self {
            Entity::Switch(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_climate(&self) -> Option<&Climate> {
        match self {
            Entity::Climate(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_select(&self) -> Option<&Select> {
        match self {
            Entity::Select(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_binary_sensor(&self) -> Option<&BinarySensor> {
        match self {
            Entity::BinarySensor(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceCatalog;

    fn device(entities_yaml: &str) -> Device {
        let yaml = format!("devices:\n  - tuya_device_id: dev1\n    entities:\n{entities_yaml}");
        DeviceCatalog::from_yaml_str(&yaml).unwrap().devices()[0].clone()
    }

    fn first_entity(entities_yaml: &str) -> Entity {
        let device = device(entities_yaml);
        Entity::from_spec(&device, &device.entities[0])
    }

    const CLIMATE: &str = r#"
      - platform: climate
        name: Living Room
        temp_convert: c_to_f
        current_temperature: { code: temp_current }
        target_temperature: { code: temp_set, min_temp: 40, max_temp: 90 }
        hvac_mode: { code: mode, modes: { heat: hot, cool: cold } }
        on_off: { code: switch }
"#;

    #[test]
    fn sanitize_and_names() {
        assert_eq!(sanitize("Switch 1"), "switch_1");
        assert_eq!(sanitize("temp-current!!"), "temp_current_");
        assert_eq!(title_case("switch_led"), "Switch Led");
    }

    #[test]
    fn unique_id_from_device_and_code() {
        let e = first_entity("      - platform: switch\n        code: Switch 1\n");
        assert_eq!(e.info().unique_id, "dev1_switch_1");
        assert_eq!(e.info().name, "Switch 1");
    }

    #[test]
    fn select_round_trip() {
        let mut e = first_entity(
            "      - platform: select\n        code: level\n        options: { \"0\": Low, \"1\": High }\n",
        );
        e.apply_raw("level", &json!("1"));
        assert_eq!(e.current_value(), json!("High"));

        let plan = e.plan(&Command::SelectOption("High".into())).unwrap();
        assert_eq!(plan, vec![DpCommand::new("level", "1")]);
        assert!(e.plan(&Command::SelectOption("Turbo".into())).is_err());
    }

    #[test]
    fn select_unknown_key_shown_raw() {
        let mut e = first_entity(
            "      - platform: select\n        code: level\n        options: { \"0\": Low }\n",
        );
        e.apply_raw("level", &json!(7));
        assert_eq!(e.as_select().unwrap().current_option(), Some("7"));
    }

    #[test]
    fn integer_select_sends_number() {
        let e = first_entity(
            "      - platform: select\n        code: level\n        type: integer\n        options: { 0: Low, 1: High }\n",
        );
        let plan = e.plan(&Command::SelectOption("Low".into())).unwrap();
        assert_eq!(plan[0].value, json!(0));
    }

    #[test]
    fn climate_scale_and_conversion() {
        let mut e = first_entity(CLIMATE);
        e.apply_raw("temp_current", &json!(215));
        assert_eq!(e.as_climate().unwrap().current_temperature(), Some(70.7));

        let plain = first_entity(
            r#"
      - platform: climate
        current_temperature: { code: temp_current }
        hvac_mode: { code: mode, modes: { heat: hot } }
"#,
        );
        let mut plain = plain;
        plain.apply_raw("temp_current", &json!(215));
        assert_eq!(plain.as_climate().unwrap().current_temperature(), Some(21.5));
    }

    #[test]
    fn climate_codes_fan_in() {
        let e = first_entity(CLIMATE);
        assert_eq!(e.codes(), vec!["temp_current", "temp_set", "mode", "switch"]);
        assert_eq!(e.info().unique_id, "dev1_living_room");
    }

    #[test]
    fn climate_mode_lookup_and_switch_override() {
        let mut e = first_entity(CLIMATE);
        assert_eq!(e.as_climate().unwrap().hvac_mode(), HvacMode::Off);

        e.apply_raw("mode", &json!("cold"));
        e.apply_raw("switch", &json!(true));
        assert_eq!(e.as_climate().unwrap().hvac_mode(), HvacMode::Cool);

        e.apply_raw("switch", &json!(false));
        assert_eq!(e.as_climate().unwrap().hvac_mode(), HvacMode::Off);

        e.apply_raw("switch", &json!(true));
        e.apply_raw("mode", &json!("unknown"));
        assert_eq!(e.as_climate().unwrap().hvac_mode(), HvacMode::Off);
    }

    #[test]
    fn climate_commands() {
        let e = first_entity(CLIMATE);
        let plan = e.plan(&Command::SetTemperature(70.7)).unwrap();
        assert_eq!(plan, vec![DpCommand::new("temp_set", 215)]);
        assert!(e.plan(&Command::SetTemperature(120.0)).is_err());

        let plan = e.plan(&Command::SetHvacMode(HvacMode::Heat)).unwrap();
        assert_eq!(
            plan,
            vec![DpCommand::new("switch", true), DpCommand::new("mode", "hot")]
        );
        let plan = e.plan(&Command::SetHvacMode(HvacMode::Off)).unwrap();
        assert_eq!(plan, vec![DpCommand::new("switch", false)]);
        assert!(e.plan(&Command::SetHvacMode(HvacMode::Dry)).is_err());
    }

    #[test]
    fn climate_confirm_is_optimistic() {
        let mut e = first_entity(CLIMATE);
        e.confirm(&Command::SetHvacMode(HvacMode::Heat));
        e.confirm(&Command::SetTemperature(68.0));
        let c = e.as_climate().unwrap();
        assert_eq!(c.hvac_mode(), HvacMode::Heat);
        assert_eq!(c.target_temperature(), Some(68.0));
        assert_eq!(e.current_value()["hvac_mode"], "heat");
    }

    #[test]
    fn binary_sensor_on_value() {
        let mut e = first_entity(
            "      - platform: binary_sensor\n        code: door\n        on_value: \"ON\"\n",
        );
        e.apply_raw("door", &json!("OFF"));
        assert_eq!(e.as_binary_sensor().unwrap().is_on(), Some(false));
        e.apply_raw("door", &json!("ON"));
        assert_eq!(e.as_binary_sensor().unwrap().is_on(), Some(true));
    }

    #[test]
    fn binary_sensor_label() {
        let mut e = first_entity(
            "      - platform: binary_sensor\n        code: state\n        on_value: 1\n        translation: { 0: Closed, 1: Open }\n",
        );
        e.apply_raw("state", &json!(1));
        let b = e.as_binary_sensor().unwrap();
        assert_eq!(b.is_on(), Some(true));
        assert_eq!(b.label(), Some(&json!("Open")));
    }

    #[test]
    fn switch_wire_types() {
        let e = first_entity("      - platform: switch\n        code: s\n        type: integer\n");
        assert_eq!(e.plan(&Command::TurnOn).unwrap()[0].value, json!(1));
        let e = first_entity("      - platform: switch\n        code: s\n");
        assert_eq!(e.plan(&Command::TurnOff).unwrap()[0].value, json!(false));
        let e = first_entity(
            "      - platform: switch\n        code: s\n        type: enum\n        on_value: open\n",
        );
        assert_eq!(e.plan(&Command::TurnOn).unwrap()[0].value, json!("open"));
    }

    #[test]
    fn switch_state_from_raw() {
        let mut e = first_entity("      - platform: switch\n        code: s\n        type: enum\n");
        e.apply_raw("s", &json!("off"));
        assert_eq!(e.as_switch().unwrap().is_on(), Some(false));
        e.apply_raw("s", &json!("on"));
        assert_eq!(e.as_switch().unwrap().is_on(), Some(true));
    }

    #[test]
    fn boolean_switch_defaults_to_on_value_true() {
        let mut e = first_entity("      - platform: switch\n        code: s\n");
        e.apply_raw("s", &json!("false"));
        assert_eq!(e.as_switch().unwrap().is_on(), Some(false));
        e.apply_raw("s", &json!(2));
        assert_eq!(e.as_switch().unwrap().is_on(), Some(false));
        e.apply_raw("s", &json!(true));
        assert_eq!(e.as_switch().unwrap().is_on(), Some(true));
        e.apply_raw("s", &json!("true"));
        assert_eq!(e.as_switch().unwrap().is_on(), Some(true));
    }

    #[test]
    fn climate_string_false_power_forces_off() {
        let mut e = first_entity(CLIMATE);
        e.apply_raw("mode", &json!("hot"));
        e.apply_raw("switch", &json!("false"));
        assert_eq!(e.as_climate().unwrap().hvac_mode(), HvacMode::Off);
        e.apply_raw("switch", &json!(2));
        assert_eq!(e.as_climate().unwrap().hvac_mode(), HvacMode::Off);
        e.apply_raw("switch", &json!(true));
        assert_eq!(e.as_climate().unwrap().hvac_mode(), HvacMode::Heat);
    }

    #[test]
    fn sensor_float_default_scale_and_total() {
        let mut e = first_entity("      - platform: sensor\n        code: t\n        type: float\n");
        e.apply_raw("t", &json!(215));
        assert_eq!(e.current_value(), json!(21.5));
        e.apply_raw("t", &json!("not a number"));
        assert_eq!(e.current_value(), json!("not a number"));
    }

    #[test]
    fn sensor_translation_and_bitfield() {
        let mut e = first_entity(
            "      - platform: sensor\n        code: work\n        translation: { heating: Heating }\n",
        );
        e.apply_raw("work", &json!("heating"));
        assert_eq!(e.current_value(), json!("Heating"));

        let mut e = first_entity(
            "      - platform: sensor\n        code: fault\n        type: bitfield\n        translation: { 0: E1, 1: E2 }\n",
        );
        e.apply_raw("fault", &json!(2));
        assert_eq!(e.current_value(), json!(["E2"]));
    }

    #[test]
    fn number_range_and_scale() {
        let mut e = first_entity(
            "      - platform: number\n        code: level\n        min: 0\n        max: 10\n        scale: 10\n",
        );
        e.apply_raw("level", &json!(55));
        assert_eq!(e.current_value(), json!(5.5));
        assert_eq!(e.plan(&Command::SetValue(2.5)).unwrap()[0].value, json!(25));
        assert!(e.plan(&Command::SetValue(11.0)).is_err());
    }

    #[test]
    fn read_only_kinds_reject_commands() {
        let e = first_entity("      - platform: sensor\n        code: t\n");
        let err = e.plan(&Command::TurnOn).unwrap_err();
        assert!(matches!(err, Error::InvalidCommand(_)));
    }
}
