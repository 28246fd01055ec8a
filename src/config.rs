use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::signing::Credentials;
use crate::types::{DpType, HvacMode, TempConvert};
use crate::{Error, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
/// Used when `poll_interval` is present but unusable.
pub const FALLBACK_POLL_INTERVAL: Duration = Duration::from_secs(3600);
pub const DEFAULT_TOKEN_REFRESH_MINUTES: u64 = 110;
/// Upper bound for the scheduled refresh; tokens live two hours.
const MAX_TOKEN_REFRESH: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_CLIMATE_SCALE: f64 = 10.0;
pub const DEFAULT_FLOAT_SCALE: f64 = 10.0;

// -- Secrets --

#[derive(Debug, Deserialize)]
struct RawSecrets {
    client_id: Option<String>,
    client_secret: Option<String>,
    base_url: Option<String>,
    token_refresh: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Secrets {
    pub credentials: Credentials,
    pub base_url: String,
    pub token_refresh: Duration,
}

fn default_token_refresh() -> Duration {
    Duration::from_secs(DEFAULT_TOKEN_REFRESH_MINUTES * 60)
}

impl Secrets {
    pub fn new(credentials: Credentials, base_url: impl Into<String>) -> Self {
        Self {
            credentials,
            base_url: base_url.into(),
            token_refresh: default_token_refresh(),
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let raw: Option<RawSecrets> = serde_yaml::from_str(text)?;
        let raw = raw.ok_or_else(|| Error::Config("secrets document is empty".into()))?;

        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let (Some(client_id), Some(client_secret), Some(base_url)) = (
            non_empty(raw.client_id),
            non_empty(raw.client_secret),
            non_empty(raw.base_url),
        ) else {
            return Err(Error::Config(
                "missing client_id, client_secret or base_url".into(),
            ));
        };

        let token_refresh = match raw.token_refresh {
            None => default_token_refresh(),
            Some(minutes) => match minutes.checked_mul(60).map(Duration::from_secs) {
                Some(every) if !every.is_zero() && every <= MAX_TOKEN_REFRESH => every,
                _ => {
                    warn!(minutes, "token_refresh out of range, using default");
                    default_token_refresh()
                }
            },
        };

        Ok(Self {
            credentials: Credentials::new(client_id, client_secret),
            base_url,
            token_refresh,
        })
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("cannot read secrets {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }
}

// -- Entity descriptors --

fn default_true() -> bool {
    true
}

fn default_boolean() -> DpType {
    DpType::Boolean
}

fn default_integer() -> DpType {
    DpType::Integer
}

fn default_enum() -> DpType {
    DpType::Enum
}

fn default_climate_scale() -> f64 {
    DEFAULT_CLIMATE_SCALE
}

fn default_min_temp() -> f64 {
    10.0
}

fn default_max_temp() -> f64 {
    35.0
}

fn default_precision() -> f64 {
    1.0
}

fn scalar_text(v: &serde_yaml::Value) -> Option<String> {
    match v {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Translation tables and select options: scalar keys and labels, order kept.
fn scalar_table<'de, D>(deserializer: D) -> std::result::Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let mapping = serde_yaml::Mapping::deserialize(deserializer)?;
    mapping
        .iter()
        .map(|(k, v)| match (scalar_text(k), scalar_text(v)) {
            (Some(k), Some(v)) => Ok((k, v)),
            _ => Err(D::Error::custom("table keys and labels must be scalars")),
        })
        .collect()
}

fn optional_scalar_table<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<IndexMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    scalar_table(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SwitchSpec {
    pub code: String,
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, alias = "is_passive_entity")]
    pub passive: bool,
    #[serde(rename = "type", default = "default_boolean")]
    pub dp_type: DpType,
    pub on_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SensorSpec {
    pub code: String,
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(rename = "type")]
    pub dp_type: Option<DpType>,
    pub scale: Option<f64>,
    pub temp_convert: Option<TempConvert>,
    #[serde(default, deserialize_with = "optional_scalar_table")]
    pub translation: Option<IndexMap<String, String>>,
    pub unit_of_measurement: Option<String>,
    pub device_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NumberSpec {
    pub code: String,
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, alias = "is_passive_entity")]
    pub passive: bool,
    #[serde(rename = "type", default = "default_integer")]
    pub dp_type: DpType,
    #[serde(alias = "min_value")]
    pub min: Option<f64>,
    #[serde(alias = "max_value")]
    pub max: Option<f64>,
    #[serde(alias = "step_size")]
    pub step: Option<f64>,
    pub scale: Option<f64>,
    pub unit_of_measurement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinarySensorSpec {
    pub code: String,
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(rename = "type", default = "default_boolean")]
    pub dp_type: DpType,
    pub on_value: Option<Value>,
    #[serde(default, deserialize_with = "optional_scalar_table")]
    pub translation: Option<IndexMap<String, String>>,
    pub device_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SelectSpec {
    pub code: String,
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, alias = "is_passive_entity")]
    pub passive: bool,
    #[serde(rename = "type", default = "default_enum")]
    pub dp_type: DpType,
    #[serde(deserialize_with = "scalar_table")]
    pub options: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DpRef {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TargetTemperatureSpec {
    pub code: String,
    #[serde(default = "default_min_temp")]
    pub min_temp: f64,
    #[serde(default = "default_max_temp")]
    pub max_temp: f64,
    #[serde(default = "default_precision")]
    pub precision: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HvacModeSpec {
    pub code: String,
    /// Abstract mode → raw value the device uses for it.
    pub modes: IndexMap<HvacMode, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClimateSpec {
    pub name: Option<String>,
    pub unique_id: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, alias = "is_passive_entity")]
    pub passive: bool,
    #[serde(default = "default_climate_scale")]
    pub scale: f64,
    pub temp_convert: Option<TempConvert>,
    pub current_temperature: DpRef,
    pub target_temperature: Option<TargetTemperatureSpec>,
    pub hvac_mode: HvacModeSpec,
    pub on_off: Option<DpRef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum EntitySpec {
    Switch(SwitchSpec),
    Sensor(SensorSpec),
    Number(NumberSpec),
    Climate(ClimateSpec),
    BinarySensor(BinarySensorSpec),
    Select(SelectSpec),
}

fn check_scale(scale: Option<f64>) -> std::result::Result<(), String> {
    match scale {
        Some(s) if !(s.is_finite() && s > 0.0) => Err(format!("scale must be positive, got {s}")),
        _ => Ok(()),
    }
}

impl EntitySpec {
    pub fn enabled(&self) -> bool {
        match self {
            EntitySpec::Switch(s) => s.enabled,
            EntitySpec::Sensor(s) => s.enabled,
            EntitySpec::Number(s) => s.enabled,
            EntitySpec::Climate(s) => s.enabled,
            EntitySpec::BinarySensor(s) => s.enabled,
            EntitySpec::Select(s) => s.enabled,
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        match self {
            EntitySpec::Sensor(s) => check_scale(s.scale),
            EntitySpec::Number(n) => {
                check_scale(n.scale)?;
                if let (Some(min), Some(max)) = (n.min, n.max)
                    && min > max
                {
                    return Err(format!("min {min} is above max {max}"));
                }
                Ok(())
            }
            EntitySpec::Select(s) if s.options.is_empty() => {
                Err(format!("select {} has no options", s.code))
            }
            EntitySpec::Climate(c) => {
                check_scale(Some(c.scale))?;
                if c.hvac_mode.modes.is_empty() {
                    return Err("climate hvac_mode must define at least one mode".into());
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

// -- Devices --

#[derive(Debug, Deserialize)]
struct RawDevice {
    tuya_device_id: Option<String>,
    #[serde(alias = "ha_name")]
    friendly_name: Option<String>,
    #[serde(default = "default_true")]
    enabled: bool,
    poll_interval: Option<serde_yaml::Value>,
    tuya_product_id: Option<String>,
    tuya_category: Option<String>,
    #[serde(default, alias = "dps")]
    entities: Vec<serde_yaml::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    devices: Vec<RawDevice>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub poll_interval: Duration,
    pub product_id: Option<String>,
    pub category: Option<String>,
    pub entities: Vec<EntitySpec>,
}

fn resolve_poll_interval(raw: Option<&serde_yaml::Value>, device_id: &str) -> Duration {
    match raw {
        None | Some(serde_yaml::Value::Null) => DEFAULT_POLL_INTERVAL,
        Some(v) => match v
            .as_f64()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .filter(|d| !d.is_zero())
        {
            Some(every) => every,
            None => {
                warn!(
                    device_id,
                    fallback = FALLBACK_POLL_INTERVAL.as_secs(),
                    "invalid poll_interval, using fallback"
                );
                FALLBACK_POLL_INTERVAL
            }
        },
    }
}

fn parse_entities(device_id: &str, blocks: Vec<serde_yaml::Value>) -> Vec<EntitySpec> {
    let mut entities = Vec::with_capacity(blocks.len());
    for block in blocks {
        let spec: EntitySpec = match serde_yaml::from_value(block) {
            Ok(spec) => spec,
            Err(e) => {
                error!(device_id, error = %e, "invalid entity block, skipping");
                continue;
            }
        };
        if let Err(reason) = spec.validate() {
            error!(device_id, %reason, "invalid entity block, skipping");
            continue;
        }
        if spec.enabled() {
            entities.push(spec);
        }
    }
    entities
}

/// All configured devices. Device IDs are unique; a duplicate rejects the
/// whole catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceCatalog {
    devices: Vec<Device>,
}

impl DeviceCatalog {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Self::from_documents([text])
    }

    fn from_documents<'a>(docs: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut devices = Vec::new();

        for doc in docs {
            let raw: Option<RawCatalog> = serde_yaml::from_str(doc)?;
            for raw_device in raw.unwrap_or_default().devices {
                let Some(id) = raw_device.tuya_device_id.filter(|id| !id.trim().is_empty()) else {
                    error!("device block without tuya_device_id, skipping");
                    continue;
                };
                if !seen.insert(id.clone()) {
                    error!(device_id = %id, "duplicate tuya_device_id, rejecting configuration");
                    return Err(Error::DuplicateDevice(id));
                }

                let entities = parse_entities(&id, raw_device.entities);
                if entities.is_empty() {
                    warn!(device_id = %id, "no valid entities, device excluded");
                    continue;
                }

                let poll_interval = resolve_poll_interval(raw_device.poll_interval.as_ref(), &id);
                info!(device_id = %id, entities = entities.len(), "device loaded");
                devices.push(Device {
                    name: raw_device.friendly_name.unwrap_or_else(|| id.clone()),
                    id,
                    enabled: raw_device.enabled,
                    poll_interval,
                    product_id: raw_device.tuya_product_id,
                    category: raw_device.tuya_category,
                    entities,
                });
            }
        }

        Ok(Self { devices })
    }

    /// Load a single YAML file, or every `*.yaml`/`*.yml` file of a
    /// directory in name order.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path).await.map_err(|e| {
            Error::Config(format!("cannot read devices {}: {e}", path.display()))
        })?;

        if !meta.is_dir() {
            let text = tokio::fs::read_to_string(path).await?;
            return Self::from_yaml_str(&text);
        }

        let mut files = Vec::new();
        let mut dir = tokio::fs::read_dir(path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let file = entry.path();
            let is_yaml = file
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            if is_yaml {
                files.push(file);
            }
        }
        files.sort();

        let mut docs = Vec::with_capacity(files.len());
        for file in &files {
            docs.push(tokio::fs::read_to_string(file).await?);
        }
        Self::from_documents(docs.iter().map(String::as_str))
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.enabled)
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
