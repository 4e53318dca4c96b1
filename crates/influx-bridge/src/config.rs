// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Host parameters, setting resolution and YAML configuration.
//!
//! The host hands each shell a flat string map. Connection settings may be
//! given directly or, with `UseVariables`, as names of host variables; the
//! token is always passed through the secret port for decryption.

use crate::client::buffer::DEFAULT_BATCH_SIZE;
use crate::ports::{PortError, SecretResolver};
use crate::value::Attribute;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const URL: &str = "URL";
pub const TOKEN: &str = "Token";
pub const ORG: &str = "Org";
pub const BUCKET: &str = "Bucket";
pub const READ_WRITE_TIMEOUT: &str = "ReadWriteTimeout";
pub const SOCKET_TIMEOUT: &str = "SocketTimeout";
pub const ENABLE_GZIP: &str = "EnableGZip";
pub const USE_VARIABLES: &str = "UseVariables";
pub const FIELD_MAPPINGS: &str = "FieldMappings";
pub const TAG_MAPPINGS: &str = "TagMappings";
pub const MEASUREMENT: &str = "Measurement";
pub const FIELD_KEY: &str = "FieldKey";
pub const LOOKBACK_SECONDS: &str = "LookbackSeconds";
pub const BATCH_SIZE: &str = "BatchSize";

/// Prefix of the parameter naming the host variable for a setting.
pub const VARIABLE_PREFIX: &str = "v";

/// Input attribute of mapped events carrying the measurement name.
pub const MEASUREMENT_TITLE: &str = "MeasurementTitle";

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_LOOKBACK_SECS: u64 = 3600;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0} is not specified")]
    Missing(&'static str),

    #[error("{key} must be a positive whole number, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} must be true or false, got '{value}'")]
    InvalidFlag { key: &'static str, value: String },

    #[error("secret resolution failed: {0}")]
    Secret(#[from] PortError),
}

/// Flat host parameter map.
///
/// Missing keys read as the empty string. When deserialised from YAML,
/// scalar values are stringified and sequences/maps (typically mapping
/// grids written inline) are stored as their JSON text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Parameters {
    values: IndexMap<String, String>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `key`, or `""` when absent.
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Lenient boolean read: anything other than a case-insensitive `true`
    /// is false.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).trim().eq_ignore_ascii_case("true")
    }

    pub fn use_variables(&self) -> bool {
        self.flag(USE_VARIABLES)
    }
}

impl FromIterator<(String, String)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl<'de> Deserialize<'de> for Parameters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = IndexMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(k, v)| -> Result<(String, String), D::Error> {
                let text = match v {
                    serde_yaml::Value::Null => String::new(),
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    serde_yaml::Value::Number(n) => n.to_string(),
                    other => serde_json::to_string(&other).map_err(serde::de::Error::custom)?,
                };
                Ok((k, text))
            })
            .collect()
    }
}

/// Resolves connection settings from parameters through the secret port.
pub struct SettingResolver<'a> {
    params: &'a Parameters,
    secrets: &'a dyn SecretResolver,
}

impl<'a> SettingResolver<'a> {
    pub fn new(params: &'a Parameters, secrets: &'a dyn SecretResolver) -> Self {
        Self { params, secrets }
    }

    pub fn url(&self) -> Result<String, PortError> {
        self.plain(URL)
    }

    pub fn org(&self) -> Result<String, PortError> {
        self.plain(ORG)
    }

    /// The token is always decrypted, whether given directly or through a
    /// variable.
    pub fn token(&self) -> Result<String, PortError> {
        let raw = self.plain(TOKEN)?;
        if raw.is_empty() {
            return Ok(raw);
        }
        self.secrets.decrypt(&raw)
    }

    /// Direct value, or the host variable it names when `UseVariables` is set.
    fn plain(&self, key: &str) -> Result<String, PortError> {
        if self.params.use_variables() {
            let name = self.params.get(&format!("{}{}", VARIABLE_PREFIX, key));
            if name.trim().is_empty() {
                return Ok(String::new());
            }
            self.secrets.resolve_variable(name)
        } else {
            Ok(self.params.get(key).to_string())
        }
    }
}

/// Resolved connection to the store.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub url: String,
    pub token: String,
    pub org: String,
    pub read_write_timeout: Duration,
    pub socket_timeout: Duration,
    pub enable_gzip: bool,
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("org", &self.org)
            .field("read_write_timeout", &self.read_write_timeout)
            .field("socket_timeout", &self.socket_timeout)
            .field("enable_gzip", &self.enable_gzip)
            .finish()
    }
}

impl ConnectionSettings {
    pub fn resolve(params: &Parameters, secrets: &dyn SecretResolver) -> Result<Self, ConfigError> {
        let resolver = SettingResolver::new(params, secrets);
        Ok(Self {
            url: required(URL, resolver.url()?)?,
            token: required(TOKEN, resolver.token()?)?,
            org: required(ORG, resolver.org()?)?,
            read_write_timeout: seconds(params, READ_WRITE_TIMEOUT, DEFAULT_TIMEOUT_SECS)?,
            socket_timeout: seconds(params, SOCKET_TIMEOUT, DEFAULT_TIMEOUT_SECS)?,
            enable_gzip: flag_or(params, ENABLE_GZIP, true)?,
        })
    }
}

/// Settings of the writer shell.
#[derive(Debug, Clone)]
pub struct WriterSettings {
    pub connection: ConnectionSettings,
    pub bucket: String,
    pub tag_grid: String,
    pub field_grid: String,
    /// Points per write request.
    pub batch_size: usize,
}

impl WriterSettings {
    pub fn resolve(params: &Parameters, secrets: &dyn SecretResolver) -> Result<Self, ConfigError> {
        Ok(Self {
            connection: ConnectionSettings::resolve(params, secrets)?,
            bucket: required(BUCKET, params.get(BUCKET).to_string())?,
            tag_grid: params.get(TAG_MAPPINGS).to_string(),
            field_grid: params.get(FIELD_MAPPINGS).to_string(),
            batch_size: whole(params, BATCH_SIZE)?.map_or(DEFAULT_BATCH_SIZE, |n| n as usize),
        })
    }
}

/// Settings of the reader shell.
#[derive(Debug, Clone)]
pub struct ReaderSettings {
    pub connection: ConnectionSettings,
    pub bucket: String,
    pub measurement: String,
    pub field_key: String,
    pub tag_grid: String,
    pub field_grid: String,
    /// How far back the first poll reaches.
    pub lookback: Duration,
}

impl ReaderSettings {
    pub fn resolve(params: &Parameters, secrets: &dyn SecretResolver) -> Result<Self, ConfigError> {
        Ok(Self {
            connection: ConnectionSettings::resolve(params, secrets)?,
            bucket: params.get(BUCKET).to_string(),
            measurement: required(MEASUREMENT, params.get(MEASUREMENT).to_string())?,
            field_key: params.get(FIELD_KEY).to_string(),
            tag_grid: params.get(TAG_MAPPINGS).to_string(),
            field_grid: params.get(FIELD_MAPPINGS).to_string(),
            lookback: seconds(params, LOOKBACK_SECONDS, DEFAULT_LOOKBACK_SECS)?,
        })
    }
}

fn required(key: &'static str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Missing(key))
    } else {
        Ok(value)
    }
}

fn seconds(params: &Parameters, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(whole(params, key)?.unwrap_or(default)))
}

/// Positive whole number, `None` when unset.
fn whole(params: &Parameters, key: &'static str) -> Result<Option<u64>, ConfigError> {
    let raw = params.get(key).trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<u64>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(ConfigError::InvalidNumber {
            key,
            value: raw.to_string(),
        }),
    }
}

fn flag_or(params: &Parameters, key: &'static str, default: bool) -> Result<bool, ConfigError> {
    let raw = params.get(key).trim();
    if raw.is_empty() {
        Ok(default)
    } else if raw.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ConfigError::InvalidFlag {
            key,
            value: raw.to_string(),
        })
    }
}

/// YAML file consumed by the command-line tool.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeFile {
    /// Writer parameters.
    #[serde(default)]
    pub writer: Option<Parameters>,
    /// Reader parameters.
    #[serde(default)]
    pub reader: Option<Parameters>,
    /// Upstream attributes standing in for host discovery.
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl BridgeFile {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: BridgeFile = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Parse configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}
