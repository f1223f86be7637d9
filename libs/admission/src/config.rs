use crate::error::{Error, Result};

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Admission configuration file: the ordered list of enabled plugins.
///
/// Accepts YAML or JSON.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct AdmissionConfig {
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PluginConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
}

impl AdmissionConfig {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        serde_yaml::from_reader(reader).map_err(|e| {
            Error::ConfigDecodeError("Error decoding admission configuration".to_string(), e)
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::IoError(
                format!("Error opening admission configuration {}", path.display()),
                e,
            )
        })?;
        Self::from_reader(file)
    }
}

impl FromStr for AdmissionConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_reader(s.as_bytes())
    }
}

/// Decode an optional plugin configuration, falling back to the default when absent.
pub fn decode_plugin_config<T>(plugin: &str, config: Option<Value>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match config {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| {
            Error::PluginConfigError(format!("Error decoding configuration for {plugin}"), e)
        }),
    }
}
