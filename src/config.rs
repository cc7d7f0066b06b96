use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration, loaded from a JSON file. Every field has a
/// default so an empty object is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the local dataset (directory-backed store).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// File containing the bearer token, one line. Missing file means
    /// offline.
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default)]
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_upload_base")]
    pub upload_base: String,
    /// Well-known application folder name at the remote store root.
    #[serde(default = "default_root_folder_name")]
    pub root_folder_name: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./fieldlog-data")
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("./fieldlog-token")
}

fn default_api_base() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}

fn default_upload_base() -> String {
    "https://www.googleapis.com/upload/drive/v3".to_string()
}

fn default_root_folder_name() -> String {
    "FieldLog".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            credentials_path: default_credentials_path(),
            remote: RemoteConfig::default(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            upload_base: default_upload_base(),
            root_folder_name: default_root_folder_name(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_valid() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.remote.root_folder_name, "FieldLog");
        assert!(config.remote.api_base.starts_with("https://"));
    }

    #[test]
    fn test_partial_override() {
        let json = r#"{
            "data_dir": "/tmp/obs",
            "remote": { "root_folder_name": "Surveys" }
        }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/obs"));
        assert_eq!(config.remote.root_folder_name, "Surveys");
        // Unset remote fields keep their defaults
        assert!(config.remote.upload_base.contains("upload"));
    }
}
