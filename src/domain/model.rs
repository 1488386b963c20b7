use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Declarative definition of one application revision (`config.json`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub files: Vec<AppFile>,
    #[serde(default)]
    pub variables: Vec<AppVariable>,
    #[serde(default)]
    pub extension_values: Vec<ExtensionValue>,
    // Fields owned by the save path, carried through untouched into current.config.json
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppFile {
    pub id: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppVariable {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionValue {
    pub extension: String,
    #[serde(alias = "extensionAppID")]
    pub extension_app_id: String,
}

/// A live container as reported by the inspector. Never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: String,
    pub name: String,
    pub raw_state: String,
    pub exit_code: i64,
    pub ports: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerStatusCode {
    Active,
    Idle,
    Restarting,
    Problematic,
    Stopped,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    #[serde(flatten)]
    pub container: Container,
    pub status_code: ContainerStatusCode,
}

/// Application level status, computed on demand from the live containers.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStatus {
    pub app_id: String,
    pub app_name: String,
    pub containers: Vec<ContainerStatus>,
    pub status_code: ContainerStatusCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_keeps_unknown_fields() {
        let raw = r#"{
            "id": "a1",
            "name": "wiki",
            "files": [{"id": "f1", "filename": "docker-compose.yml", "origin": "template"}],
            "variables": [{"id": "v1", "name": "port"}],
            "extensionValues": [{"extension": "proxy", "extensionAppID": "a2"}],
            "icon": "wiki.svg"
        }"#;
        let config: AppConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.files[0].filename, "docker-compose.yml");
        assert_eq!(config.extension_values[0].extension_app_id, "a2");
        assert_eq!(config.extra.get("icon"), Some(&Value::from("wiki.svg")));

        let written = serde_json::to_value(&config).unwrap();
        assert_eq!(written["icon"], "wiki.svg");
        assert_eq!(written["extensionValues"][0]["extensionAppId"], "a2");
    }

    #[test]
    fn config_without_optional_lists() {
        let config: AppConfig = serde_json::from_str(r#"{"id": "a1", "name": "wiki"}"#).unwrap();
        assert!(config.files.is_empty());
        assert!(config.variables.is_empty());
        assert!(config.extension_values.is_empty());
    }
}
