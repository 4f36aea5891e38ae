// Configuration for models, process-wide settings and system directories

use super::error::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Role a model plays in the system
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModelType {
    Coordinator, // Plans and delegates
    Primary,     // Camina
    Belter,      // Specialist for focused work
    Drummer,     // Information gathering
    Observer,
    Custom(String),
}

impl ModelType {
    pub fn as_str(&self) -> &str {
        match self {
            ModelType::Coordinator => "coordinator",
            ModelType::Primary => "primary",
            ModelType::Belter => "belter",
            ModelType::Drummer => "drummer",
            ModelType::Observer => "observer",
            ModelType::Custom(name) => name,
        }
    }
}

impl From<String> for ModelType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "coordinator" => ModelType::Coordinator,
            "primary" => ModelType::Primary,
            "belter" => ModelType::Belter,
            "drummer" => ModelType::Drummer,
            "observer" => ModelType::Observer,
            _ => ModelType::Custom(value),
        }
    }
}

impl From<&str> for ModelType {
    fn from(value: &str) -> Self {
        ModelType::from(value.to_string())
    }
}

impl From<ModelType> for String {
    fn from(value: ModelType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a model can do and how it should be called
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub capabilities: Vec<String>,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Per-attempt timeout in seconds
    pub timeout: u64,
}

impl ModelCapabilities {
    pub fn new(capabilities: Vec<String>) -> Self {
        Self {
            capabilities,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout: default_timeout(),
        }
    }

    fn validate(&self, model_id: &str) -> Result<(), ModelError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ModelError::invalid_config(format!(
                "model {}: temperature {} is outside 0..=1",
                model_id, self.temperature
            )));
        }
        if self.timeout == 0 {
            return Err(ModelError::invalid_config(format!(
                "model {}: timeout must be greater than zero",
                model_id
            )));
        }
        if self.capabilities.iter().any(|c| c.trim().is_empty()) {
            return Err(ModelError::invalid_config(format!(
                "model {}: capability tags must not be empty",
                model_id
            )));
        }
        Ok(())
    }
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f64 {
    0.7
}

fn default_timeout() -> u64 {
    30
}

/// One model entry of models.yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_id: String,
    pub model_type: ModelType,
    pub base_model: String,
    pub endpoint: String,
    pub capabilities: ModelCapabilities,
}

impl ModelConfig {
    pub fn new(
        model_id: impl Into<String>,
        model_type: ModelType,
        base_model: impl Into<String>,
        endpoint: impl Into<String>,
        capabilities: ModelCapabilities,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            model_type,
            base_model: base_model.into(),
            endpoint: endpoint.into(),
            capabilities,
        }
    }

    /// Check field values the schema alone cannot express
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.model_id.trim().is_empty() {
            return Err(ModelError::invalid_config("model_id must not be empty"));
        }
        if self.base_model.trim().is_empty() {
            return Err(ModelError::invalid_config(format!(
                "model {}: base_model must not be empty",
                self.model_id
            )));
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(ModelError::invalid_config(format!(
                "model {}: endpoint {} is not an http(s) URL",
                self.model_id, self.endpoint
            )));
        }
        self.capabilities.validate(&self.model_id)
    }

    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.capabilities.iter().any(|c| c == tag)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.capabilities.timeout)
    }
}

/// Retry behaviour for model requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts per request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Upper bound for a single backoff, in seconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff: f64,

    /// Extra random delay as a fraction of the backoff (0 disables jitter)
    #[serde(default)]
    pub jitter: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_factor() -> f64 {
    1.5
}

/// Upper bound accepted for `retry_config.max_backoff`, one day
pub const MAX_BACKOFF_LIMIT: f64 = 86_400.0;

fn default_max_backoff() -> f64 {
    30.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
            max_backoff: default_max_backoff(),
            jitter: 0.0,
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<(), ModelError> {
        if self.max_retries == 0 {
            return Err(ModelError::invalid_config("retry_config.max_retries must be at least 1"));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 0.0 {
            return Err(ModelError::invalid_config("retry_config.backoff_factor must be >= 0"));
        }
        if !self.max_backoff.is_finite() || self.max_backoff < 0.0 {
            return Err(ModelError::invalid_config("retry_config.max_backoff must be >= 0"));
        }
        if self.max_backoff > MAX_BACKOFF_LIMIT {
            return Err(ModelError::invalid_config(format!(
                "retry_config.max_backoff must be at most {} seconds",
                MAX_BACKOFF_LIMIT
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ModelError::invalid_config("retry_config.jitter must be within 0..=1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_minute: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_hour: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSettings {
    #[serde(default)]
    pub enable_metrics: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecuritySettings {
    #[serde(default)]
    pub require_authentication: bool,
    /// Token lifetime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expiry: Option<u64>,
}

/// Process-wide settings, loaded once at startup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalSettings {
    pub retry_config: RetryConfig,
    pub rate_limits: RateLimits,
    pub monitoring: MonitoringSettings,
    pub security: SecuritySettings,
}

impl GlobalSettings {
    pub fn validate(&self) -> Result<(), ModelError> {
        self.retry_config.validate()
    }
}

/// On-disk layout of models.yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsFile {
    pub models: BTreeMap<String, ModelConfig>,
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl ModelsFile {
    pub fn from_yaml(contents: &str) -> Result<Self, ModelError> {
        let file: ModelsFile = serde_yaml::from_str(contents)
            .map_err(|e| ModelError::invalid_config(format!("malformed models file: {}", e)))?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        for (key, model) in &self.models {
            if key != &model.model_id {
                return Err(ModelError::invalid_config(format!(
                    "models entry {} declares model_id {}",
                    key, model.model_id
                )));
            }
            model.validate()?;
        }
        self.settings.validate()
    }
}

/// Directories the system reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPaths {
    pub config_dir: PathBuf,
    pub models_dir: PathBuf,
    pub tools_dir: PathBuf,
}

impl SystemPaths {
    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            config_dir: base.join("config"),
            models_dir: base.join("models"),
            tools_dir: base.join("tools"),
        }
    }

    /// Resolve the base directory: the current directory when it holds
    /// `config/models.yaml`, else the user config directory when that holds one.
    pub fn discover() -> Self {
        let local = PathBuf::from(".");
        if local.join("config").join(MODELS_FILE).exists() {
            return Self::new(local);
        }

        if let Some(home) = dirs::config_dir().map(|dir| dir.join("toollama")) {
            if home.join("config").join(MODELS_FILE).exists() {
                return Self::new(home);
            }
        }

        Self::new(local)
    }

    pub fn models_config(&self) -> PathBuf {
        self.config_dir.join(MODELS_FILE)
    }

    pub fn with_config_dir(mut self, dir: PathBuf) -> Self {
        self.config_dir = dir;
        self
    }

    pub fn with_models_dir(mut self, dir: PathBuf) -> Self {
        self.models_dir = dir;
        self
    }

    pub fn with_tools_dir(mut self, dir: PathBuf) -> Self {
        self.tools_dir = dir;
        self
    }
}

pub const MODELS_FILE: &str = "models.yaml";

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
models:
  test_model:
    model_id: test_model
    model_type: belter
    base_model: "mistral:7b"
    endpoint: http://localhost:8001/test
    capabilities:
      capabilities: [test_capability]
      max_tokens: 2048
      temperature: 0.4
      timeout: 30
"#;

    #[test]
    fn test_settings_default_when_absent() {
        let file = ModelsFile::from_yaml(VALID).unwrap();
        assert_eq!(file.settings, GlobalSettings::default());
        assert_eq!(file.settings.retry_config.max_retries, 3);
    }

    #[test]
    fn test_partial_settings_are_rejected() {
        let yaml = format!("{}settings:\n  retry_config:\n    max_retries: 3\n", VALID);
        let err = ModelsFile::from_yaml(&yaml).unwrap_err();
        assert!(err.is_invalid_config());
    }

    #[test]
    fn test_oversized_max_backoff_is_rejected() {
        let settings = "settings:
  retry_config:
    max_retries: 3
    backoff_factor: 1.0e20
    max_backoff: 1.0e20
  rate_limits:
    requests_per_minute: 60
  monitoring:
    enable_metrics: false
    log_level: INFO
  security:
    require_authentication: false
";
        let err = ModelsFile::from_yaml(&format!("{}{}", VALID, settings)).unwrap_err();
        assert!(err.to_string().contains("max_backoff"));

        let accepted = settings.replace("max_backoff: 1.0e20", "max_backoff: 60");
        let file = ModelsFile::from_yaml(&format!("{}{}", VALID, accepted)).unwrap();
        let policy = crate::orchestration::retry::RetryPolicy::from(&file.settings.retry_config);
        assert_eq!(policy.backoff(1).as_secs_f64(), 60.0);
    }

    #[test]
    fn test_missing_capability_field_is_rejected() {
        let yaml = VALID.replace("      timeout: 30\n", "");
        let err = ModelsFile::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_temperature_out_of_range() {
        let yaml = VALID.replace("temperature: 0.4", "temperature: 1.5");
        assert!(ModelsFile::from_yaml(&yaml).unwrap_err().is_invalid_config());
    }

    #[test]
    fn test_mismatched_key_is_rejected() {
        let yaml = VALID.replace("model_id: test_model", "model_id: other");
        assert!(ModelsFile::from_yaml(&yaml).unwrap_err().is_invalid_config());
    }

    #[test]
    fn test_custom_model_type_round_trips() {
        let yaml = VALID.replace("model_type: belter", "model_type: deepseek");
        let file = ModelsFile::from_yaml(&yaml).unwrap();
        let model = &file.models["test_model"];
        assert_eq!(model.model_type, ModelType::Custom("deepseek".to_string()));
        assert_eq!(model.model_type.as_str(), "deepseek");
    }

    #[test]
    fn test_system_paths_layout() {
        let paths = SystemPaths::new("/opt/moe");
        assert_eq!(paths.models_config(), PathBuf::from("/opt/moe/config/models.yaml"));
        assert_eq!(paths.tools_dir, PathBuf::from("/opt/moe/tools"));
    }
}
