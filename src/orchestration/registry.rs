// Model registry - source of truth for which models exist and what they can do

use super::config::{GlobalSettings, ModelCapabilities, ModelConfig, ModelType, ModelsFile};
use super::error::ModelError;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// In-memory registry of model configurations with a capability index.
///
/// Mutation goes through `&mut self`; the owner decides how to share it.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelConfig>,
    capability_index: BTreeMap<String, BTreeSet<String>>,
    settings: GlobalSettings,
}

impl ModelRegistry {
    /// Create an empty registry with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the built-in models.
    ///
    /// Endpoints can be overridden with `CAMINA_ENDPOINT`,
    /// `PROPERTY_BELTER_ENDPOINT`, `KNOWLEDGE_BELTER_ENDPOINT` and
    /// `LOCATION_DRUMMER_ENDPOINT`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for model in default_models() {
            registry.index(&model);
            registry.models.insert(model.model_id.clone(), model);
        }
        registry
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let mut registry = Self::new();
        registry.load_config(path)?;
        Ok(registry)
    }

    /// Load `path` when it exists, otherwise fall back to the built-in models
    pub fn from_path_or_default(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_path(path)
        } else {
            tracing::info!("No model config at {}, using built-in models", path.display());
            Ok(Self::with_defaults())
        }
    }

    /// Replace the registry contents with the models and settings in a YAML file
    pub fn load_config(&mut self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ModelError::invalid_config(format!("cannot read {}: {}", path.display(), e))
        })?;
        self.load_yaml(&contents)?;
        tracing::info!("Loaded {} models from {}", self.models.len(), path.display());
        Ok(())
    }

    /// Replace the registry contents from YAML text. Nothing changes on error.
    pub fn load_yaml(&mut self, contents: &str) -> Result<(), ModelError> {
        let file = ModelsFile::from_yaml(contents)?;

        self.models.clear();
        self.capability_index.clear();
        for model in file.models.into_values() {
            self.index(&model);
            self.models.insert(model.model_id.clone(), model);
        }
        self.settings = file.settings;
        Ok(())
    }

    /// Write the current models and settings back as YAML
    pub fn save_config(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref();
        let file = ModelsFile {
            models: self.models.clone(),
            settings: self.settings.clone(),
        };
        let contents = serde_yaml::to_string(&file)
            .map_err(|e| ModelError::invalid_config(format!("cannot serialize models: {}", e)))?;
        std::fs::write(path, contents).map_err(|e| {
            ModelError::invalid_config(format!("cannot write {}: {}", path.display(), e))
        })?;
        tracing::info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Register a model from an untyped mapping, validating it against the schema
    pub fn register_model(&mut self, model_id: &str, config: serde_json::Value) -> Result<(), ModelError> {
        let model: ModelConfig = serde_json::from_value(config)
            .map_err(|e| ModelError::invalid_config(format!("model {}: {}", model_id, e)))?;
        if model.model_id != model_id {
            return Err(ModelError::invalid_config(format!(
                "model {} registered with model_id {}",
                model_id, model.model_id
            )));
        }
        self.insert_model(model)
    }

    /// Register a typed model, replacing any model with the same id
    pub fn insert_model(&mut self, model: ModelConfig) -> Result<(), ModelError> {
        model.validate()?;
        if let Some(previous) = self.models.remove(&model.model_id) {
            self.unindex(&previous);
        }
        self.index(&model);
        tracing::info!("Registered model {}", model.model_id);
        self.models.insert(model.model_id.clone(), model);
        Ok(())
    }

    pub fn get_model(&self, model_id: &str) -> Result<&ModelConfig, ModelError> {
        self.models
            .get(model_id)
            .ok_or_else(|| ModelError::NotFound(model_id.to_string()))
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    pub fn find_models_by_capability(&self, capability: &str) -> BTreeSet<String> {
        self.capability_index.get(capability).cloned().unwrap_or_default()
    }

    pub fn find_models_by_type(&self, model_type: &str) -> BTreeSet<String> {
        self.models
            .values()
            .filter(|model| model.model_type.as_str() == model_type)
            .map(|model| model.model_id.clone())
            .collect()
    }

    /// Merge `updates` over the stored config.
    ///
    /// Top-level keys replace the stored value, except that an object given
    /// for an object field (e.g. `capabilities`) is merged key by key.
    pub fn update_model_config(&mut self, model_id: &str, updates: serde_json::Value) -> Result<(), ModelError> {
        let current = self.get_model(model_id)?;

        let serde_json::Value::Object(updates) = updates else {
            return Err(ModelError::invalid_config(format!(
                "updates for model {} must be a mapping",
                model_id
            )));
        };

        let mut merged = serde_json::to_value(current)
            .map_err(|e| ModelError::invalid_config(format!("model {}: {}", model_id, e)))?;
        if let serde_json::Value::Object(fields) = &mut merged {
            for (key, value) in updates {
                match (fields.get_mut(&key), value) {
                    (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(partial)) => {
                        existing.extend(partial);
                    }
                    (_, value) => {
                        fields.insert(key, value);
                    }
                }
            }
        }

        let updated: ModelConfig = serde_json::from_value(merged)
            .map_err(|e| ModelError::invalid_config(format!("model {}: {}", model_id, e)))?;
        if updated.model_id != model_id {
            return Err(ModelError::invalid_config(format!(
                "model {} cannot be renamed to {}",
                model_id, updated.model_id
            )));
        }
        updated.validate()?;

        if let Some(previous) = self.models.remove(model_id) {
            self.unindex(&previous);
        }
        self.index(&updated);
        self.models.insert(model_id.to_string(), updated);
        tracing::info!("Updated configuration for model {}", model_id);
        Ok(())
    }

    pub fn remove_model(&mut self, model_id: &str) -> Result<ModelConfig, ModelError> {
        let model = self
            .models
            .remove(model_id)
            .ok_or_else(|| ModelError::NotFound(model_id.to_string()))?;
        self.unindex(&model);
        tracing::info!("Removed model {}", model_id);
        Ok(model)
    }

    pub fn get_settings(&self) -> &GlobalSettings {
        &self.settings
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.values()
    }

    pub fn model_ids(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// Every capability tag with at least one model
    pub fn capabilities(&self) -> Vec<String> {
        self.capability_index.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    fn index(&mut self, model: &ModelConfig) {
        for capability in &model.capabilities.capabilities {
            self.capability_index
                .entry(capability.clone())
                .or_default()
                .insert(model.model_id.clone());
        }
    }

    fn unindex(&mut self, model: &ModelConfig) {
        for capability in &model.capabilities.capabilities {
            if let Some(ids) = self.capability_index.get_mut(capability) {
                ids.remove(&model.model_id);
                if ids.is_empty() {
                    self.capability_index.remove(capability);
                }
            }
        }
    }
}

fn default_models() -> Vec<ModelConfig> {
    let endpoint = |var: &str, fallback: &str| std::env::var(var).unwrap_or_else(|_| fallback.to_string());
    let tags = |tags: &[&str]| tags.iter().map(|t| t.to_string()).collect::<Vec<_>>();

    vec![
        ModelConfig::new(
            "camina",
            ModelType::Primary,
            "mistral-22b",
            endpoint("CAMINA_ENDPOINT", "http://localhost:6000/camina"),
            ModelCapabilities::new(tags(&["orchestration", "conversation", "planning"])),
        ),
        ModelConfig::new(
            "property_belter",
            ModelType::Belter,
            "mistral-7b",
            endpoint("PROPERTY_BELTER_ENDPOINT", "http://localhost:6001/belter"),
            ModelCapabilities::new(tags(&["real_estate", "location_analysis", "market_research"])),
        ),
        ModelConfig::new(
            "knowledge_belter",
            ModelType::Belter,
            "mistral-7b",
            endpoint("KNOWLEDGE_BELTER_ENDPOINT", "http://localhost:6002/belter"),
            ModelCapabilities::new(tags(&["knowledge_base", "fact_checking", "research"])),
        ),
        ModelConfig::new(
            "location_drummer",
            ModelType::Drummer,
            "llama-3b",
            endpoint("LOCATION_DRUMMER_ENDPOINT", "http://localhost:6003/drummer"),
            ModelCapabilities::new(tags(&["location_services", "mapping", "navigation"])),
        ),
    ]
}
