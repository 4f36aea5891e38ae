// Tool discovery - registers built-in, model-backed and manifest tools with the router

use super::communicator::ModelCommunicator;
use super::registry::ModelRegistry;
use super::router::SmartRouter;
use super::tools::{ModelTool, Tool, ToolCapability, builtin_tools, model_tool_capabilities};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::FileType;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const MANIFEST_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// A model-backed tool declared in the tools directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolManifest {
    pub tool_id: String,
    pub model_id: String,
    pub capability: ToolCapability,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Per-request timeout in seconds, overriding the model's own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Cannot read {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("Cannot parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid manifest {}: {message}", .path.display())]
    Invalid { path: PathBuf, message: String },
}

impl ToolManifest {
    pub fn from_path(path: &Path) -> Result<Self, DiscoveryError> {
        let contents = std::fs::read_to_string(path).map_err(|e| DiscoveryError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let parsed: Result<ToolManifest, String> = if is_json {
            serde_json::from_str(&contents).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&contents).map_err(|e| e.to_string())
        };
        let manifest = parsed.map_err(|message| DiscoveryError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        let invalid = |message: &str| DiscoveryError::Invalid {
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        if manifest.tool_id.trim().is_empty() {
            return Err(invalid("tool_id must not be empty"));
        }
        if manifest.model_id.trim().is_empty() {
            return Err(invalid("model_id must not be empty"));
        }
        if manifest.timeout == Some(0) {
            return Err(invalid("timeout must be greater than zero"));
        }
        Ok(manifest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSource {
    Builtin,
    Model,
    Manifest(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredTool {
    pub tool_id: String,
    pub capability: ToolCapability,
    pub source: ToolSource,
}

impl DiscoveredTool {
    pub fn category(&self) -> &str {
        &self.capability.category
    }
}

/// Finds the available tools and registers them with a router
pub struct ToolDiscovery {
    tools_dir: PathBuf,
    excluded_dirs: Vec<String>,
    ignore_patterns: Vec<String>,
    discovered: BTreeMap<String, DiscoveredTool>,
}

impl ToolDiscovery {
    pub fn new(tools_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools_dir: tools_dir.into(),
            excluded_dirs: vec!["tests".to_string()],
            ignore_patterns: Vec::new(),
            discovered: BTreeMap::new(),
        }
    }

    pub fn with_excluded_dirs(mut self, dirs: Vec<String>) -> Self {
        self.excluded_dirs = dirs;
        self
    }

    /// Glob patterns matched against paths relative to the tools directory
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    pub fn tools_dir(&self) -> &Path {
        &self.tools_dir
    }

    /// Register every available tool with `router`.
    ///
    /// Built-ins come first, then the known model tools whose model is in
    /// the registry, then manifests from the tools directory in path order.
    /// A broken manifest is logged and skipped.
    pub fn discover_tools(
        &mut self,
        router: &mut SmartRouter,
        registry: &ModelRegistry,
        communicator: &Arc<ModelCommunicator>,
    ) -> usize {
        self.discovered.clear();

        for tool in builtin_tools() {
            self.register(router, tool, ToolSource::Builtin);
        }

        for (tool_id, capability) in model_tool_capabilities() {
            if !registry.contains(tool_id) {
                tracing::debug!("Skipping {}: no such model registered", tool_id);
                continue;
            }
            let tool = ModelTool::new(tool_id, tool_id, capability, Arc::clone(communicator));
            self.register(router, Arc::new(tool), ToolSource::Model);
        }

        if self.tools_dir.is_dir() {
            let mut manifests = Vec::new();
            self.collect_manifests(&self.tools_dir, &mut manifests);
            for path in manifests {
                match self.load_manifest(&path, registry, communicator) {
                    Ok(tool) => self.register(router, tool, ToolSource::Manifest(path)),
                    Err(e) => tracing::error!("Error loading tool manifest: {}", e),
                }
            }
        } else {
            tracing::warn!("Tools directory {} does not exist", self.tools_dir.display());
        }

        tracing::info!(
            "Discovered {} tools in {} categories",
            self.discovered.len(),
            self.get_categories().len()
        );
        self.discovered.len()
    }

    fn register(&mut self, router: &mut SmartRouter, tool: Arc<dyn Tool>, source: ToolSource) {
        let tool_id = tool.tool_id().to_string();
        if let Some(previous) = self.discovered.get(&tool_id) {
            tracing::warn!("Tool {} from {:?} replaces {:?}", tool_id, source, previous.source);
        }

        let capability = tool.capability().normalized();
        router.register_tool(tool);
        tracing::debug!("Registered tool {} in category {}", tool_id, capability.category);
        self.discovered.insert(
            tool_id.clone(),
            DiscoveredTool {
                tool_id,
                capability,
                source,
            },
        );
    }

    fn load_manifest(
        &self,
        path: &Path,
        registry: &ModelRegistry,
        communicator: &Arc<ModelCommunicator>,
    ) -> Result<Arc<dyn Tool>, DiscoveryError> {
        let manifest = ToolManifest::from_path(path)?;
        if !registry.contains(&manifest.model_id) {
            return Err(DiscoveryError::Invalid {
                path: path.to_path_buf(),
                message: format!("model {} is not registered", manifest.model_id),
            });
        }

        let tool = ModelTool::new(
            manifest.tool_id,
            manifest.model_id,
            manifest.capability,
            Arc::clone(communicator),
        )
        .with_dependencies(manifest.dependencies)
        .with_timeout(manifest.timeout.map(Duration::from_secs));
        Ok(Arc::new(tool))
    }

    fn collect_manifests(&self, directory: &Path, manifests: &mut Vec<PathBuf>) {
        let entries = match std::fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Error scanning directory {}: {}", directory.display(), e);
                return;
            }
        };

        // file_type() does not follow symlinks, so linked directories are never entered
        let mut paths: Vec<(PathBuf, FileType)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_type().ok().map(|kind| (entry.path(), kind)))
            .collect();
        paths.sort_by(|a, b| a.0.cmp(&b.0));

        for (path, kind) in paths {
            if self.should_ignore(&path) {
                tracing::debug!("Skipping {}", path.display());
                continue;
            }
            if kind.is_dir() {
                self.collect_manifests(&path, manifests);
            } else if kind.is_symlink() && path.is_dir() {
                tracing::debug!("Not following directory link {}", path.display());
            } else if path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| MANIFEST_EXTENSIONS.contains(&ext))
            {
                manifests.push(path);
            }
        }
    }

    fn should_ignore(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return true;
        };
        if name.starts_with('.') || name.starts_with('_') {
            return true;
        }
        if path.is_dir() && self.excluded_dirs.iter().any(|dir| *dir == name) {
            return true;
        }

        let relative = path.strip_prefix(&self.tools_dir).unwrap_or(path);
        let relative = relative.to_string_lossy();
        self.ignore_patterns
            .iter()
            .any(|pattern| glob_match::glob_match(pattern, &relative))
    }

    /// Distinct categories of the discovered tools, sorted
    pub fn get_categories(&self) -> Vec<String> {
        self.discovered
            .values()
            .map(|tool| tool.category().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn get_tool(&self, tool_id: &str) -> Option<&DiscoveredTool> {
        self.discovered.get(tool_id)
    }

    pub fn get_tools_by_category(&self, category: &str) -> Vec<&DiscoveredTool> {
        self.discovered
            .values()
            .filter(|tool| tool.category() == category)
            .collect()
    }

    pub fn discovered_count(&self) -> usize {
        self.discovered.len()
    }
}
