//! Known models and the user's current selection.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::ai::Gateway;
use crate::config::Config;
use crate::error::GatewayError;

/// A model as reported by the backend's listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub size_bytes: Option<u64>,
    pub parameter_size: Option<String>,
}

impl ModelDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size_bytes: None,
            parameter_size: None,
        }
    }

    /// Human-readable size, e.g. `1.9 GB`.
    pub fn display_size(&self) -> Option<String> {
        const GB: f64 = 1024.0 * 1024.0 * 1024.0;
        const MB: f64 = 1024.0 * 1024.0;
        self.size_bytes.map(|bytes| {
            let bytes = bytes as f64;
            if bytes >= GB {
                format!("{:.1} GB", bytes / GB)
            } else {
                format!("{:.0} MB", bytes / MB)
            }
        })
    }
}

/// A consistent view of the registry at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrySnapshot {
    pub available: Arc<Vec<ModelDescriptor>>,
    pub selected: Option<String>,
}

impl RegistrySnapshot {
    pub fn contains(&self, name: &str) -> bool {
        self.available.iter().any(|m| m.name == name)
    }
}

/// Holds the models offered by the backend and the active selection.
///
/// Shared by chat and cell analysis. A refresh replaces the model list in one
/// step, so readers see either the old list or the new one.
pub struct ModelRegistry {
    gateway: Arc<dyn Gateway>,
    allowed: Option<Vec<String>>,
    state: RwLock<RegistrySnapshot>,
}

impl ModelRegistry {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            allowed: None,
            state: RwLock::new(RegistrySnapshot::default()),
        }
    }

    pub fn from_config(gateway: Arc<dyn Gateway>, config: &Config) -> Self {
        let mut registry = Self::new(gateway).with_allowed_models(config.allowed_models.clone());
        if let Some(model) = &config.default_model {
            registry.state.get_mut().selected = Some(model.clone());
        }
        registry
    }

    /// Restricts refresh results to `allowed`. `None` allows everything.
    pub fn with_allowed_models(mut self, allowed: Option<Vec<String>>) -> Self {
        self.allowed = allowed;
        self
    }

    /// Reloads the model list from the backend.
    ///
    /// On failure the previous list and selection are kept.
    pub async fn refresh(&self) -> Result<RegistrySnapshot, GatewayError> {
        let mut models = match self.gateway.list_models().await {
            Ok(models) => models,
            Err(err) => {
                tracing::warn!(error = %err, "model refresh failed, keeping previous list");
                return Err(err);
            }
        };

        if let Some(allowed) = &self.allowed {
            models.retain(|m| allowed.iter().any(|name| name == &m.name));
        }

        let mut state = self.state.write();
        state.available = Arc::new(models);
        if state.selected.is_none() {
            state.selected = state.available.first().map(|m| m.name.clone());
        }
        tracing::info!(
            count = state.available.len(),
            selected = state.selected.as_deref().unwrap_or("<none>"),
            "model registry refreshed"
        );
        Ok((*state).clone())
    }

    /// Overwrites the selection. Unknown names are accepted; the backend
    /// reports them on first use.
    pub fn select(&self, name: impl Into<String>) {
        let name = name.into();
        tracing::debug!(model = %name, "model selected");
        self.state.write().selected = Some(name);
    }

    pub fn current(&self) -> Option<String> {
        self.state.read().selected.clone()
    }

    pub fn available(&self) -> Arc<Vec<ModelDescriptor>> {
        self.state.read().available.clone()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.state.read().clone()
    }
}
