//! Backend registry
//!
//! Adapters are created once and shared by every replica whose config type
//! they accept. Registering an adapter never touches the coordinator.

use crate::backend::DatabaseBackend;
use crate::error::{BackendError, Result};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Backends keyed by the replica config `type` strings they accept
#[derive(Default)]
pub struct BackendRegistry {
    backends: Vec<Arc<dyn DatabaseBackend>>,
    /// config type → index into `backends`
    by_type: HashMap<&'static str, usize>,
}

impl Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.by_type.keys().collect();
        types.sort();
        f.debug_struct("BackendRegistry")
            .field("config_types", &types)
            .finish()
    }
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under every config type it declares
    pub fn register(&mut self, backend: Arc<dyn DatabaseBackend>) -> Result<()> {
        let info = backend.information();
        if let Some(taken) = info
            .config_types
            .iter()
            .find(|config_type| self.by_type.contains_key(*config_type))
        {
            return Err(BackendError::DuplicateConfigType(taken.to_string()));
        }

        let index = self.backends.len();
        self.backends.push(backend);
        for config_type in info.config_types.iter().copied() {
            self.by_type.insert(config_type, index);
        }
        Ok(())
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, backend: Arc<dyn DatabaseBackend>) -> Result<Self> {
        self.register(backend)?;
        Ok(self)
    }

    pub fn backend_for(&self, config_type: &str) -> Result<Arc<dyn DatabaseBackend>> {
        self.by_type
            .get(config_type)
            .map(|index| Arc::clone(&self.backends[*index]))
            .ok_or_else(|| BackendError::UnknownConfigType(config_type.to_string()))
    }

    pub fn config_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.by_type.keys().copied()
    }

    /// Set up every backend
    ///
    /// If any setup fails, every backend is shut down before the error is
    /// returned, including the ones whose setup never ran.
    pub async fn initialise(&self) -> Result<()> {
        for backend in &self.backends {
            if let Err(err) = backend.setup().await {
                tracing::error!(backend = ?backend, error = %err, "backend setup failed");
                // Shutdown errors are logged by shutdown(); the setup error wins
                let _ = self.shutdown().await;
                return Err(err);
            }
            tracing::debug!(backend = ?backend, "backend ready");
        }
        Ok(())
    }

    /// Shut down every backend, returning the first failure
    pub async fn shutdown(&self) -> Result<()> {
        let mut first_error = None;
        for backend in &self.backends {
            if let Err(err) = backend.shutdown().await {
                tracing::warn!(backend = ?backend, error = %err, "backend shutdown failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
