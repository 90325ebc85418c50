//! Shared handle to the active backend.

use std::sync::{Arc, PoisonError, RwLock};

use super::ModelBackend;

/// The one place where the active backend is swapped.
///
/// The session and front-ends hold clones; a model switch made through any
/// clone is visible to all of them.
#[derive(Clone)]
pub struct BackendHandle {
    inner: Arc<RwLock<Arc<dyn ModelBackend>>>,
}

impl BackendHandle {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(backend)),
        }
    }

    /// The backend currently in use.
    pub fn current(&self) -> Arc<dyn ModelBackend> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn model_id(&self) -> String {
        self.current().model_id().to_string()
    }

    /// Replace the active backend, returning the previous one.
    pub fn switch_to(&self, backend: Arc<dyn ModelBackend>) -> Arc<dyn ModelBackend> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(
            from = guard.model_id(),
            to = backend.model_id(),
            "Switching model backend"
        );
        std::mem::replace(&mut *guard, backend)
    }
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle")
            .field("model_id", &self.model_id())
            .finish()
    }
}
