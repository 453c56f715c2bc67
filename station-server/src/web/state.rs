//! Application state for the web layer.

use std::sync::Arc;

use crate::config::PageConfig;
use crate::store::Store;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Storage backend
    pub store: Arc<dyn Store>,

    /// Listing page sizes
    pub pages: PageConfig,
}

impl AppState {
    /// Create a new app state.
    pub fn new(store: Arc<dyn Store>, pages: PageConfig) -> Self {
        Self { store, pages }
    }
}
