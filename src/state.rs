use std::sync::Arc;

use libris_core::Library;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub library: Arc<Library>,
}

impl AppState {
    pub fn new(library: Library) -> Self {
        Self {
            library: Arc::new(library),
        }
    }
}
