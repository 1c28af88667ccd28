//! Shared state for the API router.

use std::sync::Arc;

use crate::manager::AsyncAdapter;

#[derive(Clone)]
pub struct AppState {
    pub adapter: Arc<AsyncAdapter>,
}
