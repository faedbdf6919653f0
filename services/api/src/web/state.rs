//! services/api/src/web/state.rs
//!
//! The shared application state, created once at startup and handed to every
//! handler through axum's `State` extractor.

use mangashelf_core::aggregation::AggregationService;
use mangashelf_core::ports::{ContentSource, UserStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    /// Direct primary-source access for chapter feeds and page lists.
    pub catalog: Arc<dyn ContentSource>,
    pub aggregator: Arc<AggregationService>,
}
