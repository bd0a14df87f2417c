//! Shared application state — one `Arc`-cloneable handle to every component,
//! threaded through axum handlers and the UDP worker pool alike.

use std::sync::Arc;

use crate::config::Config;
use crate::course::SharedCourseStore;
use crate::overrides::SharedOverrideStore;
use crate::position_store::SharedPositionStore;
use crate::registry::SharedRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: SharedRegistry,
    pub positions: SharedPositionStore,
    pub overrides: SharedOverrideStore,
    pub course: SharedCourseStore,
}

pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
