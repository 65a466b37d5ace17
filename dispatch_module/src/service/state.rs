use std::sync::Arc;

use crate::engine::DispatchEngine;

#[derive(Clone)]
pub(super) struct AppState {
    pub(super) engine: Arc<DispatchEngine>,
}
