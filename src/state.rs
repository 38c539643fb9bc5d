//! Shared application state for all routes. The registry is frozen at startup.

use crate::config::ResourceRegistry;
use crate::executor::QueryExecutor;
use crate::scope::ScopePolicy;
use crate::service::{ExecutionMode, HistoryService, ResourceProvider};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ResourceRegistry>,
    pub executor: Arc<dyn QueryExecutor>,
    pub provider: ResourceProvider,
    pub history: HistoryService,
    pub policy: ScopePolicy,
}

impl AppState {
    pub fn new(
        registry: ResourceRegistry,
        executor: Arc<dyn QueryExecutor>,
        policy: ScopePolicy,
        mode: ExecutionMode,
    ) -> Self {
        AppState {
            registry: Arc::new(registry),
            provider: ResourceProvider::new(executor.clone(), policy, mode),
            history: HistoryService::new(executor.clone(), policy),
            executor,
            policy,
        }
    }
}
