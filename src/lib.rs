//! Scoped resource SDK: configuration-driven, scope-enforced read/write access to relational resources.

pub mod case;
pub mod config;
pub mod error;
pub mod executor;
pub mod extractors;
pub mod handlers;
pub mod identity;
pub mod mapper;
pub mod query;
pub mod response;
pub mod routes;
pub mod scope;
pub mod service;
pub mod sql;
pub mod state;
pub mod value;

pub use config::{load_from_path, FullConfig, RegistryBuilder, ResourceConfig, ResourceRegistry, Settings};
pub use error::{AppError, ConfigError, StorageError};
pub use executor::{MemoryExecutor, PgExecutor, QueryExecutor};
pub use identity::CallerIdentityContext;
pub use mapper::{DomainMapper, FieldMapper, Row};
pub use routes::{app_router, common_routes_with_ready, resource_routes};
pub use scope::ScopePolicy;
pub use service::{ExecutionMode, HistoryService, ListPage, ListParams, ResourceProvider};
pub use state::AppState;
