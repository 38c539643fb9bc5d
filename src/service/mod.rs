//! Resource services: generic provider, relation hydration and history reconstruction.

mod history;
mod hydration;
mod provider;

pub use history::{format_display_timestamp, HistoryPage, HistoryService};
pub use hydration::{empty_scope_marker, hydrate, SCOPE_ALL, SCOPE_NONE, SCOPE_RESTRICTED};
pub use provider::{ListPage, ListParams, ResourceProvider, SortParam, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

use crate::error::ConfigError;
use std::str::FromStr;

/// Whether this process may write. Browser-facing deployments run unprivileged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    Privileged,
    #[default]
    Unprivileged,
}

impl FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "privileged" => Ok(ExecutionMode::Privileged),
            "unprivileged" => Ok(ExecutionMode::Unprivileged),
            _ => Err(ConfigError::Validation(format!(
                "invalid execution mode: '{}' (expected privileged or unprivileged)",
                s
            ))),
        }
    }
}

impl ExecutionMode {
    pub fn can_write(self) -> bool {
        self == ExecutionMode::Privileged
    }
}
