//! HTTP handlers for resource reads, writes and history.

pub mod resource;
pub use resource::*;
