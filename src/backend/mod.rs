//! Backend module - Traits, HTTP clients, and registry

pub mod aspect;
pub mod queue_backend;
pub mod registry;
pub mod sync_backend;
pub mod traits;
