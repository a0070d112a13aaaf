//! API module - HTTP front door

pub mod handlers;
pub mod routes;
