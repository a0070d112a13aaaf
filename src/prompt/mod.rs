//! Prompt module - content filtering and optimization

pub mod filter;
pub mod optimizer;
