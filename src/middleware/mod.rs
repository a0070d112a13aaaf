//! Middleware module - tower layers for the HTTP surface

pub mod admin_auth;
