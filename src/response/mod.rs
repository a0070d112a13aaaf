//! Response handling module - image payload encoding and user-facing messages

pub mod base64;
pub mod messages;
