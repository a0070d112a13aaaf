//! Base64 and data URI helpers for image payloads

use base64::{engine::general_purpose::STANDARD, Engine};
use crate::error::{AppError, Result};

const IMAGE_DATA_URI_PREFIX: &str = "data:image";

/// Encode binary data to base64 string
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Whether a payload reference is an inline image data URI rather than a URL
pub fn is_data_uri(payload: &str) -> bool {
    payload.starts_with(IMAGE_DATA_URI_PREFIX)
}

/// Decode the body of a `data:image/...;base64,` URI
pub fn decode_data_uri(data_uri: &str) -> Result<Vec<u8>> {
    let (header, data) = data_uri
        .split_once(',')
        .ok_or_else(|| AppError::InvalidRequest("Data URI has no payload".to_string()))?;
    if !header.ends_with(";base64") {
        return Err(AppError::InvalidRequest(format!(
            "Data URI is not base64 encoded: {}",
            header
        )));
    }

    STANDARD
        .decode(data.trim())
        .map_err(|e| AppError::InvalidRequest(format!("Invalid base64 data: {}", e)))
}

/// Get the image format from base64 data URL prefix
pub fn get_format_from_data_url(data_url: &str) -> Option<&str> {
    let rest = data_url.strip_prefix("data:image/")?;
    let end = rest.find(';')?;
    Some(&rest[..end])
}

/// Create a data URL from binary image data
pub fn create_data_url(data: &[u8], format: &str) -> String {
    format!("data:image/{};base64,{}", format, encode(data))
}

/// Sniff the image format from magic bytes
pub fn detect_image_format(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("png")
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpeg")
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some("webp")
    } else if data.starts_with(b"GIF8") {
        Some("gif")
    } else {
        None
    }
}
