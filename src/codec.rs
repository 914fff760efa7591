//! Wire representation of rasters: base64 text, optionally wrapped in a data URI.

use std::io::Cursor;

use base64::{
    alphabet,
    engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD},
    Engine as _,
};
use image::{DynamicImage, ImageFormat};

use crate::errors::{CutoutError, Result};

pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Standard alphabet with padding, tolerating non-zero bits after the last byte.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Strip a `data:<mime>;base64,` prefix, if any.
pub fn strip_data_uri(payload: &str) -> &str {
    let payload = payload.trim();
    match payload.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, data)| data),
        None => payload,
    }
}

pub fn decode(payload: &str) -> Result<DynamicImage> {
    let data = strip_data_uri(payload);
    if data.is_empty() {
        return Err(CutoutError::decode("payload", "no image data"));
    }

    let bytes = payload_bytes(data)?;
    image::load_from_memory(&bytes).map_err(|e| CutoutError::decode("image decoding", e))
}

/// Base64 text to bytes. Line breaks and other ASCII whitespace (MIME wrapping) are
/// ignored.
pub fn payload_bytes(data: &str) -> Result<Vec<u8>> {
    if data.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        Ok(PAYLOAD_ENGINE.decode(compact)?)
    } else {
        Ok(PAYLOAD_ENGINE.decode(data)?)
    }
}

pub fn encode_png(image: &DynamicImage) -> Result<String> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| CutoutError::internal("PNG encoding", e))?;

    let mut uri = String::with_capacity(PNG_DATA_URI_PREFIX.len() + bytes.len() * 4 / 3 + 4);
    uri.push_str(PNG_DATA_URI_PREFIX);
    STANDARD.encode_string(&bytes, &mut uri);
    Ok(uri)
}
