/// Reversible text <-> blob transform
///
/// Source text is UTF-8 encoded and then base64 encoded so it can live inside
/// an SVG attribute or a storage key without escaping concerns. Multi-byte
/// characters survive the round trip untouched.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Decoding a blob that was not produced by [`encode`]
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("blob is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("blob does not hold UTF-8 text: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("invalid {field}: {value}")]
    Invalid { field: &'static str, value: String },
}

/// Encode text into a blob
pub fn encode(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Decode a blob back into the original text
pub fn decode(blob: &str) -> Result<String, DecodeError> {
    let bytes = STANDARD.decode(blob.trim())?;
    Ok(String::from_utf8(bytes)?)
}
