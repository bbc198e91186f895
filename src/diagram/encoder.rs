//! URL-safe diagram tokens.
//!
//! The token format is the one PlantUML servers accept in `GET` URLs: raw
//! DEFLATE at best compression, base64 with the URL-safe alphabet and no
//! padding, behind a `~1` marker.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

/// Marks a token as "deflate, then URL-safe base64".
pub const TOKEN_PREFIX: &str = "~1";

#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("token does not start with the ~1 marker")]
    MissingPrefix,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid deflate stream: {0}")]
    Deflate(#[from] std::io::Error),
    #[error("decoded diagram is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Normalize line endings to `\n` and trim surrounding whitespace.
pub fn normalize(source: &str) -> String {
    source.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

/// Encode diagram source into a URL-safe token.
///
/// # Example
///
/// ```
/// use slidemark::diagram::encoder::{decode, encode};
///
/// let token = encode("@startuml\nA -> B\n@enduml\n");
/// assert!(token.starts_with("~1"));
/// assert_eq!(decode(&token).unwrap(), "@startuml\nA -> B\n@enduml");
/// ```
pub fn encode(source: &str) -> String {
    let normalized = normalize(source);
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    // Writing into a Vec cannot fail.
    let compressed = encoder
        .write_all(normalized.as_bytes())
        .and_then(|()| encoder.finish())
        .unwrap_or_default();
    format!("{TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(compressed))
}

/// Invert [`encode`].
///
/// # Errors
///
/// Returns an error when the marker is missing or any decoding stage fails.
pub fn decode(token: &str) -> Result<String, EncodingError> {
    let payload = token
        .strip_prefix(TOKEN_PREFIX)
        .ok_or(EncodingError::MissingPrefix)?;
    let compressed = URL_SAFE_NO_PAD.decode(payload)?;
    let mut bytes = Vec::new();
    DeflateDecoder::new(compressed.as_slice()).read_to_end(&mut bytes)?;
    Ok(String::from_utf8(bytes)?)
}
