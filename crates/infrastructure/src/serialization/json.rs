//! Session document encoding.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::ser::{PrettyFormatter, Serializer};

/// A session document could not be encoded or decoded.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    /// The value could not be written as JSON.
    #[error("could not encode session document: {0}")]
    Encode(#[from] serde_json::Error),

    /// The bytes are not a valid document of the expected shape.
    #[error("could not decode session document: {0}")]
    Decode(serde_json::Error),
}

/// Encodes `value` as an indented JSON document ending in a newline.
///
/// Field order follows the struct declaration, so two saves of the same
/// session produce identical bytes.
///
/// # Errors
///
/// Returns `Encode` if `value` cannot be represented as JSON.
pub fn encode_document<T: Serialize>(value: &T) -> Result<Vec<u8>, SerializationError> {
    let mut buffer = Vec::with_capacity(512);
    let mut serializer =
        Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"  "));
    value.serialize(&mut serializer)?;
    buffer.push(b'\n');
    Ok(buffer)
}

/// Decodes a document written by [`encode_document`] or by hand.
///
/// # Errors
///
/// Returns `Decode` for malformed or truncated input.
pub fn decode_document<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SerializationError> {
    serde_json::from_slice(bytes).map_err(SerializationError::Decode)
}
