//! JSON encoding of the session file.

mod json;

pub use json::{SerializationError, decode_document, encode_document};
