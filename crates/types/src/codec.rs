//! Record encoding.
//!
//! Every primary record is stored as postcard bytes. Routing all encoding
//! through this module keeps error handling uniform across the store.

use serde::{Serialize, de::DeserializeOwned};
use snafu::{ResultExt, Snafu};

/// A record could not be converted to or from its stored bytes.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CodecError {
    /// The value could not be serialized.
    #[snafu(display("Encoding failed: {source}"))]
    Encode { source: postcard::Error },

    /// Stored bytes do not describe a value of the requested type.
    #[snafu(display("Decoding failed: {source}"))]
    Decode { source: postcard::Error },
}

/// Serializes a record for storage.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(value).context(EncodeSnafu)
}

/// Deserializes stored bytes.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the bytes are malformed or of another
/// type.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    postcard::from_bytes(bytes).context(DecodeSnafu)
}
