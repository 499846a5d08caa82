//! The compressed-content wrapper: a MessagePack array
//! `[uncompressed_length: u32, compressed_bytes]` wrapping ZStandard of a
//! MessagePack-encoded inner object. See spec.md §4.1 / §6.

use crate::error::{AirportError, Result};
use serde::{Deserialize, Serialize};

/// Wire shape of the wrapper itself: a 2-element array, not a map.
#[derive(Serialize, Deserialize)]
struct Wrapper(u32, serde_bytes::ByteBuf);

/// ZStandard-compress `inner_msgpack` and wrap it with its uncompressed
/// length, then MessagePack-encode the wrapper array.
pub fn wrap(inner_msgpack: &[u8]) -> Result<Vec<u8>> {
    let compressed =
        zstd::stream::encode_all(inner_msgpack, 0).map_err(|e| AirportError::Compression(e.to_string()))?;
    let wrapper = Wrapper(inner_msgpack.len() as u32, serde_bytes::ByteBuf::from(compressed));
    crate::codec::msgpack::to_vec(&wrapper)
}

/// Reverse of [`wrap`]: decode the wrapper array, ZStandard-decompress the
/// payload, and verify the recovered length matches `uncompressed_length`.
pub fn unwrap(wrapped: &[u8]) -> Result<Vec<u8>> {
    let Wrapper(expected_len, compressed) = crate::codec::msgpack::from_slice(wrapped)?;
    let inner = zstd::stream::decode_all(compressed.as_slice())
        .map_err(|e| AirportError::Compression(e.to_string()))?;
    if inner.len() as u32 != expected_len {
        return Err(AirportError::Compression(format!(
            "uncompressed length mismatch: header said {expected_len}, got {}",
            inner.len()
        )));
    }
    Ok(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_length_and_bytes() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(16);
        let wrapped = wrap(&payload).unwrap();
        let back = unwrap(&wrapped).unwrap();
        assert_eq!(payload, back);
    }

    #[test]
    fn rejects_tampered_length() {
        let payload = b"hello world";
        let wrapped = wrap(payload).unwrap();
        let mut decoded: (u32, serde_bytes::ByteBuf) = rmp_serde::from_slice(&wrapped).unwrap();
        decoded.0 += 1;
        let tampered = rmp_serde::to_vec(&decoded).unwrap();
        assert!(unwrap(&tampered).is_err());
    }
}
