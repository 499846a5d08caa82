//! The `TableRef` function-call URI scheme (spec.md §6):
//! `data:application/x-msgpack-duckdb-function-call;base64,<b64(msgpack{function_name, data})>`

use crate::error::{AirportError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};

const URI_PREFIX: &str = "data:application/x-msgpack-duckdb-function-call;base64,";

#[derive(Serialize, Deserialize)]
struct FunctionCall {
    function_name: String,
    data: serde_bytes::ByteBuf,
}

/// Encode a function-call URI from a function name and a one-row Arrow
/// IPC stream holding the positional/named arguments.
pub fn encode(function_name: &str, arrow_ipc_stream: Vec<u8>) -> Result<String> {
    let call = FunctionCall {
        function_name: function_name.to_string(),
        data: serde_bytes::ByteBuf::from(arrow_ipc_stream),
    };
    let msgpack = crate::codec::msgpack::to_vec(&call)?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(msgpack);
    Ok(format!("{URI_PREFIX}{b64}"))
}

/// Decode a function-call URI into `(function_name, arrow_ipc_stream)`.
pub fn decode(uri: &str) -> Result<(String, Vec<u8>)> {
    let b64 = uri
        .strip_prefix(URI_PREFIX)
        .ok_or_else(|| AirportError::MalformedPayload("not a function-call URI".into()))?;
    let msgpack = base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| AirportError::MalformedPayload(format!("invalid base64 in function-call URI: {e}")))?;
    let call: FunctionCall = crate::codec::msgpack::from_slice(&msgpack)?;
    Ok((call.function_name, call.data.into_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let uri = encode("read_parquet", vec![1, 2, 3, 4]).unwrap();
        assert!(uri.starts_with(URI_PREFIX));
        let (name, data) = decode(&uri).unwrap();
        assert_eq!(name, "read_parquet");
        assert_eq!(data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn rejects_wrong_prefix() {
        assert!(decode("data:text/plain;base64,aGVsbG8=").is_err());
    }
}
