//! Arrow IPC schema (de)serialization and Flight metadata-type helpers
//! built on the `arrow-flight` crate (spec.md §4.1, §6).

use crate::error::{AirportError, Result};
use arrow_flight::{FlightDescriptor, FlightEndpoint, FlightInfo, Ticket as FlightTicket};
use arrow_schema::{Schema, SchemaRef};
use std::sync::Arc;

/// Serialize an Arrow schema as a schema-only IPC message, the shape used
/// for metadata-action replies and `input_schema` app-metadata fields
/// (spec.md §4.1, §4.3).
pub fn schema_to_ipc_bytes(schema: &Schema) -> Result<Vec<u8>> {
    let data_gen = arrow_ipc::writer::IpcDataGenerator::default();
    let options = arrow_ipc::writer::IpcWriteOptions::default();
    let encoded = data_gen.schema_to_bytes(schema, &options);
    Ok(encoded.ipc_message)
}

/// Parse a schema-only IPC message back into an Arrow schema.
pub fn ipc_bytes_to_schema(bytes: &[u8]) -> Result<SchemaRef> {
    let message = arrow_ipc::root_as_message(bytes)
        .map_err(|e| AirportError::MalformedPayload(format!("invalid IPC schema message: {e}")))?;
    let ipc_schema = message
        .header_as_schema()
        .ok_or_else(|| AirportError::MalformedPayload("IPC message has no schema header".into()))?;
    let schema = arrow_ipc::convert::fb_to_schema(ipc_schema);
    Ok(Arc::new(schema))
}

/// Build a `FlightInfo` for the given descriptor/schema/ticket, with no
/// location hints (Airport servers always expect same-connection reads).
pub fn flight_info(descriptor: FlightDescriptor, schema: &Schema, ticket_bytes: Vec<u8>) -> Result<FlightInfo> {
    let endpoint = FlightEndpoint {
        ticket: Some(FlightTicket {
            ticket: ticket_bytes.into(),
        }),
        location: vec![],
        expiration_time: None,
        app_metadata: Default::default(),
    };
    let info = FlightInfo::new()
        .try_with_schema(schema)
        .map_err(AirportError::from)?
        .with_endpoint(endpoint)
        .with_descriptor(descriptor);
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::{DataType, Field};

    #[test]
    fn ipc_schema_round_trips() {
        let schema = Schema::new(vec![
            Field::new("a", DataType::Int64, false),
            Field::new("b", DataType::Utf8, true),
        ]);
        let bytes = schema_to_ipc_bytes(&schema).unwrap();
        let back = ipc_bytes_to_schema(&bytes).unwrap();
        assert_eq!(back.fields().len(), 2);
        assert_eq!(back.field(0).name(), "a");
        assert_eq!(back.field(1).name(), "b");
    }
}
