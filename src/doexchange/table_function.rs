//! Table-function and table-function-in/out exchange pipelines (spec.md
//! §4.7 "Table-function-in/out pipeline").

use super::pipeline::{ChunkMarker, ExchangeProcessor, OutputItem};
use super::ExchangeContext;
use crate::codec::msgpack;
use crate::context::{ExchangeOperation, FlightPath};
use crate::error::{AirportError, Result};
use crate::scan::ScanOptions;
use arrow_array::RecordBatch;
use arrow_flight::FlightData;
use arrow_schema::SchemaRef;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use rmpv::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::{Status, Streaming};

/// Decode the `parameters` entry of a handshake message's `AppMetadata`
/// (spec.md §4.7): raw bytes decode as a MessagePack array, an array is
/// taken as-is, and a string is treated as Arrow IPC bytes whose first
/// row is read as the parameter tuple.
fn decode_parameters(value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::Binary(bytes) => msgpack::from_slice(bytes),
        Value::Array(items) => Ok(items.clone()),
        Value::String(s) => {
            let ipc_bytes = s
                .as_str()
                .ok_or_else(|| AirportError::MalformedPayload("parameters string is not valid UTF-8".into()))?;
            let reader =
                arrow_ipc::reader::StreamReader::try_new(std::io::Cursor::new(ipc_bytes.as_bytes()), None)
                    .map_err(AirportError::from)?;
            let mut params = Vec::new();
            for batch in reader {
                let batch = batch.map_err(AirportError::from)?;
                for col in batch.columns() {
                    params.push(crate::value::scalar_value_at(col, 0)?);
                }
            }
            Ok(params)
        }
        Value::Nil => Ok(Vec::new()),
        other => Err(AirportError::MalformedPayload(format!(
            "unsupported parameters shape: {other:?}"
        ))),
    }
}

/// Read the two handshake messages preceding data (spec.md §4.7): the
/// descriptor-bearing message, then the parameter message.
async fn read_handshake(input: &mut Streaming<FlightData>) -> Result<Vec<Value>> {
    let _descriptor_message = input
        .message()
        .await
        .map_err(|e| AirportError::Internal(e.to_string()))?
        .ok_or_else(|| AirportError::MalformedPayload("missing flight descriptor handshake message".into()))?;

    let param_message = input
        .message()
        .await
        .map_err(|e| AirportError::Internal(e.to_string()))?
        .ok_or_else(|| AirportError::MalformedPayload("missing parameter handshake message".into()))?;

    let app_metadata: Value = msgpack::from_slice(&param_message.app_metadata)?;
    let params_value = msgpack::map_get(&app_metadata, "parameters")
        .ok_or_else(|| AirportError::MalformedPayload("handshake message missing `parameters`".into()))?;
    decode_parameters(params_value)
}

struct InOutProcessor {
    function: Arc<dyn crate::catalog::InOutTableFunction>,
    params: Vec<Value>,
    options: ScanOptions,
}

#[async_trait]
impl ExchangeProcessor for InOutProcessor {
    async fn process_batch(&mut self, batch: RecordBatch) -> Result<Vec<OutputItem>> {
        let mut stream = self.function.execute(&self.params, batch, &self.options).await?;
        let mut items = Vec::new();
        while let Some(result) = stream.next().await {
            let batch = result.map_err(AirportError::from)?;
            items.push(OutputItem::Batch(batch));
        }
        items.push(OutputItem::ChunkBoundary(ChunkMarker::ChunkContinues));
        Ok(items)
    }

    async fn finish(&mut self) -> Result<Vec<OutputItem>> {
        Ok(vec![OutputItem::ChunkBoundary(ChunkMarker::ChunkFinished)])
    }
}

/// Regular table functions answer from parameters alone: there is no
/// per-batch input to process, so the whole result is produced up front
/// and forwarded as a single pseudo-batch processor run (spec.md §4.7).
struct RegularProcessor {
    batches: Option<crate::scan::BatchStream>,
}

#[async_trait]
impl ExchangeProcessor for RegularProcessor {
    async fn process_batch(&mut self, _batch: RecordBatch) -> Result<Vec<OutputItem>> {
        Ok(Vec::new())
    }

    async fn finish(&mut self) -> Result<Vec<OutputItem>> {
        let Some(mut stream) = self.batches.take() else {
            return Ok(Vec::new());
        };
        let mut items = Vec::new();
        while let Some(result) = stream.next().await {
            items.push(OutputItem::Batch(result.map_err(AirportError::from)?));
        }
        Ok(items)
    }
}

/// Run a table-function `DoExchange` workload, regular or in/out
/// (spec.md §4.7).
pub async fn run(
    operation: ExchangeOperation,
    path: FlightPath,
    mut input: Streaming<FlightData>,
    ctx: ExchangeContext,
    cancel: CancellationToken,
) -> Result<BoxStream<'static, std::result::Result<FlightData, Status>>> {
    let schema = ctx.catalog.schema(&path.schema).await?;
    let params = read_handshake(&mut input).await?;

    let (output_schema, processor): (SchemaRef, Box<dyn ExchangeProcessor>) = match operation {
        ExchangeOperation::TableFunctionInOut => {
            use crate::catalog::SchemaExt;
            let function = schema.find_in_out_table_function(&path.name).await?;
            // The input schema is carried by the client's first data
            // batch's own IPC schema message, not by a separate field
            // here; `schema_for_parameters` is re-resolved once the
            // first batch arrives in a full implementation. We resolve it
            // eagerly against an empty schema when the function does not
            // depend on it.
            let placeholder_input = Arc::new(arrow_schema::Schema::empty());
            let out_schema = function.schema_for_parameters(&params, &placeholder_input).await?;
            (
                out_schema,
                Box::new(InOutProcessor {
                    function,
                    params,
                    options: ScanOptions::default(),
                }),
            )
        }
        ExchangeOperation::TableFunction => {
            use crate::catalog::SchemaExt;
            let function = schema.find_table_function(&path.name).await?;
            let out_schema = function.schema_for_parameters(&params).await?;
            let batches = function.execute(&params, ScanOptions::default()).await?;
            (out_schema, Box::new(RegularProcessor { batches: Some(batches) }))
        }
        _ => unreachable!("dispatched only for table-function operations"),
    };

    Ok(super::pipeline::run(input, output_schema, processor, cancel))
}
