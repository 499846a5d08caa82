//! The shared reader/processor/writer pipeline (spec.md §4.7).
//!
//! A goroutine-and-channel pipeline maps onto `tokio::sync::mpsc` bounded
//! channels and a `tokio::task::JoinSet`: the reader drains the client's
//! Arrow IPC stream outside the error group, while the processor and
//! writer run inside it, so `JoinSet::join_next` surfaces the first
//! stage's error and dropping the set cancels whichever stage is still
//! running.

use crate::error::{AirportError, Result};
use arrow_array::RecordBatch;
use arrow_flight::decode::FlightRecordBatchStream;
use arrow_flight::error::FlightError;
use arrow_flight::utils::flight_data_from_arrow_batch;
use arrow_flight::{FlightData, SchemaAsIpc};
use arrow_ipc::writer::IpcWriteOptions;
use arrow_schema::SchemaRef;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::{Status, Streaming};

/// One unit of pipeline output (spec.md §4.7).
pub enum OutputItem {
    /// A data batch, written through the Arrow IPC record writer.
    Batch(RecordBatch),
    /// A chunk-sync sentinel for the table-function-in/out pipeline.
    ChunkBoundary(ChunkMarker),
    /// A zero-body `FlightData` carrying only `app_metadata`, used for the
    /// DML final `{total_changed}` message.
    Final(Vec<u8>),
}

/// Chunk-delimiting `AppMetadata` values (spec.md §4.7 "writer
/// additionally emits chunk-delimiting sentinel AppMetadata values").
#[derive(Debug, Clone, Copy)]
pub enum ChunkMarker {
    ChunkContinues,
    ChunkFinished,
}

impl ChunkMarker {
    fn app_metadata(self) -> Vec<u8> {
        let tag = match self {
            ChunkMarker::ChunkContinues => "chunk_continues",
            ChunkMarker::ChunkFinished => "chunk_finished",
        };
        tag.as_bytes().to_vec()
    }
}

/// The per-batch operation a `DoExchange` workload performs (spec.md
/// §4.7 "processor stage"). Implementations must be incremental: never
/// collect the whole input stream, to avoid deadlocking bounded
/// channels.
#[async_trait]
pub trait ExchangeProcessor: Send {
    async fn process_batch(&mut self, batch: RecordBatch) -> Result<Vec<OutputItem>>;

    /// Called once after the input stream is exhausted, for workloads
    /// that emit a summary message (e.g. DML `total_changed`).
    async fn finish(&mut self) -> Result<Vec<OutputItem>> {
        Ok(Vec::new())
    }
}

const CHANNEL_CAPACITY: usize = 4;

/// Run the three-stage pipeline against `input`, writing `output_schema`
/// up front so the client can begin sending before any result is
/// produced (spec.md §4.7 "writer is created with a schema writer").
pub fn run(
    input: Streaming<FlightData>,
    output_schema: SchemaRef,
    mut processor: Box<dyn ExchangeProcessor>,
    cancel: CancellationToken,
) -> BoxStream<'static, std::result::Result<FlightData, Status>> {
    let (input_tx, mut input_rx) = mpsc::channel::<RecordBatch>(CHANNEL_CAPACITY);
    let (output_tx, output_rx) = mpsc::channel::<Result<OutputItem>>(CHANNEL_CAPACITY);

    // Reader stage: not part of the error group (spec.md §4.7). Reads
    // stop, and in-flight batches are dropped, on cancellation.
    let reader_cancel = cancel.clone();
    tokio::spawn(async move {
        let flight_stream = input.map(|r: std::result::Result<FlightData, Status>| {
            r.map_err(FlightError::Tonic)
        });
        let mut decoder = FlightRecordBatchStream::new_from_flight_data(flight_stream);
        loop {
            tokio::select! {
                _ = reader_cancel.cancelled() => break,
                next = decoder.next() => {
                    match next {
                        Some(Ok(batch)) => {
                            if input_tx.send(batch).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "doexchange reader error, closing input");
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
    });

    // Processor stage: part of the error group.
    let processor_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut canceled = false;
        loop {
            tokio::select! {
                _ = processor_cancel.cancelled() => { canceled = true; break; }
                batch = input_rx.recv() => {
                    let Some(batch) = batch else { break };
                    match processor.process_batch(batch).await {
                        Ok(items) => {
                            for item in items {
                                if output_tx.send(Ok(item)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            let _ = output_tx.send(Err(e)).await;
                            processor_cancel.cancel();
                            return;
                        }
                    }
                }
            }
        }
        if canceled {
            // Cancellation preempts the summary message: the batch
            // in flight is dropped rather than finished normally
            // (spec.md §5 "on cancellation the sender releases
            // in-flight batches").
            let _ = output_tx.send(Err(AirportError::Canceled)).await;
            return;
        }
        match processor.finish().await {
            Ok(items) => {
                for item in items {
                    if output_tx.send(Ok(item)).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = output_tx.send(Err(e)).await;
            }
        }
    });

    // Writer stage: part of the error group, consumes `output_rx` and
    // emits `FlightData`.
    let options = IpcWriteOptions::default();
    let schema_flight_data: FlightData = SchemaAsIpc::new(&output_schema, &options).into();

    let output_stream = async_stream::stream! {
        yield Ok(schema_flight_data);
        let mut rx = output_rx;
        while let Some(item) = rx.recv().await {
            match item {
                Ok(OutputItem::Batch(batch)) => {
                    let (dictionaries, mut batch_flight_data) =
                        flight_data_from_arrow_batch(&batch, &options);
                    for dict in dictionaries {
                        yield Ok(dict);
                    }
                    batch_flight_data.app_metadata = Vec::new().into();
                    yield Ok(batch_flight_data);
                }
                Ok(OutputItem::ChunkBoundary(marker)) => {
                    yield Ok(FlightData {
                        flight_descriptor: None,
                        data_header: Vec::new().into(),
                        app_metadata: marker.app_metadata().into(),
                        data_body: Vec::new().into(),
                    });
                }
                Ok(OutputItem::Final(app_metadata)) => {
                    yield Ok(FlightData {
                        flight_descriptor: None,
                        data_header: Vec::new().into(),
                        app_metadata: app_metadata.into(),
                        data_body: Vec::new().into(),
                    });
                }
                Err(e) => {
                    yield Err(Status::from(e));
                    break;
                }
            }
        }
    };

    Box::pin(output_stream)
}

/// Translate an `arrow_flight::error::FlightError` into an
/// `AirportError::Internal`, used where the pipeline surfaces client-side
/// framing problems as server errors (spec.md §7 "marshal failure").
pub fn flight_error_to_internal(e: FlightError) -> AirportError {
    AirportError::Internal(e.to_string())
}
