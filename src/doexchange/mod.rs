//! `DoExchange` (spec.md §4.7): the reader/processor/writer pipeline and
//! its three workloads (scalar function, table function, DML).

pub mod dml;
pub mod pipeline;
pub mod scalar;
pub mod table_function;

use crate::catalog::Catalog;
use crate::context::{ExchangeOperation, FlightPath, RequestContext};
use crate::error::{AirportError, Result};
use crate::transaction::TransactionManager;
use arrow_flight::FlightData;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::{Status, Streaming};

/// Everything a `DoExchange` workload needs beyond the client's input
/// stream: the resolved catalog, request headers, and the transaction
/// coordinator (spec.md §4.7, §4.9, §4.10).
pub struct ExchangeContext {
    pub catalog: Arc<dyn Catalog>,
    pub request: RequestContext,
    pub transactions: Arc<TransactionManager>,
}

/// Route an incoming `DoExchange` call to its workload by the
/// `airport-operation` header (spec.md §4.7).
pub async fn handle(
    operation: ExchangeOperation,
    path: FlightPath,
    input: Streaming<FlightData>,
    ctx: ExchangeContext,
    cancel: CancellationToken,
) -> Result<BoxStream<'static, std::result::Result<FlightData, Status>>> {
    match operation {
        ExchangeOperation::ScalarFunction => scalar::run(path, input, ctx, cancel).await,
        ExchangeOperation::TableFunction | ExchangeOperation::TableFunctionInOut => {
            table_function::run(operation, path, input, ctx, cancel).await
        }
        ExchangeOperation::Insert | ExchangeOperation::Update | ExchangeOperation::Delete => {
            dml::run(operation, path, input, ctx, cancel).await
        }
    }
}

/// `AirportError::Unimplemented` for a request naming an operation this
/// server doesn't recognize in its headers.
pub fn unknown_operation(value: &str) -> AirportError {
    AirportError::BadDescriptor(format!("unrecognized airport-operation: {value}"))
}
