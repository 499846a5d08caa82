//! Scalar function exchange pipeline (spec.md §4.7 "Scalar function
//! pipeline").

use super::pipeline::{ExchangeProcessor, OutputItem};
use super::ExchangeContext;
use crate::catalog::{ScalarFunction, SchemaExt};
use crate::context::FlightPath;
use crate::error::{AirportError, Result};
use arrow_array::RecordBatch;
use arrow_flight::FlightData;
use arrow_schema::{Field, Schema};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::{Status, Streaming};

struct ScalarProcessor {
    function: Arc<dyn ScalarFunction>,
}

#[async_trait]
impl ExchangeProcessor for ScalarProcessor {
    async fn process_batch(&mut self, batch: RecordBatch) -> Result<Vec<OutputItem>> {
        let in_len = batch.num_rows();
        let result = self.function.execute(&batch).await?;
        if result.len() != in_len {
            return Err(AirportError::Internal(format!(
                "scalar function `{}` returned {} rows for {} input rows",
                self.function.name(),
                result.len(),
                in_len
            )));
        }
        if result.data_type() != &self.function.signature().return_type {
            return Err(AirportError::Internal(format!(
                "scalar function `{}` returned type {:?}, expected {:?}",
                self.function.name(),
                result.data_type(),
                self.function.signature().return_type
            )));
        }
        let schema = Arc::new(Schema::new(vec![Field::new(
            "result",
            self.function.signature().return_type.clone(),
            true,
        )]));
        let out_batch = RecordBatch::try_new(schema, vec![result]).map_err(AirportError::from)?;
        Ok(vec![OutputItem::Batch(out_batch)])
    }
}

/// Run the scalar-function `DoExchange` workload (spec.md §4.7).
pub async fn run(
    path: FlightPath,
    input: Streaming<FlightData>,
    ctx: ExchangeContext,
    cancel: CancellationToken,
) -> Result<BoxStream<'static, std::result::Result<FlightData, Status>>> {
    let schema = ctx.catalog.schema(&path.schema).await?;
    let function = schema.find_scalar_function(&path.name).await?;
    let output_schema = Arc::new(Schema::new(vec![Field::new(
        "result",
        function.signature().return_type.clone(),
        true,
    )]));
    let processor = Box::new(ScalarProcessor { function });
    Ok(super::pipeline::run(input, output_schema, processor, cancel))
}
