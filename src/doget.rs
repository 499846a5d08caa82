//! `DoGet` (spec.md §4.6): ticket decode, schema resolve, scan dispatch,
//! Arrow IPC streaming.

use crate::catalog::{Catalog, SchemaExt};
use crate::codec::ticket::Ticket;
use crate::error::{AirportError, Result};
use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_flight::FlightData;
use arrow_schema::SchemaRef;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Resolve a ticket against `catalog` and stream the result as Arrow IPC
/// `FlightData` (spec.md §4.6).
///
/// `requested_catalog` is the `airport-catalog` header value for this
/// request; a ticket naming a different catalog is a mismatch (spec.md
/// §4.6 "reject a catalog mismatch").
pub async fn handle(
    ticket_bytes: &[u8],
    catalog: Arc<dyn Catalog>,
    requested_catalog: &str,
    cancel: CancellationToken,
) -> Result<BoxStream<'static, std::result::Result<FlightData, Status>>> {
    let ticket = Ticket::decode(ticket_bytes)?;
    if let Some(ticket_catalog) = &ticket.catalog {
        if ticket_catalog != requested_catalog {
            return Err(AirportError::CatalogNotFound(ticket_catalog.clone()));
        }
    }

    let schema_obj = catalog.schema(&ticket.schema).await?;
    let is_time_travel = ticket.time_point().is_some();

    let (declared_schema, batches): (SchemaRef, crate::scan::BatchStream) = if let Some(table_name) = &ticket.table {
        let table = schema_obj.find_table(table_name).await?;
        let options = ticket.to_scan_options();
        let declared = table.arrow_schema(options.columns.as_deref());
        let stream = table.scan(options).await?;
        (declared, stream)
    } else if let Some(func_name) = &ticket.table_function {
        let func = schema_obj.find_table_function(func_name).await?;
        let params: Vec<rmpv::Value> = match &ticket.function_params {
            Some(bytes) => crate::codec::msgpack::from_slice(bytes)?,
            None => Vec::new(),
        };
        let declared = func.schema_for_parameters(&params).await?;
        let options = ticket.to_scan_options();
        let stream = func.execute(&params, options).await?;
        (declared, stream)
    } else {
        return Err(AirportError::InvalidTicket(
            "ticket must set exactly one of table or table_function".into(),
        ));
    };

    let checked = ValidatedStream {
        inner: batches,
        cancel,
        declared_schema: declared_schema.clone(),
        // Time-travel readers are authoritative over their own schema
        // (spec.md §4.6 "except for time-travel scans, where the
        // reader's schema is authoritative").
        validate_schema: !is_time_travel,
        schema_checked: false,
        canceled: false,
    };

    let encoder = FlightDataEncoderBuilder::new()
        .with_schema(declared_schema)
        .build(checked.map(|r| r.map_err(arrow_flight::error::FlightError::from)))
        .map(|r| r.map_err(|e| Status::from(AirportError::Internal(e.to_string()))));

    Ok(encoder.boxed())
}

/// Wraps a batch stream with the per-item cancellation check and the
/// declared-schema validation of spec.md §4.6 ("checking context
/// cancellation between batches"; "validate that the reader's schema
/// equals the declared/full schema").
struct ValidatedStream {
    inner: crate::scan::BatchStream,
    cancel: CancellationToken,
    declared_schema: SchemaRef,
    validate_schema: bool,
    schema_checked: bool,
    canceled: bool,
}

impl futures::Stream for ValidatedStream {
    type Item = std::result::Result<arrow_array::RecordBatch, arrow_schema::ArrowError>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            if self.canceled {
                return std::task::Poll::Ready(None);
            }
            self.canceled = true;
            return std::task::Poll::Ready(Some(Err(arrow_schema::ArrowError::ExternalError(Box::new(
                AirportError::Canceled,
            )))));
        }
        match self.inner.as_mut().poll_next(cx) {
            std::task::Poll::Ready(Some(Ok(batch))) => {
                if self.validate_schema && !self.schema_checked {
                    self.schema_checked = true;
                    if batch.schema() != self.declared_schema {
                        return std::task::Poll::Ready(Some(Err(arrow_schema::ArrowError::SchemaError(format!(
                            "reader schema {:?} does not match declared schema {:?}",
                            batch.schema(),
                            self.declared_schema
                        )))));
                    }
                }
                std::task::Poll::Ready(Some(Ok(batch)))
            }
            other => other,
        }
    }
}

impl Unpin for ValidatedStream {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Schema, Table};
    use crate::scan::ScanOptions;
    use arrow_array::{Int64Array, RecordBatch};
    use arrow_schema::{DataType, Field, Schema as ArrowSchema};
    use async_trait::async_trait;

    struct OneRowTable {
        schema: SchemaRef,
    }

    #[async_trait]
    impl Table for OneRowTable {
        fn name(&self) -> &str {
            "t"
        }
        fn arrow_schema(&self, _projection: Option<&[String]>) -> SchemaRef {
            self.schema.clone()
        }
        async fn scan(&self, _options: ScanOptions) -> Result<crate::scan::BatchStream> {
            let schema = self.schema.clone();
            let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1]))]).unwrap();
            Ok(stream::iter(vec![Ok(batch)]).boxed())
        }
    }

    struct OneTableSchema {
        table: Arc<dyn Table>,
    }

    #[async_trait]
    impl Schema for OneTableSchema {
        fn name(&self) -> &str {
            "main"
        }
        async fn tables(&self) -> Result<Vec<Arc<dyn Table>>> {
            Ok(vec![self.table.clone()])
        }
        async fn table_functions(&self) -> Result<Vec<Arc<dyn crate::catalog::TableFunction>>> {
            Ok(vec![])
        }
        async fn in_out_table_functions(&self) -> Result<Vec<Arc<dyn crate::catalog::InOutTableFunction>>> {
            Ok(vec![])
        }
        async fn scalar_functions(&self) -> Result<Vec<Arc<dyn crate::catalog::ScalarFunction>>> {
            Ok(vec![])
        }
    }

    struct OneSchemaCatalog {
        schema: Arc<OneTableSchema>,
    }

    #[async_trait]
    impl Catalog for OneSchemaCatalog {
        async fn schemas(&self) -> Result<Vec<Arc<dyn Schema>>> {
            Ok(vec![self.schema.clone()])
        }
        async fn schema(&self, name: &str) -> Result<Arc<dyn Schema>> {
            if name == "main" {
                Ok(self.schema.clone())
            } else {
                Err(AirportError::SchemaNotFound(name.to_string()))
            }
        }
    }

    fn make_catalog() -> Arc<dyn Catalog> {
        let schema = ArrowSchema::new(vec![Field::new("a", DataType::Int64, false)]);
        let table: Arc<dyn Table> = Arc::new(OneRowTable {
            schema: Arc::new(schema),
        });
        let schema_obj = Arc::new(OneTableSchema { table });
        Arc::new(OneSchemaCatalog { schema: schema_obj })
    }

    struct MismatchedTable {
        declared: SchemaRef,
        actual: SchemaRef,
    }

    #[async_trait]
    impl Table for MismatchedTable {
        fn name(&self) -> &str {
            "t"
        }
        fn arrow_schema(&self, _projection: Option<&[String]>) -> SchemaRef {
            self.declared.clone()
        }
        async fn scan(&self, _options: ScanOptions) -> Result<crate::scan::BatchStream> {
            let batch = RecordBatch::try_new(self.actual.clone(), vec![Arc::new(Int64Array::from(vec![1]))]).unwrap();
            Ok(stream::iter(vec![Ok(batch)]).boxed())
        }
    }

    fn make_mismatched_catalog() -> Arc<dyn Catalog> {
        let declared = Arc::new(ArrowSchema::new(vec![Field::new("a", DataType::Int64, false)]));
        let actual = Arc::new(ArrowSchema::new(vec![Field::new("b", DataType::Int64, false)]));
        let table: Arc<dyn Table> = Arc::new(MismatchedTable { declared, actual });
        let schema_obj = Arc::new(OneTableSchema { table });
        Arc::new(OneSchemaCatalog { schema: schema_obj })
    }

    #[tokio::test]
    async fn streams_table_scan() {
        let catalog = make_catalog();
        let ticket = Ticket {
            schema: "main".into(),
            table: Some("t".into()),
            ..Default::default()
        }
        .encode()
        .unwrap();
        let mut out = handle(&ticket, catalog, "", CancellationToken::new()).await.unwrap();
        let mut count = 0;
        while let Some(item) = out.next().await {
            item.unwrap();
            count += 1;
        }
        assert!(count >= 1);
    }

    #[tokio::test]
    async fn rejects_catalog_mismatch() {
        let catalog = make_catalog();
        let ticket = Ticket {
            catalog: Some("other".into()),
            schema: "main".into(),
            table: Some("t".into()),
            ..Default::default()
        }
        .encode()
        .unwrap();
        let err = match handle(&ticket, catalog, "", CancellationToken::new()).await {
            Err(e) => e,
            Ok(_) => panic!("expected handle to fail"),
        };
        assert!(matches!(err, AirportError::CatalogNotFound(_)));
    }

    #[tokio::test]
    async fn rejects_reader_schema_that_does_not_match_declared_schema() {
        let catalog = make_mismatched_catalog();
        let ticket = Ticket {
            schema: "main".into(),
            table: Some("t".into()),
            ..Default::default()
        }
        .encode()
        .unwrap();
        let mut out = handle(&ticket, catalog, "", CancellationToken::new()).await.unwrap();
        let items: Vec<_> = out.by_ref().collect().await;
        assert!(items.iter().any(|item| item.is_err()));
    }

    #[tokio::test]
    async fn time_travel_bypasses_schema_validation() {
        let catalog = make_mismatched_catalog();
        let ticket = Ticket {
            schema: "main".into(),
            table: Some("t".into()),
            time_point_unit: Some("version".into()),
            time_point_value: Some("3".into()),
            ..Default::default()
        }
        .encode()
        .unwrap();
        let mut out = handle(&ticket, catalog, "", CancellationToken::new()).await.unwrap();
        let items: Vec<_> = out.by_ref().collect().await;
        assert!(items.iter().all(|item| item.is_ok()));
    }
}
