//! DML exchange pipelines: insert, update, delete (spec.md §4.7 "DML
//! pipelines").

use super::pipeline::{ExchangeProcessor, OutputItem};
use super::ExchangeContext;
use crate::catalog::table::field_is_rowid;
use crate::catalog::SchemaExt;
use crate::codec::msgpack;
use crate::context::{ExchangeOperation, FlightPath};
use crate::error::{AirportError, Result};
use crate::scan::DmlOptions;
use arrow_array::{Array, Int32Array, Int64Array, RecordBatch, UInt64Array};
use arrow_flight::FlightData;
use arrow_schema::SchemaRef;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::{Status, Streaming};

/// Extract `rowid` values from a batch as `i64` (spec.md §4.7 "Update":
/// supports `int64`/`int32`/`uint64`; nulls are skipped).
fn extract_row_ids(batch: &RecordBatch) -> Result<Vec<i64>> {
    let idx = batch
        .schema()
        .fields()
        .iter()
        .position(|f| field_is_rowid(f))
        .ok_or_else(|| AirportError::MalformedPayload("input batch has no rowid column".into()))?;
    let column = batch.column(idx);
    let mut ids = Vec::with_capacity(column.len());
    if let Some(arr) = column.as_any().downcast_ref::<Int64Array>() {
        for i in 0..arr.len() {
            if !arr.is_null(i) {
                ids.push(arr.value(i));
            }
        }
    } else if let Some(arr) = column.as_any().downcast_ref::<Int32Array>() {
        for i in 0..arr.len() {
            if !arr.is_null(i) {
                ids.push(i64::from(arr.value(i)));
            }
        }
    } else if let Some(arr) = column.as_any().downcast_ref::<UInt64Array>() {
        for i in 0..arr.len() {
            if !arr.is_null(i) {
                ids.push(arr.value(i) as i64);
            }
        }
    } else {
        return Err(AirportError::MalformedPayload(
            "rowid column must be int64, int32, or uint64".into(),
        ));
    }
    Ok(ids)
}

/// Drop the rowid column, leaving only data columns (spec.md §4.7
/// "Update": strip that column to form the data batch).
fn strip_row_id(batch: &RecordBatch) -> Result<RecordBatch> {
    let keep: Vec<usize> = batch
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| !field_is_rowid(f))
        .map(|(i, _)| i)
        .collect();
    batch.project(&keep).map_err(AirportError::from)
}

/// Reshape a table's DML-returned batch to match `target_schema` exactly
/// by name, filling any missing column with typed nulls (spec.md §4.7
/// "Update": a schema adapter that reuses existing columns by name and
/// fills missing columns with typed nulls").
fn adapt_schema(batch: &RecordBatch, target_schema: &SchemaRef) -> Result<RecordBatch> {
    let mut columns = Vec::with_capacity(target_schema.fields().len());
    for field in target_schema.fields() {
        if let Some((idx, _)) = batch.schema().fields().iter().enumerate().find(|(_, f)| f.name() == field.name()) {
            columns.push(batch.column(idx).clone());
        } else {
            columns.push(arrow_array::new_null_array(field.data_type(), batch.num_rows()));
        }
    }
    RecordBatch::try_new(target_schema.clone(), columns).map_err(AirportError::from)
}

#[derive(Serialize)]
struct TotalChanged {
    total_changed: u64,
}

struct InsertProcessor {
    table: Arc<dyn crate::catalog::Table>,
    total: u64,
    opts: DmlOptions,
}

#[async_trait]
impl ExchangeProcessor for InsertProcessor {
    async fn process_batch(&mut self, batch: RecordBatch) -> Result<Vec<OutputItem>> {
        let Some(insertable) = self.table.as_insertable() else {
            return Err(AirportError::Unimplemented("InsertableTable"));
        };
        self.total += batch.num_rows() as u64;
        let reader = futures::stream::once(async move { Ok::<_, arrow_schema::ArrowError>(batch) }).boxed();
        let result = insertable.insert(reader, self.opts.clone()).await?;
        let mut items = Vec::new();
        if let Some(mut returning) = result.returning_data {
            while let Some(b) = returning.next().await {
                items.push(OutputItem::Batch(b.map_err(AirportError::from)?));
            }
        }
        Ok(items)
    }

    async fn finish(&mut self) -> Result<Vec<OutputItem>> {
        Ok(vec![OutputItem::Final(msgpack::to_vec(&TotalChanged {
            total_changed: self.total,
        })?)])
    }
}

struct UpdateProcessor {
    table: Arc<dyn crate::catalog::Table>,
    total: u64,
    opts: DmlOptions,
    input_schema: SchemaRef,
}

#[async_trait]
impl ExchangeProcessor for UpdateProcessor {
    async fn process_batch(&mut self, batch: RecordBatch) -> Result<Vec<OutputItem>> {
        let Some(updatable) = self.table.as_updatable() else {
            return Err(AirportError::Unimplemented("UpdatableTable"));
        };
        let row_ids = extract_row_ids(&batch)?;
        let data_batch = strip_row_id(&batch)?;
        self.total += row_ids.len() as u64;
        let reader = futures::stream::once(async move { Ok::<_, arrow_schema::ArrowError>(data_batch) }).boxed();
        let result = updatable.update(row_ids, reader, self.opts.clone()).await?;
        let mut items = Vec::new();
        if let Some(mut returning) = result.returning_data {
            while let Some(b) = returning.next().await {
                let adapted = adapt_schema(&b.map_err(AirportError::from)?, &self.input_schema)?;
                items.push(OutputItem::Batch(adapted));
            }
        }
        Ok(items)
    }

    async fn finish(&mut self) -> Result<Vec<OutputItem>> {
        Ok(vec![OutputItem::Final(msgpack::to_vec(&TotalChanged {
            total_changed: self.total,
        })?)])
    }
}

struct DeleteProcessor {
    table: Arc<dyn crate::catalog::Table>,
    total: u64,
    opts: DmlOptions,
}

#[async_trait]
impl ExchangeProcessor for DeleteProcessor {
    async fn process_batch(&mut self, batch: RecordBatch) -> Result<Vec<OutputItem>> {
        let Some(deletable) = self.table.as_deletable() else {
            return Err(AirportError::Unimplemented("DeletableTable"));
        };
        let row_ids = extract_row_ids(&batch)?;
        self.total += row_ids.len() as u64;
        let result = deletable.delete(row_ids, self.opts.clone()).await?;
        let mut items = Vec::new();
        if let Some(mut returning) = result.returning_data {
            while let Some(b) = returning.next().await {
                items.push(OutputItem::Batch(b.map_err(AirportError::from)?));
            }
        }
        Ok(items)
    }

    async fn finish(&mut self) -> Result<Vec<OutputItem>> {
        Ok(vec![OutputItem::Final(msgpack::to_vec(&TotalChanged {
            total_changed: self.total,
        })?)])
    }
}

/// Build `DMLOptions` from the request's RETURNING signal (spec.md §3
/// "DMLOptions": when `returning` is true, `returningColumns` is
/// populated with the table's data columns, i.e. all fields except
/// pseudo-columns). `return-chunks: "1"` (spec.md §6) is that signal.
fn dml_options(returning: bool, full_schema: &SchemaRef) -> DmlOptions {
    let returning_columns = if returning {
        crate::catalog::table::data_columns(full_schema)
    } else {
        Vec::new()
    };
    DmlOptions {
        returning,
        returning_columns,
    }
}

/// Run an insert/update/delete `DoExchange` workload, wrapped in
/// `withTransaction` when a transaction id is present (spec.md §4.7
/// "All DML operations are wrapped in `withTransaction`").
pub async fn run(
    operation: ExchangeOperation,
    path: FlightPath,
    input: Streaming<FlightData>,
    ctx: ExchangeContext,
    cancel: CancellationToken,
) -> Result<BoxStream<'static, std::result::Result<FlightData, Status>>> {
    let schema_obj = ctx.catalog.schema(&path.schema).await?;
    let table = schema_obj.find_table(&path.name).await?;
    let full_schema = table.arrow_schema(None);
    let opts = dml_options(ctx.request.return_chunks, &full_schema);

    let (output_schema, processor): (SchemaRef, Box<dyn ExchangeProcessor>) = match operation {
        ExchangeOperation::Insert => {
            let data_fields: Vec<_> = full_schema
                .fields()
                .iter()
                .filter(|f| !field_is_rowid(f))
                .cloned()
                .collect();
            let data_schema = Arc::new(arrow_schema::Schema::new(data_fields));
            (
                data_schema,
                Box::new(InsertProcessor {
                    table,
                    total: 0,
                    opts,
                }),
            )
        }
        ExchangeOperation::Update => (
            full_schema.clone(),
            Box::new(UpdateProcessor {
                table,
                total: 0,
                opts,
                input_schema: full_schema,
            }),
        ),
        ExchangeOperation::Delete => (
            full_schema,
            Box::new(DeleteProcessor {
                table,
                total: 0,
                opts,
            }),
        ),
        _ => unreachable!("dispatched only for DML operations"),
    };

    let transaction_id = ctx.request.transaction_id.clone();
    let transactions = ctx.transactions.clone();
    let wrapped = TransactionWrappedProcessor {
        inner: processor,
        transaction_id,
        transactions,
        failed: false,
    };

    Ok(super::pipeline::run(input, output_schema, Box::new(wrapped), cancel))
}

/// Wraps a DML processor so the bound transaction commits on a clean
/// finish and rolls back if any batch failed (spec.md §4.9, §4.7
/// "withTransaction").
struct TransactionWrappedProcessor {
    inner: Box<dyn ExchangeProcessor>,
    transaction_id: Option<String>,
    transactions: Arc<crate::transaction::TransactionManager>,
    failed: bool,
}

#[async_trait]
impl ExchangeProcessor for TransactionWrappedProcessor {
    async fn process_batch(&mut self, batch: RecordBatch) -> Result<Vec<OutputItem>> {
        match self.inner.process_batch(batch).await {
            Ok(items) => Ok(items),
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    async fn finish(&mut self) -> Result<Vec<OutputItem>> {
        let result = self.inner.finish().await;
        if let Some(id) = &self.transaction_id {
            if self.failed || result.is_err() {
                self.transactions.rollback(id).await;
            } else {
                self.transactions.commit(id).await;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::{DataType, Field, Schema};
    use std::collections::HashMap;

    fn schema_with_rowid() -> SchemaRef {
        let mut meta = HashMap::new();
        meta.insert(crate::catalog::table::IS_ROWID_METADATA_KEY.to_string(), "1".to_string());
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false).with_metadata(meta),
            Field::new("name", DataType::Utf8, true),
        ]))
    }

    #[test]
    fn returning_false_yields_no_columns() {
        let opts = dml_options(false, &schema_with_rowid());
        assert!(!opts.returning);
        assert!(opts.returning_columns.is_empty());
    }

    #[test]
    fn returning_true_projects_data_columns_only() {
        let opts = dml_options(true, &schema_with_rowid());
        assert!(opts.returning);
        assert_eq!(opts.returning_columns, vec!["name".to_string()]);
    }
}
