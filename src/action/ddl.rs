//! DDL action handlers (spec.md §4.5).

use super::ActionContext;
use crate::catalog::capability::DynamicSchema;
use crate::catalog::SchemaExt;
use crate::codec::msgpack;
use crate::codec::schema as schema_codec;
use crate::codec::ticket::Ticket;
use crate::error::{AirportError, Result};
use arrow_flight::FlightDescriptor;
use arrow_schema::DataType;
use prost::Message;
use serde::Deserialize;

fn empty_success() -> Result<Vec<u8>> {
    Ok(Vec::new())
}

/// Resolve a schema's `DynamicSchema` capability or fail unimplemented
/// (spec.md §7).
async fn dynamic_schema(
    ctx: &ActionContext,
    schema_name: &str,
) -> Result<std::sync::Arc<dyn crate::catalog::Schema>> {
    let schema = ctx.catalog.schema(schema_name).await?;
    if schema.as_dynamic().is_none() {
        return Err(AirportError::Unimplemented("DynamicSchema"));
    }
    Ok(schema)
}

#[derive(Deserialize)]
struct SchemaNameParams {
    schema: String,
    #[serde(default)]
    comment: Option<String>,
}

/// `create_schema`: returns a `FlightInfo`-shaped ack is not required by
/// spec.md §4.5 (creates/changes return a `FlightInfo` only for
/// table/column operations); schema creation returns empty success.
pub async fn create_schema(ctx: &ActionContext, body: &[u8]) -> Result<Vec<u8>> {
    let params: SchemaNameParams = msgpack::from_slice(body)?;
    if ctx.catalog.schema(&params.schema).await.is_ok() {
        return Err(AirportError::AlreadyExists {
            kind: "schema",
            name: params.schema,
        });
    }
    let Some(dynamic_catalog) = ctx.catalog.as_dynamic() else {
        return Err(AirportError::Unimplemented("DynamicCatalog"));
    };
    dynamic_catalog
        .create_schema(&params.schema, params.comment.as_deref())
        .await?;
    empty_success()
}

#[derive(Deserialize)]
struct DropSchemaParams {
    schema: String,
    #[serde(default)]
    cascade: bool,
    #[serde(default)]
    ignore_not_found: bool,
}

/// `drop_schema` (spec.md §4.5, §7, §8 "`ignore_not_found=true`").
pub async fn drop_schema(ctx: &ActionContext, body: &[u8]) -> Result<Vec<u8>> {
    let params: DropSchemaParams = msgpack::from_slice(body)?;
    let Some(dynamic_catalog) = ctx.catalog.as_dynamic() else {
        return Err(AirportError::Unimplemented("DynamicCatalog"));
    };
    match ctx.catalog.schema(&params.schema).await {
        Ok(schema) => {
            if !params.cascade {
                let is_empty = schema.tables().await?.is_empty()
                    && schema.table_functions().await?.is_empty()
                    && schema.in_out_table_functions().await?.is_empty()
                    && schema.scalar_functions().await?.is_empty();
                if !is_empty {
                    return Err(AirportError::SchemaNotEmpty(params.schema));
                }
            }
            dynamic_catalog.drop_schema(&params.schema, params.cascade).await?;
            empty_success()
        }
        Err(e) if e.is_not_found() && params.ignore_not_found => empty_success(),
        Err(e) => Err(e),
    }
}

#[derive(Deserialize)]
struct CreateTableParams {
    schema: String,
    name: String,
    #[serde(default)]
    comment: Option<String>,
    arrow_schema: serde_bytes::ByteBuf,
}

/// `create_table`: returns a `FlightInfo` reflecting the new table
/// (spec.md §4.5).
pub async fn create_table(ctx: &ActionContext, body: &[u8]) -> Result<Vec<u8>> {
    let params: CreateTableParams = msgpack::from_slice(body)?;
    let schema = dynamic_schema(ctx, &params.schema).await?;
    if schema.find_table(&params.name).await.is_ok() {
        return Err(AirportError::AlreadyExists {
            kind: "table",
            name: params.name,
        });
    }
    let arrow_schema = schema_codec::ipc_bytes_to_schema(&params.arrow_schema)?;
    let table = schema
        .as_dynamic()
        .expect("checked above")
        .create_table(&params.name, arrow_schema.clone(), params.comment.as_deref())
        .await?;

    let descriptor = FlightDescriptor::new_path(vec![params.schema.clone(), params.name.clone()]);
    let ticket = Ticket {
        schema: params.schema,
        table: Some(params.name),
        ..Default::default()
    }
    .encode()?;
    let info = schema_codec::flight_info(descriptor, &table.arrow_schema(None), ticket)?;
    Ok(info.encode_to_vec())
}

#[derive(Deserialize)]
struct TableRefParams {
    schema: String,
    table: String,
    #[serde(default)]
    ignore_not_found: bool,
}

/// `drop_table` (spec.md §4.5).
pub async fn drop_table(ctx: &ActionContext, body: &[u8]) -> Result<Vec<u8>> {
    let params: TableRefParams = msgpack::from_slice(body)?;
    match dynamic_schema(ctx, &params.schema).await {
        Ok(schema) => match schema.find_table(&params.table).await {
            Ok(_) => {
                schema.as_dynamic().expect("checked above").drop_table(&params.table).await?;
                empty_success()
            }
            Err(e) if e.is_not_found() && params.ignore_not_found => empty_success(),
            Err(e) => Err(e),
        },
        Err(e) if e.is_not_found() && params.ignore_not_found => empty_success(),
        Err(e) => Err(e),
    }
}

#[derive(Deserialize)]
struct RenameTableParams {
    schema: String,
    table: String,
    new_name: String,
}

/// `rename_table` (spec.md §4.5).
pub async fn rename_table(ctx: &ActionContext, body: &[u8]) -> Result<Vec<u8>> {
    let params: RenameTableParams = msgpack::from_slice(body)?;
    let schema = dynamic_schema(ctx, &params.schema).await?;
    let _ = schema.find_table(&params.table).await?;
    if schema.find_table(&params.new_name).await.is_ok() {
        return Err(AirportError::AlreadyExists {
            kind: "table",
            name: params.new_name,
        });
    }
    schema
        .as_dynamic()
        .expect("checked above")
        .rename_table(&params.table, &params.new_name)
        .await?;
    empty_success()
}

/// Column/field mutation parameters common to most of the remaining
/// handlers (spec.md §4.5).
#[derive(Deserialize)]
struct ColumnParams {
    schema: String,
    table: String,
    column: String,
    #[serde(default)]
    data_type: Option<String>,
    #[serde(default)]
    nullable: bool,
    #[serde(default)]
    new_name: Option<String>,
    #[serde(default)]
    default_expr: Option<String>,
    #[serde(default)]
    field_path: Vec<String>,
    #[serde(default)]
    ignore_not_found: bool,
}

async fn dynamic_table(
    ctx: &ActionContext,
    schema_name: &str,
    table_name: &str,
) -> Result<std::sync::Arc<dyn crate::catalog::Table>> {
    let schema = ctx.catalog.schema(schema_name).await?;
    let table = schema.find_table(table_name).await?;
    if table.as_dynamic().is_none() {
        return Err(AirportError::Unimplemented("DynamicTable"));
    }
    Ok(table)
}

async fn post_change_flight_info(schema: &str, table_name: &str, table: &std::sync::Arc<dyn crate::catalog::Table>) -> Result<Vec<u8>> {
    let descriptor = FlightDescriptor::new_path(vec![schema.to_string(), table_name.to_string()]);
    let ticket = Ticket {
        schema: schema.to_string(),
        table: Some(table_name.to_string()),
        ..Default::default()
    }
    .encode()?;
    let info = schema_codec::flight_info(descriptor, &table.arrow_schema(None), ticket)?;
    Ok(info.encode_to_vec())
}

fn parse_data_type(name: &str) -> Result<DataType> {
    super::metadata::duckdb_type_to_arrow(name)
}

/// `add_column`: returns the updated table's `FlightInfo`.
pub async fn add_column(ctx: &ActionContext, body: &[u8]) -> Result<Vec<u8>> {
    let params: ColumnParams = msgpack::from_slice(body)?;
    let table = dynamic_table(ctx, &params.schema, &params.table).await?;
    let data_type = parse_data_type(params.data_type.as_deref().unwrap_or("VARCHAR"))?;
    table
        .as_dynamic()
        .expect("checked above")
        .add_column(&params.column, &data_type, params.nullable)
        .await?;
    post_change_flight_info(&params.schema, &params.table, &table).await
}

/// `remove_column` (spec.md §4.5).
pub async fn remove_column(ctx: &ActionContext, body: &[u8]) -> Result<Vec<u8>> {
    let params: ColumnParams = msgpack::from_slice(body)?;
    match dynamic_table(ctx, &params.schema, &params.table).await {
        Ok(table) => {
            table
                .as_dynamic()
                .expect("checked above")
                .remove_column(&params.column, params.ignore_not_found)
                .await?;
            empty_success()
        }
        Err(e) if e.is_not_found() && params.ignore_not_found => empty_success(),
        Err(e) => Err(e),
    }
}

/// `rename_column` (spec.md §4.5).
pub async fn rename_column(ctx: &ActionContext, body: &[u8]) -> Result<Vec<u8>> {
    let params: ColumnParams = msgpack::from_slice(body)?;
    let table = dynamic_table(ctx, &params.schema, &params.table).await?;
    let new_name = params
        .new_name
        .clone()
        .ok_or_else(|| AirportError::MalformedPayload("new_name is required".into()))?;
    table
        .as_dynamic()
        .expect("checked above")
        .rename_column(&params.column, &new_name)
        .await?;
    post_change_flight_info(&params.schema, &params.table, &table).await
}

/// `change_column_type` (spec.md §4.5).
pub async fn change_column_type(ctx: &ActionContext, body: &[u8]) -> Result<Vec<u8>> {
    let params: ColumnParams = msgpack::from_slice(body)?;
    let table = dynamic_table(ctx, &params.schema, &params.table).await?;
    let data_type = parse_data_type(
        params
            .data_type
            .as_deref()
            .ok_or_else(|| AirportError::MalformedPayload("data_type is required".into()))?,
    )?;
    table
        .as_dynamic()
        .expect("checked above")
        .change_column_type(&params.column, &data_type)
        .await?;
    post_change_flight_info(&params.schema, &params.table, &table).await
}

/// `set_not_null` (spec.md §4.5).
pub async fn set_not_null(ctx: &ActionContext, body: &[u8]) -> Result<Vec<u8>> {
    let params: ColumnParams = msgpack::from_slice(body)?;
    let table = dynamic_table(ctx, &params.schema, &params.table).await?;
    table.as_dynamic().expect("checked above").set_not_null(&params.column).await?;
    empty_success()
}

/// `drop_not_null` (spec.md §4.5).
pub async fn drop_not_null(ctx: &ActionContext, body: &[u8]) -> Result<Vec<u8>> {
    let params: ColumnParams = msgpack::from_slice(body)?;
    let table = dynamic_table(ctx, &params.schema, &params.table).await?;
    table.as_dynamic().expect("checked above").drop_not_null(&params.column).await?;
    empty_success()
}

/// `set_default` (spec.md §4.5).
pub async fn set_default(ctx: &ActionContext, body: &[u8]) -> Result<Vec<u8>> {
    let params: ColumnParams = msgpack::from_slice(body)?;
    let table = dynamic_table(ctx, &params.schema, &params.table).await?;
    let expr = params
        .default_expr
        .clone()
        .ok_or_else(|| AirportError::MalformedPayload("default_expr is required".into()))?;
    table.as_dynamic().expect("checked above").set_default(&params.column, &expr).await?;
    empty_success()
}

/// `add_field` (spec.md §4.5).
pub async fn add_field(ctx: &ActionContext, body: &[u8]) -> Result<Vec<u8>> {
    let params: ColumnParams = msgpack::from_slice(body)?;
    let table = dynamic_table(ctx, &params.schema, &params.table).await?;
    let data_type = parse_data_type(
        params
            .data_type
            .as_deref()
            .ok_or_else(|| AirportError::MalformedPayload("data_type is required".into()))?,
    )?;
    table
        .as_dynamic()
        .expect("checked above")
        .add_field(&params.column, &params.field_path, &data_type)
        .await?;
    post_change_flight_info(&params.schema, &params.table, &table).await
}

/// `rename_field` (spec.md §4.5).
pub async fn rename_field(ctx: &ActionContext, body: &[u8]) -> Result<Vec<u8>> {
    let params: ColumnParams = msgpack::from_slice(body)?;
    let table = dynamic_table(ctx, &params.schema, &params.table).await?;
    let new_name = params
        .new_name
        .clone()
        .ok_or_else(|| AirportError::MalformedPayload("new_name is required".into()))?;
    table
        .as_dynamic()
        .expect("checked above")
        .rename_field(&params.column, &params.field_path, &new_name)
        .await?;
    post_change_flight_info(&params.schema, &params.table, &table).await
}
