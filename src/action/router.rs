//! `DoAction` dispatch (spec.md §4.2).

use super::{ddl, discovery, metadata, ActionContext};
use crate::codec::msgpack;
use crate::error::{AirportError, Result};
use serde::{Deserialize, Serialize};

/// The full set of recognized action names, in the order `ListActions`
/// reports them (spec.md §4.2, §6 "ListActions").
pub const ACTION_NAMES: &[&str] = &[
    "list_schemas",
    "endpoints",
    "flight_info",
    "table_function_flight_info",
    "catalog_version",
    "column_statistics",
    "create_schema",
    "drop_schema",
    "create_table",
    "drop_table",
    "add_column",
    "remove_column",
    "rename_column",
    "rename_table",
    "change_column_type",
    "set_not_null",
    "drop_not_null",
    "set_default",
    "add_field",
    "rename_field",
    "create_transaction",
    "get_transaction_status",
];

#[derive(Deserialize)]
struct CreateTransactionParams {
    #[serde(default)]
    catalog: Option<String>,
}

#[derive(Serialize)]
struct CreateTransactionReply {
    transaction_id: String,
}

#[derive(Deserialize)]
struct TransactionIdParams {
    transaction_id: String,
}

#[derive(Serialize)]
struct TransactionStatusReply {
    status: String,
    exists: bool,
}

async fn create_transaction(ctx: &ActionContext, body: &[u8]) -> Result<Vec<u8>> {
    let params: CreateTransactionParams = msgpack::from_slice(body)?;
    let id = ctx.transactions.create_transaction(params.catalog).await;
    msgpack::to_vec(&CreateTransactionReply { transaction_id: id })
}

async fn get_transaction_status(ctx: &ActionContext, body: &[u8]) -> Result<Vec<u8>> {
    let params: TransactionIdParams = msgpack::from_slice(body)?;
    let (state, exists) = ctx.transactions.status(&params.transaction_id).await;
    msgpack::to_vec(&TransactionStatusReply {
        status: state.to_string(),
        exists,
    })
}

/// Dispatch a `DoAction` body to its handler by name (spec.md §4.2).
/// Unknown names return `AirportError::UnknownAction`, which maps onto
/// an unimplemented status.
pub async fn dispatch(name: &str, body: &[u8], ctx: &ActionContext) -> Result<Vec<u8>> {
    match name {
        "list_schemas" => discovery::list_schemas(ctx).await,
        "endpoints" => metadata::endpoints(ctx, body).await,
        "flight_info" => metadata::flight_info(ctx, body).await,
        "table_function_flight_info" => metadata::table_function_flight_info(ctx, body).await,
        "catalog_version" => metadata::catalog_version(ctx, body).await,
        "column_statistics" => metadata::column_statistics(ctx, body).await,
        "create_schema" => ddl::create_schema(ctx, body).await,
        "drop_schema" => ddl::drop_schema(ctx, body).await,
        "create_table" => ddl::create_table(ctx, body).await,
        "drop_table" => ddl::drop_table(ctx, body).await,
        "add_column" => ddl::add_column(ctx, body).await,
        "remove_column" => ddl::remove_column(ctx, body).await,
        "rename_column" => ddl::rename_column(ctx, body).await,
        "rename_table" => ddl::rename_table(ctx, body).await,
        "change_column_type" => ddl::change_column_type(ctx, body).await,
        "set_not_null" => ddl::set_not_null(ctx, body).await,
        "drop_not_null" => ddl::drop_not_null(ctx, body).await,
        "set_default" => ddl::set_default(ctx, body).await,
        "add_field" => ddl::add_field(ctx, body).await,
        "rename_field" => ddl::rename_field(ctx, body).await,
        "create_transaction" => create_transaction(ctx, body).await,
        "get_transaction_status" => get_transaction_status(ctx, body).await,
        other => Err(AirportError::UnknownAction(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_cover_every_dispatch_arm() {
        assert_eq!(ACTION_NAMES.len(), 22);
        assert!(ACTION_NAMES.contains(&"list_schemas"));
        assert!(ACTION_NAMES.contains(&"create_transaction"));
    }
}
