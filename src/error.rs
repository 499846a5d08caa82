//! Error types and their mapping onto gRPC status codes.

use tonic::Status;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, AirportError>;

/// Errors produced while serving the Airport dialect of Arrow Flight.
///
/// Each variant maps to exactly one gRPC status per spec.md §7; the
/// mapping lives in `impl From<AirportError> for tonic::Status` below.
#[derive(thiserror::Error, Debug)]
pub enum AirportError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("bad flight descriptor: {0}")]
    BadDescriptor(String),

    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid ticket: {0}")]
    InvalidTicket(String),

    #[error("schema not found: {0}")]
    SchemaNotFound(String),

    #[error("table not found: {schema}/{table}")]
    TableNotFound { schema: String, table: String },

    #[error("table function not found: {schema}/{name}")]
    TableFunctionNotFound { schema: String, name: String },

    #[error("scalar function not found: {schema}/{name}")]
    ScalarFunctionNotFound { schema: String, name: String },

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("catalog not found: {0}")]
    CatalogNotFound(String),

    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("schema `{0}` is not empty; use cascade to drop non-empty schemas")]
    SchemaNotEmpty(String),

    #[error("capability not implemented: {0}")]
    Unimplemented(&'static str),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("missing or invalid bearer token")]
    Unauthenticated,

    #[error("access to catalog `{0}` denied")]
    PermissionDenied(String),

    #[error("request canceled")]
    Canceled,

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error(transparent)]
    MsgpackEncode(#[from] rmp_serde::encode::Error),

    #[error(transparent)]
    MsgpackDecode(#[from] rmp_serde::decode::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("compression error: {0}")]
    Compression(String),
}

impl AirportError {
    /// True when a not-found error should be suppressed into a success,
    /// per spec.md §4.5 / §7 (`ignore_not_found`).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AirportError::SchemaNotFound(_)
                | AirportError::TableNotFound { .. }
                | AirportError::TableFunctionNotFound { .. }
                | AirportError::ScalarFunctionNotFound { .. }
                | AirportError::ColumnNotFound(_)
                | AirportError::CatalogNotFound(_)
        )
    }
}

impl From<AirportError> for Status {
    fn from(err: AirportError) -> Self {
        use AirportError::*;
        match &err {
            MalformedPayload(_) | BadDescriptor(_) | MissingHeader(_) | InvalidTicket(_) => {
                Status::invalid_argument(err.to_string())
            }
            SchemaNotFound(_)
            | TableNotFound { .. }
            | TableFunctionNotFound { .. }
            | ScalarFunctionNotFound { .. }
            | ColumnNotFound(_)
            | CatalogNotFound(_) => Status::not_found(err.to_string()),
            AlreadyExists { .. } => Status::already_exists(err.to_string()),
            SchemaNotEmpty(_) => Status::failed_precondition(err.to_string()),
            Unimplemented(_) | UnknownAction(_) => Status::unimplemented(err.to_string()),
            Unauthenticated => Status::unauthenticated(err.to_string()),
            PermissionDenied(_) => Status::permission_denied(err.to_string()),
            Canceled => Status::cancelled(err.to_string()),
            Internal(_) | Arrow(_) | MsgpackEncode(_) | MsgpackDecode(_) | Json(_)
            | Compression(_) => Status::internal(err.to_string()),
        }
    }
}
