//! Per-request context enrichment (spec.md §4.10).

use tonic::metadata::MetadataMap;

/// Headers extracted from every inbound RPC and carried alongside the
/// request through the handler stack (spec.md §4.10, §6 "Headers").
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub authorization: Option<String>,
    pub catalog: String,
    pub trace_id: Option<String>,
    pub client_session_id: Option<String>,
    pub transaction_id: Option<String>,
    /// The `return-chunks` header (spec.md §6): must be `"1"` on function
    /// exchanges, and doubles as the RETURNING-data signal on DML
    /// exchanges (spec.md §3 "DMLOptions", §8 scenarios 1-2).
    pub return_chunks: bool,
}

fn header(metadata: &MetadataMap, name: &str) -> Option<String> {
    metadata
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

impl RequestContext {
    /// Extract the Airport headers from gRPC request metadata
    /// (spec.md §6 "Headers"); `airport-catalog` defaults to the empty
    /// string, which routes to the default catalog.
    #[must_use]
    pub fn from_metadata(metadata: &MetadataMap) -> Self {
        Self {
            authorization: header(metadata, "authorization"),
            catalog: header(metadata, "airport-catalog").unwrap_or_default(),
            trace_id: header(metadata, "airport-trace-id"),
            client_session_id: header(metadata, "airport-client-session-id"),
            transaction_id: header(metadata, "airport-transaction-id"),
            return_chunks: header(metadata, "return-chunks").as_deref() == Some("1"),
        }
    }

    /// The bearer token, if the `authorization` header is well-formed.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.authorization.as_deref()?.strip_prefix("Bearer ")
    }
}

/// The `airport-operation` values recognized on `DoExchange`
/// (spec.md §4.7, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOperation {
    ScalarFunction,
    TableFunction,
    TableFunctionInOut,
    Insert,
    Update,
    Delete,
}

impl ExchangeOperation {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scalar_function" => Some(Self::ScalarFunction),
            "table_function" => Some(Self::TableFunction),
            "table_function_in_out" => Some(Self::TableFunctionInOut),
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// True for the three function workloads, which require `return-chunks:
    /// "1"` (spec.md §4.7, §6); false for the DML workloads.
    #[must_use]
    pub fn is_function(self) -> bool {
        matches!(self, Self::ScalarFunction | Self::TableFunction | Self::TableFunctionInOut)
    }
}

/// The parsed `airport-flight-path` header: `schema/name`.
#[derive(Debug, Clone)]
pub struct FlightPath {
    pub schema: String,
    pub name: String,
}

impl FlightPath {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let (schema, name) = value.split_once('/')?;
        Some(Self {
            schema: schema.to_string(),
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_strips_prefix() {
        let ctx = RequestContext {
            authorization: Some("Bearer abc123".into()),
            ..Default::default()
        };
        assert_eq!(ctx.bearer_token(), Some("abc123"));
    }

    #[test]
    fn bearer_token_none_for_other_schemes() {
        let ctx = RequestContext {
            authorization: Some("Basic abc123".into()),
            ..Default::default()
        };
        assert_eq!(ctx.bearer_token(), None);
    }

    #[test]
    fn flight_path_parses_schema_and_name() {
        let p = FlightPath::parse("main/orders").unwrap();
        assert_eq!(p.schema, "main");
        assert_eq!(p.name, "orders");
    }

    #[test]
    fn flight_path_rejects_missing_slash() {
        assert!(FlightPath::parse("orders").is_none());
    }

    #[test]
    fn return_chunks_requires_exact_value_one() {
        let mut map = tonic::metadata::MetadataMap::new();
        map.insert("return-chunks", "1".parse().unwrap());
        assert!(RequestContext::from_metadata(&map).return_chunks);

        let mut map = tonic::metadata::MetadataMap::new();
        map.insert("return-chunks", "true".parse().unwrap());
        assert!(!RequestContext::from_metadata(&map).return_chunks);

        assert!(!RequestContext::from_metadata(&tonic::metadata::MetadataMap::new()).return_chunks);
    }

    #[test]
    fn exchange_operation_parses_known_values() {
        assert_eq!(
            ExchangeOperation::parse("scalar_function"),
            Some(ExchangeOperation::ScalarFunction)
        );
        assert_eq!(ExchangeOperation::parse("bogus"), None);
    }

    #[test]
    fn is_function_distinguishes_dml_from_function_workloads() {
        assert!(ExchangeOperation::ScalarFunction.is_function());
        assert!(ExchangeOperation::TableFunction.is_function());
        assert!(ExchangeOperation::TableFunctionInOut.is_function());
        assert!(!ExchangeOperation::Insert.is_function());
        assert!(!ExchangeOperation::Update.is_function());
        assert!(!ExchangeOperation::Delete.is_function());
    }
}
