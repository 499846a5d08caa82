//! Scalar and table functions (spec.md §3 "Scalar function",
//! "Table function").

use crate::error::Result;
use crate::scan::{BatchStream, ScanOptions};
use arrow_array::{ArrayRef, RecordBatch};
use arrow_schema::{DataType, SchemaRef};
use async_trait::async_trait;

/// A scalar function's type signature (spec.md §3 "Scalar function").
#[derive(Debug, Clone)]
pub struct Signature {
    pub parameters: Vec<DataType>,
    pub return_type: DataType,
    pub variadic: bool,
}

/// A row-at-a-time scalar function, executed over a whole input batch at
/// once (spec.md §3, §4.7 "Scalar function pipeline").
#[async_trait]
pub trait ScalarFunction: Send + Sync {
    fn name(&self) -> &str;
    fn comment(&self) -> Option<&str> {
        None
    }
    fn signature(&self) -> &Signature;

    /// Returns one array whose length equals `input.num_rows()` and whose
    /// type equals `signature().return_type`.
    async fn execute(&self, input: &RecordBatch) -> Result<ArrayRef>;
}

/// A regular table function: produces rows from parameters alone
/// (spec.md §3 "Table function").
#[async_trait]
pub trait TableFunction: Send + Sync {
    fn name(&self) -> &str;
    fn comment(&self) -> Option<&str> {
        None
    }

    /// Parameter types as Arrow fields with synthetic names, used to
    /// build the discovery payload's `input_schema` (spec.md §4.3).
    fn parameter_types(&self) -> Vec<DataType>;

    async fn schema_for_parameters(&self, params: &[rmpv::Value]) -> Result<SchemaRef>;
    async fn execute(&self, params: &[rmpv::Value], options: ScanOptions) -> Result<BatchStream>;
}

/// An in/out table function: its last parameter is a streamed row set,
/// and it produces a streamed row set in turn (spec.md §3, §4.7
/// "Table-function-in/out pipeline").
#[async_trait]
pub trait InOutTableFunction: Send + Sync {
    fn name(&self) -> &str;
    fn comment(&self) -> Option<&str> {
        None
    }

    fn parameter_types(&self) -> Vec<DataType>;

    async fn schema_for_parameters(&self, params: &[rmpv::Value], input_schema: &SchemaRef) -> Result<SchemaRef>;

    /// Execute the function against one input batch at a time, returning
    /// the batches it produces for that input.
    async fn execute(
        &self,
        params: &[rmpv::Value],
        input: RecordBatch,
        options: &ScanOptions,
    ) -> Result<BatchStream>;
}
