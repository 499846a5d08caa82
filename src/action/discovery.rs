//! Catalog discovery payload builder (spec.md §4.3, §6, §8 scenario 6).

use super::ActionContext;
use crate::catalog::capability::CatalogVersion;
use crate::catalog::{Schema, Table};
use crate::codec::{compressed, msgpack, schema as schema_codec};
use crate::error::Result;
use arrow_flight::{FlightDescriptor, FlightInfo};
use arrow_schema::{DataType, Field, Schema as ArrowSchema};
use prost::Message;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// `app_metadata` entry type tags (spec.md §4.3).
const TYPE_TABLE: &str = "table";
const TYPE_TABLE_FUNCTION: &str = "table_function";
const TYPE_SCALAR_FUNCTION: &str = "scalar_function";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EntryAppMetadata {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub schema: String,
    pub catalog: String,
    pub name: String,
    pub comment: Option<String>,
    pub input_schema: Option<serde_bytes::ByteBuf>,
    pub action_name: Option<String>,
    pub description: String,
    pub extra_data: Option<()>,
}

#[derive(Serialize, Deserialize, Debug)]
struct Contents {
    sha256: serde_bytes::ByteBuf,
    url: Option<String>,
    serialized: Option<serde_bytes::ByteBuf>,
}

#[derive(Serialize, Deserialize, Debug)]
struct VersionInfo {
    catalog_version: u64,
    is_fixed: bool,
}

#[derive(Serialize, Deserialize, Debug)]
struct SchemaEntry {
    name: String,
    description: String,
    tags: std::collections::BTreeMap<String, String>,
    contents: Contents,
    is_default: bool,
}

#[derive(Serialize, Deserialize, Debug)]
struct CatalogRoot {
    contents: Contents,
    schemas: Vec<SchemaEntry>,
    version_info: VersionInfo,
}

fn sha256_of(bytes: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().to_vec()
}

fn table_entry(schema_name: &str, table: &Arc<dyn Table>) -> Result<Vec<u8>> {
    let arrow_schema = table.arrow_schema(None);
    let meta = EntryAppMetadata {
        entry_type: TYPE_TABLE.into(),
        schema: schema_name.to_string(),
        catalog: String::new(),
        name: table.name().to_string(),
        comment: table.comment().map(str::to_string),
        input_schema: None,
        action_name: None,
        description: table.comment().unwrap_or_default().to_string(),
        extra_data: None,
    };
    let ticket = crate::codec::ticket::Ticket {
        schema: schema_name.to_string(),
        table: Some(table.name().to_string()),
        ..Default::default()
    };
    let mut schema_for_metadata = (*arrow_schema).clone();
    if table.as_statistics().is_some() {
        let mut md = schema_for_metadata.metadata().clone();
        let _ = md.insert(
            crate::catalog::table::CAN_PRODUCE_STATISTICS_KEY.to_string(),
            "true".to_string(),
        );
        schema_for_metadata = schema_for_metadata.with_metadata(md);
    }
    build_flight_info_bytes(schema_name, table.name(), &schema_for_metadata, ticket.encode()?, meta)
}

fn table_function_entry(schema_name: &str, name: &str, parameter_types: &[DataType]) -> Result<Vec<u8>> {
    let input_fields: Vec<Field> = parameter_types
        .iter()
        .enumerate()
        .map(|(i, dt)| Field::new(format!("param{i}"), dt.clone(), true))
        .collect();
    let input_schema = ArrowSchema::new(input_fields);
    let meta = EntryAppMetadata {
        entry_type: TYPE_TABLE_FUNCTION.into(),
        schema: schema_name.to_string(),
        catalog: String::new(),
        name: name.to_string(),
        comment: None,
        input_schema: Some(serde_bytes::ByteBuf::from(schema_codec::schema_to_ipc_bytes(
            &input_schema,
        )?)),
        action_name: Some("table_function_flight_info".into()),
        description: String::new(),
        extra_data: None,
    };
    // True output schema is resolved later via table_function_flight_info;
    // the placeholder ticket is the empty object per spec.md §4.3.
    build_flight_info_bytes(schema_name, name, &ArrowSchema::empty(), b"{}".to_vec(), meta)
}

fn in_out_table_function_entry(schema_name: &str, name: &str, parameter_types: &[DataType]) -> Result<Vec<u8>> {
    let mut input_fields: Vec<Field> = parameter_types
        .iter()
        .enumerate()
        .map(|(i, dt)| Field::new(format!("param{i}"), dt.clone(), true))
        .collect();
    if let Some(last) = input_fields.last_mut() {
        let mut md = last.metadata().clone();
        let _ = md.insert("is_table_type".to_string(), "1".to_string());
        *last = last.clone().with_metadata(md);
    }
    let input_schema = ArrowSchema::new(input_fields);
    let meta = EntryAppMetadata {
        entry_type: TYPE_TABLE_FUNCTION.into(),
        schema: schema_name.to_string(),
        catalog: String::new(),
        name: name.to_string(),
        comment: None,
        input_schema: Some(serde_bytes::ByteBuf::from(schema_codec::schema_to_ipc_bytes(
            &input_schema,
        )?)),
        action_name: Some("table_function_flight_info".into()),
        description: String::new(),
        extra_data: None,
    };
    build_flight_info_bytes(schema_name, name, &ArrowSchema::empty(), b"{}".to_vec(), meta)
}

fn scalar_function_entry(
    schema_name: &str,
    name: &str,
    return_type: &DataType,
) -> Result<Vec<u8>> {
    let output_schema = ArrowSchema::new(vec![Field::new("result", return_type.clone(), true)]);
    let meta = EntryAppMetadata {
        entry_type: TYPE_SCALAR_FUNCTION.into(),
        schema: schema_name.to_string(),
        catalog: String::new(),
        name: name.to_string(),
        comment: None,
        input_schema: None,
        action_name: Some(name.to_string()),
        description: String::new(),
        extra_data: None,
    };
    build_flight_info_bytes(schema_name, name, &output_schema, b"{}".to_vec(), meta)
}

fn build_flight_info_bytes(
    schema_name: &str,
    name: &str,
    arrow_schema: &ArrowSchema,
    ticket_bytes: Vec<u8>,
    app_metadata: EntryAppMetadata,
) -> Result<Vec<u8>> {
    let descriptor = FlightDescriptor::new_path(vec![schema_name.to_string(), name.to_string()]);
    let mut info = schema_codec::flight_info(descriptor, arrow_schema, ticket_bytes)?;
    info.app_metadata = msgpack::to_vec(&app_metadata)?.into();
    Ok(info.encode_to_vec())
}

/// Build the compressed per-schema payload: a MessagePack array of
/// protobuf-serialized `FlightInfo` bytes, ZStandard-compressed, wrapped
/// (spec.md §4.1 "Per-schema payload").
async fn build_schema_payload(schema: &Arc<dyn Schema>) -> Result<Vec<u8>> {
    let mut infos: Vec<serde_bytes::ByteBuf> = Vec::new();

    for table in schema.tables().await? {
        infos.push(serde_bytes::ByteBuf::from(table_entry(schema.name(), &table)?));
    }
    for func in schema.table_functions().await? {
        infos.push(serde_bytes::ByteBuf::from(table_function_entry(
            schema.name(),
            func.name(),
            &func.parameter_types(),
        )?));
    }
    for func in schema.in_out_table_functions().await? {
        infos.push(serde_bytes::ByteBuf::from(in_out_table_function_entry(
            schema.name(),
            func.name(),
            &func.parameter_types(),
        )?));
    }
    for func in schema.scalar_functions().await? {
        infos.push(serde_bytes::ByteBuf::from(scalar_function_entry(
            schema.name(),
            func.name(),
            &func.signature().return_type,
        )?));
    }

    let inner = msgpack::to_vec(&infos)?;
    compressed::wrap(&inner)
}

/// `list_schemas`: enumerate schemas and build the compressed
/// catalog-discovery payload (spec.md §4.3).
pub async fn list_schemas(ctx: &ActionContext) -> Result<Vec<u8>> {
    let schemas = ctx.catalog.schemas().await?;

    let version_info = match ctx.catalog.as_versioned() {
        Some(v) => {
            let CatalogVersion { version, is_fixed } = v.catalog_version().await?;
            VersionInfo {
                catalog_version: version,
                is_fixed,
            }
        }
        None => VersionInfo {
            catalog_version: 1,
            is_fixed: true,
        },
    };

    let any_explicit_default = schemas.iter().any(|s| s.is_default());
    let mut entries = Vec::with_capacity(schemas.len());
    for (idx, schema) in schemas.iter().enumerate() {
        let serialized = build_schema_payload(schema).await?;
        let is_default = if any_explicit_default {
            schema.is_default()
        } else {
            idx == 0
        };
        entries.push(SchemaEntry {
            name: schema.name().to_string(),
            description: schema.comment().unwrap_or_default().to_string(),
            tags: Default::default(),
            contents: Contents {
                sha256: serde_bytes::ByteBuf::from(sha256_of(&serialized)),
                url: None,
                serialized: Some(serde_bytes::ByteBuf::from(serialized)),
            },
            is_default,
        });
    }

    let root = CatalogRoot {
        contents: Contents {
            sha256: serde_bytes::ByteBuf::from(Vec::new()),
            url: None,
            serialized: None,
        },
        schemas: entries,
        version_info,
    };
    msgpack::to_vec(&root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::function::{InOutTableFunction, ScalarFunction, Signature, TableFunction};
    use crate::catalog::{Catalog, DynamicSchema, Table as TableTrait};
    use crate::error::AirportError;
    use crate::scan::{BatchStream, ScanOptions};
    use crate::transaction::TransactionManager;
    use arrow_schema::SchemaRef;
    use async_trait::async_trait;
    use prost::Message as _;

    struct MockTable {
        name: String,
        schema: SchemaRef,
    }
    #[async_trait]
    impl TableTrait for MockTable {
        fn name(&self) -> &str {
            &self.name
        }
        fn arrow_schema(&self, _projection: Option<&[String]>) -> SchemaRef {
            self.schema.clone()
        }
        async fn scan(&self, _options: ScanOptions) -> Result<BatchStream> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    struct MockSchema {
        name: String,
        is_default: bool,
        tables: Vec<Arc<dyn TableTrait>>,
    }
    #[async_trait]
    impl Schema for MockSchema {
        fn name(&self) -> &str {
            &self.name
        }
        fn is_default(&self) -> bool {
            self.is_default
        }
        async fn tables(&self) -> Result<Vec<Arc<dyn TableTrait>>> {
            Ok(self.tables.clone())
        }
        async fn table_functions(&self) -> Result<Vec<Arc<dyn TableFunction>>> {
            Ok(vec![])
        }
        async fn in_out_table_functions(&self) -> Result<Vec<Arc<dyn InOutTableFunction>>> {
            Ok(vec![])
        }
        async fn scalar_functions(&self) -> Result<Vec<Arc<dyn ScalarFunction>>> {
            Ok(vec![])
        }
    }

    struct MockCatalog {
        schemas: Vec<Arc<dyn Schema>>,
    }
    #[async_trait]
    impl Catalog for MockCatalog {
        async fn schemas(&self) -> Result<Vec<Arc<dyn Schema>>> {
            Ok(self.schemas.clone())
        }
        async fn schema(&self, name: &str) -> Result<Arc<dyn Schema>> {
            self.schemas
                .iter()
                .find(|s| s.name() == name)
                .cloned()
                .ok_or_else(|| AirportError::SchemaNotFound(name.to_string()))
        }
    }

    fn ctx_with(schemas: Vec<Arc<dyn Schema>>) -> ActionContext {
        ActionContext {
            catalog: Arc::new(MockCatalog { schemas }),
            request: crate::context::RequestContext::default(),
            transactions: TransactionManager::new(),
        }
    }

    #[tokio::test]
    async fn list_schemas_round_trips_and_has_unique_names() {
        let schema_a = Arc::new(MockSchema {
            name: "a".into(),
            is_default: false,
            tables: vec![Arc::new(MockTable {
                name: "t1".into(),
                schema: Arc::new(ArrowSchema::new(vec![Field::new("x", DataType::Int64, false)])),
            })],
        }) as Arc<dyn Schema>;
        let schema_b = Arc::new(MockSchema {
            name: "b".into(),
            is_default: false,
            tables: vec![],
        }) as Arc<dyn Schema>;

        let ctx = ctx_with(vec![schema_a, schema_b]);
        let payload = list_schemas(&ctx).await.unwrap();

        let root: CatalogRoot = msgpack::from_slice(&payload).unwrap();
        let names: Vec<&str> = root.schemas.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());

        // First schema defaults to is_default when no schema declares one explicitly.
        assert!(root.schemas[0].is_default);
        assert!(!root.schemas[1].is_default);

        let inflated = compressed::unwrap(root.schemas[0].contents.serialized.as_ref().unwrap()).unwrap();
        let infos: Vec<serde_bytes::ByteBuf> = msgpack::from_slice(&inflated).unwrap();
        assert_eq!(infos.len(), 1);
        let info = FlightInfo::decode(infos[0].as_slice()).unwrap();
        let entry_meta: EntryAppMetadata = msgpack::from_slice(&info.app_metadata).unwrap();
        assert_eq!(entry_meta.entry_type, "table");
        assert_eq!(entry_meta.name, "t1");
    }
}
