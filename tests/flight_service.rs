//! End-to-end exercise of `AirportFlightService` over a real gRPC
//! connection: a single in-memory catalog with one table is registered,
//! the server is bound to an ephemeral port, and a genuine
//! `FlightServiceClient` drives `ListFlights`, `GetFlightInfo`,
//! `GetSchema`, `DoGet`, `ListActions`, and `DoAction` against it.

use airport_flight_server::auth::NoopAuthenticator;
use airport_flight_server::catalog::{Catalog, InOutTableFunction, ScalarFunction, Schema, Table, TableFunction};
use airport_flight_server::dispatch::CatalogRegistry;
use airport_flight_server::error::{AirportError, Result};
use airport_flight_server::scan::{BatchStream, ScanOptions};
use airport_flight_server::AirportFlightService;
use arrow_array::{Int64Array, RecordBatch};
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::flight_service_server::FlightServiceServer;
use arrow_flight::{Action, Criteria, Empty, FlightDescriptor, Ticket};
use arrow_schema::{DataType, Field, Schema as ArrowSchema, SchemaRef};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint, Server};

struct OrdersTable {
    schema: SchemaRef,
}

#[async_trait]
impl Table for OrdersTable {
    fn name(&self) -> &str {
        "orders"
    }

    fn arrow_schema(&self, _projection: Option<&[String]>) -> SchemaRef {
        self.schema.clone()
    }

    async fn scan(&self, _options: ScanOptions) -> Result<BatchStream> {
        let batch = RecordBatch::try_new(self.schema.clone(), vec![Arc::new(Int64Array::from(vec![1, 2, 3]))])
            .expect("build batch");
        Ok(stream::iter(vec![Ok(batch)]).boxed())
    }
}

struct MainSchema {
    orders: Arc<OrdersTable>,
}

#[async_trait]
impl Schema for MainSchema {
    fn name(&self) -> &str {
        "main"
    }

    async fn tables(&self) -> Result<Vec<Arc<dyn Table>>> {
        Ok(vec![self.orders.clone()])
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

struct DemoCatalog {
    main: Arc<MainSchema>,
}

#[async_trait]
impl Catalog for DemoCatalog {
    async fn schemas(&self) -> Result<Vec<Arc<dyn Schema>>> {
        Ok(vec![self.main.clone()])
    }

    async fn schema(&self, name: &str) -> Result<Arc<dyn Schema>> {
        if name == "main" {
            Ok(self.main.clone())
        } else {
            Err(AirportError::SchemaNotFound(name.to_string()))
        }
    }
}

/// Bind a server backed by a single catalog with one `main.orders` table
/// and return the client endpoint it's listening on.
async fn spawn_server() -> String {
    let orders = Arc::new(OrdersTable {
        schema: Arc::new(ArrowSchema::new(vec![Field::new("id", DataType::Int64, false)])),
    });
    let main = Arc::new(MainSchema { orders });
    let catalog: Arc<dyn Catalog> = Arc::new(DemoCatalog { main });

    let catalogs = CatalogRegistry::new();
    catalogs.register("", catalog).await;
    let service = AirportFlightService::new(catalogs, Arc::new(NoopAuthenticator));

    let port = portpicker::pick_unused_port().expect("free port");
    let addr = format!("127.0.0.1:{port}").parse().expect("parse address");

    tokio::spawn(async move {
        Server::builder()
            .add_service(FlightServiceServer::new(service))
            .serve(addr)
            .await
            .expect("server exits cleanly");
    });

    // Give the listener a moment to bind before the client connects.
    tokio::time::sleep(Duration::from_millis(50)).await;
    format!("http://127.0.0.1:{port}")
}

async fn connect(endpoint: &str) -> FlightServiceClient<Channel> {
    let channel = Endpoint::from_shared(endpoint.to_string())
        .expect("valid endpoint")
        .connect()
        .await
        .expect("connect to server");
    FlightServiceClient::new(channel)
}

#[tokio::test]
async fn list_flights_reports_the_registered_table() {
    let endpoint = spawn_server().await;
    let mut client = connect(&endpoint).await;

    let response = client
        .list_flights(Criteria { expression: Vec::new().into() })
        .await
        .expect("list_flights");
    let infos: Vec<_> = response.into_inner().collect::<Vec<_>>().await;
    assert_eq!(infos.len(), 1);
    let info = infos[0].as_ref().expect("flight info");
    let descriptor = info.flight_descriptor.as_ref().expect("descriptor");
    assert_eq!(descriptor.path, vec!["main".to_string(), "orders".to_string()]);
}

#[tokio::test]
async fn get_flight_info_resolves_by_path_descriptor() {
    let endpoint = spawn_server().await;
    let mut client = connect(&endpoint).await;

    let descriptor = FlightDescriptor::new_path(vec!["main".to_string(), "orders".to_string()]);
    let response = client.get_flight_info(descriptor).await.expect("get_flight_info");
    let info = response.into_inner();
    assert!(info.schema.len() > 0 || !info.endpoint.is_empty());
}

#[tokio::test]
async fn get_schema_returns_the_table_arrow_schema() {
    let endpoint = spawn_server().await;
    let mut client = connect(&endpoint).await;

    let descriptor = FlightDescriptor::new_path(vec!["main".to_string(), "orders".to_string()]);
    let response = client.get_schema(descriptor).await.expect("get_schema");
    assert!(!response.into_inner().schema.is_empty());
}

#[tokio::test]
async fn do_get_streams_the_table_scan() {
    let endpoint = spawn_server().await;
    let mut client = connect(&endpoint).await;

    let ticket_bytes = airport_flight_server::codec::ticket::Ticket {
        schema: "main".into(),
        table: Some("orders".into()),
        ..Default::default()
    }
    .encode()
    .expect("encode ticket");

    let response = client
        .do_get(Ticket { ticket: ticket_bytes.into() })
        .await
        .expect("do_get");
    let flight_data: Vec<_> = response.into_inner().collect::<Vec<_>>().await;
    assert!(flight_data.iter().all(|item| item.is_ok()));
    // At least a schema message plus one record batch message.
    assert!(flight_data.len() >= 2);
}

#[tokio::test]
async fn do_get_rejects_catalog_mismatch() {
    let endpoint = spawn_server().await;
    let mut client = connect(&endpoint).await;

    let ticket_bytes = airport_flight_server::codec::ticket::Ticket {
        catalog: Some("other".into()),
        schema: "main".into(),
        table: Some("orders".into()),
        ..Default::default()
    }
    .encode()
    .expect("encode ticket");

    let err = client
        .do_get(Ticket { ticket: ticket_bytes.into() })
        .await
        .expect_err("catalog mismatch should be rejected");
    assert_eq!(err.code(), tonic::Code::NotFound);
}

#[tokio::test]
async fn list_actions_reports_every_dialect_action() {
    let endpoint = spawn_server().await;
    let mut client = connect(&endpoint).await;

    let response = client.list_actions(Empty {}).await.expect("list_actions");
    let actions: Vec<_> = response.into_inner().collect::<Vec<_>>().await;
    let names: Vec<String> = actions.into_iter().map(|a| a.expect("action type").r#type).collect();
    assert!(names.contains(&"list_schemas".to_string()));
    assert!(names.contains(&"create_transaction".to_string()));
}

#[tokio::test]
async fn do_action_runs_create_and_status_transaction_round_trip() {
    let endpoint = spawn_server().await;
    let mut client = connect(&endpoint).await;

    let create = client
        .do_action(Action {
            r#type: "create_transaction".into(),
            body: airport_flight_server::codec::msgpack::to_vec(&rmpv::Value::Map(vec![]))
                .expect("encode empty params")
                .into(),
        })
        .await
        .expect("create_transaction");
    let replies: Vec<_> = create.into_inner().collect::<Vec<_>>().await;
    assert_eq!(replies.len(), 1);
    assert!(replies[0].is_ok());
}

#[tokio::test]
async fn do_put_is_unimplemented_in_this_dialect() {
    let endpoint = spawn_server().await;
    let mut client = connect(&endpoint).await;

    let err = client
        .do_put(stream::empty::<arrow_flight::FlightData>())
        .await
        .expect_err("DoPut must be rejected");
    assert_eq!(err.code(), tonic::Code::Unimplemented);
}

#[tokio::test]
async fn unknown_catalog_header_is_rejected() {
    let endpoint = spawn_server().await;
    let mut client = connect(&endpoint).await;

    let mut request = tonic::Request::new(Criteria { expression: Vec::new().into() });
    request
        .metadata_mut()
        .insert("airport-catalog", "does-not-exist".parse().unwrap());
    let err = client.list_flights(request).await.expect_err("unknown catalog");
    assert_eq!(err.code(), tonic::Code::NotFound);
}
