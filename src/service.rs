//! The `FlightService` implementation tying every component together
//! (spec.md §4.1, §6).

use crate::action::{self, ActionContext};
use crate::auth::{authenticate_and_authorize, Authenticator};
use crate::context::{ExchangeOperation, FlightPath, RequestContext};
use crate::dispatch::CatalogRegistry;
use crate::doexchange::ExchangeContext;
use crate::error::AirportError;
use crate::transaction::TransactionManager;
use arrow_flight::flight_service_server::FlightService;
use arrow_flight::{
    Action, ActionType, Criteria, Empty, FlightData, FlightDescriptor, FlightInfo,
    HandshakeRequest, HandshakeResponse, PutResult, SchemaResult, Ticket,
};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

/// The Airport dialect server (spec.md §4.1 "top-level composition").
pub struct AirportFlightService {
    catalogs: Arc<CatalogRegistry>,
    authenticator: Arc<dyn Authenticator>,
    transactions: Arc<TransactionManager>,
}

impl AirportFlightService {
    #[must_use]
    pub fn new(catalogs: Arc<CatalogRegistry>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            catalogs,
            authenticator,
            transactions: TransactionManager::new(),
        }
    }

    async fn authenticated_context(
        &self,
        metadata: &tonic::metadata::MetadataMap,
    ) -> Result<RequestContext, Status> {
        let ctx = RequestContext::from_metadata(metadata);
        authenticate_and_authorize(self.authenticator.as_ref(), &ctx)
            .await
            .map_err(Status::from)?;
        Ok(ctx)
    }

    fn header(request: &Request<impl Sized>, name: &str) -> Option<String> {
        request
            .metadata()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

#[tonic::async_trait]
impl FlightService for AirportFlightService {
    type HandshakeStream = BoxStream<'static, Result<HandshakeResponse, Status>>;
    type ListFlightsStream = BoxStream<'static, Result<FlightInfo, Status>>;
    type DoGetStream = BoxStream<'static, Result<FlightData, Status>>;
    type DoPutStream = BoxStream<'static, Result<PutResult, Status>>;
    type DoActionStream = BoxStream<'static, Result<arrow_flight::Result, Status>>;
    type ListActionsStream = BoxStream<'static, Result<ActionType, Status>>;
    type DoExchangeStream = BoxStream<'static, Result<FlightData, Status>>;

    async fn handshake(
        &self,
        _request: Request<Streaming<HandshakeRequest>>,
    ) -> Result<Response<Self::HandshakeStream>, Status> {
        let response = HandshakeResponse {
            protocol_version: 0,
            payload: Vec::new().into(),
        };
        Ok(Response::new(stream::once(async { Ok(response) }).boxed()))
    }

    async fn list_flights(
        &self,
        request: Request<Criteria>,
    ) -> Result<Response<Self::ListFlightsStream>, Status> {
        let ctx = self.authenticated_context(request.metadata()).await?;
        let catalog = self.catalogs.resolve(&ctx.catalog).await.map_err(Status::from)?;
        let schemas = catalog.schemas().await.map_err(Status::from)?;
        let mut infos = Vec::new();
        for schema in schemas {
            for table in schema.tables().await.map_err(Status::from)? {
                let descriptor = FlightDescriptor::new_path(vec![schema.name().to_string(), table.name().to_string()]);
                let ticket = crate::codec::ticket::Ticket {
                    schema: schema.name().to_string(),
                    table: Some(table.name().to_string()),
                    ..Default::default()
                }
                .encode()
                .map_err(Status::from)?;
                let info = crate::codec::schema::flight_info(descriptor, &table.arrow_schema(None), ticket)
                    .map_err(Status::from)?;
                infos.push(Ok(info));
            }
        }
        Ok(Response::new(stream::iter(infos).boxed()))
    }

    async fn get_flight_info(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        let ctx = self.authenticated_context(request.metadata()).await?;
        let catalog = self.catalogs.resolve(&ctx.catalog).await.map_err(Status::from)?;
        let descriptor = request.into_inner();
        let action_ctx = ActionContext {
            catalog,
            request: ctx,
            transactions: self.transactions.clone(),
        };
        // `GetFlightInfo` answers identically to the `flight_info` action
        // (spec.md §6 "Flight-native RPCs"), keyed only by path descriptor.
        let params = crate::codec::msgpack::to_vec(&FlightInfoParams {
            descriptor: serde_bytes::ByteBuf::from(descriptor.encode_to_vec()),
            parameters: Default::default(),
        })
        .map_err(Status::from)?;
        let info_bytes = action::metadata::flight_info(&action_ctx, &params).await.map_err(Status::from)?;
        FlightInfo::decode(info_bytes.as_slice())
            .map(Response::new)
            .map_err(|e| Status::internal(e.to_string()))
    }

    async fn get_schema(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<SchemaResult>, Status> {
        let ctx = self.authenticated_context(request.metadata()).await?;
        let catalog = self.catalogs.resolve(&ctx.catalog).await.map_err(Status::from)?;
        let descriptor = request.into_inner();
        let (schema_name, table_name) = match descriptor.path.as_slice() {
            [s, t] => (s.clone(), t.clone()),
            _ => return Err(Status::invalid_argument("descriptor path must be [schema, table]")),
        };
        let schema = catalog.schema(&schema_name).await.map_err(Status::from)?;
        let table = {
            use crate::catalog::SchemaExt;
            schema.find_table(&table_name).await.map_err(Status::from)?
        };
        let ipc_bytes = crate::codec::schema::schema_to_ipc_bytes(&table.arrow_schema(None)).map_err(Status::from)?;
        Ok(Response::new(SchemaResult {
            schema: ipc_bytes.into(),
        }))
    }

    async fn do_get(&self, request: Request<Ticket>) -> Result<Response<Self::DoGetStream>, Status> {
        let ctx = self.authenticated_context(request.metadata()).await?;
        let catalog = self.catalogs.resolve(&ctx.catalog).await.map_err(Status::from)?;
        let ticket = request.into_inner();
        let cancel = CancellationToken::new();
        let stream = crate::doget::handle(&ticket.ticket, catalog, &ctx.catalog, cancel.clone())
            .await
            .map_err(Status::from)?;
        Ok(Response::new(CancelOnDrop { inner: stream, cancel }.boxed()))
    }

    async fn do_put(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoPutStream>, Status> {
        // All DML goes through `DoExchange` in the Airport dialect
        // (spec.md §6 "Flight-native RPCs").
        Err(Status::from(AirportError::Unimplemented("DoPut")))
    }

    async fn poll_flight_info(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<arrow_flight::PollInfo>, Status> {
        Err(Status::from(AirportError::Unimplemented("PollFlightInfo")))
    }

    async fn do_action(
        &self,
        request: Request<Action>,
    ) -> Result<Response<Self::DoActionStream>, Status> {
        let ctx = self.authenticated_context(request.metadata()).await?;
        let catalog = self.catalogs.resolve(&ctx.catalog).await.map_err(Status::from)?;
        let action = request.into_inner();
        let action_ctx = ActionContext {
            catalog,
            request: ctx,
            transactions: self.transactions.clone(),
        };
        let result = action::dispatch(&action.r#type, &action.body, &action_ctx)
            .await
            .map_err(Status::from)?;
        let reply = arrow_flight::Result { body: result.into() };
        Ok(Response::new(stream::once(async { Ok(reply) }).boxed()))
    }

    async fn list_actions(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListActionsStream>, Status> {
        let types = action::ACTION_NAMES
            .iter()
            .map(|name| {
                Ok(ActionType {
                    r#type: (*name).to_string(),
                    description: String::new(),
                })
            })
            .collect::<Vec<_>>();
        Ok(Response::new(stream::iter(types).boxed()))
    }

    async fn do_exchange(
        &self,
        request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoExchangeStream>, Status> {
        let ctx = self.authenticated_context(request.metadata()).await?;
        let catalog = self.catalogs.resolve(&ctx.catalog).await.map_err(Status::from)?;

        let operation_header = Self::header(&request, "airport-operation")
            .ok_or(AirportError::MissingHeader("airport-operation"))
            .map_err(Status::from)?;
        let operation = ExchangeOperation::parse(&operation_header)
            .ok_or_else(|| crate::doexchange::unknown_operation(&operation_header))
            .map_err(Status::from)?;
        let path_header = Self::header(&request, "airport-flight-path")
            .ok_or(AirportError::MissingHeader("airport-flight-path"))
            .map_err(Status::from)?;
        let path = FlightPath::parse(&path_header)
            .ok_or_else(|| AirportError::BadDescriptor("malformed airport-flight-path".into()))
            .map_err(Status::from)?;
        if operation.is_function() && !ctx.return_chunks {
            return Err(Status::from(AirportError::BadDescriptor(
                "return-chunks header must be \"1\" on function exchanges".into(),
            )));
        }

        let exchange_ctx = ExchangeContext {
            catalog,
            request: ctx,
            transactions: self.transactions.clone(),
        };
        let cancel = CancellationToken::new();
        let stream = crate::doexchange::handle(operation, path, request.into_inner(), exchange_ctx, cancel.clone())
            .await
            .map_err(Status::from)?;
        Ok(Response::new(CancelOnDrop { inner: stream, cancel }.boxed()))
    }
}

/// Cancels the shared token when the wrapped stream is dropped.
///
/// `tonic` surfaces both client disconnect and deadline expiry the same
/// way: it stops polling and drops the response stream (spec.md §5, §7
/// "client disconnect / context cancel"). Wrapping `DoGet`/`DoExchange`'s
/// output stream in this type is what ties the `CancellationToken`
/// threaded through the pipeline to that signal.
struct CancelOnDrop<S> {
    inner: S,
    cancel: CancellationToken,
}

impl<S: futures::Stream + Unpin> futures::Stream for CancelOnDrop<S> {
    type Item = S::Item;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        std::pin::Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for CancelOnDrop<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(serde::Serialize, Default)]
struct FlightInfoParams {
    descriptor: serde_bytes::ByteBuf,
    parameters: FlightInfoInnerParams,
}

#[derive(serde::Serialize, Default)]
struct FlightInfoInnerParams {}

use prost::Message;
