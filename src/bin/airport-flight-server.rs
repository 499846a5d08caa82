//! Binary entrypoint: parse CLI flags, load config, and serve the
//! Airport Flight service over gRPC (spec.md §1, §5).

use airport_flight_server::auth::NoopAuthenticator;
use airport_flight_server::dispatch::CatalogRegistry;
use airport_flight_server::service::AirportFlightService;
use airport_flight_server::ServerConfig;
use arrow_flight::flight_service_server::FlightServiceServer;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Arrow Flight RPC server speaking the Airport catalog dialect")]
struct Args {
    /// Path to a TOML configuration file. When omitted, defaults are used.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen address set in the config file.
    #[arg(long)]
    listen_addr: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_toml_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(addr) = args.listen_addr {
        config.listen_addr = addr;
    }

    // No catalog is registered here: embedding applications call
    // `CatalogRegistry::register` before `serve` (spec.md §4.8).
    let catalogs = CatalogRegistry::new();
    let service = AirportFlightService::new(catalogs, Arc::new(NoopAuthenticator));
    let server = FlightServiceServer::new(service).max_decoding_message_size(config.max_message_size);

    tracing::info!(addr = %config.listen_addr, "starting airport flight server");
    Server::builder()
        .add_service(server)
        .serve(config.listen_addr)
        .await?;
    Ok(())
}
