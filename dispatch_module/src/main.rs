use std::sync::Arc;

use tracing::info;
use transport_module::{EmailTransport, HttpEmailTransport};

use dispatch_module::service::{run_server, ServiceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().init();

    let config = ServiceConfig::from_env();
    let transport: Arc<dyn EmailTransport> = Arc::new(HttpEmailTransport::from_env()?);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    };

    run_server(config, transport, shutdown).await
}
