use clap::Parser;
use docchat_server::{ServerConfig, run_server, telemetry::init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = ServerConfig::parse();
    init_tracing(config.log_format)?;

    run_server(config).await
}
