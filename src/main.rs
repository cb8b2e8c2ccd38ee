use argh::FromArgs;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use vision_relay::{OpenAiVisionClient, Settings, VisionEngine, server};

#[derive(FromArgs)]
/// Vision relay: forwards images and instructions to a multimodal model.
struct ServerArgs {
    /// the host to run the server on (overrides HOST)
    #[argh(option, short = 'h')]
    host: Option<String>,

    /// the port to run the server on (overrides PORT)
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// path to an optional TOML settings file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: ServerArgs = argh::from_env();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    // format the host and port
    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    let client = OpenAiVisionClient::new(&settings.dashscope)?;
    let engine = Arc::new(VisionEngine::new(client));
    let app = server::router(engine, &settings);

    log::info!("🚀 Starting the server");
    log::info!("🔥 Listening on: {}", addr);
    log::info!("📝 Environment: {}", settings.server.environment);
    log::info!(
        "🔑 API key configured: {}",
        if settings.dashscope.api_key.is_empty() { "No" } else { "Yes" }
    );
    log::info!("🤖 Vision model: {}", settings.dashscope.vision_model);
    log::info!("📡 Base URL: {}", settings.dashscope.base_url);
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}
