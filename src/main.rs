mod cli;
mod events;
mod gateway;
mod pipeline;
mod screen;
mod service;
mod session;
mod tui;

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};

use cli::Cli;
use events::EventBus;
use gateway::CommandGateway;
use pipeline::FramePipeline;
use screen::viewer::{DisplaySurface, SurfaceRenderer};
use service::{CaptureTransport, LanService};
use session::Session;
use tui::CastUi;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging()?;

    // Query terminal graphics capabilities BEFORE raw mode
    let picker = screen::viewer::create_picker(cli.graphics.as_deref());

    let (bus, subscriber) = EventBus::channel();
    let service: Arc<dyn CaptureTransport> = Arc::new(LanService::new(bus));
    let (gateway, reply_rx) = CommandGateway::new(service);

    let surface = Arc::new(Mutex::new(DisplaySurface::new()));
    let renderer = Arc::new(SurfaceRenderer::new(surface.clone()));
    let pipeline = FramePipeline::new(renderer);

    // Local address is queried once; it only changes if the network does
    let session = Session::new(gateway.local_address(), cli.port, cli.fps);

    let mut ui = CastUi::new(session, gateway, pipeline, surface, picker);
    ui.run(subscriber, reply_rx).await
}

/// Logs go to a file only when LANCAST_LOG names one; writing to stderr
/// would tear the alternate screen.
fn init_logging() -> Result<()> {
    let Ok(path) = std::env::var("LANCAST_LOG") else {
        return Ok(());
    };
    let file = std::fs::File::create(&path)
        .with_context(|| format!("could not create log file {}", path))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lancast=debug".into()),
        )
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
