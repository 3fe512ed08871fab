use anyhow::Result;
use clap::Parser;
use loqa_converse::capability::{ConsoleSpeaker, JpegFileCapture, StdinTranscriber};
use loqa_converse::config::ImageConfig;
use loqa_converse::{AppState, Config, SessionController, StreamClient};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Hold a spoken conversation with a remote agent from the terminal
#[derive(Debug, Parser)]
#[command(name = "loqa-converse", version)]
struct Args {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/loqa-converse")]
    config: String,

    /// Server endpoint, overrides the config file
    #[arg(long)]
    url: Option<String>,

    /// Attach an image to every turn
    #[arg(long)]
    send_image: bool,

    /// JPEG file used as the captured image
    #[arg(long)]
    image: Option<PathBuf>,

    /// Serve the HTTP control API
    #[arg(long)]
    http: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;

    if let Some(url) = args.url {
        cfg.stream.url = url;
    }
    if let Some(path) = args.image {
        let (width, height) = cfg
            .image
            .as_ref()
            .map_or((640, 480), |image| (image.width, image.height));
        cfg.image = Some(ImageConfig { path, width, height });
    }
    cfg.session.send_image |= args.send_image;
    cfg.http.enabled |= args.http;

    info!("Loqa Converse v{}", env!("CARGO_PKG_VERSION"));
    info!("Server: {}", cfg.stream.url);
    info!("Session: {}", cfg.session.session_id);

    let (stream, inbound) = StreamClient::new(cfg.stream.clone());
    let send_image = Arc::new(AtomicBool::new(cfg.session.send_image));

    let mut builder = SessionController::builder(cfg.session.clone(), stream, inbound)
        .transcriber(StdinTranscriber::new())
        .speech(ConsoleSpeaker::default())
        .flags(send_image);

    match &cfg.image {
        Some(image) => {
            info!("Image capture from {}", image.path.display());
            builder = builder.camera(JpegFileCapture::new(&image.path, image.width, image.height));
        }
        None if cfg.session.send_image => {
            warn!("send_image is set but no image file is configured; turns will be text only");
        }
        None => {}
    }

    let session = builder.build()?.spawn();
    session.enable()?;

    let http_shutdown = CancellationToken::new();
    let http_task = cfg.http.enabled.then(|| {
        let state = AppState::new(session.clone());
        let http = cfg.http.clone();
        let shutdown = http_shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = loqa_converse::http::serve(&http.bind, http.port, state, shutdown).await {
                error!("{:#}", e);
            }
        })
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    session.shutdown().await;
    http_shutdown.cancel();
    if let Some(task) = http_task {
        task.await?;
    }

    let stats = session.stats();
    info!(
        "Turns sent: {}, replies: {}, timeouts: {}",
        stats.turns_sent, stats.replies_received, stats.timeouts
    );

    Ok(())
}
