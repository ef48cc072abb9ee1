//! SignGlove Engine - Main entry point
//!
//! Runs the gesture pipeline against a telemetry transport (file, stdin or
//! TCP link to the glove) and serves the HTTP/SSE control surface. Each
//! emitted symbol is printed to stdout as one JSON line.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use signglove_common::events::{GestureEvent, WindowMode};
use signglove_engine::api;
use signglove_engine::config::EngineConfig;
use signglove_engine::device::{CommandSink, RecordingSink, WriterSink};
use signglove_engine::session::{build_session, StreamingSession};
use signglove_engine::SharedState;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Transport read size; small so chunking never lines up with records
const READ_CHUNK_BYTES: usize = 64;

/// Command-line arguments for signglove-engine
#[derive(Parser, Debug)]
#[command(name = "signglove-engine")]
#[command(about = "Sensor-glove gesture recognition engine")]
#[command(version)]
struct Args {
    /// Bootstrap TOML file
    #[arg(short, long, env = "SIGNGLOVE_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP port (overrides [server] port)
    #[arg(short, long, env = "SIGNGLOVE_PORT")]
    port: Option<u16>,

    /// Tree-ensemble model JSON (overrides [models] tree_model)
    #[arg(long, env = "SIGNGLOVE_TREE_MODEL")]
    tree_model: Option<PathBuf>,

    /// Label list (overrides [models] labels)
    #[arg(long, env = "SIGNGLOVE_LABELS")]
    labels: Option<PathBuf>,

    /// Read telemetry from a file, or `-` for stdin
    #[arg(short, long, conflicts_with = "connect")]
    input: Option<PathBuf>,

    /// Connect to the glove's TCP telemetry link (host:port)
    #[arg(long)]
    connect: Option<String>,

    /// Window mode: batch or sliding (overrides [window] mode)
    #[arg(short, long)]
    mode: Option<WindowMode>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &args);

    init_tracing(&config)?;
    config.validate().context("Invalid configuration")?;

    info!("Starting SignGlove engine v{}", env!("CARGO_PKG_VERSION"));

    let state = Arc::new(SharedState::new());
    let shutdown = CancellationToken::new();

    // Device link, if any: chunks in, commands out
    let (commands, link_reader): (Arc<dyn CommandSink>, Option<tokio::net::tcp::OwnedReadHalf>) =
        match &args.connect {
            Some(address) => {
                let stream = tokio::net::TcpStream::connect(address)
                    .await
                    .with_context(|| format!("Failed to connect to device at {}", address))?;
                info!("Connected to device at {}", address);
                let (reader, writer) = stream.into_split();
                let sink: Arc<dyn CommandSink> = Arc::new(WriterSink::new(writer));
                (sink, Some(reader))
            }
            None => {
                let sink: Arc<dyn CommandSink> = Arc::new(RecordingSink::new());
                (sink, None)
            }
        };

    // No sequence runtime is linked into this binary; that sub-model runs degraded
    let session = Arc::new(
        build_session(&config, None, commands, Arc::clone(&state)).context("Failed to build streaming session")?,
    );

    let printer = tokio::spawn(print_symbols(Arc::clone(&state), shutdown.clone()));

    if let Some(reader) = link_reader {
        session.start().await.context("Failed to start session")?;
        tokio::spawn(pump(reader, Arc::clone(&session), shutdown.clone(), false));
    } else if let Some(input) = &args.input {
        session.start().await.context("Failed to start session")?;
        if input.as_os_str() == "-" {
            info!("Reading telemetry from stdin");
            tokio::spawn(pump(tokio::io::stdin(), Arc::clone(&session), shutdown.clone(), true));
        } else {
            let file = tokio::fs::File::open(input)
                .await
                .with_context(|| format!("Failed to open {}", input.display()))?;
            info!("Reading telemetry from {}", input.display());
            tokio::spawn(pump(file, Arc::clone(&session), shutdown.clone(), true));
        }
    } else {
        info!("No transport configured; feed telemetry via POST /ingest");
    }

    let app = api::create_router(api::AppState {
        session: Arc::clone(&session),
        port: config.server.port,
    });

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .context("Invalid server bind address")?;
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {},
                _ = server_shutdown.cancelled() => {},
            }
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    if session.is_running().await {
        session.stop().await.context("Failed to stop session")?;
    }
    if let Err(e) = printer.await {
        warn!("Symbol printer task failed: {}", e);
    }

    let transcript = state.transcript().await;
    if !transcript.is_empty() {
        info!("Final transcript: {:?}", transcript);
    }
    info!("Shutdown complete");
    Ok(())
}

fn apply_overrides(config: &mut EngineConfig, args: &Args) {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(path) = &args.tree_model {
        config.models.tree_model = Some(path.clone());
    }
    if let Some(path) = &args.labels {
        config.models.labels = Some(path.clone());
    }
    if let Some(mode) = args.mode {
        config.window.mode = mode;
    }
}

/// `RUST_LOG` wins, then the `[logging]` level
fn init_tracing(config: &EngineConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "{},tower_http=info",
            config.logging.filter_directive(env!("CARGO_PKG_NAME"))
        )
        .into()
    });

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

/// Copy a transport into the session in small chunks
///
/// For finite inputs, waits for the pipeline to settle at EOF and then
/// requests shutdown.
async fn pump<R>(mut reader: R, session: Arc<StreamingSession>, shutdown: CancellationToken, finite: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = [0u8; READ_CHUNK_BYTES];
    loop {
        let read = tokio::select! {
            _ = shutdown.cancelled() => return,
            read = reader.read(&mut buf) => read,
        };
        match read {
            Ok(0) => break,
            Ok(n) => {
                session.feed(&buf[..n]);
            }
            Err(e) => {
                error!("Transport read failed: {}", e);
                break;
            }
        }
    }

    if finite {
        // Flush an unterminated last line
        session.feed(b"\n");
        wait_for_idle(&session).await;
        info!("Input exhausted");
    } else {
        warn!("Device link closed");
    }
    shutdown.cancel();
}

/// Wait until queued records are consumed and no window is in flight
async fn wait_for_idle(session: &StreamingSession) {
    let mut last = session.state().counters().windows_inferred;
    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let windows = session.state().counters().windows_inferred;
        if session.source().queue_size() == 0 && windows == last {
            return;
        }
        last = windows;
    }
}

/// Print each emitted symbol as one JSON line on stdout
async fn print_symbols(state: Arc<SharedState>, shutdown: CancellationToken) {
    let mut rx = state.subscribe_events();
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => {
                while let Ok(event) = rx.try_recv() {
                    print_symbol(&event);
                }
                return;
            }
            event = rx.recv() => event,
        };
        match event {
            Ok(event) => print_symbol(&event),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Symbol printer lagged, {} events skipped", skipped);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
    }
}

fn print_symbol(event: &GestureEvent) {
    if !matches!(event, GestureEvent::SymbolEmitted { .. }) {
        return;
    }
    match serde_json::to_string(event) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("Failed to serialize symbol event: {}", e),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
