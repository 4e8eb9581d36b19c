//! # Clinic Voice Backend - Main Application Entry Point
//!
//! Voice front desk for a hospital: patients speak, the server transcribes
//! them, routes the complaint to a clinic and speaks the answer back.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: HTTP handlers and remote API calls never block a worker
//! - **Actors**: each WebSocket connection is an independent actix actor
//! - **Trait objects**: the speech engine is chosen at startup behind `dyn SpeechEngine`
//! - **Result<T, E>**: startup fails fast with context instead of panicking

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clinic_voice_backend::config::AppConfig;
use clinic_voice_backend::gemini::GeminiClient;
use clinic_voice_backend::state::AppState;
use clinic_voice_backend::transcription::SpeechEngine;
use clinic_voice_backend::{middleware, routes};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set by the signal handlers; polled by `wait_for_shutdown`.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from `.env`, config.toml and environment variables
/// 2. **Sets up logging**
/// 3. **Loads the speech engine** and builds the remote API client
/// 4. **Configures the HTTP server** with middleware and routes
/// 5. **Handles graceful shutdown** on SIGTERM / SIGINT
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting clinic-voice-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let gemini = GeminiClient::from_config(&config.gemini).context("Failed to build remote API client")?;
    if gemini.is_none() {
        warn!("GEMINI_API_KEY is not set; /api/get_intent and /api/synthesize will answer 500");
    }

    let mut app_state = AppState::new(config.clone()).with_gemini(gemini);
    if let Some(engine) = load_speech_engine(&config)? {
        info!("Speech engine '{}' ready", engine.name());
        app_state = app_state.with_speech_engine(engine);
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Middleware executes in reverse order of registration
            .wrap(cors)
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize tracing.
///
/// `RUST_LOG` controls the filter; without it the default is
/// `clinic_voice_backend=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clinic_voice_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialize tracing")?;

    Ok(())
}

/// Load the local speech engine compiled into this build.
///
/// With the `vosk` feature a missing or broken model aborts startup. Without
/// it the server still runs, and the recognition routes answer 503.
#[cfg(feature = "vosk")]
fn load_speech_engine(config: &AppConfig) -> Result<Option<Arc<dyn SpeechEngine>>> {
    let engine = clinic_voice_backend::transcription::vosk::VoskEngine::load(&config.stt.model_path)?;
    Ok(Some(Arc::new(engine)))
}

#[cfg(not(feature = "vosk"))]
fn load_speech_engine(config: &AppConfig) -> Result<Option<Arc<dyn SpeechEngine>>> {
    warn!(
        model_path = %config.stt.model_path.display(),
        "Built without the `vosk` feature; /transcribe and /ws/stream_stt are unavailable"
    );
    Ok(None)
}

/// Listen for SIGTERM and SIGINT and raise the global shutdown flag.
fn setup_signal_handlers() {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async {
        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
