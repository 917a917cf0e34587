//! # Meeting Transcription Proxy
//!
//! WebSocket proxy between a meeting bot, the audio sources streaming a live
//! meeting, and a hosted transcription provider. The proxy accepts every
//! client on one endpoint, classifies each connection by its first message,
//! relays traffic between the two sides, and manages one upstream
//! transcription session that follows the presence of audio sources.
//!
//! ## Module layout:
//! - **config**: layered configuration (defaults, config.toml, environment)
//! - **proxy**: peer connections, message routing, session lifecycle
//! - **transcription**: the provider session client
//! - **meeting**: bot creation and removal on the meeting platform
//! - **inspect**: payload diagnostics for logs
//! - **health**: liveness endpoint
//! - **error**: shared error type

mod config;
mod error;
mod health;
mod inspect;
mod meeting;
mod proxy;
mod state;
mod transcription;

use actix::Actor;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use clap::Parser;
use config::AppConfig;
use meeting::MeetingBotClient;
use proxy::router::{ProxyRouter, Shutdown};
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown flag, set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(name = "meeting-transcription-proxy", version, about)]
struct Args {
    /// Meeting URL to send the transcription bot into. Without it the proxy
    /// only serves its WebSocket endpoint and no bot is created.
    meeting_url: Option<String>,

    /// Public WebSocket URL the meeting platform streams audio to. Defaults
    /// to ws://<bind address>/ws, which only works when the platform can
    /// reach this host directly.
    #[arg(long)]
    websocket_url: Option<String>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!(
        "Starting meeting-transcription-proxy v{}",
        env!("CARGO_PKG_VERSION")
    );

    let bind_addr = config.bind_addr();
    let router = ProxyRouter::new(config.clone()).start();
    let app_state = AppState::new(config.clone(), router.clone());

    setup_signal_handlers();

    info!("Starting WebSocket proxy on {}", bind_addr);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(TracingLogger::default())
            .route("/ws", web::get().to(proxy::peer::peer_endpoint))
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // With a meeting URL the proxy also drives the bot's lifecycle; the
    // platform needs a reachable endpoint to stream the meeting's audio to.
    let mut bot = MeetingBotClient::new(&config.meeting);
    if let Some(meeting_url) = &args.meeting_url {
        let websocket_url = args
            .websocket_url
            .clone()
            .unwrap_or_else(|| format!("ws://{}/ws", bind_addr));

        match bot
            .connect(meeting_url, &config.meeting.bot_name, &websocket_url)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!("meeting platform rejected the bot, proxy continues without it"),
            Err(e) => warn!("could not create the meeting bot: {}", e),
        }
    }

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping proxy...");
        }
    }

    // Teardown order matters: end the transcription session and close peers
    // first, then remove the bot from the meeting, then stop accepting.
    if let Err(e) = router.send(Shutdown).await {
        warn!("router already gone during shutdown: {}", e);
    }
    bot.disconnect().await;
    server_handle.stop(true).await;

    info!("Proxy stopped gracefully");
    Ok(())
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meeting_transcription_proxy=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Install SIGTERM/SIGINT handlers that flip the global shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate());
        let sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt());

        let (Ok(mut sigterm), Ok(mut sigint)) = (sigterm, sigint) else {
            error!("Failed to install signal handlers");
            return;
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
