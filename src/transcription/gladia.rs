//! # Gladia Live Session Client
//!
//! Owns the single upstream WebSocket connection to the transcription
//! provider. The client exposes a narrow async surface:
//!
//! - [`start`] performs the session-initiation request and opens the
//!   streaming socket;
//! - [`SessionHandle`] sends audio chunks and the stop frame;
//! - a [`SessionEvent`] stream delivers transcripts and the close event.
//!
//! The router never touches the socket itself. Two background tasks own the
//! split halves: a writer draining the command channel and a reader parsing
//! provider frames. There is no automatic reconnect; an unexpected close
//! surfaces as [`SessionEvent::Closed`] and recovery is the router's call
//! on the next activation cycle.

use crate::config::{AudioConfig, GladiaConfig};
use crate::error::{AppError, AppResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bound on the initiation request and the socket connect, so a hung
/// provider cannot leave the router in `Starting` forever.
const START_TIMEOUT: Duration = Duration::from_secs(15);

/// Explicit end-of-stream frame sent before closing the socket.
const STOP_RECORDING_FRAME: &str = r#"{"type":"stop_recording"}"#;

/// Session-initiation request body.
#[derive(Debug, Serialize)]
struct InitiateRequest {
    sample_rate: u32,
    encoding: String,
    channels: u32,
    language_config: LanguageConfig,
    messages_config: MessagesConfig,
}

#[derive(Debug, Serialize)]
struct LanguageConfig {
    languages: Vec<String>,
    code_switching: bool,
}

#[derive(Debug, Serialize)]
struct MessagesConfig {
    receive_partial_transcripts: bool,
    receive_final_transcripts: bool,
}

/// Session-initiation response: a session identifier plus the streaming
/// endpoint URL (the URL embeds its own auth token).
#[derive(Debug, Deserialize)]
struct InitiateResponse {
    id: String,
    url: String,
}

/// Inbound provider frame. `data` stays untyped until the kind is known;
/// non-transcript kinds carry shapes this proxy never looks at.
#[derive(Debug, Deserialize)]
struct ProviderFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TranscriptPayload {
    is_final: bool,
    utterance: Utterance,
}

#[derive(Debug, Deserialize)]
struct Utterance {
    text: String,
    start: f64,
    end: f64,
}

/// Events emitted by a live session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A partial or final transcript with the provider's utterance offsets
    Transcript {
        text: String,
        is_final: bool,
        start: f64,
        end: f64,
    },
    /// The upstream socket closed (gracefully or not); no more events follow
    Closed,
}

pub(crate) enum Command {
    Audio {
        chunk: Vec<u8>,
        /// Chunk arrived as a text frame; only those may already be base64
        text: bool,
    },
    Stop,
}

/// Cheap, cloneable handle to a live session. Dropping every handle tears
/// the writer down the same way [`SessionHandle::stop`] does.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    session_id: String,
}

impl SessionHandle {
    /// Queue an audio chunk for transmission. `text` marks chunks that
    /// arrived as WebSocket text frames; binary frames are always encoded
    /// fresh. Returns `false` when the upstream socket is no longer open;
    /// the chunk is dropped.
    pub fn send_audio(&self, chunk: Vec<u8>, text: bool) -> bool {
        self.commands.send(Command::Audio { chunk, text }).is_ok()
    }

    /// Send the provider's end-of-stream frame and close the socket.
    /// Idempotent: stopping an already-stopped session is a no-op.
    pub fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[cfg(test)]
impl SessionHandle {
    /// Handle backed by a bare command channel with no socket behind it.
    pub(crate) fn detached(session_id: &str) -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let handle = Self {
            commands,
            session_id: session_id.to_string(),
        };
        (handle, command_rx)
    }
}

/// Create a transcription session and open its streaming socket.
///
/// On any failure (initiation rejected, timeout, connect error) no session
/// exists and the caller must treat the state as `Inactive`. The returned
/// oneshot resolves once the writer has sent the end-of-stream frame and
/// closed the socket, so shutdown can wait for the flush.
pub async fn start(
    gladia: &GladiaConfig,
    audio: &AudioConfig,
) -> AppResult<(
    SessionHandle,
    mpsc::UnboundedReceiver<SessionEvent>,
    oneshot::Receiver<()>,
)> {
    let session = initiate_session(gladia, audio).await?;
    info!(session_id = %session.id, "transcription session created");

    let (ws_stream, _response) = timeout(START_TIMEOUT, connect_async(&session.url))
        .await
        .map_err(|_| AppError::Upstream("timed out connecting to the streaming endpoint".to_string()))??;

    debug!(session_id = %session.id, "streaming socket connected");

    let (sink, stream) = ws_stream.split();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(writer_task(sink, command_rx, done_tx));
    tokio::spawn(reader_task(stream, event_tx));

    let handle = SessionHandle {
        commands: command_tx,
        session_id: session.id,
    };

    Ok((handle, event_rx, done_rx))
}

/// POST the session-initiation request and return the streaming endpoint.
async fn initiate_session(gladia: &GladiaConfig, audio: &AudioConfig) -> AppResult<InitiateResponse> {
    let body = InitiateRequest {
        sample_rate: audio.sample_rate,
        encoding: audio.encoding.clone(),
        channels: audio.channels,
        language_config: LanguageConfig {
            languages: gladia.languages.clone(),
            code_switching: gladia.code_switching,
        },
        messages_config: MessagesConfig {
            receive_partial_transcripts: true,
            receive_final_transcripts: true,
        },
    };

    let request = reqwest::Client::new()
        .post(format!("{}/v2/live", gladia.api_url))
        .header("X-Gladia-Key", &gladia.api_key)
        .json(&body)
        .send();

    let response = timeout(START_TIMEOUT, request)
        .await
        .map_err(|_| AppError::Upstream("session initiation timed out".to_string()))??;

    if !response.status().is_success() {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        return Err(AppError::Upstream(format!(
            "session initiation rejected ({}): {}",
            status, detail
        )));
    }

    let initiated: InitiateResponse = response.json().await?;
    if initiated.url.is_empty() {
        return Err(AppError::Session(
            "initiation response carried an empty streaming URL".to_string(),
        ));
    }

    Ok(initiated)
}

/// Owns the socket's send half. Drains queued audio chunks and, on `Stop`
/// (or all handles dropped), sends the end-of-stream frame, closes the
/// socket and resolves the completion signal.
async fn writer_task(
    mut sink: SplitSink<WsStream, Message>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    done: oneshot::Sender<()>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Audio { chunk, text } => {
                let frame = audio_chunk_frame(&chunk, text);
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    warn!("failed to send audio chunk upstream: {}", e);
                    break;
                }
            }
            Command::Stop => break,
        }
    }

    if let Err(e) = sink.send(Message::Text(STOP_RECORDING_FRAME.to_string())).await {
        debug!("stop_recording frame not delivered: {}", e);
    }
    let _ = sink.close().await;
    let _ = done.send(());
    debug!("upstream writer finished");
}

/// Owns the socket's receive half. Parses provider frames into session
/// events; malformed frames are logged and skipped, never fatal.
async fn reader_task(mut stream: SplitStream<WsStream>, events: mpsc::UnboundedSender<SessionEvent>) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Some(event) = parse_provider_frame(&text) {
                    if events.send(event).is_err() {
                        // Router side is gone; nothing left to deliver to.
                        return;
                    }
                }
            }
            Ok(Message::Close(reason)) => {
                info!("upstream socket closed: {:?}", reason);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("upstream socket error: {}", e);
                break;
            }
        }
    }

    let _ = events.send(SessionEvent::Closed);
}

/// Parse one inbound provider frame. Only `transcript` frames produce an
/// event; every other kind is ignored.
fn parse_provider_frame(text: &str) -> Option<SessionEvent> {
    let frame: ProviderFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("ignoring malformed provider frame: {}", e);
            return None;
        }
    };

    if frame.kind != "transcript" {
        return None;
    }

    match serde_json::from_value::<TranscriptPayload>(frame.data) {
        Ok(payload) => Some(SessionEvent::Transcript {
            text: payload.utterance.text,
            is_final: payload.is_final,
            start: payload.utterance.start,
            end: payload.utterance.end,
        }),
        Err(e) => {
            debug!("ignoring transcript frame with unexpected payload: {}", e);
            None
        }
    }
}

/// Build the provider's audio-chunk frame around an opaque chunk.
fn audio_chunk_frame(chunk: &[u8], text: bool) -> String {
    serde_json::json!({
        "type": "audio_chunk",
        "data": { "chunk": encode_chunk(chunk, text) }
    })
    .to_string()
}

/// Base64-encode a chunk. A chunk that arrived as a text frame and already
/// is valid base64 passes through untouched; binary frames are always
/// encoded, even when their bytes happen to look like base64 text.
fn encode_chunk(chunk: &[u8], text: bool) -> String {
    if text {
        if let Ok(s) = std::str::from_utf8(chunk) {
            if !s.is_empty() && BASE64.decode(s).is_ok() {
                return s.to_string();
            }
        }
    }
    BASE64.encode(chunk)
}
