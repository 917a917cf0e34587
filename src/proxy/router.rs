//! # Proxy Router
//!
//! The hub of the relay. One `ProxyRouter` actor owns the peer set, the
//! transcription-session lifecycle and the last-active-speaker state, so
//! every mutation happens inside its mailbox and handlers never interleave.
//!
//! ## Routing rules:
//! - Bot frames fan out verbatim to every audio-source peer.
//! - Audio-source frames always mirror verbatim to the bot; recognized
//!   speaker-activity JSON updates the speaker tracker, other JSON is never
//!   sent upstream, and everything unparseable is opaque audio for the
//!   transcription session (dropped while no session is active).
//! - Provider transcripts are wrapped in the proxy's `transcription`
//!   envelope and delivered to the bot, or dropped when no bot is present.
//!
//! Session starts run on spawned tasks and report back as messages; an
//! activation generation counter discards results that arrive after their
//! activation cycle already ended.

use crate::config::AppConfig;
use crate::inspect;
use crate::proxy::envelope::{self, Envelope, SourcePayload, SpeakerActivity, TranscriptionData};
use crate::proxy::peer::Deliver;
use crate::proxy::registry::{LifecycleSignal, PeerRegistry, PeerRole};
use crate::transcription::gladia;
use crate::transcription::{SessionEvent, SessionHandle};
use actix::prelude::*;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Bound on waiting for the upstream writer to confirm it flushed the
/// end-of-stream frame during shutdown.
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// A classified peer announcing itself to the router.
#[derive(Message)]
#[rtype(result = "()")]
pub struct PeerJoined {
    pub id: Uuid,
    pub role: PeerRole,
    pub peer: Recipient<Deliver>,
}

/// A data frame from a classified peer.
#[derive(Message)]
#[rtype(result = "()")]
pub struct PeerFrame {
    pub id: Uuid,
    pub role: PeerRole,
    pub payload: FramePayload,
}

/// A peer connection that closed or errored.
#[derive(Message)]
#[rtype(result = "()")]
pub struct PeerClosed {
    pub id: Uuid,
}

/// Raw frame content, preserved byte-for-byte for verbatim forwarding.
#[derive(Debug, Clone)]
pub enum FramePayload {
    Text(String),
    Binary(Vec<u8>),
}

impl FramePayload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FramePayload::Text(text) => text.as_bytes(),
            FramePayload::Binary(data) => data,
        }
    }

    fn to_deliver(&self) -> Deliver {
        match self {
            FramePayload::Text(text) => Deliver::Text(text.clone()),
            FramePayload::Binary(data) => Deliver::Binary(data.clone()),
        }
    }

    fn origin(&self) -> inspect::PayloadOrigin {
        match self {
            FramePayload::Text(_) => inspect::PayloadOrigin::Text,
            FramePayload::Binary(_) => inspect::PayloadOrigin::Binary,
        }
    }
}

/// Result of a spawned session start.
#[derive(Message)]
#[rtype(result = "()")]
struct SessionStarted {
    generation: u64,
    handle: SessionHandle,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    /// Resolves once the session's writer has closed the upstream socket
    writer_done: oneshot::Receiver<()>,
}

#[derive(Message)]
#[rtype(result = "()")]
struct SessionFailed {
    generation: u64,
}

/// A session event bridged from the client's event stream.
#[derive(Message)]
#[rtype(result = "()")]
struct UpstreamEvent {
    generation: u64,
    event: SessionEvent,
}

/// Snapshot of the router for the health endpoint.
#[derive(Message)]
#[rtype(result = "StatusReport")]
pub struct GetStatus;

#[derive(Debug, MessageResponse)]
pub struct StatusReport {
    pub bot_connected: bool,
    pub audio_sources: usize,
    pub session: &'static str,
}

/// Awaited, idempotent teardown: stop the session, close every peer.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Shutdown;

/// Transcription-session lifecycle state.
enum SessionState {
    Inactive,
    Starting,
    Active(SessionHandle),
}

impl SessionState {
    fn as_str(&self) -> &'static str {
        match self {
            SessionState::Inactive => "inactive",
            SessionState::Starting => "starting",
            SessionState::Active(_) => "active",
        }
    }
}

/// Deduplicating tracker for speaker-activity notifications: a diagnostic
/// is emitted only when a speaking participant differs from the previous
/// one, so a continuously-speaking participant logs once.
#[derive(Debug, Default)]
pub struct SpeakerTracker {
    last_active: Option<String>,
}

impl SpeakerTracker {
    /// Feed one notification; returns the new speaker's name when it changed.
    pub fn observe(&mut self, activity: &[SpeakerActivity]) -> Option<String> {
        for entry in activity {
            if entry.is_speaking && self.last_active.as_deref() != Some(entry.name.as_str()) {
                self.last_active = Some(entry.name.clone());
                return Some(entry.name.clone());
            }
        }
        None
    }
}

/// The message-routing hub. Constructed once at startup; its address is the
/// only way the rest of the process reaches peer or session state.
pub struct ProxyRouter {
    config: AppConfig,
    registry: PeerRegistry<Recipient<Deliver>>,
    session: SessionState,
    /// Activation cycle counter; start results carrying an older value are
    /// discarded (their cycle already ended).
    generation: u64,
    /// Completion signal of the active session's writer, held for shutdown
    writer_done: Option<oneshot::Receiver<()>>,
    speakers: SpeakerTracker,
    closing: bool,
}

impl ProxyRouter {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            registry: PeerRegistry::new(),
            session: SessionState::Inactive,
            generation: 0,
            writer_done: None,
            speakers: SpeakerTracker::default(),
            closing: false,
        }
    }

    /// First audio source of a cycle: start one upstream session. Idempotent
    /// against anything but `Inactive`.
    fn activate(&mut self, ctx: &mut Context<Self>) {
        if self.closing || !matches!(self.session, SessionState::Inactive) {
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        self.session = SessionState::Starting;
        info!(generation, "starting transcription session");

        let gladia_config = self.config.gladia.clone();
        let audio_config = self.config.audio.clone();
        let addr = ctx.address();

        tokio::spawn(async move {
            match gladia::start(&gladia_config, &audio_config).await {
                Ok((handle, events, writer_done)) => addr.do_send(SessionStarted {
                    generation,
                    handle,
                    events,
                    writer_done,
                }),
                Err(e) => {
                    error!(generation, "transcription session start failed: {}", e);
                    addr.do_send(SessionFailed { generation });
                }
            }
        });
    }

    /// End the current activation cycle, stopping the session if one is
    /// live. Bumping the generation invalidates any start still in flight.
    /// Returns the stopped writer's completion signal when there was a live
    /// session, so shutdown can await the flush.
    fn deactivate(&mut self) -> Option<oneshot::Receiver<()>> {
        match std::mem::replace(&mut self.session, SessionState::Inactive) {
            SessionState::Inactive => None,
            SessionState::Starting => {
                self.generation += 1;
                info!("activation cycle ended while session was starting");
                None
            }
            SessionState::Active(handle) => {
                self.generation += 1;
                info!(session_id = %handle.session_id(), "stopping transcription session");
                handle.stop();
                self.writer_done.take()
            }
        }
    }

    fn route_bot_frame(&self, payload: &FramePayload) {
        // Verbatim fan-out; closed peers are simply skipped by the mailbox.
        for source in self.registry.sources() {
            source.do_send(payload.to_deliver());
        }
    }

    fn route_source_frame(&mut self, payload: &FramePayload) {
        // Every audio-source payload mirrors to the bot, whatever it is.
        if let Some(bot) = self.registry.bot() {
            bot.do_send(payload.to_deliver());
        }

        match envelope::classify_source_payload(payload.as_bytes()) {
            SourcePayload::Speakers(activity) => {
                if let Some(name) = self.speakers.observe(&activity) {
                    info!(speaker = %name, "active speaker changed");
                }
            }
            SourcePayload::Json(envelope) => {
                // Control traffic is never audio; it stops here.
                debug!(
                    kind = envelope.kind(),
                    "control frame from audio source: {}",
                    inspect::describe_payload(payload.as_bytes(), payload.origin())
                );
            }
            SourcePayload::Audio => match &self.session {
                SessionState::Active(handle) => {
                    let text = matches!(payload, FramePayload::Text(_));
                    if !handle.send_audio(payload.as_bytes().to_vec(), text) {
                        warn!("audio chunk rejected: upstream session gone");
                    }
                }
                state => {
                    // No buffering by design; audio is lost until the
                    // session becomes active.
                    debug!(session = state.as_str(), "audio dropped, session not active");
                }
            },
        }
    }

    fn forward_transcript(&self, text: String, is_final: bool, start: f64, end: f64) {
        let Some(bot) = self.registry.bot() else {
            debug!("transcript dropped: no bot peer connected");
            return;
        };

        let envelope = Envelope::Transcription(TranscriptionData {
            text,
            is_final,
            start_time: start,
            end_time: end,
        });

        if let Some(frame) = envelope.to_frame() {
            bot.do_send(Deliver::Text(frame));
        }
    }
}

impl Actor for ProxyRouter {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("proxy router started");
    }
}

impl Handler<PeerJoined> for ProxyRouter {
    type Result = ();

    fn handle(&mut self, msg: PeerJoined, ctx: &mut Self::Context) {
        if self.closing {
            msg.peer.do_send(Deliver::Close);
            return;
        }

        let replaced_bot = msg.role == PeerRole::Bot && self.registry.has_bot();
        let signal = self.registry.register(msg.id, msg.role, msg.peer);

        if replaced_bot {
            // The old bot connection stays open; only the forwarding target
            // moves.
            info!(peer_id = %msg.id, "bot peer replaced");
        } else {
            info!(
                peer_id = %msg.id,
                role = msg.role.as_str(),
                audio_sources = self.registry.source_count(),
                "peer registered"
            );
        }

        if signal == Some(LifecycleSignal::FirstSourceJoined) {
            self.activate(ctx);
        }
    }
}

impl Handler<PeerFrame> for ProxyRouter {
    type Result = ();

    fn handle(&mut self, msg: PeerFrame, _ctx: &mut Self::Context) {
        if self.closing {
            return;
        }

        match msg.role {
            PeerRole::Bot => self.route_bot_frame(&msg.payload),
            PeerRole::AudioSource => self.route_source_frame(&msg.payload),
        }
    }
}

impl Handler<PeerClosed> for ProxyRouter {
    type Result = ();

    fn handle(&mut self, msg: PeerClosed, _ctx: &mut Self::Context) {
        let signal = self.registry.remove(msg.id);
        debug!(
            peer_id = %msg.id,
            audio_sources = self.registry.source_count(),
            "peer removed"
        );

        if signal == Some(LifecycleSignal::LastSourceLeft) {
            self.deactivate();
        }
    }
}

impl Handler<SessionStarted> for ProxyRouter {
    type Result = ();

    fn handle(&mut self, msg: SessionStarted, ctx: &mut Self::Context) {
        if msg.generation != self.generation || self.closing {
            // The activation cycle this start belongs to already ended.
            info!(session_id = %msg.handle.session_id(), "discarding stale session start");
            msg.handle.stop();
            return;
        }

        info!(session_id = %msg.handle.session_id(), "transcription session active");
        self.session = SessionState::Active(msg.handle);
        self.writer_done = Some(msg.writer_done);

        let generation = msg.generation;
        let mut events = msg.events;
        let addr = ctx.address();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                addr.do_send(UpstreamEvent { generation, event });
            }
        });
    }
}

impl Handler<SessionFailed> for ProxyRouter {
    type Result = ();

    fn handle(&mut self, msg: SessionFailed, _ctx: &mut Self::Context) {
        if msg.generation != self.generation {
            return;
        }

        if matches!(self.session, SessionState::Starting) {
            // Audio from sources is dropped until the next activation cycle.
            warn!("transcription session unavailable, returning to inactive");
            self.session = SessionState::Inactive;
        }
    }
}

impl Handler<UpstreamEvent> for ProxyRouter {
    type Result = ();

    fn handle(&mut self, msg: UpstreamEvent, _ctx: &mut Self::Context) {
        if msg.generation != self.generation {
            return;
        }

        match msg.event {
            SessionEvent::Transcript {
                text,
                is_final,
                start,
                end,
            } => {
                debug!(is_final, "transcript received");
                self.forward_transcript(text, is_final, start, end);
            }
            SessionEvent::Closed => {
                if !matches!(self.session, SessionState::Inactive) {
                    warn!("upstream session closed unexpectedly");
                    self.session = SessionState::Inactive;
                    self.generation += 1;
                    self.writer_done = None;
                }
            }
        }
    }
}

impl Handler<GetStatus> for ProxyRouter {
    type Result = StatusReport;

    fn handle(&mut self, _msg: GetStatus, _ctx: &mut Self::Context) -> StatusReport {
        StatusReport {
            bot_connected: self.registry.has_bot(),
            audio_sources: self.registry.source_count(),
            session: self.session.as_str(),
        }
    }
}

impl Handler<Shutdown> for ProxyRouter {
    type Result = ResponseActFuture<Self, ()>;

    fn handle(&mut self, _msg: Shutdown, _ctx: &mut Self::Context) -> Self::Result {
        if self.closing {
            return Box::pin(actix::fut::ready(()));
        }

        info!("proxy router shutting down");
        self.closing = true;
        let flush = self.deactivate();

        for peer in self.registry.drain() {
            peer.do_send(Deliver::Close);
        }

        // Wait for the writer to confirm the end-of-stream frame went out
        // before the caller proceeds with process exit. A dropped writer
        // resolves the signal too.
        Box::pin(
            async move {
                if let Some(done) = flush {
                    let _ = tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, done).await;
                }
            }
            .into_actor(self),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::gladia::Command;
    use std::sync::{Arc, Mutex};

    fn speaker(name: &str, id: i64, is_speaking: bool) -> SpeakerActivity {
        SpeakerActivity {
            name: name.to_string(),
            id,
            is_speaking,
        }
    }

    #[test]
    fn test_speaker_change_emits_once() {
        let mut tracker = SpeakerTracker::default();
        let alice = [speaker("Alice", 1, true)];

        assert_eq!(tracker.observe(&alice), Some("Alice".to_string()));
        // Continuously-speaking participant is suppressed.
        assert_eq!(tracker.observe(&alice), None);

        let bob = [speaker("Bob", 2, true)];
        assert_eq!(tracker.observe(&bob), Some("Bob".to_string()));
    }

    #[test]
    fn test_silent_participants_are_ignored() {
        let mut tracker = SpeakerTracker::default();
        assert_eq!(tracker.observe(&[speaker("Alice", 1, false)]), None);
        assert_eq!(
            tracker.observe(&[speaker("Alice", 1, false), speaker("Bob", 2, true)]),
            Some("Bob".to_string())
        );
    }

    /// Test double for a peer connection: records everything delivered.
    struct Collector {
        received: Arc<Mutex<Vec<Collected>>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Collected {
        Text(String),
        Binary(Vec<u8>),
        Close,
    }

    impl Actor for Collector {
        type Context = Context<Self>;
    }

    impl Handler<Deliver> for Collector {
        type Result = ();

        fn handle(&mut self, msg: Deliver, _ctx: &mut Self::Context) {
            let collected = match msg {
                Deliver::Text(text) => Collected::Text(text),
                Deliver::Binary(data) => Collected::Binary(data),
                Deliver::Close => Collected::Close,
            };
            self.received.lock().unwrap().push(collected);
        }
    }

    fn collector() -> (Recipient<Deliver>, Arc<Mutex<Vec<Collected>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let addr = Collector {
            received: received.clone(),
        }
        .start();
        (addr.recipient(), received)
    }

    /// Config whose provider endpoint refuses connections immediately, so
    /// spawned session starts fail fast instead of reaching the network.
    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.gladia.api_url = "http://127.0.0.1:1".to_string();
        config
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[actix_web::test]
    async fn test_transcript_without_bot_is_dropped_silently() {
        let router = ProxyRouter::new(test_config()).start();

        router
            .send(UpstreamEvent {
                generation: 0,
                event: SessionEvent::Transcript {
                    text: "hello".to_string(),
                    is_final: false,
                    start: 0.5,
                    end: 1.0,
                },
            })
            .await
            .unwrap();

        // Now connect a bot and repeat; only this one is observable.
        let (bot, received) = collector();
        router
            .send(PeerJoined {
                id: Uuid::new_v4(),
                role: PeerRole::Bot,
                peer: bot,
            })
            .await
            .unwrap();

        router
            .send(UpstreamEvent {
                generation: 0,
                event: SessionEvent::Transcript {
                    text: "hello".to_string(),
                    is_final: true,
                    start: 0.5,
                    end: 1.0,
                },
            })
            .await
            .unwrap();
        settle().await;

        let frames = received.lock().unwrap();
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            Collected::Text(frame) => {
                let value: serde_json::Value = serde_json::from_str(frame).unwrap();
                assert_eq!(value["type"], "transcription");
                assert_eq!(value["data"]["text"], "hello");
                assert_eq!(value["data"]["isFinal"], true);
                // Provider utterance offsets are propagated, not wall-clock.
                assert_eq!(value["data"]["startTime"], 0.5);
                assert_eq!(value["data"]["endTime"], 1.0);
            }
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[actix_web::test]
    async fn test_second_bot_replaces_forwarding_target() {
        let router = ProxyRouter::new(test_config()).start();
        let (first_bot, first_received) = collector();
        let (second_bot, second_received) = collector();

        router
            .send(PeerJoined {
                id: Uuid::new_v4(),
                role: PeerRole::Bot,
                peer: first_bot,
            })
            .await
            .unwrap();
        router
            .send(PeerJoined {
                id: Uuid::new_v4(),
                role: PeerRole::Bot,
                peer: second_bot,
            })
            .await
            .unwrap();

        router
            .send(UpstreamEvent {
                generation: 0,
                event: SessionEvent::Transcript {
                    text: "for the new bot".to_string(),
                    is_final: true,
                    start: 0.0,
                    end: 1.0,
                },
            })
            .await
            .unwrap();
        settle().await;

        // The first bot got nothing and was not closed.
        assert!(first_received.lock().unwrap().is_empty());
        assert_eq!(second_received.lock().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_source_json_is_mirrored_to_bot() {
        let router = ProxyRouter::new(test_config()).start();
        let (bot, bot_received) = collector();
        let (source, _) = collector();

        router
            .send(PeerJoined {
                id: Uuid::new_v4(),
                role: PeerRole::Bot,
                peer: bot,
            })
            .await
            .unwrap();
        let source_id = Uuid::new_v4();
        router
            .send(PeerJoined {
                id: source_id,
                role: PeerRole::AudioSource,
                peer: source,
            })
            .await
            .unwrap();

        // Valid JSON, but neither speaker activity nor a recognized
        // envelope: goes to the bot verbatim and never upstream.
        let payload = r#"{"type":"custom","data":{"x":1}}"#.to_string();
        router
            .send(PeerFrame {
                id: source_id,
                role: PeerRole::AudioSource,
                payload: FramePayload::Text(payload.clone()),
            })
            .await
            .unwrap();
        settle().await;

        assert_eq!(
            *bot_received.lock().unwrap(),
            vec![Collected::Text(payload)]
        );
    }

    #[actix_web::test]
    async fn test_bot_frames_fan_out_to_all_sources() {
        let router = ProxyRouter::new(test_config()).start();
        let (first_source, first_received) = collector();
        let (second_source, second_received) = collector();

        router
            .send(PeerJoined {
                id: Uuid::new_v4(),
                role: PeerRole::AudioSource,
                peer: first_source,
            })
            .await
            .unwrap();
        router
            .send(PeerJoined {
                id: Uuid::new_v4(),
                role: PeerRole::AudioSource,
                peer: second_source,
            })
            .await
            .unwrap();

        router
            .send(PeerFrame {
                id: Uuid::new_v4(),
                role: PeerRole::Bot,
                payload: FramePayload::Binary(vec![1, 2, 3]),
            })
            .await
            .unwrap();
        settle().await;

        assert_eq!(
            *first_received.lock().unwrap(),
            vec![Collected::Binary(vec![1, 2, 3])]
        );
        assert_eq!(
            *second_received.lock().unwrap(),
            vec![Collected::Binary(vec![1, 2, 3])]
        );
    }

    #[actix_web::test]
    async fn test_shutdown_is_idempotent_and_closes_peers() {
        let router = ProxyRouter::new(test_config()).start();
        let (bot, bot_received) = collector();
        let (source, source_received) = collector();

        router
            .send(PeerJoined {
                id: Uuid::new_v4(),
                role: PeerRole::Bot,
                peer: bot,
            })
            .await
            .unwrap();
        router
            .send(PeerJoined {
                id: Uuid::new_v4(),
                role: PeerRole::AudioSource,
                peer: source,
            })
            .await
            .unwrap();

        router.send(Shutdown).await.unwrap();
        router.send(Shutdown).await.unwrap();
        settle().await;

        assert_eq!(*bot_received.lock().unwrap(), vec![Collected::Close]);
        assert_eq!(*source_received.lock().unwrap(), vec![Collected::Close]);

        let status = router.send(GetStatus).await.unwrap();
        assert!(!status.bot_connected);
        assert_eq!(status.audio_sources, 0);
        assert_eq!(status.session, "inactive");
    }

    /// Session-start message wired to test channels, with the command
    /// receiver to observe what reaches the session.
    fn started_session(
        generation: u64,
        session_id: &str,
    ) -> (SessionStarted, mpsc::UnboundedReceiver<Command>, oneshot::Sender<()>) {
        let (handle, commands) = SessionHandle::detached(session_id);
        let (_, events) = mpsc::unbounded_channel();
        let (done_tx, writer_done) = oneshot::channel();
        (
            SessionStarted {
                generation,
                handle,
                events,
                writer_done,
            },
            commands,
            done_tx,
        )
    }

    #[actix_web::test]
    async fn test_stale_session_start_is_stopped() {
        let router = ProxyRouter::new(test_config()).start();

        // No activation has happened, so any non-zero generation belongs to
        // a cycle that already ended.
        let (started, mut commands, _done_tx) = started_session(7, "stale-session");
        router.send(started).await.unwrap();

        assert!(matches!(commands.try_recv(), Ok(Command::Stop)));
        let status = router.send(GetStatus).await.unwrap();
        assert_eq!(status.session, "inactive");
    }

    #[actix_web::test]
    async fn test_active_session_receives_source_audio_once() {
        let router = ProxyRouter::new(test_config()).start();

        let (started, mut commands, _done_tx) = started_session(0, "live-session");
        router.send(started).await.unwrap();

        let status = router.send(GetStatus).await.unwrap();
        assert_eq!(status.session, "active");

        router
            .send(PeerFrame {
                id: Uuid::new_v4(),
                role: PeerRole::AudioSource,
                payload: FramePayload::Binary(vec![0x01, 0x02, 0xff]),
            })
            .await
            .unwrap();

        match commands.try_recv() {
            Ok(Command::Audio { chunk, text }) => {
                assert_eq!(chunk, vec![0x01, 0x02, 0xff]);
                assert!(!text);
            }
            _ => panic!("expected exactly one audio command"),
        }
        assert!(commands.try_recv().is_err());
    }

    #[actix_web::test]
    async fn test_upstream_close_while_active_resets_session() {
        let router = ProxyRouter::new(test_config()).start();
        let (bot, bot_received) = collector();
        router
            .send(PeerJoined {
                id: Uuid::new_v4(),
                role: PeerRole::Bot,
                peer: bot,
            })
            .await
            .unwrap();

        let (started, _commands, _done_tx) = started_session(0, "dying-session");
        router.send(started).await.unwrap();

        router
            .send(UpstreamEvent {
                generation: 0,
                event: SessionEvent::Closed,
            })
            .await
            .unwrap();

        let status = router.send(GetStatus).await.unwrap();
        assert_eq!(status.session, "inactive");

        // Stragglers from the dead session's stream are ignored.
        router
            .send(UpstreamEvent {
                generation: 0,
                event: SessionEvent::Transcript {
                    text: "too late".to_string(),
                    is_final: true,
                    start: 0.0,
                    end: 1.0,
                },
            })
            .await
            .unwrap();
        settle().await;

        assert!(bot_received.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_shutdown_stops_active_session_and_awaits_flush() {
        let router = ProxyRouter::new(test_config()).start();

        let (started, mut commands, done_tx) = started_session(0, "closing-session");
        router.send(started).await.unwrap();

        // Resolve the writer's completion signal the way a finished writer
        // would; shutdown must return once it sees it.
        done_tx.send(()).unwrap();
        router.send(Shutdown).await.unwrap();

        assert!(matches!(commands.try_recv(), Ok(Command::Stop)));
        let status = router.send(GetStatus).await.unwrap();
        assert_eq!(status.session, "inactive");
    }

    #[actix_web::test]
    async fn test_status_reports_peer_counts() {
        let router = ProxyRouter::new(test_config()).start();

        let status = router.send(GetStatus).await.unwrap();
        assert!(!status.bot_connected);
        assert_eq!(status.audio_sources, 0);
        assert_eq!(status.session, "inactive");

        let (bot, _) = collector();
        router
            .send(PeerJoined {
                id: Uuid::new_v4(),
                role: PeerRole::Bot,
                peer: bot,
            })
            .await
            .unwrap();

        let status = router.send(GetStatus).await.unwrap();
        assert!(status.bot_connected);
    }
}
