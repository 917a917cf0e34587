//! # Peer Connection Actor
//!
//! One actor per inbound WebSocket connection. A peer starts unclassified;
//! its first message selects the role (the bot's register marker, or
//! audio-source for anything else) and is consumed by that handshake, never
//! forwarded. Every later frame is handed to the router, which owns all
//! routing decisions. The actor itself only does transport: heartbeats,
//! outbound delivery, and disconnect notification.

use crate::proxy::envelope;
use crate::proxy::registry::PeerRole;
use crate::proxy::router::{FramePayload, PeerClosed, PeerFrame, PeerJoined, ProxyRouter};
use crate::state::AppState;
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How often the proxy pings a peer.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long a silent peer survives before the connection is dropped.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Outbound delivery to a peer connection.
#[derive(Message)]
#[rtype(result = "()")]
pub enum Deliver {
    Text(String),
    Binary(Vec<u8>),
    /// Close the connection (used during proxy shutdown)
    Close,
}

/// WebSocket actor for a single peer connection.
pub struct PeerSocket {
    id: Uuid,
    router: Addr<ProxyRouter>,
    /// Role assigned by the first message; immutable afterwards
    role: Option<PeerRole>,
    last_heartbeat: Instant,
}

impl PeerSocket {
    pub fn new(router: Addr<ProxyRouter>) -> Self {
        Self {
            id: Uuid::new_v4(),
            router,
            role: None,
            last_heartbeat: Instant::now(),
        }
    }

    /// Handle one inbound data frame. The first frame classifies the peer
    /// and is dropped; everything after goes to the router.
    fn on_frame(&mut self, payload: FramePayload, ctx: &mut ws::WebsocketContext<Self>) {
        match self.role {
            None => {
                let role = match &payload {
                    FramePayload::Text(text) if envelope::is_bot_registration(text) => PeerRole::Bot,
                    _ => PeerRole::AudioSource,
                };
                self.role = Some(role);
                info!(peer_id = %self.id, role = role.as_str(), "peer classified");

                self.router.do_send(PeerJoined {
                    id: self.id,
                    role,
                    peer: ctx.address().recipient(),
                });
            }
            Some(role) => {
                self.router.do_send(PeerFrame {
                    id: self.id,
                    role,
                    payload,
                });
            }
        }
    }
}

impl Actor for PeerSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        debug!(peer_id = %self.id, "peer connection started");

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(peer_id = %act.id, "peer heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        debug!(peer_id = %self.id, "peer connection stopped");
        // Unclassified peers were never registered; the router treats the
        // unknown id as a no-op.
        self.router.do_send(PeerClosed { id: self.id });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for PeerSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.on_frame(FramePayload::Text(text.to_string()), ctx);
            }
            Ok(ws::Message::Binary(data)) => {
                self.on_frame(FramePayload::Binary(data.to_vec()), ctx);
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                debug!(peer_id = %self.id, "peer closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(peer_id = %self.id, "unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                error!(peer_id = %self.id, "WebSocket protocol error: {}", e);
                ctx.stop();
            }
        }
    }
}

impl Handler<Deliver> for PeerSocket {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) {
        match msg {
            Deliver::Text(text) => ctx.text(text),
            Deliver::Binary(data) => ctx.binary(data),
            Deliver::Close => {
                ctx.close(None);
                ctx.stop();
            }
        }
    }
}

/// WebSocket endpoint handler: upgrades the HTTP request and hands the
/// connection to a fresh [`PeerSocket`] bound to the one router.
pub async fn peer_endpoint(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        "new peer connection from {:?}",
        req.connection_info().peer_addr()
    );
    ws::start(PeerSocket::new(state.router().clone()), &req, stream)
}
