//! # WebSocket Streaming Recognition Handler
//!
//! Clients connect to `/ws/stream_stt?sample_rate=<Hz>` and send raw PCM
//! (mono, 16-bit little-endian) as binary frames. The server answers with
//! JSON text frames `{"type": "partial"|"final", "text": "..."}`.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: the query string selects the sample rate (default from config)
//! 2. **Audio Streaming**: every binary frame is decoded as soon as it arrives
//! 3. **End of stream**: `{"eof": 1}` (text or binary) forces a final; the session continues
//! 4. **Close**: a Close frame flushes the decoder, sends the last final, then closes
//! 5. **Errors**: the socket is closed with code 1011 and the error as the reason
//!
//! ## Actor Model:
//! Each connection is an independent actor that owns its `StreamingSession`.
//! Frames are handled one at a time in arrival order, so the decoder is never
//! touched concurrently and needs no lock.

use crate::config::{MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
use crate::error::AppError;
use crate::state::AppState;
use crate::transcription::{is_eof_marker, SpeechEngine, StreamingSession, TranscriptMessage};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Close frame reasons must fit in a 125-byte control frame.
const MAX_CLOSE_REASON_BYTES: usize = 120;

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub sample_rate: Option<u32>,
}

/// WebSocket actor for one streaming recognition connection.
pub struct SttWebSocket {
    state: web::Data<AppState>,
    engine: Arc<dyn SpeechEngine>,
    sample_rate: u32,
    peer: String,

    /// Created in `started`; `None` if opening failed or after teardown
    session: Option<StreamingSession>,

    close_received: bool,
}

impl SttWebSocket {
    pub fn new(state: web::Data<AppState>, engine: Arc<dyn SpeechEngine>, sample_rate: u32, peer: String) -> Self {
        Self {
            state,
            engine,
            sample_rate,
            peer,
            session: None,
            close_received: false,
        }
    }

    fn send(&self, message: &TranscriptMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(message) {
            Ok(json) => {
                if message.is_final() {
                    info!(peer = %self.peer, text = %message.text, "Final transcript");
                }
                ctx.text(json);
            }
            Err(err) => error!("Failed to serialize transcript: {}", err),
        }
    }

    /// Decode one chunk of audio.
    fn handle_audio(&mut self, data: &[u8], ctx: &mut ws::WebsocketContext<Self>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match session.feed(data) {
            Ok(Some(message)) => self.send(&message, ctx),
            Ok(None) => {}
            Err(err) => self.fail(err, ctx),
        }
    }

    /// Force the decoder to finalize and send the result, if any.
    fn flush(&mut self, ctx: &mut ws::WebsocketContext<Self>) -> bool {
        let Some(session) = self.session.as_mut() else {
            return true;
        };

        match session.flush() {
            Ok(Some(message)) => {
                self.send(&message, ctx);
                true
            }
            Ok(None) => true,
            Err(err) => {
                self.fail(err, ctx);
                false
            }
        }
    }

    /// Close with 1011 and the error text, discarding the decoder.
    fn fail(&mut self, err: anyhow::Error, ctx: &mut ws::WebsocketContext<Self>) {
        let reason = close_reason(&format!("Server error: {:#}", err));
        error!(peer = %self.peer, error = %format!("{:#}", err), "WebSocket session failed");

        self.session = None;
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Error,
            description: Some(reason),
        }));
        ctx.stop();
    }
}

/// Truncate `text` to a close-frame-sized reason on a char boundary.
fn close_reason(text: &str) -> String {
    if text.len() <= MAX_CLOSE_REASON_BYTES {
        return text.to_string();
    }
    let mut end = MAX_CLOSE_REASON_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

impl Actor for SttWebSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Called when the WebSocket connection starts.
    fn started(&mut self, ctx: &mut Self::Context) {
        self.state.increment_active_sessions();

        match StreamingSession::open(self.engine.as_ref(), self.sample_rate) {
            Ok(session) => {
                info!(
                    peer = %self.peer,
                    session_id = session.session_id(),
                    sample_rate = self.sample_rate,
                    "WebSocket session accepted"
                );
                self.session = Some(session);
            }
            Err(err) => self.fail(err, ctx),
        }
    }

    /// Called when the WebSocket connection stops.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.state.decrement_active_sessions();

        if let Some(session) = self.session.take() {
            let pending = session.pending_hypothesis();
            if !pending.is_empty() {
                warn!(
                    session_id = session.session_id(),
                    pending_chars = pending.chars().count(),
                    "Dropping unfinished hypothesis on disconnect"
                );
            }

            let stats = session.stats();
            info!(
                session_id = session.session_id(),
                sample_rate = session.sample_rate(),
                bytes = session.bytes_received(),
                chunks = stats.chunks_received,
                messages = stats.messages_emitted,
                finals = stats.finals_emitted,
                decode_ms = stats.decode_time_ms,
                partial_sample = session.has_partial_sample(),
                age_seconds = session.age_seconds(),
                "WebSocket session closed"
            );
        }
    }
}

/// Handle incoming WebSocket messages.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for SttWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                if is_eof_marker(&data) {
                    debug!(peer = %self.peer, "End-of-stream marker received");
                    self.flush(ctx);
                } else {
                    self.handle_audio(&data, ctx);
                }
            }
            Ok(ws::Message::Text(text)) => {
                if is_eof_marker(text.as_bytes()) {
                    debug!(peer = %self.peer, "End-of-stream marker received");
                    self.flush(ctx);
                } else {
                    warn!(peer = %self.peer, "Ignoring unexpected text frame");
                }
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                info!(peer = %self.peer, "WebSocket closed by client: {:?}", reason);
                self.close_received = true;
                if self.flush(ctx) {
                    ctx.close(reason);
                    ctx.stop();
                }
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(peer = %self.peer, "Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                warn!(peer = %self.peer, "WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }

    /// The stream ended without a Close frame.
    fn finished(&mut self, ctx: &mut Self::Context) {
        if self.session.is_some() && !self.close_received {
            warn!(peer = %self.peer, "WebSocket disconnected without close frame");
        }
        ctx.stop();
    }
}

/// `GET /ws/stream_stt`: upgrade to a streaming recognition session.
pub async fn stream_stt(
    req: HttpRequest,
    stream: web::Payload,
    params: web::Query<StreamParams>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let sample_rate = params
        .sample_rate
        .unwrap_or(state.config().stt.default_sample_rate);

    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        return Err(AppError::ValidationError(format!(
            "sample_rate must be between {} and {} Hz, got {}",
            MIN_SAMPLE_RATE, MAX_SAMPLE_RATE, sample_rate
        ))
        .into());
    }

    let engine = state.speech_engine()?;
    let peer = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();

    info!(peer = %peer, sample_rate, "New WebSocket connection request");
    ws::start(SttWebSocket::new(state, engine, sample_rate, peer), &req, stream)
}
