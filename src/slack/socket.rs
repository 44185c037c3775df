//! Socket Mode listener — the event router.
//!
//! Receives events over Slack's Socket Mode WebSocket (no public HTTP
//! endpoint needed): fetches a `wss://` URL via `apps.connections.open`,
//! ACKs every envelope immediately, and dispatches `message` and
//! `member_joined_channel` events into the scheduler engine. Reconnects
//! with capped backoff when the server drops the connection.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::error::SlackError;
use crate::scheduler::SchedulerEngine;
use crate::slack::api::SlackApi;
use crate::slack::events::InboundEvent;

/// Base reconnect backoff (seconds); grows linearly with the attempt count.
const RECONNECT_DELAY_SECS: u64 = 5;

/// Maximum consecutive failed connection attempts before giving up.
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Socket Mode envelope; must be ACKed by `envelope_id`.
#[derive(Debug, Clone, Deserialize)]
struct SocketEnvelope {
    envelope_id: String,
    #[serde(rename = "type")]
    envelope_type: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Serialize)]
struct SocketAck {
    envelope_id: String,
}

/// Classified WebSocket text frame.
#[derive(Debug)]
enum Frame {
    Hello,
    Disconnect { reason: String },
    Envelope(SocketEnvelope),
    Ignored,
}

/// Classify one text frame from the Socket Mode connection.
fn classify_frame(text: &str) -> Frame {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Frame::Ignored;
    };

    match value["type"].as_str() {
        Some("hello") => Frame::Hello,
        Some("disconnect") => Frame::Disconnect {
            reason: value["reason"].as_str().unwrap_or("unknown").to_string(),
        },
        _ => match serde_json::from_value::<SocketEnvelope>(value) {
            Ok(envelope) => Frame::Envelope(envelope),
            Err(_) => Frame::Ignored,
        },
    }
}

/// Socket Mode listener bound to one scheduler engine.
pub struct SocketModeListener {
    api: Arc<SlackApi>,
    app_token: SecretString,
    engine: Arc<Mutex<SchedulerEngine>>,
}

impl SocketModeListener {
    pub fn new(
        api: Arc<SlackApi>,
        app_token: SecretString,
        engine: Arc<Mutex<SchedulerEngine>>,
    ) -> Self {
        Self {
            api,
            app_token,
            engine,
        }
    }

    /// Connect and listen, reconnecting until the attempt cap is hit.
    pub async fn run(&self) -> Result<(), SlackError> {
        let mut attempts: u32 = 0;

        loop {
            if attempts > 0 {
                if attempts >= MAX_RECONNECT_ATTEMPTS {
                    return Err(SlackError::Socket(format!(
                        "exceeded max reconnect attempts ({MAX_RECONNECT_ATTEMPTS})"
                    )));
                }
                let delay = Duration::from_secs(RECONNECT_DELAY_SECS * u64::from(attempts).min(6));
                info!(
                    attempt = attempts,
                    delay_secs = delay.as_secs(),
                    "reconnecting to Socket Mode..."
                );
                tokio::time::sleep(delay).await;
            }

            let ws_url = match self.api.connections_open(&self.app_token).await {
                Ok(url) => url,
                Err(e) => {
                    error!(error = %e, "failed to open Socket Mode connection");
                    attempts += 1;
                    continue;
                }
            };

            let ws_stream = match tokio_tungstenite::connect_async(ws_url.as_str()).await {
                Ok((stream, _)) => {
                    info!("connected to Slack Socket Mode");
                    attempts = 0;
                    stream
                }
                Err(e) => {
                    error!(error = %e, "WebSocket connect failed");
                    attempts += 1;
                    continue;
                }
            };

            match self.run_connection(ws_stream).await {
                Ok(()) => {
                    // Server-initiated disconnect; reconnect after one
                    // backoff step.
                    attempts = 1;
                }
                Err(e) => {
                    warn!(error = %e, "Socket Mode connection failed");
                    attempts += 1;
                }
            }
        }
    }

    /// Drive an established WebSocket connection until it closes.
    async fn run_connection(
        &self,
        ws_stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> Result<(), SlackError> {
        let (mut write, mut read) = ws_stream.split();

        while let Some(frame) = read.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => match classify_frame(&text) {
                    Frame::Hello => info!("received Socket Mode hello"),
                    Frame::Disconnect { reason } => {
                        info!(reason = %reason, "server requested disconnect");
                        return Ok(());
                    }
                    Frame::Envelope(envelope) => {
                        let ack = SocketAck {
                            envelope_id: envelope.envelope_id.clone(),
                        };
                        match serde_json::to_string(&ack) {
                            Ok(ack_json) => {
                                if let Err(e) = write.send(WsMessage::Text(ack_json.into())).await {
                                    warn!(error = %e, "failed to send envelope ACK");
                                }
                            }
                            Err(e) => warn!(error = %e, "failed to encode envelope ACK"),
                        }
                        self.dispatch(envelope).await;
                    }
                    Frame::Ignored => debug!("ignoring unrecognized frame"),
                },
                Ok(WsMessage::Ping(data)) => {
                    let _ = write.send(WsMessage::Pong(data)).await;
                }
                Ok(WsMessage::Close(_)) => {
                    info!("WebSocket closed by server");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => return Err(SlackError::Socket(e.to_string())),
            }
        }

        info!("WebSocket stream ended");
        Ok(())
    }

    /// Route an ACKed envelope into the engine.
    async fn dispatch(&self, envelope: SocketEnvelope) {
        if envelope.envelope_type != "events_api" {
            debug!(
                envelope_type = %envelope.envelope_type,
                "ignoring non-events_api envelope"
            );
            return;
        }

        let event = envelope.payload["event"].clone();
        let event: InboundEvent = match serde_json::from_value(event) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "unparseable event payload");
                return;
            }
        };

        match event {
            InboundEvent::Message(msg) => {
                if !msg.is_user_message() {
                    debug!("skipping non-user message");
                    return;
                }
                // is_user_message guarantees user is present.
                let Some(user) = msg.user.as_deref() else {
                    return;
                };
                self.engine.lock().await.handle_message(
                    Utc::now(),
                    &msg.channel,
                    user,
                    msg.text.as_deref().unwrap_or(""),
                    &msg.event_ts,
                    msg.thread_ts.as_deref(),
                );
            }
            InboundEvent::MemberJoinedChannel(joined) => {
                self.engine
                    .lock()
                    .await
                    .on_member_joined(&joined.channel, &joined.user)
                    .await;
            }
            InboundEvent::Other => debug!("ignoring event callback type"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_hello() {
        assert!(matches!(
            classify_frame(r#"{"type":"hello","num_connections":1}"#),
            Frame::Hello
        ));
    }

    #[test]
    fn classifies_disconnect_with_reason() {
        let frame = classify_frame(r#"{"type":"disconnect","reason":"refresh_requested"}"#);
        let Frame::Disconnect { reason } = frame else {
            panic!("expected disconnect frame");
        };
        assert_eq!(reason, "refresh_requested");
    }

    #[test]
    fn classifies_events_api_envelope() {
        let frame = classify_frame(
            r#"{
                "envelope_id": "abc-123",
                "type": "events_api",
                "payload": {"event": {"type": "message", "channel": "C01",
                            "user": "U1", "text": "hi", "event_ts": "1.0"}}
            }"#,
        );
        let Frame::Envelope(envelope) = frame else {
            panic!("expected envelope frame");
        };
        assert_eq!(envelope.envelope_id, "abc-123");
        assert_eq!(envelope.envelope_type, "events_api");
        assert_eq!(envelope.payload["event"]["channel"], "C01");
    }

    #[test]
    fn envelope_without_payload_still_parses() {
        let frame = classify_frame(r#"{"envelope_id": "x", "type": "slash_commands"}"#);
        assert!(matches!(frame, Frame::Envelope(_)));
    }

    #[test]
    fn garbage_is_ignored() {
        assert!(matches!(classify_frame("not json"), Frame::Ignored));
        assert!(matches!(classify_frame(r#"{"type":"unknown"}"#), Frame::Ignored));
    }

    #[test]
    fn ack_serializes_envelope_id_only() {
        let ack = SocketAck {
            envelope_id: "abc-123".into(),
        };
        assert_eq!(
            serde_json::to_string(&ack).unwrap(),
            r#"{"envelope_id":"abc-123"}"#
        );
    }
}
