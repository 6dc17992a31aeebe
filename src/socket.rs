//! Live alert channel.
//!
//! The backend pushes alerts over Socket.IO. This module speaks the
//! Engine.IO v4 / Socket.IO v5 text framing directly over a WebSocket:
//!
//! | Frame | Meaning |
//! |---|---|
//! | `0{...}` | Engine.IO open (ping interval/timeout) |
//! | `1` | close |
//! | `2` / `3` | ping / pong |
//! | `40` | Socket.IO connect (sent by us, echoed with a sid) |
//! | `41` | Socket.IO disconnect |
//! | `42["alert",{...}]` | event |
//!
//! Connectivity is mirrored into [`AppState`]; each `alert` event is
//! prepended to the alert list. The connection is retried forever with
//! capped exponential backoff.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::RiskwatchError;
use crate::models::Alert;
use crate::state::AppState;

/// Name of the event carrying alerts.
pub const ALERT_EVENT: &str = "alert";

/// First reconnect delay.
const BACKOFF_INITIAL: Duration = Duration::from_secs(1);

/// Reconnect delay ceiling.
const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Used until the server's open packet says otherwise.
const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;
const DEFAULT_PING_TIMEOUT_MS: u64 = 20_000;

/// Engine.IO transport packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

/// Payload of the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    #[serde(default)]
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    DEFAULT_PING_INTERVAL_MS
}

fn default_ping_timeout() -> u64 {
    DEFAULT_PING_TIMEOUT_MS
}

impl Handshake {
    /// How long the server may stay silent before the link counts as dead.
    #[must_use]
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self {
            sid: String::new(),
            ping_interval: DEFAULT_PING_INTERVAL_MS,
            ping_timeout: DEFAULT_PING_TIMEOUT_MS,
        }
    }
}

impl EnginePacket {
    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty frame, an unknown type digit, or a
    /// malformed open payload.
    pub fn parse(frame: &str) -> Result<Self, RiskwatchError> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| RiskwatchError::Packet("empty frame".into()))?;
        let body = chars.as_str();

        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(body)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(body.to_string())),
            '3' => Ok(Self::Pong(body.to_string())),
            '4' => Ok(Self::Message(body.to_string())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(RiskwatchError::Packet(format!(
                "unknown engine packet type '{other}'"
            ))),
        }
    }
}

/// Socket.IO packet carried inside an Engine.IO message.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect,
    Disconnect,
    Event { name: String, args: Vec<Value> },
    ConnectError(String),
    /// Acks and binary packets; not used by the alert feed
    Unsupported(char),
}

impl SocketPacket {
    /// Decode a Socket.IO packet, skipping any namespace and ack id.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty packet or an event whose payload is
    /// not a JSON array starting with the event name.
    pub fn parse(packet: &str) -> Result<Self, RiskwatchError> {
        let mut chars = packet.chars();
        let kind = chars
            .next()
            .ok_or_else(|| RiskwatchError::Packet("empty socket packet".into()))?;

        let mut rest = chars.as_str();
        if rest.starts_with('/') {
            rest = rest.split_once(',').map_or("", |(_, tail)| tail);
        }
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

        match kind {
            '0' => Ok(Self::Connect),
            '1' => Ok(Self::Disconnect),
            '2' => {
                let mut args: Vec<Value> = serde_json::from_str(rest)?;
                if args.is_empty() {
                    return Err(RiskwatchError::Packet("event without a name".into()));
                }
                match args.remove(0) {
                    Value::String(name) => Ok(Self::Event { name, args }),
                    other => Err(RiskwatchError::Packet(format!(
                        "event name must be a string, got {other}"
                    ))),
                }
            }
            '4' => Ok(Self::ConnectError(rest.to_string())),
            other => Ok(Self::Unsupported(other)),
        }
    }
}

/// What the connection loop should do after a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nothing,
    Send(String),
    Close,
}

/// Applies decoded frames to shared state.
#[derive(Debug)]
pub struct Session {
    state: AppState,
    handshake: Handshake,
    connected: bool,
}

impl Session {
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            handshake: Handshake::default(),
            connected: false,
        }
    }

    #[must_use]
    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Handle one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be decoded.
    pub fn handle_frame(&mut self, frame: &str) -> Result<Reply, RiskwatchError> {
        match EnginePacket::parse(frame)? {
            EnginePacket::Open(handshake) => {
                debug!("engine open, sid {}", handshake.sid);
                self.handshake = handshake;
                Ok(Reply::Send("40".to_string()))
            }
            EnginePacket::Ping(data) => Ok(Reply::Send(format!("3{data}"))),
            EnginePacket::Close => {
                self.mark_disconnected();
                Ok(Reply::Close)
            }
            EnginePacket::Message(body) => self.handle_socket_packet(&body),
            EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => Ok(Reply::Nothing),
        }
    }

    fn handle_socket_packet(&mut self, body: &str) -> Result<Reply, RiskwatchError> {
        match SocketPacket::parse(body)? {
            SocketPacket::Connect => {
                info!("live channel connected");
                self.connected = true;
                self.state.set_connected(true);
                Ok(Reply::Nothing)
            }
            SocketPacket::Disconnect => {
                self.mark_disconnected();
                Ok(Reply::Close)
            }
            SocketPacket::ConnectError(reason) => {
                warn!("live channel refused connection: {}", reason);
                Ok(Reply::Close)
            }
            SocketPacket::Event { name, mut args } if name == ALERT_EVENT => {
                if args.is_empty() {
                    return Err(RiskwatchError::Packet("alert event without payload".into()));
                }
                let alert: Alert = serde_json::from_value(args.swap_remove(0))?;
                info!("alert received: {} ({})", alert.message, alert.risk_level);
                self.state.push_alert(alert);
                Ok(Reply::Nothing)
            }
            SocketPacket::Event { name, .. } => {
                debug!("ignoring event '{}'", name);
                Ok(Reply::Nothing)
            }
            SocketPacket::Unsupported(kind) => {
                debug!("ignoring socket packet type '{}'", kind);
                Ok(Reply::Nothing)
            }
        }
    }

    fn mark_disconnected(&mut self) {
        if self.connected {
            info!("live channel disconnected");
        }
        self.connected = false;
        self.state.set_connected(false);
    }
}

/// Exponential reconnect delay: 1s, 2s, 4s ... capped at 30s.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            next: BACKOFF_INITIAL,
        }
    }
}

impl Backoff {
    /// Delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(BACKOFF_MAX);
        delay
    }

    /// Start over after a successful connection.
    pub fn reset(&mut self) {
        self.next = BACKOFF_INITIAL;
    }
}

/// Persistent subscription to the backend's alert events.
#[derive(Debug, Clone)]
pub struct AlertChannel {
    url: Url,
    state: AppState,
}

impl AlertChannel {
    #[must_use]
    pub fn new(url: Url, state: AppState) -> Self {
        Self { url, state }
    }

    /// Keep the channel up forever.
    pub async fn run(&self) {
        let mut backoff = Backoff::default();

        loop {
            match self.connect_once(&mut backoff).await {
                Ok(()) => debug!("live channel closed by server"),
                Err(e) => warn!("live channel error: {}", e),
            }
            self.state.set_connected(false);

            let delay = backoff.next_delay();
            debug!("reconnecting live channel in {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// One connection lifetime.
    async fn connect_once(&self, backoff: &mut Backoff) -> Result<(), RiskwatchError> {
        debug!("connecting live channel to {}", self.url);
        let (stream, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        let (mut sink, mut source) = stream.split();
        let mut session = Session::new(self.state.clone());

        loop {
            let window = session.handshake().liveness_window();
            let Ok(next) = tokio::time::timeout(window, source.next()).await else {
                return Err(RiskwatchError::Packet(format!(
                    "no ping from server within {window:?}"
                )));
            };

            let Some(message) = next else {
                return Ok(());
            };

            let text = match message? {
                Message::Text(text) => text,
                Message::Close(_) => return Ok(()),
                _ => continue,
            };

            let was_connected = session.is_connected();
            let reply = match session.handle_frame(text.as_str()) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("dropping malformed frame: {}", e);
                    continue;
                }
            };
            if !was_connected && session.is_connected() {
                backoff.reset();
            }

            match reply {
                Reply::Nothing => {}
                Reply::Send(frame) => sink.send(Message::text(frame)).await?,
                Reply::Close => {
                    let _ = sink.close().await;
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;

    const ALERT_FRAME: &str = r#"42["alert",{"_id":"a9","message":"Flash flood warning","riskLevel":"High","location":{"name":"Wayanad"},"createdAt":"2026-07-30T02:10:00Z"}]"#;

    #[test]
    fn test_parse_open() {
        let packet = EnginePacket::parse(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":5000,"maxPayload":1000000}"#,
        )
        .unwrap();
        match packet {
            EnginePacket::Open(h) => {
                assert_eq!(h.sid, "lv_VI97HAXpY6yYWAAAC");
                assert_eq!(h.liveness_window(), Duration::from_secs(30));
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn test_liveness_window_saturates() {
        let handshake = Handshake {
            sid: String::new(),
            ping_interval: u64::MAX,
            ping_timeout: 20_000,
        };
        assert_eq!(handshake.liveness_window(), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_parse_engine_errors() {
        assert!(EnginePacket::parse("").is_err());
        assert!(EnginePacket::parse("9").is_err());
        assert!(EnginePacket::parse("0{not json").is_err());
    }

    #[test]
    fn test_parse_event_with_namespace_and_ack() {
        let packet = SocketPacket::parse(r#"2/alerts,17["alert",{"x":1}]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                name: "alert".into(),
                args: vec![serde_json::json!({"x": 1})]
            }
        );
    }

    #[test]
    fn test_parse_connect_variants() {
        assert_eq!(SocketPacket::parse("0").unwrap(), SocketPacket::Connect);
        assert_eq!(
            SocketPacket::parse(r#"0{"sid":"abc"}"#).unwrap(),
            SocketPacket::Connect
        );
        assert_eq!(SocketPacket::parse("1").unwrap(), SocketPacket::Disconnect);
        assert!(SocketPacket::parse("2[]").is_err());
        assert!(SocketPacket::parse("2[5]").is_err());
    }

    #[test]
    fn test_session_lifecycle() {
        let state = AppState::new();
        let mut session = Session::new(state.clone());

        let reply = session
            .handle_frame(r#"0{"sid":"s1","pingInterval":1000,"pingTimeout":500}"#)
            .unwrap();
        assert_eq!(reply, Reply::Send("40".into()));
        assert!(!state.snapshot().socket_connected);

        assert_eq!(session.handle_frame(r#"40{"sid":"x"}"#).unwrap(), Reply::Nothing);
        assert!(state.snapshot().socket_connected);

        assert_eq!(session.handle_frame("2").unwrap(), Reply::Send("3".into()));

        assert_eq!(session.handle_frame("41").unwrap(), Reply::Close);
        assert!(!state.snapshot().socket_connected);
    }

    #[test]
    fn test_alert_events_prepend() {
        let state = AppState::new();
        let mut session = Session::new(state.clone());

        session.handle_frame("40").unwrap();
        session.handle_frame(ALERT_FRAME).unwrap();
        session
            .handle_frame(r#"42["alert",{"_id":"b1","message":"Tremor","riskLevel":"Medium"}]"#)
            .unwrap();
        session.handle_frame(r#"42["chat","ignored"]"#).unwrap();

        let alerts = state.alerts();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].id, "b1");
        assert_eq!(alerts[1].risk_level, RiskLevel::High);
        assert_eq!(alerts[1].location_name(), "Wayanad");
    }

    #[test]
    fn test_malformed_alert_is_an_error() {
        let mut session = Session::new(AppState::new());
        assert!(session.handle_frame(r#"42["alert",{"message":"no id"}]"#).is_err());
        assert!(session.handle_frame(r#"42["alert"]"#).is_err());
    }

    #[test]
    fn test_backoff_schedule() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, [1, 2, 4, 8, 16, 30, 30]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
