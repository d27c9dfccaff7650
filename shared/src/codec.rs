//! Text-frame wire codec.
//!
//! Every frame is either a bare control string (`ping`, `pong`, `connected`)
//! or a JSON object. Objects with a `type` discriminator are routed through a
//! dispatch table; objects without one are full state updates.

use crate::{AuthoritativeSnapshot, EntityId, InputMessage, Vector2};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("message type must be a string, got {0}")]
    BadDiscriminator(String),
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("state update carries no entity data")]
    EmptyState,
}

/// Assigns the local player's identity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InitMessage {
    pub your_id: EntityId,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub is_host: bool,
}

/// One entity as carried inside a state update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub vx: f32,
    #[serde(default)]
    pub vy: f32,
    #[serde(flatten)]
    pub aux: Map<String, Value>,
}

impl EntityState {
    pub fn position(&self) -> Vector2 {
        Vector2::new(self.x, self.y)
    }

    pub fn to_snapshot(&self, entity_id: EntityId, server_timestamp: i64) -> AuthoritativeSnapshot {
        AuthoritativeSnapshot {
            entity_id,
            position: self.position(),
            velocity: Vector2::new(self.vx, self.vy),
            server_timestamp,
            aux: self.aux.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallState {
    #[serde(default)]
    pub active: bool,
    #[serde(flatten)]
    pub state: EntityState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileState {
    pub id: EntityId,
    #[serde(flatten)]
    pub state: EntityState,
}

/// A full (untyped) state update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players: Option<BTreeMap<EntityId, EntityState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ball: Option<BallState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projectiles: Option<Vec<ProjectileState>>,
}

impl StateUpdate {
    /// Server timestamp in milliseconds, if the update carries one.
    pub fn server_time(&self) -> Option<i64> {
        self.time.filter(|t| t.is_finite()).map(|t| t as i64)
    }

    fn is_empty(&self) -> bool {
        self.time.is_none()
            && self.players.is_none()
            && self.ball.is_none()
            && self.projectiles.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEventKind {
    Goal,
    Countdown,
    GameReset,
    Shoot,
    AutoShoot,
    BallKnocked,
    ProjectileFired,
    Explosion,
}

/// Gameplay event routed to the host untouched (apart from `game_reset`,
/// which also resets input sequencing).
#[derive(Debug, Clone, PartialEq)]
pub struct GameEvent {
    pub kind: GameEventKind,
    pub body: Map<String, Value>,
}

impl GameEvent {
    pub fn count(&self) -> Option<i64> {
        self.body.get("count").and_then(Value::as_i64)
    }
}

/// Every message the server can send, after decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Bare `ping`; answered with a bare `pong`.
    KeepAlivePing,
    /// Bare `pong`.
    KeepAlivePong,
    /// Bare `connected`.
    Connected,
    Init(InitMessage),
    Ping { timestamp: Option<i64> },
    Pong { timestamp: Option<i64> },
    Heartbeat,
    Error { message: String },
    Event(GameEvent),
    State(StateUpdate),
}

/// Every message the client sends.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Liveness probe, `{type: ping, timestamp}`.
    Heartbeat { timestamp: i64 },
    /// Echo of a typed server ping.
    PongEcho { timestamp: i64 },
    /// Bare `pong` reply.
    KeepAlivePong,
    Input(InputMessage),
}

type Decoder = fn(Map<String, Value>) -> Result<ServerMessage, CodecError>;

const DISPATCH: &[(&str, Decoder)] = &[
    ("init", |body: Map<String, Value>| Ok(ServerMessage::Init(from_body(body)?))),
    ("ping", |body: Map<String, Value>| {
        Ok(ServerMessage::Ping {
            timestamp: timestamp_field(&body),
        })
    }),
    ("pong", |body: Map<String, Value>| {
        Ok(ServerMessage::Pong {
            timestamp: timestamp_field(&body),
        })
    }),
    ("heartbeat", |_: Map<String, Value>| Ok(ServerMessage::Heartbeat)),
    ("error", |body: Map<String, Value>| {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(ServerMessage::Error { message })
    }),
    ("goal", |body: Map<String, Value>| Ok(event(GameEventKind::Goal, body))),
    ("countdown", |body: Map<String, Value>| Ok(event(GameEventKind::Countdown, body))),
    ("game_reset", |body: Map<String, Value>| Ok(event(GameEventKind::GameReset, body))),
    ("shoot", |body: Map<String, Value>| Ok(event(GameEventKind::Shoot, body))),
    ("auto_shoot", |body: Map<String, Value>| Ok(event(GameEventKind::AutoShoot, body))),
    ("ball_knocked", |body: Map<String, Value>| Ok(event(GameEventKind::BallKnocked, body))),
    ("projectile_fired", |body: Map<String, Value>| {
        Ok(event(GameEventKind::ProjectileFired, body))
    }),
    ("explosion", |body: Map<String, Value>| Ok(event(GameEventKind::Explosion, body))),
];

fn event(kind: GameEventKind, body: Map<String, Value>) -> ServerMessage {
    ServerMessage::Event(GameEvent { kind, body })
}

fn from_body<T: for<'de> Deserialize<'de>>(body: Map<String, Value>) -> Result<T, CodecError> {
    Ok(serde_json::from_value(Value::Object(body))?)
}

fn timestamp_field(body: &Map<String, Value>) -> Option<i64> {
    let value = body.get("timestamp")?;
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|t| t.is_finite()).map(|t| t as i64))
}

/// Decodes one inbound text frame.
pub fn decode(frame: &str) -> Result<ServerMessage, CodecError> {
    match frame.trim() {
        "ping" => return Ok(ServerMessage::KeepAlivePing),
        "pong" => return Ok(ServerMessage::KeepAlivePong),
        "connected" => return Ok(ServerMessage::Connected),
        _ => {}
    }

    let Value::Object(mut body) = serde_json::from_str::<Value>(frame)? else {
        return Err(CodecError::NotAnObject);
    };

    let kind = match body.remove("type") {
        None => {
            let update: StateUpdate = from_body(body)?;
            if update.is_empty() {
                return Err(CodecError::EmptyState);
            }
            return Ok(ServerMessage::State(update));
        }
        Some(Value::String(kind)) => kind,
        Some(other) => return Err(CodecError::BadDiscriminator(other.to_string())),
    };

    let (_, decoder) = DISPATCH
        .iter()
        .find(|(name, _)| *name == kind)
        .ok_or(CodecError::UnknownType(kind.clone()))?;
    decoder(body)
}

#[derive(Serialize)]
struct TypedInput<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    input: &'a InputMessage,
}

/// Encodes one outbound message as a text frame.
pub fn encode(message: &ClientMessage) -> Result<String, CodecError> {
    let frame = match message {
        ClientMessage::Heartbeat { timestamp } => {
            json!({ "type": "ping", "timestamp": timestamp }).to_string()
        }
        ClientMessage::PongEcho { timestamp } => {
            json!({ "type": "pong", "timestamp": timestamp }).to_string()
        }
        ClientMessage::KeepAlivePong => "pong".to_string(),
        ClientMessage::Input(input) => serde_json::to_string(&TypedInput {
            kind: "input",
            input,
        })?,
    };
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ControlFlags;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_decode_bare_control_strings() {
        assert_eq!(decode("ping").unwrap(), ServerMessage::KeepAlivePing);
        assert_eq!(decode("pong").unwrap(), ServerMessage::KeepAlivePong);
        assert_eq!(decode("connected\n").unwrap(), ServerMessage::Connected);
    }

    #[test]
    fn test_decode_init_with_numeric_id() {
        let msg = decode(r#"{"type":"init","your_id":7,"team":"red","is_host":true}"#).unwrap();
        match msg {
            ServerMessage::Init(init) => {
                assert_eq!(init.your_id, EntityId::from(7));
                assert_eq!(init.team.as_deref(), Some("red"));
                assert!(init.is_host);
            }
            other => panic!("expected init, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_pong_timestamp() {
        let msg = decode(r#"{"type":"pong","timestamp":1700000000123}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Pong {
                timestamp: Some(1_700_000_000_123)
            }
        );

        let float_msg = decode(r#"{"type":"pong","timestamp":12.0}"#).unwrap();
        assert_eq!(float_msg, ServerMessage::Pong { timestamp: Some(12) });
    }

    #[test]
    fn test_decode_game_events() {
        let msg = decode(r#"{"type":"countdown","count":3}"#).unwrap();
        match msg {
            ServerMessage::Event(event) => {
                assert_eq!(event.kind, GameEventKind::Countdown);
                assert_eq!(event.count(), Some(3));
            }
            other => panic!("expected event, got {:?}", other),
        }

        let reset = decode(r#"{"type":"game_reset","team1_score":0}"#).unwrap();
        assert!(matches!(
            reset,
            ServerMessage::Event(GameEvent {
                kind: GameEventKind::GameReset,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_state_update() {
        let frame = r#"{
            "time": 5000,
            "players": {"1": {"x": 10, "y": 20.5, "vx": 1.5, "boost": 200, "seq": 4}},
            "ball": {"x": 1, "y": 2, "active": true, "grabbed": false},
            "projectiles": [{"id": 9, "x": 3, "y": 4, "vy": -2}]
        }"#;
        let ServerMessage::State(update) = decode(frame).unwrap() else {
            panic!("expected state update");
        };
        assert_eq!(update.server_time(), Some(5000));

        let players = update.players.as_ref().unwrap();
        let player = &players[&EntityId::from(1)];
        assert_approx_eq!(player.y, 20.5);
        assert_approx_eq!(player.vx, 1.5);
        assert_eq!(player.vy, 0.0);
        assert_eq!(player.aux.get("boost"), Some(&Value::from(200)));

        let ball = update.ball.as_ref().unwrap();
        assert!(ball.active);
        assert_eq!(ball.state.aux.get("grabbed"), Some(&Value::Bool(false)));
        assert!(!ball.state.aux.contains_key("active"));

        let projectiles = update.projectiles.as_ref().unwrap();
        assert_eq!(projectiles[0].id, EntityId::from(9));
        assert_approx_eq!(projectiles[0].state.vy, -2.0);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode("not json"), Err(CodecError::Json(_))));
        assert!(matches!(decode("[1,2]"), Err(CodecError::NotAnObject)));
        assert!(matches!(decode("{}"), Err(CodecError::EmptyState)));
        assert!(matches!(
            decode(r#"{"type":"teleport"}"#),
            Err(CodecError::UnknownType(kind)) if kind == "teleport"
        ));
        assert!(matches!(
            decode(r#"{"type":5}"#),
            Err(CodecError::BadDiscriminator(_))
        ));
        assert!(decode(r#"{"type":"init"}"#).is_err());
        assert!(decode(r#"{"players":{"1":{"x":"left"}}}"#).is_err());
    }

    #[test]
    fn test_encode_heartbeat_and_pong() {
        let heartbeat = encode(&ClientMessage::Heartbeat { timestamp: 42 }).unwrap();
        let value: Value = serde_json::from_str(&heartbeat).unwrap();
        assert_eq!(value["type"], "ping");
        assert_eq!(value["timestamp"], 42);

        assert_eq!(encode(&ClientMessage::KeepAlivePong).unwrap(), "pong");
    }

    #[test]
    fn test_encode_input_is_flat() {
        let input = InputMessage {
            seq: 12,
            flags: ControlFlags {
                left: true,
                boost: true,
                ..Default::default()
            },
            target_x: 640.0,
            target_y: 360.0,
            client_send_time: 99,
            display_name: None,
        };
        let frame = encode(&ClientMessage::Input(input)).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "input");
        assert_eq!(value["seq"], 12);
        assert_eq!(value["left"], true);
        assert_eq!(value["right"], false);
        assert_eq!(value["boost"], true);
        assert_eq!(value["target_x"], 640.0);
        assert_eq!(value["timestamp"], 99);
        assert!(value.get("display_name").is_none());
        assert!(!frame.contains('\n'));
    }
}
