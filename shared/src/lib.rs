use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub mod codec;

pub const PLAYER_SPEED: f32 = 100.0;
pub const SPAWN_X: f32 = 400.0;
pub const SPAWN_Y: f32 = 300.0;

pub const IMPULSE_THRESHOLD: f32 = 50.0;
pub const BASE_CORRECTION_ALPHA: f32 = 0.1;
pub const LARGE_ERROR_ALPHA: f32 = 0.02;

pub const RENDER_DELAY_MS: i64 = 100;
pub const HISTORY_CAPACITY: usize = 10;
pub const MIN_HISTORY_CAPACITY: usize = 2;
pub const EXTRAPOLATION_LIMIT_MS: i64 = 100;
pub const PROJECTILE_SMOOTHING: f32 = 0.1;

pub const MIN_SEND_INTERVAL_MS: i64 = 50;
pub const INPUT_RESEND_INTERVAL_MS: i64 = 100;
pub const AIM_DEADZONE: f32 = 4.0;
pub const INITIAL_INPUT_SEQUENCE: u32 = 1;

pub const HEARTBEAT_INTERVAL_MS: u64 = 15_000;
pub const HEARTBEAT_INTERVAL_CONSTRAINED_MS: u64 = 2_000;
pub const CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const CONNECT_TIMEOUT_STEP_MS: u64 = 1_000;
pub const RECONNECT_BASE_MS: u64 = 1_000;
pub const RECONNECT_GROWTH: f64 = 1.5;
pub const RECONNECT_CAP_MS: u64 = 10_000;
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Close codes that mean the peer went away on purpose (normal closure, going away).
pub const NORMAL_CLOSE_CODES: [u16; 2] = [1000, 1001];

pub const BALL_ID: &str = "ball";

/// A vector in 2D world space. Positive y points down, matching the server.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Returns the unit vector, or zero for a zero-length vector.
    pub fn normalize(&self) -> Vector2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vector2::ZERO
        } else {
            Vector2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    pub fn scale(&self, scalar: f32) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    pub fn add(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    pub fn sub(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    pub fn distance(&self, other: &Vector2) -> f32 {
        self.sub(other).magnitude()
    }

    /// Linear interpolation: `t = 0` gives `self`, `t = 1` gives `other`.
    pub fn lerp(&self, other: &Vector2, t: f32) -> Vector2 {
        Vector2 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Heading in radians, or `None` for a (near) zero vector.
    pub fn heading(&self) -> Option<f32> {
        if self.magnitude() < 1e-4 {
            None
        } else {
            Some(self.y.atan2(self.x))
        }
    }
}

/// Server-assigned identity. The wire carries either an integer or a string
/// token; both normalize to the same textual form, so `7` and `"7"` compare
/// equal (JSON object keys are always strings).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawEntityId", into = "String")]
pub struct EntityId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntityId {
    Int(i64),
    Text(String),
}

impl From<RawEntityId> for EntityId {
    fn from(raw: RawEntityId) -> Self {
        match raw {
            RawEntityId::Int(n) => EntityId(n.to_string()),
            RawEntityId::Text(s) => EntityId(s),
        }
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl From<u32> for EntityId {
    fn from(n: u32) -> Self {
        EntityId(n.to_string())
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Player,
    Ball,
    Projectile,
}

/// Histories are keyed by kind and id so a projectile never collides with a
/// player that happens to share its numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityKey {
    pub fn player(id: EntityId) -> Self {
        Self {
            kind: EntityKind::Player,
            id,
        }
    }

    pub fn ball() -> Self {
        Self {
            kind: EntityKind::Ball,
            id: EntityId::from(BALL_ID),
        }
    }

    pub fn projectile(id: EntityId) -> Self {
        Self {
            kind: EntityKind::Projectile,
            id,
        }
    }
}

/// One timestamped authoritative state for one entity. Only built by decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthoritativeSnapshot {
    pub entity_id: EntityId,
    pub position: Vector2,
    /// World units per second.
    pub velocity: Vector2,
    pub server_timestamp: i64,
    /// Gameplay extras (cooldowns, grabbed flag, owner, acked seq...).
    pub aux: Map<String, Value>,
}

impl AuthoritativeSnapshot {
    pub fn aux_u32(&self, key: &str) -> Option<u32> {
        self.aux
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }

    pub fn aux_bool(&self, key: &str) -> bool {
        self.aux.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlFlags {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub shoot: bool,
    pub boost: bool,
}

impl ControlFlags {
    /// Raw movement axes from the held direction keys, not normalized.
    pub fn direction(&self) -> Vector2 {
        let axis = |neg: bool, pos: bool| (pos as i8 - neg as i8) as f32;
        Vector2::new(axis(self.left, self.right), axis(self.up, self.down))
    }

    pub fn is_moving(&self) -> bool {
        self.direction() != Vector2::ZERO
    }
}

/// A sequenced input message as it goes on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    pub seq: u32,
    #[serde(flatten)]
    pub flags: ControlFlags,
    pub target_x: f32,
    pub target_y: f32,
    #[serde(rename = "timestamp")]
    pub client_send_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl InputMessage {
    pub fn aim_target(&self) -> Vector2 {
        Vector2::new(self.target_x, self.target_y)
    }
}
