//! Remote entity interpolation.
//!
//! Snapshots arrive at the server's tick rate with jitter. Remote entities are
//! drawn a fixed delay in the past so there are usually two snapshots that
//! bracket the render time; positions are blended between them.

use crate::config::InterpolationConfig;
use log::debug;
use shared::{AuthoritativeSnapshot, EntityId, EntityKey, EntityKind, Vector2, MIN_HISTORY_CAPACITY};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMode {
    /// Blend between the two snapshots around the render time.
    Bracket,
    /// Chase the latest snapshot exponentially. Used for fast, short-lived
    /// entities where a render delay would be visible.
    Smoothed,
}

impl InterpolationMode {
    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Projectile => InterpolationMode::Smoothed,
            EntityKind::Player | EntityKind::Ball => InterpolationMode::Bracket,
        }
    }
}

/// One remote entity's render output for a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEntity {
    pub key: EntityKey,
    pub position: Vector2,
    /// Heading in radians. `None` when stationary; keep the previous rotation.
    pub rotation: Option<f32>,
}

/// Bounded, time-ordered snapshots for one entity.
#[derive(Debug, Clone)]
pub struct EntityHistory {
    snapshots: VecDeque<AuthoritativeSnapshot>,
    capacity: usize,
}

impl EntityHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_HISTORY_CAPACITY);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a snapshot, evicting the oldest on overflow. Returns `false`
    /// and keeps the history unchanged if the snapshot is older than the
    /// newest one held.
    pub fn push(&mut self, snapshot: AuthoritativeSnapshot) -> bool {
        if let Some(latest) = self.snapshots.back() {
            if snapshot.server_timestamp < latest.server_timestamp {
                return false;
            }
        }
        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
        }
        true
    }

    pub fn latest(&self) -> Option<&AuthoritativeSnapshot> {
        self.snapshots.back()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuthoritativeSnapshot> {
        self.snapshots.iter()
    }

    /// Position and heading at `render_time`.
    ///
    /// Outside the buffered range this falls back to the latest snapshot,
    /// pushed forward along its velocity for at most `extrapolation_limit_ms`.
    pub fn sample(&self, render_time: i64, extrapolation_limit_ms: i64) -> Option<(Vector2, Option<f32>)> {
        let latest = self.snapshots.back()?;

        for (older, newer) in self.snapshots.iter().zip(self.snapshots.iter().skip(1)) {
            if older.server_timestamp <= render_time && render_time <= newer.server_timestamp {
                let span = newer.server_timestamp - older.server_timestamp;
                let t = if span == 0 {
                    1.0
                } else {
                    (render_time - older.server_timestamp) as f32 / span as f32
                };
                let position = older.position.lerp(&newer.position, t);
                let rotation = newer
                    .position
                    .sub(&older.position)
                    .heading()
                    .or_else(|| newer.velocity.heading());
                return Some((position, rotation));
            }
        }

        let elapsed_ms = (render_time - latest.server_timestamp).clamp(0, extrapolation_limit_ms.max(0));
        let position = latest
            .position
            .add(&latest.velocity.scale(elapsed_ms as f32 / 1000.0));
        Some((position, latest.velocity.heading()))
    }
}

pub struct InterpolationEngine {
    histories: HashMap<EntityKey, EntityHistory>,
    smoothed: HashMap<EntityKey, Vector2>,
    server_time_offset: Option<i64>,
    config: InterpolationConfig,
}

impl InterpolationEngine {
    pub fn new(config: InterpolationConfig) -> Self {
        Self {
            histories: HashMap::new(),
            smoothed: HashMap::new(),
            server_time_offset: None,
            config,
        }
    }

    /// Timestamp to stamp an update's snapshots with.
    ///
    /// The first server timestamp seen fixes the offset between the local and
    /// server clocks. Updates without one are placed on the server timeline
    /// using that offset.
    pub fn timestamp_for(&mut self, server_time: Option<i64>, local_now: i64) -> i64 {
        match server_time {
            Some(server_time) => {
                if self.server_time_offset.is_none() {
                    let offset = local_now - server_time;
                    debug!("Server time offset fixed at {}ms", offset);
                    self.server_time_offset = Some(offset);
                }
                server_time
            }
            None => local_now - self.server_time_offset.unwrap_or(0),
        }
    }

    pub fn server_time_offset(&self) -> Option<i64> {
        self.server_time_offset
    }

    /// Server-timeline instant remote entities are drawn at.
    pub fn render_time(&self, local_now: i64) -> i64 {
        local_now - self.server_time_offset.unwrap_or(0) - self.config.render_delay_ms
    }

    pub fn ingest(&mut self, key: EntityKey, snapshot: AuthoritativeSnapshot) {
        let capacity = self.config.history_capacity;
        let history = self
            .histories
            .entry(key.clone())
            .or_insert_with(|| EntityHistory::new(capacity));

        let timestamp = snapshot.server_timestamp;
        if !history.push(snapshot) {
            debug!(
                "Rejected out-of-order snapshot for {:?} {} at {}",
                key.kind, key.id, timestamp
            );
        }
    }

    /// Drops every entity of `kind` whose id is not in `live`.
    pub fn retain(&mut self, kind: EntityKind, live: &HashSet<EntityId>) {
        let keep = |key: &EntityKey| key.kind != kind || live.contains(&key.id);
        self.histories.retain(|key, _| keep(key));
        self.smoothed.retain(|key, _| keep(key));
    }

    pub fn remove(&mut self, key: &EntityKey) {
        self.histories.remove(key);
        self.smoothed.remove(key);
    }

    /// Forgets all entities and the clock offset.
    pub fn clear(&mut self) {
        self.histories.clear();
        self.smoothed.clear();
        self.server_time_offset = None;
    }

    pub fn history(&self, key: &EntityKey) -> Option<&EntityHistory> {
        self.histories.get(key)
    }

    pub fn tracked(&self) -> usize {
        self.histories.len()
    }

    /// Bracket-mode sample for one entity at an explicit render time.
    pub fn sample_at(&self, key: &EntityKey, render_time: i64) -> Option<Vector2> {
        self.histories
            .get(key)?
            .sample(render_time, self.config.extrapolation_limit_ms)
            .map(|(position, _)| position)
    }

    /// Render positions for every tracked entity, ordered by key.
    pub fn render(&mut self, local_now: i64, dt: f32) -> Vec<RenderedEntity> {
        let render_time = self.render_time(local_now);
        let blend = smoothing_blend(self.config.smoothing_factor, dt);
        let mut rendered = Vec::with_capacity(self.histories.len());

        for (key, history) in &self.histories {
            let Some(latest) = history.latest() else {
                continue;
            };

            let entity = match InterpolationMode::for_kind(key.kind) {
                InterpolationMode::Bracket => {
                    let Some((position, rotation)) =
                        history.sample(render_time, self.config.extrapolation_limit_ms)
                    else {
                        continue;
                    };
                    RenderedEntity {
                        key: key.clone(),
                        position,
                        rotation,
                    }
                }
                InterpolationMode::Smoothed => {
                    let position = match self.smoothed.get(key) {
                        Some(current) => current.lerp(&latest.position, blend),
                        None => latest.position,
                    };
                    self.smoothed.insert(key.clone(), position);
                    RenderedEntity {
                        key: key.clone(),
                        position,
                        rotation: latest.velocity.heading(),
                    }
                }
            };
            rendered.push(entity);
        }

        rendered.sort_by(|a, b| a.key.cmp(&b.key));
        rendered
    }
}

impl Default for InterpolationEngine {
    fn default() -> Self {
        Self::new(InterpolationConfig::default())
    }
}

/// Converts a per-1/60 s factor into one for a step of `dt` seconds.
fn smoothing_blend(factor: f32, dt: f32) -> f32 {
    if dt <= 0.0 || !dt.is_finite() {
        return 0.0;
    }
    let factor = factor.clamp(0.0, 1.0);
    1.0 - (1.0 - factor).powf(dt * 60.0)
}
