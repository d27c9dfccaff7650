//! Local player prediction.

use crate::config::PredictionConfig;
use shared::{ControlFlags, Vector2};

/// Advances the local player from input alone, ahead of the server.
#[derive(Debug, Clone)]
pub struct PredictionEngine {
    config: PredictionConfig,
}

impl PredictionEngine {
    pub fn new(config: PredictionConfig) -> Self {
        Self { config }
    }

    /// `position + unit(direction) * speed * dt`. Diagonals are normalized so
    /// they are no faster than straight movement.
    pub fn step(&self, position: Vector2, flags: &ControlFlags, dt: f32) -> Vector2 {
        if dt <= 0.0 || !dt.is_finite() {
            return position;
        }
        let velocity = flags.direction().normalize().scale(self.config.speed);
        position.add(&velocity.scale(dt))
    }

    pub fn spawn(&self) -> Vector2 {
        Vector2::new(self.config.spawn_x, self.config.spawn_y)
    }
}

impl Default for PredictionEngine {
    fn default() -> Self {
        Self::new(PredictionConfig::default())
    }
}
