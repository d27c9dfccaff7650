//! Blends the predicted local position toward the server's.

use crate::config::ReconciliationConfig;
use shared::{AuthoritativeSnapshot, Vector2};

#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    config: ReconciliationConfig,
}

impl ReconciliationEngine {
    pub fn new(config: ReconciliationConfig) -> Self {
        Self { config }
    }

    /// Correction factor for an error of `distance` world units.
    ///
    /// Errors past the impulse threshold are usually knockbacks the server
    /// applied; they get the smaller factor so the player drifts rather than
    /// snaps.
    pub fn alpha_for(&self, distance: f32) -> f32 {
        if distance > self.config.impulse_threshold {
            self.config.large_error_alpha
        } else {
            self.config.base_alpha
        }
    }

    /// No snapshot yet means nothing to correct against.
    pub fn reconcile(
        &self,
        predicted: Vector2,
        authoritative: Option<&AuthoritativeSnapshot>,
    ) -> Vector2 {
        let Some(snapshot) = authoritative else {
            return predicted;
        };
        let distance = predicted.distance(&snapshot.position);
        predicted.lerp(&snapshot.position, self.alpha_for(distance))
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new(ReconciliationConfig::default())
    }
}
