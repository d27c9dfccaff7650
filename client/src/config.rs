//! Tunables for every component, with defaults taken from `shared`.
//!
//! A config file is plain JSON; any field left out keeps its default, and the
//! command line overrides whatever the file says.

use crate::error::ConfigError;
use serde::Deserialize;
use shared::*;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub url: String,
    /// Artificial delay applied to inbound state updates.
    pub latency_ms: i64,
    /// Warn once when this many state updates are waiting in the latency buffer.
    pub latency_warn_depth: usize,
    pub display_name: Option<String>,
    pub connection: ConnectionConfig,
    pub input: InputConfig,
    pub prediction: PredictionConfig,
    pub reconciliation: ReconciliationConfig,
    pub interpolation: InterpolationConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws".to_string(),
            latency_ms: 0,
            latency_warn_depth: 512,
            display_name: None,
            connection: ConnectionConfig::default(),
            input: InputConfig::default(),
            prediction: PredictionConfig::default(),
            reconciliation: ReconciliationConfig::default(),
            interpolation: InterpolationConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.connection;
        if c.reconnect_growth < 1.0 {
            return Err(ConfigError::Invalid("reconnect_growth must be >= 1.0".into()));
        }
        if c.reconnect_base_ms > c.reconnect_cap_ms {
            return Err(ConfigError::Invalid(
                "reconnect_base_ms must not exceed reconnect_cap_ms".into(),
            ));
        }
        if c.heartbeat_interval_ms == 0 || c.heartbeat_interval_constrained_ms == 0 {
            return Err(ConfigError::Invalid("heartbeat intervals must be non-zero".into()));
        }
        if self.latency_ms < 0 {
            return Err(ConfigError::Invalid("latency_ms must not be negative".into()));
        }
        if !(0.0..=1.0).contains(&self.reconciliation.base_alpha)
            || !(0.0..=1.0).contains(&self.reconciliation.large_error_alpha)
        {
            return Err(ConfigError::Invalid("correction alphas must be within 0..=1".into()));
        }
        if self.interpolation.history_capacity < MIN_HISTORY_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "history_capacity must be at least {}",
                MIN_HISTORY_CAPACITY
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub connect_timeout_ms: u64,
    /// Added to the connect timeout once per failed attempt.
    pub connect_timeout_step_ms: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_growth: f64,
    pub reconnect_cap_ms: u64,
    pub max_attempts: u32,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_interval_constrained_ms: u64,
    /// Mobile or otherwise constrained host: heartbeat more often.
    pub constrained: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            connect_timeout_step_ms: CONNECT_TIMEOUT_STEP_MS,
            reconnect_base_ms: RECONNECT_BASE_MS,
            reconnect_growth: RECONNECT_GROWTH,
            reconnect_cap_ms: RECONNECT_CAP_MS,
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            heartbeat_interval_constrained_ms: HEARTBEAT_INTERVAL_CONSTRAINED_MS,
            constrained: false,
        }
    }
}

impl ConnectionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        if self.constrained {
            Duration::from_millis(self.heartbeat_interval_constrained_ms)
        } else {
            Duration::from_millis(self.heartbeat_interval_ms)
        }
    }

    pub fn connect_timeout(&self, attempt: u32) -> Duration {
        let step = self.connect_timeout_step_ms.saturating_mul(attempt as u64);
        Duration::from_millis(self.connect_timeout_ms.saturating_add(step))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub min_send_interval_ms: i64,
    pub resend_interval_ms: i64,
    pub aim_deadzone: f32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            min_send_interval_ms: MIN_SEND_INTERVAL_MS,
            resend_interval_ms: INPUT_RESEND_INTERVAL_MS,
            aim_deadzone: AIM_DEADZONE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub speed: f32,
    pub spawn_x: f32,
    pub spawn_y: f32,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            speed: PLAYER_SPEED,
            spawn_x: SPAWN_X,
            spawn_y: SPAWN_Y,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub impulse_threshold: f32,
    pub base_alpha: f32,
    pub large_error_alpha: f32,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            impulse_threshold: IMPULSE_THRESHOLD,
            base_alpha: BASE_CORRECTION_ALPHA,
            large_error_alpha: LARGE_ERROR_ALPHA,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    pub render_delay_ms: i64,
    pub history_capacity: usize,
    pub extrapolation_limit_ms: i64,
    /// Per-1/60 s blend factor for smoothed entities.
    pub smoothing_factor: f32,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            render_delay_ms: RENDER_DELAY_MS,
            history_capacity: HISTORY_CAPACITY,
            extrapolation_limit_ms: EXTRAPOLATION_LIMIT_MS,
            smoothing_factor: PROJECTILE_SMOOTHING,
        }
    }
}
