//! Client input sequencing with change detection and rate limiting

use crate::config::InputConfig;
use shared::{ControlFlags, InputMessage, Vector2, INITIAL_INPUT_SEQUENCE};

/// What the host samples from its input devices each tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlState {
    pub flags: ControlFlags,
    /// Aim target in world coordinates.
    pub aim: Vector2,
}

/// Turns sampled control state into sequenced input messages
pub struct InputSequencer {
    next_sequence: u32,
    last_sent: Option<ControlState>,
    last_send_time: Option<i64>,
    display_name: Option<String>,
    config: InputConfig,
}

impl InputSequencer {
    pub fn new(config: InputConfig) -> Self {
        Self {
            next_sequence: INITIAL_INPUT_SEQUENCE,
            last_sent: None,
            last_send_time: None,
            display_name: None,
            config,
        }
    }

    pub fn with_display_name(mut self, name: Option<String>) -> Self {
        self.display_name = name;
        self
    }

    /// Returns a message when one is due.
    ///
    /// A message is due when a control flag changed, the aim moved past the
    /// deadzone, or the resend interval elapsed. Nothing goes out within the
    /// minimum send interval of the previous message; a change held back that
    /// way is still detected on the next call since `last_sent` is untouched.
    pub fn observe(&mut self, control: &ControlState, now: i64) -> Option<InputMessage> {
        if let Some(last_time) = self.last_send_time {
            if now - last_time < self.config.min_send_interval_ms {
                return None;
            }
        }

        let due = match (&self.last_sent, self.last_send_time) {
            (Some(last), Some(last_time)) => {
                last.flags != control.flags
                    || last.aim.distance(&control.aim) > self.config.aim_deadzone
                    || now - last_time >= self.config.resend_interval_ms
            }
            _ => true,
        };

        if !due {
            return None;
        }

        let message = InputMessage {
            seq: self.next_sequence,
            flags: control.flags,
            target_x: control.aim.x,
            target_y: control.aim.y,
            client_send_time: now,
            display_name: self.display_name.clone(),
        };

        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.last_sent = Some(*control);
        self.last_send_time = Some(now);
        Some(message)
    }

    /// Back to the baseline sequence; the next observation sends immediately.
    pub fn reset(&mut self) {
        self.next_sequence = INITIAL_INPUT_SEQUENCE;
        self.last_sent = None;
        self.last_send_time = None;
    }

    /// Sequence number the next message will carry.
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    pub fn last_sent(&self) -> Option<&ControlState> {
        self.last_sent.as_ref()
    }
}

impl Default for InputSequencer {
    fn default() -> Self {
        Self::new(InputConfig::default())
    }
}
