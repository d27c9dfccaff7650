//! Headless host that drives a [`Session`] from a fixed-rate tick loop.
//!
//! Nothing is drawn; positions are logged instead. Input comes from an idle
//! controller or, with `bot` enabled, a random walker that changes direction
//! every so often.

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::SessionError;
use crate::input::ControlState;
use crate::session::{RenderFrame, Session, SessionEvent};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{ControlFlags, Vector2};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub tick_rate: u32,
    pub bot: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            bot: false,
        }
    }
}

/// Random input source for soak testing against a live server.
pub struct BotInput {
    rng: StdRng,
    current: ControlState,
    ticks_left: u32,
}

impl BotInput {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            current: ControlState::default(),
            ticks_left: 0,
        }
    }

    pub fn next(&mut self, position: Vector2) -> ControlState {
        if self.ticks_left == 0 {
            self.ticks_left = self.rng.gen_range(15..90);
            self.current.flags = ControlFlags {
                left: self.rng.gen_bool(0.3),
                right: self.rng.gen_bool(0.3),
                up: self.rng.gen_bool(0.3),
                down: self.rng.gen_bool(0.3),
                shoot: self.rng.gen_bool(0.1),
                boost: self.rng.gen_bool(0.05),
            };
            let aim_offset = Vector2::new(self.rng.gen_range(-200.0..200.0), self.rng.gen_range(-200.0..200.0));
            self.current.aim = position.add(&aim_offset);
        }
        self.ticks_left -= 1;
        self.current
    }
}

impl Default for BotInput {
    fn default() -> Self {
        Self::new()
    }
}

pub struct HeadlessClient {
    config: ClientConfig,
    options: RunnerOptions,
    clock: Arc<dyn Clock>,
    session: Session,
    bot: Option<BotInput>,
    local_position: Vector2,
    ticks: u64,
}

impl HeadlessClient {
    pub fn new(config: ClientConfig, options: RunnerOptions) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let session = Session::new(config.clone(), Arc::clone(&clock));
        let bot = options.bot.then(BotInput::new);
        Self {
            local_position: Vector2::new(config.prediction.spawn_x, config.prediction.spawn_y),
            config,
            options,
            clock,
            session,
            bot,
            ticks: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs until Ctrl-C or until the connection is given up on.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.session.start()?;

        let tick_rate = self.options.tick_rate.max(1);
        let mut tick_interval = interval(Duration::from_secs_f64(1.0 / tick_rate as f64));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                event = self.session.next_connection_event() => {
                    let Some(event) = event else {
                        break;
                    };
                    if let Err(e) = self.session.handle_connection_event(event) {
                        self.recover(e)?;
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    let control = self.sample_control();
                    match self.session.tick(dt, &control) {
                        Ok(frame) => self.report(&frame),
                        Err(e) => self.recover(e)?,
                    }
                    self.log_events();
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down...");
                    self.session.shutdown();
                    break;
                },
            }
        }

        Ok(())
    }

    /// Identity conflicts restart the session; losing the connection for
    /// good ends the run.
    fn recover(&mut self, error: SessionError) -> Result<(), SessionError> {
        match error {
            SessionError::IdentityConflict { .. } => {
                warn!("{}; starting a fresh session", error);
                self.session.shutdown();
                self.session = Session::new(self.config.clone(), Arc::clone(&self.clock));
                self.local_position = Vector2::new(self.config.prediction.spawn_x, self.config.prediction.spawn_y);
                if let Err(e) = self.session.start() {
                    warn!("Failed to start fresh session: {}", e);
                }
                Ok(())
            }
            SessionError::ConnectionLost { .. } => Err(error),
        }
    }

    fn sample_control(&mut self) -> ControlState {
        match &mut self.bot {
            Some(bot) => bot.next(self.local_position),
            None => ControlState {
                flags: ControlFlags::default(),
                aim: self.local_position,
            },
        }
    }

    fn report(&mut self, frame: &RenderFrame) {
        self.local_position = frame.local;
        self.ticks += 1;

        for remote in &frame.remotes {
            debug!(
                "{:?} {} at ({:.1}, {:.1})",
                remote.key.kind, remote.key.id, remote.position.x, remote.position.y
            );
        }

        if self.ticks % self.options.tick_rate.max(1) as u64 == 0 {
            let stats = self.session.stats();
            info!(
                "Local ({:.1}, {:.1}), {} remote entities, RTT {} ms (jitter {} ms), state {:?}",
                frame.local.x,
                frame.local.y,
                frame.remotes.len(),
                stats.average_rtt().map_or("-".to_string(), |r| format!("{:.0}", r)),
                stats.jitter().map_or("-".to_string(), |j| format!("{:.0}", j)),
                self.session.connection_state()
            );
        }
    }

    fn log_events(&mut self) {
        for event in self.session.drain_events() {
            match event {
                SessionEvent::Assigned { id, team, is_host } => {
                    info!("Playing as {} (team {:?}, host {})", id, team, is_host)
                }
                SessionEvent::Game(event) => info!("Game event {:?}: {:?}", event.kind, event.body),
                SessionEvent::ServerError(message) => warn!("Server reported: {}", message),
                SessionEvent::ConnectionOpened => info!("Connection open"),
                SessionEvent::ConnectionLost { retry_in } => match retry_in {
                    Some(delay) => warn!("Connection lost, retrying in {:?}", delay),
                    None => warn!("Connection closed"),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bot_holds_input_then_changes() {
        let mut bot = BotInput::with_rng(StdRng::seed_from_u64(7));
        let first = bot.next(Vector2::ZERO);
        let held = bot.ticks_left;
        for _ in 0..held {
            assert_eq!(bot.next(Vector2::ZERO), first);
        }
        assert_eq!(bot.ticks_left, 0);
    }

    #[test]
    fn test_bot_aim_near_player() {
        let mut bot = BotInput::with_rng(StdRng::seed_from_u64(1));
        let position = Vector2::new(400.0, 300.0);
        let control = bot.next(position);
        assert!(control.aim.distance(&position) <= 200.0 * std::f32::consts::SQRT_2);
    }

    #[tokio::test]
    async fn test_identity_conflict_restarts_session() {
        let config = ClientConfig {
            url: "ws://127.0.0.1:9/ws".to_string(),
            ..Default::default()
        };
        let mut client = HeadlessClient::new(config, RunnerOptions::default());
        let conflict = SessionError::IdentityConflict {
            held: shared::EntityId::from(7),
            assigned: shared::EntityId::from(9),
        };
        assert!(client.recover(conflict).is_ok());
        assert!(client.session().fault().is_none());

        let lost = SessionError::ConnectionLost { attempts: 5 };
        assert!(client.recover(lost).is_err());
        client.session.shutdown();
    }
}
