//! Client session: routes server messages and runs the per-tick pipeline.
//!
//! Each tick runs in a fixed order:
//!
//! 1. release state updates whose artificial latency has elapsed
//! 2. fold them into the local snapshot and the remote histories
//! 3. predict the local player from current input
//! 4. reconcile the prediction toward the latest local snapshot
//! 5. interpolate every remote entity
//! 6. send an input message if one is due

use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState};
use crate::error::{ConnectionError, SessionError};
use crate::input::{ControlState, InputSequencer};
use crate::interpolation::{InterpolationEngine, RenderedEntity};
use crate::latency::LatencyBuffer;
use crate::prediction::PredictionEngine;
use crate::reconciliation::ReconciliationEngine;
use crate::stats::NetworkStats;
use log::{debug, error, info, warn};
use shared::codec::{decode, ClientMessage, GameEvent, GameEventKind, InitMessage, ServerMessage, StateUpdate};
use shared::{AuthoritativeSnapshot, EntityId, EntityKey, EntityKind, Vector2, BALL_ID};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Things the host may want to react to, drained once per frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Assigned {
        id: EntityId,
        team: Option<String>,
        is_host: bool,
    },
    Game(GameEvent),
    ServerError(String),
    ConnectionOpened,
    ConnectionLost { retry_in: Option<Duration> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalPredictedState {
    pub position: Vector2,
    /// Highest input the server reported processing, if it reports one.
    pub last_acked_seq: Option<u32>,
    /// Sequence of the most recent input sent.
    pub pending_input_seq: Option<u32>,
    /// Whether the position has been taken from a server snapshot yet.
    pub seeded: bool,
}

impl LocalPredictedState {
    fn at(position: Vector2) -> Self {
        Self {
            position,
            last_acked_seq: None,
            pending_input_seq: None,
            seeded: false,
        }
    }
}

/// Per-tick output for the host.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderFrame {
    pub local: Vector2,
    pub remotes: Vec<RenderedEntity>,
}

pub struct Session {
    clock: Arc<dyn Clock>,
    connection: ConnectionManager,
    inbound: LatencyBuffer<StateUpdate>,
    sequencer: InputSequencer,
    prediction: PredictionEngine,
    reconciliation: ReconciliationEngine,
    interpolation: InterpolationEngine,

    local: LocalPredictedState,
    local_snapshot: Option<AuthoritativeSnapshot>,
    self_id: Option<EntityId>,

    stats: NetworkStats,
    events: Vec<SessionEvent>,
    fault: Option<SessionError>,
    opened_before: bool,
}

impl Session {
    pub fn new(config: ClientConfig, clock: Arc<dyn Clock>) -> Self {
        let connection =
            ConnectionManager::new(config.url.clone(), config.connection.clone(), Arc::clone(&clock));
        let prediction = PredictionEngine::new(config.prediction.clone());
        let spawn = prediction.spawn();

        Self {
            connection,
            inbound: LatencyBuffer::new(config.latency_ms, config.latency_warn_depth),
            sequencer: InputSequencer::new(config.input.clone())
                .with_display_name(config.display_name.clone()),
            prediction,
            reconciliation: ReconciliationEngine::new(config.reconciliation.clone()),
            interpolation: InterpolationEngine::new(config.interpolation.clone()),
            local: LocalPredictedState::at(spawn),
            local_snapshot: None,
            self_id: None,
            stats: NetworkStats::new(),
            events: Vec::new(),
            fault: None,
            opened_before: false,
            clock,
        }
    }

    /// Opens the connection.
    pub fn start(&mut self) -> Result<bool, ConnectionError> {
        self.connection.connect()
    }

    /// Waits for the next connection event. Cancel-safe, so it can sit in a
    /// `select!` beside the tick timer.
    pub async fn next_connection_event(&mut self) -> Option<ConnectionEvent> {
        self.connection.next_event().await
    }

    pub fn handle_connection_event(&mut self, event: ConnectionEvent) -> Result<(), SessionError> {
        self.check_fault()?;

        match event {
            ConnectionEvent::Opened => {
                if self.opened_before {
                    info!("Reconnected, dropping remote entity history");
                    self.interpolation.clear();
                    self.inbound.clear();
                    self.stats.record_reconnect();
                }
                self.opened_before = true;
                self.events.push(SessionEvent::ConnectionOpened);
            }
            ConnectionEvent::Frame(raw) => self.handle_frame(&raw)?,
            ConnectionEvent::Closed { retry_in, .. } | ConnectionEvent::TimedOut { retry_in } => {
                self.events.push(SessionEvent::ConnectionLost { retry_in });
            }
            ConnectionEvent::GaveUp { attempts } => {
                error!("Connection lost for good after {} attempts", attempts);
                let fault = SessionError::ConnectionLost { attempts };
                self.fault = Some(fault.clone());
                return Err(fault);
            }
        }
        Ok(())
    }

    /// Handles one raw inbound frame. Undecodable frames are logged and
    /// dropped; only an identity conflict is an error.
    pub fn handle_frame(&mut self, raw: &str) -> Result<(), SessionError> {
        self.check_fault()?;
        self.stats.record_frame();

        let message = match decode(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping undecodable frame: {}", e);
                self.stats.record_decode_failure();
                return Ok(());
            }
        };

        let now = self.clock.now_ms();
        match message {
            ServerMessage::KeepAlivePing => {
                self.connection.send(&ClientMessage::KeepAlivePong);
            }
            ServerMessage::KeepAlivePong => debug!("Keep-alive pong"),
            ServerMessage::Connected => debug!("Server acknowledged connection"),
            ServerMessage::Init(init) => self.handle_init(init)?,
            ServerMessage::Ping { timestamp } => {
                self.connection.send(&ClientMessage::PongEcho {
                    timestamp: timestamp.unwrap_or(now),
                });
            }
            ServerMessage::Pong { timestamp } => match timestamp {
                Some(sent_at) => {
                    if let Some(rtt) = self.stats.record_pong(sent_at, now) {
                        debug!("RTT {}ms", rtt);
                    }
                }
                None => debug!("Pong without timestamp"),
            },
            ServerMessage::Heartbeat => {
                self.connection.send_heartbeat();
            }
            ServerMessage::Error { message } => {
                warn!("Server error: {}", message);
                self.events.push(SessionEvent::ServerError(message));
            }
            ServerMessage::Event(event) => {
                if event.kind == GameEventKind::GameReset {
                    info!("Game reset, restarting input sequence");
                    self.sequencer.reset();
                }
                self.events.push(SessionEvent::Game(event));
            }
            ServerMessage::State(update) => self.inbound.push(update, now),
        }
        Ok(())
    }

    fn handle_init(&mut self, init: InitMessage) -> Result<(), SessionError> {
        match &self.self_id {
            None => {
                info!(
                    "Assigned id {} (team {:?}, host {})",
                    init.your_id, init.team, init.is_host
                );
                // State may have listed us before init arrived.
                self.interpolation
                    .remove(&EntityKey::player(init.your_id.clone()));
                self.self_id = Some(init.your_id.clone());
                self.events.push(SessionEvent::Assigned {
                    id: init.your_id,
                    team: init.team,
                    is_host: init.is_host,
                });
                Ok(())
            }
            Some(held) if *held == init.your_id => {
                debug!("Repeated init for id {}", held);
                Ok(())
            }
            Some(held) => {
                let fault = SessionError::IdentityConflict {
                    held: held.clone(),
                    assigned: init.your_id,
                };
                error!("{}", fault);
                self.invalidate();
                self.connection.shutdown();
                self.fault = Some(fault.clone());
                Err(fault)
            }
        }
    }

    /// Drops everything derived from the current identity.
    fn invalidate(&mut self) {
        self.interpolation.clear();
        self.inbound.clear();
        self.sequencer.reset();
        self.local = LocalPredictedState::at(self.prediction.spawn());
        self.local_snapshot = None;
        self.self_id = None;
    }

    /// Advances one simulation step of `dt` seconds.
    pub fn tick(&mut self, dt: f32, control: &ControlState) -> Result<RenderFrame, SessionError> {
        self.check_fault()?;
        let now = self.clock.now_ms();

        for update in self.inbound.pop_ready(now) {
            self.apply_update(update, now);
        }

        let predicted = self.prediction.step(self.local.position, &control.flags, dt);
        self.local.position = self
            .reconciliation
            .reconcile(predicted, self.local_snapshot.as_ref());

        let remotes = self.interpolation.render(now, dt);

        if self.connection.is_open() {
            if let Some(input) = self.sequencer.observe(control, now) {
                self.local.pending_input_seq = Some(input.seq);
                self.connection.send(&ClientMessage::Input(input));
            }
        }

        Ok(RenderFrame {
            local: self.local.position,
            remotes,
        })
    }

    fn apply_update(&mut self, update: StateUpdate, now: i64) {
        let timestamp = self.interpolation.timestamp_for(update.server_time(), now);

        if let Some(players) = update.players {
            let live: HashSet<EntityId> = players
                .keys()
                .filter(|id| self.self_id.as_ref() != Some(*id))
                .cloned()
                .collect();
            for (id, state) in players {
                let snapshot = state.to_snapshot(id.clone(), timestamp);
                if self.self_id.as_ref() == Some(&id) {
                    self.apply_local_snapshot(snapshot);
                } else {
                    self.interpolation.ingest(EntityKey::player(id), snapshot);
                }
            }
            self.interpolation.retain(EntityKind::Player, &live);
        }

        match update.ball {
            Some(ball) if ball.active => {
                let snapshot = ball.state.to_snapshot(EntityId::from(BALL_ID), timestamp);
                self.interpolation.ingest(EntityKey::ball(), snapshot);
            }
            _ => self.interpolation.remove(&EntityKey::ball()),
        }

        if let Some(projectiles) = update.projectiles {
            let live: HashSet<EntityId> = projectiles.iter().map(|p| p.id.clone()).collect();
            for projectile in projectiles {
                let snapshot = projectile.state.to_snapshot(projectile.id.clone(), timestamp);
                self.interpolation
                    .ingest(EntityKey::projectile(projectile.id), snapshot);
            }
            self.interpolation.retain(EntityKind::Projectile, &live);
        }
    }

    fn apply_local_snapshot(&mut self, snapshot: AuthoritativeSnapshot) {
        if !self.local.seeded {
            debug!("Local player seeded at {:?}", snapshot.position);
            self.local.position = snapshot.position;
            self.local.seeded = true;
        }
        if let Some(seq) = snapshot.aux_u32("seq") {
            self.local.last_acked_seq = Some(seq);
        }
        self.local_snapshot = Some(snapshot);
    }

    fn check_fault(&self) -> Result<(), SessionError> {
        match &self.fault {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn on_foreground(&mut self) {
        self.connection.set_foreground(true);
    }

    pub fn on_background(&mut self) {
        self.connection.set_foreground(false);
    }

    /// Changes the artificial inbound latency for updates received from now on.
    pub fn set_latency(&mut self, latency_ms: i64) {
        self.inbound.set_latency(latency_ms);
    }

    pub fn shutdown(&mut self) {
        self.connection.shutdown();
    }

    pub fn self_id(&self) -> Option<&EntityId> {
        self.self_id.as_ref()
    }

    pub fn local_state(&self) -> &LocalPredictedState {
        &self.local
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn interpolation(&self) -> &InterpolationEngine {
        &self.interpolation
    }

    pub fn fault(&self) -> Option<&SessionError> {
        self.fault.as_ref()
    }
}
