//! WebSocket connection lifecycle.
//!
//! The socket itself lives in a spawned task that forwards frames over a
//! channel. Everything else (state, timers, backoff) is owned by
//! [`ConnectionManager`] and only changes while the owner is polling
//! [`ConnectionManager::next_event`] or calling its methods, so there is no
//! shared mutable state between tasks.

use crate::clock::Clock;
use crate::config::ConnectionConfig;
use crate::error::ConnectionError;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use shared::codec::{encode, ClientMessage};
use shared::NORMAL_CLOSE_CODES;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// What the owner of a [`ConnectionManager`] gets to see.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Opened,
    Frame(String),
    /// `retry_in` is set when a reconnect has been scheduled.
    Closed {
        code: Option<u16>,
        retry_in: Option<Duration>,
    },
    TimedOut { retry_in: Option<Duration> },
    /// Reconnecting stopped; `reset_attempts` then `connect` to try again.
    GaveUp { attempts: u32 },
}

/// Exponential reconnect delays: `min(base * growth^attempt, cap)`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    growth: f64,
    cap_ms: u64,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            base_ms: config.reconnect_base_ms,
            growth: config.reconnect_growth,
            cap_ms: config.reconnect_cap_ms,
            max_attempts: config.max_attempts,
            attempt: 0,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_ms as f64 * self.growth.powi(attempt as i32);
        Duration::from_millis(delay.min(self.cap_ms as f64) as u64)
    }

    /// Delay before the next attempt, or `None` once the attempts are spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let delay = self.delay_for(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close,
}

/// Messages from spawned tasks, tagged with the socket generation they
/// belong to.
#[derive(Debug)]
enum Internal {
    Opened { generation: u64 },
    Frame { generation: u64, text: String },
    Closed { generation: u64, code: Option<u16> },
    ConnectTimeout { generation: u64 },
    ReconnectDue { generation: u64 },
}

#[derive(Default)]
struct Timers {
    connect_timeout: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

fn cancel(timer: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = timer.take() {
        handle.abort();
    }
}

pub struct ConnectionManager {
    url: String,
    config: ConnectionConfig,
    clock: Arc<dyn Clock>,

    state: ConnectionState,
    backoff: Backoff,
    generation: u64,

    // Owned so a second socket can never be opened while one is live.
    active_connections: u32,
    slot_held: bool,

    outbound: Option<UnboundedSender<Outbound>>,
    socket_task: Option<JoinHandle<()>>,
    internal_tx: UnboundedSender<Internal>,
    internal_rx: UnboundedReceiver<Internal>,
    timers: Timers,
    pending: VecDeque<ConnectionEvent>,

    foreground: bool,
    pending_reconnect: bool,
    closed_locally: bool,
    gave_up: bool,
    shut_down: bool,
}

impl ConnectionManager {
    pub fn new(url: impl Into<String>, config: ConnectionConfig, clock: Arc<dyn Clock>) -> Self {
        let (internal_tx, internal_rx) = unbounded_channel();
        Self {
            url: url.into(),
            backoff: Backoff::new(&config),
            config,
            clock,
            state: ConnectionState::Disconnected,
            generation: 0,
            active_connections: 0,
            slot_held: false,
            outbound: None,
            socket_task: None,
            internal_tx,
            internal_rx,
            timers: Timers::default(),
            pending: VecDeque::new(),
            foreground: true,
            pending_reconnect: false,
            closed_locally: false,
            gave_up: false,
            shut_down: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn active_connections(&self) -> u32 {
        self.active_connections
    }

    /// Consecutive failed attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.backoff.attempt()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Starts a connection attempt. Returns `Ok(false)` when a socket is
    /// already connecting or open.
    pub fn connect(&mut self) -> Result<bool, ConnectionError> {
        if self.shut_down {
            return Err(ConnectionError::ShutDown);
        }
        if self.gave_up {
            return Err(ConnectionError::AttemptsExhausted {
                attempts: self.backoff.attempt(),
            });
        }
        if self.state != ConnectionState::Disconnected || self.slot_held {
            debug!("Connect ignored, connection already {:?}", self.state);
            return Ok(false);
        }

        cancel(&mut self.timers.reconnect);
        self.pending_reconnect = false;
        self.closed_locally = false;

        self.generation += 1;
        self.slot_held = true;
        self.active_connections += 1;
        self.state = ConnectionState::Connecting;

        let generation = self.generation;
        let (outbound_tx, outbound_rx) = unbounded_channel();
        self.outbound = Some(outbound_tx);

        info!(
            "Connecting to {} (attempt {}, generation {})",
            self.url,
            self.backoff.attempt() + 1,
            generation
        );
        self.socket_task = Some(tokio::spawn(run_socket(
            self.url.clone(),
            generation,
            self.internal_tx.clone(),
            outbound_rx,
        )));

        let timeout = self.config.connect_timeout(self.backoff.attempt());
        let tx = self.internal_tx.clone();
        self.timers.connect_timeout = Some(tokio::spawn(async move {
            sleep(timeout).await;
            let _ = tx.send(Internal::ConnectTimeout { generation });
        }));

        Ok(true)
    }

    /// Fire-and-forget. Returns `false` if the message was dropped because
    /// the socket is not open.
    pub fn send(&mut self, message: &ClientMessage) -> bool {
        if self.state != ConnectionState::Open {
            debug!("Dropping outbound message while {:?}", self.state);
            return false;
        }
        let frame = match encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode outbound message: {}", e);
                return false;
            }
        };
        match &self.outbound {
            Some(tx) => tx.send(Outbound::Text(frame)).is_ok(),
            None => false,
        }
    }

    pub fn send_heartbeat(&mut self) -> bool {
        let timestamp = self.clock.now_ms();
        self.send(&ClientMessage::Heartbeat { timestamp })
    }

    /// Closes the socket without scheduling a reconnect.
    pub fn close(&mut self) {
        cancel(&mut self.timers.reconnect);
        cancel(&mut self.timers.heartbeat);
        self.pending_reconnect = false;
        self.closed_locally = true;

        match self.state {
            ConnectionState::Open => {
                info!("Closing connection");
                self.state = ConnectionState::Closing;
                if let Some(tx) = &self.outbound {
                    let _ = tx.send(Outbound::Close);
                }
            }
            ConnectionState::Connecting => {
                info!("Abandoning connection attempt");
                self.teardown_socket();
                self.state = ConnectionState::Disconnected;
                self.pending.push_back(ConnectionEvent::Closed {
                    code: None,
                    retry_in: None,
                });
            }
            ConnectionState::Closing | ConnectionState::Disconnected => {}
        }
    }

    /// Tears everything down for good. Further `connect` calls fail.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        info!("Shutting down connection manager");
        self.shut_down = true;
        self.closed_locally = true;
        self.pending_reconnect = false;
        cancel(&mut self.timers.connect_timeout);
        cancel(&mut self.timers.heartbeat);
        cancel(&mut self.timers.reconnect);

        if let Some(tx) = self.outbound.take() {
            let _ = tx.send(Outbound::Close);
        }
        // An open socket gets to flush its close frame; anything else is cut.
        if self.state != ConnectionState::Open {
            if let Some(task) = self.socket_task.take() {
                task.abort();
            }
        }
        self.generation += 1;
        self.release_slot();
        self.state = ConnectionState::Disconnected;
    }

    /// Background hosts defer reconnects; coming back to the foreground
    /// reconnects or probes the open socket.
    pub fn set_foreground(&mut self, foreground: bool) {
        self.foreground = foreground;
        if !foreground || self.shut_down {
            return;
        }

        if self.pending_reconnect {
            self.pending_reconnect = false;
            info!("Running reconnect deferred while in background");
            self.try_connect();
            return;
        }

        match self.state {
            ConnectionState::Open => {
                self.send_heartbeat();
            }
            ConnectionState::Disconnected if !self.closed_locally && !self.gave_up => {
                // Skips the rest of any armed backoff.
                cancel(&mut self.timers.reconnect);
                self.try_connect();
            }
            _ => {}
        }
    }

    /// Clears the failure count so `connect` works again after `GaveUp`.
    pub fn reset_attempts(&mut self) {
        self.backoff.reset();
        self.gave_up = false;
    }

    /// Waits for the next event. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let internal = self.internal_rx.recv().await?;
            self.process(internal);
        }
    }

    /// Non-blocking variant of [`next_event`](Self::next_event).
    pub fn try_next_event(&mut self) -> Option<ConnectionEvent> {
        while self.pending.is_empty() {
            match self.internal_rx.try_recv() {
                Ok(internal) => self.process(internal),
                Err(_) => break,
            }
        }
        self.pending.pop_front()
    }

    fn process(&mut self, internal: Internal) {
        match internal {
            Internal::Opened { generation } => {
                if generation != self.generation || self.state != ConnectionState::Connecting {
                    debug!("Ignoring open from stale socket {}", generation);
                    return;
                }
                cancel(&mut self.timers.connect_timeout);
                self.state = ConnectionState::Open;
                self.backoff.reset();
                self.start_heartbeat();
                info!("Connected to {}", self.url);
                self.pending.push_back(ConnectionEvent::Opened);
            }

            Internal::Frame { generation, text } => {
                if generation != self.generation {
                    debug!("Ignoring frame from stale socket {}", generation);
                    return;
                }
                self.pending.push_back(ConnectionEvent::Frame(text));
            }

            Internal::Closed { generation, code } => {
                if generation != self.generation {
                    debug!("Ignoring close from stale socket {}", generation);
                    return;
                }
                if self.state == ConnectionState::Disconnected {
                    return;
                }
                let local = self.closed_locally || self.state == ConnectionState::Closing;
                self.teardown_socket();
                self.state = ConnectionState::Disconnected;

                let clean = code.map_or(false, |c| NORMAL_CLOSE_CODES.contains(&c));
                if local || clean || self.shut_down {
                    info!("Connection closed (code {:?})", code);
                    self.pending.push_back(ConnectionEvent::Closed {
                        code,
                        retry_in: None,
                    });
                    return;
                }

                warn!("Connection lost (code {:?})", code);
                let retry_in = self.schedule_reconnect();
                self.pending
                    .push_back(ConnectionEvent::Closed { code, retry_in });
                self.push_gave_up_if_exhausted();
            }

            Internal::ConnectTimeout { generation } => {
                if generation != self.generation || self.state != ConnectionState::Connecting {
                    return;
                }
                warn!(
                    "Connection attempt timed out after {:?}",
                    self.config.connect_timeout(self.backoff.attempt())
                );
                self.teardown_socket();
                // Late events from the abandoned socket must not count.
                self.generation += 1;
                self.state = ConnectionState::Disconnected;

                let retry_in = self.schedule_reconnect();
                self.pending.push_back(ConnectionEvent::TimedOut { retry_in });
                self.push_gave_up_if_exhausted();
            }

            Internal::ReconnectDue { generation } => {
                cancel(&mut self.timers.reconnect);
                if generation != self.generation || self.shut_down {
                    return;
                }
                if !self.foreground {
                    debug!("Reconnect due while in background, deferring");
                    self.pending_reconnect = true;
                    return;
                }
                self.try_connect();
            }
        }
    }

    fn try_connect(&mut self) {
        if let Err(e) = self.connect() {
            warn!("Reconnect failed: {}", e);
        }
    }

    fn schedule_reconnect(&mut self) -> Option<Duration> {
        let Some(delay) = self.backoff.next_delay() else {
            self.gave_up = true;
            return None;
        };
        info!(
            "Reconnecting in {:?} (attempt {}/{})",
            delay,
            self.backoff.attempt(),
            self.config.max_attempts
        );

        let generation = self.generation;
        let tx = self.internal_tx.clone();
        cancel(&mut self.timers.reconnect);
        self.timers.reconnect = Some(tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(Internal::ReconnectDue { generation });
        }));
        Some(delay)
    }

    fn push_gave_up_if_exhausted(&mut self) {
        if self.gave_up {
            let attempts = self.backoff.attempt();
            warn!("Giving up after {} reconnect attempts", attempts);
            self.pending.push_back(ConnectionEvent::GaveUp { attempts });
        }
    }

    fn start_heartbeat(&mut self) {
        let Some(tx) = self.outbound.clone() else {
            return;
        };
        // `interval` panics on a zero period.
        let period = self
            .config
            .heartbeat_interval()
            .max(Duration::from_millis(1));
        let clock = Arc::clone(&self.clock);

        cancel(&mut self.timers.heartbeat);
        self.timers.heartbeat = Some(tokio::spawn(async move {
            // First tick completes immediately.
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                let heartbeat = ClientMessage::Heartbeat {
                    timestamp: clock.now_ms(),
                };
                let Ok(frame) = encode(&heartbeat) else {
                    continue;
                };
                if tx.send(Outbound::Text(frame)).is_err() {
                    break;
                }
            }
        }));
    }

    fn teardown_socket(&mut self) {
        cancel(&mut self.timers.connect_timeout);
        cancel(&mut self.timers.heartbeat);
        self.outbound = None;
        if let Some(task) = self.socket_task.take() {
            task.abort();
        }
        self.release_slot();
    }

    fn release_slot(&mut self) {
        if self.slot_held {
            self.slot_held = false;
            self.active_connections = self.active_connections.saturating_sub(1);
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(task) = self.socket_task.take() {
            task.abort();
        }
    }
}

async fn run_socket(
    url: String,
    generation: u64,
    events: UnboundedSender<Internal>,
    mut outbound: UnboundedReceiver<Outbound>,
) {
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            warn!("Failed to connect to {}: {}", url, e);
            let _ = events.send(Internal::Closed {
                generation,
                code: None,
            });
            return;
        }
    };
    let _ = events.send(Internal::Opened { generation });

    let (mut write, mut read) = ws_stream.split();
    let code = loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(Internal::Frame { generation, text: text.to_string() });
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => {
                        let _ = events.send(Internal::Frame { generation, text });
                    }
                    Err(_) => debug!("Dropping non-UTF-8 binary frame ({} bytes)", data.len()),
                },
                Some(Ok(Message::Close(frame))) => break frame.map(|f| u16::from(f.code)),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    break None;
                }
                None => break None,
            },

            outgoing = outbound.recv() => match outgoing {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(Message::text(text)).await {
                        warn!("Failed to send frame: {}", e);
                        break None;
                    }
                }
                Some(Outbound::Close) | None => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client closing".into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    break Some(u16::from(CloseCode::Normal));
                }
            },
        }
    };

    let _ = events.send(Internal::Closed { generation, code });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use tokio_test::{assert_err, assert_ok};

    const MAX_ATTEMPTS: u32 = shared::MAX_RECONNECT_ATTEMPTS;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(
            "ws://127.0.0.1:9/ws",
            ConnectionConfig::default(),
            Arc::new(ManualClock::new(0)),
        )
    }

    // Puts the manager in the state a successful open leaves it in, without
    // resetting the backoff.
    fn force_open(manager: &mut ConnectionManager) -> u64 {
        manager.generation += 1;
        manager.slot_held = true;
        manager.active_connections += 1;
        manager.state = ConnectionState::Open;
        manager.closed_locally = false;
        manager.generation
    }

    fn drain(manager: &mut ConnectionManager) -> Vec<ConnectionEvent> {
        manager.pending.drain(..).collect()
    }

    #[test]
    fn test_backoff_sequence() {
        let mut backoff = Backoff::new(&ConnectionConfig::default());
        let delays: Vec<u64> = std::iter::from_fn(|| backoff.next_delay())
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1_000, 1_500, 2_250, 3_375, 5_062]);
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = ConnectionConfig {
            max_attempts: 10,
            ..Default::default()
        };
        let backoff = Backoff::new(&config);
        assert_eq!(backoff.delay_for(5), Duration::from_millis(7_593));
        assert_eq!(backoff.delay_for(6), Duration::from_millis(10_000));
        assert_eq!(backoff.delay_for(9), Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_nth_abnormal_close_delay() {
        let mut manager = manager();
        let backoff = Backoff::new(&ConnectionConfig::default());

        for n in 1..=3u32 {
            let generation = force_open(&mut manager);
            manager.process(Internal::Closed {
                generation,
                code: Some(1006),
            });
            assert_eq!(
                drain(&mut manager),
                vec![ConnectionEvent::Closed {
                    code: Some(1006),
                    retry_in: Some(backoff.delay_for(n - 1)),
                }]
            );
            assert!(manager.timers.reconnect.is_some());
            assert_eq!(manager.state(), ConnectionState::Disconnected);
            assert_eq!(manager.active_connections(), 0);
        }
    }

    #[tokio::test]
    async fn test_clean_close_schedules_nothing() {
        for code in NORMAL_CLOSE_CODES {
            let mut manager = manager();
            let generation = force_open(&mut manager);
            manager.process(Internal::Closed {
                generation,
                code: Some(code),
            });
            assert_eq!(
                drain(&mut manager),
                vec![ConnectionEvent::Closed {
                    code: Some(code),
                    retry_in: None,
                }]
            );
            assert!(manager.timers.reconnect.is_none());
            assert_eq!(manager.attempts(), 0);
        }
    }

    #[tokio::test]
    async fn test_local_close_does_not_reconnect() {
        let mut manager = manager();
        let generation = force_open(&mut manager);
        manager.close();
        assert_eq!(manager.state(), ConnectionState::Closing);

        // The server dropping us mid-close still counts as our close.
        manager.process(Internal::Closed {
            generation,
            code: Some(1006),
        });
        assert_eq!(
            drain(&mut manager),
            vec![ConnectionEvent::Closed {
                code: Some(1006),
                retry_in: None,
            }]
        );
        assert!(manager.timers.reconnect.is_none());
    }

    #[tokio::test]
    async fn test_stale_generation_ignored() {
        let mut manager = manager();
        let old = force_open(&mut manager);
        let _current = force_open(&mut manager);

        manager.process(Internal::Frame {
            generation: old,
            text: "ping".into(),
        });
        manager.process(Internal::Closed {
            generation: old,
            code: Some(1006),
        });
        assert!(drain(&mut manager).is_empty());
        assert_eq!(manager.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mut manager = manager();
        for _ in 0..MAX_ATTEMPTS {
            let generation = force_open(&mut manager);
            manager.process(Internal::Closed {
                generation,
                code: None,
            });
        }
        drain(&mut manager);

        let generation = force_open(&mut manager);
        manager.process(Internal::Closed {
            generation,
            code: None,
        });
        assert_eq!(
            drain(&mut manager),
            vec![
                ConnectionEvent::Closed {
                    code: None,
                    retry_in: None,
                },
                ConnectionEvent::GaveUp {
                    attempts: MAX_ATTEMPTS,
                },
            ]
        );
        assert_eq!(
            manager.connect(),
            Err(ConnectionError::AttemptsExhausted {
                attempts: MAX_ATTEMPTS
            })
        );

        manager.reset_attempts();
        assert_eq!(manager.connect(), Ok(true));
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_connect_guard_holds_single_slot() {
        let mut manager = manager();
        assert!(assert_ok!(manager.connect()));
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(!assert_ok!(manager.connect()));
        assert_eq!(manager.active_connections(), 1);

        manager.shutdown();
        assert_eq!(manager.active_connections(), 0);
        assert_eq!(assert_err!(manager.connect()), ConnectionError::ShutDown);
    }

    #[tokio::test]
    async fn test_connect_timeout_returns_to_disconnected() {
        let mut manager = manager();
        manager.connect().unwrap();
        let generation = manager.generation;

        manager.process(Internal::ConnectTimeout { generation });
        assert_eq!(
            drain(&mut manager),
            vec![ConnectionEvent::TimedOut {
                retry_in: Some(Duration::from_millis(1_000)),
            }]
        );
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.active_connections(), 0);

        // The abandoned socket reporting in late changes nothing.
        manager.process(Internal::Opened { generation });
        assert!(drain(&mut manager).is_empty());
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_reconnect_deferred_in_background() {
        let mut manager = manager();
        let generation = force_open(&mut manager);
        manager.process(Internal::Closed {
            generation,
            code: Some(1011),
        });
        drain(&mut manager);

        manager.set_foreground(false);
        manager.process(Internal::ReconnectDue { generation });
        assert!(manager.pending_reconnect);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.set_foreground(true);
        assert!(!manager.pending_reconnect);
        assert_eq!(manager.state(), ConnectionState::Connecting);
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_foreground_reconnects_immediately_after_abnormal_close() {
        let mut manager = manager();
        let generation = force_open(&mut manager);
        manager.process(Internal::Closed {
            generation,
            code: Some(1006),
        });
        drain(&mut manager);
        assert!(manager.timers.reconnect.is_some());

        manager.set_foreground(true);
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(manager.timers.reconnect.is_none());
        assert_eq!(manager.active_connections(), 1);
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_foreground_after_local_close_stays_down() {
        let mut manager = manager();
        let generation = force_open(&mut manager);
        manager.close();
        manager.process(Internal::Closed {
            generation,
            code: Some(1000),
        });
        drain(&mut manager);

        manager.set_foreground(true);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_zero_heartbeat_interval_does_not_panic() {
        let mut manager = ConnectionManager::new(
            "ws://127.0.0.1:9/ws",
            ConnectionConfig {
                heartbeat_interval_ms: 0,
                ..Default::default()
            },
            Arc::new(ManualClock::new(0)),
        );
        let (tx, mut rx) = unbounded_channel();
        manager.outbound = Some(tx);
        manager.start_heartbeat();

        for _ in 0..2 {
            match rx.recv().await {
                Some(Outbound::Text(frame)) => assert!(frame.contains("ping")),
                _ => panic!("expected a heartbeat frame"),
            }
        }
        cancel(&mut manager.timers.heartbeat);
    }

    #[tokio::test]
    async fn test_send_dropped_when_not_open() {
        let mut manager = manager();
        assert!(!manager.send(&ClientMessage::KeepAlivePong));
        assert!(!manager.send_heartbeat());
    }
}
