//! # Game Client Library
//!
//! Client-side network synchronization for the multiplayer arena game. It
//! keeps a WebSocket connection to the game server alive, predicts the local
//! player from input, pulls that prediction toward the server's view, and
//! interpolates every remote entity so the host can draw smooth motion from
//! jittery snapshots.
//!
//! ## Architecture Overview
//!
//! ### Client-Side Prediction
//! Local input moves the local player immediately, without waiting for the
//! server to confirm it.
//!
//! ### Server Reconciliation
//! Every tick the predicted position is blended a small step toward the latest
//! authoritative snapshot. Large errors (usually server-side knockbacks) are
//! corrected more slowly than small ones so they read as drift.
//!
//! ### Entity Interpolation
//! Remote players and the ball are drawn a fixed delay in the past, between
//! the two snapshots that bracket that instant. Projectiles chase their
//! latest snapshot instead.
//!
//! ### Resilience
//! Lost connections are retried with capped exponential backoff, garbled
//! frames are dropped, and an identity reassignment invalidates the session.
//!
//! ## Module Organization
//!
//! - `connection`: socket lifecycle, heartbeat, reconnect state machine
//! - `latency`: artificial inbound delay for testing under ping
//! - `input`: sequenced, rate-limited input messages
//! - `prediction`, `reconciliation`, `interpolation`: per-tick state math
//! - `session`: message routing and the fixed per-tick pipeline
//! - `stats`: round-trip time history
//! - `runner`: headless host used by the `client` binary
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::clock::SystemClock;
//! use client::config::ClientConfig;
//! use client::input::ControlState;
//! use client::session::Session;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = Session::new(ClientConfig::default(), Arc::new(SystemClock));
//! session.start()?;
//!
//! // Route connection events as they arrive...
//! if let Some(event) = session.next_connection_event().await {
//!     session.handle_connection_event(event)?;
//! }
//!
//! // ...and tick at the host's frame rate.
//! let frame = session.tick(1.0 / 60.0, &ControlState::default())?;
//! println!("local player at {:?}", frame.local);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod input;
pub mod interpolation;
pub mod latency;
pub mod prediction;
pub mod reconciliation;
pub mod runner;
pub mod session;
pub mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ClientConfig;
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState};
pub use error::{ConfigError, ConnectionError, SessionError};
pub use input::{ControlState, InputSequencer};
pub use session::{RenderFrame, Session, SessionEvent};
