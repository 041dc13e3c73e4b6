//! Forwarding pipeline: FIFO tokens to remote key events
//!
//! ```text
//! FIFO ──► EventIntake ──mpsc──► Forwarder ◄──mailbox / failures──► ReconnectSupervisor
//!                                    │                                      │
//!                                    └──────── RemoteSession ◄── Connector ─┘
//! ```
//!
//! The supervisor is the only place sessions are created; the forwarder holds
//! at most one and hands it back, by reporting a failure, when it breaks.

pub mod forwarder;
pub mod intake;
pub mod session;
pub mod supervisor;
pub mod token;

pub use forwarder::{Delivery, ForwardError, ForwardStats, Forwarder, MAX_ATTEMPTS};
pub use intake::{EventIntake, IntakeError};
pub use session::{Connector, LinkState, RemoteSession, SessionError};
pub use supervisor::{ReconnectSupervisor, SessionLink, SupervisorHandle};
pub use token::{CommandToken, InvalidToken};
