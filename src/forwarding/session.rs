//! Seams between the forwarding pipeline and a concrete remote endpoint
//!
//! A [`Connector`] produces authenticated [`RemoteSession`]s. The supervisor
//! owns the connector; the forwarder only ever sees sessions.

use super::token::CommandToken;
use crate::adb::AdbError;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Observable link state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] AdbError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

pub trait RemoteSession: Send + 'static {
    /// Issue one "inject key event" command
    fn inject_key(
        &mut self,
        token: &CommandToken,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    fn close(self) -> impl Future<Output = ()> + Send;
}

pub trait Connector: Send + 'static {
    type Session: RemoteSession;

    /// Establish and authenticate a fresh session
    fn connect(&mut self) -> impl Future<Output = Result<Self::Session, SessionError>> + Send;

    /// Human readable endpoint for logs
    fn endpoint(&self) -> String;
}
