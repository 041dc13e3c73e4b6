//! Reconnect Supervisor - keeps exactly one live session available
//!
//! # State Machine
//!
//! ```text
//!            ┌──────────── connect failed (sleep retry_delay) ───────────┐
//!            ▼                                                            │
//! Disconnected ──► Connecting ──► Connected ──► (failure reported) ──► Disconnected
//!                                     │
//!                               session into mailbox
//! ```
//!
//! The session travels to the forwarder through a one-slot mailbox; the
//! forwarder reports a failed session back on a separate channel. The two
//! sides never touch the same session at the same time.

use super::session::{Connector, LinkState, RemoteSession};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Forwarder side of the supervisor: fresh sessions in, failures out
pub struct SessionLink<S> {
    pub(crate) sessions: mpsc::Receiver<S>,
    pub(crate) failures: mpsc::Sender<()>,
    state: watch::Receiver<LinkState>,
}

impl<S> SessionLink<S> {
    #[cfg(test)]
    pub(crate) fn from_parts(
        sessions: mpsc::Receiver<S>,
        failures: mpsc::Sender<()>,
        state: watch::Receiver<LinkState>,
    ) -> Self {
        Self {
            sessions,
            failures,
            state,
        }
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }
}

pub struct ReconnectSupervisor<C: Connector> {
    connector: C,
    retry_delay: Duration,
    mailbox: mpsc::Sender<C::Session>,
    failures: mpsc::Receiver<()>,
    state: watch::Sender<LinkState>,
    cancel: CancellationToken,
}

impl<C: Connector> ReconnectSupervisor<C> {
    /// Start supervising `connector`; connecting begins immediately
    pub fn spawn(
        connector: C,
        retry_delay: Duration,
        cancel: CancellationToken,
    ) -> (SupervisorHandle, SessionLink<C::Session>) {
        let (mailbox, sessions) = mpsc::channel(1);
        let (failure_tx, failures) = mpsc::channel(1);
        let (state, state_rx) = watch::channel(LinkState::Disconnected);

        let supervisor = Self {
            connector,
            retry_delay,
            mailbox,
            failures,
            state,
            cancel,
        };
        let task = tokio::spawn(supervisor.run());

        let link = SessionLink {
            sessions,
            failures: failure_tx,
            state: state_rx.clone(),
        };
        (SupervisorHandle { task, state: state_rx }, link)
    }

    fn set_state(&self, state: LinkState) {
        self.state.send_replace(state);
        debug!("Link {} is {}", self.connector.endpoint(), state);
    }

    async fn run(mut self) {
        let endpoint = self.connector.endpoint();
        let mut attempt: u64 = 0;

        loop {
            self.set_state(LinkState::Connecting);
            attempt += 1;
            info!("Connecting to {} (attempt {})", endpoint, attempt);

            let result = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.connector.connect() => result,
            };

            let session = match result {
                Ok(session) => session,
                Err(e) => {
                    self.set_state(LinkState::Disconnected);
                    warn!(
                        "Connect to {} failed: {} - retrying in {:?}",
                        endpoint, e, self.retry_delay
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_delay) => continue,
                    }
                }
            };

            attempt = 0;
            self.set_state(LinkState::Connected);
            info!("Connected to {}", endpoint);

            // The mailbox is empty here: the previous session was taken and
            // reported as failed before we got back to connecting.
            if let Err(mpsc::error::TrySendError::Full(s) | mpsc::error::TrySendError::Closed(s)) =
                self.mailbox.try_send(session)
            {
                debug!("Forwarder gone, closing fresh session");
                s.close().await;
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                failure = self.failures.recv() => {
                    if failure.is_none() {
                        break;
                    }
                }
            }
            self.set_state(LinkState::Disconnected);
            warn!("Session to {} failed, reconnecting", endpoint);
        }

        self.set_state(LinkState::Disconnected);
        info!("Reconnect supervisor for {} stopped", endpoint);
    }
}

pub struct SupervisorHandle {
    task: JoinHandle<()>,
    state: watch::Receiver<LinkState>,
}

impl SupervisorHandle {
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!("Reconnect supervisor task failed: {}", e);
        }
    }
}
