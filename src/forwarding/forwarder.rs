//! Forwarding Session - one remote command per token, bounded retry
//!
//! A token waits (without limit) for a connected session. Each transmission
//! counts as one attempt; after a failed attempt the session is handed back
//! to the supervisor and the token rides the next session. After
//! [`MAX_ATTEMPTS`] failures the token is dropped and reported.

use super::session::{RemoteSession, SessionError};
use super::supervisor::SessionLink;
use super::token::CommandToken;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// First transmission plus one retry on the next session
pub const MAX_ATTEMPTS: u32 = 2;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(9);

#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered { attempts: u32 },
    Dropped { attempts: u32, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Shutdown requested")]
    Shutdown,

    #[error("Reconnect supervisor stopped")]
    SupervisorGone,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub delivered: u64,
    pub dropped: u64,
}

pub struct Forwarder<S: RemoteSession> {
    link: SessionLink<S>,
    session: Option<S>,
    send_timeout: Duration,
    cancel: CancellationToken,
    stats: ForwardStats,
}

impl<S: RemoteSession> Forwarder<S> {
    pub fn new(link: SessionLink<S>, send_timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            link,
            session: None,
            send_timeout,
            cancel,
            stats: ForwardStats::default(),
        }
    }

    pub fn stats(&self) -> ForwardStats {
        self.stats
    }

    /// Deliver `token`, waiting for a session if none is connected
    ///
    /// Errors only when the pipeline is shutting down; a token that exhausted
    /// its attempts comes back as [`Delivery::Dropped`].
    pub async fn send(&mut self, token: &CommandToken) -> Result<Delivery, ForwardError> {
        let send_timeout = self.send_timeout;
        let mut attempts = 0;

        loop {
            let session = self.connected_session().await?;
            attempts += 1;

            let result = match timeout(send_timeout, session.inject_key(token)).await {
                Ok(result) => result,
                Err(_) => Err(SessionError::Timeout(send_timeout)),
            };

            match result {
                Ok(()) => {
                    info!("→ {}", token);
                    self.stats.delivered += 1;
                    return Ok(Delivery::Delivered { attempts });
                }
                Err(e) => {
                    warn!(
                        "Send of {} failed on attempt {}/{}: {}",
                        token, attempts, MAX_ATTEMPTS, e
                    );
                    self.fail_session().await;
                    if attempts >= MAX_ATTEMPTS {
                        error!("Dropping {} after {} attempts: {}", token, attempts, e);
                        self.stats.dropped += 1;
                        return Ok(Delivery::Dropped {
                            attempts,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    /// Forward tokens in arrival order until `tokens` closes or shutdown
    pub async fn run(mut self, mut tokens: mpsc::Receiver<CommandToken>) -> ForwardStats {
        info!("Forwarder waiting for tokens");
        loop {
            let token = tokio::select! {
                _ = self.cancel.cancelled() => break,
                token = tokens.recv() => match token {
                    Some(token) => token,
                    None => break,
                },
            };

            match self.send(&token).await {
                Ok(Delivery::Delivered { attempts }) if attempts > 1 => {
                    debug!("{} delivered on retry", token);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Not forwarding {}: {}", token, e);
                    break;
                }
            }
        }
        self.shutdown().await
    }

    /// Close the session in hand and any fresh one still in the mailbox
    pub async fn shutdown(mut self) -> ForwardStats {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        self.link.sessions.close();
        while let Ok(session) = self.link.sessions.try_recv() {
            session.close().await;
        }
        info!(
            "Forwarder stopped: {} delivered, {} dropped",
            self.stats.delivered, self.stats.dropped
        );
        self.stats
    }

    async fn connected_session(&mut self) -> Result<&mut S, ForwardError> {
        if self.session.is_none() {
            if self.link.state() != super::session::LinkState::Connected {
                debug!("Waiting for link ({})", self.link.state());
            }
            let session = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ForwardError::Shutdown),
                session = self.link.sessions.recv() => session.ok_or(ForwardError::SupervisorGone)?,
            };
            self.session = Some(session);
        }
        self.session.as_mut().ok_or(ForwardError::SupervisorGone)
    }

    async fn fail_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        if self.link.failures.try_send(()).is_err() {
            debug!("Supervisor already notified or stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarding::session::Connector;
    use crate::forwarding::supervisor::ReconnectSupervisor;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Copy, Debug)]
    enum Outcome {
        Ok,
        Fail,
        Hang,
    }

    /// Records `(session id, token)` for every transmission attempt
    #[derive(Clone, Default)]
    struct Script {
        outcomes: Arc<Mutex<VecDeque<Outcome>>>,
        sent: Arc<Mutex<Vec<(u32, String)>>>,
        closed: Arc<Mutex<Vec<u32>>>,
    }

    impl Script {
        fn with(outcomes: &[Outcome]) -> Self {
            let script = Self::default();
            script.outcomes.lock().unwrap().extend(outcomes.iter().copied());
            script
        }

        fn sent(&self) -> Vec<(u32, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    struct ScriptedSession {
        id: u32,
        script: Script,
    }

    impl RemoteSession for ScriptedSession {
        async fn inject_key(&mut self, token: &CommandToken) -> Result<(), SessionError> {
            self.script
                .sent
                .lock()
                .unwrap()
                .push((self.id, token.to_string()));
            let outcome = self
                .script
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Outcome::Ok);
            match outcome {
                Outcome::Ok => Ok(()),
                Outcome::Fail => Err(SessionError::Transport(
                    std::io::ErrorKind::BrokenPipe.into(),
                )),
                Outcome::Hang => std::future::pending().await,
            }
        }

        async fn close(self) {
            self.script.closed.lock().unwrap().push(self.id);
        }
    }

    struct ScriptedConnector {
        next_id: u32,
        script: Script,
    }

    impl Connector for ScriptedConnector {
        type Session = ScriptedSession;

        async fn connect(&mut self) -> Result<ScriptedSession, SessionError> {
            self.next_id += 1;
            Ok(ScriptedSession {
                id: self.next_id,
                script: self.script.clone(),
            })
        }

        fn endpoint(&self) -> String {
            "scripted:5555".to_string()
        }
    }

    fn token(s: &str) -> CommandToken {
        CommandToken::new(s).unwrap()
    }

    fn pipeline(script: &Script) -> (Forwarder<ScriptedSession>, CancellationToken) {
        let cancel = CancellationToken::new();
        let connector = ScriptedConnector {
            next_id: 0,
            script: script.clone(),
        };
        let (_handle, link) =
            ReconnectSupervisor::spawn(connector, Duration::from_secs(5), cancel.clone());
        (
            Forwarder::new(link, DEFAULT_SEND_TIMEOUT, cancel.clone()),
            cancel,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn connected_token_is_sent_exactly_once() {
        let script = Script::with(&[Outcome::Ok]);
        let (mut forwarder, cancel) = pipeline(&script);

        let delivery = forwarder.send(&token("KEYCODE_DPAD_UP")).await.unwrap();
        assert_eq!(delivery, Delivery::Delivered { attempts: 1 });
        assert_eq!(script.sent(), vec![(1, "KEYCODE_DPAD_UP".to_string())]);

        cancel.cancel();
        forwarder.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn one_failure_resends_on_the_next_session() {
        let script = Script::with(&[Outcome::Fail, Outcome::Ok]);
        let (mut forwarder, cancel) = pipeline(&script);

        let delivery = forwarder.send(&token("KEYCODE_ENTER")).await.unwrap();
        assert_eq!(delivery, Delivery::Delivered { attempts: 2 });
        assert_eq!(
            script.sent(),
            vec![
                (1, "KEYCODE_ENTER".to_string()),
                (2, "KEYCODE_ENTER".to_string())
            ]
        );
        assert_eq!(*script.closed.lock().unwrap(), vec![1]);

        cancel.cancel();
        forwarder.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn second_failure_drops_the_token() {
        let script = Script::with(&[Outcome::Fail, Outcome::Fail, Outcome::Ok]);
        let (mut forwarder, cancel) = pipeline(&script);

        let delivery = forwarder.send(&token("KEYCODE_BACK")).await.unwrap();
        assert!(matches!(delivery, Delivery::Dropped { attempts: 2, .. }));
        assert_eq!(script.sent().len(), 2);
        assert_eq!(forwarder.stats().dropped, 1);

        // The next token gets a fresh session and the remaining outcome
        let delivery = forwarder.send(&token("KEYCODE_MENU")).await.unwrap();
        assert_eq!(delivery, Delivery::Delivered { attempts: 1 });
        assert_eq!(script.sent().len(), 3);
        assert_eq!(script.sent()[2], (3, "KEYCODE_MENU".to_string()));

        cancel.cancel();
        forwarder.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hung_transmission_counts_as_a_failed_attempt() {
        let script = Script::with(&[Outcome::Hang, Outcome::Ok]);
        let (mut forwarder, cancel) = pipeline(&script);
        let started = tokio::time::Instant::now();

        let delivery = forwarder.send(&token("KEYCODE_HOME")).await.unwrap();
        assert_eq!(delivery, Delivery::Delivered { attempts: 2 });
        assert!(started.elapsed() >= DEFAULT_SEND_TIMEOUT);

        cancel.cancel();
        forwarder.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn run_forwards_in_arrival_order() {
        let script = Script::default();
        let (forwarder, cancel) = pipeline(&script);
        let (tx, rx) = mpsc::channel(8);
        for name in ["KEYCODE_DPAD_UP", "KEYCODE_DPAD_DOWN", "KEYCODE_ENTER"] {
            tx.send(token(name)).await.unwrap();
        }
        drop(tx);

        let stats = forwarder.run(rx).await;
        assert_eq!(stats.delivered, 3);
        let names: Vec<_> = script.sent().into_iter().map(|(_, t)| t).collect();
        assert_eq!(names, ["KEYCODE_DPAD_UP", "KEYCODE_DPAD_DOWN", "KEYCODE_ENTER"]);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_releases_a_waiting_send() {
        let cancel = CancellationToken::new();
        let (_failures_rx, link) = disconnected_link();
        let mut forwarder: Forwarder<ScriptedSession> =
            Forwarder::new(link, DEFAULT_SEND_TIMEOUT, cancel.clone());

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            canceller.cancel();
        });

        let result = forwarder.send(&token("KEYCODE_BACK")).await;
        assert!(matches!(result, Err(ForwardError::Shutdown)));
    }

    /// A link whose supervisor never produces a session
    fn disconnected_link() -> (
        (mpsc::Sender<ScriptedSession>, mpsc::Receiver<()>),
        SessionLink<ScriptedSession>,
    ) {
        let (mailbox, sessions) = mpsc::channel(1);
        let (failures, failures_rx) = mpsc::channel(1);
        let (_state, state_rx) = tokio::sync::watch::channel(Default::default());
        let link = SessionLink::from_parts(sessions, failures, state_rx);
        ((mailbox, failures_rx), link)
    }
}
