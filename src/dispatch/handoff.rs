//! Writer end of the handoff FIFO
//!
//! Opening is non-blocking, so with no forwarder listening the open fails
//! (`ENXIO`) and the token is dropped. A failed write closes the handle and
//! the next token tries a fresh open. When the forwarder stops draining and
//! the pipe fills up, tokens are dropped after [`FULL_PIPE_WAIT`] so the
//! dispatcher keeps serving the lights.

use crate::forwarding::CommandToken;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::pipe;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Longest a token waits for room in the pipe
pub const FULL_PIPE_WAIT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    Written,
    /// Nobody has the FIFO open for reading
    NoReader,
    /// Reader is not draining the pipe
    Full,
    Failed,
}

pub struct HandoffWriter {
    path: PathBuf,
    sender: Option<pipe::Sender>,
}

impl HandoffWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sender: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.sender.is_some()
    }

    pub async fn write(&mut self, token: &CommandToken) -> Handoff {
        if self.sender.is_none() {
            match pipe::OpenOptions::new().open_sender(&self.path) {
                Ok(sender) => {
                    debug!("Opened {} for writing", self.path.display());
                    self.sender = Some(sender);
                }
                Err(e) => {
                    debug!("Dropping {}: {} not open ({})", token, self.path.display(), e);
                    return Handoff::NoReader;
                }
            }
        }

        let Some(sender) = self.sender.as_mut() else {
            return Handoff::NoReader;
        };
        // Lines are shorter than PIPE_BUF, so a write lands whole or not at all
        let line = format!("{}\n", token);
        match timeout(FULL_PIPE_WAIT, sender.write_all(line.as_bytes())).await {
            Ok(Ok(())) => Handoff::Written,
            Err(_) => {
                warn!("Dropping {}: {} is full", token, self.path.display());
                Handoff::Full
            }
            Ok(Err(e)) => {
                warn!("Write to {} failed: {}", self.path.display(), e);
                self.sender = None;
                Handoff::Failed
            }
        }
    }

    pub fn close(&mut self) {
        if self.sender.take().is_some() {
            debug!("Closed {}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarding::intake::ensure_fifo;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn fifo(name: &str) -> PathBuf {
        let path =
            std::env::temp_dir().join(format!("snes-link-handoff-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        ensure_fifo(&path).unwrap();
        path
    }

    fn token(s: &str) -> CommandToken {
        CommandToken::new(s).unwrap()
    }

    #[tokio::test]
    async fn missing_reader_drops_token() {
        let path = fifo("noreader");
        let mut writer = HandoffWriter::new(&path);

        assert_eq!(writer.write(&token("KEYCODE_BACK")).await, Handoff::NoReader);
        assert!(!writer.is_open());

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn tokens_arrive_one_per_line() {
        let path = fifo("lines");
        let receiver = pipe::OpenOptions::new().open_receiver(&path).unwrap();
        let mut lines = BufReader::new(receiver).lines();
        let mut writer = HandoffWriter::new(&path);

        assert_eq!(writer.write(&token("KEYCODE_DPAD_UP")).await, Handoff::Written);
        assert_eq!(writer.write(&token("KEYCODE_ENTER")).await, Handoff::Written);

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("KEYCODE_DPAD_UP"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("KEYCODE_ENTER"));

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn reopens_after_reader_restart() {
        let path = fifo("restart");
        let mut writer = HandoffWriter::new(&path);

        let receiver = pipe::OpenOptions::new().open_receiver(&path).unwrap();
        assert_eq!(writer.write(&token("KEYCODE_MENU")).await, Handoff::Written);
        drop(receiver);

        // Broken pipe closes the handle
        assert_eq!(writer.write(&token("KEYCODE_MENU")).await, Handoff::Failed);
        assert!(!writer.is_open());

        let receiver = pipe::OpenOptions::new().open_receiver(&path).unwrap();
        let mut lines = BufReader::new(receiver).lines();
        assert_eq!(writer.write(&token("KEYCODE_HOME")).await, Handoff::Written);
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("KEYCODE_HOME"));

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn full_pipe_drops_instead_of_blocking() {
        let path = fifo("full");
        let receiver = pipe::OpenOptions::new().open_receiver(&path).unwrap();
        let mut writer = HandoffWriter::new(&path);

        let mut written = 0;
        let outcome = loop {
            match writer.write(&token("KEYCODE_DPAD_DOWN")).await {
                Handoff::Written if written < 100_000 => written += 1,
                other => break other,
            }
        };
        assert_eq!(outcome, Handoff::Full);
        assert!(written > 0);
        assert!(writer.is_open());

        // Draining makes room again on the same handle
        let mut lines = BufReader::new(receiver).lines();
        for _ in 0..written.min(1000) {
            assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("KEYCODE_DPAD_DOWN"));
        }
        assert_eq!(writer.write(&token("KEYCODE_HOME")).await, Handoff::Written);

        std::fs::remove_file(&path).unwrap();
    }
}
