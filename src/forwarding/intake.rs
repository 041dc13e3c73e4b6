//! Event Intake - command tokens from the handoff FIFO
//!
//! The pipe is opened read-write so the intake itself counts as a writer:
//! a reader process that restarts never makes us see EOF. If EOF or a read
//! error happens anyway the pipe is reopened after [`REOPEN_DELAY`].

use super::token::CommandToken;
use nix::sys::stat::Mode;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::unix::pipe;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_FIFO_PATH: &str = "/tmp/snes_adb";

pub const REOPEN_DELAY: Duration = Duration::from_secs(1);

const FIFO_MODE: u32 = 0o666;

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("{0} exists and is not a FIFO")]
    NotAFifo(PathBuf),

    #[error("Failed to create FIFO {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },

    #[error("FIFO I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Forwarder stopped accepting tokens")]
    Closed,
}

/// Why a single pass over the pipe ended
#[derive(Debug, PartialEq, Eq)]
pub enum StreamEnd {
    /// Writer side closed
    Eof,
    Cancelled,
}

pub struct EventIntake {
    path: PathBuf,
    tokens: mpsc::Sender<CommandToken>,
    cancel: CancellationToken,
    accepted: u64,
}

impl EventIntake {
    pub fn new(
        path: impl Into<PathBuf>,
        tokens: mpsc::Sender<CommandToken>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            path: path.into(),
            tokens,
            cancel,
            accepted: 0,
        }
    }

    /// Read from the FIFO until shutdown or the forwarder goes away
    pub async fn run(mut self) -> Result<u64, IntakeError> {
        info!("Listening for tokens on {}", self.path.display());

        while !self.cancel.is_cancelled() {
            match self.read_pipe().await {
                Ok(StreamEnd::Cancelled) => break,
                Ok(StreamEnd::Eof) => warn!("Writer closed {}, reopening", self.path.display()),
                Err(IntakeError::Closed) => return Err(IntakeError::Closed),
                Err(e) => error!("Channel error on {}: {}", self.path.display(), e),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(REOPEN_DELAY) => {}
            }
        }

        info!("Intake stopped after {} tokens", self.accepted);
        Ok(self.accepted)
    }

    async fn read_pipe(&mut self) -> Result<StreamEnd, IntakeError> {
        ensure_fifo(&self.path)?;
        let receiver = pipe::OpenOptions::new()
            .read_write(true)
            .open_receiver(&self.path)?;
        debug!("Opened {}", self.path.display());

        let mut reader = BufReader::new(receiver);
        tokio::select! {
            _ = self.cancel.cancelled() => Ok(StreamEnd::Cancelled),
            result = consume(&mut reader, &self.tokens, &mut self.accepted) => result.map(|()| StreamEnd::Eof),
        }
    }
}

/// Forward every valid line in `reader` to `tokens`, in order, until EOF
///
/// Blank lines are skipped. Lines that are not UTF-8 or not a valid token
/// are logged and dropped without losing what follows them. `accepted`
/// counts forwarded tokens and stays accurate when a read fails halfway.
pub async fn consume<R>(
    reader: &mut R,
    tokens: &mpsc::Sender<CommandToken>,
    accepted: &mut u64,
) -> Result<(), IntakeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                warn!("Dropping non UTF-8 line ({} bytes): {}", buf.len(), e);
                continue;
            }
        };
        match CommandToken::from_line(line) {
            Ok(Some(token)) => {
                debug!("← {}", token);
                tokens.send(token).await.map_err(|_| IntakeError::Closed)?;
                *accepted += 1;
            }
            Ok(None) => {}
            Err(e) => warn!("{}", e),
        }
    }
}

/// Create the FIFO if missing; refuse a path that is something else
pub fn ensure_fifo(path: &Path) -> Result<(), IntakeError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.file_type().is_fifo() => Ok(()),
        Ok(_) => Err(IntakeError::NotAFifo(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            nix::unistd::mkfifo(path, Mode::from_bits_truncate(FIFO_MODE)).map_err(|source| {
                IntakeError::Create {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            // mkfifo honours the umask
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(FIFO_MODE))?;
            info!("Created FIFO at {}", path.display());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
