//! Authenticated ADB connection to one device.
//!
//! Handshake:
//!
//! ```text
//! host                                  device
//!  │── CNXN(version, maxdata, "host::") ──►│
//!  │◄──────────── AUTH(TOKEN, nonce) ──────│
//!  │── AUTH(SIGNATURE, sig) ──────────────►│   known key: device answers CNXN
//!  │◄──────────── AUTH(TOKEN, nonce) ──────│   unknown key
//!  │── AUTH(RSAPUBLICKEY, key) ───────────►│   user confirms on screen
//!  │◄──────────── CNXN(...) ───────────────│
//! ```
//!
//! Each shell command then runs on its own stream:
//! `OPEN → OKAY → (WRTE → OKAY)* → CLSE ↔ CLSE`.

use super::key::AdbKey;
use super::message::{Command, Message};
use super::AdbError;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub const VERSION: u32 = 0x0100_0000;
pub const MAX_DATA: u32 = 256 * 1024;

const AUTH_TOKEN: u32 = 1;
const AUTH_SIGNATURE: u32 = 2;
const AUTH_RSAPUBLICKEY: u32 = 3;

/// Where the host is in the AUTH exchange
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AuthStep {
    AwaitingToken,
    SignatureSent,
    PublicKeySent,
}

pub struct AdbDevice<T> {
    stream: T,
    next_local_id: u32,
    banner: String,
}

impl<T> AdbDevice<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Run the CNXN/AUTH handshake over `stream`
    ///
    /// Every read waits at most `transport_timeout`, except the one after the
    /// public key has been offered: that is when the device shows its
    /// "allow USB debugging" prompt, so it gets `auth_timeout` instead.
    pub async fn handshake(
        mut stream: T,
        key: &AdbKey,
        transport_timeout: Duration,
        auth_timeout: Duration,
    ) -> Result<Self, AdbError> {
        timeout(
            transport_timeout,
            Message::new(Command::CNXN, VERSION, MAX_DATA, b"host::\0".to_vec()).write_to(&mut stream),
        )
        .await
        .map_err(|_| AdbError::Timeout(transport_timeout))??;

        let mut step = AuthStep::AwaitingToken;
        loop {
            let msg = if step == AuthStep::PublicKeySent {
                timeout(auth_timeout, Message::read_from(&mut stream))
                    .await
                    .map_err(|_| AdbError::AuthTimeout(auth_timeout))??
            } else {
                timeout(transport_timeout, Message::read_from(&mut stream))
                    .await
                    .map_err(|_| AdbError::Timeout(transport_timeout))??
            };

            match msg.command {
                Command::CNXN => {
                    let banner = String::from_utf8_lossy(&msg.payload)
                        .trim_end_matches('\0')
                        .to_string();
                    info!("ADB connected: {}", banner);
                    return Ok(Self {
                        stream,
                        next_local_id: 1,
                        banner,
                    });
                }
                Command::AUTH if msg.arg0 == AUTH_TOKEN => {
                    step = match step {
                        AuthStep::AwaitingToken => {
                            debug!("Signing auth token");
                            let signature = key.sign_token(&msg.payload)?;
                            Message::new(Command::AUTH, AUTH_SIGNATURE, 0, signature)
                                .write_to(&mut stream)
                                .await?;
                            AuthStep::SignatureSent
                        }
                        AuthStep::SignatureSent => {
                            warn!("Device does not know this key, offering public key");
                            Message::new(
                                Command::AUTH,
                                AUTH_RSAPUBLICKEY,
                                0,
                                key.public_key_payload(),
                            )
                            .write_to(&mut stream)
                            .await?;
                            AuthStep::PublicKeySent
                        }
                        AuthStep::PublicKeySent => return Err(AdbError::AuthRejected),
                    };
                }
                other => return Err(AdbError::Unexpected(other)),
            }
        }
    }

    pub fn banner(&self) -> &str {
        &self.banner
    }

    /// Run `command` through `shell:` and collect its output
    pub async fn shell(&mut self, command: &str) -> Result<Vec<u8>, AdbError> {
        let local_id = self.next_local_id;
        self.next_local_id = self.next_local_id.wrapping_add(1).max(1);

        let mut service = format!("shell:{command}").into_bytes();
        service.push(0);
        Message::new(Command::OPEN, local_id, 0, service)
            .write_to(&mut self.stream)
            .await?;

        let mut remote_id = None;
        let mut output = Vec::new();
        loop {
            let msg = Message::read_from(&mut self.stream).await?;
            if msg.arg1 != local_id {
                debug!("Ignoring {:?} for stream {}", msg.command, msg.arg1);
                continue;
            }

            match msg.command {
                Command::OKAY => {
                    remote_id.get_or_insert(msg.arg0);
                }
                Command::WRTE => {
                    let remote = *remote_id.get_or_insert(msg.arg0);
                    output.extend_from_slice(&msg.payload);
                    Message::new(Command::OKAY, local_id, remote, Vec::new())
                        .write_to(&mut self.stream)
                        .await?;
                }
                Command::CLSE => {
                    let Some(remote) = remote_id else {
                        return Err(AdbError::StreamRefused(command.to_string()));
                    };
                    Message::new(Command::CLSE, local_id, remote, Vec::new())
                        .write_to(&mut self.stream)
                        .await?;
                    return Ok(output);
                }
                other => return Err(AdbError::Unexpected(other)),
            }
        }
    }

    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("ADB stream shutdown: {}", e);
        }
    }
}
