//! ADB host side, enough of it to run shell commands on a TV over TCP
//!
//! - [`message`] - 24-byte header codec
//! - [`key`] - host RSA key, token signing and public key export
//! - [`device`] - CNXN/AUTH handshake and `shell:` streams
//! - [`tcp`] - TCP connector plugging a device into the forwarding pipeline

pub mod device;
pub mod key;
pub mod message;
pub mod tcp;

pub use device::AdbDevice;
pub use key::{AdbKey, KeyError};
pub use message::{Command, Message};
pub use tcp::AdbTcpConnector;

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AdbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad magic {magic:#010x} for command {command:#010x}")]
    BadMagic { command: u32, magic: u32 },

    #[error("Payload of {0} bytes exceeds limit")]
    PayloadTooLarge(usize),

    #[error("Checksum mismatch: header {expected}, payload {actual}")]
    Checksum { expected: u32, actual: u32 },

    #[error("Unexpected {0:?} message")]
    Unexpected(Command),

    #[error("Device silent for {0:?}")]
    Timeout(Duration),

    #[error("Device rejected our key")]
    AuthRejected,

    #[error("No authorization from device within {0:?}")]
    AuthTimeout(Duration),

    #[error("Device refused stream for `{0}`")]
    StreamRefused(String),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}
