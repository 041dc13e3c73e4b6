//! ADB message codec.
//!
//! Wire format (all fields little-endian u32):
//! ```text
//! ┌─────────┬──────┬──────┬────────────┬──────────┬───────┬─────────────┐
//! │ command │ arg0 │ arg1 │ data_len   │ data_sum │ magic │ payload (N) │
//! └─────────┴──────┴──────┴────────────┴──────────┴───────┴─────────────┘
//! ```
//!
//! `magic` is `command ^ 0xFFFF_FFFF`; `data_sum` is the byte sum of the
//! payload. Devices speaking protocol 0x01000001 and later send a zero sum,
//! which is accepted without checking.

use super::AdbError;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const HEADER_SIZE: usize = 24;

/// Largest payload accepted from a device.
pub const MAX_PAYLOAD: usize = 1024 * 1024;

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Command(u32);

impl Command {
    pub const CNXN: Command = Command::from_tag(*b"CNXN");
    pub const AUTH: Command = Command::from_tag(*b"AUTH");
    pub const OPEN: Command = Command::from_tag(*b"OPEN");
    pub const OKAY: Command = Command::from_tag(*b"OKAY");
    pub const WRTE: Command = Command::from_tag(*b"WRTE");
    pub const CLSE: Command = Command::from_tag(*b"CLSE");

    const fn from_tag(tag: [u8; 4]) -> Command {
        Command(u32::from_le_bytes(tag))
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.0.to_le_bytes();
        if tag.iter().all(u8::is_ascii_uppercase) {
            // All bytes are ASCII, the conversion cannot fail
            f.write_str(std::str::from_utf8(&tag).unwrap_or("????"))
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    pub command: Command,
    pub arg0: u32,
    pub arg1: u32,
    pub payload: Vec<u8>,
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("command", &self.command)
            .field("arg0", &self.arg0)
            .field("arg1", &self.arg1)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub command: Command,
    pub arg0: u32,
    pub arg1: u32,
    pub data_len: u32,
    pub data_sum: u32,
}

impl Header {
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Header, AdbError> {
        let field = |i: usize| -> u32 {
            let mut word = [0u8; 4];
            word.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
            u32::from_le_bytes(word)
        };
        let command = field(0);
        let magic = field(5);
        if magic != command ^ 0xFFFF_FFFF {
            return Err(AdbError::BadMagic { command, magic });
        }

        let header = Header {
            command: Command(command),
            arg0: field(1),
            arg1: field(2),
            data_len: field(3),
            data_sum: field(4),
        };
        if header.data_len as usize > MAX_PAYLOAD {
            return Err(AdbError::PayloadTooLarge(header.data_len as usize));
        }
        Ok(header)
    }
}

fn checksum(payload: &[u8]) -> u32 {
    payload
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)))
}

impl Message {
    pub fn new(command: Command, arg0: u32, arg1: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            command,
            arg0,
            arg1,
            payload: payload.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        for word in [
            self.command.0,
            self.arg0,
            self.arg1,
            self.payload.len() as u32,
            checksum(&self.payload),
            self.command.0 ^ 0xFFFF_FFFF,
        ] {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out.extend_from_slice(&self.payload);
        out
    }

    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message, AdbError> {
        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header).await?;
        let header = Header::parse(&header)?;

        let mut payload = vec![0u8; header.data_len as usize];
        reader.read_exact(&mut payload).await?;

        if header.data_sum != 0 {
            let actual = checksum(&payload);
            if actual != header.data_sum {
                return Err(AdbError::Checksum {
                    expected: header.data_sum,
                    actual,
                });
            }
        }

        Ok(Message {
            command: header.command,
            arg0: header.arg0,
            arg1: header.arg1,
            payload,
        })
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<(), AdbError> {
        writer.write_all(&self.encode()).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cnxn_header_layout() {
        let msg = Message::new(Command::CNXN, 0x0100_0000, 4096, b"host::\0".to_vec());
        let bytes = msg.encode();
        assert_eq!(bytes.len(), HEADER_SIZE + 7);
        assert_eq!(&bytes[0..4], b"CNXN");
        assert_eq!(&bytes[4..8], &0x0100_0000u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &7u32.to_le_bytes());
        let sum: u32 = b"host::\0".iter().map(|&b| u32::from(b)).sum();
        assert_eq!(&bytes[16..20], &sum.to_le_bytes());
        assert_eq!(&bytes[20..24], &(Command::CNXN.raw() ^ 0xFFFF_FFFF).to_le_bytes());
    }

    #[test]
    fn header_with_wrong_magic_is_rejected() {
        let mut bytes = Message::new(Command::OKAY, 1, 2, Vec::new()).encode();
        bytes[20] ^= 0x01;
        let header: [u8; HEADER_SIZE] = bytes[..HEADER_SIZE].try_into().unwrap();
        assert!(matches!(
            Header::parse(&header),
            Err(AdbError::BadMagic { .. })
        ));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut bytes = Message::new(Command::WRTE, 1, 2, Vec::new()).encode();
        bytes[12..16].copy_from_slice(&((MAX_PAYLOAD as u32) + 1).to_le_bytes());
        let header: [u8; HEADER_SIZE] = bytes[..HEADER_SIZE].try_into().unwrap();
        assert!(matches!(
            Header::parse(&header),
            Err(AdbError::PayloadTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn reads_message_from_stream() {
        let msg = Message::new(Command::WRTE, 7, 9, b"ok\n".to_vec());
        let bytes = msg.encode();
        let mut reader = &bytes[..];
        let read = Message::read_from(&mut reader).await.unwrap();
        assert_eq!(read, msg);
    }

    #[tokio::test]
    async fn zero_checksum_is_accepted() {
        let mut bytes = Message::new(Command::WRTE, 7, 9, b"data".to_vec()).encode();
        bytes[16..20].copy_from_slice(&[0; 4]);
        let mut reader = &bytes[..];
        let read = Message::read_from(&mut reader).await.unwrap();
        assert_eq!(read.payload, b"data");
    }

    #[tokio::test]
    async fn corrupted_payload_fails_checksum() {
        let mut bytes = Message::new(Command::WRTE, 7, 9, b"data".to_vec()).encode();
        bytes[HEADER_SIZE] = b'x';
        let mut reader = &bytes[..];
        assert!(matches!(
            Message::read_from(&mut reader).await,
            Err(AdbError::Checksum { .. })
        ));
    }

    #[tokio::test]
    async fn truncated_stream_is_io_error() {
        let bytes = Message::new(Command::OKAY, 1, 1, Vec::new()).encode();
        let mut reader = &bytes[..10];
        assert!(matches!(
            Message::read_from(&mut reader).await,
            Err(AdbError::Io(_))
        ));
    }

    #[test]
    fn command_debug_shows_tag() {
        assert_eq!(format!("{:?}", Command::CLSE), "CLSE");
        assert_eq!(format!("{:?}", Command(1)), "0x00000001");
    }
}
