use super::device::AdbDevice;
use super::key::AdbKey;
use crate::forwarding::session::{Connector, RemoteSession, SessionError};
use crate::forwarding::token::CommandToken;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Connects to `adbd` listening on TCP (`adb tcpip 5555`)
///
/// `connect_timeout` bounds the TCP connect and every handshake read.
pub struct AdbTcpConnector {
    host: String,
    port: u16,
    key: Arc<AdbKey>,
    connect_timeout: Duration,
    auth_timeout: Duration,
}

impl AdbTcpConnector {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        key: Arc<AdbKey>,
        connect_timeout: Duration,
        auth_timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            key,
            connect_timeout,
            auth_timeout,
        }
    }
}

impl Connector for AdbTcpConnector {
    type Session = AdbDevice<TcpStream>;

    async fn connect(&mut self) -> Result<Self::Session, SessionError> {
        let addr = (self.host.as_str(), self.port);
        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| SessionError::Timeout(self.connect_timeout))??;
        stream.set_nodelay(true)?;
        debug!("TCP connected to {}:{}", self.host, self.port);

        let device = AdbDevice::handshake(stream, &self.key, self.connect_timeout, self.auth_timeout).await?;
        Ok(device)
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl<T> RemoteSession for AdbDevice<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn inject_key(&mut self, token: &CommandToken) -> Result<(), SessionError> {
        let output = self.shell(&format!("input keyevent {token}")).await?;
        // `input` prints nothing on success; anything else is its usage/error text
        let text = String::from_utf8_lossy(&output);
        if !text.trim().is_empty() {
            warn!("`input keyevent {}` said: {}", token, text.trim());
        }
        Ok(())
    }

    async fn close(self) {
        AdbDevice::close(self).await;
    }
}
