//! TCP transport for companion sessions.
//!
//! [`Connector`] is the seam the connection manager dials through. The default
//! [`TcpConnector`] opens a plain TCP socket; an in-memory duplex pipe can be
//! wrapped in [`IoStream`] for local peers.

use async_trait::async_trait;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::TransportError;

/// Unified stream type that can be either TCP or an in-process pipe
#[derive(Debug)]
pub enum IoStream {
    /// Plain TCP stream
    Plain(TcpStream),
    /// In-memory duplex pipe
    Memory(DuplexStream),
}

impl AsyncRead for IoStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            IoStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            IoStream::Memory(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for IoStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        match self.get_mut() {
            IoStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            IoStream::Memory(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), std::io::Error>> {
        match self.get_mut() {
            IoStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            IoStream::Memory(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        match self.get_mut() {
            IoStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            IoStream::Memory(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl IoStream {
    /// Peer label for logs
    pub fn peer_label(&self) -> String {
        match self {
            IoStream::Plain(stream) => stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            IoStream::Memory(_) => "memory".to_string(),
        }
    }
}

/// Opens the byte stream a session runs over
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `host:port`, giving up after `timeout`
    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<IoStream, TransportError>;
}

/// Dials plain TCP
#[derive(Debug, Clone, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<IoStream, TransportError> {
        debug!("Dialing {}:{} (timeout {:?})", host, port, timeout);

        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}:{}: {}", host, port, e);
        }
        Ok(IoStream::Plain(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = TcpConnector
            .connect("127.0.0.1", port, Duration::from_secs(3))
            .await
            .unwrap();

        assert!(matches!(stream, IoStream::Plain(_)));
        assert!(stream.peer_label().ends_with(&port.to_string()));
    }

    #[tokio::test]
    async fn test_refused_connect_is_io_error() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = TcpConnector
            .connect("127.0.0.1", port, Duration::from_secs(3))
            .await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }
}
