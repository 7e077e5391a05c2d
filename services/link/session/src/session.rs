//! One live connection to the companion peer.
//!
//! A [`Session`] wraps the stream produced by a successful connect. A single
//! I/O task owns the stream: it encodes queued outbound messages, decodes
//! inbound bytes through the session's codec, publishes every decoded message
//! on the [`EventChannel`], and publishes exactly one
//! [`LinkEvent::SessionClosed`] when it stops for any reason.

use bytes::BytesMut;
use link_wire::{Codec, CodecFactory, Message};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::events::{EventChannel, LinkEvent};
use crate::transport::IoStream;
use crate::SessionError;

/// Identifier of one session, unique within a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Statistics for a session
#[derive(Clone, Debug, Default)]
struct SessionStats {
    bytes_in: u64,
    bytes_out: u64,
    messages_received: u64,
    messages_sent: u64,
}

/// Handle to a running session; dropping it closes the connection
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    peer: String,
    outbound_tx: mpsc::UnboundedSender<Message>,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Session {
    /// Take ownership of `stream` and start the session's I/O task
    pub fn start(
        id: SessionId,
        stream: IoStream,
        codec_factory: &dyn CodecFactory,
        events: EventChannel,
        read_buffer_size: usize,
    ) -> Self {
        let peer = stream.peer_label();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let io = SessionIo {
            id,
            peer: peer.clone(),
            stream,
            codec: codec_factory.new_codec(),
            events,
            outbound_rx,
            alive: alive.clone(),
            cancel: cancel.clone(),
            read_buffer: BytesMut::with_capacity(read_buffer_size),
            stats: SessionStats::default(),
        };
        tokio::spawn(io.run());

        info!("Session {} started with {}", id, peer);
        Self {
            id,
            peer,
            outbound_tx,
            alive,
            cancel,
        }
    }

    /// Session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Peer label
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Whether the transport is still up
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Queue `message` for encoding and sending; never blocks
    pub fn write(&self, message: Message) -> Result<(), SessionError> {
        if !self.is_alive() {
            return Err(SessionError::Closed);
        }
        self.outbound_tx
            .send(message)
            .map_err(|_| SessionError::Closed)
    }

    /// Stop the I/O task and release the stream; safe to call repeatedly
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            debug!("Closing session {} with {}", self.id, self.peer);
        }
        self.alive.store(false, Ordering::Release);
        self.cancel.cancel();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// State owned by the I/O task
struct SessionIo {
    id: SessionId,
    peer: String,
    stream: IoStream,
    codec: Box<dyn Codec>,
    events: EventChannel,
    outbound_rx: mpsc::UnboundedReceiver<Message>,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
    read_buffer: BytesMut,
    stats: SessionStats,
}

impl SessionIo {
    async fn run(mut self) {
        let reason = self.event_loop().await;

        self.alive.store(false, Ordering::Release);
        if let Err(e) = self.stream.shutdown().await {
            debug!("Shutdown of session {} stream failed: {}", self.id, e);
        }
        info!(
            "Session {} with {} ended ({}). Stats: {:?}",
            self.id, self.peer, reason, self.stats
        );
        self.events
            .publish(LinkEvent::SessionClosed { session: self.id });
    }

    /// Pump reads and writes until the session must stop; returns why
    async fn event_loop(&mut self) -> String {
        let mut encode_buffer = BytesMut::new();

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    return "closed locally".to_string();
                }

                Some(message) = self.outbound_rx.recv() => {
                    encode_buffer.clear();
                    if let Err(e) = self.codec.encode(&message, &mut encode_buffer) {
                        warn!("Dropping {:?} for session {}: {}", message.kind(), self.id, e);
                        continue;
                    }
                    if let Err(e) = self.write_frame(&encode_buffer).await {
                        error!("Failed to send {:?} to {}: {}", message.kind(), self.peer, e);
                        return format!("write failed: {}", e);
                    }
                    self.stats.messages_sent += 1;
                    debug!("Sent {:?} to {} ({} bytes)", message.kind(), self.peer, encode_buffer.len());
                }

                read = self.stream.read_buf(&mut self.read_buffer) => {
                    match read {
                        Ok(0) => return "peer closed the connection".to_string(),
                        Ok(n) => {
                            self.stats.bytes_in += n as u64;
                            if let Err(reason) = self.drain_inbound() {
                                return reason;
                            }
                        }
                        Err(e) => {
                            error!("Read error from {}: {}", self.peer, e);
                            return format!("read failed: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(frame).await?;
        self.stream.flush().await?;
        self.stats.bytes_out += frame.len() as u64;
        Ok(())
    }

    /// Publish every complete message in the read buffer
    fn drain_inbound(&mut self) -> Result<(), String> {
        loop {
            match self.codec.decode(&mut self.read_buffer) {
                Ok(Some(message)) => {
                    self.stats.messages_received += 1;
                    debug!("Received {:?} from {}", message.kind(), self.peer);
                    self.events.publish(LinkEvent::MessageReceived {
                        session: self.id,
                        message,
                    });
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    error!("Protocol error from {}: {}", self.peer, e);
                    return Err(format!("protocol error: {}", e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use link_wire::{
        JsonCodec, JsonCodecFactory, LoginStateMessage, UpdateVolumeMessage,
    };
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use tokio::time::timeout;

    fn start_pair(id: u64) -> (Session, DuplexStream, EventChannel) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let events = EventChannel::new();
        let session = Session::start(
            SessionId::new(id),
            IoStream::Memory(client),
            &JsonCodecFactory::default(),
            events.clone(),
            1024,
        );
        (session, server, events)
    }

    async fn next_event(sub: &mut crate::EventSubscriber) -> LinkEvent {
        timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("event in time")
            .expect("channel open")
    }

    #[tokio::test]
    async fn test_write_reaches_peer_framed() {
        let (session, mut server, _events) = start_pair(1);
        session
            .write(UpdateVolumeMessage { master_volume: 50 }.into())
            .unwrap();

        let mut codec = JsonCodec::new();
        let mut buf = BytesMut::new();
        let message = loop {
            if let Some(m) = codec.decode(&mut buf).unwrap() {
                break m;
            }
            timeout(Duration::from_secs(2), server.read_buf(&mut buf))
                .await
                .unwrap()
                .unwrap();
        };
        assert_eq!(message, UpdateVolumeMessage { master_volume: 50 }.into());
    }

    #[tokio::test]
    async fn test_inbound_then_closed_on_eof() {
        let (session, mut server, events) = start_pair(2);
        let mut sub = events.subscribe();

        let mut frame = BytesMut::new();
        JsonCodec::new()
            .encode(
                &LoginStateMessage {
                    is_logged_in: true,
                    error_message: None,
                }
                .into(),
                &mut frame,
            )
            .unwrap();
        server.write_all(&frame).await.unwrap();
        drop(server);

        assert!(matches!(
            next_event(&mut sub).await,
            LinkEvent::MessageReceived { session, .. } if session == SessionId::new(2)
        ));
        assert_eq!(
            next_event(&mut sub).await,
            LinkEvent::SessionClosed {
                session: SessionId::new(2)
            }
        );
        assert!(!session.is_alive());
    }

    #[tokio::test]
    async fn test_garbage_closes_session() {
        let (session, mut server, events) = start_pair(3);
        let mut sub = events.subscribe();

        // Length 4, kind 0xdeadbeef
        server
            .write_all(&[0, 0, 0, 4, 0xde, 0xad, 0xbe, 0xef])
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut sub).await,
            LinkEvent::SessionClosed {
                session: SessionId::new(3)
            }
        );
        assert!(matches!(
            session.write(UpdateVolumeMessage { master_volume: 1 }.into()),
            Err(SessionError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_publishes_once() {
        let (session, _server, events) = start_pair(4);
        let mut sub = events.subscribe();

        session.close();
        session.close();
        assert!(!session.is_alive());

        assert_eq!(
            next_event(&mut sub).await,
            LinkEvent::SessionClosed {
                session: SessionId::new(4)
            }
        );
        drop(session);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sub.try_recv().is_none());
    }
}
