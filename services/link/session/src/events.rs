//! Event channel between the link and its consumers.
//!
//! Producers (sessions and the connection manager) publish [`LinkEvent`]s;
//! each subscriber owns an unbounded queue that preserves publish order, so
//! a slow consumer never drops events and never runs on the socket task.

use dashmap::DashMap;
use link_wire::{ConnectionStatus, Message};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::session::SessionId;

/// Events published on the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The connection state machine moved to `status`
    StatusChanged {
        /// New status
        status: ConnectionStatus,
        /// Optional human-readable detail (error text, reason)
        message: Option<String>,
    },
    /// A session decoded an inbound message
    MessageReceived {
        /// Session that received it
        session: SessionId,
        /// The decoded message
        message: Message,
    },
    /// A session's transport is gone; published exactly once per session
    SessionClosed {
        /// Session that closed
        session: SessionId,
    },
}

/// Multi-producer, multi-consumer event fan-out
#[derive(Debug, Clone, Default)]
pub struct EventChannel {
    subscribers: Arc<DashMap<u64, mpsc::UnboundedSender<LinkEvent>>>,
    next_subscriber: Arc<AtomicU64>,
}

impl EventChannel {
    /// Create an empty channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every live subscriber
    pub fn publish(&self, event: LinkEvent) {
        trace!("Publishing {:?}", event);
        self.subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// Register a new subscriber; it sees every event published from now on
    pub fn subscribe(&self) -> EventSubscriber {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, tx);
        debug!("Event subscriber {} registered", id);
        EventSubscriber { rx }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.iter().filter(|s| !s.value().is_closed()).count()
    }

    /// Run `handler` on its own task, delivering every subsequent event to it
    pub fn spawn_handler<H>(&self, mut handler: H) -> JoinHandle<()>
    where
        H: LinkEventHandler,
    {
        let mut events = self.subscribe();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    LinkEvent::StatusChanged { status, message } => {
                        handler.on_status_changed(status, message.as_deref())
                    }
                    LinkEvent::MessageReceived { session, message } => {
                        handler.on_message(session, &message)
                    }
                    LinkEvent::SessionClosed { session } => handler.on_session_closed(session),
                }
            }
            debug!("Event handler task ended");
        })
    }
}

/// Receiving end of one subscription
#[derive(Debug)]
pub struct EventSubscriber {
    rx: mpsc::UnboundedReceiver<LinkEvent>,
}

impl EventSubscriber {
    /// Wait for the next event; `None` once every producer is gone
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued
    pub fn try_recv(&mut self) -> Option<LinkEvent> {
        self.rx.try_recv().ok()
    }
}

/// Callback-style consumer for [`EventChannel::spawn_handler`]
pub trait LinkEventHandler: Send + 'static {
    /// Connection status changed
    fn on_status_changed(&mut self, _status: ConnectionStatus, _message: Option<&str>) {}
    /// An inbound message arrived
    fn on_message(&mut self, _session: SessionId, _message: &Message) {}
    /// A session closed
    fn on_session_closed(&mut self, _session: SessionId) {}
}
