//! TCP sessions, event delivery, and the retrying connection manager for companion-link.
//!
//! This crate owns everything between the typed messages of `link-wire` and
//! the application: a single [`Session`] per live connection, the
//! [`EventChannel`] that fans out status changes and inbound messages, and the
//! [`ConnectionManager`] state machine that drives connect, retry, login and
//! shutdown.
//!
//! ## Example
//!
//! ```rust,no_run
//! use link_session::{ClientConfig, ConnectionManager, LinkEvent};
//!
//! # async fn example() {
//! let manager = ConnectionManager::new(ClientConfig {
//!     server_host: "127.0.0.1".to_string(),
//!     server_port: 9000,
//!     connection_code: "ABCD".to_string(),
//! });
//! let mut events = manager.subscribe();
//!
//! manager.connect(3).await;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         LinkEvent::StatusChanged { status, message } => {
//!             println!("status: {} {:?}", status, message);
//!         }
//!         LinkEvent::MessageReceived { message, .. } => {
//!             println!("received {:?}", message.kind());
//!         }
//!         LinkEvent::SessionClosed { session } => {
//!             println!("session {} closed", session);
//!         }
//!     }
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod manager;
pub mod session;
pub mod transport;

// Re-export main types
pub use config::{ClientConfig, LinkSettings};
pub use device::{DeviceInfo, HostDeviceInfo, StaticDeviceInfo, CLIENT_VERSION};
pub use error::{SessionError, TransportError};
pub use events::{EventChannel, EventSubscriber, LinkEvent, LinkEventHandler};
pub use link_wire::{ConnectionStatus, Message};
pub use manager::{ConnectionManager, ConnectionManagerBuilder};
pub use session::{Session, SessionId};
pub use transport::{Connector, IoStream, TcpConnector};
