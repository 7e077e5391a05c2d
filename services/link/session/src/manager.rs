//! Connection manager: state machine, connect-with-retry, and typed sends.
//!
//! The manager owns the current [`Session`], the connect worker and the
//! [`ConnectionStatus`]. All three are written only here, always tearing the
//! old resource down before installing a new one:
//!
//! - `lifecycle` serializes [`ConnectionManager::connect`] and
//!   [`ConnectionManager::shutdown`], so at most one worker ever runs.
//! - `state` guards status and session; status events are published while it
//!   is held, so consumers observe transitions in the order they happened.
//!
//! Reactions to inbound traffic (login results, closed sessions) run on a
//! dispatcher task subscribed to the [`EventChannel`], never on a socket task.

use link_wire::{
    ButtonClickedMessage, CodecFactory, CommandMessage, ConnectionStatus, DeviceLoginMessage,
    JsonCodecFactory, LoginStateMessage, Message, PhotoMessage, TextDataMessage,
    ToggleMuteMessage, UpdateVolumeMessage,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, LinkSettings};
use crate::device::{DeviceInfo, HostDeviceInfo};
use crate::events::{EventChannel, EventSubscriber, LinkEvent};
use crate::session::{Session, SessionId};
use crate::transport::{Connector, IoStream, TcpConnector};

/// Mutable link state guarded by one lock
#[derive(Debug, Default)]
struct LinkState {
    status: ConnectionStatus,
    session: Option<Session>,
    /// Session closed by `shutdown`, whose closed notification is still due
    draining: Option<SessionId>,
}

/// A running connect-and-retry task
struct ConnectWorker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ConnectWorker {
    /// Interrupt the worker and wait for it to exit
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                warn!("Connect worker panicked: {}", e);
            }
        }
    }
}

struct Inner {
    config: RwLock<Arc<ClientConfig>>,
    settings: LinkSettings,
    connector: Arc<dyn Connector>,
    codec_factory: Arc<dyn CodecFactory>,
    device_info: Arc<dyn DeviceInfo>,
    events: EventChannel,
    state: Mutex<LinkState>,
    lifecycle: Mutex<Option<ConnectWorker>>,
    /// Parent of every worker token; cancelled when the last handle drops
    workers: CancellationToken,
    next_session_id: AtomicU64,
}

/// Builder for [`ConnectionManager`]
pub struct ConnectionManagerBuilder {
    config: ClientConfig,
    settings: LinkSettings,
    connector: Option<Arc<dyn Connector>>,
    codec_factory: Option<Arc<dyn CodecFactory>>,
    device_info: Option<Arc<dyn DeviceInfo>>,
    events: Option<EventChannel>,
}

impl ConnectionManagerBuilder {
    /// Override connection tunables
    pub fn settings(mut self, settings: LinkSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Dial through a custom transport
    pub fn connector<C: Connector + 'static>(mut self, connector: C) -> Self {
        let connector: Arc<dyn Connector> = Arc::new(connector);
        self.connector = Some(connector);
        self
    }

    /// Use a different wire format
    pub fn codec_factory<F: CodecFactory>(mut self, factory: F) -> Self {
        let factory: Arc<dyn CodecFactory> = Arc::new(factory);
        self.codec_factory = Some(factory);
        self
    }

    /// Source of the login device descriptor
    pub fn device_info<D: DeviceInfo + 'static>(mut self, device_info: D) -> Self {
        let device_info: Arc<dyn DeviceInfo> = Arc::new(device_info);
        self.device_info = Some(device_info);
        self
    }

    /// Publish on an existing event channel
    pub fn event_channel(mut self, events: EventChannel) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the manager and start its dispatcher task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> ConnectionManager {
        let max_frame_size = self.settings.max_frame_size;
        let codec_factory = self.codec_factory.unwrap_or_else(|| {
            Arc::new(JsonCodecFactory::new(max_frame_size)) as Arc<dyn CodecFactory>
        });
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(TcpConnector) as Arc<dyn Connector>);
        let device_info = self
            .device_info
            .unwrap_or_else(|| Arc::new(HostDeviceInfo) as Arc<dyn DeviceInfo>);
        let events = self.events.unwrap_or_default();
        let workers = CancellationToken::new();
        let handle_guard = Arc::new(workers.clone().drop_guard());

        let inner = Arc::new(Inner {
            config: RwLock::new(Arc::new(self.config)),
            settings: self.settings,
            connector,
            codec_factory,
            device_info,
            events,
            state: Mutex::new(LinkState::default()),
            lifecycle: Mutex::new(None),
            workers,
            next_session_id: AtomicU64::new(1),
        });

        let subscriber = inner.events.subscribe();
        tokio::spawn(dispatch(Arc::downgrade(&inner), subscriber));

        ConnectionManager {
            inner,
            _handles: handle_guard,
        }
    }
}

/// Drives the link to the companion peer.
///
/// Clones share one link. Dropping the last clone stops any connect worker;
/// the session is closed once that worker has exited.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
    _handles: Arc<DropGuard>,
}

impl ConnectionManager {
    /// Manager with TCP transport, JSON codec and host device info
    pub fn new(config: ClientConfig) -> Self {
        Self::builder(config).build()
    }

    /// Start building a manager
    pub fn builder(config: ClientConfig) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder {
            config,
            settings: LinkSettings::default(),
            connector: None,
            codec_factory: None,
            device_info: None,
            events: None,
        }
    }

    /// Subscribe to status, message and session events
    pub fn subscribe(&self) -> EventSubscriber {
        self.inner.events.subscribe()
    }

    /// The channel this manager publishes on
    pub fn event_channel(&self) -> &EventChannel {
        &self.inner.events
    }

    /// Replace the configuration; takes effect on the next connect
    pub async fn set_config(&self, config: ClientConfig) {
        info!("Client configuration updated for {}", config.endpoint());
        *self.inner.config.write().await = Arc::new(config);
    }

    /// Current configuration snapshot
    pub async fn config(&self) -> Arc<ClientConfig> {
        self.inner.config.read().await.clone()
    }

    /// Current connection status
    pub async fn status(&self) -> ConnectionStatus {
        self.inner.state.lock().await.status
    }

    /// Whether a session exists and its transport is alive
    pub async fn is_connected(&self) -> bool {
        let state = self.inner.state.lock().await;
        state.session.as_ref().is_some_and(Session::is_alive)
    }

    /// Start connecting with up to `retry_limit` attempts.
    ///
    /// Any previous worker and session are torn down first. Returns as soon
    /// as the new worker is running; progress is reported through status
    /// events only.
    pub async fn connect(&self, retry_limit: i32) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if let Some(worker) = lifecycle.take() {
            debug!("Superseding previous connect worker");
            worker.stop().await;
        }

        {
            let mut state = self.inner.state.lock().await;
            state.draining = None;
            if let Some(session) = state.session.take() {
                info!("Closing session {} to reconnect", session.id());
                session.close();
            }
            if state.status != ConnectionStatus::Disconnected {
                self.inner.transition(
                    &mut state,
                    ConnectionStatus::Disconnected,
                    Some("reconnecting".to_string()),
                );
            }
        }

        let cancel = self.inner.workers.child_token();
        let handle = tokio::spawn(self.inner.clone().run_connect(retry_limit, cancel.clone()));
        *lifecycle = Some(ConnectWorker { cancel, handle });
    }

    /// Stop any connect worker and close the session. Safe to call repeatedly.
    ///
    /// Emits no status event itself: closing a session produces a
    /// [`LinkEvent::SessionClosed`] that moves the status to Disconnected,
    /// and an interrupted connect attempt settles to Disconnected on exit.
    pub async fn shutdown(&self) {
        debug!("Shutting down connection");
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if let Some(worker) = lifecycle.take() {
            worker.stop().await;
        }

        let mut state = self.inner.state.lock().await;
        if let Some(session) = state.session.take() {
            info!("Closing session {}", session.id());
            session.close();
            state.draining = Some(session.id());
        }
    }

    /// Send any message to the peer if connected; otherwise log and drop it
    pub async fn send_message(&self, message: Message) {
        let state = self.inner.state.lock().await;
        match state.session.as_ref().filter(|s| s.is_alive()) {
            Some(session) => {
                let kind = message.kind();
                if let Err(e) = session.write(message) {
                    warn!("Failed to queue {:?} on session {}: {}", kind, session.id(), e);
                }
            }
            None => {
                warn!(
                    "Not connected to the companion, dropping {:?} message",
                    message.kind()
                );
            }
        }
    }

    /// Send the login message for the current configuration
    pub async fn send_login(&self) {
        let config = self.config().await;
        let login = self.inner.login_message(&config);
        self.send_message(login).await;
    }

    /// Toggle the peer's master mute
    pub async fn send_toggle_mute(&self) {
        self.send_message(ToggleMuteMessage {}.into()).await;
    }

    /// Set the peer's master volume
    pub async fn send_update_volume(&self, level: i32) {
        self.send_message(UpdateVolumeMessage { master_volume: level }.into())
            .await;
    }

    /// Report a button press
    pub async fn send_button_click(&self, index: i32) {
        self.send_message(ButtonClickedMessage { button_index: index }.into())
            .await;
    }

    /// Send a typed text payload
    pub async fn send_text(&self, data_type: i32, text: impl Into<String>) {
        self.send_message(
            TextDataMessage {
                data_type,
                data: text.into(),
            }
            .into(),
        )
        .await;
    }

    /// Send a generic command
    pub async fn send_command(&self, command: impl Into<String>, data: impl Into<String>) {
        self.send_message(
            CommandMessage {
                command: command.into(),
                data: data.into(),
            }
            .into(),
        )
        .await;
    }

    /// Ask the peer to resend its current state
    pub async fn request_resend_state(&self) {
        self.send_message(CommandMessage::resend_state().into()).await;
    }

    /// Upload a photo; `content` is base64-encoded on the way out
    pub async fn send_photo(&self, file_name: impl Into<String>, content: &[u8]) {
        self.send_message(PhotoMessage::from_bytes(file_name, content).into())
            .await;
    }
}

impl Inner {
    /// Commit a status change and publish it while the state lock is held
    fn transition(&self, state: &mut LinkState, status: ConnectionStatus, message: Option<String>) {
        info!(
            "Connection status {} -> {}{}",
            state.status,
            status,
            message
                .as_deref()
                .map(|m| format!(" ({})", m))
                .unwrap_or_default()
        );
        state.status = status;
        self.events
            .publish(LinkEvent::StatusChanged { status, message });
    }

    fn login_message(&self, config: &ClientConfig) -> Message {
        DeviceLoginMessage {
            connection_code: config.connection_code.clone(),
            version: self.device_info.client_version(),
            device_name: self.device_info.descriptor(),
        }
        .into()
    }

    /// The connect-and-retry routine; runs on its own task
    async fn run_connect(self: Arc<Self>, retry_limit: i32, cancel: CancellationToken) {
        let config = self.config.read().await.clone();

        if retry_limit <= 0 {
            let mut state = self.state.lock().await;
            self.transition(
                &mut state,
                ConnectionStatus::Disconnected,
                Some(format!("no connect attempts allowed (retry limit {})", retry_limit)),
            );
            return;
        }

        let mut last_error: Option<String> = None;
        for attempt in 1..=retry_limit {
            if attempt > 1 {
                tokio::select! {
                    _ = cancel.cancelled() => return self.abandon().await,
                    _ = tokio::time::sleep(self.settings.retry_delay()) => {}
                }
            }

            {
                let mut state = self.state.lock().await;
                if cancel.is_cancelled() {
                    drop(state);
                    return self.abandon().await;
                }
                let detail = last_error
                    .as_ref()
                    .map(|e| format!("attempt {}/{} after: {}", attempt, retry_limit, e));
                self.transition(&mut state, ConnectionStatus::Connecting, detail);
            }

            info!(
                "Connecting to {} (attempt {}/{})",
                config.endpoint(),
                attempt,
                retry_limit
            );
            let result = tokio::select! {
                _ = cancel.cancelled() => return self.abandon().await,
                result = self.connector.connect(
                    &config.server_host,
                    config.server_port,
                    self.settings.connect_timeout(),
                ) => result,
            };

            match result {
                Ok(stream) => {
                    self.install_session(stream, &config, &cancel).await;
                    return;
                }
                Err(e) => {
                    warn!(
                        "Connect to {} failed (attempt {}/{}): {}",
                        config.endpoint(),
                        attempt,
                        retry_limit,
                        e
                    );
                    last_error = Some(e.to_string());
                }
            }
        }

        let mut state = self.state.lock().await;
        self.transition(&mut state, ConnectionStatus::Disconnected, last_error);
    }

    /// Install a freshly connected session, enter Connected and send login
    async fn install_session(
        &self,
        stream: IoStream,
        config: &ClientConfig,
        cancel: &CancellationToken,
    ) {
        // Held until the session is installed, so its close is always matched
        let mut state = self.state.lock().await;
        if cancel.is_cancelled() {
            debug!("Connect cancelled after transport came up; dropping stream");
            drop(state);
            return self.abandon().await;
        }

        let id = SessionId::new(self.next_session_id.fetch_add(1, Ordering::Relaxed));
        let session = Session::start(
            id,
            stream,
            self.codec_factory.as_ref(),
            self.events.clone(),
            self.settings.read_buffer_size,
        );

        info!("Connected to {} (session {})", config.endpoint(), id);
        state.session = Some(session);
        self.transition(&mut state, ConnectionStatus::Connected, None);

        let login = self.login_message(config);
        if let Some(session) = state.session.as_ref() {
            if let Err(e) = session.write(login) {
                warn!("Failed to queue login on session {}: {}", id, e);
            }
        }
    }

    /// Settle an interrupted connect attempt
    async fn abandon(&self) {
        let mut state = self.state.lock().await;
        if state.status == ConnectionStatus::Connecting {
            self.transition(
                &mut state,
                ConnectionStatus::Disconnected,
                Some("connect cancelled".to_string()),
            );
        }
    }

    async fn handle_login_state(&self, session: SessionId, login: LoginStateMessage) {
        let mut state = self.state.lock().await;
        if state.session.as_ref().map(Session::id) != Some(session) {
            debug!("Ignoring login state from stale session {}", session);
            return;
        }
        if state.status != ConnectionStatus::Connected {
            debug!(
                "Ignoring login state on session {} while {}",
                session, state.status
            );
            return;
        }

        if login.is_logged_in {
            info!("Login accepted by companion");
            self.transition(&mut state, ConnectionStatus::LoggedIn, login.error_message);
        } else {
            warn!(
                "Login rejected by companion: {}",
                login.error_message.as_deref().unwrap_or("no reason given")
            );
            self.transition(&mut state, ConnectionStatus::LoginFailed, login.error_message);
        }
    }

    async fn handle_session_closed(&self, session: SessionId) {
        let mut state = self.state.lock().await;
        if state.session.as_ref().map(Session::id) == Some(session) {
            state.session = None;
            self.transition(
                &mut state,
                ConnectionStatus::Disconnected,
                Some("session closed".to_string()),
            );
        } else if state.draining == Some(session) {
            state.draining = None;
            self.transition(
                &mut state,
                ConnectionStatus::Disconnected,
                Some("session closed".to_string()),
            );
        } else {
            debug!("Ignoring close of superseded session {}", session);
        }
    }
}

/// Manager-side consumer of the event channel
async fn dispatch(inner: Weak<Inner>, mut events: EventSubscriber) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match event {
            LinkEvent::MessageReceived {
                session,
                message: Message::LoginState(login),
            } => inner.handle_login_state(session, login).await,
            LinkEvent::MessageReceived { session, message } => {
                debug!("Session {} delivered {:?}", session, message.kind());
            }
            LinkEvent::SessionClosed { session } => inner.handle_session_closed(session).await,
            LinkEvent::StatusChanged { .. } => {}
        }
    }
    debug!("Connection manager dispatcher ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransportError;
    use async_trait::async_trait;
    use std::time::Duration;

    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, _: &str, _: u16, _: Duration) -> Result<IoStream, TransportError> {
            Err(TransportError::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            )))
        }
    }

    fn manager() -> ConnectionManager {
        ConnectionManager::builder(ClientConfig::default())
            .connector(RefusingConnector)
            .build()
    }

    #[tokio::test]
    async fn test_initial_state() {
        let manager = manager();
        assert_eq!(manager.status().await, ConnectionStatus::Disconnected);
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_shutdown_from_disconnected_is_noop() {
        let manager = manager();
        let mut events = manager.subscribe();
        manager.shutdown().await;
        manager.shutdown().await;

        assert_eq!(manager.status().await, ConnectionStatus::Disconnected);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_set_config_replaces_snapshot() {
        let manager = manager();
        let before = manager.config().await;
        manager
            .set_config(ClientConfig {
                server_host: "192.168.1.20".to_string(),
                server_port: 668,
                connection_code: "WXYZ".to_string(),
            })
            .await;

        assert_eq!(before.connection_code, "");
        assert_eq!(manager.config().await.connection_code, "WXYZ");
    }

    #[tokio::test]
    async fn test_login_message_uses_device_info() {
        let manager = ConnectionManager::builder(ClientConfig {
            connection_code: "ABCD".to_string(),
            ..ClientConfig::default()
        })
        .device_info(crate::StaticDeviceInfo::new("Pixel 8(Google shiba)"))
        .connector(RefusingConnector)
        .build();

        let config = manager.config().await;
        let login = manager.inner.login_message(&config);
        assert_eq!(
            login,
            DeviceLoginMessage {
                connection_code: "ABCD".to_string(),
                version: crate::CLIENT_VERSION.to_string(),
                device_name: "Pixel 8(Google shiba)".to_string(),
            }
            .into()
        );
    }
}
