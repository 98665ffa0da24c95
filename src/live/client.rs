//! Live-events (EventSub) client.
//!
//! [`LiveEventsClient`] is a handle to a background actor that owns up to
//! two sockets: the primary one and, during a server-initiated migration,
//! the superseded one that keeps delivering notifications until its grace
//! window ends.
//!
//! ```text
//! connect ──► open ──welcome──► subscribe (concurrently) ──► notifications
//!               ▲                                              │
//!               │ reconnect delay                   session_reconnect
//!               │                                              ▼
//!          close / watchdog                 open(reconnect_url), old socket
//!                                           retires after the grace window
//! ```
//!
//! Only the primary socket drives status and reconnects. A retiring
//! socket's close never schedules anything.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::message::{LiveMessage, Session};
use super::subscriptions::{map_event_type, subscription_requests};
use crate::connection::{next_message, sleep_until, ConnectionState, Socket};
use crate::constants;
use crate::context::ClientContext;
use crate::events::ChannelEvent;
use crate::rpc::{RpcProvider, SubscriptionRequest};
use crate::status::StatusListener;
use crate::transport::SocketMessage;

/// Tunables for a [`LiveEventsClient`].
#[derive(Debug, Clone)]
pub struct LiveSettings {
    /// Default socket URL.
    pub url: String,
    /// Delay before reconnecting after an unexpected close.
    pub reconnect_delay: Duration,
    /// Keepalive timeout assumed until a welcome announces one.
    pub default_keepalive: Duration,
    /// Grace added to the keepalive timeout before the watchdog fires.
    pub keepalive_grace: Duration,
    /// How long a superseded socket keeps receiving after a migration.
    pub handoff_grace: Duration,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            url: constants::EVENTSUB_URL.to_string(),
            reconnect_delay: constants::RECONNECT_DELAY,
            default_keepalive: constants::DEFAULT_KEEPALIVE_TIMEOUT,
            keepalive_grace: constants::KEEPALIVE_GRACE,
            handoff_grace: constants::RECONNECT_HANDOFF_GRACE,
        }
    }
}

/// Point-in-time view of a live-events client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveState {
    /// Broadcaster the client wants to follow.
    pub broadcaster_id: Option<String>,
    /// Current session id, set by the last welcome.
    pub session_id: Option<String>,
    /// `true` while a primary socket is open.
    pub connected: bool,
    /// Negotiated keepalive timeout.
    pub keepalive_timeout: Duration,
    /// `true` while a reconnect is pending.
    pub reconnect_pending: bool,
    /// `true` while a superseded socket is still open.
    pub handoff_pending: bool,
}

#[derive(Debug)]
enum LiveCommand {
    Connect {
        broadcaster_id: String,
        response_tx: oneshot::Sender<()>,
    },
    Disconnect {
        response_tx: oneshot::Sender<()>,
    },
    State {
        response_tx: oneshot::Sender<LiveState>,
    },
    Shutdown,
}

/// Handle to the live-events client.
///
/// Dropping the handle stops the actor and closes its sockets.
#[derive(Debug)]
pub struct LiveEventsClient {
    command_tx: mpsc::UnboundedSender<LiveCommand>,
    task: Option<JoinHandle<()>>,
}

impl LiveEventsClient {
    /// Spawn the actor on the current runtime.
    #[must_use]
    pub fn spawn(
        ctx: ClientContext,
        settings: LiveSettings,
        status: Arc<dyn StatusListener>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let actor = LiveActor::new(ctx, settings, status);
        let task = tokio::spawn(actor.run(command_rx));
        Self {
            command_tx,
            task: Some(task),
        }
    }

    /// Follow `broadcaster_id`, tearing down any previous session first.
    ///
    /// Resolves once the socket is open or the attempt failed and a
    /// reconnect was scheduled.
    ///
    /// # Errors
    ///
    /// Returns an error if the client has shut down.
    pub async fn connect(&self, broadcaster_id: &str) -> Result<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request(LiveCommand::Connect {
            broadcaster_id: broadcaster_id.to_string(),
            response_tx,
        })?;
        response_rx.await.map_err(|_| actor_gone())
    }

    /// Close every socket and cancel all timers. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns an error if the client has shut down.
    pub async fn disconnect(&self) -> Result<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request(LiveCommand::Disconnect { response_tx })?;
        response_rx.await.map_err(|_| actor_gone())
    }

    /// Snapshot of the client's state.
    ///
    /// # Errors
    ///
    /// Returns an error if the client has shut down.
    pub async fn state(&self) -> Result<LiveState> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request(LiveCommand::State { response_tx })?;
        response_rx.await.map_err(|_| actor_gone())
    }

    /// Stop the actor and wait for it to close its sockets.
    pub async fn shutdown(mut self) {
        let _ = self.command_tx.send(LiveCommand::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!("[EventSub] Actor task ended abnormally: {}", e);
            }
        }
    }

    fn request(&self, command: LiveCommand) -> Result<()> {
        self.command_tx.send(command).map_err(|_| actor_gone())
    }
}

impl Drop for LiveEventsClient {
    fn drop(&mut self) {
        let _ = self.command_tx.send(LiveCommand::Shutdown);
    }
}

fn actor_gone() -> anyhow::Error {
    anyhow!("live-events client has shut down")
}

/// Primary socket.
struct LiveSocket {
    socket: Socket,
    /// Opened from a `reconnect_url`; its welcome inherits subscriptions.
    migrated: bool,
}

/// Superseded socket draining during a migration.
struct Retiring {
    socket: Socket,
    close_at: Instant,
}

struct LiveActor {
    ctx: ClientContext,
    settings: LiveSettings,
    status: Arc<dyn StatusListener>,
    conn: ConnectionState<LiveSocket>,
    retiring: Option<Retiring>,
    keepalive_timeout: Duration,
    keepalive_at: Option<Instant>,
    session_id: Option<String>,
    registration: Option<JoinHandle<()>>,
}

impl LiveActor {
    fn new(ctx: ClientContext, settings: LiveSettings, status: Arc<dyn StatusListener>) -> Self {
        let keepalive_timeout = settings.default_keepalive;
        Self {
            ctx,
            settings,
            status,
            conn: ConnectionState::default(),
            retiring: None,
            keepalive_timeout,
            keepalive_at: None,
            session_id: None,
            registration: None,
        }
    }

    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<LiveCommand>) {
        loop {
            let keepalive_at = self.keepalive_at;
            let reconnect_at = self.conn.reconnect_at;
            let handoff_at = self.retiring.as_ref().map(|r| r.close_at);

            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(LiveCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                message = next_message(&mut self.conn.socket, |s| &mut s.socket.reader) => {
                    self.handle_primary(message).await;
                }
                message = next_message(&mut self.retiring, |r| &mut r.socket.reader) => {
                    self.handle_retiring(message).await;
                }
                () = sleep_until(keepalive_at) => {
                    log::warn!(
                        "[EventSub] No frame within {}ms, closing socket",
                        (self.keepalive_timeout + self.settings.keepalive_grace).as_millis()
                    );
                    self.on_primary_closed().await;
                }
                () = sleep_until(handoff_at) => {
                    if let Some(retiring) = self.retiring.take() {
                        log::info!("[EventSub] Handoff window over, closing previous socket");
                        retiring.socket.close("EventSub").await;
                    }
                }
                () = sleep_until(reconnect_at) => {
                    if self.conn.take_reconnect().is_some() {
                        log::info!("[EventSub] Reconnecting");
                        let url = self.settings.url.clone();
                        self.open(&url, false).await;
                    }
                }
            }
        }

        self.teardown().await;
        log::debug!("[EventSub] Actor stopped");
    }

    async fn handle_command(&mut self, command: LiveCommand) {
        match command {
            LiveCommand::Connect {
                broadcaster_id,
                response_tx,
            } => {
                self.connect(&broadcaster_id).await;
                let _ = response_tx.send(());
            }
            LiveCommand::Disconnect { response_tx } => {
                self.teardown().await;
                let _ = response_tx.send(());
            }
            LiveCommand::State { response_tx } => {
                let _ = response_tx.send(self.state());
            }
            LiveCommand::Shutdown => {}
        }
    }

    fn state(&self) -> LiveState {
        LiveState {
            broadcaster_id: self.conn.target.clone(),
            session_id: self.session_id.clone(),
            connected: self.conn.socket.is_some(),
            keepalive_timeout: self.keepalive_timeout,
            reconnect_pending: self.conn.reconnect_at.is_some(),
            handoff_pending: self.retiring.is_some(),
        }
    }

    async fn connect(&mut self, broadcaster_id: &str) {
        self.teardown().await;

        let broadcaster_id = broadcaster_id.trim();
        if broadcaster_id.is_empty() {
            log::warn!("[EventSub] Ignoring connect without broadcaster id");
            return;
        }

        self.keepalive_timeout = self.settings.default_keepalive;
        self.conn.retarget(broadcaster_id.to_string());
        let url = self.settings.url.clone();
        self.open(&url, false).await;
    }

    /// Deliberate disconnect. Idempotent.
    async fn teardown(&mut self) {
        self.abort_registration();
        if let Some(primary) = self.conn.release() {
            log::info!("[EventSub] Disconnecting");
            primary.socket.close("EventSub").await;
        }
        if let Some(retiring) = self.retiring.take() {
            retiring.socket.close("EventSub").await;
        }
        self.keepalive_at = None;
        self.session_id = None;
        self.status.set_connected(false);
    }

    async fn open(&mut self, url: &str, migrated: bool) {
        match self.ctx.connector.connect(url).await {
            Ok((writer, reader)) => {
                log::info!("[EventSub] Connected to {}", url);
                self.conn.socket = Some(LiveSocket {
                    socket: Socket { writer, reader },
                    migrated,
                });
                self.reset_keepalive();
            }
            Err(e) => {
                log::warn!("[EventSub] Connection to {} failed: {:#}", url, e);
                self.keepalive_at = None;
                self.status.set_connected(false);
                self.schedule_reconnect();
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.conn.schedule_reconnect(self.settings.reconnect_delay) {
            log::info!(
                "[EventSub] Reconnecting in {}ms",
                self.settings.reconnect_delay.as_millis()
            );
        }
    }

    fn reset_keepalive(&mut self) {
        let now = Instant::now();
        let deadline = self
            .keepalive_timeout
            .checked_add(self.settings.keepalive_grace)
            .and_then(|window| now.checked_add(window))
            .unwrap_or_else(|| {
                log::warn!("[EventSub] Keepalive window out of range, using the maximum");
                now + constants::MAX_KEEPALIVE_TIMEOUT + constants::KEEPALIVE_GRACE
            });
        self.keepalive_at = Some(deadline);
    }

    fn abort_registration(&mut self) {
        if let Some(task) = self.registration.take() {
            task.abort();
        }
    }

    /// Close path for the primary socket (server close, error, watchdog).
    async fn on_primary_closed(&mut self) {
        if let Some(primary) = self.conn.socket.take() {
            primary.socket.close("EventSub").await;
        }
        self.abort_registration();
        self.keepalive_at = None;
        self.session_id = None;
        self.status.set_connected(false);
        self.schedule_reconnect();
    }

    async fn handle_primary(&mut self, message: Option<Result<SocketMessage>>) {
        match message {
            Some(Ok(SocketMessage::Text(frame))) => {
                self.reset_keepalive();
                match LiveMessage::decode(&frame) {
                    Ok(message) => self.handle_message(message).await,
                    Err(e) => log::warn!("[EventSub] Dropping frame: {:#}", e),
                }
            }
            Some(Ok(SocketMessage::Ping(data))) => {
                self.reset_keepalive();
                if let Some(primary) = self.conn.socket.as_mut() {
                    if let Err(e) = primary.socket.writer.send_pong(data).await {
                        log::debug!("[EventSub] Pong failed: {:#}", e);
                    }
                }
            }
            Some(Ok(SocketMessage::Close { code, reason })) => {
                log::info!("[EventSub] Server closed connection ({}): {}", code, reason);
                self.on_primary_closed().await;
            }
            Some(Err(e)) => {
                log::warn!("[EventSub] Socket error: {:#}", e);
                self.on_primary_closed().await;
            }
            None => {
                log::info!("[EventSub] Connection closed");
                self.on_primary_closed().await;
            }
        }
    }

    /// Frames on the superseded socket: only notifications matter.
    async fn handle_retiring(&mut self, message: Option<Result<SocketMessage>>) {
        match message {
            Some(Ok(SocketMessage::Text(frame))) => match LiveMessage::decode(&frame) {
                Ok(message @ LiveMessage::Notification { .. }) => self.publish(message),
                Ok(_) => {}
                Err(e) => log::warn!("[EventSub] Dropping frame: {:#}", e),
            },
            Some(Ok(SocketMessage::Ping(data))) => {
                if let Some(retiring) = self.retiring.as_mut() {
                    let _ = retiring.socket.writer.send_pong(data).await;
                }
            }
            Some(Ok(SocketMessage::Close { .. }) | Err(_)) | None => {
                if let Some(retiring) = self.retiring.take() {
                    log::debug!("[EventSub] Previous socket closed");
                    retiring.socket.close("EventSub").await;
                }
            }
        }
    }

    async fn handle_message(&mut self, message: LiveMessage) {
        match message {
            LiveMessage::Welcome(session) => self.on_welcome(session),
            LiveMessage::Reconnect(session) => self.on_reconnect(session).await,
            message @ LiveMessage::Notification { .. } => self.publish(message),
            LiveMessage::Keepalive => log::trace!("[EventSub] Keepalive"),
            LiveMessage::Revocation {
                subscription_type,
                status,
            } => {
                log::warn!(
                    "[EventSub] Subscription {} revoked: {}",
                    subscription_type,
                    status
                );
            }
            LiveMessage::Other(kind) => log::debug!("[EventSub] Ignoring {} frame", kind),
        }
    }

    fn on_welcome(&mut self, session: Session) {
        if let Some(seconds) = session.keepalive_timeout_seconds.filter(|s| *s > 0) {
            self.keepalive_timeout =
                Duration::from_secs(seconds).min(constants::MAX_KEEPALIVE_TIMEOUT);
            self.reset_keepalive();
        }
        log::info!(
            "[EventSub] Session {} welcomed (keepalive {}s)",
            session.id,
            self.keepalive_timeout.as_secs()
        );
        self.session_id = Some(session.id.clone());
        self.status.set_connected(true);

        let migrated = self.conn.socket.as_ref().is_some_and(|s| s.migrated);
        if migrated {
            log::info!("[EventSub] Session migrated, subscriptions carried over");
            return;
        }

        let Some(broadcaster_id) = self.conn.target.clone() else {
            return;
        };
        self.abort_registration();
        let requests = subscription_requests(&session.id, &broadcaster_id);
        let rpc = Arc::clone(&self.ctx.rpc);
        self.registration = Some(tokio::spawn(register_all(rpc, requests)));
    }

    async fn on_reconnect(&mut self, session: Session) {
        let Some(url) = session.reconnect_url.filter(|u| !u.is_empty()) else {
            log::warn!("[EventSub] Reconnect frame without URL, ignoring");
            return;
        };
        let Some(previous) = self.conn.socket.take() else {
            return;
        };

        if let Some(older) = self.retiring.take() {
            older.socket.close("EventSub").await;
        }
        log::info!("[EventSub] Server requested migration");
        self.retiring = Some(Retiring {
            socket: previous.socket,
            close_at: Instant::now() + self.settings.handoff_grace,
        });
        self.open(&url, true).await;
    }

    fn publish(&self, message: LiveMessage) {
        let LiveMessage::Notification {
            subscription_type,
            event,
        } = message
        else {
            return;
        };
        match map_event_type(&subscription_type) {
            Some(kind) => self.ctx.bus.publish(&ChannelEvent::now(kind, event)),
            None => log::debug!("[EventSub] Unmapped notification {}", subscription_type),
        }
    }
}

/// Register every subscription concurrently. Failures are logged one by one
/// and never affect the others.
async fn register_all(rpc: Arc<dyn RpcProvider>, requests: Vec<SubscriptionRequest>) {
    let results = join_all(requests.iter().map(|request| rpc.subscribe(request))).await;

    let mut registered = 0;
    for (request, result) in requests.iter().zip(results) {
        match result {
            Ok(()) => registered += 1,
            Err(e) => log::warn!(
                "[EventSub] Subscribe failed for {}: {:#}",
                request.event_type,
                e
            ),
        }
    }
    log::info!(
        "[EventSub] {}/{} subscriptions registered",
        registered,
        requests.len()
    );
}
