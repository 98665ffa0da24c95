//! Chat protocol client.
//!
//! [`ChatClient`] is a handle to a background actor that owns the chat
//! socket. Every state change happens inside the actor loop:
//!
//! ```text
//! ChatClient ──ChatCommand──► ChatActor ◄──lines── socket
//!                                 │
//!                                 ├─► EventBus (chat / join / part)
//!                                 ├─► ChatHistory
//!                                 └─► StatusListener
//! ```
//!
//! An unexpected close schedules exactly one reconnect after the configured
//! delay. [`ChatClient::disconnect`] cancels it and ignores late closes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::colour::default_colour_for_username;
use super::commands::{CommandResponder, CustomCommand};
use super::echo::EchoTracker;
use super::history::ChatHistory;
use super::message::ChatMessage;
use super::parse::{classify_line, ChatLine, Privmsg};
use crate::connection::{next_message, sleep_until, ConnectionState, Socket};
use crate::constants;
use crate::context::ClientContext;
use crate::events::{ChannelEvent, ChannelEventType, EventData, Subscription};
use crate::rpc::ChatCredentials;
use crate::status::StatusListener;
use crate::transport::SocketMessage;

/// Tunables for a [`ChatClient`].
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Chat socket URL.
    pub url: String,
    /// Delay before reconnecting after an unexpected close.
    pub reconnect_delay: Duration,
    /// How long a sent message is remembered for echo suppression.
    pub echo_ttl: Duration,
    /// Cooldown shared by all commands.
    pub command_cooldown: Duration,
    /// Configured chat commands.
    pub commands: Vec<CustomCommand>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            url: constants::CHAT_URL.to_string(),
            reconnect_delay: constants::RECONNECT_DELAY,
            echo_ttl: constants::ECHO_TTL,
            command_cooldown: constants::COMMAND_COOLDOWN,
            commands: Vec::new(),
        }
    }
}

/// Point-in-time view of a chat client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatState {
    /// Normalized channel the client wants to be in.
    pub channel: Option<String>,
    /// Nick of the current login.
    pub nick: Option<String>,
    /// `true` when logged in with credentials.
    pub authenticated: bool,
    /// Our own name colour as reported by the server.
    pub colour: Option<String>,
    /// `true` while a socket is open.
    pub connected: bool,
    /// `true` while a reconnect is pending.
    pub reconnect_pending: bool,
}

/// Commands sent from a [`ChatClient`] handle to its actor.
#[derive(Debug)]
enum ChatCommand {
    Connect {
        channel: String,
        response_tx: oneshot::Sender<()>,
    },
    Disconnect {
        response_tx: oneshot::Sender<()>,
    },
    Send {
        text: String,
        response_tx: oneshot::Sender<bool>,
    },
    State {
        response_tx: oneshot::Sender<ChatState>,
    },
    Shutdown,
}

/// Handle to the chat protocol client.
///
/// Dropping the handle stops the actor and closes its socket.
#[derive(Debug)]
pub struct ChatClient {
    command_tx: mpsc::UnboundedSender<ChatCommand>,
    task: Option<JoinHandle<()>>,
}

impl ChatClient {
    /// Spawn the actor on the current runtime.
    #[must_use]
    pub fn spawn(
        ctx: ClientContext,
        settings: ChatSettings,
        status: Arc<dyn StatusListener>,
        history: Arc<dyn ChatHistory>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let actor = ChatActor::new(ctx, settings, status, history);
        let task = tokio::spawn(actor.run(command_rx));
        Self {
            command_tx,
            task: Some(task),
        }
    }

    /// Join `channel`, tearing down any previous connection first.
    ///
    /// The channel is lowercased and a leading `#` removed; an empty name
    /// only disconnects. Resolves once the login lines have been written or
    /// the attempt failed and a reconnect was scheduled.
    ///
    /// # Errors
    ///
    /// Returns an error if the client has shut down.
    pub async fn connect(&self, channel: &str) -> Result<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request(ChatCommand::Connect {
            channel: channel.to_string(),
            response_tx,
        })?;
        response_rx.await.map_err(|_| actor_gone())
    }

    /// Leave the channel, close the socket and cancel any pending reconnect.
    ///
    /// # Errors
    ///
    /// Returns an error if the client has shut down.
    pub async fn disconnect(&self) -> Result<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request(ChatCommand::Disconnect { response_tx })?;
        response_rx.await.map_err(|_| actor_gone())
    }

    /// Send `text` to the current channel.
    ///
    /// Returns `false` without sending when no socket is open.
    ///
    /// # Errors
    ///
    /// Returns an error if the client has shut down.
    pub async fn send_chat_message(&self, text: &str) -> Result<bool> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request(ChatCommand::Send {
            text: text.to_string(),
            response_tx,
        })?;
        response_rx.await.map_err(|_| actor_gone())
    }

    /// Snapshot of the client's state.
    ///
    /// # Errors
    ///
    /// Returns an error if the client has shut down.
    pub async fn state(&self) -> Result<ChatState> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request(ChatCommand::State { response_tx })?;
        response_rx.await.map_err(|_| actor_gone())
    }

    /// Stop the actor and wait for it to close its socket.
    pub async fn shutdown(mut self) {
        let _ = self.command_tx.send(ChatCommand::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!("[Chat] Actor task ended abnormally: {}", e);
            }
        }
    }

    fn request(&self, command: ChatCommand) -> Result<()> {
        self.command_tx.send(command).map_err(|_| actor_gone())
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        let _ = self.command_tx.send(ChatCommand::Shutdown);
    }
}

fn actor_gone() -> anyhow::Error {
    anyhow!("chat client has shut down")
}

/// Line breaks would end the `PRIVMSG` early and start a new command.
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// Login identity of the current socket.
#[derive(Debug, Clone)]
struct Login {
    /// Lowercased nick, compared against message prefixes.
    nick: String,
    /// Name shown on our own outbound messages.
    display_name: String,
    authenticated: bool,
}

impl Login {
    fn authenticated(credentials: &ChatCredentials) -> Self {
        Self {
            nick: credentials.username.to_lowercase(),
            display_name: credentials.username.clone(),
            authenticated: true,
        }
    }

    fn anonymous() -> Self {
        Self {
            nick: constants::ANONYMOUS_NICK.to_string(),
            display_name: constants::ANONYMOUS_NICK.to_string(),
            authenticated: false,
        }
    }

    fn lines(credentials: Option<&ChatCredentials>, channel: &str) -> Vec<String> {
        let mut lines = Vec::with_capacity(4);
        match credentials {
            Some(credentials) => {
                lines.push(constants::CAPS_AUTHENTICATED.to_string());
                lines.push(format!("PASS oauth:{}", credentials.token));
                lines.push(format!("NICK {}", credentials.username));
            }
            None => {
                lines.push(constants::CAPS_ANONYMOUS.to_string());
                lines.push(format!("NICK {}", constants::ANONYMOUS_NICK));
            }
        }
        lines.push(format!("JOIN #{channel}"));
        lines
    }
}

struct ChatActor {
    ctx: ClientContext,
    settings: ChatSettings,
    status: Arc<dyn StatusListener>,
    history: Arc<dyn ChatHistory>,
    conn: ConnectionState<Socket>,
    login: Option<Login>,
    colour: Option<String>,
    echo: EchoTracker,
    responder: CommandResponder,
    stats_subscription: Subscription,
}

impl ChatActor {
    fn new(
        ctx: ClientContext,
        settings: ChatSettings,
        status: Arc<dyn StatusListener>,
        history: Arc<dyn ChatHistory>,
    ) -> Self {
        let responder =
            CommandResponder::new(settings.commands.clone(), settings.command_cooldown);
        let stats_subscription = responder.track(&ctx.bus);
        let echo = EchoTracker::new(settings.echo_ttl);
        Self {
            ctx,
            settings,
            status,
            history,
            conn: ConnectionState::default(),
            login: None,
            colour: None,
            echo,
            responder,
            stats_subscription,
        }
    }

    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<ChatCommand>) {
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(ChatCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                message = next_message(&mut self.conn.socket, |s| &mut s.reader) => {
                    self.handle_socket(message).await;
                }
                () = sleep_until(self.conn.reconnect_at) => {
                    if let Some(channel) = self.conn.take_reconnect() {
                        log::info!("[Chat] Reconnecting to #{}", channel);
                        self.open(&channel).await;
                    }
                }
            }
        }

        self.teardown().await;
        self.stats_subscription.unsubscribe();
        log::debug!("[Chat] Actor stopped");
    }

    async fn handle_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::Connect {
                channel,
                response_tx,
            } => {
                self.connect(&channel).await;
                let _ = response_tx.send(());
            }
            ChatCommand::Disconnect { response_tx } => {
                self.teardown().await;
                let _ = response_tx.send(());
            }
            ChatCommand::Send { text, response_tx } => {
                let sent = self.send_chat_message(&text).await;
                let _ = response_tx.send(sent);
            }
            ChatCommand::State { response_tx } => {
                let _ = response_tx.send(self.state());
            }
            ChatCommand::Shutdown => {}
        }
    }

    fn state(&self) -> ChatState {
        ChatState {
            channel: self.conn.target.clone(),
            nick: self.login.as_ref().map(|l| l.nick.clone()),
            authenticated: self.login.as_ref().is_some_and(|l| l.authenticated),
            colour: self.colour.clone(),
            connected: self.conn.socket.is_some(),
            reconnect_pending: self.conn.reconnect_at.is_some(),
        }
    }

    async fn connect(&mut self, channel: &str) {
        self.teardown().await;

        let channel = normalize_channel(channel);
        if channel.is_empty() {
            log::warn!("[Chat] Ignoring connect to empty channel");
            return;
        }

        self.conn.retarget(channel.clone());
        self.open(&channel).await;
    }

    /// Close the socket, cancel reconnects and forget the login.
    async fn teardown(&mut self) {
        if let Some(socket) = self.conn.release() {
            log::info!("[Chat] Disconnecting");
            socket.close("Chat").await;
        }
        self.login = None;
        self.echo.clear();
        self.status.set_connected(false);
    }

    /// Open a socket to the chat server and log in to `channel`.
    async fn open(&mut self, channel: &str) {
        let (writer, reader) = match self.ctx.connector.connect(&self.settings.url).await {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("[Chat] Connection failed: {:#}", e);
                self.schedule_reconnect();
                return;
            }
        };
        let mut socket = Socket { writer, reader };

        let credentials = match self.ctx.rpc.fetch_chat_credentials().await {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                log::warn!("[Chat] Auth failed, falling back to anonymous: {:#}", e);
                None
            }
        };
        let login = credentials
            .as_ref()
            .map_or_else(Login::anonymous, Login::authenticated);

        for line in Login::lines(credentials.as_ref(), channel) {
            if let Err(e) = socket.writer.send_text(&line).await {
                log::warn!("[Chat] Login failed: {:#}", e);
                socket.close("Chat").await;
                self.schedule_reconnect();
                return;
            }
        }

        log::info!(
            "[Chat] Joined #{} as {}{}",
            channel,
            login.nick,
            if login.authenticated { "" } else { " (anonymous)" }
        );
        self.login = Some(login);
        self.conn.socket = Some(socket);
        self.status.set_connected(true);
    }

    fn schedule_reconnect(&mut self) {
        if self.conn.schedule_reconnect(self.settings.reconnect_delay) {
            log::info!(
                "[Chat] Reconnecting in {}ms",
                self.settings.reconnect_delay.as_millis()
            );
        }
    }

    async fn handle_socket(&mut self, message: Option<Result<SocketMessage>>) {
        match message {
            Some(Ok(SocketMessage::Text(data))) => {
                for line in data.split("\r\n").filter(|l| !l.is_empty()) {
                    self.handle_line(line).await;
                }
            }
            Some(Ok(SocketMessage::Ping(data))) => {
                if let Some(socket) = self.conn.socket.as_mut() {
                    if let Err(e) = socket.writer.send_pong(data).await {
                        log::debug!("[Chat] Pong failed: {:#}", e);
                    }
                }
            }
            Some(Ok(SocketMessage::Close { code, reason })) => {
                log::info!("[Chat] Server closed connection ({}): {}", code, reason);
                self.on_closed().await;
            }
            Some(Err(e)) => {
                log::warn!("[Chat] Socket error: {:#}", e);
                self.on_closed().await;
            }
            None => {
                log::info!("[Chat] Connection closed");
                self.on_closed().await;
            }
        }
    }

    async fn on_closed(&mut self) {
        if let Some(socket) = self.conn.socket.take() {
            socket.close("Chat").await;
        }
        self.status.set_connected(false);
        self.schedule_reconnect();
    }

    async fn handle_line(&mut self, line: &str) {
        match classify_line(line) {
            ChatLine::Ping => {
                self.write_line(constants::PONG_LINE).await;
            }
            ChatLine::UserState { colour } => {
                if let Some(colour) = colour {
                    log::debug!("[Chat] Own colour is {}", colour);
                    self.colour = Some(colour);
                }
            }
            ChatLine::Privmsg(privmsg) => self.handle_privmsg(privmsg).await,
            ChatLine::Join { nick } => self.publish_presence(ChannelEventType::Join, nick),
            ChatLine::Part { nick } => self.publish_presence(ChannelEventType::Part, nick),
            ChatLine::Other => {}
        }
    }

    async fn handle_privmsg(&mut self, privmsg: Privmsg) {
        let own = self.login.as_ref().is_some_and(|l| l.nick == privmsg.login);
        if own && self.echo.take_match(&privmsg.text) {
            log::trace!("[Chat] Dropped own echo");
            return;
        }

        let message = ChatMessage::new(
            privmsg.username,
            privmsg.colour,
            privmsg.text,
            privmsg.badges,
            privmsg.emotes,
        );
        self.history.push(message.clone());
        self.ctx.bus.publish(&ChannelEvent {
            kind: ChannelEventType::Chat,
            timestamp: message.timestamp,
            data: message.to_event_data(),
        });

        self.run_commands(&message.text).await;
    }

    fn publish_presence(&self, kind: ChannelEventType, nick: String) {
        if self
            .login
            .as_ref()
            .is_some_and(|l| l.nick == nick.to_lowercase())
        {
            return;
        }
        let mut data = EventData::new();
        data.insert("username".into(), nick.into());
        self.ctx.bus.publish(&ChannelEvent::now(kind, data));
    }

    async fn send_chat_message(&mut self, text: &str) -> bool {
        let text = single_line(text);
        if text.trim().is_empty() {
            return false;
        }
        if !self.send_privmsg(&text).await {
            return false;
        }
        self.run_commands(&text).await;
        true
    }

    async fn run_commands(&mut self, text: &str) {
        let authenticated = self.login.as_ref().is_some_and(|l| l.authenticated);
        if let Some(response) = self.responder.respond(text, authenticated) {
            self.send_privmsg(&response).await;
        }
    }

    /// Write a `PRIVMSG`, remember it for echo suppression and add it to
    /// history. Our own messages are not published on the bus.
    async fn send_privmsg(&mut self, text: &str) -> bool {
        let text = single_line(text);
        let text = text.as_str();
        let Some(channel) = self.conn.target.clone() else {
            return false;
        };
        if self.conn.socket.is_none() {
            log::debug!("[Chat] Not connected, dropping outbound message");
            return false;
        }
        if !self.write_line(&format!("PRIVMSG #{channel} :{text}")).await {
            return false;
        }

        self.echo.record(text);
        let username = self
            .login
            .as_ref()
            .map_or_else(|| "me".to_string(), |l| l.display_name.clone());
        let colour = self
            .colour
            .clone()
            .unwrap_or_else(|| default_colour_for_username(&username).to_string());
        self.history.push(ChatMessage::new(
            username,
            colour,
            text.to_string(),
            Vec::new(),
            Vec::new(),
        ));
        true
    }

    async fn write_line(&mut self, line: &str) -> bool {
        let Some(socket) = self.conn.socket.as_mut() else {
            return false;
        };
        match socket.writer.send_text(line).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[Chat] Send failed: {:#}", e);
                false
            }
        }
    }
}

/// Lowercase a channel name and strip one leading `#`.
#[must_use]
pub fn normalize_channel(channel: &str) -> String {
    let channel = channel.trim().to_lowercase();
    match channel.strip_prefix('#') {
        Some(stripped) => stripped.to_string(),
        None => channel,
    }
}
