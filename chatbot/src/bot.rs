//! High-level Twitch chat client
//!
//! Features:
//! * Authenticating and joining a single channel
//! * Answering PING in the background
//! * Batched receiving: [`ChatBot::get_messages`] waits for at least one
//!   message, then returns everything received since the last call
//! * Rate limited sending, long messages are split
use std::{num::NonZeroU32, sync::Arc, time::Duration};

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};

use crate::{
    config::{normalize_channel, Config},
    conn::{self, Error, Receiver, Result, Sender},
    handshake,
    queue::{CloseReason, EventQueue},
    tmi::{self, write, ChatEvent, Message},
};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Joined,
    /// The last connection attempt failed
    Failed,
}

struct Session {
    sender: Arc<Mutex<Sender>>,
    queue: Arc<EventQueue>,
    reader: JoinHandle<()>,
    capabilities: Vec<String>,
}

pub struct ChatBot {
    config: Config,
    session: Mutex<Option<Session>>,
    state: Arc<watch::Sender<ConnectionState>>,
    limiter: Option<Limiter>,
}

fn limiter(per_30_seconds: Option<u32>) -> Option<Limiter> {
    let burst = NonZeroU32::new(per_30_seconds?)?;
    let quota = Quota::with_period(Duration::from_secs(30) / burst.get())?.allow_burst(burst);
    Some(RateLimiter::direct(quota))
}

impl ChatBot {
    /// Nothing is sent until [`connect`](ChatBot::connect).
    pub fn new(username: &str, password: &str, channel: &str) -> ChatBot {
        ChatBot::with_config(Config::new(username, password, channel))
    }

    pub fn with_config(config: Config) -> ChatBot {
        let config = config.normalized();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        ChatBot {
            limiter: limiter(config.rate_limit),
            config,
            session: Mutex::new(None),
            state: Arc::new(state),
        }
    }

    pub fn config(&self) -> &Config { &self.config }

    pub fn channel(&self) -> &str { &self.config.channel }

    pub fn state(&self) -> ConnectionState { *self.state.borrow() }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> { self.state.subscribe() }

    fn set_state(&self, state: ConnectionState) { self.state.send_replace(state); }

    /// Connects to the configured server, authenticates and joins the channel.
    ///
    /// An existing session is closed first.
    pub async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        self.teardown(&mut session).await;
        self.set_state(ConnectionState::Connecting);
        let (receiver, sender) = match conn::open(
            &self.config.host,
            self.config.port,
            self.config.tls,
            self.config.connect_timeout,
        )
        .await
        {
            Ok(halves) => halves,
            Err(err) => {
                log::error!("Failed to connect to {}:{}: {}", self.config.host, self.config.port, err);
                self.set_state(ConnectionState::Failed);
                return Err(err);
            }
        };
        self.establish(&mut session, receiver, sender).await
    }

    /// Like [`connect`](ChatBot::connect), over an already open transport.
    pub async fn connect_with(&self, receiver: Receiver, sender: Sender) -> Result<()> {
        let mut session = self.session.lock().await;
        self.teardown(&mut session).await;
        self.set_state(ConnectionState::Connecting);
        self.establish(&mut session, receiver, sender).await
    }

    async fn establish(&self, slot: &mut Option<Session>, mut receiver: Receiver, mut sender: Sender) -> Result<()> {
        self.set_state(ConnectionState::Authenticating);
        let joined = match handshake::authenticate(&mut receiver, &mut sender, &self.config).await {
            Ok(joined) => joined,
            Err(err) => {
                log::error!("Handshake failed: {}", err);
                self.set_state(ConnectionState::Failed);
                if let Err(err) = sender.shutdown().await {
                    log::debug!("Shutdown after failed handshake: {}", err);
                }
                return Err(err);
            }
        };

        let sender = Arc::new(Mutex::new(sender));
        let queue = Arc::new(EventQueue::new());
        for message in joined.backlog {
            // the queue is new, so it can't be closed yet
            let _ = queue.push(message);
        }
        // Joined must be visible before the reader can flip it to Disconnected
        self.set_state(ConnectionState::Joined);
        let reader = tokio::spawn(read_loop(receiver, sender.clone(), queue.clone(), self.state.clone()));
        *slot = Some(Session {
            sender,
            queue,
            reader,
            capabilities: joined.capabilities,
        });
        Ok(())
    }

    /// Waits until at least one message arrives, then returns every message
    /// received since the previous call, oldest first.
    ///
    /// Fails with [`Error::NotConnected`] before `connect` or after `close`,
    /// and with the reason the session ended once the connection is gone.
    pub async fn get_messages(&self) -> Result<Vec<Message>> {
        let queue = match &*self.session.lock().await {
            Some(session) => session.queue.clone(),
            None => return Err(Error::NotConnected),
        };
        queue.drain().await
    }

    /// Sends `text` to `channel`. Line breaks are flattened and long texts are
    /// split into several messages.
    pub async fn send_message(&self, channel: &str, text: &str) -> Result<()> {
        let sender = self.joined_sender().await?;
        let channel = normalize_channel(channel);
        let text = write::sanitize(text);
        if text.trim().is_empty() {
            log::debug!("Not sending an empty message to #{}", channel);
            return Ok(());
        }
        for chunk in write::split_message(&text) {
            self.throttle().await;
            self.write(&sender, &write::privmsg(&channel, chunk)).await?;
        }
        Ok(())
    }

    /// Sends `text` to the joined channel.
    pub async fn say(&self, text: &str) -> Result<()> { self.send_message(&self.config.channel, text).await }

    /// Replies in the thread of `parent`. Falls back to a plain message when
    /// `parent` has no id (tags capability disabled).
    pub async fn reply(&self, parent: &Message, text: &str) -> Result<()> {
        let id = match parent.id() {
            Some(id) => id,
            None => return self.send_message(&parent.channel, text).await,
        };
        let sender = self.joined_sender().await?;
        let text = write::sanitize(text);
        if text.trim().is_empty() {
            log::debug!("Not sending an empty reply to #{}", parent.channel);
            return Ok(());
        }
        // replies are not split, only the first chunk is sent
        let text = write::split_message(&text)[0];
        self.throttle().await;
        self.write(&sender, &write::reply(&parent.channel, id, text)).await
    }

    /// Capabilities the server granted during the last handshake.
    pub async fn capabilities(&self) -> Vec<String> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| session.capabilities.clone())
            .unwrap_or_default()
    }

    /// Leaves the channel and drops the connection. Pending
    /// [`get_messages`](ChatBot::get_messages) calls fail with
    /// [`Error::ConnectionClosed`].
    pub async fn close(&self) {
        let mut session = self.session.lock().await;
        self.teardown(&mut session).await;
    }

    async fn teardown(&self, slot: &mut Option<Session>) {
        if let Some(session) = slot.take() {
            session.reader.abort();
            // make sure the old reader can't touch the state anymore
            let _ = session.reader.await;
            session.queue.close(CloseReason::Disconnected);
            let mut sender = session.sender.lock().await;
            if self.state() == ConnectionState::Joined {
                if let Err(err) = sender.write_line(&write::part(&self.config.channel)).await {
                    log::debug!("Failed to part #{}: {}", self.config.channel, err);
                }
            }
            if let Err(err) = sender.shutdown().await {
                log::debug!("Shutdown: {}", err);
            }
            log::info!("Left #{}", self.config.channel);
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn joined_sender(&self) -> Result<Arc<Mutex<Sender>>> {
        if self.state() != ConnectionState::Joined {
            return Err(Error::NotConnected);
        }
        match &*self.session.lock().await {
            Some(session) => Ok(session.sender.clone()),
            None => Err(Error::NotConnected),
        }
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    /// A failed write ends the session it was made on; the consumer sees it
    /// on the next `get_messages`. Failures on a session that has since been
    /// replaced are only reported to the caller.
    async fn write(&self, sender: &Arc<Mutex<Sender>>, line: &str) -> Result<()> {
        let result = sender.lock().await.write_line(line).await;
        if let Err(err) = &result {
            match &*self.session.lock().await {
                Some(session) if Arc::ptr_eq(&session.sender, sender) => {
                    log::warn!("Write failed, disconnecting: {}", err);
                    session.reader.abort();
                    session.queue.close(CloseReason::Disconnected);
                    self.set_state(ConnectionState::Disconnected);
                }
                _ => log::debug!("Write on a closed session failed: {}", err),
            }
        }
        result
    }
}

impl Drop for ChatBot {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut() {
            session.reader.abort();
            session.queue.close(CloseReason::Disconnected);
        }
    }
}

/// Reads until the connection ends. Pings are answered here, messages go to
/// the queue, everything else is only logged.
async fn read_loop(
    mut receiver: Receiver,
    sender: Arc<Mutex<Sender>>,
    queue: Arc<EventQueue>,
    state: Arc<watch::Sender<ConnectionState>>,
) {
    let reason = loop {
        let line = match receiver.read_line().await {
            Ok(line) => line,
            Err(err) => {
                log::info!("Connection lost: {}", err);
                break CloseReason::Disconnected;
            }
        };
        match tmi::parse(&line) {
            ChatEvent::Ping { token } => {
                if let Err(err) = sender.lock().await.write_line(&write::pong(&token)).await {
                    log::warn!("Failed to send PONG: {}", err);
                    break CloseReason::Disconnected;
                }
                log::debug!("Sent PONG");
            }
            ChatEvent::Message(message) => {
                if let Err(message) = queue.push(message) {
                    log::warn!("Queue closed, dropping message from {}", message.sender);
                    break CloseReason::Disconnected;
                }
            }
            ChatEvent::Reconnect => {
                log::info!("Server requested a reconnect");
                break CloseReason::Reconnect;
            }
            ChatEvent::Join { user, channel } => log::debug!("{} joined #{}", user, channel),
            ChatEvent::Part { user, channel } => log::debug!("{} left #{}", user, channel),
            ChatEvent::Capability {
                acknowledged,
                capabilities,
            } => log::debug!("CAP (ack: {}): {}", acknowledged, capabilities.join(" ")),
            ChatEvent::Other { raw } => log::debug!("Ignoring: {}", raw),
        }
    };
    queue.close(reason);
    state.send_replace(ConnectionState::Disconnected);
}
