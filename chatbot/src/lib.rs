//! Twitch chat client
//!
//! * [`irc`](./irc) - parsing raw IRC messages, with Twitch-specific extensions
//!   (not RFC2812 compliant)
//! * [`tmi`](./tmi) - Twitch events (PRIVMSG, NOTICE, ROOMSTATE, etc.) and
//!   outgoing commands
//! * [`conn`](./conn) - line-based transport
//! * [`handshake`](./handshake) - login and channel join
//! * [`queue`](./queue) - message hand-off between the reader and the consumer
//! * [`bot`](./bot) - the [`ChatBot`] tying it all together

pub mod bot;
pub mod config;
pub mod conn;
pub mod handshake;
pub mod irc;
pub mod queue;
pub mod tmi;

pub use bot::{ChatBot, ConnectionState};
pub use config::{Capabilities, Config, Login};
pub use conn::{Error, Result};
pub use tmi::{ChatEvent, Message, MessageKind};
