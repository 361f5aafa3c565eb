//! Twitch-specific layer on top of [`irc`](crate::irc)
//!
//! * [`parse`](./parse) - turning raw lines into [`ChatEvent`]s
//! * [`write`](./write) - formatting outgoing commands

pub mod parse;
pub mod write;

pub use parse::{parse, ChatEvent, Message, MessageKind};
