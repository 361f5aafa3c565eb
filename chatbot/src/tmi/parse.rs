use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::irc::{self, Command, Tags};

/// Consumer-facing type of a queued [`Message`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Chat message from a user
    Privmsg,
    /// Channel notice from the server
    Notice,
    /// Subs, raids, rituals, etc.
    UserNotice,
    /// Our own state in the channel
    UserState,
    /// Channel chat settings
    RoomState,
    /// A user's messages were purged, or the whole chat was cleared
    ClearChat,
    /// A single message was deleted
    ClearMsg,
    /// Channel started or stopped hosting
    HostTarget,
    /// Our own badges and color, sent once after login. Has no channel.
    GlobalUserState,
}

impl MessageKind {
    fn from_command(cmd: Command<'_>) -> Option<MessageKind> {
        Some(match cmd {
            Command::Privmsg => MessageKind::Privmsg,
            Command::Notice => MessageKind::Notice,
            Command::UserNotice => MessageKind::UserNotice,
            Command::UserState => MessageKind::UserState,
            Command::RoomState => MessageKind::RoomState,
            Command::Clearchat => MessageKind::ClearChat,
            Command::Clearmsg => MessageKind::ClearMsg,
            Command::HostTarget => MessageKind::HostTarget,
            Command::GlobalUserState => MessageKind::GlobalUserState,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Privmsg => "privmsg",
            MessageKind::Notice => "notice",
            MessageKind::UserNotice => "usernotice",
            MessageKind::UserState => "userstate",
            MessageKind::RoomState => "roomstate",
            MessageKind::ClearChat => "clearchat",
            MessageKind::ClearMsg => "clearmsg",
            MessageKind::HostTarget => "hosttarget",
            MessageKind::GlobalUserState => "globaluserstate",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A channel-scoped line delivered to the consumer.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    /// Lower-cased login of the author, or the server host for server messages
    pub sender: String,
    /// Channel name without the leading `#`
    pub channel: String,
    pub text: String,
    pub tags: Tags,
}

impl Message {
    /// `display-name` tag, falling back to the sender's login.
    pub fn display_name(&self) -> &str {
        match self.tags.get("display-name") {
            Some(name) if !name.is_empty() => name,
            _ => &self.sender,
        }
    }

    /// Message id, needed for replies.
    pub fn id(&self) -> Option<&str> { self.tags.get("id").filter(|id| !id.is_empty()) }

    pub fn user_id(&self) -> Option<&str> { self.tags.get("user-id") }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> { self.tags.get_date("tmi-sent-ts") }

    /// Badges as `name/version`, e.g. `moderator/1`
    pub fn badges(&self) -> Vec<&str> { self.tags.get_csv("badges").unwrap_or_default() }

    /// `/me` messages arrive wrapped in `\x01ACTION ...\x01`
    pub fn is_action(&self) -> bool { self.text.starts_with("\x01ACTION ") && self.text.ends_with('\x01') }

    /// Flattens the message into the `{ message_type, display-name, message, ...tags }` form.
    pub fn to_fields(&self) -> HashMap<String, String> {
        let mut fields = self.tags.clone().into_inner();
        fields.insert("message_type".into(), self.kind.as_str().into());
        fields.insert("display-name".into(), self.display_name().into());
        fields.insert("message".into(), self.text.clone());
        fields.insert("sender".into(), self.sender.clone());
        fields.insert("channel".into(), self.channel.clone());
        if self.kind == MessageKind::HostTarget {
            let mut parts = self.text.split(' ');
            match parts.next() {
                Some(target) if target != "-" && !target.is_empty() => {
                    fields.insert("host_target".into(), target.into());
                    if let Some(viewers) = parts.next() {
                        fields.insert("viewers".into(), viewers.into());
                    }
                }
                _ => (),
            }
        }
        fields
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    /// Keepalive, must be answered with `PONG :<token>`
    Ping { token: String },
    Message(Message),
    /// Only sent with the `twitch.tv/membership` capability
    Join { user: String, channel: String },
    Part { user: String, channel: String },
    /// `CAP * ACK` or `CAP * NAK`
    Capability {
        acknowledged: bool,
        capabilities: Vec<String>,
    },
    /// The server is going down, the client should reconnect
    Reconnect,
    /// Anything unrecognized or malformed
    Other { raw: String },
}

/// Classifies a raw line. Never fails: lines that don't fit any known shape
/// become [`ChatEvent::Other`].
pub fn parse(raw: &str) -> ChatEvent {
    match irc::Message::parse(raw) {
        Ok(message) => classify(message).unwrap_or_else(|| ChatEvent::Other { raw: raw.into() }),
        Err(err) => {
            log::trace!("Unparseable line ({}): {}", err, raw);
            ChatEvent::Other { raw: raw.into() }
        }
    }
}

fn classify(message: irc::Message<'_>) -> Option<ChatEvent> {
    let event = match message.cmd {
        Command::Ping => ChatEvent::Ping {
            token: message.params.last().unwrap_or_default().into(),
        },
        Command::Reconnect => ChatEvent::Reconnect,
        Command::Join => ChatEvent::Join {
            user: message.nick()?.to_lowercase(),
            channel: message.channel?.into(),
        },
        Command::Part => ChatEvent::Part {
            user: message.nick()?.to_lowercase(),
            channel: message.channel?.into(),
        },
        Command::Capability => {
            // CAP * ACK :twitch.tv/tags twitch.tv/commands
            let acknowledged = match *message.params.middle.get(1)? {
                "ACK" => true,
                "NAK" => false,
                _ => return None,
            };
            let capabilities = message
                .params
                .trailing
                .or_else(|| message.params.middle.get(2).copied())
                .unwrap_or_default()
                .split(' ')
                .filter(|cap| !cap.is_empty())
                .map(String::from)
                .collect();
            ChatEvent::Capability {
                acknowledged,
                capabilities,
            }
        }
        Command::Privmsg => ChatEvent::Message(Message {
            kind: MessageKind::Privmsg,
            sender: message.nick()?.to_lowercase(),
            channel: message.channel?.into(),
            text: message.params.trailing?.into(),
            tags: message.tags,
        }),
        cmd => {
            let kind = MessageKind::from_command(cmd)?;
            let channel = match (kind, message.channel) {
                (_, Some(channel)) => channel,
                (MessageKind::GlobalUserState, None) => "",
                (_, None) => return None,
            };
            ChatEvent::Message(Message {
                kind,
                sender: message.prefix.map(|p| p.name()).unwrap_or_default().to_lowercase(),
                channel: channel.into(),
                text: message.params.trailing.unwrap_or_default().into(),
                tags: message.tags,
            })
        }
    };
    Some(event)
}
