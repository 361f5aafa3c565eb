//! Outgoing commands. Line terminators are added by
//! [`Sender::write_line`](crate::conn::Sender::write_line).

use unicode_segmentation::UnicodeSegmentation;

use crate::irc::escape_tag_value;

/// Twitch drops messages of this many characters or more
pub const MAX_MESSAGE_LEN: usize = 500;
/// Size of the pieces longer messages are cut into
pub const CHUNK_LEN: usize = 495;

pub fn join(channel: &str) -> String { format!("JOIN #{}", channel) }

pub fn part(channel: &str) -> String { format!("PART #{}", channel) }

pub fn privmsg(channel: &str, message: &str) -> String { format!("PRIVMSG #{} :{}", channel, message) }

/// Threaded reply to the message with id `parent_id`
pub fn reply(channel: &str, parent_id: &str, message: &str) -> String {
    format!(
        "@reply-parent-msg-id={} PRIVMSG #{} :{}",
        escape_tag_value(parent_id),
        channel,
        message
    )
}

pub fn pong(token: &str) -> String { format!("PONG :{}", token) }

pub fn cap<'a>(capabilities: impl IntoIterator<Item = &'a str>) -> String {
    format!("CAP REQ :{}", capabilities.into_iter().collect::<Vec<_>>().join(" "))
}

/// Prepends `oauth:` to the token if it's missing
pub fn pass(token: &str) -> String {
    if token.starts_with("oauth:") {
        format!("PASS {}", token)
    } else {
        format!("PASS oauth:{}", token)
    }
}

pub fn nick(login: &str) -> String { format!("NICK {}", login) }

/// Replaces line breaks, which would otherwise end the command early.
pub fn sanitize(message: &str) -> String { message.replace('\n', " ").replace('\r', "") }

/// Cuts `message` into pieces of at most [`CHUNK_LEN`] characters, never
/// splitting a grapheme cluster. Short messages are returned as-is.
pub fn split_message(message: &str) -> Vec<&str> {
    if message.chars().count() < MAX_MESSAGE_LEN {
        return vec![message];
    }
    let mut chunks = Vec::new();
    let (mut start, mut len) = (0, 0);
    for (i, grapheme) in message.grapheme_indices(true) {
        let n = grapheme.chars().count();
        if len > 0 && len + n > CHUNK_LEN {
            chunks.push(&message[start..i]);
            start = i;
            len = 0;
        }
        len += n;
    }
    if start < message.len() {
        chunks.push(&message[start..]);
    }
    chunks
}
