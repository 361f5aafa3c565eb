use std::collections::HashMap;
use std::ops::Deref;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("Expected tag '{0}'")]
    MissingTag(String),
    #[error("Tags are not followed by a space")]
    MissingTagTerminator,
    #[error("Prefix is not followed by a space")]
    MissingPrefixTerminator,
    #[error("Missing command")]
    MissingCommand,
}

pub type Result<T> = std::result::Result<T, Error>;

/// A raw IRC line split into its parts.
///
/// Everything except the tags borrows from `source`.
#[derive(Clone, Debug, PartialEq)]
pub struct Message<'a> {
    pub tags: Tags,
    pub prefix: Option<Prefix<'a>>,
    pub cmd: Command<'a>,
    pub channel: Option<&'a str>,
    pub params: Params<'a>,
    pub source: &'a str,
}

impl<'a> Message<'a> {
    /// Parse a raw IRC Message
    ///
    /// `[@tags ][:prefix ]COMMAND[ param...][ :trailing]`
    ///
    /// The channel is the first middle parameter starting with `#`, without
    /// the `#`.
    pub fn parse(source: &'a str) -> Result<Message<'a>> {
        let (tags, remainder) = Tags::parse(source)?;
        let (prefix, remainder) = Prefix::parse(remainder)?;
        let (cmd, remainder) = Command::parse(remainder)?;
        let params = Params::parse(remainder);
        let channel = params
            .middle
            .iter()
            .find_map(|param| param.strip_prefix('#'))
            .filter(|channel| !channel.is_empty());

        Ok(Message {
            tags,
            prefix,
            cmd,
            channel,
            params,
            source,
        })
    }

    /// Nick from the prefix, if there is one.
    pub fn nick(&self) -> Option<&'a str> { self.prefix.and_then(|p| p.nick) }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command<'a> {
    Ping,
    Pong,
    /// Join channel
    Join,
    /// Leave channel
    Part,
    /// Twitch Private Message
    Privmsg,
    // Twitch extensions
    /// Send message to a single user
    Whisper,
    /// Purge a user's messages
    Clearchat,
    /// Single message removal
    Clearmsg,
    /// Sent upon successful authentication (PASS/NICK command)
    GlobalUserState,
    /// Channel starts or stops host mode
    HostTarget,
    /// General notices from the server
    Notice,
    /// Server is about to restart, client should reconnect
    Reconnect,
    /// Identifies the channel's chat settings
    RoomState,
    /// Announces Twitch-specific events to the channel
    UserNotice,
    /// Identifies a user's chat settings or properties
    UserState,
    /// Capability negotiation
    Capability,
    /// Numeric replies (`001`, `353`, `366`, ...) and anything else
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    /// Parses a Twitch IRC command
    ///
    /// Returns (command, remainder)
    pub fn parse(data: &'a str) -> Result<(Command<'a>, &'a str)> {
        use Command::*;
        let data = data.trim_start_matches(' ');
        let end = data.find(' ').unwrap_or_else(|| data.len());
        let cmd = &data[..end];
        if cmd.is_empty() {
            return Err(Error::MissingCommand);
        }
        let cmd = match cmd {
            "PING" => Ping,
            "PONG" => Pong,
            "JOIN" => Join,
            "PART" => Part,
            "PRIVMSG" => Privmsg,
            "WHISPER" => Whisper,
            "CLEARCHAT" => Clearchat,
            "CLEARMSG" => Clearmsg,
            "GLOBALUSERSTATE" => GlobalUserState,
            "HOSTTARGET" => HostTarget,
            "NOTICE" => Notice,
            "RECONNECT" => Reconnect,
            "ROOMSTATE" => RoomState,
            "USERNOTICE" => UserNotice,
            "USERSTATE" => UserState,
            "CAP" => Capability,
            other => Unknown(other),
        };

        Ok((cmd, &data[end..]))
    }
}

/// Unescaped IRCv3 tags. Keys without a value map to an empty string.
#[derive(Clone, Default, PartialEq, Debug)]
pub struct Tags(HashMap<String, String>);

impl Deref for Tags {
    type Target = HashMap<String, String>;
    fn deref(&self) -> &Self::Target { &self.0 }
}

impl From<HashMap<String, String>> for Tags {
    fn from(map: HashMap<String, String>) -> Tags { Tags(map) }
}

impl Tags {
    /// Parses IRC tags in the form
    ///
    /// `@key0=[value0];key1=[value1];...;keyN=[valueN] `
    ///
    /// `[value]`s are optional. A line without a leading `@` has no tags.
    ///
    /// Returns (tags, remainder)
    pub fn parse(data: &str) -> Result<(Tags, &str)> {
        let data = match data.strip_prefix('@') {
            Some(v) => v,
            None => return Ok((Tags::default(), data)),
        };
        let (raw, remainder) = data.split_once(' ').ok_or(Error::MissingTagTerminator)?;

        let map = raw
            .split(';')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) => (key.to_string(), unescape_tag_value(value)),
                None => (pair.to_string(), String::new()),
            })
            .collect();

        Ok((Tags(map), remainder))
    }

    pub fn get(&self, key: &str) -> Option<&str> { self.0.get(key).map(|v| v.as_str()) }

    pub fn into_inner(self) -> HashMap<String, String> { self.0 }

    /// Parses a number
    pub fn get_number<N>(&self, key: &str) -> Option<N>
    where
        N: std::str::FromStr,
    {
        self.get(key).and_then(|v| v.parse::<N>().ok())
    }

    /// Parses a numeric bool (0 or 1)
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            "0" => Some(false),
            "1" => Some(true),
            _ => None,
        }
    }

    /// Parses a comma-separated list of values
    pub fn get_csv(&self, key: &str) -> Option<Vec<&str>> {
        self.get(key)
            .map(|v| v.split(',').filter(|v| !v.is_empty()).collect())
    }

    /// Parses a millisecond precision UNIX timestamp as a UTC date/time
    pub fn get_date(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get_number::<i64>(key)
            .and_then(|v| Utc.timestamp_millis_opt(v).single())
    }

    /// Like `.get()`, but returns an `Error` in case the key doesn't exist
    pub fn require(&self, key: &str) -> Result<&str> { self.get(key).ok_or_else(|| Error::MissingTag(key.into())) }

    /// Like `.get_number()`, but returns an `Error` in case the key doesn't
    /// exist, or is invalid in some way
    pub fn require_number<N>(&self, key: &str) -> Result<N>
    where
        N: std::str::FromStr,
    {
        self.get_number(key).ok_or_else(|| Error::MissingTag(key.into()))
    }

    /// Like `.get_bool()`, but returns an `Error` in case the key doesn't
    /// exist, or is invalid in some way
    pub fn require_bool(&self, key: &str) -> Result<bool> {
        self.get_bool(key).ok_or_else(|| Error::MissingTag(key.into()))
    }

    /// Like `.get_date()`, but returns an `Error` in case the key doesn't
    /// exist, or is invalid in some way
    pub fn require_date(&self, key: &str) -> Result<DateTime<Utc>> {
        self.get_date(key).ok_or_else(|| Error::MissingTag(key.into()))
    }
}

/// `\:` -> `;`, `\s` -> ` `, `\\` -> `\`, `\r` -> CR, `\n` -> LF
///
/// Unknown escapes drop the backslash, a trailing lone backslash is dropped.
pub fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => (),
        }
    }
    out
}

/// Inverse of [`unescape_tag_value`].
pub fn escape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ';' => out.push_str("\\:"),
            ' ' => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prefix<'a> {
    pub nick: Option<&'a str>,
    pub user: Option<&'a str>,
    pub host: &'a str,
}

impl<'a> Prefix<'a> {
    /// Parses an optional IRC prefix in one of the following forms:
    ///
    /// * `:host`
    /// * `:nick@host`
    /// * `:nick!user@host`
    ///
    /// Returns (prefix, remainder)
    pub fn parse(data: &'a str) -> Result<(Option<Prefix<'a>>, &'a str)> {
        let data = data.trim_start_matches(' ');
        let data = match data.strip_prefix(':') {
            Some(v) => v,
            None => return Ok((None, data)),
        };
        let (prefix, remainder) = data.split_once(' ').ok_or(Error::MissingPrefixTerminator)?;

        // on twitch, nick-only is actually host-only (because they're not fully
        // compliant with RFC2812) so in case we don't find '@', we treat
        // the prefix as just the 'host' part
        let (nick, user, host) = match prefix.split_once('@') {
            Some((nick_and_user, host)) => match nick_and_user.split_once('!') {
                // case: 'nick!user@host'
                Some((nick, user)) => (Some(nick), Some(user), host),
                // case: 'nick@host'
                None => (Some(nick_and_user), None, host),
            },
            // case: 'host'
            None => (None, None, prefix),
        };

        Ok((Some(Prefix { nick, user, host }), remainder))
    }

    /// The nick if present, otherwise the host.
    pub fn name(&self) -> &'a str { self.nick.unwrap_or(self.host) }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params<'a> {
    pub middle: Vec<&'a str>,
    /// Everything after ` :`, kept verbatim
    pub trailing: Option<&'a str>,
}

impl<'a> Params<'a> {
    /// Parse a params list
    ///
    /// Valid form: `param0 param1 ... [:trailing text]`
    pub fn parse(data: &'a str) -> Params<'a> {
        let mut middle = Vec::new();
        let mut rest = data;
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                return Params { middle, trailing: None };
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                return Params {
                    middle,
                    trailing: Some(trailing),
                };
            }
            match rest.split_once(' ') {
                Some((param, remainder)) => {
                    middle.push(param);
                    rest = remainder;
                }
                None => {
                    middle.push(rest);
                    return Params { middle, trailing: None };
                }
            }
        }
    }

    /// Trailing param, or the last middle param
    pub fn last(&self) -> Option<&'a str> { self.trailing.or_else(|| self.middle.last().copied()) }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        Tags(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn parse_prefix_host_only() {
        assert_eq!(
            Some(Prefix {
                nick: None,
                user: None,
                host: "test.tmi.twitch.tv"
            }),
            Prefix::parse(":test.tmi.twitch.tv CMD").unwrap().0
        );
    }

    #[test]
    fn parse_prefix_host_and_nick() {
        assert_eq!(
            Some(Prefix {
                nick: Some("test"),
                user: None,
                host: "test.tmi.twitch.tv"
            }),
            Prefix::parse(":test@test.tmi.twitch.tv CMD").unwrap().0
        );
    }

    #[test]
    fn parse_prefix_full() {
        assert_eq!(
            Some(Prefix {
                nick: Some("test"),
                user: Some("test"),
                host: "test.tmi.twitch.tv"
            }),
            Prefix::parse(":test!test@test.tmi.twitch.tv CMD").unwrap().0
        );
    }

    #[test]
    fn parse_no_prefix() {
        assert_eq!((None, "PING :tmi.twitch.tv"), Prefix::parse("PING :tmi.twitch.tv").unwrap());
    }

    #[test]
    fn parse_unterminated_prefix() {
        assert_eq!(Error::MissingPrefixTerminator, Prefix::parse(":lonely").unwrap_err());
    }

    #[test]
    fn parse_command() {
        assert_eq!(Command::Privmsg, Command::parse("PRIVMSG").unwrap().0);
        assert_eq!(Command::Unknown("366"), Command::parse("366 nick #chan").unwrap().0);
        assert_eq!(Error::MissingCommand, Command::parse("").unwrap_err());
    }

    #[test]
    fn parse_ping() {
        let src = "PING :tmi.twitch.tv";
        assert_eq!(
            Message {
                tags: Tags::default(),
                prefix: None,
                cmd: Command::Ping,
                channel: None,
                params: Params {
                    middle: vec![],
                    trailing: Some("tmi.twitch.tv")
                },
                source: src
            },
            Message::parse(src).unwrap()
        )
    }

    #[test]
    fn parse_join() {
        let src = ":test!test@test.tmi.twitch.tv JOIN #channel";

        assert_eq!(
            Message {
                tags: Tags::default(),
                prefix: Some(Prefix {
                    nick: Some("test"),
                    user: Some("test"),
                    host: "test.tmi.twitch.tv"
                }),
                cmd: Command::Join,
                channel: Some("channel"),
                params: Params {
                    middle: vec!["#channel"],
                    trailing: None
                },
                source: src
            },
            Message::parse(src).unwrap()
        )
    }

    #[test]
    fn parse_full_privmsg() {
        let src = "\
            @badge-info=;\
            badges=;\
            color=#0000FF;\
            display-name=JuN1oRRRR;\
            emotes=;\
            flags=;\
            id=e9d998c3-36f1-430f-89ec-6b887c28af36;\
            mod=0;\
            room-id=11148817;\
            subscriber=0;\
            tmi-sent-ts=1594545155039;\
            turbo=0;\
            user-id=29803735;\
            user-type= \
            :jun1orrrr!jun1orrrr@jun1orrrr.tmi.twitch.tv PRIVMSG #pajlada :dank cam\
        ";
        assert_eq!(
            Message {
                tags: tags(&[
                    ("badge-info", ""),
                    ("badges", ""),
                    ("color", "#0000FF"),
                    ("display-name", "JuN1oRRRR"),
                    ("emotes", ""),
                    ("flags", ""),
                    ("id", "e9d998c3-36f1-430f-89ec-6b887c28af36"),
                    ("mod", "0"),
                    ("room-id", "11148817"),
                    ("subscriber", "0"),
                    ("tmi-sent-ts", "1594545155039"),
                    ("turbo", "0"),
                    ("user-id", "29803735"),
                    ("user-type", ""),
                ]),
                prefix: Some(Prefix {
                    nick: Some("jun1orrrr"),
                    user: Some("jun1orrrr"),
                    host: "jun1orrrr.tmi.twitch.tv"
                }),
                cmd: Command::Privmsg,
                channel: Some("pajlada"),
                params: Params {
                    middle: vec!["#pajlada"],
                    trailing: Some("dank cam")
                },
                source: src
            },
            Message::parse(src).unwrap()
        );
    }

    #[test]
    fn parse_whisper_with_action() {
        let src = "\
        @badges=;color=#2E8B57;display-name=pajbot;emotes=25:7-11;message-id=\
        2034;thread-id=40286300_82008718;turbo=0;user-id=82008718;user-type= \
        :pajbot!pajbot@pajbot.tmi.twitch.tv WHISPER randers :\x01ACTION Riftey Kappa\x01\
        ";
        let message = Message::parse(src).unwrap();
        assert_eq!(Command::Whisper, message.cmd);
        assert_eq!(None, message.channel);
        assert_eq!(vec!["randers"], message.params.middle);
        assert_eq!(Some("\x01ACTION Riftey Kappa\x01"), message.params.trailing);
        assert_eq!(Some("25:7-11"), message.tags.get("emotes"));
    }

    #[test]
    fn parse_msg_with_extra_semicolons() {
        let src = "\
        @login=supibot;room-id=;target-msg-id=25fd76d9-4731-4907-978e-a391134ebd67;\
        tmi-sent-ts=-6795364578871 :tmi.twitch.tv CLEARMSG #randers :Pong! Uptime: 6h,\
        15m; Temperature: 54.8°C; Latency to TMI: 183ms; Commands used: 795\
        ";
        let message = Message::parse(src).unwrap();
        assert_eq!(Command::Clearmsg, message.cmd);
        assert_eq!(Some("randers"), message.channel);
        assert_eq!(Some(""), message.tags.get("room-id"));
        assert_eq!(Some("supibot"), message.tags.get("login"));
        assert_eq!(
            Some("Pong! Uptime: 6h,15m; Temperature: 54.8°C; Latency to TMI: 183ms; Commands used: 795"),
            message.params.trailing
        );
    }

    #[test]
    fn trailing_keeps_colons_and_hashes() {
        let message = Message::parse(":a!a@a.tmi.twitch.tv PRIVMSG #chan :see #other :) ok").unwrap();
        assert_eq!(Some("chan"), message.channel);
        assert_eq!(Some("see #other :) ok"), message.params.trailing);
    }

    #[test]
    fn tags_without_terminator() {
        assert_eq!(Error::MissingTagTerminator, Message::parse("@a=b;c=d").unwrap_err());
    }

    #[test]
    fn tags_are_unescaped() {
        let (tags, rest) = Tags::parse("@system-msg=5\\sraiders\\sfrom\\:\\\\x;flag :tmi.twitch.tv").unwrap();
        assert_eq!(Some("5 raiders from;\\x"), tags.get("system-msg"));
        assert_eq!(Some(""), tags.get("flag"));
        assert_eq!(":tmi.twitch.tv", rest);
    }

    #[test]
    fn unescape_odd_sequences() {
        assert_eq!("ab", unescape_tag_value("a\\b"));
        assert_eq!("a", unescape_tag_value("a\\"));
        assert_eq!("a\r\nb", unescape_tag_value("a\\r\\nb"));
    }

    #[test]
    fn escape_then_unescape_is_identity() {
        for value in &["hello world", "a;b;c", "back\\slash", "line\r\nbreak", "\\s literal", "", "plain"] {
            assert_eq!(*value, unescape_tag_value(&escape_tag_value(value)));
        }
        assert_eq!("a\\sb\\:c\\\\", escape_tag_value("a b;c\\"));
    }

    #[test]
    fn typed_tag_getters() {
        let t = tags(&[
            ("mod", "1"),
            ("subscriber", "x"),
            ("badges", "moderator/1,subscriber/6,"),
            ("tmi-sent-ts", "1594545155039"),
            ("user-id", "29803735"),
        ]);
        assert_eq!(Some(true), t.get_bool("mod"));
        assert_eq!(None, t.get_bool("subscriber"));
        assert_eq!(Some(vec!["moderator/1", "subscriber/6"]), t.get_csv("badges"));
        assert_eq!(Some(29803735u64), t.get_number("user-id"));
        assert_eq!(1594545155039, t.require_date("tmi-sent-ts").unwrap().timestamp_millis());
        assert_eq!(Error::MissingTag("color".into()), t.require("color").unwrap_err());
    }
}
