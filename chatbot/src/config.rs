use std::{fmt, time::Duration};

pub const TMI_HOST: &str = "irc.chat.twitch.tv";
pub const TMI_PORT: u16 = 6667;
pub const TMI_TLS_PORT: u16 = 6697;

#[derive(Clone, PartialEq)]
pub enum Login {
    /// Read-only `justinfanNNNNN` login
    Anonymous,
    Regular { login: String, token: String },
}

impl Default for Login {
    fn default() -> Self { Login::Anonymous }
}

impl fmt::Debug for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Login::Anonymous => write!(f, "Anonymous"),
            Login::Regular { login, .. } => write!(f, "Regular {{ login: {:?}, token: *** }}", login),
        }
    }
}

/// Twitch IRC capabilities requested during the handshake
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Capabilities {
    /// `twitch.tv/tags`: metadata on messages
    pub tags: bool,
    /// `twitch.tv/commands`: USERNOTICE, CLEARCHAT, HOSTTARGET, ...
    pub commands: bool,
    /// `twitch.tv/membership`: JOIN/PART of other users
    pub membership: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            tags: true,
            commands: true,
            membership: false,
        }
    }
}

impl Capabilities {
    pub fn requested(&self) -> Vec<&'static str> {
        let mut caps = Vec::new();
        if self.tags {
            caps.push("twitch.tv/tags");
        }
        if self.commands {
            caps.push("twitch.tv/commands");
        }
        if self.membership {
            caps.push("twitch.tv/membership");
        }
        caps
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub login: Login,
    /// Without the leading `#`
    pub channel: String,
    pub capabilities: Capabilities,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    /// Lines read while waiting for the join before giving up
    pub handshake_line_limit: usize,
    /// Messages per 30 seconds, `None` to disable
    pub rate_limit: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: TMI_HOST.into(),
            port: TMI_TLS_PORT,
            tls: true,
            login: Login::Anonymous,
            channel: String::new(),
            capabilities: Capabilities::default(),
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            handshake_line_limit: 64,
            rate_limit: Some(20),
        }
    }
}

impl Config {
    pub fn new(username: &str, password: &str, channel: &str) -> Config {
        Config {
            login: Login::Regular {
                login: username.to_lowercase(),
                token: password.into(),
            },
            channel: normalize_channel(channel),
            ..Config::default()
        }
    }

    pub fn anonymous(channel: &str) -> Config {
        Config {
            channel: normalize_channel(channel),
            ..Config::default()
        }
    }

    /// Lower-cases logins and channel names, which are case-insensitive.
    pub(crate) fn normalized(mut self) -> Config {
        self.channel = normalize_channel(&self.channel);
        if let Login::Regular { login, .. } = &mut self.login {
            *login = login.to_lowercase();
        }
        self
    }
}

pub fn normalize_channel(channel: &str) -> String { channel.trim().trim_start_matches('#').to_lowercase() }
