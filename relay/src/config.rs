use std::fmt::{self, Display, Formatter};

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct Credentials {
    pub twitch_login: Option<String>,
    pub twitch_token: Option<String>,
}
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub channel: String,
    pub tls: bool,
    pub membership: bool,
    pub rate_limit: Option<u32>,
    pub credentials: Option<Credentials>,
}
#[derive(Clone, Default, serde::Deserialize)]
struct PartialConfig {
    channel: Option<String>,
    tls: Option<bool>,
    membership: Option<bool>,
    rate_limit: Option<u32>,
    credentials: Option<Credentials>,
}
impl Config {
    pub fn init(path: &str) -> Config {
        log::debug!("Loading config from file '{}'", path);
        let cfg = match std::fs::read_to_string(path) {
            Ok(v) => v,
            Err(err) => {
                log::warn!("Failed to read config: {}; Falling back to defaults", err);
                String::new()
            }
        };
        let cfg = Config::parse(&cfg);
        log::info!("Using config: {}", cfg);
        cfg
    }

    pub fn parse(cfg: &str) -> Config {
        match toml::from_str::<PartialConfig>(cfg) {
            Ok(value) => value.into(),
            Err(err) => {
                log::warn!("Error while reading config: {}; Falling back to defaults", err);
                Config::default()
            }
        }
    }

    pub fn chatbot(&self) -> chatbot::Config {
        let base = match &self.credentials {
            Some(Credentials {
                twitch_login: Some(login),
                twitch_token: Some(token),
            }) => chatbot::Config::new(login, token, &self.channel),
            _ => chatbot::Config::anonymous(&self.channel),
        };
        chatbot::Config {
            tls: self.tls,
            port: if self.tls {
                chatbot::config::TMI_TLS_PORT
            } else {
                chatbot::config::TMI_PORT
            },
            capabilities: chatbot::Capabilities {
                membership: self.membership,
                ..chatbot::Capabilities::default()
            },
            rate_limit: self.rate_limit,
            ..base
        }
    }
}
impl Default for Config {
    fn default() -> Self { PartialConfig::default().into() }
}
impl From<PartialConfig> for Config {
    fn from(cfg: PartialConfig) -> Config {
        Config {
            channel: cfg.channel.unwrap_or_else(|| "moscowwbish".into()),
            tls: cfg.tls.unwrap_or(true),
            membership: cfg.membership.unwrap_or(false),
            rate_limit: cfg.rate_limit.or(Some(20)),
            credentials: cfg.credentials,
        }
    }
}
impl Display for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Config {{")?;
        writeln!(f, "\tchannel = '{}',", self.channel)?;
        writeln!(f, "\ttls = {},", self.tls)?;
        writeln!(f, "\tmembership = {},", self.membership)?;
        writeln!(f, "\trate_limit = {:?},", self.rate_limit)?;
        writeln!(f, "\tcredentials = ...,")?;
        write!(f, "}}")
    }
}
