//! Registration and channel join
//!
//! 1. `CAP REQ` (if any capabilities are requested)
//! 2. `PASS` (skipped for anonymous logins), `NICK`, `JOIN`
//! 3. wait for our own `JOIN` echo or `366` for the channel
//!
//! Messages that arrive before the join (e.g. `GLOBALUSERSTATE`) are kept and
//! handed over with the result.
use rand::Rng;

use crate::{
    config::{Config, Login},
    conn::{Error, Receiver, Result, Sender},
    irc::{self, Command},
    tmi::{self, write, ChatEvent, Message},
};

/// NOTICE texts Twitch uses to reject a login
const AUTH_FAILURES: &[&str] = &["Login authentication failed", "Improperly formatted auth", "Invalid NICK"];

/// Outcome of a successful handshake
#[derive(Debug, Default)]
pub struct Joined {
    /// Capabilities the server acknowledged
    pub capabilities: Vec<String>,
    /// Messages received before the join was confirmed, oldest first
    pub backlog: Vec<Message>,
}

enum Step {
    Continue,
    Joined,
}

fn anonymous_nick() -> String { format!("justinfan{}", rand::thread_rng().gen_range(10000..99999)) }

/// Authenticates and joins `config.channel`.
pub async fn authenticate(receiver: &mut Receiver, sender: &mut Sender, config: &Config) -> Result<Joined> {
    let requested = config.capabilities.requested();
    if !requested.is_empty() {
        sender.write_line(&write::cap(requested.iter().copied())).await?;
    }
    let nick = match &config.login {
        Login::Anonymous => anonymous_nick(),
        Login::Regular { login, token } => {
            sender.write_line(&write::pass(token)).await?;
            login.clone()
        }
    };
    sender.write_line(&write::nick(&nick)).await?;
    sender.write_line(&write::join(&config.channel)).await?;

    let mut joined = Joined::default();
    match tokio::time::timeout(
        config.handshake_timeout,
        wait_for_join(receiver, sender, config, &nick, &mut joined),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => return Err(Error::HandshakeTimeout),
    }

    log::info!("Joined #{} as {}", config.channel, nick);
    Ok(joined)
}

async fn wait_for_join(
    receiver: &mut Receiver,
    sender: &mut Sender,
    config: &Config,
    nick: &str,
    joined: &mut Joined,
) -> Result<()> {
    for _ in 0..config.handshake_line_limit {
        let line = receiver.read_line().await?;
        if let Step::Joined = step(&line, nick, config, sender, joined).await? {
            return Ok(());
        }
    }
    log::warn!("No join confirmation after {} lines", config.handshake_line_limit);
    Err(Error::HandshakeTimeout)
}

async fn step(line: &str, nick: &str, config: &Config, sender: &mut Sender, joined: &mut Joined) -> Result<Step> {
    match tmi::parse(line) {
        ChatEvent::Ping { token } => sender.write_line(&write::pong(&token)).await?,
        ChatEvent::Capability {
            acknowledged: true,
            capabilities,
        } => {
            log::debug!("Capabilities granted: {}", capabilities.join(" "));
            joined.capabilities.extend(capabilities);
        }
        ChatEvent::Capability {
            acknowledged: false,
            capabilities,
        } => log::warn!("Capabilities refused: {}", capabilities.join(" ")),
        ChatEvent::Join { user, channel } if user == nick && channel == config.channel => return Ok(Step::Joined),
        ChatEvent::Reconnect => return Err(Error::ReconnectRequested),
        ChatEvent::Message(message) => joined.backlog.push(message),
        _ => {
            if let Ok(message) = irc::Message::parse(line) {
                match message.cmd {
                    Command::Notice => {
                        let text = message.params.trailing.unwrap_or_default();
                        if AUTH_FAILURES.iter().any(|failure| text.contains(failure)) {
                            return Err(Error::Authentication(text.into()));
                        }
                    }
                    // RPL_ENDOFNAMES
                    Command::Unknown("366") if message.channel == Some(config.channel.as_str()) => {
                        return Ok(Step::Joined)
                    }
                    _ => (),
                }
            }
        }
    }
    Ok(Step::Continue)
}
