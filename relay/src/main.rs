use anyhow::Result;
use chatbot::{ChatBot, Message, MessageKind};

mod config;
mod util;
use config::Config;

fn init_logger() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    Ok(pretty_env_logger::try_init()?)
}

/// First argument, or the `Config.toml` next to the manifest
fn config_path(mut args: impl Iterator<Item = String>) -> String {
    args.nth(1)
        .unwrap_or_else(|| format!("{}/Config.toml", env!("CARGO_MANIFEST_DIR")))
}

async fn handle(bot: &ChatBot, message: &Message) -> chatbot::Result<()> {
    match message.kind {
        MessageKind::Privmsg => {
            println!("#{} {}: {}", message.channel, message.display_name(), message.text);
            if let Some(("ping", _)) = util::split_cmd("!", &message.text) {
                bot.reply(message, "pong").await?;
            }
        }
        kind => println!("#{} [{}] {}", message.channel, kind, message.text),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger()?;

    let config = Config::init(&config_path(std::env::args()));
    let bot = ChatBot::with_config(config.chatbot());
    bot.connect().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("CTRL-C");
                break;
            },
            result = bot.get_messages() => match result {
                Ok(messages) => {
                    for message in &messages {
                        if let Err(err) = handle(&bot, message).await {
                            log::error!("Failed to respond: {}", err);
                        }
                    }
                },
                Err(err) => {
                    // reconnecting is left to whoever runs us
                    log::error!("Disconnected: {}", err);
                    break;
                }
            }
        }
    }

    bot.close().await;
    Ok(())
}
