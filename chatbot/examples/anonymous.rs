use chatbot::{ChatBot, Config};

#[tokio::main]
async fn main() {
    let channel = std::env::args().nth(1).unwrap_or_else(|| "moscowwbish".into());
    let bot = ChatBot::with_config(Config::anonymous(&channel));
    bot.connect().await.unwrap();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("CTRL-C");
                break;
            },
            result = bot.get_messages() => match result {
                Ok(messages) => {
                    for message in messages {
                        println!("#{} {}: {}", message.channel, message.display_name(), message.text);
                    }
                },
                Err(err) => {
                    println!("{}", err);
                    break;
                }
            }
        }
    }

    bot.close().await;
}
