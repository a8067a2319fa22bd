//! Streaming chat example.
//!
//! Run with:
//! ```bash
//! export CHARAI_ACCESS_TOKEN="identity-provider-token"
//! cargo run --example chat -- <character-id> "Hello there"
//! ```

use std::io::Write;
use std::time::Duration;

use charai::client::Client;
use charai::options::{HttpTransport, TransportOptions};
use futures::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let access_token = std::env::var("CHARAI_ACCESS_TOKEN")
        .expect("CHARAI_ACCESS_TOKEN environment variable must be set");

    let mut args = std::env::args().skip(1);
    let character_id = args.next().expect("usage: chat <character-id> <message>");
    let message = args.next().unwrap_or_else(|| "Hello!".to_string());

    let transport_options =
        TransportOptions::new(HttpTransport::default()).with_timeout(Duration::from_secs(120));
    let mut client = Client::new(transport_options)?;

    client.authenticate(&access_token).await?;
    println!("Signed in as {}", client.session().user_name().unwrap_or("?"));

    let chat = client.continue_last_or_create_chat(&character_id, true).await?;
    let replies = chat.send_message(&client, &message).await?;
    futures::pin_mut!(replies);

    // Each update carries the whole text so far; print only the new tail
    let mut printed = 0;
    let mut started = false;
    while let Some(reply) = replies.next().await {
        match reply {
            Ok(reply) => {
                if !started {
                    print!("{}: ", reply.character_name);
                    started = true;
                }
                if let Some(tail) = reply.text.get(printed..) {
                    print!("{}", tail);
                    printed = reply.text.len();
                }
                std::io::stdout().flush()?;

                if reply.is_final {
                    println!();
                    if let Some(avatar) = reply.avatar_url {
                        println!("(avatar: {})", avatar);
                    }
                }
            }
            Err(e) => {
                eprintln!("\nError in stream: {}", e);
                return Err(e.into());
            }
        }
    }

    Ok(())
}
