use anyhow::Result;
use clap::Parser;
use kvfeed_client::FeedClient;

/// Print the changes a node pushes for one app, or one key of it.
#[derive(Parser, Debug)]
#[command(name = "kvfeed-watch")]
struct Args {
    /// Node address, e.g. 127.0.0.1:7070.
    #[arg(env = "KVFEED_NODE")]
    addr: String,

    app_id: String,

    /// Watch only this key instead of the whole app.
    key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut client = FeedClient::connect(&args.addr).await?;
    let target = match &args.key {
        Some(key) => {
            client.subscribe_key(&args.app_id, key).await?;
            format!("{}/{}", args.app_id, key)
        }
        None => {
            client.subscribe_app(&args.app_id).await?;
            args.app_id.clone()
        }
    };
    println!("watching {} on {}", target, args.addr);

    while let Some(event) = client.next_event().await? {
        println!("{} {}/{}", event.name(), event.app_id(), event.key());
    }
    println!("node closed the connection");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_optional() {
        let app = Args::parse_from(["kvfeed-watch", "127.0.0.1:7070", "x"]);
        assert_eq!((app.app_id.as_str(), app.key), ("x", None));

        let key = Args::parse_from(["kvfeed-watch", "127.0.0.1:7070", "x", "k1"]);
        assert_eq!(key.key.as_deref(), Some("k1"));
        assert_eq!(key.addr, "127.0.0.1:7070");
    }
}
