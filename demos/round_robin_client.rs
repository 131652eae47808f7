// ABOUTME: Dials several servers and opens many channels to show the peer's
// ABOUTME: round-robin load balancing of outgoing OPEN frames across connections

use argh::FromArgs;
use dpx::frame::Frame;
use dpx::peer::Peer;
use std::error::Error;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Dial every given host:port pair and spread channel opens across them
#[derive(FromArgs)]
struct CliArgs {
    /// comma-separated host:port pairs to dial
    #[argh(option, short = 's')]
    servers: String,

    /// how many channels to open in total
    #[argh(option, short = 'n', default = "10")]
    count: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let client = Peer::new();
    for endpoint in cli_args.servers.split(',') {
        let (host, port) = endpoint
            .trim()
            .rsplit_once(':')
            .ok_or("expected host:port")?;
        let port: u16 = port.parse()?;
        client.connect(host.to_string(), port).await;
        info!(host, port, "dialing");
    }

    for i in 0..cli_args.count {
        let Some(channel) = client.open("echo").await else {
            break;
        };
        let payload = format!("message {i}").into_bytes();
        channel
            .send_frame(Frame::data().with_payload(payload).with_last(true))
            .await?;
        if let Some(reply) = channel.receive_frame().await {
            info!(i, len = reply.payload.len(), "got reply");
        }
    }

    client.close().await;
    Ok(())
}
