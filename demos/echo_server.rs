// ABOUTME: Minimal peer that binds a listener and echoes every inbound
// ABOUTME: channel's frames back to the sender until the channel's last frame

use argh::FromArgs;
use dpx::frame::Frame;
use dpx::peer::Peer;
use std::error::Error;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Bind a dpx peer and echo every received frame back on the same channel
#[derive(FromArgs)]
struct CliArgs {
    /// address to bind on (default: 0.0.0.0)
    #[argh(option, default = "String::from(\"0.0.0.0\")")]
    addr: String,

    /// port to listen on
    #[argh(option, short = 'p', default = "9876")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let peer = Peer::new();
    let local_addr = peer.bind(&cli_args.addr, cli_args.port).await?;
    info!(%local_addr, "echo server listening");

    loop {
        let Some(channel) = peer.accept().await else {
            break;
        };
        tokio::spawn(async move {
            while let Some(frame) = channel.receive_frame().await {
                let last = frame.last;
                let reply = Frame::data().with_payload(frame.payload).with_last(last);
                if channel.send_frame(reply).await.is_err() {
                    break;
                }
                if last {
                    break;
                }
            }
        });
    }

    Ok(())
}
