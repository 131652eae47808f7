// ABOUTME: Long-running peer example demonstrating dial retry and graceful
// ABOUTME: shutdown, analogous to a keep-alive client but driven by dpx's own retry policy

use argh::FromArgs;
use dpx::config::DpxConfig;
use dpx::frame::Frame;
use dpx::peer::Peer;
use std::error::Error;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Run a peer that dials a remote endpoint, exchanges messages on an
/// interval, and shuts down cleanly after a fixed duration
#[derive(FromArgs)]
struct CliArgs {
    /// remote host to dial
    #[argh(option)]
    host: String,

    /// remote port to dial
    #[argh(option, short = 'p', default = "9876")]
    port: u16,

    /// seconds between messages (default: 5)
    #[argh(option, default = "5")]
    interval: u64,

    /// total run duration in seconds (default: 60)
    #[argh(option, default = "60")]
    run_duration: u64,

    /// dial retry attempts before giving up (default: 20)
    #[argh(option, default = "20")]
    retry_attempts: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = DpxConfig::default().with_retry(cli_args.retry_attempts, Duration::from_secs(1));
    let peer = Peer::with_config(config);
    peer.connect(cli_args.host.clone(), cli_args.port).await;
    info!(host = %cli_args.host, port = cli_args.port, "dialing remote peer");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(cli_args.run_duration);
    let mut sent: u64 = 0;

    loop {
        if tokio::time::Instant::now() >= deadline {
            info!(sent, "run duration elapsed, shutting down");
            break;
        }

        match peer.open("heartbeat").await {
            Some(channel) => {
                let payload = format!("beat {sent}").into_bytes();
                if let Err(err) = channel
                    .send_frame(Frame::data().with_payload(payload).with_last(true))
                    .await
                {
                    warn!(%err, "failed to send heartbeat");
                } else {
                    sent += 1;
                    if let Some(reply) = channel.receive_frame().await {
                        info!(sent, len = reply.payload.len(), "heartbeat acknowledged");
                    }
                }
            }
            None => {
                warn!("peer closed, stopping");
                break;
            }
        }

        sleep(Duration::from_secs(cli_args.interval)).await;
    }

    peer.close().await;
    Ok(())
}
