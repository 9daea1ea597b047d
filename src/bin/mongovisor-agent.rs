//! Service-host agent: executes channel requests read from stdin and answers on stdout.
//!
//! Started by the supervisor side through any byte pipe, for example:
//! `ssh build-node mongovisor-agent`. Diagnostics go to stderr.
//!
//! Processes launched through the channel are killed when the peer closes it.

use mongovisor::ChannelError;
use mongovisor::channel::{LocalChannel, serve};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ChannelError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mongovisor=info,mongovisor_agent=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("serving execution channel on stdin/stdout");
    let host = LocalChannel::new();
    serve(tokio::io::stdin(), tokio::io::stdout(), &host).await?;
    tracing::info!(?host, "peer closed the channel");
    drop(host);
    Ok(())
}
