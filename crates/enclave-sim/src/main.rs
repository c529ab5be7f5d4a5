//! Standalone enclave simulator.

use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use enclave_sim::{serve, EnclaveSimulator};

#[derive(Parser)]
#[command(name = "enclave-sim")]
#[command(about = "Simulated confidential-compute service")]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "ENCLAVE_LISTEN_ADDR", default_value = "127.0.0.1:20000")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("enclave_sim=info".parse()?)
                .add_directive("jsonrpsee=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let (addr, handle) = serve(cli.listen, EnclaveSimulator::demo()).await?;
    info!("Enclave simulator running on {}. Press Ctrl+C to stop.", addr);

    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    handle.stop()?;
    handle.stopped().await;

    Ok(())
}
