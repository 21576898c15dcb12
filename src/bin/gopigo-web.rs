// HTTP front-end: POST /pi {"content": "<command>"}
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use gopigo_runtime::config::{HTTP_LISTEN_ADDR, PUBLIC_DIR};
use gopigo_runtime::device::{Session, bus};
use gopigo_runtime::http;
use gopigo_runtime::runtime::{Shutdown, spawn_dispatcher};

/// Drive a GoPiGo robot over HTTP
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = HTTP_LISTEN_ADDR)]
    listen: String,

    /// Directory served under /public/
    #[arg(long, default_value = PUBLIC_DIR)]
    public_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    gopigo_runtime::logging::init();

    let args = Args::parse();
    let bus = bus::open_default().unwrap_or_else(|e| panic!("Bus initialization failed: {}", e));

    if let Err(e) = run(args, bus).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

async fn run(
    args: Args,
    bus: Box<dyn bus::Bus>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let session = Arc::new(Session::new(bus));
    let shutdown = Shutdown::new();
    let (commands, dispatcher) = spawn_dispatcher(session, shutdown.clone());

    let listener = match TcpListener::bind(&args.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            shutdown.trigger();
            return Err(e.into());
        }
    };

    // A posted `quit` triggers shutdown, which also stops the server
    let served = http::serve(listener, commands, &args.public_dir, shutdown.clone()).await;
    shutdown.trigger();
    let state = dispatcher.await?;
    info!("Finished ({:?})", state);

    served?;
    Ok(())
}
