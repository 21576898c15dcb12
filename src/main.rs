use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::info;

use gopigo_runtime::device::{Session, bus};
use gopigo_runtime::runtime::{Shutdown, read_commands, spawn_dispatcher};

/// Drive a GoPiGo robot from text commands, one per line
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// File containing commands (read from stdin when omitted)
    script: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    gopigo_runtime::logging::init();

    let args = Args::parse();

    // Without a bus there is nothing to drive
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

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &args.script {
        Some(path) => {
            info!("Reading commands from {}", path.display());
            match tokio::fs::File::open(path).await {
                Ok(file) => Box::new(BufReader::new(file)),
                Err(e) => {
                    // Nothing to run: stop the dispatcher and exit normally
                    tracing::error!("Error opening {}: {}", path.display(), e);
                    shutdown.trigger();
                    dispatcher.await?;
                    return Ok(());
                }
            }
        }
        None => {
            info!("Reading commands from stdin");
            Box::new(BufReader::new(tokio::io::stdin()))
        }
    };

    read_commands(reader, commands, shutdown).await;
    let state = dispatcher.await?;
    info!("Finished ({:?})", state);
    Ok(())
}
