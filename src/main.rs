use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use openhab_bridge::bridge::Bridge;
use openhab_bridge::bus::Topics;
use openhab_bridge::cli::Args;
use openhab_bridge::stdio_bus;

/// Inbound bus events waiting for the command forwarder.
const EVENT_QUEUE_CAP: usize = 64;

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // Updates go to stdout; keep logs on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = args.resolve_config()?;
    let topics = Topics::new(&config.basename);
    info!(
        server = %config.base_url(),
        group = %config.group_name,
        basename = %config.basename,
        "starting bridge"
    );

    let Bridge {
        poll_loop,
        forwarder,
        updates,
        ..
    } = Bridge::builder(config).build()?;

    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAP);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poll_task = tokio::spawn(poll_loop.run(shutdown_rx));
    let mut forward_task = tokio::spawn(forwarder.run(event_rx));
    let mut output_task = tokio::spawn(stdio_bus::pump_updates(
        tokio::io::stdout(),
        topics.clone(),
        updates,
    ));
    // Detached: a pending stdin read must not keep the runtime alive on exit.
    stdio_bus::spawn_event_reader(std::io::BufReader::new(std::io::stdin()), topics, event_tx)?;

    let mut forwarding = true;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("ctrl-c received, shutting down");
                break;
            }
            res = &mut output_task => {
                // Write errors were already logged by the pump.
                match res {
                    Ok(Ok(())) => info!("bus output finished, shutting down"),
                    Ok(Err(_)) => warn!("bus output unusable, shutting down"),
                    Err(e) => error!(error = %e, "bus output task panicked, shutting down"),
                }
                break;
            }
            res = &mut forward_task, if forwarding => {
                forwarding = false;
                if let Err(e) = res {
                    error!(error = %e, "command forwarder task panicked");
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = poll_task.await {
        error!(error = %e, "poll loop task panicked");
    }

    Ok(())
}
