use std::path::Path;

use tally_core::sync::{DataChanged, HttpReachabilityProbe};
use tokio::sync::{broadcast, watch};

use crate::commands::common::{open_engine, PROBE_INTERVAL};
use crate::error::CliError;

pub async fn run_watch(data_dir: &Path) -> Result<(), CliError> {
    let context = open_engine(data_dir).await?;
    let config = context.require_backend()?;
    context.require_session()?;
    let engine = &context.engine;

    let probe = HttpReachabilityProbe::new(config, PROBE_INTERVAL)?;
    let initially_reachable = probe.check().await;
    engine.handle_path_change(initially_reachable).await;
    let (reachability_tx, reachability_rx) = watch::channel(initially_reachable);
    let probe_task = probe.spawn(reachability_tx);
    let network_task = engine.spawn_network_listener(reachability_rx);

    if initially_reachable {
        if let Err(error) = engine.incremental_sync().await {
            tracing::warn!(%error, "Initial pull failed");
        }
    }
    engine.start_realtime().await?;

    let mut changes = engine.subscribe_changes();
    let mut state = engine.subscribe_state();
    let mut was_online = initially_reachable;
    println!("Watching for changes. Press Ctrl-C to stop.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = changes.recv() => match event {
                Ok(event) => println!("{}", describe_change(&event)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Missed change notifications");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = state.borrow_and_update().is_online;
                if online != was_online {
                    was_online = online;
                    println!("{}", if online { "Back online" } else { "Offline; changes will queue" });
                    if online {
                        // Catch up on anything realtime missed while offline
                        if let Err(error) = engine.incremental_sync().await {
                            tracing::warn!(%error, "Catch-up pull failed");
                        }
                        if let Err(error) = engine.start_realtime().await {
                            tracing::warn!(%error, "Realtime resubscribe failed");
                        }
                    }
                }
            }
        }
    }

    engine.stop_realtime().await;
    probe_task.abort();
    network_task.abort();
    Ok(())
}

fn describe_change(event: &DataChanged) -> String {
    let tables = event
        .tables
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("{:?}: {tables} changed", event.source)
}
