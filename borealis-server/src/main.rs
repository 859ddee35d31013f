//! Ground-station server binary.
//!
//! Wires the telemetry engine into a graceful-shutdown toplevel and runs a
//! console on stdin. Console lines are either engine commands (`update`,
//! `replay ...`, `record ...`), status-feed reports in the transport's
//! wire vocabulary (`serial_ports`, `rn2483_connected`, `rn2483_port`) or
//! raw hex transmissions (`radio <hex>`).

use std::time::Duration;

use clap::Parser;
use log::{debug, info, warn};
use miette::{IntoDiagnostic, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

use borealis_core::state::Snapshot;
use borealis_server::engine::{EngineIo, SerialStatus, TelemetryEngine};
use borealis_server::{Cli, SessionConfig, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();
    info!("borealis-server {}", VERSION);

    let config = SessionConfig::from_args(&args);
    let (engine, io) = TelemetryEngine::new(config).into_diagnostic()?;
    let output = args.output;

    Toplevel::new(move |s| async move {
        let snapshot_rx = io.snapshot_tx.subscribe();

        s.start(SubsystemBuilder::new("Telemetry", |subsys| {
            engine.run(subsys)
        }));
        s.start(SubsystemBuilder::new("Console", move |subsys| {
            console(subsys, io)
        }));
        if output {
            s.start(SubsystemBuilder::new("Output", move |subsys| {
                print_snapshots(subsys, snapshot_rx)
            }));
        }
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_secs(5))
    .await
    .into_diagnostic()
}

/// Read stdin lines and dispatch them to the engine's inbound channels
async fn console(subsys: SubsystemHandle, io: EngineIo) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = subsys.on_shutdown_requested() => return Ok(()),
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !dispatch_line(&io, &line).await {
                        warn!("Engine channels closed, console exiting");
                        return Ok(());
                    }
                }
                None => {
                    debug!("stdin closed");
                    return Ok(());
                }
            },
        }
    }
}

/// Route one console line. Returns false when the engine is gone.
async fn dispatch_line(io: &EngineIo, line: &str) -> bool {
    let tokens: Vec<String> = line.split_whitespace().map(String::from).collect();
    let Some(first) = tokens.first().map(String::as_str) else {
        return true;
    };

    match first {
        "serial_ports" => {
            let ports = tokens[1..].to_vec();
            io.serial_tx.send(SerialStatus::Ports(ports)).await.is_ok()
        }
        "rn2483_connected" => {
            let connected = tokens.get(1).map(String::as_str) == Some("true");
            io.serial_tx
                .send(SerialStatus::RadioConnected(connected))
                .await
                .is_ok()
        }
        "rn2483_port" => {
            let port = tokens.get(1).cloned().unwrap_or_default();
            io.serial_tx
                .send(SerialStatus::RadioPort(port))
                .await
                .is_ok()
        }
        "signal" => {
            let report = tokens[1..].join(" ");
            io.signal_tx.send(report).await.is_ok()
        }
        "radio" => match tokens.get(1) {
            Some(hex) => io.radio_tx.send(hex.clone()).await.is_ok(),
            None => {
                warn!("radio line without payload");
                true
            }
        },
        _ => io.command_tx.send(tokens).await.is_ok(),
    }
}

/// Print every published snapshot to stdout as one JSON line
async fn print_snapshots(
    subsys: SubsystemHandle,
    mut snapshot_rx: broadcast::Receiver<Snapshot>,
) -> std::io::Result<()> {
    loop {
        tokio::select! {
            _ = subsys.on_shutdown_requested() => return Ok(()),
            snapshot = snapshot_rx.recv() => match snapshot {
                Ok(snapshot) => match serde_json::to_string(&snapshot) {
                    Ok(json) => println!("{}", json),
                    Err(e) => warn!("Cannot serialize snapshot: {}", e),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Snapshot output lagged, skipped {}", n);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}
