// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! JSON-over-TCP listener for lander-server.
//!
//! Accepts plan executor connections speaking the protocol defined in
//! `protocol`. Command completions are pushed to every connected client.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use lander_core::{FaultDomain, Lander, Operation};

use crate::protocol::{parse_request, ClientResponse, Request, StatusPush, StatusReport};

/// Run the JSON TCP listener, accepting client connections.
pub async fn run_listener(
    addr: SocketAddr,
    lander: Arc<Lander>,
    status_tx: broadcast::Sender<StatusReport>,
    shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);
    serve(listener, lander, status_tx, shutdown_rx).await
}

/// Accept loop over an already bound socket.
pub async fn serve(
    listener: TcpListener,
    lander: Arc<Lander>,
    status_tx: broadcast::Sender<StatusReport>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    loop {
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = wait_for_shutdown(&mut shutdown_rx) => {
                info!("Listener shutting down");
                return Ok(());
            }
        };
        info!("Client connected: {}", peer);

        let lander = Arc::clone(&lander);
        let status_rx = status_tx.subscribe();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(socket, peer, lander, status_rx, shutdown_rx).await {
                error!("Client {} error: {:?}", peer, e);
            }
        });
    }
}

pub(crate) async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

async fn handle_client(
    socket: TcpStream,
    addr: SocketAddr,
    lander: Arc<Lander>,
    mut status_rx: broadcast::Receiver<StatusReport>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    // `next_line` is cancel safe, so it can sit in the select below.
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Client {} disconnected", addr);
                    break;
                };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let resp = handle_line(&lander, trimmed);
                if let Some(err) = &resp.error {
                    debug!("Request from {} rejected: {}", addr, err);
                }
                write_json(&mut writer, &resp).await?;
            }
            status = status_rx.recv() => match status {
                Ok(status) => write_json(&mut writer, &StatusPush { status }).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Client {} missed {} status report(s)", addr, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = wait_for_shutdown(&mut shutdown_rx) => break,
        }
    }

    Ok(())
}

async fn write_json<T: serde::Serialize>(
    writer: &mut OwnedWriteHalf,
    value: &T,
) -> std::io::Result<()> {
    let resp_line = serde_json::to_string(value)? + "\n";
    writer.write_all(resp_line.as_bytes()).await?;
    writer.flush().await
}

/// Execute one request line against the lander.
pub fn handle_line(lander: &Lander, line: &str) -> ClientResponse {
    let request = match parse_request(line) {
        Ok(request) => request,
        Err(e) => {
            error!("Invalid JSON: {} / {:?}", line, e);
            return ClientResponse::error(format!("Invalid JSON: {}", e));
        }
    };

    match request {
        Request::Submit(command, id) => {
            let op = command.operation();
            if lander.submit(command, id) {
                ClientResponse::ok()
            } else {
                ClientResponse::error(format!("{} is already running", op))
            }
        }
        Request::Running(name) => match name.parse::<Operation>() {
            Ok(op) => ClientResponse {
                running: Some(lander.is_running(op)),
                ..ClientResponse::ok()
            },
            Err(e) => {
                error!("{}", e);
                ClientResponse::error(e.to_string())
            }
        },
        Request::GetState => ClientResponse {
            state: Some(lander.snapshot()),
            ..ClientResponse::ok()
        },
        Request::FaultSnapshot { domain, value } => match domain.parse::<FaultDomain>() {
            Ok(domain) => {
                lander.on_fault_snapshot(domain, value);
                ClientResponse::ok()
            }
            Err(e) => ClientResponse::error(e.to_string()),
        },
    }
}
