//! WebSocket connection loop.
//!
//! Each socket is split in two. A writer task drains the connection's
//! outbound queue into the sink; the receive loop below maps frames to
//! [`Inbound`] messages for the link service and watches for close
//! requests and shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::domain::{CloseSignal, Inbound, Outbound};
use crate::service::LinkService;

/// Runs a single WebSocket connection from accept to disconnect.
pub async fn run_connection(socket: WebSocket, addr: SocketAddr, link: Arc<LinkService>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut shutdown = link.subscribe_shutdown();

    let (tx, rx) = mpsc::channel(link.queue_capacity());
    let handle = match link.accept(addr, tx).await {
        Ok(handle) => handle,
        Err(err) => {
            tracing::warn!(%addr, error = %err, "connection refused");
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };

    let mut writer = tokio::spawn(write_loop(ws_tx, rx, handle.close_signal()));
    let close = handle.close_signal();

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        link.handle_message(&handle, Inbound::Text(text.to_string())).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        link.handle_message(&handle, Inbound::Binary(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(conn_id = %handle.id(), error = %err, "ws read failed");
                        break;
                    }
                }
            }
            () = close.requested() => break,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    link.disconnect(&handle).await;
    drop(handle);

    // The writer ends once every queue sender is gone; a broadcast still
    // holding a handle clone may delay that briefly.
    if tokio::time::timeout(link.send_timeout(), &mut writer).await.is_err() {
        writer.abort();
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    close: CloseSignal,
) {
    while let Some(message) = rx.recv().await {
        let frame = match message {
            Outbound::Text(text) => Message::text(text),
            Outbound::Binary(bytes) => Message::Binary(bytes),
        };
        if let Err(err) = sink.send(frame).await {
            tracing::debug!(error = %err, "ws write failed");
            close.request();
            return;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}
