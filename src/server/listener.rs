use anyhow::{Context, Result};
use bytes::BytesMut;
use kvfeed_protocol::{ClientEvent, Frame, ProtocolError, ServerEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::watch::Receiver;
use tracing::{debug, info, warn};

use crate::core::lifecycle::{ConnectionLifecycle, Session};

/// Accepts subscriber connections until shutdown. Connections already open
/// keep running until their clients hang up.
pub async fn serve(
    listener: TcpListener,
    lifecycle: Arc<ConnectionLifecycle>,
    mut shutdown_rx: Receiver<()>,
) -> Result<()> {
    info!(addr = ?listener.local_addr().ok(), "accepting subscribers");
    loop {
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => accepted.context("accepting client connection")?,
            _ = shutdown_rx.changed() => break,
        };
        let lifecycle = Arc::clone(&lifecycle);
        tokio::spawn(async move {
            handle_connection(socket, peer, lifecycle).await;
        });
    }
    info!("client listener stopped");
    Ok(())
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, lifecycle: Arc<ConnectionLifecycle>) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, error = %e, "set_nodelay failed");
    }
    let (session, outbound) = lifecycle.open();
    let (reader, writer) = stream.into_split();
    let writer_task = tokio::spawn(write_pushes(writer, outbound, session.id().to_string()));

    let reason = match read_controls(reader, &lifecycle, &session).await {
        Ok(()) => "closed by client".to_string(),
        Err(e) => format!("{:#}", e),
    };

    lifecycle.close(session, &reason).await;
    writer_task.abort();
}

async fn read_controls(
    mut reader: OwnedReadHalf,
    lifecycle: &ConnectionLifecycle,
    session: &Session,
) -> Result<()> {
    let mut buf = BytesMut::with_capacity(1024);

    loop {
        let n = reader
            .read_buf(&mut buf)
            .await
            .map_err(ProtocolError::IoError)?;
        if n == 0 {
            return Ok(());
        }

        // framing errors are fatal; a bad event inside a good frame is not
        while let Some(frame) = Frame::decode(&mut buf)? {
            match ClientEvent::from_frame(&frame) {
                Ok(event) => {
                    debug!(conn_id = %session.id(), ?event, "control event");
                    lifecycle.apply(session, event).await;
                }
                Err(e) => {
                    warn!(conn_id = %session.id(), error = %e, "ignoring control frame");
                }
            }
        }
    }
}

async fn write_pushes(mut writer: OwnedWriteHalf, mut outbound: mpsc::Receiver<ServerEvent>, conn_id: String) {
    let mut out = BytesMut::new();
    while let Some(event) = outbound.recv().await {
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%conn_id, event = event.name(), error = %e, "could not encode push");
                continue;
            }
        };

        out.clear();
        frame.encode(&mut out);
        if let Err(e) = writer.write_all(&out).await {
            debug!(%conn_id, error = %e, "push write failed");
            break;
        }
    }
}
