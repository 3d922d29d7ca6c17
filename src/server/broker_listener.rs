use crate::broker::MemoryLog;
use crate::core::error::BrokerError;
use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use kvfeed_protocol::{
    CommitOffsetRequest, ConsumeWithGroupRequest, Frame, FrameType, MetadataRequest, MetadataResponse,
    OpCode, ProduceRequest, ProtocolError, RequestPayload, ResponsePayload,
};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch::Receiver;
use tracing::{debug, info, warn};

/// Serves `log` to [`crate::broker::RemoteBroker`] clients until shutdown.
pub async fn serve(listener: TcpListener, log: Arc<MemoryLog>, mut shutdown_rx: Receiver<()>) -> Result<()> {
    info!(addr = ?listener.local_addr().ok(), partitions = log.partition_count(), "broker listening");
    loop {
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => accepted.context("accepting broker connection")?,
            _ = shutdown_rx.changed() => break,
        };
        let log = Arc::clone(&log);
        debug!(%peer, "new broker connection");
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, log).await {
                warn!(%peer, error = ?e, "broker connection error");
            }
        });
    }
    info!("broker listener stopped");
    Ok(())
}

async fn handle_connection(mut stream: TcpStream, log: Arc<MemoryLog>) -> Result<()> {
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        let n = stream
            .read_buf(&mut buf)
            .await
            .map_err(ProtocolError::IoError)?;
        if n == 0 {
            return Ok(());
        }

        while let Some(frame) = Frame::decode(&mut buf)? {
            if frame.frame_type != FrameType::Request {
                warn!(frame_type = ?frame.frame_type, "ignoring non-request frame");
                continue;
            }

            let reply = match dispatch(frame.payload, &log).await {
                Ok(response) => Frame::new(FrameType::Response, frame.correlation_id, response.serialize()),
                Err(e) => {
                    debug!(error = %e, "request failed");
                    Frame::new(FrameType::Error, frame.correlation_id, e.to_string().into_bytes())
                }
            };

            let mut out = BytesMut::new();
            reply.encode(&mut out);
            stream.write_all(&out).await?;
            stream.flush().await?;
        }
    }
}

async fn dispatch(payload: Bytes, log: &MemoryLog) -> Result<ResponsePayload, BrokerError> {
    let request = RequestPayload::deserialize(payload)?;
    match request.op_code {
        OpCode::Produce => handle_produce(request.data, log).await,
        OpCode::ConsumeWithGroup => handle_consume_with_group(request.data, log).await,
        OpCode::CommitOffset => handle_commit_offset(request.data, log).await,
        OpCode::Metadata => handle_metadata(request.data, log),
    }
}

async fn handle_produce(data: Bytes, log: &MemoryLog) -> Result<ResponsePayload, BrokerError> {
    let req = ProduceRequest::deserialize(data)?;
    let ack = log.produce(&req.topic, &req.key, req.message).await;
    Ok(ResponsePayload {
        op_code: OpCode::Produce,
        data: ack.serialize(),
    })
}

async fn handle_consume_with_group(data: Bytes, log: &MemoryLog) -> Result<ResponsePayload, BrokerError> {
    let req = ConsumeWithGroupRequest::deserialize(data)?;
    let record = log
        .consume_with_group(&req.topic, req.partition, &req.group, req.reset)
        .await?;

    debug!(
        topic = %req.topic,
        partition = req.partition,
        group = %req.group,
        offset = ?record.as_ref().map(|r| r.offset),
        "consume_with_group"
    );

    Ok(ResponsePayload {
        op_code: OpCode::ConsumeWithGroup,
        // empty body: nothing past the committed offset
        data: record.map(|r| r.serialize()).unwrap_or_default(),
    })
}

fn handle_metadata(data: Bytes, log: &MemoryLog) -> Result<ResponsePayload, BrokerError> {
    let req = MetadataRequest::deserialize(data)?;
    let resp = MetadataResponse {
        partition_count: log.partition_count(),
        topic: req.topic,
    };
    Ok(ResponsePayload {
        op_code: OpCode::Metadata,
        data: resp.serialize(),
    })
}

async fn handle_commit_offset(data: Bytes, log: &MemoryLog) -> Result<ResponsePayload, BrokerError> {
    let req = CommitOffsetRequest::deserialize(data)?;
    log.commit_offset(&req.topic, req.partition, &req.group, req.offset)
        .await?;
    debug!(
        topic = %req.topic,
        partition = req.partition,
        group = %req.group,
        offset = req.offset,
        "offset committed"
    );
    Ok(ResponsePayload {
        op_code: OpCode::CommitOffset,
        data: Bytes::new(),
    })
}
