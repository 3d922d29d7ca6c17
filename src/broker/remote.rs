use bytes::{Bytes, BytesMut};
use kvfeed_protocol::{
    CommitOffsetRequest, ConsumeResponse, ConsumeWithGroupRequest, Frame, FrameType, MetadataRequest,
    MetadataResponse, OffsetReset, OpCode, ProduceAck, ProduceRequest, ProtocolError, RequestPayload,
    ResponsePayload,
};
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::broker::LogBroker;
use crate::core::error::BrokerError;

struct Connection {
    stream: TcpStream,
    buf: BytesMut,
}

/// Client for a broker served by `kvfeed broker`.
///
/// Holds one connection and runs one request at a time on it. A failed,
/// timed out or abandoned request drops the connection; the next request
/// reconnects.
pub struct RemoteBroker {
    addr: String,
    request_timeout: Duration,
    correlation_id: AtomicU32,
    conn: Mutex<Option<Connection>>,
}

impl RemoteBroker {
    pub fn new(addr: impl Into<String>, request_timeout: Duration) -> Self {
        RemoteBroker {
            addr: addr.into(),
            request_timeout,
            correlation_id: AtomicU32::new(0),
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn call(&self, op_code: OpCode, data: Bytes) -> Result<Bytes, BrokerError> {
        let correlation_id = self.correlation_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let payload = RequestPayload { op_code, data }.serialize();
        let frame = Frame::new(FrameType::Request, correlation_id, payload);

        let mut guard = self.conn.lock().await;
        // The connection is out of the slot while a request is in flight. If
        // the caller drops this future mid-request, the half-read connection
        // goes with it and the next call starts on a fresh one.
        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => {
                let stream = TcpStream::connect(&self.addr).await?;
                stream.set_nodelay(true)?;
                debug!(addr = %self.addr, "connected to broker");
                Connection {
                    stream,
                    buf: BytesMut::with_capacity(4096),
                }
            }
        };

        let outcome = tokio::time::timeout(self.request_timeout, round_trip(&mut conn, &frame)).await;
        let response = match outcome {
            Ok(Ok(response)) => {
                *guard = Some(conn);
                response
            }
            Ok(Err(e)) => {
                if matches!(e, BrokerError::Rejected(_)) {
                    *guard = Some(conn);
                } else {
                    warn!(addr = %self.addr, error = %e, "dropping broker connection");
                }
                return Err(e);
            }
            Err(_) => {
                return Err(BrokerError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("broker did not answer within {:?}", self.request_timeout),
                )));
            }
        };

        Ok(ResponsePayload::deserialize(response.payload)?.expect_op(op_code)?)
    }
}

async fn round_trip(conn: &mut Connection, request: &Frame) -> Result<Frame, BrokerError> {
    conn.stream.write_all(&request.to_bytes()).await?;
    conn.stream.flush().await?;

    loop {
        if let Some(frame) = Frame::decode(&mut conn.buf)? {
            if frame.correlation_id != request.correlation_id {
                return Err(ProtocolError::PayloadError(format!(
                    "response for request {} while waiting for {}",
                    frame.correlation_id, request.correlation_id
                ))
                .into());
            }
            return match frame.frame_type {
                FrameType::Response => Ok(frame),
                FrameType::Error => Err(BrokerError::Rejected(
                    String::from_utf8_lossy(&frame.payload).into_owned(),
                )),
                other => Err(ProtocolError::UnexpectedFrameType(other).into()),
            };
        }

        let n = conn.stream.read_buf(&mut conn.buf).await?;
        if n == 0 {
            return Err(BrokerError::Io(io::ErrorKind::UnexpectedEof.into()));
        }
    }
}

impl LogBroker for RemoteBroker {
    async fn append(&self, topic: &str, key: &[u8], payload: Bytes) -> Result<ProduceAck, BrokerError> {
        let req = ProduceRequest {
            topic: topic.to_string(),
            key: Bytes::copy_from_slice(key),
            message: payload,
        };
        let data = self.call(OpCode::Produce, req.serialize()).await?;
        Ok(ProduceAck::deserialize(data)?)
    }

    async fn fetch(
        &self,
        topic: &str,
        partition: u32,
        group: &str,
        reset: OffsetReset,
    ) -> Result<Option<ConsumeResponse>, BrokerError> {
        let req = ConsumeWithGroupRequest {
            topic: topic.to_string(),
            partition,
            group: group.to_string(),
            reset,
        };
        let data = self.call(OpCode::ConsumeWithGroup, req.serialize()).await?;
        Ok(ConsumeResponse::deserialize(data)?)
    }

    async fn partition_count(&self, topic: &str) -> Result<u32, BrokerError> {
        let req = MetadataRequest {
            topic: topic.to_string(),
        };
        let data = self.call(OpCode::Metadata, req.serialize()).await?;
        Ok(MetadataResponse::deserialize(data)?.partition_count)
    }

    async fn commit(&self, topic: &str, partition: u32, group: &str, offset: u64) -> Result<(), BrokerError> {
        let req = CommitOffsetRequest {
            topic: topic.to_string(),
            partition,
            group: group.to_string(),
            offset,
        };
        self.call(OpCode::CommitOffset, req.serialize()).await?;
        Ok(())
    }
}
