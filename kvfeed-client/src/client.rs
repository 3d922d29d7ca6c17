use anyhow::Context;
use bytes::BytesMut;
use kvfeed_protocol::{ClientEvent, Frame, ProtocolError, ServerEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// A subscriber connection to a kvfeed node.
///
/// Control events are fire-and-forget: the node sends nothing back for them,
/// so a subscription is in place once the node has read the frame.
pub struct FeedClient {
    stream: TcpStream,
    buf: BytesMut,
}

impl FeedClient {
    pub async fn connect(addr: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .context("Failed to connect to kvfeed node")?;
        stream.set_nodelay(true)?;

        Ok(FeedClient {
            stream,
            buf: BytesMut::with_capacity(4096),
        })
    }

    pub async fn send(&mut self, event: &ClientEvent) -> Result<(), ProtocolError> {
        let mut out = BytesMut::new();
        event.to_frame()?.encode(&mut out);
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub async fn subscribe_key(&mut self, app_id: &str, key: &str) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::SubscribeKey {
            app_id: app_id.to_string(),
            key: key.to_string(),
        })
        .await
    }

    pub async fn unsubscribe_key(&mut self, app_id: &str, key: &str) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::UnsubscribeKey {
            app_id: app_id.to_string(),
            key: key.to_string(),
        })
        .await
    }

    pub async fn subscribe_app(&mut self, app_id: &str) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::SubscribeApp {
            app_id: app_id.to_string(),
        })
        .await
    }

    pub async fn unsubscribe_app(&mut self, app_id: &str) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::UnsubscribeApp {
            app_id: app_id.to_string(),
        })
        .await
    }

    /// Writes raw bytes as-is. Lets callers exercise how a node handles
    /// payloads this client would never produce.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Waits for the next push. `None` once the node closed the connection.
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>, ProtocolError> {
        loop {
            if let Some(frame) = Frame::decode(&mut self.buf)? {
                return ServerEvent::from_frame(&frame).map(Some);
            }

            let n = self.stream.read_buf(&mut self.buf).await?;
            if n == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(ProtocolError::IncompleteFrame)
                };
            }
        }
    }
}
