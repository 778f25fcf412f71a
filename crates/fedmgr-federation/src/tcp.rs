//! TCP implementation of the controller transport.
//!
//! Length-prefixed framing: a 4-byte big-endian u32 length followed by a
//! bincode payload. When a [`ControllerSecret`] is configured, an
//! HMAC-SHA256 tag is appended to the payload inside the frame and the
//! receiver verifies it before deserializing.
//!
//! A connection is persistent: the client side keeps one stream per
//! sibling and exchanges strictly alternating request/response frames
//! over it, and [`serve_connection`] answers them in order.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::auth::{ControllerSecret, TAG_LEN};
use crate::error::TransportError;
use crate::transport::{
    ControllerConn, ControllerRequest, ControllerResponse, ControllerTransport, RequestHandler,
    TransportConfig,
};

/// Maximum frame size. Controller messages are tiny; a federation info
/// response with a few dozen clusters is a few kilobytes.
pub(crate) const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Writes one frame, tagging it when `secret` is set.
///
/// Wire format: `[4-byte len][bincode payload][32-byte tag if authenticated]`.
pub(crate) async fn write_frame<W, T>(
    w: &mut W,
    msg: &T,
    secret: Option<&ControllerSecret>,
) -> io::Result<()>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let data =
        bincode::serialize(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let tag = secret.map(|s| s.sign(&data));
    let total = data.len() + tag.as_ref().map_or(0, |t| t.len());
    if total > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame size {total} exceeds limit {MAX_FRAME_SIZE}"),
        ));
    }
    w.write_all(&(total as u32).to_be_bytes()).await?;
    w.write_all(&data).await?;
    if let Some(tag) = tag {
        w.write_all(&tag).await?;
    }
    w.flush().await
}

/// Reads one frame, verifying its tag when `secret` is set.
pub(crate) async fn read_frame<R, T>(r: &mut R, secret: Option<&ControllerSecret>) -> io::Result<T>
where
    R: AsyncReadExt + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame size {len} exceeds limit {MAX_FRAME_SIZE}"),
        ));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await?;

    let payload = match secret {
        Some(secret) => {
            if len < TAG_LEN {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "frame too short for auth tag",
                ));
            }
            let (payload, tag) = buf.split_at(len - TAG_LEN);
            if !secret.verify(payload, tag) {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "controller auth failed",
                ));
            }
            payload
        }
        None => &buf[..],
    };
    bincode::deserialize(payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Connects to sibling controllers over TCP.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    config: TransportConfig,
    secret: Option<Arc<ControllerSecret>>,
}

impl TcpTransport {
    pub fn new(config: TransportConfig, secret: Option<Arc<ControllerSecret>>) -> Self {
        Self { config, secret }
    }
}

#[async_trait]
impl ControllerTransport for TcpTransport {
    async fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Box<dyn ControllerConn>, TransportError> {
        let timeout = self.config.connect_timeout;
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
            .map_err(|source| TransportError::Connect {
                host: host.to_string(),
                port,
                source,
            })?;
        stream.set_nodelay(true)?;

        Ok(Box::new(TcpConn {
            stream,
            secret: self.secret.clone(),
            request_timeout: self.config.request_timeout,
        }))
    }
}

/// A persistent TCP connection to one controller.
struct TcpConn {
    stream: TcpStream,
    secret: Option<Arc<ControllerSecret>>,
    request_timeout: Duration,
}

impl TcpConn {
    async fn exchange(&mut self, req: &ControllerRequest) -> io::Result<ControllerResponse> {
        let secret = self.secret.as_deref();
        write_frame(&mut self.stream, req, secret).await?;
        read_frame(&mut self.stream, secret).await
    }
}

#[async_trait]
impl ControllerConn for TcpConn {
    async fn send_recv(
        &mut self,
        req: &ControllerRequest,
    ) -> Result<ControllerResponse, TransportError> {
        let timeout = self.request_timeout;
        match tokio::time::timeout(timeout, self.exchange(req)).await {
            Err(_) => Err(TransportError::Timeout(timeout)),
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Err(TransportError::Closed),
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Ok(Ok(resp)) => Ok(resp),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        let mut conn = self;
        conn.stream.shutdown().await?;
        Ok(())
    }
}

/// Answers requests on an accepted controller connection until the peer
/// disconnects.
///
/// Returns `Ok(())` on a clean disconnect between frames. A frame that
/// fails authentication or decoding ends the connection with an error.
pub async fn serve_connection(
    mut stream: TcpStream,
    handler: Arc<dyn RequestHandler>,
    secret: Option<Arc<ControllerSecret>>,
) -> io::Result<()> {
    let secret = secret.as_deref();
    loop {
        let req: ControllerRequest = match read_frame(&mut stream, secret).await {
            Ok(req) => req,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        debug!(msg_type = req.msg_type(), "controller request");
        let resp = handler.handle(req).await;
        write_frame(&mut stream, &resp, secret).await?;
    }
}
