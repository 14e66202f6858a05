//! SPOE agent: TCP listener and per-connection frame loop.
//!
//! Every accepted connection runs in its own task tracked by the
//! [`ShutdownCoordinator`]. Frames on a connection are handled strictly in
//! arrival order, so ACKs leave in the same order as their NOTIFYs.

use std::future::Future;
use std::io;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::{ErrorCode, GatekeeperError};
use crate::observability::AuthMetrics;
use crate::shutdown::{ShutdownCoordinator, ShutdownSignal};
use crate::spoe::frame::{Frame, FrameError, FrameType, LENGTH_PREFIX};
use crate::spoe::handler::{NotifyHandler, TransactionContext, REASON_INVALID_MESSAGE};
use crate::spoe::handshake::{negotiate, Disconnect, DisconnectStatus, HaproxyHello};
use crate::spoe::message::{decode_messages, encode_actions};

const READ_CHUNK: usize = 4096;

/// Splits length-prefixed frames out of a byte stream.
///
/// Input is accumulated in an internal buffer, so [`next_frame`] is cancel
/// safe: dropping it mid-frame keeps the bytes read so far for the next call.
///
/// [`next_frame`]: FrameReader::next_frame
#[derive(Debug)]
pub struct FrameReader {
    buf: BytesMut,
    max_frame_size: u32,
}

impl FrameReader {
    pub fn new(max_frame_size: u32) -> Self {
        Self {
            buf: BytesMut::with_capacity(READ_CHUNK),
            max_frame_size,
        }
    }

    /// Applies the limit agreed during the handshake.
    pub fn set_max_frame_size(&mut self, max_frame_size: u32) {
        self.max_frame_size = max_frame_size;
    }

    /// True when no partial frame is buffered.
    pub fn is_idle(&self) -> bool {
        self.buf.is_empty()
    }

    /// Next complete frame. `Ok(None)` means the peer closed the connection
    /// between frames; closing inside a frame is an I/O error.
    pub async fn next_frame<R>(&mut self, reader: &mut R) -> Result<Option<Frame>, GatekeeperError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            if let Some(frame) = self.split_frame()? {
                return Ok(Some(frame));
            }
            if reader.read_buf(&mut self.buf).await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
        }
    }

    fn split_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let Some(prefix) = self.buf.get(..LENGTH_PREFIX) else {
            return Ok(None);
        };
        let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if len > self.max_frame_size as usize {
            return Err(FrameError::TooBig {
                size: len,
                max: self.max_frame_size as usize,
            });
        }

        let total = LENGTH_PREFIX + len;
        if self.buf.len() < total {
            self.buf.reserve(total - self.buf.len());
            return Ok(None);
        }
        self.buf.advance(LENGTH_PREFIX);
        Frame::decode(self.buf.split_to(len).freeze()).map(Some)
    }
}

pub async fn write_frame<W>(writer: &mut W, frame: Frame) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut out = BytesMut::new();
    frame.encode(&mut out);
    writer.write_all(&out).await?;
    writer.flush().await
}

#[derive(Debug, Clone)]
pub struct Agent {
    handler: Arc<NotifyHandler>,
    max_frame_size: u32,
    metrics: Option<Arc<AuthMetrics>>,
}

impl Agent {
    pub fn new(handler: NotifyHandler, max_frame_size: u32) -> Self {
        Self {
            handler: Arc::new(handler),
            max_frame_size,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<AuthMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Binds `host:port`, resolving host names.
    pub async fn bind(addr: &str) -> Result<TcpListener, GatekeeperError> {
        TcpListener::bind(addr)
            .await
            .map_err(|e| GatekeeperError::transport(addr, e))
    }

    /// Accepts connections until `stop` resolves. Connection tasks are left
    /// running in `coordinator` for the caller to drain.
    pub async fn serve<F>(&self, listener: TcpListener, coordinator: &mut ShutdownCoordinator, stop: F)
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, max_frame_size = self.max_frame_size, "SPOE agent listening");
        }
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = &mut stop => {
                    info!("SPOE agent stopped accepting connections");
                    return;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let _ = stream.set_nodelay(true);
                        let agent = self.clone();
                        coordinator.spawn("spoe-connection", move |signal| {
                            async move {
                                debug!("connection accepted");
                                if let Err(e) = agent.serve_connection(stream, signal).await {
                                    warn!(error = %e, code = e.code().as_str(), "connection closed with error");
                                }
                            }
                            .instrument(info_span!("spoe_connection", %peer))
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }
    }

    /// Runs the handshake and then answers NOTIFY frames until the peer
    /// disconnects or shutdown is signalled. Shutdown takes effect at a frame
    /// boundary: a partly received frame is read to the end and answered
    /// before AGENT-DISCONNECT goes out.
    pub async fn serve_connection<S>(&self, mut stream: S, mut shutdown: ShutdownSignal) -> Result<(), GatekeeperError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut reader = FrameReader::new(self.max_frame_size);
        let Some(max_frame_size) = self.handshake(&mut stream, &mut reader).await? else {
            return Ok(());
        };
        reader.set_max_frame_size(max_frame_size);

        let mut draining = false;
        loop {
            let next = if draining {
                if reader.is_idle() {
                    debug!("closing connection for shutdown");
                    self.send_disconnect(&mut stream, DisconnectStatus::Normal).await?;
                    return Ok(());
                }
                reader.next_frame(&mut stream).await
            } else {
                tokio::select! {
                    _ = shutdown.recv() => {
                        draining = true;
                        continue;
                    }
                    next = reader.next_frame(&mut stream) => next,
                }
            };

            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("peer closed connection");
                    return Ok(());
                }
                Err(GatekeeperError::Framing(e)) => return Err(self.refuse(&mut stream, e).await),
                Err(e) => return Err(e),
            };
            self.record_frame(frame.frame_type);

            match frame.frame_type {
                FrameType::Notify => {
                    if !frame.is_fin() || frame.is_abort() {
                        return Err(self.refuse(&mut stream, FrameError::Fragmented).await);
                    }
                    let ack = self.answer_notify(frame);
                    write_frame(&mut stream, ack).await?;
                    self.record_frame(FrameType::Ack);
                }
                FrameType::HaproxyDisconnect => {
                    match Disconnect::decode(frame.payload) {
                        Ok(d) => info!(status = d.status.code(), message = %d.message, "HAProxy disconnected"),
                        Err(e) => debug!(error = %e, "undecodable HAPROXY-DISCONNECT"),
                    }
                    self.send_disconnect(&mut stream, DisconnectStatus::Normal).await?;
                    return Ok(());
                }
                other => return Err(self.refuse(&mut stream, FrameError::Unexpected(other.as_str())).await),
            }
        }
    }

    /// Returns the negotiated frame size, or `None` when the connection is
    /// done after the handshake (health checks, refused versions).
    async fn handshake<S>(&self, stream: &mut S, reader: &mut FrameReader) -> Result<Option<u32>, GatekeeperError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let frame = match reader.next_frame(stream).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(GatekeeperError::Framing(e)) => return Err(self.refuse(stream, e).await),
            Err(e) => return Err(e),
        };
        self.record_frame(frame.frame_type);

        if frame.frame_type != FrameType::HaproxyHello {
            return Err(self
                .refuse(stream, FrameError::Unexpected(frame.frame_type.as_str()))
                .await);
        }
        if !frame.is_fin() || frame.is_abort() {
            return Err(self.refuse(stream, FrameError::Fragmented).await);
        }

        let hello = match HaproxyHello::decode(frame.payload) {
            Ok(hello) => hello,
            Err(e) => return Err(self.refuse(stream, e).await),
        };

        let reply = match negotiate(&hello, self.max_frame_size) {
            Ok(reply) => reply,
            Err(status) => {
                warn!(status = status.code(), reason = status.message(), "handshake refused");
                self.send_disconnect(stream, status).await?;
                return Ok(None);
            }
        };

        let negotiated = reply.max_frame_size;
        debug!(
            engine_id = hello.engine_id.as_deref().unwrap_or(""),
            healthcheck = hello.healthcheck,
            max_frame_size = negotiated,
            capabilities = %reply.capabilities.join(","),
            "handshake complete"
        );
        write_frame(stream, reply.into_frame()).await?;
        self.record_frame(FrameType::AgentHello);

        if hello.healthcheck {
            return Ok(None);
        }
        Ok(Some(negotiated))
    }

    fn answer_notify(&self, frame: Frame) -> Frame {
        let ctx = match decode_messages(frame.payload) {
            Ok(messages) => self.handler.handle(&messages),
            Err(e) => {
                warn!(
                    stream_id = frame.stream_id,
                    frame_id = frame.frame_id,
                    error = %e,
                    code = ErrorCode::Framing.as_str(),
                    "undecodable NOTIFY payload"
                );
                TransactionContext::denied(REASON_INVALID_MESSAGE)
            }
        };
        Frame::new(
            FrameType::Ack,
            frame.stream_id,
            frame.frame_id,
            encode_actions(&ctx.into_actions()),
        )
    }

    /// Sends AGENT-DISCONNECT for a protocol error and hands the error back.
    async fn refuse<S>(&self, stream: &mut S, error: FrameError) -> GatekeeperError
    where
        S: AsyncWrite + Unpin,
    {
        if let Err(e) = self.send_disconnect(stream, error.status()).await {
            debug!(error = %e, "could not send AGENT-DISCONNECT");
        }
        error.into()
    }

    async fn send_disconnect<S>(&self, stream: &mut S, status: DisconnectStatus) -> io::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        write_frame(stream, Disconnect::new(status).into_frame()).await?;
        self.record_frame(FrameType::AgentDisconnect);
        stream.shutdown().await
    }

    fn record_frame(&self, frame_type: FrameType) {
        if let Some(metrics) = &self.metrics {
            metrics.record_frame(frame_type.as_str());
        }
    }
}
