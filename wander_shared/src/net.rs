//! Networking primitives.
//!
//! Goals:
//! - One reliable, ordered TCP stream per client.
//! - Length-prefixed JSON frames (4-byte big-endian length, then payload).
//! - Split read/write halves so a connection can be read and written from
//!   different tasks.

use std::{
    fmt,
    net::SocketAddr,
    sync::atomic::{AtomicU32, Ordering},
};

use anyhow::Context;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    time,
};
use tracing::debug;

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default upper bound on a single frame payload.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

static NEXT_CLIENT_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a connected client. Assigned by the server, stable for the
/// lifetime of the connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ClientId(pub u32);

impl ClientId {
    pub fn new_unique() -> Self {
        ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serializes a message into a complete frame (length prefix included).
pub fn encode_frame<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    Ok(buf.freeze())
}

/// Decodes a frame payload (without the length prefix).
pub fn decode_payload<T: DeserializeOwned>(b: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(b).context("deserialize msg")
}

/// Reading half of a framed connection.
///
/// Bytes are buffered internally, so dropping a pending `recv_frame` (for
/// example on timeout) never loses part of a frame.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_len: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(4096),
            max_len,
        }
    }

    /// Reads one frame payload. `Ok(None)` means the peer closed cleanly
    /// between frames.
    pub async fn recv_frame(&mut self) -> anyhow::Result<Option<Bytes>> {
        loop {
            if self.buf.len() >= 4 {
                let mut header = [0u8; 4];
                header.copy_from_slice(&self.buf[..4]);
                let len = u32::from_be_bytes(header) as usize;
                if len > self.max_len {
                    debug!(len, limit = self.max_len, "Oversized frame rejected");
                    anyhow::bail!("frame of {len} bytes exceeds limit of {}", self.max_len);
                }
                if self.buf.len() >= 4 + len {
                    self.buf.advance(4);
                    return Ok(Some(self.buf.split_to(len).freeze()));
                }
            }

            self.buf.reserve(4096);
            let n = self.inner.read_buf(&mut self.buf).await.context("tcp read")?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                anyhow::bail!("connection closed mid-frame");
            }
        }
    }

    /// Reads and decodes one message. A decode failure is an error.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<Option<T>> {
        match self.recv_frame().await? {
            Some(payload) => decode_payload(&payload).map(Some),
            None => Ok(None),
        }
    }
}

/// Writing half of a framed connection.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes an already-encoded frame.
    pub async fn send_frame(&mut self, frame: &[u8]) -> anyhow::Result<()> {
        self.inner.write_all(frame).await.context("tcp write")?;
        Ok(())
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        let frame = encode_frame(msg)?;
        self.send_frame(&frame).await
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.inner.shutdown().await.context("tcp shutdown")?;
        Ok(())
    }
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    pub reader: FrameReader<OwnedReadHalf>,
    pub writer: FrameWriter<OwnedWriteHalf>,
    peer: SocketAddr,
}

impl ReliableConn {
    pub fn new(stream: TcpStream, max_len: usize) -> anyhow::Result<Self> {
        let peer = stream.peer_addr().context("peer addr")?;
        stream.set_nodelay(true).context("set nodelay")?;
        let (read, write) = stream.into_split();
        Ok(Self {
            reader: FrameReader::new(read, max_len),
            writer: FrameWriter::new(write),
            peer,
        })
    }

    /// Connects to `addr`, accepting inbound frames up to `max_len` bytes.
    pub async fn connect(addr: SocketAddr, max_len: usize) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        Self::new(stream, max_len)
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        self.writer.send(msg).await
    }

    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<Option<T>> {
        self.reader.recv().await
    }

    /// Receives a message within the given timeout. `Ok(None)` on timeout.
    pub async fn recv_timeout<T: DeserializeOwned>(
        &mut self,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Option<T>> {
        match time::timeout(timeout, self.reader.recv()).await {
            Ok(Ok(Some(msg))) => Ok(Some(msg)),
            Ok(Ok(None)) => anyhow::bail!("connection closed by peer"),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn into_split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        (self.reader, self.writer)
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
    max_len: usize,
}

impl ReliableListener {
    pub async fn bind(addr: &str, max_len: usize) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("tcp bind {addr}"))?;
        Ok(Self { listener, max_len })
    }

    pub async fn accept(&self) -> anyhow::Result<ReliableConn> {
        let (stream, _) = self.listener.accept().await.context("tcp accept")?;
        ReliableConn::new(stream, self.max_len)
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ClientMsg;

    #[tokio::test]
    async fn frames_survive_a_duplex_pipe() -> anyhow::Result<()> {
        let (a, b) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(a);
        let mut reader = FrameReader::new(b, MAX_FRAME_LEN);

        let msg = ClientMsg::Hello {
            protocol: PROTOCOL_VERSION,
        };
        writer.send(&msg).await?;
        writer.send(&ClientMsg::Chat { text: "hi".into() }).await?;
        drop(writer);

        assert_eq!(reader.recv::<ClientMsg>().await?, Some(msg));
        assert_eq!(
            reader.recv::<ClientMsg>().await?,
            Some(ClientMsg::Chat { text: "hi".into() })
        );
        assert_eq!(reader.recv::<ClientMsg>().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() -> anyhow::Result<()> {
        let (a, b) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(a);
        let mut reader = FrameReader::new(b, 8);

        writer
            .send(&ClientMsg::Chat {
                text: "this is longer than eight bytes".into(),
            })
            .await?;
        assert!(reader.recv_frame().await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn timeout_mid_frame_keeps_partial_bytes() -> anyhow::Result<()> {
        let (mut a, b) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(b, MAX_FRAME_LEN);
        let frame = encode_frame(&ClientMsg::Chat { text: "split".into() })?;

        a.write_all(&frame[..6]).await?;
        let pending = time::timeout(
            std::time::Duration::from_millis(20),
            reader.recv::<ClientMsg>(),
        )
        .await;
        assert!(pending.is_err());

        a.write_all(&frame[6..]).await?;
        assert_eq!(
            reader.recv::<ClientMsg>().await?,
            Some(ClientMsg::Chat {
                text: "split".into()
            })
        );
        Ok(())
    }

    #[test]
    fn encoded_frame_has_length_prefix() -> anyhow::Result<()> {
        let frame = encode_frame(&ClientMsg::Rename { name: "a".into() })?;
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - 4);
        let back: ClientMsg = decode_payload(&frame[4..])?;
        assert_eq!(back, ClientMsg::Rename { name: "a".into() });
        Ok(())
    }
}
