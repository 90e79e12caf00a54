//! A duplex framed TCP endpoint with heartbeat liveness tracking
//! (spec §4.4).
//!
//! A frame is encoded (`meshrpc_core::encode`) and then run through the
//! endpoint's [`LinkLayer`], which may compress and/or encrypt it (spec
//! §4.3/§4.6: `ciphertext = nonce|aes_gcm(compress(frame_bytes))`). Once
//! the link layer has run, the bytes on the wire are opaque — the inner
//! `magic`/`header_len`/`body_len` prefix is no longer readable without
//! inverting the transform first — so the transport wraps the
//! link-transformed blob in its own `u32` BE length prefix and reads
//! exactly that many bytes before calling `LinkLayer::invert` and handing
//! the recovered frame to `meshrpc_core::decode`.

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use meshrpc_core::{Error, Header, LinkLayer, Message, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

const LEN_PREFIX: usize = 4;

/// Liveness state driven by the heartbeat background task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum HeartbeatState {
    /// Recent traffic seen; no probe outstanding.
    Active = 0,
    /// A ping was sent and a pong is awaited.
    Probing = 1,
    /// No pong arrived within the timeout; the endpoint is considered dead.
    Dead = 2,
}

impl From<u8> for HeartbeatState {
    fn from(v: u8) -> Self {
        match v {
            0 => HeartbeatState::Active,
            1 => HeartbeatState::Probing,
            _ => HeartbeatState::Dead,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        HeartbeatConfig {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
        }
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

/// A single peer connection. Writes are serialized through an internal
/// `Mutex` so concurrent callers can `send` without external
/// coordination; reads are expected to be driven by a single task (the
/// dispatcher's per-connection loop, or the client's read-pump).
pub struct Transport {
    write_half: Mutex<tokio::net::tcp::OwnedWriteHalf>,
    read_half: Mutex<tokio::net::tcp::OwnedReadHalf>,
    state: AtomicU8,
    last_active_nanos: AtomicI64,
    peer_addr: String,
    link: LinkLayer,
}

impl Transport {
    /// Construct a transport with no link-layer transform (plaintext,
    /// uncompressed frames).
    pub fn new(stream: TcpStream) -> Result<Self> {
        Self::with_link(stream, LinkLayer::new())
    }

    /// Construct a transport whose frames are run through `link` on send
    /// and receive (spec §4.3/§4.4/§6).
    pub fn with_link(stream: TcpStream, link: LinkLayer) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".into());
        let (read_half, write_half) = stream.into_split();
        Ok(Transport {
            write_half: Mutex::new(write_half),
            read_half: Mutex::new(read_half),
            state: AtomicU8::new(HeartbeatState::Active as u8),
            last_active_nanos: AtomicI64::new(now_nanos()),
            peer_addr,
            link,
        })
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub fn state(&self) -> HeartbeatState {
        HeartbeatState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: HeartbeatState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn mark_active(&self) {
        self.last_active_nanos.store(now_nanos(), Ordering::Release);
        self.set_state(HeartbeatState::Active);
    }

    /// Nanoseconds since the last successful receive.
    pub fn idle_nanos(&self) -> i64 {
        now_nanos() - self.last_active_nanos.load(Ordering::Acquire)
    }

    #[instrument(skip(self, msg), fields(peer = %self.peer_addr))]
    pub async fn send(&self, msg: &Message) -> Result<()> {
        let framed = meshrpc_core::encode(msg)?;
        let transformed = self.link.apply(&framed)?;
        let len: u32 = transformed
            .len()
            .try_into()
            .map_err(|_| Error::InvalidFrame("frame too large to encode".into()))?;

        let mut w = self.write_half.lock().await;
        let mut len_prefix = [0u8; LEN_PREFIX];
        (&mut len_prefix[..]).put_u32(len);
        w.write_all(&len_prefix)
            .await
            .map_err(|e| Error::LinkFailure(e.to_string()))?;
        w.write_all(&transformed)
            .await
            .map_err(|e| Error::LinkFailure(e.to_string()))?;
        w.flush().await.map_err(|e| Error::LinkFailure(e.to_string()))?;
        Ok(())
    }

    /// Read exactly one frame off the wire. Returns `Err(TransportClosed)`
    /// on a clean EOF before any bytes of a new frame are read.
    #[instrument(skip(self), fields(peer = %self.peer_addr))]
    pub async fn receive(&self) -> Result<Message> {
        let mut r = self.read_half.lock().await;

        let mut len_prefix = [0u8; LEN_PREFIX];
        match read_exact_or_eof(&mut *r, &mut len_prefix).await? {
            None => return Err(Error::TransportClosed),
            Some(()) => {}
        }
        let len = Bytes::copy_from_slice(&len_prefix).get_u32() as usize;

        let mut transformed = BytesMut::zeroed(len);
        r.read_exact(&mut transformed)
            .await
            .map_err(|e| Error::InvalidFrame(e.to_string()))?;
        drop(r);

        let framed = self.link.invert(&transformed)?;
        let msg = meshrpc_core::decode(framed)?;
        self.mark_active();
        Ok(msg)
    }

    pub async fn close(&self) -> Result<()> {
        let mut w = self.write_half.lock().await;
        w.shutdown()
            .await
            .map_err(|e| Error::LinkFailure(e.to_string()))
    }

    /// Send a Ping heartbeat and flip state to `Probing`.
    pub async fn send_ping(&self) -> Result<()> {
        let body = meshrpc_core::HeartbeatBody::ping(now_nanos()).encode()?;
        let msg = Message::new(Header::heartbeat(), body);
        self.set_state(HeartbeatState::Probing);
        self.send(&msg).await
    }

    /// Record that a Pong was received, clearing the probe.
    pub fn observe_pong(&self) {
        self.mark_active();
    }

    /// Called by the heartbeat task when a probe times out without a pong.
    pub fn mark_dead(&self) {
        self.set_state(HeartbeatState::Dead);
    }
}

async fn read_exact_or_eof(
    reader: &mut tokio::net::tcp::OwnedReadHalf,
    buf: &mut [u8],
) -> Result<Option<()>> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader
            .read(&mut buf[filled..])
            .await
            .map_err(|e| Error::InvalidFrame(e.to_string()))?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(Error::InvalidFrame("connection closed mid-frame".into()));
        }
        filled += n;
    }
    Ok(Some(()))
}

/// Spawns a background task that pings an idle transport and marks it
/// dead if no pong arrives within `config.timeout`. The task exits once
/// `transport` has no other references.
pub fn spawn_heartbeat(transport: Arc<Transport>, config: HeartbeatConfig) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(config.interval).await;
            if Arc::strong_count(&transport) <= 1 {
                return;
            }
            if transport.idle_nanos() < config.interval.as_nanos() as i64 {
                continue;
            }
            if transport.send_ping().await.is_err() {
                transport.mark_dead();
                return;
            }
            tokio::time::sleep(config.timeout).await;
            if transport.state() == HeartbeatState::Probing {
                warn!(peer = %transport.peer_addr(), "heartbeat timed out, marking dead");
                transport.mark_dead();
                return;
            }
        }
    });
}
