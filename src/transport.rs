use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::info;

use crate::error::{Error, Result};

/// Where encoded lines end up. Owned exclusively by the sender thread, so implementations don't
/// need to be `Sync`.
pub trait Transport: Send + 'static {
    /// Buffer `buf` for the next flush.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn flush(&mut self) -> io::Result<()>;
    fn close(self) -> io::Result<()>;
}

/// Connected UDP socket. Everything written between two flushes goes out as one datagram.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpTransport {
    /// Resolves `addr`, waiting at most `timeout` when one is given, then connects an ephemeral
    /// local socket to it.
    pub fn dial(addr: &str, timeout: Option<Duration>) -> Result<Self> {
        let addrs = match timeout {
            Some(timeout) => resolve_timeout(addr, timeout)?,
            None => resolve(addr)?,
        };
        let remote = addrs.first().copied().ok_or_else(|| Error::NoAddress {
            addr: addr.to_string(),
        })?;
        let socket = Self::connect(remote).map_err(Error::Connect)?;
        info!("Reporting metrics to statsd at {remote}");
        Ok(Self::from_socket(socket))
    }

    /// Wrap an already connected socket.
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket,
            buf: Vec::new(),
        }
    }

    fn connect(remote: SocketAddr) -> io::Result<UdpSocket> {
        let socket = match remote {
            SocketAddr::V4(_) => UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?,
            SocketAddr::V6(_) => UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0))?,
        };
        socket.connect(remote)?;
        Ok(socket)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        // A failed datagram is gone either way, don't let it poison the next one.
        let result = self.socket.send(&self.buf).map(|_| ());
        self.buf.clear();
        result
    }

    fn close(mut self) -> io::Result<()> {
        self.flush()
    }
}

fn resolve(addr: &str) -> Result<Vec<SocketAddr>> {
    addr.to_socket_addrs()
        .map(|addrs| addrs.collect())
        .map_err(|source| Error::Resolve {
            addr: addr.to_string(),
            source,
        })
}

/// `ToSocketAddrs` has no timeout of its own, so the lookup runs on a helper thread and we stop
/// waiting for it after `timeout`. A lookup that outlives us finishes into a closed channel.
fn resolve_timeout(addr: &str, timeout: Duration) -> Result<Vec<SocketAddr>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let owned = addr.to_string();
    std::thread::Builder::new()
        .name("pigeon-resolver".to_string())
        .spawn(move || {
            let _ = tx.send(resolve(&owned));
        })
        .map_err(Error::Spawn)?;
    match rx.recv_timeout(timeout) {
        Ok(resolved) => resolved,
        Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
            Err(Error::ResolveTimeout {
                addr: addr.to_string(),
                timeout,
            })
        }
    }
}

/// Hands every flushed payload to a channel instead of the network. Useful for tests and for
/// embedders that want to see exactly what would have been sent.
#[derive(Debug)]
pub struct SpyTransport {
    tx: crossbeam_channel::Sender<Vec<u8>>,
    buf: Vec<u8>,
}

impl SpyTransport {
    pub fn new() -> (Receiver<Vec<u8>>, Self) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (rx, Self { tx, buf: Vec::new() })
    }
}

impl Transport for SpyTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let payload = std::mem::take(&mut self.buf);
        self.tx
            .send(payload)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "spy receiver dropped"))
    }

    fn close(mut self) -> io::Result<()> {
        self.flush()
    }
}
