use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::cpukey::CpuKey;
use crate::subnet::SubnetEntry;

/// Liveness of a discovered console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Inserted but not yet promoted
    Unknown,
    Online,
    Offline,
}

/// How the console's subnet is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// An ordinary local subnet
    Standard,
    /// The ICS-bridged 192.168.137.0/24 subnet
    Bridged,
}

/// A discovered console.
///
/// Identity is the peer IPv4 address; the source port of the last response
/// is retained for inspection only. All mutable fields share one critical
/// section. The record holds no reference back to the registry.
pub struct Connection {
    addr: Ipv4Addr,
    interface: Option<SubnetEntry>,
    kind: ConnectionKind,
    discovered: Instant,
    inner: Mutex<Mutable>,
}

#[derive(Debug, Clone)]
struct Mutable {
    endpoint: SocketAddrV4,
    name: String,
    last_ack: Instant,
    state: ConnectionState,
    cpu_key: CpuKey,
}

impl Connection {
    pub(crate) fn new(
        endpoint: SocketAddrV4,
        name: String,
        interface: Option<SubnetEntry>,
    ) -> Self {
        let now = Instant::now();
        let kind = match &interface {
            Some(entry) if entry.is_bridged() => ConnectionKind::Bridged,
            _ => ConnectionKind::Standard,
        };
        Self {
            addr: *endpoint.ip(),
            interface,
            kind,
            discovered: now,
            inner: Mutex::new(Mutable {
                endpoint,
                name,
                last_ack: now,
                state: ConnectionState::Unknown,
                cpu_key: CpuKey::EMPTY,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Mutable> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(addr = %self.addr, "connection lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    /// Full endpoint of the last response.
    pub fn endpoint(&self) -> SocketAddrV4 {
        self.lock().endpoint
    }

    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn last_ack(&self) -> Instant {
        self.lock().last_ack
    }

    pub fn discovered(&self) -> Instant {
        self.discovered
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    /// The local interface whose subnet covers the peer, if any.
    pub fn interface(&self) -> Option<&SubnetEntry> {
        self.interface.as_ref()
    }

    pub fn cpu_key(&self) -> CpuKey {
        self.lock().cpu_key
    }

    /// Attaches an externally retrieved key; the engine never computes one.
    pub fn set_cpu_key(&self, key: CpuKey) {
        self.lock().cpu_key = key;
    }

    /// Records a response. When the state changed to Online, returns the
    /// post-transition snapshot, captured while the lock is still held so
    /// the emitted event cannot observe a later concurrent mutation.
    pub(crate) fn refresh(&self, endpoint: SocketAddrV4, name: String) -> Option<ConnectionInfo> {
        let mut inner = self.lock();
        inner.endpoint = endpoint;
        inner.name = name;
        inner.last_ack = Instant::now();
        let promoted = inner.state != ConnectionState::Online;
        inner.state = ConnectionState::Online;
        promoted.then(|| self.info_locked(&inner))
    }

    /// Marks the console Online on first insertion.
    pub(crate) fn promote(&self) {
        self.lock().state = ConnectionState::Online;
    }

    /// Demotes to Offline when the last response is older than `timeout`.
    /// On demotion, returns the post-transition snapshot captured under the
    /// lock, like [`Connection::refresh`].
    pub(crate) fn demote_if_stale(&self, timeout: Duration) -> Option<ConnectionInfo> {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Online && inner.last_ack.elapsed() > timeout {
            inner.state = ConnectionState::Offline;
            Some(self.info_locked(&inner))
        } else {
            None
        }
    }

    /// Full-record snapshot; the payload of every observer event.
    pub fn snapshot(&self) -> ConnectionInfo {
        let inner = self.lock();
        self.info_locked(&inner)
    }

    fn info_locked(&self, inner: &Mutable) -> ConnectionInfo {
        ConnectionInfo {
            addr: self.addr,
            endpoint: inner.endpoint,
            interface: self.interface.clone(),
            kind: self.kind,
            name: inner.name.clone(),
            discovered: self.discovered,
            last_ack: inner.last_ack,
            state: inner.state,
            cpu_key: inner.cpu_key,
        }
    }
}

/// Value snapshot of a [`Connection`]
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub addr: Ipv4Addr,
    pub endpoint: SocketAddrV4,
    pub interface: Option<SubnetEntry>,
    pub kind: ConnectionKind,
    pub name: String,
    pub discovered: Instant,
    pub last_ack: Instant,
    pub state: ConnectionState,
    pub cpu_key: CpuKey,
}
