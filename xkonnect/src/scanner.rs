use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::connection::{Connection, ConnectionInfo, ConnectionState};
use crate::cpukey::CpuKey;
use crate::error::{Result, ScanError};
use crate::registry::Registry;
use crate::subnet::{enumerate_subnets, SubnetEntry};

/// UDP port debug consoles answer discovery probes on.
pub const DISCOVERY_PORT: u16 = 730;

/// Fixed jtag discovery probe: two framing bytes, then "jtag".
pub(crate) const JTAG_PROBE: [u8; 6] = [0x03, 0x04, 0x6A, 0x74, 0x61, 0x67];

/// Devkit discovery probe: two framing bytes, then "XeDevkit". Only emitted
/// when `probe_devkit` is configured.
pub(crate) const XEDEVKIT_PROBE: [u8; 10] =
    [0x03, 0x04, 0x58, 0x65, 0x44, 0x65, 0x76, 0x6B, 0x69, 0x74];

/// Receive buffer for console responses; replies are short ASCII names.
const RECV_BUF_LEN: usize = 128;

/// Passive discovery engine.
///
/// One broadcast-capable UDP socket feeds three cooperating tasks: a
/// listener decoding responses into the registry, a broadcaster probing
/// every known subnet, and a monitor demoting consoles that have gone
/// silent. A fourth task re-enumerates local subnets so topology changes
/// take effect without restarting the engine.
pub struct ConsoleScanner {
    config: ScanConfig,
    registry: Arc<Registry>,
    subnets: Arc<ArcSwap<Vec<SubnetEntry>>>,
    scanning: AtomicBool,
    running: Mutex<Option<Running>>,
}

struct Running {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl ConsoleScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            registry: Arc::new(Registry::new()),
            subnets: Arc::new(ArcSwap::from_pointee(Vec::new())),
            scanning: AtomicBool::new(false),
            running: Mutex::new(None),
        }
    }

    /// Builds a scanner and, when the config says `auto_start`, starts it.
    pub async fn launch(config: ScanConfig) -> Result<Self> {
        let scanner = Self::new(config);
        if scanner.config.auto_start {
            scanner.start().await?;
        }
        Ok(scanner)
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Consoles seen for the first time.
    pub fn on_add(&self) -> broadcast::Receiver<ConnectionInfo> {
        self.registry.events().on_add()
    }

    /// State transitions on known consoles.
    pub fn on_update(&self) -> broadcast::Receiver<ConnectionInfo> {
        self.registry.events().on_update()
    }

    /// Evicted or purged consoles.
    pub fn on_remove(&self) -> broadcast::Receiver<ConnectionInfo> {
        self.registry.events().on_remove()
    }

    /// Snapshot of every known console.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.registry.snapshot().iter().map(|conn| conn.snapshot()).collect()
    }

    /// Single console lookup.
    pub fn connection(&self, addr: Ipv4Addr) -> Option<ConnectionInfo> {
        self.registry.get(addr).map(|conn| conn.snapshot())
    }

    /// Attaches an externally retrieved CPUKey to a known console. Returns
    /// false when the console is not in the registry.
    pub fn set_cpu_key(&self, addr: Ipv4Addr, key: CpuKey) -> bool {
        match self.registry.get(addr) {
            Some(conn) => {
                conn.set_cpu_key(key);
                true
            }
            None => false,
        }
    }

    /// Current subnet snapshot.
    pub fn subnets(&self) -> Vec<SubnetEntry> {
        self.subnets.load().as_ref().clone()
    }

    /// Re-enumerates local subnets, replacing the snapshot. The topology
    /// watcher calls this periodically; it is public for embedders wired to
    /// a platform network-change notification. Enumeration failure keeps
    /// the prior snapshot. Records on vanished subnets are not evicted;
    /// they time out through the monitor.
    pub fn refresh_subnets(&self) {
        refresh_snapshot(&self.config, &self.subnets);
    }

    /// Binds the discovery socket and spawns the listener, broadcaster,
    /// monitor and topology tasks. Idempotent; a second call while scanning
    /// is a no-op. A bind failure rolls back to fully stopped.
    pub async fn start(&self) -> Result<()> {
        if self.scanning.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        refresh_snapshot(&self.config, &self.subnets);

        let socket = match bind_broadcast_socket() {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                self.scanning.store(false, Ordering::SeqCst);
                return Err(ScanError::Io(e));
            }
        };
        if let Ok(local) = socket.local_addr() {
            info!(%local, subnets = self.subnets.load().len(), "scanner started");
        }

        let cancel = CancellationToken::new();
        let handles = vec![
            tokio::spawn(listener_task(
                Arc::clone(&socket),
                Arc::clone(&self.registry),
                Arc::clone(&self.subnets),
                cancel.clone(),
            )),
            tokio::spawn(broadcaster_task(
                Arc::clone(&socket),
                Arc::clone(&self.subnets),
                self.config.clone(),
                cancel.clone(),
            )),
            tokio::spawn(monitor_task(
                Arc::clone(&self.registry),
                self.config.clone(),
                cancel.clone(),
            )),
            tokio::spawn(topology_task(
                self.config.clone(),
                Arc::clone(&self.subnets),
                cancel.clone(),
            )),
        ];

        let mut running = lock_running(&self.running);
        *running = Some(Running { cancel, handles });
        Ok(())
    }

    /// Stops scanning and awaits task termination. The tasks observe the
    /// cancellation within one sweep period; the socket is released when
    /// its last task exits. Idempotent.
    pub async fn stop(&self) {
        if !self.scanning.swap(false, Ordering::SeqCst) {
            return;
        }
        let running = lock_running(&self.running).take();
        if let Some(running) = running {
            running.cancel.cancel();
            for handle in running.handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "scanner task ended abnormally");
                }
            }
        }
        info!("scanner stopped");
    }

    /// Removes every currently-Offline console, emitting `remove` for each.
    pub fn purge(&self) {
        purge_offline(&self.registry);
    }
}

impl Drop for ConsoleScanner {
    // best-effort teardown; the tasks observe the token and exit on their own
    fn drop(&mut self) {
        if let Some(running) = lock_running(&self.running).take() {
            running.cancel.cancel();
        }
    }
}

fn lock_running(running: &Mutex<Option<Running>>) -> std::sync::MutexGuard<'_, Option<Running>> {
    match running.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Binds to 0.0.0.0 on an ephemeral port with SO_BROADCAST enabled.
fn bind_broadcast_socket() -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
    socket.bind(&bind_addr.into())?;
    UdpSocket::from_std(socket.into())
}

fn refresh_snapshot(config: &ScanConfig, subnets: &ArcSwap<Vec<SubnetEntry>>) {
    match enumerate_subnets(config.include_ics_bridge) {
        Ok(fresh) => {
            if **subnets.load() != fresh {
                info!(count = fresh.len(), "subnet snapshot replaced");
                subnets.store(Arc::new(fresh));
            }
        }
        Err(e) => warn!(error = %e, "subnet enumeration failed, keeping prior snapshot"),
    }
}

async fn listener_task(
    socket: Arc<UdpSocket>,
    registry: Arc<Registry>,
    subnets: Arc<ArcSwap<Vec<SubnetEntry>>>,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; RECV_BUF_LEN];
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            res = socket.recv_from(&mut buf) => res,
        };
        match received {
            Ok((len, SocketAddr::V4(peer))) => ingest(&registry, &subnets, peer, &buf[..len]),
            Ok((_, peer)) => debug!(%peer, "ignoring non-IPv4 response"),
            Err(e) => warn!(error = %e, "receive failed"),
        }
    }
    debug!("listener stopped");
}

/// Decodes one response datagram and applies it to the registry.
///
/// Responses must come from the discovery port and carry at least the two
/// framing bytes plus one name byte; anything else is ignored without
/// error. A first response inserts the console Online and emits `add`; a
/// repeat response refreshes liveness and emits `update` only when it
/// brought the console back Online.
fn ingest(
    registry: &Registry,
    subnets: &ArcSwap<Vec<SubnetEntry>>,
    peer: SocketAddrV4,
    payload: &[u8],
) {
    if peer.port() != DISCOVERY_PORT {
        debug!(%peer, "ignoring datagram from a non-discovery port");
        return;
    }
    if payload.len() < 3 {
        debug!(%peer, len = payload.len(), "ignoring short datagram");
        return;
    }
    let name = String::from_utf8_lossy(&payload[2..]).trim_end_matches('\0').to_string();
    let addr = *peer.ip();

    if let Some(conn) = registry.get(addr) {
        if let Some(info) = conn.refresh(peer, name) {
            registry.events().emit_update(info);
        }
        return;
    }

    let interface = subnets.load().iter().find(|subnet| subnet.contains(addr)).cloned();
    let conn = Arc::new(Connection::new(peer, name.clone(), interface));
    conn.promote();
    match registry.insert(Arc::clone(&conn)) {
        Ok(()) => info!(%peer, %name, "console discovered"),
        // lost an insert race; treat as a refresh
        Err(ScanError::DuplicateConnection(_)) => {
            if let Some(existing) = registry.get(addr) {
                if let Some(info) = existing.refresh(peer, name) {
                    registry.events().emit_update(info);
                }
            }
        }
        Err(e) => warn!(%peer, error = %e, "failed to register console"),
    }
}

/// Destinations for one broadcast sweep; entries whose link is down are
/// skipped.
fn broadcast_targets(subnets: &[SubnetEntry]) -> Vec<SocketAddrV4> {
    subnets
        .iter()
        .filter(|subnet| subnet.link_up)
        .map(|subnet| SocketAddrV4::new(subnet.broadcast(), DISCOVERY_PORT))
        .collect()
}

async fn broadcaster_task(
    socket: Arc<UdpSocket>,
    subnets: Arc<ArcSwap<Vec<SubnetEntry>>>,
    config: ScanConfig,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.scan_frequency());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let snapshot = subnets.load_full();
        for dest in broadcast_targets(&snapshot) {
            if let Err(e) = socket.send_to(&JTAG_PROBE, dest).await {
                warn!(%dest, error = %e, "probe send failed");
            }
            if config.probe_devkit {
                if let Err(e) = socket.send_to(&XEDEVKIT_PROBE, dest).await {
                    warn!(%dest, error = %e, "devkit probe send failed");
                }
            }
        }
    }
    debug!("broadcaster stopped");
}

async fn monitor_task(registry: Arc<Registry>, config: ScanConfig, cancel: CancellationToken) {
    let timeout = config.disconnect_timeout();
    let mut ticker = tokio::time::interval(config.scan_frequency());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        sweep(&registry, timeout, config.remove_on_disconnect);
    }
    debug!("monitor stopped");
}

/// One monitor pass: demote silent Online consoles; evict already-Offline
/// ones when eviction is enabled. A console demoted by this pass is not
/// evicted before the next one.
fn sweep(registry: &Registry, timeout: Duration, evict: bool) {
    for conn in registry.snapshot() {
        if conn.state() == ConnectionState::Offline {
            if evict {
                registry.remove(conn.addr());
            }
        } else if let Some(info) = conn.demote_if_stale(timeout) {
            registry.events().emit_update(info);
        }
    }
}

/// Removes every currently-Offline record; `remove` fires for each.
fn purge_offline(registry: &Registry) {
    for conn in registry.snapshot() {
        if conn.state() == ConnectionState::Offline {
            registry.remove(conn.addr());
        }
    }
}

async fn topology_task(
    config: ScanConfig,
    subnets: Arc<ArcSwap<Vec<SubnetEntry>>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.topology_refresh());
    // the start path already enumerated once
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        refresh_snapshot(&config, &subnets);
    }
    debug!("topology watcher stopped");
}
