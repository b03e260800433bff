use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};

use ahash::AHashMap;
use tracing::warn;

use crate::connection::Connection;
use crate::error::ScanError;
use crate::events::EventBus;

/// Authoritative map of discovered consoles, keyed by peer address.
///
/// The map lock is never held across event emission or I/O; callers iterate
/// snapshots.
pub struct Registry {
    map: Mutex<AHashMap<Ipv4Addr, Arc<Connection>>>,
    events: EventBus,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self { map: Mutex::new(AHashMap::new()), events: EventBus::new() }
    }

    fn lock(&self) -> MutexGuard<'_, AHashMap<Ipv4Addr, Arc<Connection>>> {
        match self.map.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("registry lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Adds a newly discovered console and emits `add`. A second insert for
    /// the same peer is refused; the caller branches to a refresh instead.
    pub(crate) fn insert(&self, conn: Arc<Connection>) -> Result<(), ScanError> {
        let addr = conn.addr();
        {
            let mut map = self.lock();
            if map.contains_key(&addr) {
                return Err(ScanError::DuplicateConnection(addr));
            }
            map.insert(addr, Arc::clone(&conn));
        }
        self.events.emit_add(conn.snapshot());
        Ok(())
    }

    /// Removes a console and emits `remove`. Returns the removed record.
    pub(crate) fn remove(&self, addr: Ipv4Addr) -> Option<Arc<Connection>> {
        let removed = self.lock().remove(&addr);
        if let Some(conn) = &removed {
            self.events.emit_remove(conn.snapshot());
        }
        removed
    }

    pub fn get(&self, addr: Ipv4Addr) -> Option<Arc<Connection>> {
        self.lock().get(&addr).cloned()
    }

    /// Snapshot of every record; safe to iterate without the lock.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
