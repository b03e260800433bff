use tokio::sync::broadcast;

use crate::connection::ConnectionInfo;

/// Capacity of each observer channel; a slow receiver lags and loses the
/// oldest events rather than blocking the engine.
const CHANNEL_CAPACITY: usize = 64;

/// Coarse add/update/remove observer channels.
///
/// Each event delivers a full record snapshot taken at emission time.
/// Emission never blocks, and events fired while nobody is subscribed are
/// discarded. Subscribers run on their own tasks, so a panicking observer
/// cannot take the engine down with it.
pub struct EventBus {
    add: broadcast::Sender<ConnectionInfo>,
    update: broadcast::Sender<ConnectionInfo>,
    remove: broadcast::Sender<ConnectionInfo>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (add, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (update, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (remove, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { add, update, remove }
    }

    /// Consoles seen for the first time.
    pub fn on_add(&self) -> broadcast::Receiver<ConnectionInfo> {
        self.add.subscribe()
    }

    /// State transitions on known consoles.
    pub fn on_update(&self) -> broadcast::Receiver<ConnectionInfo> {
        self.update.subscribe()
    }

    /// Evicted or purged consoles.
    pub fn on_remove(&self) -> broadcast::Receiver<ConnectionInfo> {
        self.remove.subscribe()
    }

    pub(crate) fn emit_add(&self, info: ConnectionInfo) {
        let _ = self.add.send(info);
    }

    pub(crate) fn emit_update(&self, info: ConnectionInfo) {
        let _ = self.update.send(info);
    }

    pub(crate) fn emit_remove(&self, info: ConnectionInfo) {
        let _ = self.remove.send(info);
    }
}
