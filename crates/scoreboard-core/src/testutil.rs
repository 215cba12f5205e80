//! In-memory `ConnectionHandle` for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::connection::{ConnectionHandle, Delivery};

/// Records every payload it accepts. Can be told to behave full or closed.
pub struct MockConnection {
    id: String,
    received: Mutex<Vec<String>>,
    last_version: Mutex<Option<u64>>,
    full: AtomicBool,
    gone: AtomicBool,
    drops: AtomicU64,
    closed: AtomicBool,
}

impl MockConnection {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            received: Mutex::new(Vec::new()),
            last_version: Mutex::new(None),
            full: AtomicBool::new(false),
            gone: AtomicBool::new(false),
            drops: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn arc(id: &str) -> Arc<Self> {
        Arc::new(Self::new(id))
    }

    pub fn set_full(&self) {
        self.full.store(true, Ordering::Relaxed);
    }

    pub fn set_gone(&self) {
        self.gone.store(true, Ordering::Relaxed);
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl ConnectionHandle for MockConnection {
    fn connection_id(&self) -> &str {
        &self.id
    }

    fn deliver(&self, version: u64, payload: String) -> Delivery {
        let mut last = self.last_version.lock();
        if last.is_some_and(|v| version < v) {
            return Delivery::Stale;
        }
        if self.gone.load(Ordering::Relaxed) {
            return Delivery::Closed;
        }
        if self.full.load(Ordering::Relaxed) {
            let _ = self.drops.fetch_add(1, Ordering::Relaxed);
            return Delivery::Dropped;
        }
        self.received.lock().push(payload);
        *last = Some(version);
        Delivery::Sent
    }

    fn drop_count(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}
