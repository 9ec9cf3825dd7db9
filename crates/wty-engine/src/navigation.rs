//! View epochs.
//!
//! A view takes a [`ViewTicket`] before it starts a fetch. Navigating bumps
//! the epoch, and any result delivered against an older ticket is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default)]
pub struct Navigator {
    epoch: Arc<AtomicU64>,
}

#[derive(Debug, Clone)]
pub struct ViewTicket {
    epoch: u64,
    current: Arc<AtomicU64>,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticket(&self) -> ViewTicket {
        ViewTicket {
            epoch: self.epoch.load(Ordering::Acquire),
            current: Arc::clone(&self.epoch),
        }
    }

    /// Leaves the current view. Outstanding tickets go stale.
    pub fn navigate(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }
}

impl ViewTicket {
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.epoch
    }

    /// Passes `value` through only while the view is still shown.
    pub fn accept<T>(&self, value: T) -> Option<T> {
        self.is_current().then_some(value)
    }
}
