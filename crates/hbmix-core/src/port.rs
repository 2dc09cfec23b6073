//! Port identity
//!
//! A [`Port`] names terminal `index` of the device `device`. Ports are used
//! to track which physical terminal survives a merge, never to address
//! storage.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique device identity. `DeviceId(0)` is never allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(u64);

impl DeviceId {
    /// Sentinel id owned by no device
    pub const NULL: DeviceId = DeviceId(0);

    /// Allocate a new id
    pub fn next() -> Self {
        DeviceId(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// A device terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Port {
    pub device: DeviceId,
    pub index: usize,
}

impl Port {
    /// Sentinel returned for out-of-range port queries
    pub const NULL: Port = Port {
        device: DeviceId::NULL,
        index: 0,
    };

    pub fn new(device: DeviceId, index: usize) -> Self {
        Self { device, index }
    }

    pub fn is_null(&self) -> bool {
        self.device == DeviceId::NULL
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device.0, self.index)
    }
}
