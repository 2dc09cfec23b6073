//! Device interface
//!
//! Every linear network, primitive or composite, implements [`Device`]. The
//! provided [`Device::get_data`] wraps the device's own [`Device::compute`]
//! with an epoch-keyed cache, so reading a device several times during one
//! evaluation pass computes it once.

use std::cell::RefCell;
use std::ops::BitOr;
use std::rc::Rc;

use crate::context::{Epoch, EvalContext};
use crate::error::Result;
use crate::port::{DeviceId, Port};
use crate::sdata::ScatteringData;

/// What a device may contribute besides its S-matrix.
///
/// Circuits OR the flags of their members. Only `noise` changes how
/// connections are evaluated; `active` and `source` are reported to callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceFlags {
    /// C may be nonzero
    pub noise: bool,
    /// Device may have gain
    pub active: bool,
    /// B may be nonzero
    pub source: bool,
}

impl DeviceFlags {
    pub const NONE: DeviceFlags = DeviceFlags {
        noise: false,
        active: false,
        source: false,
    };

    pub const NOISY: DeviceFlags = DeviceFlags {
        noise: true,
        active: false,
        source: false,
    };
}

impl BitOr for DeviceFlags {
    type Output = DeviceFlags;

    fn bitor(self, rhs: Self) -> Self {
        DeviceFlags {
            noise: self.noise || rhs.noise,
            active: self.active || rhs.active,
            source: self.source || rhs.source,
        }
    }
}

/// How much of the scattering data must be current
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeMode {
    /// S, C and B
    Full,
    /// S and B; C may be left zero
    ScatteringOnly,
}

impl ComputeMode {
    pub fn wants_noise(self) -> bool {
        self == ComputeMode::Full
    }
}

#[derive(Debug)]
struct CacheEntry {
    epoch: Epoch,
    mode: ComputeMode,
    data: Rc<ScatteringData>,
}

/// Last computed data of a device, tagged with the epoch it belongs to
#[derive(Debug, Default)]
pub struct DataCache {
    entry: RefCell<Option<CacheEntry>>,
}

impl DataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached data usable for `epoch` in `mode`. Full data also serves
    /// S-only requests.
    pub fn lookup(&self, epoch: Epoch, mode: ComputeMode) -> Option<Rc<ScatteringData>> {
        let entry = self.entry.borrow();
        match entry.as_ref() {
            Some(e) if e.epoch == epoch && (e.mode == mode || e.mode == ComputeMode::Full) => {
                Some(Rc::clone(&e.data))
            }
            _ => None,
        }
    }

    pub fn store(&self, epoch: Epoch, mode: ComputeMode, data: Rc<ScatteringData>) {
        *self.entry.borrow_mut() = Some(CacheEntry { epoch, mode, data });
    }

    /// Forget the cached data
    pub fn clear(&self) {
        *self.entry.borrow_mut() = None;
    }
}

/// Linear network contract
pub trait Device {
    /// Unique identity
    fn id(&self) -> DeviceId;

    /// Number of ports
    fn size(&self) -> usize;

    /// Noise / activity / source flags
    fn flags(&self) -> DeviceFlags {
        DeviceFlags::NONE
    }

    /// Compute the scattering data for `ctx`, bypassing the cache
    fn compute(&self, ctx: &EvalContext, mode: ComputeMode) -> Result<ScatteringData>;

    /// Storage for [`Device::get_data`]
    fn cache(&self) -> &DataCache;

    /// Scattering data for `ctx`, recomputed only when the epoch changes
    fn get_data(&self, ctx: &EvalContext, mode: ComputeMode) -> Result<Rc<ScatteringData>> {
        if let Some(data) = self.cache().lookup(ctx.epoch(), mode) {
            return Ok(data);
        }
        let data = Rc::new(self.compute(ctx, mode)?);
        self.cache().store(ctx.epoch(), mode, Rc::clone(&data));
        Ok(data)
    }

    /// Port `index` of this device; out-of-range queries yield [`Port::NULL`]
    fn get_port(&self, index: usize) -> Port {
        if index >= self.size() {
            log::warn!(
                "port index {} out of range for device {} with {} ports",
                index,
                self.id().value(),
                self.size()
            );
            return Port::NULL;
        }
        Port::new(self.id(), index)
    }

    /// Index of `port` on this device, if it belongs to it
    fn find_port(&self, port: Port) -> Option<usize> {
        if port.device == self.id() && port.index < self.size() {
            Some(port.index)
        } else {
            None
        }
    }
}

/// Shared handle to a device
pub type DeviceRef = Rc<dyn Device>;

/// Conversion of shared device handles into [`DeviceRef`]
pub trait AsDevice {
    fn as_device(&self) -> DeviceRef;
}

impl<T: Device + 'static> AsDevice for Rc<T> {
    fn as_device(&self) -> DeviceRef {
        self.clone()
    }
}

impl AsDevice for Rc<dyn Device> {
    fn as_device(&self) -> DeviceRef {
        Rc::clone(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counting {
        id: DeviceId,
        calls: Cell<usize>,
        cache: DataCache,
    }

    impl Device for Counting {
        fn id(&self) -> DeviceId {
            self.id
        }
        fn size(&self) -> usize {
            2
        }
        fn compute(&self, _ctx: &EvalContext, _mode: ComputeMode) -> Result<ScatteringData> {
            self.calls.set(self.calls.get() + 1);
            Ok(ScatteringData::new(2))
        }
        fn cache(&self) -> &DataCache {
            &self.cache
        }
    }

    fn counting() -> Counting {
        Counting {
            id: DeviceId::next(),
            calls: Cell::new(0),
            cache: DataCache::new(),
        }
    }

    #[test]
    fn test_cache_by_epoch() {
        let dev = counting();
        let ctx = EvalContext::default();
        dev.get_data(&ctx, ComputeMode::Full).unwrap();
        dev.get_data(&ctx, ComputeMode::Full).unwrap();
        assert_eq!(dev.calls.get(), 1);

        // Full data satisfies an S-only read
        dev.get_data(&ctx, ComputeMode::ScatteringOnly).unwrap();
        assert_eq!(dev.calls.get(), 1);

        dev.get_data(&ctx.refresh(), ComputeMode::Full).unwrap();
        assert_eq!(dev.calls.get(), 2);
    }

    #[test]
    fn test_s_only_does_not_serve_full() {
        let dev = counting();
        let ctx = EvalContext::default();
        dev.get_data(&ctx, ComputeMode::ScatteringOnly).unwrap();
        dev.get_data(&ctx, ComputeMode::Full).unwrap();
        assert_eq!(dev.calls.get(), 2);
        dev.cache().clear();
        dev.get_data(&ctx, ComputeMode::Full).unwrap();
        assert_eq!(dev.calls.get(), 3);
    }

    #[test]
    fn test_port_lookup() {
        let dev = counting();
        let p = dev.get_port(1);
        assert_eq!(p, Port::new(dev.id(), 1));
        assert_eq!(dev.find_port(p), Some(1));
        assert!(dev.get_port(2).is_null());
        assert_eq!(dev.find_port(Port::new(DeviceId::next(), 0)), None);
    }

    #[test]
    fn test_flags_or() {
        let f = DeviceFlags::NOISY
            | DeviceFlags {
                source: true,
                ..DeviceFlags::NONE
            };
        assert!(f.noise && f.source && !f.active);
    }
}
