//! OS resource accounting
//!
//! One counter per [`Os`](crate::kernel::Os) context, incremented on every
//! successful create and decremented on every successful destroy. A value
//! that keeps growing across test cycles means something leaks.

use portable_atomic::{AtomicI32, Ordering};

pub struct ResourceCounter {
    count: AtomicI32,
}

impl ResourceCounter {
    pub const fn new() -> Self {
        ResourceCounter {
            count: AtomicI32::new(0),
        }
    }

    #[inline]
    pub(crate) fn increment(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub(crate) fn decrement(&self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Number of primitives created and not yet destroyed
    #[inline]
    pub fn get(&self) -> i32 {
        self.count.load(Ordering::Acquire)
    }
}

impl Default for ResourceCounter {
    fn default() -> Self {
        Self::new()
    }
}
