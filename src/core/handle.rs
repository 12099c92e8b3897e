//! Typed primitive handles and the slot table behind them
//!
//! A handle is an index into a fixed-capacity table plus the generation of
//! the slot at the time the object was created. Destroying the object bumps
//! the generation, so any copy of the old handle is detected as stale.
//! A slot whose generation is used up is retired rather than wrapped, so no
//! handle value is ever handed out twice.

use crate::types::OsObjType;

/// Untyped handle payload shared by all handle kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RawHandle {
    index: u16,
    generation: u16,
}

impl RawHandle {
    #[inline]
    pub(crate) const fn id(self) -> u32 {
        ((self.generation as u32) << 16) | self.index as u32
    }

    #[inline]
    pub(crate) const fn from_id(id: u32) -> Self {
        RawHandle {
            index: (id & 0xFFFF) as u16,
            generation: (id >> 16) as u16,
        }
    }
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(RawHandle);

        impl $name {
            /// Kind of kernel object this handle refers to
            pub const KIND: OsObjType = $kind;

            /// Non-zero numeric identity, unique among live objects of
            /// this kind
            #[inline]
            pub const fn id(self) -> u32 {
                self.0.id()
            }

            #[inline]
            pub(crate) const fn from_raw(raw: RawHandle) -> Self {
                $name(raw)
            }

            #[inline]
            pub(crate) const fn raw(self) -> RawHandle {
                self.0
            }
        }

        #[cfg(feature = "defmt")]
        impl defmt::Format for $name {
            fn format(&self, f: defmt::Formatter) {
                defmt::write!(f, "{=str}#{=u32:x}", Self::KIND.as_str(), self.id())
            }
        }
    };
}

define_handle!(
    /// Handle to a task
    TaskHandle,
    OsObjType::Task
);
define_handle!(
    /// Handle to a bounded queue of fixed-size records
    QueueHandle,
    OsObjType::Queue
);
define_handle!(
    /// Handle to a mutex
    MutexHandle,
    OsObjType::Mutex
);
define_handle!(
    /// Handle to a counting semaphore
    SemaphoreHandle,
    OsObjType::Sem
);
define_handle!(
    /// Handle to a software timer
    TimerHandle,
    OsObjType::Timer
);

impl TaskHandle {
    #[inline]
    pub(crate) const fn from_id(id: u32) -> Self {
        TaskHandle(RawHandle::from_id(id))
    }
}

enum SlotState<T> {
    Vacant,
    /// Claimed by a create call that has not reached the kernel yet
    Reserved,
    Occupied(T),
    /// Every generation used; never handed out again
    Retired,
}

struct Slot<T> {
    generation: u16,
    state: SlotState<T>,
}

/// Fixed-capacity arena with generation-checked access
pub(crate) struct SlotTable<T, const N: usize> {
    slots: [Slot<T>; N],
    live: usize,
}

impl<T, const N: usize> SlotTable<T, N> {
    pub(crate) fn new() -> Self {
        SlotTable {
            slots: ::core::array::from_fn(|_| Slot {
                // An all-zero id is never valid
                generation: 1,
                state: SlotState::Vacant,
            }),
            live: 0,
        }
    }

    /// Claim a vacant slot, `None` if the table is full
    pub(crate) fn reserve(&mut self) -> Option<RawHandle> {
        let index = self
            .slots
            .iter()
            .position(|slot| matches!(slot.state, SlotState::Vacant))?;
        let slot = &mut self.slots[index];
        slot.state = SlotState::Reserved;
        Some(RawHandle {
            index: index as u16,
            generation: slot.generation,
        })
    }

    /// Publish the object for a reserved slot
    pub(crate) fn fill(&mut self, raw: RawHandle, value: T) {
        if let Some(slot) = self.slot_mut(raw) {
            if matches!(slot.state, SlotState::Reserved) {
                slot.state = SlotState::Occupied(value);
                self.live += 1;
            }
        }
    }

    /// Give back a reservation whose create failed
    pub(crate) fn release(&mut self, raw: RawHandle) {
        if let Some(slot) = self.slot_mut(raw) {
            if matches!(slot.state, SlotState::Reserved) {
                Self::vacate(slot);
            }
        }
    }

    pub(crate) fn get(&self, raw: RawHandle) -> Option<&T> {
        match self.slots.get(raw.index as usize) {
            Some(Slot {
                generation,
                state: SlotState::Occupied(value),
            }) if *generation == raw.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, raw: RawHandle) -> Option<&mut T> {
        match self.slot_mut(raw) {
            Some(Slot {
                state: SlotState::Occupied(value),
                ..
            }) => Some(value),
            _ => None,
        }
    }

    /// Take the object out, invalidating every copy of `raw`
    pub(crate) fn remove(&mut self, raw: RawHandle) -> Option<T> {
        let slot = self.slot_mut(raw)?;
        if !matches!(slot.state, SlotState::Occupied(_)) {
            return None;
        }
        let state = Self::vacate(slot);
        self.live -= 1;
        match state {
            SlotState::Occupied(value) => Some(value),
            _ => None,
        }
    }

    /// Number of occupied slots
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (RawHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match &slot.state {
            SlotState::Occupied(value) => Some((
                RawHandle {
                    index: index as u16,
                    generation: slot.generation,
                },
                value,
            )),
            _ => None,
        })
    }

    /// Move to the next generation, or retire the slot when there is none
    fn vacate(slot: &mut Slot<T>) -> SlotState<T> {
        match slot.generation.checked_add(1) {
            Some(generation) => {
                slot.generation = generation;
                ::core::mem::replace(&mut slot.state, SlotState::Vacant)
            }
            None => {
                crate::warn!("handle slot retired after {} generations", u16::MAX);
                ::core::mem::replace(&mut slot.state, SlotState::Retired)
            }
        }
    }

    fn slot_mut(&mut self, raw: RawHandle) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(raw.index as usize)
            .filter(|slot| slot.generation == raw.generation)
    }
}
