//! Fixed-capacity arena of uniform heap slots.
//!
//! Allocation bumps a cursor forward, skipping slots that are still in use.
//! When the cursor reaches the end the arena reports exhaustion and the
//! caller is expected to collect and [`rewind`](Arena::rewind) before
//! retrying.

use super::object::{GcRef, HeapObject, ObjectHeader, Traceable, Tracer};

/// One slot of the arena.
#[derive(Debug, Default)]
struct Slot {
    header: ObjectHeader,
    object: Option<HeapObject>,
}

/// Counts produced by a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Slots that survived
    pub marked: usize,
    /// Slots that were released
    pub freed: usize,
    /// Slots that were already free
    pub unused: usize,
}

/// The heap arena.
///
/// ```text
/// [obj][obj][free][obj][free][free] ... [free]
///                  ^ cursor
/// ```
#[derive(Debug)]
pub struct Arena {
    slots: Vec<Slot>,
    cursor: usize,
    live: usize,
}

impl Arena {
    /// Creates an arena with `capacity` empty slots.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::default);
        Self {
            slots,
            cursor: 0,
            live: 0,
        }
    }

    /// Places an object in the next free slot at or after the cursor.
    ///
    /// Hands the object back when the cursor runs off the end.
    pub fn allocate(&mut self, object: HeapObject) -> Result<GcRef, HeapObject> {
        while self.cursor < self.slots.len() {
            let index = self.cursor;
            self.cursor += 1;

            let slot = &mut self.slots[index];
            if slot.header.is_in_use() {
                continue;
            }

            slot.header = ObjectHeader::in_use(object.genus());
            slot.object = Some(object);
            self.live += 1;
            return Ok(GcRef::new(index as u32));
        }

        Err(object)
    }

    /// Moves the cursor back to the first slot.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Gets the object in a live slot.
    #[inline]
    pub fn get(&self, handle: GcRef) -> Option<&HeapObject> {
        self.slots.get(handle.index())?.object.as_ref()
    }

    /// Gets the object in a live slot mutably.
    #[inline]
    pub fn get_mut(&mut self, handle: GcRef) -> Option<&mut HeapObject> {
        self.slots.get_mut(handle.index())?.object.as_mut()
    }

    /// Gets the header of a slot.
    #[inline]
    pub fn header(&self, handle: GcRef) -> Option<&ObjectHeader> {
        self.slots.get(handle.index()).map(|slot| &slot.header)
    }

    /// Marks everything reachable from the handles queued in `tracer`.
    pub fn mark(&mut self, tracer: &mut Tracer) {
        while let Some(handle) = tracer.pop() {
            let Some(slot) = self.slots.get_mut(handle.index()) else {
                continue;
            };
            if !slot.header.is_in_use() || slot.header.is_marked() {
                continue;
            }

            slot.header.mark();
            if let Some(object) = &slot.object {
                object.trace(tracer);
            }
        }
    }

    /// Releases every unmarked slot and clears the mark on the rest.
    pub fn sweep(&mut self) -> SweepStats {
        let mut stats = SweepStats::default();

        for slot in &mut self.slots {
            if !slot.header.is_in_use() {
                stats.unused += 1;
            } else if slot.header.is_marked() {
                slot.header.unmark();
                stats.marked += 1;
            } else {
                slot.header = ObjectHeader::free();
                slot.object = None;
                stats.freed += 1;
            }
        }

        self.live = stats.marked;
        stats
    }

    /// Releases every slot regardless of reachability.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = Slot::default();
        }
        self.cursor = 0;
        self.live = 0;
    }

    /// Number of slots holding an object.
    #[inline]
    pub fn live(&self) -> usize {
        self.live
    }

    /// Total number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Whether the cursor has reached the end.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.slots.len()
    }
}
