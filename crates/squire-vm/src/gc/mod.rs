//! Garbage collector for the Squire runtime.
//!
//! A full, synchronous, non-generational mark-sweep over a fixed arena.
//! Collection happens when allocation finds the arena exhausted, or when
//! asked for explicitly. Roots are supplied by the caller as a
//! [`Traceable`]; the object whose allocation triggered the collection is
//! treated as a root too, so the values it holds survive.

pub mod arena;
pub mod object;

use tracing::debug;

pub use arena::{Arena, SweepStats};
pub use object::{Codex, GcRef, HeapObject, ObjectHeader, Traceable, Tracer};

/// Running totals for a heap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Number of slots
    pub capacity: usize,
    /// Slots currently holding an object
    pub live: usize,
    /// Completed collections
    pub collections: usize,
    /// Objects released by all collections
    pub freed: usize,
}

/// The collected heap.
#[derive(Debug)]
pub struct Heap {
    arena: Arena,
    collections: usize,
    freed: usize,
}

impl Heap {
    /// Creates a heap with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            arena: Arena::new(capacity),
            collections: 0,
            freed: 0,
        }
    }

    /// Allocates an object, collecting once if the arena is exhausted.
    ///
    /// Gives the object back if there is still no room afterwards.
    pub fn allocate(
        &mut self,
        object: HeapObject,
        roots: &dyn Traceable,
    ) -> Result<GcRef, HeapObject> {
        let object = match self.arena.allocate(object) {
            Ok(handle) => return Ok(handle),
            Err(object) => object,
        };

        self.collect_with(roots, Some(&object));
        self.arena.allocate(object)
    }

    /// Runs a full collection.
    pub fn collect(&mut self, roots: &dyn Traceable) -> SweepStats {
        self.collect_with(roots, None)
    }

    fn collect_with(&mut self, roots: &dyn Traceable, pending: Option<&HeapObject>) -> SweepStats {
        let mut tracer = Tracer::new();
        roots.trace(&mut tracer);
        if let Some(object) = pending {
            object.trace(&mut tracer);
        }

        self.arena.mark(&mut tracer);
        let stats = self.arena.sweep();
        self.arena.rewind();

        self.collections += 1;
        self.freed += stats.freed;
        debug!(
            unused = stats.unused,
            marked = stats.marked,
            freed = stats.freed,
            "gc cycle finished"
        );
        stats
    }

    /// Releases every object.
    pub fn teardown(&mut self) {
        debug!(live = self.arena.live(), "tearing down heap");
        self.arena.clear();
    }

    /// Gets a live object.
    #[inline]
    pub fn get(&self, handle: GcRef) -> Option<&HeapObject> {
        self.arena.get(handle)
    }

    /// Gets a live object mutably.
    #[inline]
    pub fn get_mut(&mut self, handle: GcRef) -> Option<&mut HeapObject> {
        self.arena.get_mut(handle)
    }

    /// Gets a slot header.
    #[inline]
    pub fn header(&self, handle: GcRef) -> Option<&ObjectHeader> {
        self.arena.header(handle)
    }

    /// Whether the slot behind `handle` currently holds an object.
    pub fn is_live(&self, handle: GcRef) -> bool {
        self.header(handle).is_some_and(ObjectHeader::is_in_use)
    }

    /// Current totals.
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            capacity: self.arena.capacity(),
            live: self.arena.live(),
            collections: self.collections,
            freed: self.freed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::Value;

    struct Roots(Vec<Value>);

    impl Traceable for Roots {
        fn trace(&self, tracer: &mut Tracer) {
            tracer.mark_all(&self.0);
        }
    }

    fn text(s: &str) -> HeapObject {
        HeapObject::Text(s.to_string())
    }

    #[test]
    fn test_unrooted_objects_are_collected() {
        let mut heap = Heap::new(64);
        let none = Roots(Vec::new());

        for i in 0..20 {
            heap.allocate(text(&i.to_string()), &none).unwrap();
        }
        assert_eq!(heap.stats().live, 20);

        let stats = heap.collect(&none);
        assert_eq!(stats.freed, 20);
        assert_eq!(heap.stats().live, 0);
    }

    #[test]
    fn test_reachable_objects_survive() {
        let mut heap = Heap::new(64);
        let none = Roots(Vec::new());

        let kept = heap.allocate(text("kept"), &none).unwrap();
        let nested = heap.allocate(text("nested"), &none).unwrap();
        let book = heap
            .allocate(HeapObject::Book(vec![Value::Text(nested)]), &none)
            .unwrap();
        let garbage: Vec<_> = (0..5)
            .map(|_| heap.allocate(text("garbage"), &none).unwrap())
            .collect();

        let roots = Roots(vec![Value::Text(kept), Value::Book(book)]);
        heap.collect(&roots);

        assert!(heap.is_live(kept));
        assert!(heap.is_live(nested));
        assert!(heap.is_live(book));
        for handle in garbage {
            assert!(!heap.is_live(handle));
        }
        assert_eq!(heap.stats().live, 3);
    }

    #[test]
    fn test_cycles_are_collected() {
        let mut heap = Heap::new(8);
        let none = Roots(Vec::new());

        let a = heap.allocate(HeapObject::Book(Vec::new()), &none).unwrap();
        let b = heap
            .allocate(HeapObject::Book(vec![Value::Book(a)]), &none)
            .unwrap();
        if let Some(HeapObject::Book(pages)) = heap.get_mut(a) {
            pages.push(Value::Book(b));
        }

        heap.collect(&none);
        assert_eq!(heap.stats().live, 0);
    }

    #[test]
    fn test_exhaustion_triggers_collection() {
        let mut heap = Heap::new(4);
        let none = Roots(Vec::new());

        for _ in 0..4 {
            heap.allocate(text("x"), &none).unwrap();
        }
        let handle = heap.allocate(text("y"), &none).unwrap();

        assert_eq!(heap.stats().collections, 1);
        assert_eq!(heap.stats().live, 1);
        assert!(matches!(heap.get(handle), Some(HeapObject::Text(s)) if s == "y"));
    }

    #[test]
    fn test_pending_object_children_survive() {
        let mut heap = Heap::new(2);
        let none = Roots(Vec::new());

        let child = heap.allocate(text("child"), &none).unwrap();
        heap.allocate(text("filler"), &none).unwrap();

        let book = heap
            .allocate(HeapObject::Book(vec![Value::Text(child)]), &none)
            .unwrap();
        assert!(heap.is_live(child));
        assert!(heap.is_live(book));
    }

    #[test]
    fn test_exhaustion_after_collection_fails() {
        let mut heap = Heap::new(2);
        let a = heap.allocate(text("a"), &Roots(Vec::new())).unwrap();
        let b = heap.allocate(text("b"), &Roots(Vec::new())).unwrap();

        let roots = Roots(vec![Value::Text(a), Value::Text(b)]);
        let rejected = heap.allocate(text("c"), &roots).unwrap_err();
        assert!(matches!(rejected, HeapObject::Text(s) if s == "c"));
        assert!(heap.is_live(a));
        assert!(heap.is_live(b));
    }

    #[test]
    fn test_teardown() {
        let mut heap = Heap::new(4);
        let handle = heap.allocate(text("a"), &Roots(Vec::new())).unwrap();
        heap.teardown();
        assert!(!heap.is_live(handle));
        assert_eq!(heap.stats().live, 0);
    }
}
