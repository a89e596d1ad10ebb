//! Heap object representation and tracing.
//!
//! Every arena slot carries an [`ObjectHeader`] (mark bit, in-use bit,
//! genus) and, while in use, one [`HeapObject`]. Children of an object are
//! reported through [`Traceable`]; only the kind-specific code knows them.

use std::fmt;

use crate::runtime::form::{Form, Imitation};
use crate::runtime::journey::Journey;
use crate::runtime::native::Other;
use crate::runtime::value::{Genus, Value};

/// Header shared by every arena slot.
///
/// Only the collector and allocator touch it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    flags: u8,
    genus: Genus,
}

/// Bits stored in [`ObjectHeader`].
pub struct ObjectFlags;

impl ObjectFlags {
    /// Slot holds a live object
    pub const IN_USE: u8 = 0b0000_0001;
    /// Reached during the current mark phase
    pub const MARKED: u8 = 0b0000_0010;
}

impl ObjectHeader {
    /// Header of a free slot.
    pub const fn free() -> Self {
        Self {
            flags: 0,
            genus: Genus::Ni,
        }
    }

    /// Header of a freshly allocated, unmarked slot.
    pub const fn in_use(genus: Genus) -> Self {
        Self {
            flags: ObjectFlags::IN_USE,
            genus,
        }
    }

    /// Checks the in-use bit.
    #[inline]
    pub fn is_in_use(&self) -> bool {
        self.flags & ObjectFlags::IN_USE != 0
    }

    /// Checks the mark bit.
    #[inline]
    pub fn is_marked(&self) -> bool {
        self.flags & ObjectFlags::MARKED != 0
    }

    /// Sets the mark bit.
    #[inline]
    pub fn mark(&mut self) {
        self.flags |= ObjectFlags::MARKED;
    }

    /// Clears the mark bit.
    #[inline]
    pub fn unmark(&mut self) {
        self.flags &= !ObjectFlags::MARKED;
    }

    /// Genus of the object in this slot.
    #[inline]
    pub fn genus(&self) -> Genus {
        self.genus
    }
}

impl Default for ObjectHeader {
    fn default() -> Self {
        Self::free()
    }
}

/// A handle to an arena slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GcRef(u32);

impl GcRef {
    /// Creates a handle for slot `index`.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the slot index.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Returns the raw slot number.
    #[inline]
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for GcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GcRef({})", self.0)
    }
}

/// Key/value map with insertion order; keys compare with language equality.
#[derive(Debug, Clone, Default)]
pub struct Codex {
    /// Key/value pairs in insertion order
    pub pages: Vec<(Value, Value)>,
}

/// Every kind of object the arena stores.
#[derive(Debug)]
pub enum HeapObject {
    /// Immutable string
    Text(String),
    /// Sequence of values
    Book(Vec<Value>),
    /// Map of values
    Codex(Codex),
    /// Class-like descriptor
    Form(Form),
    /// Instance of a form
    Imitation(Imitation),
    /// Multi-pattern function
    Journey(Journey),
    /// Host callable or pattern helper
    Other(Other),
}

impl HeapObject {
    /// The genus values referring to this object carry.
    pub fn genus(&self) -> Genus {
        match self {
            HeapObject::Text(_) => Genus::Text,
            HeapObject::Book(_) => Genus::Book,
            HeapObject::Codex(_) => Genus::Codex,
            HeapObject::Form(_) => Genus::Form,
            HeapObject::Imitation(_) => Genus::Imitation,
            HeapObject::Journey(_) => Genus::Journey,
            HeapObject::Other(_) => Genus::Other,
        }
    }
}

/// Collects handles reachable from the objects being traced.
#[derive(Debug, Default)]
pub struct Tracer {
    worklist: Vec<GcRef>,
}

impl Tracer {
    /// Creates an empty tracer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports a value; scalars are ignored.
    #[inline]
    pub fn mark(&mut self, value: Value) {
        if let Some(handle) = value.heap_ref() {
            self.worklist.push(handle);
        }
    }

    /// Reports every value in a slice.
    pub fn mark_all(&mut self, values: &[Value]) {
        for &value in values {
            self.mark(value);
        }
    }

    /// Reports a handle.
    #[inline]
    pub fn mark_ref(&mut self, handle: GcRef) {
        self.worklist.push(handle);
    }

    pub(crate) fn pop(&mut self) -> Option<GcRef> {
        self.worklist.pop()
    }
}

/// Reports the heap handles an object keeps alive.
///
/// Anything that holds values across an allocation must implement this
/// completely, or live objects get swept.
pub trait Traceable {
    /// Passes every directly referenced handle to the tracer.
    fn trace(&self, tracer: &mut Tracer);
}

impl Traceable for Value {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.mark(*self);
    }
}

impl<T: Traceable> Traceable for [T] {
    fn trace(&self, tracer: &mut Tracer) {
        for item in self {
            item.trace(tracer);
        }
    }
}

impl<T: Traceable> Traceable for Vec<T> {
    fn trace(&self, tracer: &mut Tracer) {
        self.as_slice().trace(tracer);
    }
}

impl<T: Traceable> Traceable for Option<T> {
    fn trace(&self, tracer: &mut Tracer) {
        if let Some(inner) = self {
            inner.trace(tracer);
        }
    }
}

impl Traceable for GcRef {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.mark_ref(*self);
    }
}

impl Traceable for Codex {
    fn trace(&self, tracer: &mut Tracer) {
        for &(key, value) in &self.pages {
            tracer.mark(key);
            tracer.mark(value);
        }
    }
}

impl Traceable for HeapObject {
    fn trace(&self, tracer: &mut Tracer) {
        match self {
            HeapObject::Text(_) => {}
            HeapObject::Book(pages) => tracer.mark_all(pages),
            HeapObject::Codex(codex) => codex.trace(tracer),
            HeapObject::Form(form) => form.trace(tracer),
            HeapObject::Imitation(imitation) => imitation.trace(tracer),
            HeapObject::Journey(journey) => journey.trace(tracer),
            HeapObject::Other(other) => other.trace(tracer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bits() {
        let mut header = ObjectHeader::in_use(Genus::Book);
        assert!(header.is_in_use());
        assert!(!header.is_marked());
        assert_eq!(header.genus(), Genus::Book);

        header.mark();
        assert!(header.is_marked());
        header.unmark();
        assert!(!header.is_marked());
        assert!(header.is_in_use());

        assert!(!ObjectHeader::free().is_in_use());
    }

    #[test]
    fn test_tracer_skips_scalars() {
        let mut tracer = Tracer::new();
        tracer.mark(Value::Numeral(1));
        tracer.mark(Value::Ni);
        tracer.mark(Value::Book(GcRef::new(4)));
        assert_eq!(tracer.pop(), Some(GcRef::new(4)));
        assert_eq!(tracer.pop(), None);
    }

    #[test]
    fn test_trace_containers() {
        let mut tracer = Tracer::new();
        let book = HeapObject::Book(vec![Value::Text(GcRef::new(1)), Value::YEA]);
        book.trace(&mut tracer);

        let codex = HeapObject::Codex(Codex {
            pages: vec![(Value::Text(GcRef::new(2)), Value::Book(GcRef::new(3)))],
        });
        codex.trace(&mut tracer);

        let mut seen = Vec::new();
        while let Some(handle) = tracer.pop() {
            seen.push(handle.raw());
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_object_genus() {
        assert_eq!(HeapObject::Text("hi".into()).genus(), Genus::Text);
        assert_eq!(HeapObject::Book(Vec::new()).genus(), Genus::Book);
        assert_eq!(HeapObject::Codex(Codex::default()).genus(), Genus::Codex);
    }
}
