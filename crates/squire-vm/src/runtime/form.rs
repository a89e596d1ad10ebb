//! Forms and their imitations.
//!
//! A form holds essences (static fields), recollections (static journeys),
//! changes (instance journeys), the matter layout its imitations carry,
//! an optional `imitate` constructor and its parents. Lookup through
//! parents is depth-first in declaration order.

use crate::gc::{GcRef, Traceable, Tracer};
use crate::runtime::value::Value;

/// A static field.
#[derive(Debug, Clone, PartialEq)]
pub struct Essence {
    /// Field name
    pub name: String,
    /// Current value
    pub value: Value,
    /// Pattern new values must match
    pub genus: Option<Value>,
}

impl Essence {
    /// An unguarded essence.
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            genus: None,
        }
    }
}

/// An instance field declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Matter {
    /// Field name
    pub name: String,
    /// Pattern values must match
    pub genus: Option<Value>,
}

impl Matter {
    /// An unguarded matter slot.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            genus: None,
        }
    }

    /// A matter slot guarded by `genus`.
    pub fn guarded(name: impl Into<String>, genus: Value) -> Self {
        Self {
            name: name.into(),
            genus: Some(genus),
        }
    }
}

/// A class-like type descriptor.
#[derive(Debug, Clone, Default)]
pub struct Form {
    /// Form name
    pub name: String,
    /// Static fields
    pub essences: Vec<Essence>,
    /// Instance field layout
    pub matter: Vec<Matter>,
    /// Static journeys
    pub recollections: Vec<GcRef>,
    /// Instance journeys
    pub changes: Vec<GcRef>,
    /// Constructor journey
    pub imitate: Option<GcRef>,
    /// Parent forms
    pub parents: Vec<GcRef>,
}

impl Form {
    /// An empty form.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Appends a matter slot.
    pub fn with_matter(mut self, matter: Matter) -> Self {
        self.matter.push(matter);
        self
    }

    /// Appends an essence.
    pub fn with_essence(mut self, essence: Essence) -> Self {
        self.essences.push(essence);
        self
    }

    /// Appends a parent.
    pub fn with_parent(mut self, parent: GcRef) -> Self {
        self.parents.push(parent);
        self
    }

    /// Appends a change.
    pub fn with_change(mut self, journey: GcRef) -> Self {
        self.changes.push(journey);
        self
    }

    /// Appends a recollection.
    pub fn with_recollection(mut self, journey: GcRef) -> Self {
        self.recollections.push(journey);
        self
    }

    /// Sets the constructor.
    pub fn with_imitate(mut self, journey: GcRef) -> Self {
        self.imitate = Some(journey);
        self
    }

    /// Position of a matter slot.
    pub fn matter_index(&self, name: &str) -> Option<usize> {
        self.matter.iter().position(|m| m.name == name)
    }

    /// Position of an essence.
    pub fn essence_index(&self, name: &str) -> Option<usize> {
        self.essences.iter().position(|e| e.name == name)
    }
}

impl Traceable for Form {
    fn trace(&self, tracer: &mut Tracer) {
        for essence in &self.essences {
            tracer.mark(essence.value);
            essence.genus.trace(tracer);
        }
        for matter in &self.matter {
            matter.genus.trace(tracer);
        }
        self.recollections.trace(tracer);
        self.changes.trace(tracer);
        self.imitate.trace(tracer);
        self.parents.trace(tracer);
    }
}

/// An instance of a form.
#[derive(Debug, Clone, PartialEq)]
pub struct Imitation {
    /// The form this imitates
    pub form: GcRef,
    /// Instance fields, laid out like the form's matter
    pub matter: Vec<Value>,
}

impl Traceable for Imitation {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.mark_ref(self.form);
        tracer.mark_all(&self.matter);
    }
}
