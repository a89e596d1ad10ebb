//! Squire value representation.

use std::fmt;

use crate::error::{Error, Result};
use crate::gc::GcRef;

/// The runtime type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Genus {
    /// The null value
    Ni,
    /// `yea` / `nay`
    Veracity,
    /// Signed 64-bit integer
    Numeral,
    /// Immutable string
    Text,
    /// Class-like type descriptor
    Form,
    /// Instance of a form
    Imitation,
    /// Multi-pattern function
    Journey,
    /// Growable sequence
    Book,
    /// Key/value map
    Codex,
    /// Host callables and pattern helpers
    Other,
}

impl Genus {
    /// Every genus, in tag order.
    pub const ALL: [Genus; 10] = [
        Genus::Ni,
        Genus::Veracity,
        Genus::Numeral,
        Genus::Text,
        Genus::Form,
        Genus::Imitation,
        Genus::Journey,
        Genus::Book,
        Genus::Codex,
        Genus::Other,
    ];

    /// The name programs use to refer to this genus.
    pub fn name(self) -> &'static str {
        match self {
            Genus::Ni => "Ni",
            Genus::Veracity => "Veracity",
            Genus::Numeral => "Numeral",
            Genus::Text => "Text",
            Genus::Form => "Form",
            Genus::Imitation => "Imitation",
            Genus::Journey => "Journey",
            Genus::Book => "Book",
            Genus::Codex => "Codex",
            Genus::Other => "Other",
        }
    }

    /// Looks a genus up by its name.
    pub fn from_name(name: &str) -> Option<Genus> {
        Genus::ALL.into_iter().find(|genus| genus.name() == name)
    }

    /// Whether values of this genus live in the heap arena.
    pub fn is_heap(self) -> bool {
        !matches!(self, Genus::Ni | Genus::Veracity | Genus::Numeral)
    }
}

impl fmt::Display for Genus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A Squire value.
///
/// Scalars are stored inline; everything else is a handle into the heap
/// arena. Copying a value never touches the object it refers to, and the
/// derived equality is *identity*: two texts with the same content are
/// different values here. Language-level equality is
/// [`Vm::eql`](crate::Vm::eql).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Value {
    /// ni
    #[default]
    Ni,
    /// yea / nay
    Veracity(bool),
    /// Integer
    Numeral(i64),
    /// Handle to a text
    Text(GcRef),
    /// Handle to a form
    Form(GcRef),
    /// Handle to an imitation
    Imitation(GcRef),
    /// Handle to a journey
    Journey(GcRef),
    /// Handle to a book
    Book(GcRef),
    /// Handle to a codex
    Codex(GcRef),
    /// Handle to a host callable or pattern helper
    Other(GcRef),
}

impl Value {
    /// `yea`
    pub const YEA: Value = Value::Veracity(true);
    /// `nay`
    pub const NAY: Value = Value::Veracity(false);

    /// Returns the genus tag. Total over all values.
    pub fn genus(&self) -> Genus {
        match self {
            Value::Ni => Genus::Ni,
            Value::Veracity(_) => Genus::Veracity,
            Value::Numeral(_) => Genus::Numeral,
            Value::Text(_) => Genus::Text,
            Value::Form(_) => Genus::Form,
            Value::Imitation(_) => Genus::Imitation,
            Value::Journey(_) => Genus::Journey,
            Value::Book(_) => Genus::Book,
            Value::Codex(_) => Genus::Codex,
            Value::Other(_) => Genus::Other,
        }
    }

    /// Builds a heap value of the given genus around a handle.
    ///
    /// Returns `None` for the inline genera.
    pub fn from_ref(genus: Genus, handle: GcRef) -> Option<Value> {
        Some(match genus {
            Genus::Text => Value::Text(handle),
            Genus::Form => Value::Form(handle),
            Genus::Imitation => Value::Imitation(handle),
            Genus::Journey => Value::Journey(handle),
            Genus::Book => Value::Book(handle),
            Genus::Codex => Value::Codex(handle),
            Genus::Other => Value::Other(handle),
            Genus::Ni | Genus::Veracity | Genus::Numeral => return None,
        })
    }

    /// The heap handle, if this value lives in the arena.
    pub fn heap_ref(&self) -> Option<GcRef> {
        match *self {
            Value::Text(r)
            | Value::Form(r)
            | Value::Imitation(r)
            | Value::Journey(r)
            | Value::Book(r)
            | Value::Codex(r)
            | Value::Other(r) => Some(r),
            Value::Ni | Value::Veracity(_) | Value::Numeral(_) => None,
        }
    }

    /// Returns true if this value is ni.
    pub fn is_ni(&self) -> bool {
        matches!(self, Value::Ni)
    }

    /// The integer, when this is a numeral.
    pub fn as_numeral(&self) -> Option<i64> {
        match *self {
            Value::Numeral(n) => Some(n),
            _ => None,
        }
    }

    /// The boolean, when this is a veracity.
    pub fn as_veracity(&self) -> Option<bool> {
        match *self {
            Value::Veracity(b) => Some(b),
            _ => None,
        }
    }

    /// Decodes a numeral, treating any other genus as a contract violation.
    pub fn expect_numeral(&self) -> Result<i64> {
        self.as_numeral().ok_or_else(|| self.wrong(Genus::Numeral))
    }

    /// Decodes a handle of the given genus, treating any other genus as a
    /// contract violation.
    pub fn expect_ref(&self, genus: Genus) -> Result<GcRef> {
        match self.heap_ref() {
            Some(r) if self.genus() == genus => Ok(r),
            _ => Err(self.wrong(genus)),
        }
    }

    fn wrong(&self, expected: Genus) -> Error {
        Error::WrongGenus {
            expected,
            found: self.genus(),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Veracity(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Numeral(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genus_of_scalars() {
        assert_eq!(Value::Ni.genus(), Genus::Ni);
        assert_eq!(Value::YEA.genus(), Genus::Veracity);
        assert_eq!(Value::Numeral(-3).genus(), Genus::Numeral);
    }

    #[test]
    fn test_genus_survives_copy() {
        let handle = GcRef::new(7);
        let values = [
            Value::Ni,
            Value::NAY,
            Value::Numeral(12),
            Value::Text(handle),
            Value::Form(handle),
            Value::Imitation(handle),
            Value::Journey(handle),
            Value::Book(handle),
            Value::Codex(handle),
            Value::Other(handle),
        ];

        for value in values {
            let copy = value;
            assert_eq!(copy.genus(), value.genus());
            assert_eq!(copy, value);
        }
    }

    #[test]
    fn test_from_ref_round_trips_heap_genera() {
        let handle = GcRef::new(3);
        for genus in Genus::ALL {
            match Value::from_ref(genus, handle) {
                Some(value) => {
                    assert!(genus.is_heap());
                    assert_eq!(value.genus(), genus);
                    assert_eq!(value.heap_ref(), Some(handle));
                }
                None => assert!(!genus.is_heap()),
            }
        }
    }

    #[test]
    fn test_expect_wrong_genus() {
        let err = Value::Numeral(1).expect_ref(Genus::Text).unwrap_err();
        assert!(matches!(
            err,
            Error::WrongGenus {
                expected: Genus::Text,
                found: Genus::Numeral
            }
        ));
        assert_eq!(Value::Numeral(4).expect_numeral().unwrap(), 4);
        assert!(Value::Ni.expect_numeral().is_err());
    }

    #[test]
    fn test_genus_names() {
        assert_eq!(Genus::from_name("Book"), Some(Genus::Book));
        assert_eq!(Genus::from_name("book"), None);
        assert_eq!(Genus::Codex.to_string(), "Codex");
    }

    #[test]
    fn test_default_is_ni() {
        assert!(Value::default().is_ni());
        assert_eq!(Value::from(true), Value::YEA);
        assert_eq!(Value::from(9i64), Value::Numeral(9));
    }
}
