//! Conversions between genera and the debug form.

use std::fmt::Write as _;

use rustc_hash::FxHashSet;

use super::{Vm, flatten};
use crate::error::Result;
use crate::gc::GcRef;
use crate::runtime::journey::Args;
use crate::runtime::native::Other;
use crate::runtime::numeral;
use crate::runtime::value::{Genus, Value};
use crate::runtime::{RunResult, Unwind};

/// Containers currently being rendered, for cycle detection.
type Visiting = FxHashSet<GcRef>;

impl Vm {
    /// Runs the conversion change `name` of an imitation and checks the
    /// genus of what it returns.
    fn convert_with_change(&mut self, value: Value, name: &str, expected: Genus) -> RunResult<Option<Value>> {
        let Some(change) = self.change_of(value, name)? else {
            return Ok(None);
        };
        let result = self.call_value(Value::Journey(change), Args::new(vec![value]))?;
        if result.genus() != expected {
            let owner = self.typename(value)?;
            return Err(self.throw_error(format!(
                "{name} for an imitation of '{owner}' didn't return a {}",
                expected.name().to_lowercase()
            )));
        }
        Ok(Some(result))
    }

    fn cannot_convert(&mut self, value: Value, target: &str) -> crate::runtime::Unwind {
        match self.typename(value) {
            Ok(name) => self.throw_error(format!("cannot convert {name} to a {target}")),
            Err(err) => err.into(),
        }
    }

    /// Text form of a value.
    pub fn to_text(&mut self, value: Value) -> RunResult<String> {
        let mut out = String::new();
        self.text_into(value, &mut Visiting::default(), &mut out)?;
        Ok(out)
    }

    /// Like [`Vm::to_text`], but allocates the result.
    pub fn to_text_value(&mut self, value: Value) -> RunResult<Value> {
        if let Value::Text(_) = value {
            return Ok(value);
        }
        let text = self.to_text(value)?;
        self.new_text(text)
    }

    fn text_into(&mut self, value: Value, visiting: &mut Visiting, out: &mut String) -> RunResult<()> {
        match value {
            Value::Ni => out.push_str("ni"),
            Value::Veracity(true) => out.push_str("yea"),
            Value::Veracity(false) => out.push_str("nay"),
            Value::Numeral(n) => out.push_str(&numeral::to_arabic(n)),
            Value::Text(handle) => out.push_str(self.text_ref(handle)?),
            Value::Form(handle) => out.push_str(&self.form_ref(handle)?.name),
            Value::Other(handle) => out.push_str(self.other_ref(handle)?.describe()),
            Value::Book(handle) => {
                if !visiting.insert(handle) {
                    out.push_str("[...]");
                    return Ok(());
                }
                let pages = self.book_ref(handle)?.clone();
                out.push('[');
                self.with_pinned(&pages, |vm| {
                    for (i, &page) in pages.iter().enumerate() {
                        if i != 0 {
                            out.push_str(", ");
                        }
                        vm.text_into(page, visiting, out)?;
                    }
                    Ok::<_, Unwind>(())
                })?;
                out.push(']');
                visiting.remove(&handle);
            }
            Value::Codex(handle) => {
                if !visiting.insert(handle) {
                    out.push_str("{...}");
                    return Ok(());
                }
                let pages = self.codex_ref(handle)?.pages.clone();
                out.push('{');
                self.with_pinned(&flatten(&pages), |vm| {
                    for (i, &(key, page)) in pages.iter().enumerate() {
                        if i != 0 {
                            out.push_str(", ");
                        }
                        vm.text_into(key, visiting, out)?;
                        out.push_str(": ");
                        vm.text_into(page, visiting, out)?;
                    }
                    Ok::<_, Unwind>(())
                })?;
                out.push('}');
                visiting.remove(&handle);
            }
            Value::Imitation(_) => match self.convert_with_change(value, "to_text", Genus::Text)? {
                Some(text) => out.push_str(self.text_ref(text.expect_ref(Genus::Text)?)?),
                None => return Err(self.cannot_convert(value, "text")),
            },
            Value::Journey(_) => return Err(self.cannot_convert(value, "text")),
        }
        Ok(())
    }

    /// Numeric form of a value.
    pub fn to_numeral(&mut self, value: Value) -> RunResult<i64> {
        match value {
            Value::Ni => Ok(0),
            Value::Veracity(b) => Ok(i64::from(b)),
            Value::Numeral(n) => Ok(n),
            Value::Text(handle) => Ok(numeral::parse_numeral(self.text_ref(handle)?)),
            Value::Book(handle) => Ok(self.book_ref(handle)?.len() as i64),
            Value::Codex(handle) => Ok(self.codex_ref(handle)?.pages.len() as i64),
            Value::Imitation(_) => match self.convert_with_change(value, "to_numeral", Genus::Numeral)? {
                Some(result) => Ok(result.expect_numeral()?),
                None => Err(self.cannot_convert(value, "numeral")),
            },
            Value::Form(_) | Value::Journey(_) | Value::Other(_) => Err(self.cannot_convert(value, "numeral")),
        }
    }

    /// Truthiness of a value.
    pub fn to_veracity(&mut self, value: Value) -> RunResult<bool> {
        match value {
            Value::Ni => Ok(false),
            Value::Veracity(b) => Ok(b),
            Value::Numeral(n) => Ok(n != 0),
            Value::Text(handle) => Ok(!self.text_ref(handle)?.is_empty()),
            Value::Book(handle) => Ok(!self.book_ref(handle)?.is_empty()),
            Value::Codex(handle) => Ok(!self.codex_ref(handle)?.pages.is_empty()),
            Value::Imitation(_) => match self.convert_with_change(value, "to_veracity", Genus::Veracity)? {
                Some(result) => Ok(result == Value::YEA),
                None => Err(self.cannot_convert(value, "veracity")),
            },
            Value::Form(_) | Value::Journey(_) | Value::Other(_) => Err(self.cannot_convert(value, "veracity")),
        }
    }

    /// Book form of a value. Books are returned as they are.
    pub fn to_book(&mut self, value: Value) -> RunResult<Value> {
        match value {
            Value::Book(_) => Ok(value),
            Value::Ni => self.new_book(Vec::new()),
            Value::Numeral(n) => {
                let digits = n
                    .unsigned_abs()
                    .to_string()
                    .bytes()
                    .map(|digit| Value::Numeral(i64::from(digit - b'0')))
                    .collect();
                self.new_book(digits)
            }
            Value::Text(handle) => {
                let chars: Vec<String> = self.text_ref(handle)?.chars().map(String::from).collect();
                let book = self.new_book(Vec::with_capacity(chars.len()))?;
                self.with_pinned(&[book], |vm| {
                    let target = book.expect_ref(Genus::Book)?;
                    for c in chars {
                        let page = vm.new_text(c)?;
                        vm.book_mut(target)?.push(page);
                    }
                    Ok(book)
                })
            }
            Value::Codex(handle) => {
                let pairs = self.codex_ref(handle)?.pages.clone();
                let book = self.new_book(Vec::with_capacity(pairs.len()))?;
                self.with_pinned(&[value, book], |vm| {
                    let target = book.expect_ref(Genus::Book)?;
                    for (key, page) in pairs {
                        let pair = vm.new_book(vec![key, page])?;
                        vm.book_mut(target)?.push(pair);
                    }
                    Ok(book)
                })
            }
            Value::Imitation(_) => match self.convert_with_change(value, "to_book", Genus::Book)? {
                Some(book) => Ok(book),
                None => Err(self.cannot_convert(value, "book")),
            },
            Value::Veracity(_) | Value::Form(_) | Value::Journey(_) | Value::Other(_) => {
                Err(self.cannot_convert(value, "book"))
            }
        }
    }

    /// Codex form of a value. A book becomes a codex keyed by page number.
    pub fn to_codex(&mut self, value: Value) -> RunResult<Value> {
        match value {
            Value::Codex(_) => Ok(value),
            Value::Ni => self.new_codex(Vec::new()),
            Value::Book(handle) => {
                let pairs = self
                    .book_ref(handle)?
                    .iter()
                    .enumerate()
                    .map(|(i, &page)| (Value::Numeral(i as i64 + 1), page))
                    .collect();
                self.with_pinned(&[value], |vm| vm.new_codex(pairs))
            }
            Value::Imitation(_) => match self.convert_with_change(value, "to_codex", Genus::Codex)? {
                Some(codex) => Ok(codex),
                None => Err(self.cannot_convert(value, "codex")),
            },
            _ => Err(self.cannot_convert(value, "codex")),
        }
    }

    /// Size of a text (in characters), book or codex.
    pub fn length(&mut self, value: Value) -> RunResult<i64> {
        match value {
            Value::Text(handle) => Ok(self.text_ref(handle)?.chars().count() as i64),
            Value::Book(handle) => Ok(self.book_ref(handle)?.len() as i64),
            Value::Codex(handle) => Ok(self.codex_ref(handle)?.pages.len() as i64),
            Value::Imitation(_) => match self.convert_with_change(value, "length", Genus::Numeral)? {
                Some(result) => Ok(result.expect_numeral()?),
                None => Err(self.cannot_get_length(value)),
            },
            _ => Err(self.cannot_get_length(value)),
        }
    }

    fn cannot_get_length(&mut self, value: Value) -> crate::runtime::Unwind {
        match self.typename(value) {
            Ok(name) => self.throw_error(format!("cannot get length of {name}")),
            Err(err) => err.into(),
        }
    }

    /// The `genus` attribute: the form of an imitation, otherwise the
    /// genus name as a text.
    pub fn genus_of(&mut self, value: Value) -> RunResult<Value> {
        match value {
            Value::Imitation(handle) => Ok(Value::Form(self.imitation_ref(handle)?.form)),
            Value::Other(handle) if self.is_scroll(handle) => self.new_text("Scroll"),
            other => self.new_text(other.genus().name()),
        }
    }

    /// Renders the debug form of a value. Never runs Squire code.
    pub fn dump(&self, value: Value) -> Result<String> {
        let mut out = String::new();
        self.dump_into(value, &mut Visiting::default(), &mut out)?;
        Ok(out)
    }

    fn dump_into(&self, value: Value, visiting: &mut Visiting, out: &mut String) -> Result<()> {
        if let Some(handle) = value.heap_ref() {
            if !visiting.insert(handle) {
                out.push_str("...");
                return Ok(());
            }
        }

        match value {
            Value::Ni => out.push_str("Ni()"),
            Value::Veracity(b) => {
                let _ = write!(out, "Veracity({})", if b { "yea" } else { "nay" });
            }
            Value::Numeral(n) => {
                let _ = write!(out, "Numeral({n})");
            }
            Value::Text(handle) => {
                let _ = write!(out, "Text({:?})", self.text_ref(handle)?);
            }
            Value::Form(handle) => {
                let form = self.form_ref(handle)?;
                let _ = write!(out, "Form({}:", form.name);
                for (i, matter) in form.matter.iter().enumerate() {
                    if i != 0 {
                        out.push(',');
                    }
                    let _ = write!(out, " {}", matter.name);
                    if let Some(genus) = matter.genus {
                        out.push_str(" (");
                        self.dump_into(genus, visiting, out)?;
                        out.push(')');
                    }
                }
                if form.matter.is_empty() {
                    out.push_str(" <none>");
                }
                out.push(')');
            }
            Value::Imitation(handle) => {
                let imitation = self.imitation_ref(handle)?;
                let form = self.form_ref(imitation.form)?;
                let _ = write!(out, "{}(", form.name);
                for (i, matter) in form.matter.iter().enumerate() {
                    if i != 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{}=", matter.name);
                    let field = imitation.matter.get(i).copied().unwrap_or_default();
                    self.dump_into(field, visiting, out)?;
                }
                if form.matter.is_empty() {
                    out.push_str("<none>");
                }
                out.push(')');
            }
            Value::Journey(handle) => {
                let journey = self.journey_ref(handle)?;
                let _ = write!(out, "Journey({}, {} patterns)", journey.name, journey.patterns.len());
            }
            Value::Book(handle) => {
                out.push_str("Book([");
                for (i, &page) in self.book_ref(handle)?.iter().enumerate() {
                    if i != 0 {
                        out.push_str(", ");
                    }
                    self.dump_into(page, visiting, out)?;
                }
                out.push_str("])");
            }
            Value::Codex(handle) => {
                out.push_str("Codex({");
                for (i, &(key, page)) in self.codex_ref(handle)?.pages.iter().enumerate() {
                    if i != 0 {
                        out.push_str(", ");
                    }
                    self.dump_into(key, visiting, out)?;
                    out.push_str(": ");
                    self.dump_into(page, visiting, out)?;
                }
                out.push_str("})");
            }
            Value::Other(handle) => match self.other_ref(handle)? {
                Other::Scroll(scroll) => {
                    let _ = write!(out, "Scroll({}, mode={})", scroll.filename(), scroll.mode());
                }
                other => {
                    let _ = write!(out, "Other({})", other.describe());
                }
            },
        }

        if let Some(handle) = value.heap_ref() {
            visiting.remove(&handle);
        }
        Ok(())
    }
}
