//! The attribute protocol and `matches`.

use rustc_hash::FxHashSet;

use super::Vm;
use crate::error::Result;
use crate::gc::GcRef;
use crate::runtime::journey::Args;
use crate::runtime::native::Other;
use crate::runtime::value::{Genus, Value};
use crate::runtime::RunResult;

impl Vm {
    /// Reads attribute `name` of `value`. `None` means there is no such
    /// attribute.
    pub fn get_attr(&mut self, value: Value, name: &str) -> RunResult<Option<Value>> {
        match name {
            "genus" => return self.genus_of(value).map(Some),
            "length" => return Ok(Some(Value::Numeral(self.length(value)?))),
            _ => {}
        }

        match value {
            Value::Form(form) => Ok(self.form_attr(form, name)?),
            Value::Imitation(handle) => {
                let form = self.imitation_ref(handle)?.form;
                if let Some(change) = self.lookup_change(form, name)? {
                    return Ok(Some(Value::Journey(change)));
                }
                let Some(index) = self.form_ref(form)?.matter_index(name) else {
                    return Ok(None);
                };
                Ok(self.imitation_ref(handle)?.matter.get(index).copied())
            }
            Value::Book(_) | Value::Text(_) => match name {
                "verso" => self.index(value, Value::Numeral(1)).map(Some),
                "recto" => self.index(value, Value::Numeral(-1)).map(Some),
                _ => Ok(None),
            },
            Value::Journey(handle) if name == "arity" => {
                let arity = self.journey_ref(handle)?.arity();
                Ok(Some(Value::Numeral(arity as i64)))
            }
            Value::Other(handle) => self.scroll_attr(handle, name),
            _ => Ok(None),
        }
    }

    /// Looks `name` up as a recollection, then an essence, then through
    /// the parents depth-first.
    fn form_attr(&self, form: GcRef, name: &str) -> Result<Option<Value>> {
        let descriptor = self.form_ref(form)?;

        for &recollection in &descriptor.recollections {
            if self.journey_ref(recollection)?.name == name {
                return Ok(Some(Value::Journey(recollection)));
            }
        }
        if let Some(essence) = descriptor.essences.iter().find(|e| e.name == name) {
            return Ok(Some(essence.value));
        }
        for &parent in &descriptor.parents {
            if let Some(value) = self.form_attr(parent, name)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Finds the change `name` on `form` or its ancestors.
    pub(crate) fn lookup_change(&self, form: GcRef, name: &str) -> Result<Option<GcRef>> {
        let descriptor = self.form_ref(form)?;

        for &change in &descriptor.changes {
            if self.journey_ref(change)?.name == name {
                return Ok(Some(change));
            }
        }
        for &parent in &descriptor.parents {
            if let Some(change) = self.lookup_change(parent, name)? {
                return Ok(Some(change));
            }
        }
        Ok(None)
    }

    /// The change `name` of `value`'s form, when `value` is an imitation.
    pub(crate) fn change_of(&self, value: Value, name: &str) -> Result<Option<GcRef>> {
        match value {
            Value::Imitation(handle) => {
                let form = self.imitation_ref(handle)?.form;
                self.lookup_change(form, name)
            }
            _ => Ok(None),
        }
    }

    /// Whether `form` is `ancestor` or descends from it.
    pub(crate) fn is_descendant(&self, form: GcRef, ancestor: GcRef) -> Result<bool> {
        if form == ancestor {
            return Ok(true);
        }
        for &parent in &self.form_ref(form)?.parents {
            if self.is_descendant(parent, ancestor)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Assigns attribute `name` of `value`. Returns `false` when there is
    /// no such assignable attribute.
    pub fn set_attr(&mut self, value: Value, name: &str, new: Value) -> RunResult<bool> {
        match value {
            Value::Form(form) => {
                let descriptor = self.form_ref(form)?;
                let Some(index) = descriptor.essence_index(name) else {
                    return Ok(false);
                };
                let guard = descriptor.essences[index].genus;
                let owner = descriptor.name.clone();
                self.check_field_genus(guard, new, &owner, name)?;
                self.form_mut(form)?.essences[index].value = new;
                Ok(true)
            }
            Value::Imitation(handle) => {
                let form = self.imitation_ref(handle)?.form;
                let descriptor = self.form_ref(form)?;
                let Some(index) = descriptor.matter_index(name) else {
                    return Ok(false);
                };
                let guard = descriptor.matter[index].genus;
                let owner = descriptor.name.clone();
                self.check_field_genus(guard, new, &owner, name)?;
                let matter = &mut self.imitation_mut(handle)?.matter;
                if matter.len() <= index {
                    matter.resize(index + 1, Value::Ni);
                }
                matter[index] = new;
                Ok(true)
            }
            Value::Book(_) => match name {
                "verso" => self.index_assign(value, Value::Numeral(1), new).map(|()| true),
                "recto" => self.index_assign(value, Value::Numeral(-1), new).map(|()| true),
                _ => Ok(false),
            },
            _ => Ok(false),
        }
    }

    fn check_field_genus(&mut self, guard: Option<Value>, new: Value, owner: &str, field: &str) -> RunResult<()> {
        let Some(guard) = guard else {
            return Ok(());
        };
        if self.with_pinned(&[new], |vm| vm.matches(guard, new))? {
            return Ok(());
        }
        let found = self.typename(new)?;
        Err(self.throw_error(format!(
            "cannot assign a '{found}' to '{field}' of '{owner}': genus mismatch"
        )))
    }

    /// Whether `candidate` fits `pattern`.
    pub fn matches(&mut self, pattern: Value, candidate: Value) -> RunResult<bool> {
        self.matches_in(pattern, candidate, &mut FxHashSet::default())
    }

    /// `visiting` holds the books on the current path; a book reached again
    /// through itself matches nothing new.
    fn matches_in(&mut self, pattern: Value, candidate: Value, visiting: &mut FxHashSet<GcRef>) -> RunResult<bool> {
        match pattern {
            Value::Form(form) => match candidate {
                Value::Imitation(handle) => {
                    let own = self.imitation_ref(handle)?.form;
                    Ok(self.is_descendant(own, form)?)
                }
                _ => Ok(false),
            },
            Value::Journey(_) => {
                let result = self.call_value(pattern, Args::new(vec![candidate]))?;
                self.to_veracity(result)
            }
            Value::Text(handle) => {
                let genus = Genus::from_name(self.text_ref(handle)?);
                match genus {
                    Some(genus) if genus != Genus::Other && candidate.genus() == genus => Ok(true),
                    _ => self.eql(pattern, candidate),
                }
            }
            Value::Book(handle) => {
                if !visiting.insert(handle) {
                    return Ok(false);
                }
                let pages = self.book_ref(handle)?.clone();
                let found = self.with_pinned(&pages, |vm| -> RunResult<bool> {
                    for &page in &pages {
                        if vm.matches_in(page, candidate, visiting)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                });
                visiting.remove(&handle);
                found
            }
            Value::Other(handle) => match *self.other_ref(handle)? {
                Other::And(lhs, rhs) => {
                    Ok(self.matches_in(lhs, candidate, visiting)? && self.matches_in(rhs, candidate, visiting)?)
                }
                Other::Or(lhs, rhs) => {
                    Ok(self.matches_in(lhs, candidate, visiting)? || self.matches_in(rhs, candidate, visiting)?)
                }
                Other::Not(inner) => Ok(!self.matches_in(inner, candidate, visiting)?),
                Other::Native(_) => {
                    let result = self.call_value(pattern, Args::new(vec![candidate]))?;
                    self.to_veracity(result)
                }
                Other::Scroll(_) => Ok(pattern == candidate),
            },
            Value::Ni | Value::Veracity(_) | Value::Numeral(_) => self.eql(pattern, candidate),
            Value::Imitation(_) | Value::Codex(_) => {
                let name = self.typename(pattern)?;
                Err(self.throw_error(format!("cannot `match` on {name}")))
            }
        }
    }
}
