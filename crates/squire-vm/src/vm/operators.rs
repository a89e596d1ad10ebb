//! Equality, ordering, arithmetic and indexing.
//!
//! Numerals coerce their right operand with `to_numeral`. Imitations defer
//! to the change named after the operator and throw when it is missing.

use std::cmp::Ordering;

use rustc_hash::FxHashSet;

use super::{Vm, flatten};
use crate::gc::GcRef;
use crate::runtime::journey::Args;
use crate::runtime::value::{Genus, Value};
use crate::runtime::{RunResult, Unwind};

/// Largest text or book an operator will build.
const MAX_REPEAT_LEN: usize = u32::MAX as usize;

/// Container pairs already under comparison.
type Comparing = FxHashSet<(GcRef, GcRef)>;

impl Vm {
    /// Calls the change `name` of `receiver` with `args`, if it has one.
    fn call_change(&mut self, receiver: Value, name: &str, args: Vec<Value>) -> RunResult<Option<Value>> {
        match self.change_of(receiver, name)? {
            Some(change) => self.call_value(Value::Journey(change), Args::new(args)).map(Some),
            None => Ok(None),
        }
    }

    /// Language equality.
    pub fn eql(&mut self, lhs: Value, rhs: Value) -> RunResult<bool> {
        self.eql_in(lhs, rhs, &mut Comparing::default())
    }

    /// A pair met again while it is still being compared is assumed equal;
    /// any real difference shows up elsewhere on the path.
    fn eql_in(&mut self, lhs: Value, rhs: Value, comparing: &mut Comparing) -> RunResult<bool> {
        match (lhs, rhs) {
            (Value::Text(l), Value::Text(r)) => Ok(l == r || self.text_ref(l)? == self.text_ref(r)?),
            (Value::Book(l), Value::Book(r)) => {
                if l == r || !comparing.insert((l, r)) {
                    return Ok(true);
                }
                let left = self.book_ref(l)?.clone();
                let right = self.book_ref(r)?.clone();
                if left.len() != right.len() {
                    comparing.remove(&(l, r));
                    return Ok(false);
                }
                let mut roots = left.clone();
                roots.extend_from_slice(&right);
                let equal = self.with_pinned(&roots, |vm| -> RunResult<bool> {
                    for (&a, &b) in left.iter().zip(&right) {
                        if !vm.eql_in(a, b, comparing)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                });
                comparing.remove(&(l, r));
                equal
            }
            (Value::Codex(l), Value::Codex(r)) => {
                if l == r || !comparing.insert((l, r)) {
                    return Ok(true);
                }
                let left = self.codex_ref(l)?.pages.clone();
                if left.len() != self.codex_ref(r)?.pages.len() {
                    comparing.remove(&(l, r));
                    return Ok(false);
                }
                let mut roots = flatten(&left);
                roots.push(rhs);
                let equal = self.with_pinned(&roots, |vm| -> RunResult<bool> {
                    for &(key, value) in &left {
                        match vm.codex_lookup(r, key)? {
                            Some(other) if vm.eql_in(value, other, comparing)? => {}
                            _ => return Ok(false),
                        }
                    }
                    Ok(true)
                });
                comparing.remove(&(l, r));
                equal
            }
            (Value::Imitation(_), _) => match self.call_change(lhs, "==", vec![lhs, rhs])? {
                Some(result) => self.to_veracity(result),
                None => Ok(lhs == rhs),
            },
            _ => Ok(lhs == rhs),
        }
    }

    /// Three-way comparison: negative, zero or positive.
    pub fn cmp(&mut self, lhs: Value, rhs: Value) -> RunResult<i64> {
        match lhs {
            Value::Numeral(l) => {
                let r = self.to_numeral(rhs)?;
                Ok(ordering(l.cmp(&r)))
            }
            Value::Text(handle) => {
                let right = self.to_text(rhs)?;
                Ok(ordering(self.text_ref(handle)?.as_str().cmp(right.as_str())))
            }
            Value::Imitation(_) => match self.call_change(lhs, "<=>", vec![lhs, rhs])? {
                Some(result) => self.to_numeral(result),
                None => Err(self.binary_error("cannot compare", lhs, "with", rhs)),
            },
            _ => Err(self.binary_error("cannot compare", lhs, "with", rhs)),
        }
    }

    /// Logical negation.
    pub fn not(&mut self, value: Value) -> RunResult<Value> {
        if let Some(result) = self.call_change(value, "!", vec![value])? {
            return Ok(result);
        }
        Ok(Value::from(!self.to_veracity(value)?))
    }

    /// Numeric negation.
    pub fn neg(&mut self, value: Value) -> RunResult<Value> {
        match value {
            Value::Numeral(n) => Ok(Value::Numeral(n.wrapping_neg())),
            _ => match self.call_change(value, "-@", vec![value])? {
                Some(result) => Ok(result),
                None => {
                    let name = self.typename(value)?;
                    Err(self.throw_error(format!("cannot numerically negate '{name}'")))
                }
            },
        }
    }

    /// `lhs + rhs`. A text on the right always concatenates.
    pub fn add(&mut self, lhs: Value, rhs: Value) -> RunResult<Value> {
        if let Value::Text(handle) = rhs {
            let mut text = self.to_text(lhs)?;
            text.push_str(self.text_ref(handle)?);
            return self.new_text(text);
        }

        match lhs {
            Value::Numeral(l) => Ok(Value::Numeral(l.wrapping_add(self.to_numeral(rhs)?))),
            Value::Text(handle) => {
                let right = self.to_text(rhs)?;
                let mut text = self.text_ref(handle)?.clone();
                text.push_str(&right);
                self.new_text(text)
            }
            Value::Book(handle) => {
                if let Value::Journey(_) = rhs {
                    return self.book_select(lhs, rhs);
                }
                let right = self.with_pinned(&[lhs], |vm| vm.to_book(rhs))?;
                let mut pages = self.book_ref(handle)?.clone();
                pages.extend(self.book_pages(right)?);
                self.with_pinned(&[lhs, right], |vm| vm.new_book(pages))
            }
            _ => match self.call_change(lhs, "+", vec![lhs, rhs])? {
                Some(result) => Ok(result),
                None => Err(self.binary_error("cannot add", lhs, "to", rhs)),
            },
        }
    }

    /// `lhs - rhs`.
    pub fn sub(&mut self, lhs: Value, rhs: Value) -> RunResult<Value> {
        match lhs {
            Value::Numeral(l) => Ok(Value::Numeral(l.wrapping_sub(self.to_numeral(rhs)?))),
            _ => match self.call_change(lhs, "-", vec![lhs, rhs])? {
                Some(result) => Ok(result),
                None => Err(self.binary_error("cannot subtract", lhs, "from", rhs)),
            },
        }
    }

    /// `lhs * rhs`.
    pub fn mul(&mut self, lhs: Value, rhs: Value) -> RunResult<Value> {
        match lhs {
            Value::Numeral(l) => Ok(Value::Numeral(l.wrapping_mul(self.to_numeral(rhs)?))),
            Value::Text(handle) => {
                let amount = self.to_numeral(rhs)?;
                let text = self.text_ref(handle)?;
                let fits = usize::try_from(amount)
                    .ok()
                    .filter(|&n| text.len().saturating_mul(n) <= MAX_REPEAT_LEN);
                match fits {
                    Some(n) => {
                        let repeated = text.repeat(n);
                        self.new_text(repeated)
                    }
                    None => Err(self.throw_error(format!(
                        "text multiplication by {amount} is out of range"
                    ))),
                }
            }
            Value::Book(handle) => match rhs {
                Value::Numeral(amount) => {
                    let pages = self.book_ref(handle)?;
                    let fits = usize::try_from(amount)
                        .ok()
                        .filter(|&n| pages.len().saturating_mul(n) <= MAX_REPEAT_LEN);
                    match fits {
                        Some(n) => {
                            let repeated = pages.repeat(n);
                            self.new_book(repeated)
                        }
                        None => Err(self.throw_error(format!(
                            "cannot repeat by {amount}"
                        ))),
                    }
                }
                Value::Text(_) => self.book_join(lhs, rhs),
                Value::Book(_) => self.book_product(lhs, rhs),
                Value::Journey(_) => self.book_map(lhs, rhs),
                _ => Err(self.binary_error("cannot multiply", lhs, "by", rhs)),
            },
            _ => match self.call_change(lhs, "*", vec![lhs, rhs])? {
                Some(result) => Ok(result),
                None => Err(self.binary_error("cannot multiply", lhs, "by", rhs)),
            },
        }
    }

    /// `lhs / rhs`.
    pub fn div(&mut self, lhs: Value, rhs: Value) -> RunResult<Value> {
        match lhs {
            Value::Numeral(l) => match self.to_numeral(rhs)? {
                0 => Err(self.throw_error("cannot divide by N")),
                r => Ok(Value::Numeral(l.wrapping_div(r))),
            },
            _ => match self.call_change(lhs, "/", vec![lhs, rhs])? {
                Some(result) => Ok(result),
                None => Err(self.binary_error("cannot divide", lhs, "by", rhs)),
            },
        }
    }

    /// `lhs % rhs`. A book modulo a journey reduces the book.
    pub fn rem(&mut self, lhs: Value, rhs: Value) -> RunResult<Value> {
        match (lhs, rhs) {
            (Value::Numeral(l), _) => match self.to_numeral(rhs)? {
                0 => Err(self.throw_error("cannot modulo by N")),
                r => Ok(Value::Numeral(l.wrapping_rem(r))),
            },
            (Value::Book(_), Value::Journey(_)) => self.book_reduce(lhs, rhs),
            _ => match self.call_change(lhs, "%", vec![lhs, rhs])? {
                Some(result) => Ok(result),
                None => Err(self.binary_error("cannot modulo", lhs, "by", rhs)),
            },
        }
    }

    /// `lhs ^ rhs`.
    pub fn pow(&mut self, lhs: Value, rhs: Value) -> RunResult<Value> {
        match lhs {
            Value::Numeral(base) => {
                let exponent = self.to_numeral(rhs)?;
                Ok(Value::Numeral(integer_pow(base, exponent)))
            }
            _ => match self.call_change(lhs, "^", vec![lhs, rhs])? {
                Some(result) => Ok(result),
                None => Err(self.binary_error("cannot exponentiate", lhs, "by", rhs)),
            },
        }
    }

    /// `value[key]`.
    pub fn index(&mut self, value: Value, key: Value) -> RunResult<Value> {
        match value {
            Value::Text(handle) => {
                let index = self.to_numeral(key)?;
                if index == 0 {
                    return Err(self.throw_error("cannot index by N."));
                }
                let text = self.text_ref(handle)?;
                let count = text.chars().count() as i64;
                let position = if index > 0 { index - 1 } else { index + count };
                if position < 0 || position >= count {
                    return Ok(Value::Ni);
                }
                let found = text.chars().nth(position as usize).map(String::from);
                match found {
                    Some(found) => self.new_text(found),
                    None => Ok(Value::Ni),
                }
            }
            Value::Book(handle) => {
                let index = self.to_numeral(key)?;
                let length = self.book_ref(handle)?.len();
                let position = self.page_position(index, length)?;
                Ok(self.book_ref(handle)?.get(position).copied().unwrap_or_default())
            }
            Value::Codex(handle) => Ok(self.codex_lookup(handle, key)?.unwrap_or_default()),
            _ => match self.call_change(value, "[]", vec![value, key])? {
                Some(result) => Ok(result),
                None => {
                    let name = self.typename(value)?;
                    Err(self.throw_error(format!("cannot index into '{name}'")))
                }
            },
        }
    }

    /// `value[key] = new`. Books grow with ni to fit.
    pub fn index_assign(&mut self, value: Value, key: Value, new: Value) -> RunResult<()> {
        match value {
            Value::Book(handle) => {
                let index = self.to_numeral(key)?;
                let length = self.book_ref(handle)?.len();
                let position = self.page_position(index, length)?;
                self.grow_book(handle, position.saturating_add(1))?;
                if let Some(page) = self.book_mut(handle)?.get_mut(position) {
                    *page = new;
                }
                Ok(())
            }
            Value::Codex(handle) => self.codex_insert(handle, key, new),
            _ => match self.call_change(value, "[]=", vec![value, key, new])? {
                Some(_) => Ok(()),
                None => {
                    let name = self.typename(value)?;
                    Err(self.throw_error(format!("cannot index assign into '{name}'")))
                }
            },
        }
    }

    /// Pads a book with ni until it holds `length` pages. Throws rather
    /// than aborting when the book cannot grow that far.
    pub(crate) fn grow_book(&mut self, handle: GcRef, length: usize) -> RunResult<()> {
        let grown = {
            let pages = self.book_mut(handle)?;
            if pages.len() >= length {
                return Ok(());
            }
            let additional = length - pages.len();
            length <= MAX_REPEAT_LEN && pages.try_reserve(additional).is_ok()
        };
        if !grown {
            return Err(self.throw_error(format!("cannot grow a book to {length} pages")));
        }
        self.book_mut(handle)?.resize(length, Value::Ni);
        Ok(())
    }

    /// Turns a 1-based, possibly negative index into a position.
    pub(crate) fn page_position(&mut self, index: i64, length: usize) -> RunResult<usize> {
        if index == 0 {
            return Err(self.throw_error("cannot index by N."));
        }
        let position = if index > 0 {
            index - 1
        } else {
            index + length as i64
        };
        if position < 0 {
            return Err(self.throw_error(format!("index '{index}' out of bounds")));
        }
        Ok(position as usize)
    }

    /// Finds the value stored under `key`.
    pub(crate) fn codex_lookup(&mut self, codex: GcRef, key: Value) -> RunResult<Option<Value>> {
        Ok(self.codex_position(codex, key)?.map(|(_, value)| value))
    }

    fn codex_position(&mut self, codex: GcRef, key: Value) -> RunResult<Option<(usize, Value)>> {
        let pages = self.codex_ref(codex)?.pages.clone();
        let mut roots = flatten(&pages);
        roots.push(key);
        self.with_pinned(&roots, |vm| -> RunResult<Option<(usize, Value)>> {
            for (position, &(existing, value)) in pages.iter().enumerate() {
                if vm.eql(existing, key)? {
                    return Ok(Some((position, value)));
                }
            }
            Ok(None)
        })
    }

    /// Stores `value` under `key`, replacing an equal key.
    pub(crate) fn codex_insert(&mut self, codex: GcRef, key: Value, value: Value) -> RunResult<()> {
        let found = self.with_pinned(&[key, value], |vm| vm.codex_position(codex, key))?;
        let pages = &mut self.codex_mut(codex)?.pages;
        match found {
            Some((position, _)) => pages[position].1 = value,
            None => pages.push((key, value)),
        }
        Ok(())
    }

    /// Removes `key`, returning what was stored under it.
    pub(crate) fn codex_remove(&mut self, codex: GcRef, key: Value) -> RunResult<Option<Value>> {
        let Some((position, value)) = self.codex_position(codex, key)? else {
            return Ok(None);
        };
        self.codex_mut(codex)?.pages.remove(position);
        Ok(Some(value))
    }

    /// Pins `book`, `journey` and a copy of the pages for the duration of
    /// `f`, so callbacks that shrink the book cannot free pages still in
    /// use.
    fn with_pages<T>(
        &mut self,
        book: Value,
        journey: Value,
        f: impl FnOnce(&mut Self, &[Value]) -> RunResult<T>,
    ) -> RunResult<T> {
        let pages = self.book_pages(book)?;
        let mut roots = vec![book, journey];
        roots.extend_from_slice(&pages);
        self.with_pinned(&roots, |vm| f(vm, &pages))
    }

    fn book_select(&mut self, book: Value, journey: Value) -> RunResult<Value> {
        self.with_pages(book, journey, |vm, pages| {
            let result = vm.new_book(Vec::new())?;
            vm.with_pinned(&[result], |vm| -> RunResult<Value> {
                let handle = result.expect_ref(Genus::Book)?;
                for &page in pages {
                    let keep = vm.call_value(journey, Args::new(vec![page]))?;
                    if vm.to_veracity(keep)? {
                        vm.book_mut(handle)?.push(page);
                    }
                }
                Ok(result)
            })
        })
    }

    fn book_map(&mut self, book: Value, journey: Value) -> RunResult<Value> {
        self.with_pages(book, journey, |vm, pages| {
            let result = vm.new_book(Vec::with_capacity(pages.len()))?;
            vm.with_pinned(&[result], |vm| -> RunResult<Value> {
                let handle = result.expect_ref(Genus::Book)?;
                for &page in pages {
                    let mapped = vm.call_value(journey, Args::new(vec![page]))?;
                    vm.book_mut(handle)?.push(mapped);
                }
                Ok(result)
            })
        })
    }

    fn book_reduce(&mut self, book: Value, journey: Value) -> RunResult<Value> {
        self.with_pages(book, journey, |vm, pages| {
            let Some((&first, rest)) = pages.split_first() else {
                return Ok(Value::Ni);
            };
            let mut accumulator = first;
            for &page in rest {
                accumulator = vm.with_pinned(&[accumulator], |vm| {
                    vm.call_value(journey, Args::new(vec![accumulator, page]))
                })?;
            }
            Ok(accumulator)
        })
    }

    fn book_join(&mut self, book: Value, separator: Value) -> RunResult<Value> {
        let separator = self.text_of(separator)?;
        let parts = self.with_pages(book, Value::Ni, |vm, pages| {
            pages.iter().map(|&page| vm.to_text(page)).collect::<RunResult<Vec<_>>>()
        })?;
        self.new_text(parts.join(&separator))
    }

    /// Every `[a, b]` pair with `a` from `lhs` and `b` from `rhs`.
    fn book_product(&mut self, lhs: Value, rhs: Value) -> RunResult<Value> {
        let left = self.book_pages(lhs)?;
        let right = self.book_pages(rhs)?;
        let count = left.len().saturating_mul(right.len());
        if count > MAX_REPEAT_LEN {
            return Err(self.throw_error(format!("cannot build a book of {count} pairs")));
        }
        let result = self.new_book(Vec::with_capacity(count))?;
        self.with_pinned(&[lhs, rhs, result], |vm| -> RunResult<Value> {
            let handle = result.expect_ref(Genus::Book)?;
            for &a in &left {
                for &b in &right {
                    let pair = vm.new_book(vec![a, b])?;
                    vm.book_mut(handle)?.push(pair);
                }
            }
            Ok(result)
        })
    }

    fn binary_error(&mut self, verb: &str, lhs: Value, joiner: &str, rhs: Value) -> Unwind {
        let names = self
            .typename(lhs)
            .and_then(|l| self.typename(rhs).map(|r| (l, r)));
        match names {
            Ok((l, r)) => self.throw_error(format!("{verb} '{l}' {joiner} '{r}'")),
            Err(err) => err.into(),
        }
    }
}

fn ordering(ordering: Ordering) -> i64 {
    match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// Integer power with the truncation rules of a float power cast back to
/// an integer.
fn integer_pow(base: i64, exponent: i64) -> i64 {
    match exponent {
        0 => 1,
        e if e < 0 => match base {
            1 => 1,
            -1 if e % 2 == 0 => 1,
            -1 => -1,
            _ => 0,
        },
        e => base.wrapping_pow(u32::try_from(e).unwrap_or(u32::MAX)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::tests::vm;

    fn text(vm: &mut Vm, s: &str) -> Value {
        let value = vm.new_text(s).unwrap();
        vm.define_global(s.to_string(), value);
        value
    }

    fn book(vm: &mut Vm, pages: &[i64]) -> Value {
        let value = vm
            .new_book(pages.iter().copied().map(Value::Numeral).collect())
            .unwrap();
        vm.define_global("book", value);
        value
    }

    fn numerals(vm: &Vm, book: Value) -> Vec<i64> {
        vm.book_pages(book)
            .unwrap()
            .into_iter()
            .map(|v| v.as_numeral().unwrap())
            .collect()
    }

    #[test]
    fn test_add_numerals_and_texts() {
        let mut vm = vm();
        assert_eq!(vm.add(Value::Numeral(2), Value::Numeral(3)).unwrap(), Value::Numeral(5));

        let a = text(&mut vm, "a");
        let sum = vm.add(a, Value::Numeral(1)).unwrap();
        assert_eq!(vm.text_of(sum).unwrap(), "a1");

        let sum = vm.add(Value::Numeral(1), a).unwrap();
        assert_eq!(sum.genus(), Genus::Text);
        assert_eq!(vm.text_of(sum).unwrap(), "1a");

        let b = text(&mut vm, "b");
        let sum = vm.add(Value::YEA, b).unwrap();
        assert_eq!(vm.text_of(sum).unwrap(), "yeab");
    }

    #[test]
    fn test_numeral_coerces_right_operand() {
        let mut vm = vm();
        let x = text(&mut vm, "X");
        assert_eq!(vm.sub(Value::Numeral(12), x).unwrap(), Value::Numeral(2));
        assert_eq!(vm.add(Value::Numeral(1), Value::YEA).unwrap(), Value::Numeral(2));
    }

    #[test]
    fn test_division_by_zero_throws() {
        let mut vm = vm();
        assert!(vm.div(Value::Numeral(1), Value::Numeral(0)).unwrap_err().is_thrown());
        assert_eq!(
            vm.exception_message(vm.exception()).as_deref(),
            Some("cannot divide by N")
        );
        assert!(vm.rem(Value::Numeral(1), Value::Numeral(0)).unwrap_err().is_thrown());
        assert_eq!(
            vm.exception_message(vm.exception()).as_deref(),
            Some("cannot modulo by N")
        );
        assert_eq!(vm.div(Value::Numeral(7), Value::Numeral(2)).unwrap(), Value::Numeral(3));
        assert_eq!(vm.rem(Value::Numeral(7), Value::Numeral(2)).unwrap(), Value::Numeral(1));
    }

    #[test]
    fn test_pow() {
        let mut vm = vm();
        assert_eq!(vm.pow(Value::Numeral(5), Value::Numeral(0)).unwrap(), Value::Numeral(1));
        assert_eq!(vm.pow(Value::Numeral(2), Value::Numeral(10)).unwrap(), Value::Numeral(1024));
        assert_eq!(vm.pow(Value::Numeral(2), Value::Numeral(-1)).unwrap(), Value::Numeral(0));
        assert_eq!(vm.pow(Value::Numeral(-1), Value::Numeral(-3)).unwrap(), Value::Numeral(-1));
    }

    #[test]
    fn test_equality() {
        let mut vm = vm();
        let a = text(&mut vm, "same");
        let b = vm.new_text("same").unwrap();
        assert!(vm.eql(a, b).unwrap());
        assert!(!vm.eql(Value::Numeral(1), Value::YEA).unwrap());

        let x = book(&mut vm, &[1, 2]);
        let y = vm.new_book(vec![Value::Numeral(1), Value::Numeral(2)]).unwrap();
        assert!(vm.eql(x, y).unwrap());
    }

    #[test]
    fn test_compare() {
        let mut vm = vm();
        assert_eq!(vm.cmp(Value::Numeral(1), Value::Numeral(2)).unwrap(), -1);
        let a = text(&mut vm, "a");
        let b = text(&mut vm, "b");
        assert_eq!(vm.cmp(b, a).unwrap(), 1);
        assert!(vm.cmp(Value::Ni, Value::Ni).unwrap_err().is_thrown());
    }

    #[test]
    fn test_text_indexing_is_one_based() {
        let mut vm = vm();
        let word = text(&mut vm, "héllo");
        let e = vm.index(word, Value::Numeral(2)).unwrap();
        assert_eq!(vm.text_of(e).unwrap(), "é");
        let last = vm.index(word, Value::Numeral(-1)).unwrap();
        assert_eq!(vm.text_of(last).unwrap(), "o");
        assert_eq!(vm.index(word, Value::Numeral(9)).unwrap(), Value::Ni);
        assert!(vm.index(word, Value::Numeral(0)).unwrap_err().is_thrown());
    }

    #[test]
    fn test_book_indexing() {
        let mut vm = vm();
        let b = book(&mut vm, &[10, 20, 30]);
        assert_eq!(vm.index(b, Value::Numeral(1)).unwrap(), Value::Numeral(10));
        assert_eq!(vm.index(b, Value::Numeral(-1)).unwrap(), Value::Numeral(30));
        assert_eq!(vm.index(b, Value::Numeral(4)).unwrap(), Value::Ni);
        assert!(vm.index(b, Value::Numeral(-4)).unwrap_err().is_thrown());

        vm.index_assign(b, Value::Numeral(5), Value::Numeral(50)).unwrap();
        let pages = vm.book_pages(b).unwrap();
        assert_eq!(pages.len(), 5);
        assert_eq!(pages[3], Value::Ni);
        assert_eq!(pages[4], Value::Numeral(50));
    }

    #[test]
    fn test_codex_indexing() {
        let mut vm = vm();
        let codex = vm.new_codex(Vec::new()).unwrap();
        vm.define_global("codex", codex);
        let key = text(&mut vm, "key");
        let lookup = vm.new_text("key").unwrap();

        assert_eq!(vm.index(codex, key).unwrap(), Value::Ni);
        vm.index_assign(codex, key, Value::Numeral(1)).unwrap();
        assert_eq!(vm.index(codex, lookup).unwrap(), Value::Numeral(1));
    }

    #[test]
    fn test_book_operators() {
        let mut vm = vm();
        let b = book(&mut vm, &[1, 2]);

        let repeated = vm.mul(b, Value::Numeral(2)).unwrap();
        assert_eq!(numerals(&vm, repeated), vec![1, 2, 1, 2]);

        let comma = text(&mut vm, ", ");
        let joined = vm.mul(b, comma).unwrap();
        assert_eq!(vm.text_of(joined).unwrap(), "1, 2");

        let other = vm.new_book(vec![Value::Numeral(3), Value::Numeral(4)]).unwrap();
        vm.define_global("other", other);
        let pairs = vm.mul(b, other).unwrap();
        let pairs = vm.book_pages(pairs).unwrap();
        assert_eq!(pairs.len(), 4);
        assert_eq!(numerals(&vm, pairs[1]), vec![1, 4]);
        assert_eq!(numerals(&vm, pairs[2]), vec![2, 3]);

        let joined = vm.add(b, other).unwrap();
        assert_eq!(numerals(&vm, joined), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_text_repeat() {
        let mut vm = vm();
        let ab = text(&mut vm, "ab");
        let repeated = vm.mul(ab, Value::Numeral(3)).unwrap();
        assert_eq!(vm.text_of(repeated).unwrap(), "ababab");
        assert!(vm.mul(ab, Value::Numeral(-1)).unwrap_err().is_thrown());
    }

    #[test]
    fn test_operator_errors_name_both_genera() {
        let mut vm = vm();
        vm.add(Value::Ni, Value::Numeral(1)).unwrap_err();
        assert_eq!(
            vm.exception_message(vm.exception()).as_deref(),
            Some("cannot add 'Ni' to 'Numeral'")
        );
    }

    #[test]
    fn test_index_assign_far_past_the_end_throws() {
        let mut vm = vm();
        let b = book(&mut vm, &[1]);
        let err = vm
            .index_assign(b, Value::Numeral(1 << 62), Value::Numeral(1))
            .unwrap_err();
        assert!(err.is_thrown());
        let message = vm.exception_message(vm.exception()).unwrap();
        assert!(message.starts_with("cannot grow a book"));
        assert_eq!(numerals(&vm, b), vec![1]);
    }

    #[test]
    fn test_self_containing_books_compare_without_recursing_forever() {
        let mut vm = vm();
        let mut cyclic = Vec::new();
        for name in ["a", "b"] {
            let value = vm.new_book(Vec::new()).unwrap();
            vm.define_global(name, value);
            let handle = value.heap_ref().unwrap();
            vm.book_mut(handle).unwrap().push(value);
            cyclic.push(value);
        }
        assert!(vm.eql(cyclic[0], cyclic[1]).unwrap());

        let inner = book(&mut vm, &[1]);
        let nested = vm.new_book(vec![inner]).unwrap();
        vm.define_global("nested", nested);
        assert!(!vm.eql(cyclic[0], nested).unwrap());

        let text = vm.to_text(cyclic[0]).unwrap();
        assert_eq!(text, "[[...]]");
    }

    /// Empties every page but the first out of global `pages`, then
    /// collects, and returns its argument.
    fn shrink_and_collect(vm: &mut Vm, args: &Args) -> RunResult<Value> {
        let pages = vm.global_named("pages").unwrap_or_default();
        let handle = pages.expect_ref(Genus::Book)?;
        vm.book_mut(handle)?.truncate(1);
        vm.collect();
        Ok(args.positional[0])
    }

    #[test]
    fn test_map_keeps_pages_alive_when_the_callback_drops_them() {
        use crate::bytecode::Assembler;
        use crate::runtime::journey::{Parameter, Pattern};

        let mut vm = vm();
        let pages = vm.new_book(Vec::new()).unwrap();
        vm.define_global("pages", pages);
        let handle = pages.heap_ref().unwrap();
        for word in ["first", "second"] {
            let page = vm.new_text(word).unwrap();
            vm.book_mut(handle).unwrap().push(page);
        }

        let native = vm.define_native("shrink", Some(1), shrink_and_collect).unwrap();
        vm.define_global("shrink", native);
        let mut asm = Assembler::with_locals(1);
        let callee = asm.load(native);
        let result = asm.call(callee, &[0]);
        asm.ret(result);
        let pattern = Pattern::new(asm.finish().unwrap()).positional(Parameter::new("page"));
        let journey = vm.define_journey("each", vec![pattern]).unwrap();
        vm.define_global("each", journey);

        let mapped = vm.mul(pages, journey).unwrap();
        vm.define_global("mapped", mapped);
        vm.collect();

        let mapped = vm.book_pages(mapped).unwrap();
        assert_eq!(mapped.len(), 2);
        assert!(vm.is_live(mapped[1]));
        assert_eq!(vm.text_of(mapped[1]).unwrap(), "second");
        assert_eq!(vm.book_pages(pages).unwrap().len(), 1);
    }
}
