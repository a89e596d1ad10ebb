//! Scroll attributes and the host journeys behind them.
//!
//! `filename` and `mode` are texts. `write`, `read`, `readall`, `seek`,
//! `tell` and `close` are host journeys taking the scroll as their first
//! argument. Failures throw an `IoError`.

use std::io;

use tracing::debug;

use super::Vm;
use crate::gc::{GcRef, HeapObject};
use crate::runtime::journey::Args;
use crate::runtime::native::{NativeFn, Other};
use crate::runtime::scroll::Scroll;
use crate::runtime::value::Value;
use crate::runtime::RunResult;

const METHODS: &[(&str, usize, NativeFn)] = &[
    ("write", 2, scroll_write),
    ("read", 2, scroll_read),
    ("readall", 1, scroll_readall),
    ("seek", 3, scroll_seek),
    ("tell", 1, scroll_tell),
    ("close", 1, scroll_close),
];

impl Vm {
    /// Opens a file as a scroll (`INT FOPEN`).
    pub fn open_scroll(&mut self, filename: &str, mode: &str) -> RunResult<Value> {
        debug!(filename, mode, "opening scroll");
        match Scroll::open(filename, mode) {
            Ok(scroll) => self
                .allocate(HeapObject::Other(Other::Scroll(scroll)))
                .map(Value::Other),
            Err(err) => Err(self.throw_io(&format!("cannot open file '{filename}'"), &err)),
        }
    }

    pub(crate) fn is_scroll(&self, handle: GcRef) -> bool {
        matches!(self.other_ref(handle), Ok(Other::Scroll(_)))
    }

    pub(crate) fn scroll_attr(&mut self, handle: GcRef, name: &str) -> RunResult<Option<Value>> {
        let (filename, mode) = match self.other_ref(handle)? {
            Other::Scroll(scroll) => (scroll.filename().to_string(), scroll.mode().to_string()),
            _ => return Ok(None),
        };
        match name {
            "filename" => self.new_text(filename).map(Some),
            "mode" => self.new_text(mode).map(Some),
            _ => match METHODS.iter().find(|(method, ..)| *method == name) {
                Some(&(method, arity, func)) => self
                    .define_native(format!("Scroll.{method}"), Some(arity), func)
                    .map(Some),
                None => Ok(None),
            },
        }
    }

    /// Runs `action` on the scroll in `value`, turning I/O failures into a
    /// thrown `IoError` that mentions `what`.
    fn on_scroll<T>(
        &mut self,
        value: Value,
        what: &str,
        action: impl FnOnce(&mut Scroll) -> io::Result<T>,
    ) -> RunResult<T> {
        let outcome = match value {
            Value::Other(handle) => match self.other_mut(handle)? {
                Other::Scroll(scroll) => Some((scroll.filename().to_string(), action(scroll))),
                _ => None,
            },
            _ => None,
        };
        match outcome {
            Some((_, Ok(result))) => Ok(result),
            Some((filename, Err(err))) => Err(self.throw_io(&format!("cannot {what} '{filename}'"), &err)),
            None => {
                let name = self.typename(value)?;
                Err(self.throw_error(format!("'{name}' is not a scroll")))
            }
        }
    }
}

fn scroll_write(vm: &mut Vm, args: &Args) -> RunResult<Value> {
    let text = vm.to_text(args.positional[1])?;
    vm.on_scroll(args.positional[0], "write to", |scroll| scroll.write(&text))?;
    Ok(Value::Ni)
}

/// A positive numeral reads that many bytes, `"\n"` reads a line and ni
/// or zero read the rest of the file.
fn scroll_read(vm: &mut Vm, args: &Args) -> RunResult<Value> {
    let scroll = args.positional[0];
    let text = match args.positional[1] {
        Value::Ni | Value::Numeral(0) => vm.on_scroll(scroll, "read", Scroll::read_to_end)?,
        Value::Numeral(amount) => match u64::try_from(amount) {
            Ok(amount) => vm.on_scroll(scroll, "read", |scroll| scroll.read(amount))?,
            Err(_) => return Err(vm.throw_error("can only read nonnegative amounts")),
        },
        Value::Text(handle) if vm.text_ref(handle)? == "\n" => {
            vm.on_scroll(scroll, "read", Scroll::read_line)?
        }
        other => {
            let name = vm.typename(other)?;
            return Err(vm.throw_error(format!("invalid read argument kind '{name}'")));
        }
    };
    vm.new_text(text)
}

fn scroll_readall(vm: &mut Vm, args: &Args) -> RunResult<Value> {
    let text = vm.on_scroll(args.positional[0], "read", Scroll::read_to_end)?;
    vm.new_text(text)
}

fn scroll_seek(vm: &mut Vm, args: &Args) -> RunResult<Value> {
    let offset = vm.to_numeral(args.positional[1])?;
    let whence = vm.to_numeral(args.positional[2])?;
    let position = vm.on_scroll(args.positional[0], "seek", |scroll| scroll.seek(offset, whence))?;
    Ok(Value::Numeral(position as i64))
}

fn scroll_tell(vm: &mut Vm, args: &Args) -> RunResult<Value> {
    let position = vm.on_scroll(args.positional[0], "get the offset of", Scroll::tell)?;
    Ok(Value::Numeral(position as i64))
}

fn scroll_close(vm: &mut Vm, args: &Args) -> RunResult<Value> {
    vm.on_scroll(args.positional[0], "close", Scroll::close)?;
    Ok(Value::Ni)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::vm::tests::vm;

    fn call(vm: &mut Vm, scroll: Value, method: &str, rest: &[Value]) -> RunResult<Value> {
        let journey = vm.get_attr(scroll, method)?.unwrap();
        let mut args = vec![scroll];
        args.extend_from_slice(rest);
        vm.with_pinned(&[journey], |vm| vm.call_value(journey, Args::new(args)))
    }

    #[test]
    fn test_scroll_methods() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scroll.txt");
        let path = path.to_str().unwrap();

        let mut vm = vm();
        let scroll = vm.open_scroll(path, "w+").unwrap();
        vm.define_global("scroll", scroll);

        let text = vm.new_text("one\ntwo\n").unwrap();
        vm.define_global("text", text);
        assert_eq!(call(&mut vm, scroll, "write", &[text]).unwrap(), Value::Ni);
        assert_eq!(call(&mut vm, scroll, "tell", &[]).unwrap(), Value::Numeral(8));
        assert_eq!(
            call(&mut vm, scroll, "seek", &[Value::Numeral(0), Value::Numeral(0)]).unwrap(),
            Value::Numeral(0)
        );

        let newline = vm.new_text("\n").unwrap();
        vm.define_global("newline", newline);
        let line = call(&mut vm, scroll, "read", &[newline]).unwrap();
        assert_eq!(vm.text_of(line).unwrap(), "one\n");
        let rest = call(&mut vm, scroll, "readall", &[]).unwrap();
        assert_eq!(vm.text_of(rest).unwrap(), "two\n");

        let filename = vm.get_attr(scroll, "filename").unwrap().unwrap();
        assert_eq!(vm.text_of(filename).unwrap(), path);
        assert_eq!(vm.to_text(scroll).unwrap(), path);
        assert_eq!(vm.typename(scroll).unwrap(), "Scroll");
        assert_eq!(vm.dump(scroll).unwrap(), format!("Scroll({path}, mode=w+)"));

        assert!(call(&mut vm, scroll, "read", &[Value::Numeral(-1)]).unwrap_err().is_thrown());
        assert_eq!(call(&mut vm, scroll, "close", &[]).unwrap(), Value::Ni);

        let err = call(&mut vm, scroll, "close", &[]).unwrap_err();
        assert!(err.is_thrown());
        let io_error = vm.io_error_form();
        let exception = vm.exception();
        assert!(vm.matches(io_error, exception).unwrap());
    }

    #[test]
    fn test_open_failure_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.txt");

        let mut vm = vm();
        let err = vm.open_scroll(missing.to_str().unwrap(), "r").unwrap_err();
        assert!(err.is_thrown());
        let exception = vm.exception();
        let message = vm.exception_message(exception).unwrap();
        assert!(message.contains("cannot open file"));
        let io_error = vm.io_error_form();
        assert!(vm.matches(io_error, exception).unwrap());
    }

    #[test]
    fn test_unreachable_scroll_is_swept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("swept.txt");

        let mut vm = vm();
        let scroll = vm.open_scroll(path.to_str().unwrap(), "w").unwrap();
        assert!(vm.is_live(scroll));

        let freed = vm.collect().freed;
        assert!(freed >= 1);
        assert!(!vm.is_live(scroll));
        assert!(path.exists());
    }
}
