//! The `INT` instruction.
//!
//! Every interrupt reads its fixed operands, then the ones its own layout
//! adds (counts and pairs for the constructors), and stores one result in
//! a trailing destination register. `EXIT` is the only one without a
//! destination.

use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, trace};

use super::Vm;
use crate::bytecode::{Interrupt, MAX_ARITY};
use crate::error::Error;
use crate::runtime::numeral;
use crate::runtime::value::Value;
use crate::runtime::{RunResult, Unwind};

impl Vm {
    pub(crate) fn interrupt(&mut self, depth: usize) -> RunResult<()> {
        let frame = self.frame_mut(depth)?;
        let ip = frame.ip;
        let word = frame.next_word()?;
        let interrupt = Interrupt::decode(word).ok_or(Error::UnknownInterrupt { interrupt: word, ip })?;

        let mut operands = [Value::Ni; MAX_ARITY];
        for operand in operands.iter_mut().take(interrupt.arity()) {
            *operand = frame.next_local()?;
        }
        trace!(depth, ip, interrupt = interrupt.mnemonic(), "interrupt");

        let [a, b, c] = operands;
        let result = match interrupt {
            Interrupt::ToNumeral => Value::Numeral(self.to_numeral(a)?),
            Interrupt::ToText => self.to_text_value(a)?,
            Interrupt::ToVeracity => Value::from(self.to_veracity(a)?),
            Interrupt::ToBook => self.to_book(a)?,
            Interrupt::ToCodex => self.to_codex(a)?,
            Interrupt::Kindof => self.genus_of(a)?,
            Interrupt::Length => Value::Numeral(self.length(a)?),
            Interrupt::Arabic => {
                let n = self.to_numeral(a)?;
                self.new_text(numeral::to_arabic(n))?
            }
            Interrupt::Roman => {
                let n = self.to_numeral(a)?;
                self.new_text(numeral::to_roman(n))?
            }
            Interrupt::Ascii => self.ascii(a)?,

            Interrupt::Print | Interrupt::Println => {
                let text = self.to_text(a)?;
                if let Err(err) = self.write_output(&text, interrupt == Interrupt::Println) {
                    return Err(self.throw_io("writing output", &err));
                }
                Value::Ni
            }
            Interrupt::Dump => {
                let dump = self.dump(a)?;
                if let Err(err) = self.write_output(&dump, false) {
                    return Err(self.throw_io("writing output", &err));
                }
                a
            }
            Interrupt::Prompt => match self.read_line() {
                Ok(line) => self.new_text(line)?,
                Err(err) => return Err(self.throw_io("reading input", &err)),
            },
            Interrupt::System => {
                let command = self.to_text(a)?;
                self.system(&command)?
            }
            Interrupt::Exit => {
                let code = self.to_numeral(a)?;
                debug!(code, "exit requested");
                return Err(Unwind::Fatal(Error::Exit(code as i32)));
            }
            Interrupt::Random => Value::Numeral(self.random()),

            Interrupt::CodexNew => {
                let frame = self.frame_mut(depth)?;
                let count = frame.next_index()?;
                let mut pairs = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = frame.next_local()?;
                    let value = frame.next_local()?;
                    pairs.push((key, value));
                }
                self.new_codex(pairs)?
            }
            Interrupt::BookNew => {
                let frame = self.frame_mut(depth)?;
                let count = frame.next_index()?;
                let pages = (0..count)
                    .map(|_| frame.next_local())
                    .collect::<crate::error::Result<Vec<_>>>()?;
                self.new_book(pages)?
            }

            Interrupt::Substr => self.substr(a, b, c)?,
            Interrupt::ArrayInsert => {
                self.book_insert(a, b, c)?;
                c
            }
            Interrupt::ArrayDelete => self.delete(a, b)?,

            Interrupt::Babel => {
                let frame = self.frame_mut(depth)?;
                let count = frame.next_index()?;
                let args = (0..count)
                    .map(|_| frame.next_local())
                    .collect::<crate::error::Result<Vec<_>>>()?;
                self.babel(a, b, &args)?
            }
            Interrupt::Fopen => {
                let filename = self.to_text(a)?;
                let mode = self.to_text(b)?;
                self.open_scroll(&filename, &mode)?
            }
        };

        self.frame_mut(depth)?.set_next_local(result)?;
        Ok(())
    }

    fn ascii(&mut self, value: Value) -> RunResult<Value> {
        match value {
            Value::Numeral(n) => {
                let c = char::from((n & 0xff) as u8);
                self.new_text(c.to_string())
            }
            Value::Text(handle) => {
                let code = self.text_ref(handle)?.chars().next().map_or(0, u32::from);
                Ok(Value::Numeral(i64::from(code)))
            }
            _ => {
                let name = self.typename(value)?;
                Err(self.throw_error(format!(
                    "can only ascii numerals and text, not '{name}'"
                )))
            }
        }
    }

    fn system(&mut self, command: &str) -> RunResult<Value> {
        debug!(command, "running shell command");
        match Command::new("sh").arg("-c").arg(command).output() {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                self.new_text(stdout)
            }
            Err(err) => Err(self.throw_io("running command", &err)),
        }
    }

    /// Runs `executable` with `args`, feeding it `stdin`, and returns what
    /// it wrote to stdout followed by what it wrote to stderr.
    fn babel(&mut self, executable: Value, stdin: Value, args: &[Value]) -> RunResult<Value> {
        let executable = self.to_text(executable)?;
        let args = args
            .iter()
            .map(|&arg| self.to_text(arg))
            .collect::<RunResult<Vec<_>>>()?;
        let input = self.to_text(stdin)?;

        debug!(executable, ?args, "running babel");
        match run_babel(&executable, &args, input) {
            Ok(output) => self.new_text(output),
            Err(err) => Err(self.throw_io(&format!("cannot run '{executable}'"), &err)),
        }
    }

    /// `COUNT` characters of `text` starting at the 1-based `START`.
    fn substr(&mut self, text: Value, start: Value, count: Value) -> RunResult<Value> {
        let text = self.to_text(text)?;
        let start = self.to_numeral(start)?;
        if start == 0 {
            return Err(self.throw_error("cannot index by N."));
        }
        let count = self.to_numeral(count)?;

        let skip = usize::try_from(start - 1).unwrap_or(usize::MAX);
        let take = usize::try_from(count).unwrap_or(0);
        let result: String = text.chars().skip(skip).take(take).collect();
        self.new_text(result)
    }

    /// Inserts `value` so that it ends up at the 1-based `index`.
    fn book_insert(&mut self, book: Value, index: Value, value: Value) -> RunResult<()> {
        let Value::Book(handle) = book else {
            return Err(self.throw_error("can only insert into books"));
        };
        let index = self.to_numeral(index)?;
        let length = self.book_ref(handle)?.len();
        let position = if index < 0 {
            // -1 appends
            self.page_position(index, length + 1)?
        } else {
            self.page_position(index, length)?
        };

        self.grow_book(handle, position)?;
        self.book_mut(handle)?.insert(position, value);
        Ok(())
    }

    fn delete(&mut self, container: Value, key: Value) -> RunResult<Value> {
        match container {
            Value::Book(handle) => {
                let index = self.to_numeral(key)?;
                let length = self.book_ref(handle)?.len();
                let position = self.page_position(index, length)?;
                let pages = self.book_mut(handle)?;
                if position < pages.len() {
                    Ok(pages.remove(position))
                } else {
                    Ok(Value::Ni)
                }
            }
            Value::Codex(handle) => Ok(self.codex_remove(handle, key)?.unwrap_or_default()),
            _ => Err(self.throw_error("can only delete from books and codices")),
        }
    }
}

fn run_babel(executable: &str, args: &[String], input: String) -> io::Result<String> {
    let mut child = Command::new(executable)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Fed from its own thread so a child that fills its output pipe before
    // reading all of its input cannot deadlock us.
    let feeder = child
        .stdin
        .take()
        .map(|mut stdin| thread::spawn(move || stdin.write_all(input.as_bytes())));
    let output = child.wait_with_output()?;
    if let Some(feeder) = feeder {
        // A child may exit without reading its input; the broken pipe is not an error.
        let _ = feeder.join();
    }

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Assembler, Opcode};
    use crate::runtime::journey::Pattern;
    use crate::vm::tests::{SharedBuffer, vm};

    fn run(vm: &mut Vm, asm: Assembler) -> crate::error::Result<Value> {
        let block = asm.finish().unwrap();
        let journey = vm.define_journey("test", vec![Pattern::new(block)]).unwrap();
        vm.define_global("test", journey);
        vm.invoke(journey, Vec::new())
    }

    fn unary(vm: &mut Vm, interrupt: Interrupt, value: Value) -> crate::error::Result<Value> {
        let mut asm = Assembler::new();
        let a = asm.load(value);
        let dst = asm.local();
        asm.interrupt(interrupt, &[a, dst]);
        asm.ret(dst);
        run(vm, asm)
    }

    #[test]
    fn test_conversions() {
        let mut vm = vm();
        let text = unary(&mut vm, Interrupt::ToText, Value::Numeral(12)).unwrap();
        assert_eq!(vm.text_of(text).unwrap(), "12");
        let roman = unary(&mut vm, Interrupt::Roman, Value::Numeral(1994)).unwrap();
        assert_eq!(vm.text_of(roman).unwrap(), "MCMXCIV");
        let zero = unary(&mut vm, Interrupt::Roman, Value::Numeral(0)).unwrap();
        assert_eq!(vm.text_of(zero).unwrap(), "N");
        assert_eq!(
            unary(&mut vm, Interrupt::ToVeracity, Value::Numeral(0)).unwrap(),
            Value::NAY
        );
        let genus = unary(&mut vm, Interrupt::Kindof, Value::YEA).unwrap();
        assert_eq!(vm.text_of(genus).unwrap(), "Veracity");
    }

    #[test]
    fn test_ascii() {
        let mut vm = vm();
        let a = unary(&mut vm, Interrupt::Ascii, Value::Numeral(65)).unwrap();
        assert_eq!(vm.text_of(a).unwrap(), "A");

        let text = vm.new_text("a").unwrap();
        vm.define_global("a", text);
        assert_eq!(unary(&mut vm, Interrupt::Ascii, text).unwrap(), Value::Numeral(97));

        let err = unary(&mut vm, Interrupt::Ascii, Value::Ni).unwrap_err();
        assert!(matches!(err, Error::Uncaught(msg) if msg.contains("can only ascii numerals and text, not 'Ni'")));
    }

    #[test]
    fn test_print_and_dump() {
        let mut vm = vm();
        let out = SharedBuffer::default();
        vm.set_output(out.clone());

        unary(&mut vm, Interrupt::Print, Value::YEA).unwrap();
        let dumped = unary(&mut vm, Interrupt::Dump, Value::Numeral(3)).unwrap();
        assert_eq!(dumped, Value::Numeral(3));
        assert_eq!(out.contents(), "yeaNumeral(3)");
    }

    #[test]
    fn test_prompt_strips_line_endings() {
        let mut vm = vm();
        vm.set_input(&b"first\r\nsecond"[..]);

        for expected in ["first", "second", ""] {
            let mut asm = Assembler::new();
            let dst = asm.local();
            asm.interrupt(Interrupt::Prompt, &[dst]);
            asm.ret(dst);
            let line = run(&mut vm, asm).unwrap();
            assert_eq!(vm.text_of(line).unwrap(), expected);
        }
    }

    #[test]
    fn test_exit_is_fatal() {
        let mut vm = vm();
        let mut asm = Assembler::new();
        let handler = asm.label();
        let err = asm.local();
        asm.try_catch(handler, err);
        let code = asm.load(Value::Numeral(3));
        asm.interrupt(Interrupt::Exit, &[code]);
        asm.bind(handler);
        asm.ret(err);

        assert!(matches!(run(&mut vm, asm), Err(Error::Exit(3))));
    }

    #[test]
    fn test_substr_is_one_based() {
        let mut vm = vm();
        let text = vm.new_text("squire").unwrap();
        vm.define_global("text", text);

        let mut asm = Assembler::new();
        let a = asm.load(text);
        let start = asm.load(Value::Numeral(2));
        let count = asm.load(Value::Numeral(3));
        let dst = asm.local();
        asm.interrupt(Interrupt::Substr, &[a, start, count, dst]);
        asm.ret(dst);

        let result = run(&mut vm, asm).unwrap();
        assert_eq!(vm.text_of(result).unwrap(), "qui");
    }

    #[test]
    fn test_book_insert_and_delete() {
        let mut vm = vm();
        let book = vm
            .new_book(vec![Value::Numeral(1), Value::Numeral(3)])
            .unwrap();
        vm.define_global("book", book);

        let mut asm = Assembler::new();
        let b = asm.load(book);
        let two = asm.load(Value::Numeral(2));
        let dst = asm.local();
        asm.interrupt(Interrupt::ArrayInsert, &[b, two, two, dst]);
        let one = asm.load(Value::Numeral(1));
        let removed = asm.local();
        asm.interrupt(Interrupt::ArrayDelete, &[b, one, removed]);
        asm.ret(removed);

        assert_eq!(run(&mut vm, asm).unwrap(), Value::Numeral(1));
        assert_eq!(
            vm.book_pages(book).unwrap(),
            vec![Value::Numeral(2), Value::Numeral(3)]
        );
    }

    #[test]
    fn test_book_insert_far_past_the_end_throws() {
        let mut vm = vm();
        let book = vm.new_book(Vec::new()).unwrap();
        vm.define_global("book", book);

        let mut asm = Assembler::new();
        let err = asm.local();
        let caught = asm.label();
        asm.try_catch(caught, err);
        let b = asm.load(book);
        let far = asm.load(Value::Numeral(1 << 62));
        let dst = asm.local();
        asm.interrupt(Interrupt::ArrayInsert, &[b, far, far, dst]);
        asm.ret(dst);
        asm.bind(caught);
        asm.ret(err);

        let exception = run(&mut vm, asm).unwrap();
        let message = vm.exception_message(exception).unwrap();
        assert!(message.starts_with("cannot grow a book"));
        assert!(vm.book_pages(book).unwrap().is_empty());
    }

    #[test]
    fn test_codex_new_and_delete() {
        let mut vm = vm();
        let mut asm = Assembler::new();
        let k = asm.load(Value::Numeral(1));
        let v = asm.load(Value::YEA);
        let codex = asm.local();
        asm.interrupt(Interrupt::CodexNew, &[1, k, v, codex]);
        let removed = asm.local();
        asm.interrupt(Interrupt::ArrayDelete, &[codex, k, removed]);
        let length = asm.local();
        asm.interrupt(Interrupt::Length, &[codex, length]);
        let both = asm.local();
        asm.interrupt(Interrupt::BookNew, &[2, removed, length, both]);
        asm.ret(both);

        let result = run(&mut vm, asm).unwrap();
        assert_eq!(
            vm.book_pages(result).unwrap(),
            vec![Value::YEA, Value::Numeral(0)]
        );
    }

    #[test]
    fn test_system_captures_stdout() {
        let mut vm = vm();
        let command = vm.new_text("echo hi").unwrap();
        vm.define_global("command", command);
        let result = unary(&mut vm, Interrupt::System, command).unwrap();
        assert_eq!(vm.text_of(result).unwrap(), "hi\n");
    }

    fn global_text(vm: &mut Vm, text: &str) -> Value {
        let value = vm.new_text(text).unwrap();
        vm.define_global(text, value);
        value
    }

    #[test]
    fn test_babel_feeds_stdin_and_captures_output() {
        let mut vm = vm();
        let cat = global_text(&mut vm, "cat");
        let input = global_text(&mut vm, "fed through stdin");

        let mut asm = Assembler::new();
        let exec = asm.load(cat);
        let stdin = asm.load(input);
        let dst = asm.local();
        asm.interrupt(Interrupt::Babel, &[exec, stdin, 0, dst]);
        asm.ret(dst);

        let output = run(&mut vm, asm).unwrap();
        assert_eq!(vm.text_of(output).unwrap(), "fed through stdin");
    }

    #[test]
    fn test_babel_passes_arguments() {
        let mut vm = vm();
        let echo = global_text(&mut vm, "echo");
        let word = global_text(&mut vm, "squire");

        let mut asm = Assembler::new();
        let exec = asm.load(echo);
        let stdin = asm.load(Value::Ni);
        let first = asm.load(word);
        let second = asm.load(Value::Numeral(2));
        let dst = asm.local();
        asm.interrupt(Interrupt::Babel, &[exec, stdin, 2, first, second, dst]);
        asm.ret(dst);

        let output = run(&mut vm, asm).unwrap();
        assert_eq!(vm.text_of(output).unwrap(), "squire 2\n");
    }

    #[test]
    fn test_babel_missing_executable_is_an_io_error() {
        let mut vm = vm();
        let missing = global_text(&mut vm, "/nonexistent/squire-babel");

        let mut asm = Assembler::new();
        let err = asm.local();
        let caught = asm.label();
        asm.try_catch(caught, err);
        let exec = asm.load(missing);
        let dst = asm.local();
        asm.interrupt(Interrupt::Babel, &[exec, exec, 0, dst]);
        asm.ret(dst);
        asm.bind(caught);
        asm.ret(err);

        let exception = run(&mut vm, asm).unwrap();
        let io_error = vm.io_error_form();
        assert!(vm.matches(io_error, exception).unwrap());
        let message = vm.exception_message(exception).unwrap();
        assert!(message.contains("cannot run '/nonexistent/squire-babel'"));
    }

    #[test]
    fn test_fopen_returns_a_scroll() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("opened.txt");

        let mut vm = vm();
        let filename = global_text(&mut vm, path.to_str().unwrap());
        let mode = global_text(&mut vm, "w");

        let mut asm = Assembler::new();
        let a = asm.load(filename);
        let b = asm.load(mode);
        let dst = asm.local();
        asm.interrupt(Interrupt::Fopen, &[a, b, dst]);
        let genus = asm.local();
        asm.interrupt(Interrupt::Kindof, &[dst, genus]);
        asm.ret(genus);

        let genus = run(&mut vm, asm).unwrap();
        assert_eq!(vm.text_of(genus).unwrap(), "Scroll");
        assert!(path.exists());
    }

    #[test]
    fn test_unknown_interrupt_is_fatal() {
        let mut vm = vm();
        let mut asm = Assembler::new();
        asm.op(Opcode::Int, &[0x7fff]);
        assert!(matches!(
            run(&mut vm, asm),
            Err(Error::UnknownInterrupt { interrupt: 0x7fff, ip: 1 })
        ));
    }
}
