//! The Squire virtual machine.
//!
//! [`Vm`] is the single runtime context. It owns the heap, the program
//! root, the frame stack, the exception handler stack and the I/O streams;
//! nothing lives in process-wide statics.
//!
//! ## Structure
//!
//! - `interpreter` - the instruction loop
//! - `dispatch` - calls, pattern binding and construction of imitations
//! - `attributes` - `get_attr`, `set_attr` and `matches`
//! - `operators` - equality, comparison, arithmetic and indexing
//! - `convert` - conversions and the debug form
//! - `interrupt` - the `INT` sub-instructions
//! - `scroll` - attributes and host journeys of open files
//!
//! ## Rooting
//!
//! Collection can run inside any allocation. Everything reachable from the
//! program globals, the live frames, the current exception and the pinned
//! stack survives. Values an embedder creates and has not yet stored
//! anywhere reachable are only safe until the next allocation.

mod attributes;
mod convert;
mod dispatch;
mod interpreter;
mod interrupt;
mod operators;
mod scroll;

use std::io::{self, BufRead, BufReader, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::bytecode::disasm;
use crate::config::VmConfig;
use crate::error::{Error, Result};
use crate::gc::{Codex, GcRef, Heap, HeapObject, HeapStats, SweepStats, Traceable, Tracer};
use crate::runtime::{
    Args, Form, HandlerStack, Imitation, Journey, Matter, NativeFn, NativeJourney, Other, Parameter,
    Pattern, Program, RunResult, StackFrame, Unwind,
};
use crate::runtime::value::{Genus, Value};

/// Smallest heap that fits the objects the runtime allocates for itself.
pub const MIN_HEAP_SLOTS: usize = 4;

const HEAP_EXHAUSTED: &str = "heap exhausted";

/// Objects the runtime needs before any program code runs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Builtins {
    pub(crate) exception: GcRef,
    pub(crate) io_error: GcRef,
    pub(crate) heap_exhausted: GcRef,
}

impl Builtins {
    fn allocate(heap: &mut Heap) -> Result<Self> {
        let mut rooted = Vec::new();

        let exception = place(
            heap,
            &mut rooted,
            HeapObject::Form(Form::new("Exception").with_matter(Matter::new("msg"))),
        )?;
        let io_error = place(
            heap,
            &mut rooted,
            HeapObject::Form(
                Form::new("IoError")
                    .with_matter(Matter::new("msg"))
                    .with_parent(exception),
            ),
        )?;
        let message = place(heap, &mut rooted, HeapObject::Text(HEAP_EXHAUSTED.into()))?;
        let heap_exhausted = place(
            heap,
            &mut rooted,
            HeapObject::Imitation(Imitation {
                form: exception,
                matter: vec![Value::Text(message)],
            }),
        )?;

        Ok(Self {
            exception,
            io_error,
            heap_exhausted,
        })
    }
}

fn place(heap: &mut Heap, rooted: &mut Vec<Value>, object: HeapObject) -> Result<GcRef> {
    let genus = object.genus();
    let handle = heap
        .allocate(object, &*rooted)
        .map_err(|_| Error::HeapTooSmall(heap.stats().capacity))?;
    rooted.extend(Value::from_ref(genus, handle));
    Ok(handle)
}

impl Traceable for Builtins {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.mark_ref(self.exception);
        tracer.mark_ref(self.io_error);
        tracer.mark_ref(self.heap_exhausted);
    }
}

/// Every root the collector starts from, borrowed alongside the heap.
struct RootSet<'a> {
    program: &'a Program,
    frames: &'a [StackFrame],
    handlers: &'a HandlerStack,
    pinned: &'a [Value],
    builtins: &'a Builtins,
}

impl Traceable for RootSet<'_> {
    fn trace(&self, tracer: &mut Tracer) {
        self.program.trace(tracer);
        self.frames.trace(tracer);
        self.handlers.trace(tracer);
        tracer.mark_all(self.pinned);
        self.builtins.trace(tracer);
    }
}

/// xorshift64* generator behind the `RANDOM` interrupt.
#[derive(Debug, Clone)]
struct Xorshift(u64);

impl Xorshift {
    const MULTIPLIER: u64 = 0x2545_F491_4F6C_DD1D;

    fn seeded(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_nanos() as u64)
                .unwrap_or(Self::MULTIPLIER)
        });
        Self(if seed == 0 { Self::MULTIPLIER } else { seed })
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(Self::MULTIPLIER)
    }
}

macro_rules! heap_accessors {
    ($( $get:ident $(, $get_mut:ident)? => $variant:ident($ty:ty); )+) => {
        $(
            #[allow(dead_code)]
            pub(crate) fn $get(&self, handle: GcRef) -> Result<&$ty> {
                match self.heap.get(handle) {
                    Some(HeapObject::$variant(inner)) => Ok(inner),
                    Some(other) => Err(Error::WrongGenus {
                        expected: Genus::$variant,
                        found: other.genus(),
                    }),
                    None => Err(Error::DanglingReference(handle.raw())),
                }
            }

            $(
                #[allow(dead_code)]
                pub(crate) fn $get_mut(&mut self, handle: GcRef) -> Result<&mut $ty> {
                    match self.heap.get_mut(handle) {
                        Some(HeapObject::$variant(inner)) => Ok(inner),
                        Some(other) => Err(Error::WrongGenus {
                            expected: Genus::$variant,
                            found: other.genus(),
                        }),
                        None => Err(Error::DanglingReference(handle.raw())),
                    }
                }
            )?
        )+
    };
}

/// A Squire runtime.
pub struct Vm {
    pub(crate) heap: Heap,
    pub(crate) program: Program,
    pub(crate) frames: Vec<StackFrame>,
    pub(crate) handlers: HandlerStack,
    pub(crate) pinned: Vec<Value>,
    pub(crate) builtins: Builtins,
    pub(crate) config: VmConfig,
    output: Box<dyn Write>,
    input: Box<dyn BufRead>,
    rng: Xorshift,
}

impl Vm {
    /// Creates a runtime with an empty program.
    pub fn new(config: VmConfig) -> Result<Self> {
        if config.heap_capacity < MIN_HEAP_SLOTS {
            return Err(Error::HeapTooSmall(config.heap_capacity));
        }

        let mut heap = Heap::new(config.heap_capacity);
        let builtins = Builtins::allocate(&mut heap)?;
        debug!(
            heap_capacity = config.heap_capacity,
            max_frames = config.max_frames,
            "runtime initialised"
        );

        Ok(Self {
            heap,
            program: Program::new(),
            frames: Vec::new(),
            handlers: HandlerStack::new(config.max_handlers),
            pinned: Vec::new(),
            builtins,
            rng: Xorshift::seeded(config.random_seed),
            config,
            output: Box::new(io::stdout()),
            input: Box::new(BufReader::new(io::stdin())),
        })
    }

    /// The configuration this runtime was created with.
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Redirects `PRINT`, `PRINTLN` and `DUMP`.
    pub fn set_output(&mut self, output: impl Write + 'static) {
        self.output = Box::new(output);
    }

    /// Redirects `PROMPT`.
    pub fn set_input(&mut self, input: impl BufRead + 'static) {
        self.input = Box::new(input);
    }

    // ==================== Heap ====================

    pub(crate) fn allocate(&mut self, object: HeapObject) -> RunResult<GcRef> {
        let roots = RootSet {
            program: &self.program,
            frames: &self.frames,
            handlers: &self.handlers,
            pinned: &self.pinned,
            builtins: &self.builtins,
        };

        match self.heap.allocate(object, &roots) {
            Ok(handle) => Ok(handle),
            Err(object) => {
                warn!(genus = %object.genus(), "heap exhausted after collection");
                Err(self.throw(Value::Imitation(self.builtins.heap_exhausted)))
            }
        }
    }

    /// Runs a full collection now.
    pub fn collect(&mut self) -> SweepStats {
        let roots = RootSet {
            program: &self.program,
            frames: &self.frames,
            handlers: &self.handlers,
            pinned: &self.pinned,
            builtins: &self.builtins,
        };
        self.heap.collect(&roots)
    }

    /// Heap occupancy and collector totals.
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Whether `value` still refers to a live object. Scalars always are.
    pub fn is_live(&self, value: Value) -> bool {
        value.heap_ref().is_none_or(|handle| self.heap.is_live(handle))
    }

    /// Releases every heap object and returns the final totals.
    pub fn teardown(mut self) -> HeapStats {
        self.frames.clear();
        self.pinned.clear();
        self.heap.teardown();
        self.heap.stats()
    }

    /// Runs `f` with `values` kept alive across any collection it triggers.
    pub(crate) fn with_pinned<T>(&mut self, values: &[Value], f: impl FnOnce(&mut Self) -> T) -> T {
        let mark = self.pinned.len();
        self.pinned.extend_from_slice(values);
        let result = f(self);
        self.pinned.truncate(mark);
        result
    }

    heap_accessors! {
        text_ref => Text(String);
        book_ref, book_mut => Book(Vec<Value>);
        codex_ref, codex_mut => Codex(Codex);
        form_ref, form_mut => Form(Form);
        imitation_ref, imitation_mut => Imitation(Imitation);
        journey_ref, journey_mut => Journey(Journey);
        other_ref, other_mut => Other(Other);
    }

    // ==================== Constructors ====================

    /// Allocates a text.
    pub fn new_text(&mut self, text: impl Into<String>) -> RunResult<Value> {
        self.allocate(HeapObject::Text(text.into())).map(Value::Text)
    }

    /// Allocates a book.
    pub fn new_book(&mut self, pages: Vec<Value>) -> RunResult<Value> {
        self.allocate(HeapObject::Book(pages)).map(Value::Book)
    }

    /// Allocates a codex. Later duplicates of a key replace earlier ones.
    pub fn new_codex(
        &mut self,
        pairs: Vec<(Value, Value)>,
    ) -> RunResult<Value> {
        let codex = self.with_pinned(&flatten(&pairs), |vm| {
            vm.allocate(HeapObject::Codex(Codex::default()))
        })?;
        let value = Value::Codex(codex);
        self.with_pinned(&[value], |vm| {
            for (key, page) in pairs {
                vm.codex_insert(codex, key, page)?;
            }
            Ok(value)
        })
    }

    /// Allocates a journey.
    pub fn define_journey(
        &mut self,
        name: impl Into<String>,
        patterns: Vec<Pattern>,
    ) -> RunResult<Value> {
        self.allocate(HeapObject::Journey(Journey::new(name, patterns)))
            .map(Value::Journey)
    }

    /// Allocates a form.
    pub fn define_form(&mut self, form: Form) -> RunResult<Value> {
        self.allocate(HeapObject::Form(form)).map(Value::Form)
    }

    /// Allocates a host journey. `arity` of `None` accepts any count.
    pub fn define_native(
        &mut self,
        name: impl Into<String>,
        arity: Option<usize>,
        func: NativeFn,
    ) -> RunResult<Value> {
        let native = NativeJourney {
            name: name.into(),
            arity,
            func,
        };
        self.allocate(HeapObject::Other(Other::Native(native)))
            .map(Value::Other)
    }

    /// Copies the contents of a text.
    pub fn text_of(&self, value: Value) -> Result<String> {
        let handle = value.expect_ref(Genus::Text)?;
        self.text_ref(handle).cloned()
    }

    /// Copies the pages of a book.
    pub fn book_pages(&self, value: Value) -> Result<Vec<Value>> {
        let handle = value.expect_ref(Genus::Book)?;
        self.book_ref(handle).cloned()
    }

    /// The built-in `Exception` form.
    pub fn exception_form(&self) -> Value {
        Value::Form(self.builtins.exception)
    }

    /// The built-in `IoError` form.
    pub fn io_error_form(&self) -> Value {
        Value::Form(self.builtins.io_error)
    }

    /// The message of an `Exception` (or descendant) imitation.
    pub fn exception_message(&self, value: Value) -> Option<String> {
        let Value::Imitation(handle) = value else {
            return None;
        };
        let imitation = self.imitation_ref(handle).ok()?;
        if !self.is_descendant(imitation.form, self.builtins.exception).ok()? {
            return None;
        }
        let message = *imitation.matter.first()?;
        self.text_of(message).ok()
    }

    /// Lists every pattern of a journey with its instructions.
    pub fn disassemble(&self, journey: Value) -> Result<String> {
        let journey = self.journey_ref(journey.expect_ref(Genus::Journey)?)?;
        let describe = |value: Value| self.dump(value).unwrap_or_else(|err| format!("<{err}>"));

        let mut out = format!("journey {} ({} patterns)\n", journey.name, journey.patterns.len());
        for (i, pattern) in journey.patterns.iter().enumerate() {
            out.push_str(&format!("pattern {i}: {}\n", signature(pattern)));
            out.push_str(&disasm::disassemble(&pattern.codeblock, &describe)?);
        }
        Ok(out)
    }

    // ==================== Program root ====================

    /// Adds a global slot and returns its index.
    pub fn define_global(&mut self, name: impl Into<String>, value: Value) -> usize {
        self.program.define_global(name, value)
    }

    /// Reads a global slot.
    pub fn global(&self, index: usize) -> Option<Value> {
        self.program.globals.get(index).copied()
    }

    /// Reads a global slot by name.
    pub fn global_named(&self, name: &str) -> Option<Value> {
        self.program
            .global_index(name)
            .and_then(|index| self.global(index))
    }

    /// Overwrites a global slot.
    pub fn set_global(&mut self, index: usize, value: Value) -> Result<()> {
        let slot = self
            .program
            .globals
            .get_mut(index)
            .ok_or_else(|| Error::malformed(format!("global {index} out of range")))?;
        *slot = value;
        Ok(())
    }

    /// Registers the entry journey.
    pub fn set_main(&mut self, journey: Value) -> Result<()> {
        self.program.main = Some(journey.expect_ref(Genus::Journey)?);
        Ok(())
    }

    /// Marks a global slot as the one receiving the command-line arguments.
    pub fn set_argv_global(&mut self, index: usize) -> Result<()> {
        if index >= self.program.globals.len() {
            return Err(Error::malformed(format!("global {index} out of range")));
        }
        self.program.argv_global = Some(index);
        Ok(())
    }

    // ==================== Running ====================

    /// Calls a value from the host, turning an uncaught throw into
    /// [`Error::Uncaught`].
    pub fn invoke(&mut self, callee: Value, args: impl Into<Args>) -> Result<Value> {
        let result = self.call_value(callee, args.into());
        self.settle(result)
    }

    /// Runs the entry journey with no arguments.
    ///
    /// `argv` is stored as a book of texts in the argv global, if the
    /// program declared one.
    pub fn run_main(&mut self, argv: &[String]) -> Result<Value> {
        let main = self.program.main.ok_or(Error::MissingEntry)?;

        if let Some(index) = self.program.argv_global {
            let result = self.argv_book(argv);
            let book = self.settle(result)?;
            self.set_global(index, book)?;
        }

        debug!(arguments = argv.len(), "running entry journey");
        let result = self.call_value(Value::Journey(main), Args::default());
        self.settle(result)
    }

    fn argv_book(&mut self, argv: &[String]) -> RunResult<Value> {
        let book = self.new_book(Vec::with_capacity(argv.len()))?;
        self.with_pinned(&[book], |vm| {
            for arg in argv {
                let text = vm.new_text(arg.as_str())?;
                vm.book_mut(book.expect_ref(Genus::Book)?)?.push(text);
            }
            Ok(book)
        })
    }

    pub(crate) fn settle(&mut self, result: RunResult<Value>) -> Result<Value> {
        match result {
            Ok(value) => Ok(value),
            Err(Unwind::Thrown) => {
                let exception = self.handlers.take_exception();
                let dump = self
                    .dump(exception)
                    .unwrap_or_else(|err| format!("<{err}>"));
                debug!(exception = %dump, "uncaught exception");
                Err(Error::Uncaught(dump))
            }
            Err(Unwind::Fatal(err)) => Err(err),
        }
    }

    // ==================== Exceptions ====================

    /// Stores `value` as the current exception.
    pub fn throw(&mut self, value: Value) -> Unwind {
        self.handlers.throw(value);
        Unwind::Thrown
    }

    /// Throws an `Exception` carrying `message`.
    pub fn throw_error(&mut self, message: impl Into<String>) -> Unwind {
        self.throw_with(self.builtins.exception, message.into())
    }

    /// Throws an `IoError` describing `err`.
    pub fn throw_io(&mut self, context: &str, err: &io::Error) -> Unwind {
        let message = format!("io error: {context}: {err}");
        self.throw_with(self.builtins.io_error, message)
    }

    fn throw_with(&mut self, form: GcRef, message: String) -> Unwind {
        let text = match self.allocate(HeapObject::Text(message)) {
            Ok(text) => text,
            Err(unwind) => return unwind,
        };
        let imitation = Imitation {
            form,
            matter: vec![Value::Text(text)],
        };
        match self.allocate(HeapObject::Imitation(imitation)) {
            Ok(handle) => self.throw(Value::Imitation(handle)),
            Err(unwind) => unwind,
        }
    }

    /// The value most recently thrown and not yet caught.
    pub fn exception(&self) -> Value {
        self.handlers.exception()
    }

    /// Number of installed exception handlers.
    pub fn handler_depth(&self) -> usize {
        self.handlers.depth()
    }

    /// Number of live frames.
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Name used for `value` in messages: the form name of an imitation,
    /// the genus name otherwise.
    pub fn typename(&self, value: Value) -> Result<String> {
        match value {
            Value::Imitation(handle) => {
                let form = self.imitation_ref(handle)?.form;
                Ok(self.form_ref(form)?.name.clone())
            }
            Value::Other(handle) if self.is_scroll(handle) => Ok("Scroll".to_string()),
            other => Ok(other.genus().name().to_string()),
        }
    }

    pub(crate) fn random(&mut self) -> i64 {
        (self.rng.next() >> 1) as i64
    }

    pub(crate) fn write_output(&mut self, text: &str, newline: bool) -> io::Result<()> {
        self.output.write_all(text.as_bytes())?;
        if newline {
            self.output.write_all(b"\n")?;
        }
        self.output.flush()
    }

    pub(crate) fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(line)
    }
}

/// Parameter list of a pattern, e.g. `(a, b=@4, *, c:, **) if @12 start @0`.
fn signature(pattern: &Pattern) -> String {
    let parameter = |p: &Parameter| {
        let mut text = p.name.clone();
        if let Some(guard) = p.guard {
            text.push_str(&format!(": @{guard}"));
        }
        if let Some(default) = p.default {
            text.push_str(&format!("=@{default}"));
        }
        text
    };

    let mut parts: Vec<String> = pattern.positional.iter().map(parameter).collect();
    if pattern.splat {
        parts.push("*".to_string());
    }
    parts.extend(pattern.keywords.iter().map(|p| format!("{}:", parameter(p))));
    if pattern.splatsplat {
        parts.push("**".to_string());
    }

    let mut text = format!("({})", parts.join(", "));
    if let Some(condition) = pattern.condition {
        text.push_str(&format!(" if @{condition}"));
    }
    text.push_str(&format!(" start @{}", pattern.start));
    text
}

fn flatten(pairs: &[(Value, Value)]) -> Vec<Value> {
    pairs.iter().flat_map(|&(key, value)| [key, value]).collect()
}
