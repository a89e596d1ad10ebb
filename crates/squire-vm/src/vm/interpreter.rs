//! The instruction loop.
//!
//! Each journey invocation owns one [`StackFrame`](crate::runtime::StackFrame)
//! at a fixed depth of `Vm::frames`. [`Vm::run_frame`] steps that frame
//! until it returns, resuming at a handler of the same depth when a throw
//! reaches it.

use tracing::trace;

use super::Vm;
use crate::bytecode::{MAX_ARITY, Opcode};
use crate::error::Error;
use crate::gc::HeapObject;
use crate::runtime::journey::Args;
use crate::runtime::native::Other;
use crate::runtime::value::{Genus, Value};
use crate::runtime::{Handler, RunResult, StackFrame, Unwind};

/// What a single instruction asks the loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Return(Value),
}

impl Vm {
    pub(crate) fn frame_mut(&mut self, depth: usize) -> crate::error::Result<&mut StackFrame> {
        self.frames
            .get_mut(depth)
            .ok_or_else(|| Error::malformed(format!("no frame at depth {depth}")))
    }

    /// Runs the frame at `depth` until it returns.
    pub(crate) fn run_frame(&mut self, depth: usize) -> RunResult<Value> {
        loop {
            match self.step(depth) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Return(value)) => return Ok(value),
                Err(Unwind::Thrown) => {
                    let Some(handler) = self.handlers.catch_in(depth) else {
                        return Err(Unwind::Thrown);
                    };
                    let exception = self.handlers.take_exception();
                    trace!(depth, resume = handler.resume, "exception caught");
                    let frame = self.frame_mut(depth)?;
                    frame.set_local(handler.register, exception)?;
                    frame.jump(handler.resume)?;
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }

    /// Runs the frame at `depth` from `start` until it returns.
    pub(crate) fn evaluate(&mut self, depth: usize, start: usize) -> RunResult<Value> {
        self.frame_mut(depth)?.jump(start)?;
        self.run_frame(depth)
    }

    fn step(&mut self, depth: usize) -> RunResult<Flow> {
        let frame = self.frame_mut(depth)?;
        if frame.at_end() {
            return Ok(Flow::Return(Value::Ni));
        }

        let ip = frame.ip;
        let word = frame.next_word()?;
        let opcode = Opcode::decode(word).ok_or(Error::UnknownOpcode { opcode: word, ip })?;

        let mut operands = [Value::Ni; MAX_ARITY];
        for operand in operands.iter_mut().take(opcode.arity()) {
            *operand = frame.next_local()?;
        }
        trace!(depth, ip, op = opcode.mnemonic(), "step");

        self.execute(depth, opcode, operands)
    }

    fn store(&mut self, depth: usize, value: Value) -> RunResult<()> {
        self.frame_mut(depth)?.set_next_local(value)?;
        Ok(())
    }

    fn execute(&mut self, depth: usize, opcode: Opcode, operands: [Value; MAX_ARITY]) -> RunResult<Flow> {
        let [a, b, c] = operands;

        match opcode {
            Opcode::Noop => {}
            Opcode::Mov => self.store(depth, a)?,
            Opcode::Int => self.interrupt(depth)?,

            Opcode::Jmp => {
                let frame = self.frame_mut(depth)?;
                let target = frame.next_index()?;
                frame.jump(target)?;
            }
            Opcode::JmpTrue | Opcode::JmpFalse => {
                let target = self.frame_mut(depth)?.next_index()?;
                if self.to_veracity(a)? == (opcode == Opcode::JmpTrue) {
                    self.frame_mut(depth)?.jump(target)?;
                }
            }

            Opcode::Call => {
                let args = self.read_args(depth)?;
                let result = self.call_value(a, args)?;
                self.store(depth, result)?;
            }
            Opcode::CallKw => {
                let mut args = self.read_args(depth)?;
                let count = self.frame_mut(depth)?.next_index()?;
                for _ in 0..count {
                    let frame = self.frame_mut(depth)?;
                    let name = frame.next_constant()?;
                    let value = frame.next_local()?;
                    args.keywords.push((self.text_of(name)?, value));
                }
                let result = self.call_value(a, args)?;
                self.store(depth, result)?;
            }
            Opcode::Return => return Ok(Flow::Return(a)),

            Opcode::TryCatch => {
                let frame = self.frame_mut(depth)?;
                let resume = frame.next_index()?;
                let register = frame.next_index()?;
                let handler = Handler {
                    frame: depth,
                    resume,
                    register,
                };
                if !self.handlers.push(handler) {
                    return Err(self.throw_error("too many exception handlers"));
                }
            }
            Opcode::Throw => return Err(self.throw(a)),
            Opcode::PopTryCatch => {
                self.handlers
                    .pop()
                    .ok_or_else(|| Error::malformed("no exception handler to pop"))?;
            }

            Opcode::Not => {
                let result = self.not(a)?;
                self.store(depth, result)?;
            }
            Opcode::Neg => {
                let result = self.neg(a)?;
                self.store(depth, result)?;
            }

            Opcode::Eql => {
                let result = self.eql(a, b)?;
                self.store(depth, Value::from(result))?;
            }
            Opcode::Neq => {
                let result = self.eql(a, b)?;
                self.store(depth, Value::from(!result))?;
            }
            Opcode::Lth | Opcode::Gth | Opcode::Leq | Opcode::Geq => {
                let ordering = self.cmp(a, b)?;
                let result = match opcode {
                    Opcode::Lth => ordering < 0,
                    Opcode::Gth => ordering > 0,
                    Opcode::Leq => ordering <= 0,
                    _ => ordering >= 0,
                };
                self.store(depth, Value::from(result))?;
            }
            Opcode::Cmp => {
                let ordering = self.cmp(a, b)?;
                self.store(depth, Value::Numeral(ordering.signum()))?;
            }

            Opcode::Add => {
                let result = self.add(a, b)?;
                self.store(depth, result)?;
            }
            Opcode::Sub => {
                let result = self.sub(a, b)?;
                self.store(depth, result)?;
            }
            Opcode::Mul => {
                let result = self.mul(a, b)?;
                self.store(depth, result)?;
            }
            Opcode::Div => {
                let result = self.div(a, b)?;
                self.store(depth, result)?;
            }
            Opcode::Mod => {
                let result = self.rem(a, b)?;
                self.store(depth, result)?;
            }
            Opcode::Pow => {
                let result = self.pow(a, b)?;
                self.store(depth, result)?;
            }
            Opcode::Index => {
                let result = self.index(a, b)?;
                self.store(depth, result)?;
            }
            Opcode::IndexAssign => self.index_assign(a, b, c)?,

            Opcode::Matches => {
                let result = self.matches(a, b)?;
                self.store(depth, Value::from(result))?;
            }
            Opcode::PatAnd | Opcode::PatOr | Opcode::PatNot => {
                let helper = match opcode {
                    Opcode::PatAnd => Other::And(a, b),
                    Opcode::PatOr => Other::Or(a, b),
                    _ => Other::Not(a),
                };
                let handle = self.allocate(HeapObject::Other(helper))?;
                self.store(depth, Value::Other(handle))?;
            }

            Opcode::CLoad => {
                let value = self.frame_mut(depth)?.next_constant()?;
                self.store(depth, value)?;
            }
            Opcode::GLoad => {
                let index = self.frame_mut(depth)?.next_index()?;
                let value = self
                    .global(index)
                    .ok_or_else(|| Error::malformed(format!("global {index} out of range")))?;
                self.store(depth, value)?;
            }
            Opcode::GStore => {
                let index = self.frame_mut(depth)?.next_index()?;
                self.set_global(index, a)?;
            }

            Opcode::ILoad => {
                let name = self.frame_mut(depth)?.next_constant()?;
                let name = self.text_of(name)?;
                match self.get_attr(a, &name)? {
                    Some(value) => self.store(depth, value)?,
                    None => {
                        let genus = self.typename(a)?;
                        return Err(self.throw_error(format!(
                            "unknown attribute '{name}' for genus '{genus}'"
                        )));
                    }
                }
            }
            Opcode::IStore => {
                let name = self.frame_mut(depth)?.next_constant()?;
                let name = self.text_of(name)?;
                if !self.set_attr(a, &name, b)? {
                    let genus = self.typename(a)?;
                    return Err(self.throw_error(format!(
                        "cannot assign attribute '{name}' for a type of genus '{genus}'"
                    )));
                }
            }

            Opcode::FeGenusStore | Opcode::FmGenusStore => {
                let index = self.frame_mut(depth)?.next_index()?;
                let form = self.form_mut(a.expect_ref(Genus::Form)?)?;
                let slot = if opcode == Opcode::FeGenusStore {
                    form.essences.get_mut(index).map(|essence| &mut essence.genus)
                } else {
                    form.matter.get_mut(index).map(|matter| &mut matter.genus)
                };
                let slot = slot
                    .ok_or_else(|| Error::malformed(format!("field {index} out of range")))?;
                *slot = Some(b);
            }
        }

        Ok(Flow::Continue)
    }

    /// Reads `[N, ARG*N]` from the instruction stream.
    fn read_args(&mut self, depth: usize) -> RunResult<Args> {
        let frame = self.frame_mut(depth)?;
        let count = frame.next_index()?;
        let positional = (0..count)
            .map(|_| frame.next_local())
            .collect::<crate::error::Result<Vec<_>>>()?;
        Ok(Args::new(positional))
    }
}
