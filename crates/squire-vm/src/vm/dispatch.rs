//! Calls: journey dispatch, pattern binding, host journeys and the
//! construction of imitations.
//!
//! A journey call pushes one frame per pattern attempt. Binding fills the
//! frame's registers, running default and guard sub-expressions inside that
//! same frame, and the first pattern that binds runs its body. The frame
//! and any handlers it installed are dropped whatever the outcome.

use std::rc::Rc;

use tracing::trace;

use super::Vm;
use crate::gc::{Codex, GcRef, HeapObject};
use crate::runtime::form::Imitation;
use crate::runtime::journey::{Args, Pattern};
use crate::runtime::native::{NativeJourney, Other};
use crate::runtime::value::Value;
use crate::runtime::{RunResult, StackFrame};

/// Outcome of binding a call's arguments against one pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Bound,
    Mismatch,
}

impl Vm {
    /// Calls `callee`. Returns `None` when values of its genus cannot be
    /// called.
    pub fn call(&mut self, callee: Value, args: Args) -> RunResult<Option<Value>> {
        let mut rooted = Vec::with_capacity(args.positional.len() + args.keywords.len() + 1);
        rooted.push(callee);
        rooted.extend_from_slice(&args.positional);
        rooted.extend(args.keywords.iter().map(|&(_, value)| value));

        self.with_pinned(&rooted, |vm| match callee {
            Value::Journey(journey) => vm.call_journey(journey, &args).map(Some),
            Value::Form(form) => vm.imitate(form, args).map(Some),
            Value::Other(handle) => match vm.other_ref(handle)? {
                Other::Native(native) => {
                    let native = native.clone();
                    vm.call_native(&native, &args).map(Some)
                }
                _ => Ok(None),
            },
            _ => Ok(None),
        })
    }

    /// Calls `callee`, throwing `cannot call` when it is not callable.
    pub fn call_value(&mut self, callee: Value, args: Args) -> RunResult<Value> {
        match self.call(callee, args)? {
            Some(value) => Ok(value),
            None => {
                let name = self.typename(callee)?;
                Err(self.throw_error(format!("cannot call '{name}'")))
            }
        }
    }

    pub(crate) fn call_journey(&mut self, journey: GcRef, args: &Args) -> RunResult<Value> {
        let (name, patterns) = {
            let journey = self.journey_ref(journey)?;
            (journey.name.clone(), journey.patterns.clone())
        };

        if self.frames.len() >= self.config.max_frames {
            return Err(self.throw_error("too many stackframes"));
        }

        for (index, pattern) in patterns.into_iter().enumerate() {
            let depth = self.frames.len();
            self.frames.push(StackFrame::new(journey, Rc::clone(&pattern)));

            let result = self.bind_and_run(depth, &pattern, args);
            self.handlers.discard_frame(depth);
            self.frames.truncate(depth);

            match result? {
                Some(value) => return Ok(value),
                None => trace!(journey = %name, pattern = index, "pattern did not bind"),
            }
        }

        Err(self.throw_error(format!("no patterns match for '{name}'")))
    }

    fn bind_and_run(&mut self, depth: usize, pattern: &Pattern, args: &Args) -> RunResult<Option<Value>> {
        match self.bind(depth, pattern, args)? {
            Binding::Mismatch => Ok(None),
            Binding::Bound => self.evaluate(depth, pattern.start).map(Some),
        }
    }

    fn bind(&mut self, depth: usize, pattern: &Pattern, args: &Args) -> RunResult<Binding> {
        let declared = pattern.positional.len();
        let given = args.positional.len();

        let frame = self.frame_mut(depth)?;
        for (register, &value) in args.positional.iter().take(declared).enumerate() {
            frame.set_local(register, value)?;
        }

        if given > declared {
            if !pattern.splat {
                return Ok(Binding::Mismatch);
            }
            let rest = args.positional[declared..].to_vec();
            let book = self.allocate(HeapObject::Book(rest))?;
            self.frame_mut(depth)?
                .set_local(pattern.splat_register(), Value::Book(book))?;
        } else {
            for register in given..declared {
                let Some(start) = pattern.positional[register].default else {
                    return Ok(Binding::Mismatch);
                };
                let value = self.evaluate(depth, start)?;
                self.frame_mut(depth)?.set_local(register, value)?;
            }

            if pattern.splat {
                let book = self.allocate(HeapObject::Book(Vec::new()))?;
                self.frame_mut(depth)?
                    .set_local(pattern.splat_register(), Value::Book(book))?;
            }
        }

        if self.bind_keywords(depth, pattern, args)? == Binding::Mismatch {
            return Ok(Binding::Mismatch);
        }

        for (register, parameter) in pattern.positional.iter().enumerate() {
            if let Some(start) = parameter.guard {
                if !self.check_guard(depth, start, register)? {
                    return Ok(Binding::Mismatch);
                }
            }
        }
        for (index, parameter) in pattern.keywords.iter().enumerate() {
            if let Some(start) = parameter.guard {
                if !self.check_guard(depth, start, pattern.keyword_register(index))? {
                    return Ok(Binding::Mismatch);
                }
            }
        }

        if let Some(start) = pattern.condition {
            let condition = self.evaluate(depth, start)?;
            if !self.to_veracity(condition)? {
                return Ok(Binding::Mismatch);
            }
        }

        Ok(Binding::Bound)
    }

    fn bind_keywords(&mut self, depth: usize, pattern: &Pattern, args: &Args) -> RunResult<Binding> {
        let mut filled = vec![false; pattern.keywords.len()];
        let mut extra = Vec::new();

        for (name, value) in &args.keywords {
            match pattern.keyword_index(name) {
                Some(index) => {
                    self.frame_mut(depth)?
                        .set_local(pattern.keyword_register(index), *value)?;
                    filled[index] = true;
                }
                None if pattern.splatsplat => extra.push((name.as_str(), *value)),
                None => return Ok(Binding::Mismatch),
            }
        }

        for (index, parameter) in pattern.keywords.iter().enumerate() {
            if filled[index] {
                continue;
            }
            let Some(start) = parameter.default else {
                return Ok(Binding::Mismatch);
            };
            let value = self.evaluate(depth, start)?;
            self.frame_mut(depth)?
                .set_local(pattern.keyword_register(index), value)?;
        }

        if pattern.splatsplat {
            let codex = self.allocate(HeapObject::Codex(Codex::default()))?;
            self.frame_mut(depth)?
                .set_local(pattern.splatsplat_register(), Value::Codex(codex))?;
            for (name, value) in extra {
                let key = self.new_text(name)?;
                self.codex_insert(codex, key, value)?;
            }
        }

        Ok(Binding::Bound)
    }

    fn check_guard(&mut self, depth: usize, start: usize, register: usize) -> RunResult<bool> {
        let guard = self.evaluate(depth, start)?;
        let value = self.frame_mut(depth)?.local(register)?;
        self.with_pinned(&[guard], |vm| vm.matches(guard, value))
    }

    fn call_native(&mut self, native: &NativeJourney, args: &Args) -> RunResult<Value> {
        if let Some(arity) = native.arity {
            if arity != args.len() {
                return Err(self.throw_error(format!(
                    "wrong number of arguments for '{}': expected {arity}, got {}",
                    native.name,
                    args.len()
                )));
            }
        }

        (native.func)(self, args)
    }

    /// Constructs an imitation of `form`.
    fn imitate(&mut self, form: GcRef, args: Args) -> RunResult<Value> {
        let (name, imitate, guards) = {
            let form = self.form_ref(form)?;
            let guards: Vec<_> = form
                .matter
                .iter()
                .map(|matter| (matter.name.clone(), matter.genus))
                .collect();
            (form.name.clone(), form.imitate, guards)
        };

        let Some(imitate) = imitate else {
            if !args.keywords.is_empty() {
                return Err(self.throw_error(format!("'{name}' takes no keyword arguments")));
            }
            if args.len() != guards.len() {
                return Err(self.throw_error(format!(
                    "argument mismatch for '{name}': expected {} arguments, got {}",
                    guards.len(),
                    args.len()
                )));
            }
            for ((field, guard), &value) in guards.iter().zip(&args.positional) {
                if let Some(guard) = *guard {
                    if !self.matches(guard, value)? {
                        return Err(self.throw_error(format!(
                            "argument '{field}' for '{name}' does not match its genus"
                        )));
                    }
                }
            }

            let imitation = Imitation {
                form,
                matter: args.positional,
            };
            return self.allocate(HeapObject::Imitation(imitation)).map(Value::Imitation);
        };

        let imitation = Imitation {
            form,
            matter: vec![Value::Ni; guards.len()],
        };
        let instance = Value::Imitation(self.allocate(HeapObject::Imitation(imitation))?);

        let mut positional = Vec::with_capacity(args.len() + 1);
        positional.push(instance);
        positional.extend(args.positional);
        let args = Args {
            positional,
            keywords: args.keywords,
        };

        self.with_pinned(&[instance], |vm| vm.call_journey(imitate, &args))?;
        Ok(instance)
    }
}
