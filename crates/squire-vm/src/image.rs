//! Serialized programs.
//!
//! A [`ProgramImage`] is what a compiler hands the runtime: every form and
//! journey the program declares, with constants described symbolically so
//! they can refer to each other by index. [`ProgramImage::load`] turns it
//! into heap objects in two passes. Placeholders for every form and journey
//! are allocated first, then constants are materialised and each
//! placeholder is filled in. Everything allocated stays pinned until the
//! load finishes.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bytecode::{Codeblock, Word};
use crate::error::{Error, Result};
use crate::gc::{GcRef, HeapObject};
use crate::runtime::{Essence, Form, Journey, Matter, Parameter, Pattern, RunResult, Value};
use crate::vm::Vm;

/// A constant as stored in an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstantImage {
    /// `ni`
    Ni,
    /// `yea` / `nay`
    Veracity(bool),
    /// Integer
    Numeral(i64),
    /// Text, allocated on load
    Text(String),
    /// Journey by index into [`ProgramImage::journeys`]
    Journey(u32),
    /// Form by index into [`ProgramImage::forms`]
    Form(u32),
    /// The built-in `Exception` form
    Exception,
    /// The built-in `IoError` form
    IoError,
    /// Book of constants, allocated on load
    Book(Vec<ConstantImage>),
}

/// A declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterImage {
    /// Parameter name
    pub name: String,
    /// Default-value entry point
    pub default: Option<u32>,
    /// Genus guard entry point
    pub guard: Option<u32>,
}

impl ParameterImage {
    /// A required, unguarded parameter.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            guard: None,
        }
    }
}

/// Compiled code of one pattern.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CodeblockImage {
    /// Register count
    pub nlocals: u32,
    /// Constant pool
    pub constants: Vec<ConstantImage>,
    /// Instruction words
    pub code: Vec<Word>,
}

/// One overload of a journey.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatternImage {
    /// Positional parameters
    pub positional: Vec<ParameterImage>,
    /// Keyword parameters
    pub keywords: Vec<ParameterImage>,
    /// Collects surplus positional arguments
    pub splat: bool,
    /// Collects unknown keyword arguments
    pub splatsplat: bool,
    /// Overall guard entry point
    pub condition: Option<u32>,
    /// Body entry point
    pub start: u32,
    /// Code shared by body, defaults and guards
    pub codeblock: CodeblockImage,
}

/// A journey and its patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyImage {
    /// Journey name
    pub name: String,
    /// Overloads in declaration order
    pub patterns: Vec<PatternImage>,
}

/// A static field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EssenceImage {
    /// Field name
    pub name: String,
    /// Initial value
    pub value: ConstantImage,
    /// Genus guard
    pub genus: Option<ConstantImage>,
}

/// An instance field declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatterImage {
    /// Field name
    pub name: String,
    /// Genus guard
    pub genus: Option<ConstantImage>,
}

/// A form. Journeys and parents are indices into the image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormImage {
    /// Form name
    pub name: String,
    /// Static fields
    pub essences: Vec<EssenceImage>,
    /// Instance field layout
    pub matter: Vec<MatterImage>,
    /// Static journeys
    pub recollections: Vec<u32>,
    /// Instance journeys
    pub changes: Vec<u32>,
    /// Constructor journey
    pub imitate: Option<u32>,
    /// Parent forms
    pub parents: Vec<u32>,
}

/// A named global slot and its initial value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalImage {
    /// Name used in diagnostics
    pub name: String,
    /// Initial value
    pub value: ConstantImage,
}

/// A whole program.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgramImage {
    /// Every form
    pub forms: Vec<FormImage>,
    /// Every journey
    pub journeys: Vec<JourneyImage>,
    /// Global slots in index order
    pub globals: Vec<GlobalImage>,
    /// Entry journey
    pub main: Option<u32>,
    /// Global receiving the command-line arguments
    pub argv_global: Option<u32>,
}

impl ProgramImage {
    /// Encodes the image.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Decodes an image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }

    /// Reads an image file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        debug!(path = %path.as_ref().display(), bytes = bytes.len(), "read program image");
        Self::from_bytes(&bytes)
    }

    /// Writes an image file.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Installs the program into `vm`, which must not have any globals yet.
    ///
    /// Returns the loaded journeys in image order.
    pub fn load(&self, vm: &mut Vm) -> Result<Vec<Value>> {
        if !vm.program.globals.is_empty() {
            return Err(Error::malformed("images load into an empty program"));
        }

        let mark = vm.pinned.len();
        let mut loader = Loader::new(self, vm);
        let result = loader.link();
        let journeys: Vec<Value> = loader.journeys.iter().copied().map(Value::Journey).collect();
        vm.pinned.truncate(mark);
        vm.settle(result.map(|()| Value::Ni))?;

        debug!(
            forms = self.forms.len(),
            journeys = self.journeys.len(),
            globals = self.globals.len(),
            "program image loaded"
        );
        Ok(journeys)
    }
}

/// Tracks the placeholders of one load.
struct Loader<'a> {
    image: &'a ProgramImage,
    vm: &'a mut Vm,
    forms: Vec<GcRef>,
    journeys: Vec<GcRef>,
}

impl<'a> Loader<'a> {
    fn new(image: &'a ProgramImage, vm: &'a mut Vm) -> Self {
        Self {
            image,
            vm,
            forms: Vec::with_capacity(image.forms.len()),
            journeys: Vec::with_capacity(image.journeys.len()),
        }
    }

    fn link(&mut self) -> RunResult<()> {
        let image = self.image;
        for form in &image.forms {
            let handle = self.place(HeapObject::Form(Form::new(form.name.as_str())))?;
            self.forms.push(handle);
        }
        for journey in &image.journeys {
            let handle = self.place(HeapObject::Journey(Journey::new(journey.name.as_str(), Vec::new())))?;
            self.journeys.push(handle);
        }

        for (index, journey) in image.journeys.iter().enumerate() {
            let mut patterns = Vec::with_capacity(journey.patterns.len());
            for pattern in &journey.patterns {
                patterns.push(self.pattern(pattern)?);
            }
            let journey = Journey::new(journey.name.as_str(), patterns);
            *self.vm.journey_mut(self.journeys[index])? = journey;
        }

        for (index, form) in image.forms.iter().enumerate() {
            let form = self.form(form)?;
            *self.vm.form_mut(self.forms[index])? = form;
        }

        for global in &image.globals {
            let value = self.constant(&global.value)?;
            self.vm.define_global(global.name.as_str(), value);
        }
        if let Some(main) = image.main {
            let main = self.journey(main)?;
            self.vm.set_main(Value::Journey(main))?;
        }
        if let Some(argv) = image.argv_global {
            self.vm.set_argv_global(argv as usize)?;
        }
        Ok(())
    }

    fn place(&mut self, object: HeapObject) -> RunResult<GcRef> {
        let genus = object.genus();
        let handle = self.vm.allocate(object)?;
        self.vm.pinned.extend(Value::from_ref(genus, handle));
        Ok(handle)
    }

    fn journey(&self, index: u32) -> Result<GcRef> {
        self.journeys
            .get(index as usize)
            .copied()
            .ok_or_else(|| Error::malformed(format!("journey {index} out of range")))
    }

    fn form_ref(&self, index: u32) -> Result<GcRef> {
        self.forms
            .get(index as usize)
            .copied()
            .ok_or_else(|| Error::malformed(format!("form {index} out of range")))
    }

    fn constant(&mut self, constant: &ConstantImage) -> RunResult<Value> {
        Ok(match constant {
            ConstantImage::Ni => Value::Ni,
            ConstantImage::Veracity(b) => Value::Veracity(*b),
            ConstantImage::Numeral(n) => Value::Numeral(*n),
            ConstantImage::Text(text) => Value::Text(self.place(HeapObject::Text(text.clone()))?),
            ConstantImage::Journey(index) => Value::Journey(self.journey(*index)?),
            ConstantImage::Form(index) => Value::Form(self.form_ref(*index)?),
            ConstantImage::Exception => self.vm.exception_form(),
            ConstantImage::IoError => self.vm.io_error_form(),
            ConstantImage::Book(pages) => {
                let book = self.place(HeapObject::Book(Vec::with_capacity(pages.len())))?;
                for page in pages {
                    let value = self.constant(page)?;
                    self.vm.book_mut(book)?.push(value);
                }
                Value::Book(book)
            }
        })
    }

    fn optional(&mut self, constant: Option<&ConstantImage>) -> RunResult<Option<Value>> {
        constant.map(|c| self.constant(c)).transpose()
    }

    fn pattern(&mut self, image: &PatternImage) -> RunResult<Pattern> {
        let mut constants = Vec::with_capacity(image.codeblock.constants.len());
        for constant in &image.codeblock.constants {
            constants.push(self.constant(constant)?);
        }
        let codeblock = Codeblock::new(
            image.codeblock.nlocals as usize,
            constants,
            image.codeblock.code.clone(),
        );

        let mut pattern = Pattern::new(codeblock).starting_at(image.start as usize);
        pattern.positional = image.positional.iter().map(parameter).collect();
        pattern.keywords = image.keywords.iter().map(parameter).collect();
        pattern.splat = image.splat;
        pattern.splatsplat = image.splatsplat;
        pattern.condition = image.condition.map(|c| c as usize);
        Ok(pattern)
    }

    fn form(&mut self, image: &FormImage) -> RunResult<Form> {
        let mut form = Form::new(image.name.as_str());
        for essence in &image.essences {
            let value = self.constant(&essence.value)?;
            let genus = self.optional(essence.genus.as_ref())?;
            form.essences.push(Essence {
                genus,
                ..Essence::new(essence.name.as_str(), value)
            });
        }
        for matter in &image.matter {
            let genus = self.optional(matter.genus.as_ref())?;
            form.matter.push(Matter {
                genus,
                ..Matter::new(matter.name.as_str())
            });
        }
        for &index in &image.recollections {
            form.recollections.push(self.journey(index)?);
        }
        for &index in &image.changes {
            form.changes.push(self.journey(index)?);
        }
        form.imitate = image.imitate.map(|index| self.journey(index)).transpose()?;
        for &index in &image.parents {
            form.parents.push(self.form_ref(index)?);
        }
        Ok(form)
    }
}

fn parameter(image: &ParameterImage) -> Parameter {
    let mut parameter = Parameter::new(image.name.as_str());
    parameter.default = image.default.map(|d| d as usize);
    parameter.guard = image.guard.map(|g| g as usize);
    parameter
}
