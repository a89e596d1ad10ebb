//! End-to-end tests of the `squire` binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use squire_vm::image::{
    CodeblockImage, ConstantImage, GlobalImage, JourneyImage, PatternImage, ProgramImage,
};
use squire_vm::{Assembler, Interrupt, Opcode, Value};
use tempfile::TempDir;

fn squire(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_squire"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to spawn squire")
}

/// A program whose entry journey is `asm`. The assembler's constants are
/// numeral placeholders, replaced in order by `constants`.
fn program(asm: Assembler, constants: Vec<ConstantImage>, argv: bool) -> ProgramImage {
    let block = asm.finish().unwrap();
    assert_eq!(block.constants().len(), constants.len());

    let mut image = ProgramImage {
        journeys: vec![JourneyImage {
            name: "main".into(),
            patterns: vec![PatternImage {
                codeblock: CodeblockImage {
                    nlocals: block.nlocals() as u32,
                    constants,
                    code: block.code().to_vec(),
                },
                ..PatternImage::default()
            }],
        }],
        main: Some(0),
        ..ProgramImage::default()
    };
    if argv {
        image.globals.push(GlobalImage {
            name: "argv".into(),
            value: ConstantImage::Ni,
        });
        image.argv_global = Some(0);
    }
    image
}

fn write(dir: &TempDir, image: &ProgramImage) -> PathBuf {
    let path = dir.path().join("program.sqi");
    image.write(&path).unwrap();
    path
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn greeting() -> ProgramImage {
    let mut asm = Assembler::new();
    let text = asm.load(Value::Numeral(0));
    let ignored = asm.local();
    asm.interrupt(Interrupt::Println, &[text, ignored]);
    asm.ret(ignored);
    program(asm, vec![ConstantImage::Text("hello, squire".into())], false)
}

#[test]
fn test_run_prints_output() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, &greeting());

    let output = squire(&["run", path_arg(&path)]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hello, squire\n");
}

#[test]
fn test_run_passes_arguments() {
    let mut asm = Assembler::new();
    let argv = asm.load_global(0);
    let ignored = asm.local();
    asm.interrupt(Interrupt::Println, &[argv, ignored]);
    asm.ret(ignored);

    let dir = TempDir::new().unwrap();
    let path = write(&dir, &program(asm, vec![], true));

    let output = squire(&["run", path_arg(&path), "first", "second"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "[first, second]\n");
}

#[test]
fn test_uncaught_exception_exits_nonzero() {
    let mut asm = Assembler::new();
    let boom = asm.load(Value::Numeral(0));
    asm.op(Opcode::Throw, &[boom]);

    let dir = TempDir::new().unwrap();
    let path = write(&dir, &program(asm, vec![ConstantImage::Text("boom".into())], false));

    let output = squire(&["run", path_arg(&path)]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("uncaught exception encountered:"));
    assert!(stderr.contains(r#"Text("boom")"#));
}

#[test]
fn test_exit_status() {
    let mut asm = Assembler::new();
    let code = asm.load(Value::Numeral(3));
    asm.interrupt(Interrupt::Exit, &[code]);

    let dir = TempDir::new().unwrap();
    let path = write(&dir, &program(asm, vec![ConstantImage::Numeral(3)], false));

    let output = squire(&["run", path_arg(&path)]);
    assert_eq!(output.status.code(), Some(3));
    assert!(output.stderr.is_empty());
}

#[test]
fn test_exit_status_wraps_to_nonzero() {
    let mut asm = Assembler::new();
    let code = asm.load(Value::Numeral(256));
    asm.interrupt(Interrupt::Exit, &[code]);

    let dir = TempDir::new().unwrap();
    let path = write(&dir, &program(asm, vec![ConstantImage::Numeral(256)], false));

    let output = squire(&["run", path_arg(&path)]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_heap_too_small() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, &greeting());

    let output = squire(&["run", "--heap-slots", "1", path_arg(&path)]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("heap"));
}

#[test]
fn test_missing_image() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.sqi");

    let output = squire(&["run", path_arg(&path)]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("io error"));
}

#[test]
fn test_disasm() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, &greeting());

    let output = squire(&["disasm", path_arg(&path)]);
    assert!(output.status.success());
    let listing = String::from_utf8_lossy(&output.stdout);
    assert!(listing.contains("journey main (1 patterns)"));
    assert!(listing.contains("pattern 0: () start @0"));
    assert!(listing.contains(r#"Text("hello, squire")"#));
    assert!(listing.contains("INT PRINTLN"));
}
