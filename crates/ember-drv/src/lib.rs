//! ember-drv — the `ember` binary's library half: argument parsing, the
//! REPL and file-running drivers, and the exit-code mapping. The actual
//! work is already done by `ember-compile`/`ember-vm`; this crate is just
//! their process boundary.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use ember_compile::{compile, CompileFailed};
use ember_util::DriverError;
use ember_vm::Vm;
use thiserror::Error;

/// What one invocation of `ember` was asked to do.
pub enum Mode {
    Repl,
    RunFile(PathBuf),
}

/// Wrong argument count — anything but zero or one positional argument.
#[derive(Debug, Error)]
#[error("Usage: ember [path]")]
pub struct UsageError;

impl UsageError {
    pub const EXIT_CODE: i32 = 64;
}

/// The developer-tooling knobs that don't belong to the language itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    /// Dump each chunk's disassembly before running it. Only has an
    /// effect when `ember-vm`'s `trace` feature is compiled in; otherwise
    /// the flag parses but does nothing.
    pub trace: bool,
}

/// Splits `args` (including the program name in position 0, as
/// `std::env::args` yields it) into a `Mode` and a `Config`. `--trace` is
/// accepted anywhere in the argument list and doesn't count toward arity.
pub fn parse_args<I: Iterator<Item = String>>(args: I) -> Result<(Mode, Config), UsageError> {
    let mut trace = false;
    let mut positional = Vec::new();

    for arg in args.skip(1) {
        if arg == "--trace" {
            trace = true;
        } else {
            positional.push(arg);
        }
    }

    let mode = match positional.len() {
        0 => Mode::Repl,
        1 => Mode::RunFile(PathBuf::from(&positional[0])),
        _ => return Err(UsageError),
    };

    Ok((mode, Config { trace }))
}

/// The outcome of one `interpret` call, already mapped down to the three
/// exit-code buckets a compile/runtime/success result falls into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

impl InterpretResult {
    pub fn exit_code(self) -> i32 {
        match self {
            InterpretResult::Ok => 0,
            InterpretResult::CompileError => 65,
            InterpretResult::RuntimeError => 70,
        }
    }
}

/// Compiles and runs one source buffer against a persistent `Vm`.
/// Diagnostics are reported as a side effect (panic-mode to stderr from
/// the compiler, `RuntimeError`'s `Display` from the VM); the return
/// value only says which of the three outcomes happened.
pub fn interpret(source: &[u8], vm: &mut Vm, config: &Config) -> InterpretResult {
    let chunk = match compile(source, vm) {
        Ok(chunk) => chunk,
        Err(CompileFailed) => return InterpretResult::CompileError,
    };

    #[cfg(feature = "trace")]
    if config.trace {
        print!("{}", ember_vm::debug::disassemble_chunk(&chunk, "script"));
    }
    #[cfg(not(feature = "trace"))]
    let _ = config.trace;

    match vm.run(&chunk) {
        Ok(()) => InterpretResult::Ok,
        Err(err) => {
            eprintln!("{err}");
            InterpretResult::RuntimeError
        }
    }
}

/// One invocation's mutable state: the persistent `Vm` and the parsed
/// `Config`. Keeping the `Vm` here rather than rebuilding it per REPL
/// line is what lets globals and interned strings survive across lines.
pub struct Session {
    vm: Vm,
    config: Config,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self { vm: Vm::new(), config }
    }

    /// Prints `> `, reads one line, and interprets it, repeating until
    /// EOF or the exact line `exit`. Returns the exit code of the last
    /// line interpreted, or 0 if none was.
    pub fn run_repl(&mut self) -> i32 {
        let stdin = io::stdin();
        let mut last_code = 0;

        loop {
            print!("> ");
            if io::stdout().flush().is_err() {
                return DriverError::EXIT_CODE;
            }

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => return last_code,
                Ok(_) => {}
                Err(source) => {
                    eprintln!("{}", DriverError::ReadLine(source));
                    return DriverError::EXIT_CODE;
                }
            }

            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed == "exit" {
                return last_code;
            }

            last_code = interpret(trimmed.as_bytes(), &mut self.vm, &self.config).exit_code();
        }
    }

    /// Reads `path` whole and interprets it once.
    pub fn run_file(&mut self, path: &Path) -> i32 {
        let source = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(source) => {
                let err = DriverError::ReadSource { path: path.to_path_buf(), source };
                eprintln!("{err}");
                return DriverError::EXIT_CODE;
            }
        };

        interpret(&source, &mut self.vm, &self.config).exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_arguments_means_repl() {
        let (mode, config) = parse_args(args(&["ember"]).into_iter()).unwrap();
        assert!(matches!(mode, Mode::Repl));
        assert!(!config.trace);
    }

    #[test]
    fn one_argument_means_run_file() {
        let (mode, _) = parse_args(args(&["ember", "script.ember"]).into_iter()).unwrap();
        assert!(matches!(mode, Mode::RunFile(p) if p == PathBuf::from("script.ember")));
    }

    #[test]
    fn trace_flag_does_not_count_toward_arity() {
        let (mode, config) = parse_args(args(&["ember", "--trace", "script.ember"]).into_iter())
            .unwrap();
        assert!(matches!(mode, Mode::RunFile(p) if p == PathBuf::from("script.ember")));
        assert!(config.trace);
    }

    #[test]
    fn two_positional_arguments_is_a_usage_error() {
        let result = parse_args(args(&["ember", "a.ember", "b.ember"]).into_iter());
        assert!(result.is_err());
    }

    #[test]
    fn exit_codes_match_the_three_outcomes() {
        assert_eq!(InterpretResult::Ok.exit_code(), 0);
        assert_eq!(InterpretResult::CompileError.exit_code(), 65);
        assert_eq!(InterpretResult::RuntimeError.exit_code(), 70);
    }
}
