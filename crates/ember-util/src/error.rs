//! Driver-facing error types.
//!
//! The interpreter pipeline recognizes three disjoint error kinds: I/O
//! errors, compile errors, and runtime errors. Only I/O errors are
//! modeled as an ordinary `thiserror` enum propagated with `?` — compile
//! errors are multi-valued (panic-mode accumulates several per source)
//! and runtime errors are reported and recovered from inside the VM
//! itself (`ember_vm::vm::RuntimeError`). This type covers the one kind
//! that genuinely terminates the process immediately.

use std::path::PathBuf;
use thiserror::Error;

/// A failure reading the program's source, fatal to the whole process.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("could not read '{path}': {source}")]
    ReadSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read line from stdin: {0}")]
    ReadLine(#[source] std::io::Error),
}

impl DriverError {
    /// The process exit code for every I/O failure.
    pub const EXIT_CODE: i32 = 74;
}
