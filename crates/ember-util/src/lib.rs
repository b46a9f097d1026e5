//! ember-util — shared primitives used by every other crate in the
//! workspace: source-position tracking and the one structured error type
//! that belongs to the process boundary rather than to compilation or
//! execution.

pub mod error;
pub mod span;

pub use error::DriverError;
pub use span::Span;
