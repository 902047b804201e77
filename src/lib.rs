//! Native breakpoint marker for debugging Python code with GDB.
//!
//! Python calls `_pygdb.breakpoint_mark()`; GDB breaks on the exported
//! symbol [`marker::SYMBOL`] that the call passes through.

mod error;
#[cfg(unix)]
pub mod gate;
pub mod logging;
pub mod marker;
#[cfg(feature = "python")]
mod python;

pub use error::Error;
pub use marker::breakpoint_mark;
