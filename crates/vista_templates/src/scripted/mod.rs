//! Scripted markup: literal text mixed with embedded code tags.
//!
//! Compilation runs in two phases. The scanner splits the template into
//! text and code segments and produces a generated source listing; the
//! compiler then parses the code segments into a node program that the
//! [`CompiledUnit`] executes on every render.

mod compiler;
mod scanner;

pub use compiler::{CompiledUnit, ScriptedCompiler};
pub use scanner::{NewlineTrim, TrimMode};
