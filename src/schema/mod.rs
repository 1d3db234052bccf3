//! Definitions drawn from `maestro_opcodes.h` and `picasso.h`: the fixed
//! enumerations the Maestro ISA and SHBIN container format are built from.

/// Opcodes and instruction formats
pub mod opcode;
/// Output semantic kinds (`.out` types)
pub mod output;
/// `cmp.x`/`cmp.y` condition codes
pub mod condition;
/// Geometry-shader submission types
pub mod gsh;

pub use condition::Condition;
pub use gsh::GshType;
pub use opcode::{Format, Opcode};
pub use output::OutputKind;
