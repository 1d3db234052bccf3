//! Assembler for the Maestro vertex/geometry shader unit.
//!
//! Parses the line-oriented Maestro assembly language and links one or more
//! assembled modules into a SHBIN container (`DVLB`/`DVLP`/`DVLE`), the
//! format consumed by the fixed-function GPU's shader loader.
//!
//! The crate is write-only: it has no reader for its own output format,
//! mirroring how a disassembler would be a separate tool.

pub mod alloc;
pub mod assembler;
pub mod blocks;
pub mod container;
pub mod directives;
pub mod encode;
pub mod error;
pub mod f24;
pub mod header;
pub mod opdesc;
pub mod operand;
pub mod relocate;
pub mod scan;
pub mod schema;
pub mod symbols;

pub use self::assembler::{Assembler, AssemblerOptions};
pub use self::error::{AssembleError, Result};

/// Reads assembly source text by name. The driver's concern; the assembler
/// only ever sees the strings this returns.
pub trait SourceLoader {
    fn load(&self, filename: &str) -> std::io::Result<String>;
}

/// Receives the assembled SHBIN bytes. Endianness is the sink's contract, not
/// a crate-wide `#[cfg]` switch: implementations write little-endian, as the
/// container format requires.
pub trait ByteSink {
    fn write_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()>;
}
