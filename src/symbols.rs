//! Symbol tables: per-file aliases and labels, the global procedure table,
//! per-module uniforms/constants/inputs/outputs. Ordered maps (`IndexMap`) so
//! the global uniform table's declaration order survives into header
//! generation, per the uniform-table's insertion-order invariant.

use indexmap::IndexMap;

use crate::error::{AssembleError, Result};
use crate::operand::AliasEntry;
use crate::schema::OutputKind;

fn symbol_err(file: &str, line: u32, message: impl Into<String>) -> AssembleError {
    AssembleError::Symbol {
        file: file.to_string(),
        line,
        message: message.into(),
    }
}

/// `[A-Za-z_$][A-Za-z0-9_$]*`.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else { return false };
    if !(first.is_ascii_alphabetic() || first == '_' || first == '$') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Names beginning with `_` are allocated storage and usable as aliases, but
/// excluded from the exported symbol table and header generation.
#[must_use]
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('_')
}

/// Per-file alias table. Cleared between input files.
#[derive(Debug, Default)]
pub struct AliasTable {
    entries: IndexMap<String, AliasEntry>,
}

impl AliasTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, entry: AliasEntry, file: &str, line: u32) -> Result<()> {
        if !is_valid_identifier(name) {
            return Err(AssembleError::Lex {
                file: file.to_string(),
                line,
                message: format!("invalid identifier: {name}"),
            });
        }
        if self.entries.contains_key(name) {
            return Err(symbol_err(file, line, format!("duplicate identifier: {name}")));
        }
        self.entries.insert(name.to_string(), entry);
        Ok(())
    }

    #[must_use]
    pub fn map(&self) -> &IndexMap<String, AliasEntry> {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Per-file label table: name -> code-word position. Cleared between files.
#[derive(Debug, Default)]
pub struct LabelTable {
    positions: IndexMap<String, usize>,
}

impl LabelTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: &str, position: usize, file: &str, line: u32) -> Result<()> {
        if self.positions.contains_key(name) {
            return Err(symbol_err(file, line, format!("duplicate label: {name}")));
        }
        self.positions.insert(name.to_string(), position);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }
}

/// Global procedure table: name -> (start position, word count).
#[derive(Debug, Default)]
pub struct ProcedureTable {
    procs: IndexMap<String, (usize, usize)>,
}

impl ProcedureTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: &str, start: usize, size: usize, file: &str, line: u32) -> Result<()> {
        if self.procs.contains_key(name) {
            return Err(symbol_err(file, line, format!("duplicate procedure: {name}")));
        }
        self.procs.insert(name.to_string(), (start, size));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<(usize, usize)> {
        self.procs.get(name).copied()
    }
}

/// Uniform register class, as tracked by symbol tables and the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    Fvec,
    Ivec,
    Bool,
}

/// A declared uniform: name, allocated flat position, element count, type.
#[derive(Debug, Clone)]
pub struct Uniform {
    pub name: String,
    pub position: u16,
    pub size: u16,
    pub ty: UniformType,
}

/// Global (shared-space) uniform table, preserving declaration order.
#[derive(Debug, Default)]
pub struct UniformTable {
    order: IndexMap<String, Uniform>,
}

impl UniformTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Uniform> {
        self.order.get(name)
    }

    /// Reuse an existing global uniform if `name`/`ty`/`size` match; error if
    /// the name is already taken with a different shape.
    pub fn check_reuse(&self, name: &str, ty: UniformType, size: u16, file: &str, line: u32) -> Result<Option<u16>> {
        match self.order.get(name) {
            Some(existing) if existing.ty == ty && existing.size == size => Ok(Some(existing.position)),
            Some(_) => Err(symbol_err(
                file,
                line,
                format!("uniform '{name}' redeclared with a different type or size"),
            )),
            None => Ok(None),
        }
    }

    pub fn insert(&mut self, uniform: Uniform) {
        self.order.insert(uniform.name.clone(), uniform);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Uniform> {
        self.order.values()
    }
}

/// A constant record: which register it initializes and its typed value.
/// Modeled as a tagged enum rather than a union, per the redesign note.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    FVec([f32; 4]),
    IVec([u8; 4]),
    Bool(bool),
}

#[derive(Debug, Clone)]
pub struct Constant {
    pub reg_id: u8,
    pub value: ConstantValue,
}

/// A declared output: semantic kind, destination register, component mask.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub kind: OutputKind,
    pub register: u8,
    pub mask: u8,
}

/// Per-module (DVLE) symbol state: inputs, outputs, constants. Uniforms for
/// the default (non-geometry-shader) profile live in the shared global table;
/// geometry-shader modules get their own local set.
#[derive(Debug, Default)]
pub struct ModuleSymbols {
    pub inputs: IndexMap<String, u8>,
    pub outputs: Vec<Output>,
    pub constants: Vec<Constant>,
    pub local_uniforms: Vec<Uniform>,
}

impl ModuleSymbols {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, name: &str, register: u8, file: &str, line: u32) -> Result<()> {
        if self.inputs.contains_key(name) {
            return Err(symbol_err(file, line, format!("duplicate input: {name}")));
        }
        self.inputs.insert(name.to_string(), register);
        Ok(())
    }

    /// The lowest input register (0x00..0x0F) not yet claimed.
    #[must_use]
    pub fn lowest_free_input(&self) -> Option<u8> {
        let used: std::collections::HashSet<u8> = self.inputs.values().copied().collect();
        (0x00..=0x0F).find(|r| !used.contains(r))
    }

    pub fn add_output(&mut self, output: Output, file: &str, line: u32) -> Result<()> {
        for existing in &self.outputs {
            if existing.register == output.register && existing.mask & output.mask != 0 {
                return Err(AssembleError::Semantic {
                    file: file.to_string(),
                    line,
                    message: format!("output mask collision on register {:#x}", output.register),
                });
            }
        }
        self.outputs.push(output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::Swizzle;

    #[test]
    fn identifier_validation() {
        assert!(is_valid_identifier("_foo"));
        assert!(is_valid_identifier("$bar1"));
        assert!(!is_valid_identifier("1foo"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn hidden_names() {
        assert!(is_hidden("_internal"));
        assert!(!is_hidden("visible"));
    }

    #[test]
    fn alias_table_rejects_duplicates() {
        let mut table = AliasTable::new();
        let entry = AliasEntry {
            index: 0,
            swizzle: Swizzle::IDENTITY,
            negate: false,
        };
        table.insert("foo", entry, "f", 1).unwrap();
        let err = table.insert("foo", entry, "f", 2).unwrap_err();
        assert!(matches!(err, AssembleError::Symbol { .. }));
    }

    #[test]
    fn uniform_reuse_matches_shape() {
        let mut table = UniformTable::new();
        table.insert(Uniform {
            name: "myu".into(),
            position: 0x20,
            size: 1,
            ty: UniformType::Fvec,
        });
        assert_eq!(
            table.check_reuse("myu", UniformType::Fvec, 1, "f", 1).unwrap(),
            Some(0x20)
        );
        assert!(table.check_reuse("myu", UniformType::Ivec, 1, "f", 1).is_err());
    }

    #[test]
    fn output_mask_collision_detected() {
        let mut mod_syms = ModuleSymbols::new();
        mod_syms
            .add_output(
                Output {
                    kind: OutputKind::Position,
                    register: 0,
                    mask: 0b1100,
                },
                "f",
                1,
            )
            .unwrap();
        let err = mod_syms
            .add_output(
                Output {
                    kind: OutputKind::Color,
                    register: 0,
                    mask: 0b0100,
                },
                "f",
                2,
            )
            .unwrap_err();
        assert!(matches!(err, AssembleError::Semantic { .. }));
    }
}
