//! Two-pass relocation: `procReloc`s (patched against the global procedure
//! table at final link) and `labelReloc`s (patched per-file, against the
//! label table that was active when the file producing them finished).

use crate::error::{AssembleError, Result};
use crate::symbols::{LabelTable, ProcedureTable};

/// A pending `CALL name` fixup: `inst = (inst & !0x3FFFFF) | size | (start << 10)`.
#[derive(Debug, Clone)]
pub struct ProcReloc {
    pub word_index: usize,
    pub target_name: String,
    pub file: String,
    pub line: u32,
}

/// A pending branch-target fixup: `inst = (inst & !(0xFFF << 10)) | (dst << 10)`.
#[derive(Debug, Clone)]
pub struct LabelReloc {
    pub word_index: usize,
    pub target_name: String,
    pub file: String,
    pub line: u32,
}

fn symbol_err(file: &str, line: u32, message: impl Into<String>) -> AssembleError {
    AssembleError::Symbol {
        file: file.to_string(),
        line,
        message: message.into(),
    }
}

/// Patch every pending label reloc for one file against that file's label
/// table; called at end-of-file, before the table is cleared.
pub fn resolve_labels(code: &mut [u32], relocs: &[LabelReloc], labels: &LabelTable) -> Result<()> {
    for reloc in relocs {
        let dst = labels.get(&reloc.target_name).ok_or_else(|| {
            symbol_err(&reloc.file, reloc.line, format!("undefined label: {}", reloc.target_name))
        })?;
        let word = &mut code[reloc.word_index];
        *word = (*word & !(0xFFF << 10)) | ((dst as u32 & 0xFFF) << 10);
    }
    Ok(())
}

/// Patch every procedure-call reloc against the final global procedure
/// table; called once, after all input files have been assembled.
pub fn resolve_procedures(code: &mut [u32], relocs: &[ProcReloc], procs: &ProcedureTable) -> Result<()> {
    for reloc in relocs {
        let (start, size) = procs.get(&reloc.target_name).ok_or_else(|| {
            symbol_err(
                &reloc.file,
                reloc.line,
                format!("undefined procedure: {}", reloc.target_name),
            )
        })?;
        let word = &mut code[reloc.word_index];
        *word = (*word & !0x3F_FFFF) | (size as u32 & 0x3FF) | ((start as u32 & 0xFFF) << 10);
    }
    Ok(())
}

/// Resolve a module's `.entry` name into `(entry_start, entry_end)`.
pub fn resolve_entrypoint(name: &str, procs: &ProcedureTable, file: &str, line: u32) -> Result<(u32, u32)> {
    let (start, size) = procs
        .get(name)
        .ok_or_else(|| symbol_err(file, line, format!("undefined entry point: {name}")))?;
    Ok((start as u32, (start + size) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_reloc_patches_target_field_only() {
        let mut labels = LabelTable::new();
        labels.define("L", 0x123, "f", 1).unwrap();
        let mut code = vec![0xFFFF_FFFFu32];
        let relocs = vec![LabelReloc {
            word_index: 0,
            target_name: "L".to_string(),
            file: "f".to_string(),
            line: 2,
        }];
        resolve_labels(&mut code, &relocs, &labels).unwrap();
        assert_eq!((code[0] >> 10) & 0xFFF, 0x123);
        assert_eq!(code[0] & 0x3FF, 0x3FF);
    }

    #[test]
    fn undefined_label_is_symbol_error() {
        let labels = LabelTable::new();
        let mut code = vec![0u32];
        let relocs = vec![LabelReloc {
            word_index: 0,
            target_name: "missing".to_string(),
            file: "f".to_string(),
            line: 2,
        }];
        let err = resolve_labels(&mut code, &relocs, &labels).unwrap_err();
        assert!(matches!(err, AssembleError::Symbol { .. }));
    }

    #[test]
    fn proc_reloc_patches_size_and_start() {
        let mut procs = ProcedureTable::new();
        procs.define("main", 5, 3, "f", 1).unwrap();
        let mut code = vec![0u32];
        let relocs = vec![ProcReloc {
            word_index: 0,
            target_name: "main".to_string(),
            file: "f".to_string(),
            line: 1,
        }];
        resolve_procedures(&mut code, &relocs, &procs).unwrap();
        assert_eq!(code[0] & 0x3FF, 3);
        assert_eq!((code[0] >> 10) & 0xFFF, 5);
    }
}
