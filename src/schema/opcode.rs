use num_enum::IntoPrimitive;

/// The encoding format an [`Opcode`] is emitted with. Determines which
/// `src/encode.rs` function builds the instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// No operands: `NOP`, `END`, `EMIT`.
    F0,
    /// `dst, src1(wide,+idx), src2(narrow)`.
    F1,
    /// `dst, src1(wide,+idx)`.
    F1u,
    /// `src1, cmpX, cmpY, src2`.
    F1c,
    /// Conditional on `cmp.x`/`cmp.y`: `BREAKC/CALLC/JMPC/IFC`.
    F2,
    /// Conditional on a boolean uniform: `CALLU/JMPU/IFU`.
    F3,
    /// `dst, src1(narrow), src2(wide,+idx), src3(narrow)`.
    F5,
    /// `MOVA a0|a1|a01, src1`.
    Mova,
    /// `SETEMIT vtxId, [prim] [inv]`.
    Setemit,
    /// Unconditional `CALL name`.
    Call,
    /// `FOR ivec_uniform`.
    For,
}

/// Maestro opcodes, grouped by [`Format`].
///
/// `ADD/DP3/DP4/MUL/MAX/MIN/RCP/RSQ/NOP/END/CALL/CALLC/EMIT/CMP` carry the
/// numeric values given in `maestro_opcodes.h` verbatim. Opcodes that header
/// doesn't enumerate (the `I`-suffixed swapped-source siblings, the
/// `U`-suffixed boolean-uniform conditionals, `MOVA`, `FOR`) are assigned
/// unused slots in the 6-bit opcode field; nothing in this crate reads the
/// container back, so no external decoder depends on these particular values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Add = 0x00,
    Dp3 = 0x01,
    Dp4 = 0x02,
    Dph = 0x03,
    DphI = 0x04,
    Sge = 0x05,
    SgeI = 0x06,
    Slt = 0x07,
    Mul = 0x08,
    SltI = 0x09,
    Ex2 = 0x0A,
    Lg2 = 0x0B,
    Max = 0x0C,
    Min = 0x0D,
    Rcp = 0x0E,
    Rsq = 0x0F,

    Flr = 0x10,
    Mova = 0x11,
    Mov = 0x13,

    Nop = 0x21,
    End = 0x22,
    Breakc = 0x23,
    Call = 0x24,
    Callc = 0x26,
    Jmpc = 0x27,
    Ifc = 0x28,
    Callu = 0x29,
    Emit = 0x2A,
    Setemit = 0x2B,
    Jmpu = 0x2C,
    Ifu = 0x2D,
    Cmp = 0x2E,
    For = 0x2F,

    /// Occupies only the top 3 bits of the 6-bit opcode field (`0x38`, i.e.
    /// bits 29..31 once shifted into place); the low 3 bits of that field
    /// stay clear so `F5`'s destination register can use them.
    Mad = 0x38,
    MadI = 0x30,
}

impl Opcode {
    #[must_use]
    pub fn format(self) -> Format {
        use Opcode::*;
        match self {
            Nop | End | Emit => Format::F0,
            Add | Dp3 | Dp4 | Dph | DphI | Sge | SgeI | Slt | SltI | Mul | Max | Min => Format::F1,
            Ex2 | Lg2 | Flr | Rcp | Rsq | Mov => Format::F1u,
            Cmp => Format::F1c,
            Breakc | Callc | Jmpc | Ifc => Format::F2,
            Callu | Jmpu | Ifu => Format::F3,
            Mova => Format::Mova,
            Setemit => Format::Setemit,
            For => Format::For,
            Call => Format::Call,
            Mad | MadI => Format::F5,
        }
    }

    /// Whether this opcode is a branch-class instruction for the purposes of
    /// the auto-NOP padding rule: the last word of a block must not be one of
    /// these, since the hardware's branch target/return-address tracking
    /// assumes block bodies end on a non-branch.
    #[must_use]
    pub fn is_branch_class(self) -> bool {
        matches!(
            self,
            Opcode::Jmpc
                | Opcode::Jmpu
                | Opcode::Call
                | Opcode::Callc
                | Opcode::Callu
                | Opcode::Breakc
        )
    }

    /// The `I`-suffixed (source-swapped) sibling of a `DPH`/`SGE`/`SLT`-class
    /// opcode, chosen when the assembler detects `src2` is a constant and
    /// `src1` isn't (swapping lets the constant sit in the slot the OPDESC
    /// pool can pack more tightly). `None` if this opcode has no such sibling.
    #[must_use]
    pub fn inverted(self) -> Option<Opcode> {
        match self {
            Opcode::Dph => Some(Opcode::DphI),
            Opcode::Sge => Some(Opcode::SgeI),
            Opcode::Slt => Some(Opcode::SltI),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_carry_distinct_byte_values() {
        let all = [
            Opcode::Add,
            Opcode::Dp3,
            Opcode::Dp4,
            Opcode::Dph,
            Opcode::DphI,
            Opcode::Sge,
            Opcode::SgeI,
            Opcode::Slt,
            Opcode::SltI,
            Opcode::Mul,
            Opcode::Ex2,
            Opcode::Lg2,
            Opcode::Flr,
            Opcode::Max,
            Opcode::Min,
            Opcode::Rcp,
            Opcode::Rsq,
            Opcode::Mova,
            Opcode::Mov,
            Opcode::Nop,
            Opcode::End,
            Opcode::Breakc,
            Opcode::Call,
            Opcode::Callc,
            Opcode::Jmpc,
            Opcode::Ifc,
            Opcode::Callu,
            Opcode::Emit,
            Opcode::Setemit,
            Opcode::Jmpu,
            Opcode::Ifu,
            Opcode::Cmp,
            Opcode::For,
            Opcode::Mad,
            Opcode::MadI,
        ];
        let mut seen = std::collections::HashSet::new();
        for op in all {
            let byte: u8 = op.into();
            assert!(seen.insert(byte), "duplicate opcode byte {byte:#x}");
        }
    }

    #[test]
    fn grounded_values_match_maestro_opcodes_header() {
        assert_eq!(u8::from(Opcode::Add), 0x00);
        assert_eq!(u8::from(Opcode::Dp3), 0x01);
        assert_eq!(u8::from(Opcode::Dp4), 0x02);
        assert_eq!(u8::from(Opcode::Mul), 0x08);
        assert_eq!(u8::from(Opcode::Max), 0x0C);
        assert_eq!(u8::from(Opcode::Min), 0x0D);
        assert_eq!(u8::from(Opcode::Rcp), 0x0E);
        assert_eq!(u8::from(Opcode::Rsq), 0x0F);
        assert_eq!(u8::from(Opcode::Nop), 0x21);
        assert_eq!(u8::from(Opcode::End), 0x22);
        assert_eq!(u8::from(Opcode::Call), 0x24);
        assert_eq!(u8::from(Opcode::Callc), 0x26);
        assert_eq!(u8::from(Opcode::Emit), 0x2A);
        assert_eq!(u8::from(Opcode::Cmp), 0x2E);
    }

    #[test]
    fn inverted_siblings() {
        assert_eq!(Opcode::Dph.inverted(), Some(Opcode::DphI));
        assert_eq!(Opcode::Sge.inverted(), Some(Opcode::SgeI));
        assert_eq!(Opcode::Slt.inverted(), Some(Opcode::SltI));
        assert_eq!(Opcode::Add.inverted(), None);
    }
}
