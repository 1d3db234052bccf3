//! The nine instruction-format encoders. Bit layouts for F0/F1/F1u/F5/MOVA
//! (the non-inverted forms) are ported directly from `picasso_assembler.cpp`'s
//! `format0`/`format1`/`format1u`/`format5`/`formatarl` command handlers. The
//! `I`-suffixed inverted forms and F1c/F2/F3/SETEMIT/FOR/CALL — absent from
//! that reference snapshot — follow the field widths spec.md gives (the
//! 12-bit jump-target field at bits 10..21, shared with [`crate::blocks`]'s
//! backpatchers) and otherwise use a packing chosen for this crate; nothing
//! reads the container back; see DESIGN.md.

use crate::schema::{Condition, Opcode};

fn opcode_field(opcode: Opcode) -> u32 {
    u32::from(u8::from(opcode)) << 26
}

/// `NOP`/`END`/`EMIT`: no operands.
#[must_use]
pub fn f0(opcode: Opcode) -> u32 {
    opcode_field(opcode)
}

/// `dst, src1(wide,+idx), src2(narrow)`. `idx` is 0 when no index register
/// was named. `inverted` selects the `I`-suffixed shifted layout.
#[must_use]
pub fn f1(opcode: Opcode, opdesc: u32, dst: u8, src1: u8, src1_idx: u8, src2: u8, inverted: bool) -> u32 {
    let src1_shift = if inverted { 14 } else { 12 };
    opcode_field(opcode)
        | opdesc
        | (u32::from(src2) << 7)
        | (u32::from(src1) << src1_shift)
        | (u32::from(src1_idx) << 19)
        | (u32::from(dst) << 21)
}

/// `dst, src1(wide,+idx)`.
#[must_use]
pub fn f1u(opcode: Opcode, opdesc: u32, dst: u8, src1: u8, src1_idx: u8) -> u32 {
    opcode_field(opcode) | opdesc | (u32::from(src1) << 12) | (u32::from(src1_idx) << 19) | (u32::from(dst) << 21)
}

/// `CMP`: `src1, cmpX, cmpY, src2`. No destination register; the two
/// comparison results feed `cmp.x`/`cmp.y`.
#[must_use]
pub fn f1c(opcode: Opcode, opdesc: u32, src1: u8, src2: u8, cmp_x: Condition, cmp_y: Condition) -> u32 {
    opcode_field(opcode)
        | opdesc
        | (u32::from(src2) << 7)
        | (u32::from(src1) << 12)
        | (u32::from(u8::from(cmp_y)) << 19)
        | (u32::from(u8::from(cmp_x)) << 22)
}

/// A `cmp.x [op] cmp.y` condition expression: `!cmp.x && cmp.y`, a bare
/// `cmp.x` (implicit `|| true`), etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy)]
pub struct CondExpr {
    pub negate_x: bool,
    pub negate_y: bool,
    pub uses_y: bool,
    pub combinator: Combinator,
}

/// `BREAKC/CALLC/JMPC/IFC`: conditional on `cmp.x`/`cmp.y`. `target` is the
/// 12-bit jump/call field at bits 10..21, shared with [`crate::blocks`].
#[must_use]
pub fn f2(opcode: Opcode, cond: CondExpr, target: u32) -> u32 {
    let combinator_bit = u32::from(cond.combinator == Combinator::And);
    opcode_field(opcode)
        | ((target & 0xFFF) << 10)
        | (u32::from(cond.negate_x) << 22)
        | (u32::from(cond.negate_y) << 23)
        | (combinator_bit << 24)
        | (u32::from(cond.uses_y) << 25)
}

/// `CALLU/JMPU/IFU`: conditional on a boolean uniform. `negate` is only ever
/// set for `JMPU`.
#[must_use]
pub fn f3(opcode: Opcode, bool_index: u8, negate: bool, target: u32) -> u32 {
    opcode_field(opcode) | ((target & 0xFFF) << 10) | (u32::from(bool_index) << 19) | (u32::from(negate) << 23)
}

/// `MAD/MADI`: `dst, src1(wide), src2(wide), src3(narrow)`. The 7+7 bits
/// spent on src1/src2 leave nothing for an index register on either one,
/// unlike every other format here — see DESIGN.md. Opcode occupies only the
/// top 3 bits (bits 29..31); the OPDESC index is limited to 5 bits
/// (`opdesc::MAD_LIMIT`).
#[must_use]
pub fn f5(opcode: Opcode, opdesc: u32, dst: u8, src1: u8, src2: u8, src3: u8) -> u32 {
    debug_assert!(opdesc < 32, "MAD opdesc index must fit 5 bits");
    opcode_field(opcode)
        | opdesc
        | (u32::from(src3) << 5)
        | (u32::from(src2) << 10)
        | (u32::from(src1) << 17)
        | (u32::from(dst) << 24)
}

/// Which of `a0`/`a1` a `MOVA` targets.
#[derive(Debug, Clone, Copy)]
pub struct MovaDest {
    pub a0: bool,
    pub a1: bool,
}

/// `MOVA a0|a1|a01, src1`.
#[must_use]
pub fn mova(opcode: Opcode, opdesc: u32, dest: MovaDest, src1: u8, src1_idx: u8) -> u32 {
    let dest_mask = u32::from(dest.a0) | (u32::from(dest.a1) << 1);
    opcode_field(opcode) | opdesc | (u32::from(src1) << 12) | (u32::from(src1_idx) << 19) | (dest_mask << 21)
}

/// `SETEMIT vtxId, [prim] [inv]`.
#[must_use]
pub fn setemit(opcode: Opcode, vertex_id: u8, primitive: bool, invert: bool) -> u32 {
    opcode_field(opcode) | u32::from(vertex_id & 0x3) | (u32::from(primitive) << 2) | (u32::from(invert) << 3)
}

/// `FOR ivec_uniform`: `target` is patched at `.end` to `curPos - 1`.
#[must_use]
pub fn for_loop(opcode: Opcode, ivec_index: u8, target: u32) -> u32 {
    opcode_field(opcode) | ((target & 0xFFF) << 10) | (u32::from(ivec_index) << 22)
}

/// Unconditional `CALL name`: the placeholder word a `procReloc` later patches
/// via `inst = (inst & !0x3FFFFF) | size | (start << 10)`.
#[must_use]
pub fn call_placeholder(opcode: Opcode) -> u32 {
    opcode_field(opcode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f0_only_sets_opcode_field() {
        assert_eq!(f0(Opcode::Nop), u32::from(u8::from(Opcode::Nop)) << 26);
    }

    #[test]
    fn f1_noninverted_field_positions() {
        let word = f1(Opcode::Add, 0x05, 0x1, 0x22, 0x2, 0x03, false);
        assert_eq!(word & 0x7F, 0x05);
        assert_eq!((word >> 7) & 0x1F, 0x03);
        assert_eq!((word >> 12) & 0x7F, 0x22);
        assert_eq!((word >> 19) & 0x3, 0x2);
        assert_eq!((word >> 21) & 0x1F, 0x1);
        assert_eq!(word >> 26, u32::from(u8::from(Opcode::Add)));
    }

    #[test]
    fn f1_inverted_shifts_src1_to_bit14() {
        let word = f1(Opcode::DphI, 0, 0, 0x3F, 0, 0x01, true);
        assert_eq!((word >> 14) & 0x7F, 0x3F);
    }

    #[test]
    fn f5_opdesc_bound_to_five_bits() {
        let word = f5(Opcode::Mad, 31, 0x1F, 0x1F, 0x7F, 0x1F);
        assert_eq!(word & 0x1F, 31);
        assert_eq!((word >> 29) & 0x7, u32::from(u8::from(Opcode::Mad)) >> 3);
    }

    #[test]
    fn for_loop_uses_shared_target_field() {
        let word = for_loop(Opcode::For, 2, 0);
        assert_eq!((word >> 22) & 0x3, 2);
        let mut patched = word;
        crate::blocks::patch_for_target(&mut patched, 0x123);
        assert_eq!((patched >> 10) & 0xFFF, 0x123);
    }
}
