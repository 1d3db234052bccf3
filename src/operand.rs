//! Register and swizzle parsing (`.xyzw`/`.rgba`/`.stpq`, negation, `[offset]`
//! and `[idxreg]`/`[idxreg+offset]` indirection), and the alias table entries
//! that reuse the same packed representation.
//!
//! Bit layout ported from `picasso.h`'s `SWIZZLE_COMP`/`OPSRC_MAKE` macros:
//! a source operand field is 9 bits, bit 0 is negation, bits 1..8 hold four
//! 2-bit component selectors (component 0 in the high pair, component 3 in
//! the low pair).

use crate::error::{AssembleError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    X = 0,
    Y = 1,
    Z = 2,
    W = 3,
}

impl Component {
    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'x' | 'r' | 's' => Some(Self::X),
            'y' | 'g' | 't' => Some(Self::Y),
            'z' | 'b' | 'p' => Some(Self::Z),
            'w' | 'a' | 'q' => Some(Self::W),
            _ => None,
        }
    }
}

/// A packed 4-component swizzle selector (no negation bit): bits 7..6 select
/// the source read for output component 0, bits 1..0 select it for component
/// 3, matching `SWIZZLE_COMP(n, v) = v << (6 - n*2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swizzle(pub u8);

impl Swizzle {
    pub const IDENTITY: Swizzle = Swizzle(0b00_01_10_11);

    /// Parse a `.xyzw`-family suffix (1-4 letters from one of the three
    /// component alphabets). Missing trailing components replicate the last
    /// one given, matching `parseSwizzling`.
    pub fn parse(text: &str) -> Option<Swizzle> {
        if text.is_empty() || text.len() > 4 {
            return None;
        }
        let mut packed = 0u8;
        let mut last = Component::X;
        let mut n = 0usize;
        for ch in text.chars() {
            let comp = Component::from_char(ch)?;
            packed |= (comp as u8) << (6 - n * 2);
            last = comp;
            n += 1;
        }
        for j in n..4 {
            packed |= (last as u8) << (6 - j * 2);
        }
        Some(Swizzle(packed))
    }

    fn component(self, slot: usize) -> u8 {
        (self.0 >> (6 - slot * 2)) & 0b11
    }

    /// The 4-bit "which destination components does this swizzle read"
    /// mask, per `maskFromSwizzling`: bit `3 - comp` is set for each distinct
    /// component value selected.
    #[must_use]
    pub fn read_mask(self) -> u8 {
        let mut out = 0u8;
        for slot in 0..4 {
            out |= 1 << (3 - self.component(slot));
        }
        out
    }

    /// Apply `self` *through* `base`: pick, for every output slot, the
    /// component `base` selects at the position `self` names. This is the
    /// alias-composition rule: the alias's swizzle applies first, then the
    /// call site's swizzle indexes into it.
    #[must_use]
    pub fn compose(self, base: Swizzle) -> Swizzle {
        let mut packed = 0u8;
        for slot in 0..4 {
            let picked = base.component(self.component(slot) as usize);
            packed |= picked << (6 - slot * 2);
        }
        Swizzle(packed)
    }
}

impl Default for Swizzle {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A fully-resolved source/dest operand: a flat register index, its swizzle,
/// and whether it's negated. Packs into the 9-bit OPSRC field with
/// [`Operand::opsrc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub index: u8,
    pub swizzle: Swizzle,
    pub negate: bool,
}

impl Operand {
    #[must_use]
    pub fn opsrc(self) -> u16 {
        u16::from(self.negate) | (u16::from(self.swizzle.0) << 1)
    }
}

/// An alias table entry: packs `(register_index, negate, swizzle)` into the
/// 17 bits spec.md's data model names (8 bits index, 1 bit negation, 8 bits
/// swizzle).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasEntry {
    pub index: u8,
    pub swizzle: Swizzle,
    pub negate: bool,
}

impl From<Operand> for AliasEntry {
    fn from(op: Operand) -> Self {
        AliasEntry {
            index: op.index,
            swizzle: op.swizzle,
            negate: op.negate,
        }
    }
}

/// Which hardware-reserved index register an operand's `[...]` suffix names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexRegister {
    A0 = 1,
    A1 = 2,
    /// `a2`/`lcnt` alias to the same hardware slot.
    A2 = 3,
}

impl IndexRegister {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "a0" => Some(Self::A0),
            "a1" => Some(Self::A1),
            "a2" | "lcnt" => Some(Self::A2),
            _ => None,
        }
    }
}

/// The five addressable register classes, with their flat 8-bit ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterClass {
    /// `v0..v15` / `o0..o15`, disambiguated by call-site direction, not range.
    InputOutput,
    Temp,
    Fvec,
    Ivec,
    Bool,
}

impl RegisterClass {
    fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_lowercase() {
            'v' | 'o' => Some(Self::InputOutput),
            'r' => Some(Self::Temp),
            'c' => Some(Self::Fvec),
            'i' => Some(Self::Ivec),
            'b' => Some(Self::Bool),
            _ => None,
        }
    }

    #[must_use]
    pub fn base(self) -> u16 {
        match self {
            Self::InputOutput => 0x00,
            Self::Temp => 0x10,
            Self::Fvec => 0x20,
            Self::Ivec => 0x80,
            Self::Bool => 0x88,
        }
    }

    #[must_use]
    pub fn count(self) -> u16 {
        match self {
            Self::InputOutput => 16,
            Self::Temp => 16,
            Self::Fvec => 96,
            Self::Ivec => 4,
            Self::Bool => 16,
        }
    }
}

fn lex_err(file: &str, line: u32, message: impl Into<String>) -> AssembleError {
    AssembleError::Lex {
        file: file.to_string(),
        line,
        message: message.into(),
    }
}

fn range_err(file: &str, line: u32, message: impl Into<String>) -> AssembleError {
    AssembleError::Range {
        file: file.to_string(),
        line,
        message: message.into(),
    }
}

/// Parse a bare (non-aliased) register token's letter+digits base, without
/// any `[...]`/`.swizzle`/`-` decoration, returning its flat index.
fn parse_bare_register(token: &str, file: &str, line: u32) -> Result<(RegisterClass, u8)> {
    let mut chars = token.chars();
    let letter = chars
        .next()
        .ok_or_else(|| lex_err(file, line, "empty register token"))?;
    let class = RegisterClass::from_letter(letter)
        .ok_or_else(|| lex_err(file, line, format!("invalid register: {token}")))?;
    let digits = chars.as_str();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(lex_err(file, line, format!("invalid register: {token}")));
    }
    let n: u32 = digits
        .parse()
        .map_err(|_| range_err(file, line, format!("register number out of range: {token}")))?;
    if n >= u32::from(class.count()) {
        return Err(range_err(file, line, format!("register out of class range: {token}")));
    }
    Ok((class, class.base() as u8 + n as u8))
}

/// The parsed shape of an operand token, before alias/offset resolution.
struct Parts<'a> {
    negate: bool,
    base: &'a str,
    swizzle: Option<&'a str>,
    bracket: Option<&'a str>,
}

fn split_operand(token: &str) -> Parts<'_> {
    let (negate, rest) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let (before_bracket, bracket) = match rest.split_once('[') {
        Some((head, tail)) => (head, tail.strip_suffix(']')),
        None => (rest, None),
    };
    let (base, swizzle) = match before_bracket.split_once('.') {
        Some((base, sw)) => (base, Some(sw)),
        None => (before_bracket, None),
    };
    Parts {
        negate,
        base,
        swizzle,
        bracket,
    }
}

/// Resolve a `[...]` suffix into an optional index register and integer
/// offset, per `parseReg`'s bracket-content grammar: a bare index register
/// name, an index register plus `+offset`, or a bare integer offset.
fn parse_bracket(
    content: &str,
    allow_index: bool,
    file: &str,
    line: u32,
) -> Result<(Option<IndexRegister>, i32)> {
    let content = content.trim();
    if let Some(idx) = IndexRegister::from_name(content) {
        if !allow_index {
            return Err(lex_err(file, line, format!("index register not allowed here: {content}")));
        }
        return Ok((Some(idx), 0));
    }
    if let Some((reg_part, off_part)) = content.split_once('+') {
        let reg_part = reg_part.trim();
        let off_part = off_part.trim();
        let idx = IndexRegister::from_name(reg_part)
            .ok_or_else(|| lex_err(file, line, format!("invalid index register: {reg_part}")))?;
        if !allow_index {
            return Err(lex_err(file, line, format!("index register not allowed here: {reg_part}")));
        }
        let offset: i32 = off_part
            .parse()
            .map_err(|_| lex_err(file, line, format!("invalid register offset: {off_part}")))?;
        return Ok((Some(idx), offset));
    }
    let offset: i32 = content
        .parse()
        .map_err(|_| lex_err(file, line, format!("invalid register offset: {content}")))?;
    if offset < 0 {
        return Err(range_err(file, line, format!("invalid register offset: {content}")));
    }
    Ok((None, offset))
}

/// Parse an operand token against the alias table, producing the resolved
/// operand and (when `allow_index` is set) any `[idxreg]`/`[idxreg+off]`
/// index register it named.
pub fn parse(
    token: &str,
    aliases: &indexmap::IndexMap<String, AliasEntry>,
    allow_index: bool,
    file: &str,
    line: u32,
) -> Result<(Operand, Option<IndexRegister>)> {
    let parts = split_operand(token);

    let site_swizzle = match parts.swizzle {
        Some(text) => {
            Swizzle::parse(text).ok_or_else(|| lex_err(file, line, format!("invalid swizzling mask: {text}")))?
        }
        None => Swizzle::IDENTITY,
    };

    let (idx_reg, offset) = match parts.bracket {
        Some(content) => parse_bracket(content, allow_index, file, line)?,
        None => (None, 0),
    };

    if let Some(alias) = aliases.get(parts.base) {
        let index = alias
            .index
            .checked_add(offset as u8)
            .ok_or_else(|| range_err(file, line, format!("register offset out of range: {token}")))?;
        let negate = parts.negate ^ alias.negate;
        let swizzle = match parts.swizzle {
            Some(_) => site_swizzle.compose(alias.swizzle),
            None => alias.swizzle,
        };
        return Ok((
            Operand {
                index,
                swizzle,
                negate,
            },
            idx_reg,
        ));
    }

    let (_, base_index) = parse_bare_register(parts.base, file, line)?;
    let index = base_index
        .checked_add(offset.max(0) as u8)
        .ok_or_else(|| range_err(file, line, format!("register offset out of range: {token}")))?;

    Ok((
        Operand {
            index,
            swizzle: site_swizzle,
            negate: parts.negate,
        },
        idx_reg,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_aliases() -> indexmap::IndexMap<String, AliasEntry> {
        indexmap::IndexMap::new()
    }

    #[test]
    fn parses_bare_temp_register() {
        let (op, idx) = parse("r3", &empty_aliases(), false, "t", 1).unwrap();
        assert_eq!(op.index, 0x13);
        assert_eq!(op.swizzle, Swizzle::IDENTITY);
        assert!(!op.negate);
        assert!(idx.is_none());
    }

    #[test]
    fn parses_negation_and_swizzle() {
        let (op, _) = parse("-c4.xxyy", &empty_aliases(), false, "t", 1).unwrap();
        assert_eq!(op.index, 0x24);
        assert!(op.negate);
        assert_eq!(op.swizzle.read_mask(), 0b1100);
    }

    #[test]
    fn swizzle_fills_missing_components() {
        let sw = Swizzle::parse("x").unwrap();
        assert_eq!(sw, Swizzle::parse("xxxx").unwrap());
    }

    #[test]
    fn rejects_out_of_range_register() {
        let err = parse("r99", &empty_aliases(), false, "t", 1).unwrap_err();
        assert!(matches!(err, AssembleError::Range { .. }));
    }

    #[test]
    fn index_register_rejected_when_not_allowed() {
        let err = parse("c0[a0]", &empty_aliases(), false, "t", 1).unwrap_err();
        assert!(matches!(err, AssembleError::Lex { .. }));
    }

    #[test]
    fn index_register_with_offset() {
        let (_, idx) = parse("c0[a0+3]", &empty_aliases(), true, "t", 1).unwrap();
        assert_eq!(idx, Some(IndexRegister::A0));
    }

    #[test]
    fn alias_composes_swizzle_and_negation() {
        let mut aliases = empty_aliases();
        aliases.insert(
            "myreg".to_string(),
            AliasEntry {
                index: 0x20,
                swizzle: Swizzle::parse("yyzz").unwrap(),
                negate: true,
            },
        );
        let (op2, _) = parse("-myreg.xy", &aliases, false, "t", 1).unwrap();
        assert_eq!(op2.index, 0x20);
        // site negation (true) XOR alias negation (true) = false
        assert!(!op2.negate);
    }
}
