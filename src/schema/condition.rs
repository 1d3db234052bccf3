use num_enum::{IntoPrimitive, TryFromPrimitive};

/// `cmp.x`/`cmp.y` condition codes, from `picasso.h`'s `COND_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Condition {
    Eq = 0,
    Ne = 1,
    Lt = 2,
    Le = 3,
    Gt = 4,
    Ge = 5,
}

impl Condition {
    #[must_use]
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "lt" => Some(Self::Lt),
            "le" => Some(Self::Le),
            "gt" => Some(Self::Gt),
            "ge" => Some(Self::Ge),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_mnemonic_known_and_unknown() {
        assert_eq!(Condition::from_mnemonic("eq"), Some(Condition::Eq));
        assert_eq!(Condition::from_mnemonic("ge"), Some(Condition::Ge));
        assert_eq!(Condition::from_mnemonic("xx"), None);
    }

    #[test]
    fn values_match_picasso_header() {
        assert_eq!(u8::from(Condition::Eq), 0);
        assert_eq!(u8::from(Condition::Ge), 5);
    }
}
