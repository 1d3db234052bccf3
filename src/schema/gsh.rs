use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Geometry-shader submission mode, from `picasso.h`'s `GSHTYPE_*` constants.
/// Selects how the vertex shader hands input vertices to the geometry stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum GshType {
    Point = 0,
    Variable = 1,
    Fixed = 2,
}

impl GshType {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "point" => Some(Self::Point),
            "variable" => Some(Self::Variable),
            "fixed" => Some(Self::Fixed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_known_and_unknown() {
        assert_eq!(GshType::from_name("point"), Some(GshType::Point));
        assert_eq!(GshType::from_name("Fixed"), Some(GshType::Fixed));
        assert_eq!(GshType::from_name("other"), None);
    }
}
