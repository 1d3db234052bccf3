use num_enum::{IntoPrimitive, TryFromPrimitive};

/// `.out` semantic kinds, from `picasso.h`'s `OUTTYPE_*` constants.
///
/// These select which fixed-function pipeline stage consumes an output
/// register; the numeric values are written into the DVLE output table and
/// must match what the rasterizer/vertex-fetch stages expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OutputKind {
    Position = 0,
    NormalQuat = 1,
    Color = 2,
    TexCoord0 = 3,
    TexCoord0W = 4,
    TexCoord1 = 5,
    TexCoord2 = 6,
    View = 8,
    Dummy = 9,
}

impl OutputKind {
    /// Parse a `.out` directive's semantic name (e.g. `position`, `color`,
    /// `texcoord0`). Returns `None` for an unrecognized name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "position" | "pos" => Some(Self::Position),
            "normalquat" | "quaternion" | "nquat" => Some(Self::NormalQuat),
            "color" | "clr" => Some(Self::Color),
            "texcoord0" | "tcoord0" => Some(Self::TexCoord0),
            "texcoord0w" | "tcoord0w" => Some(Self::TexCoord0W),
            "texcoord1" | "tcoord1" => Some(Self::TexCoord1),
            "texcoord2" | "tcoord2" => Some(Self::TexCoord2),
            "view" => Some(Self::View),
            "dummy" => Some(Self::Dummy),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_roundtrips_known_kinds() {
        assert_eq!(OutputKind::from_name("position"), Some(OutputKind::Position));
        assert_eq!(OutputKind::from_name("COLOR"), Some(OutputKind::Color));
        assert_eq!(OutputKind::from_name("clr"), Some(OutputKind::Color));
        assert_eq!(OutputKind::from_name("tcoord0w"), Some(OutputKind::TexCoord0W));
        assert_eq!(OutputKind::from_name("bogus"), None);
    }

    #[test]
    fn values_match_picasso_header() {
        assert_eq!(u8::from(OutputKind::Position), 0);
        assert_eq!(u8::from(OutputKind::View), 8);
        assert_eq!(u8::from(OutputKind::Dummy), 9);
    }

    #[test]
    fn try_from_rejects_unassigned_codes() {
        assert_eq!(OutputKind::try_from(0u8), Ok(OutputKind::Position));
        assert!(OutputKind::try_from(7u8).is_err());
    }
}
