//! Generates the optional companion C header: `#define`s for each exported
//! (non-`_`-prefixed) global uniform. Grounded directly on
//! `picasso_frontend.cpp`'s header-emission loop. File writing is the
//! driver's concern; this returns a `String`.

use std::fmt::Write as _;

use crate::symbols::{Uniform, UniformType};

/// Build the header text for the global uniform table. `prefix` is `"GSH"`
/// when the first DVLE is a geometry shader, else `"VSH"`.
#[must_use]
pub fn generate(prefix: &str, uniforms: &[Uniform]) -> String {
    let mut out = String::new();
    out.push_str("#pragma once\n\n");
    for u in uniforms {
        if u.name.starts_with('_') {
            continue;
        }
        match u.ty {
            UniformType::Fvec => {
                let _ = writeln!(out, "#define {prefix}_FVEC_{} 0x{:02X}", u.name, u.position - 0x20);
            }
            UniformType::Ivec => {
                let _ = writeln!(out, "#define {prefix}_IVEC_{} 0x{:02X}", u.name, u.position - 0x80);
            }
            UniformType::Bool => {
                let bit = u.position - 0x88;
                if u.size == 1 {
                    let _ = writeln!(out, "#define {prefix}_FLAG_{} BIT({bit})", u.name);
                } else {
                    let _ = writeln!(out, "#define {prefix}_FLAG_{}(_n) BIT({bit}+(_n))", u.name);
                }
            }
        }
        let _ = writeln!(out, "#define {prefix}_ULEN_{} {}", u.name, u.size);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_uniforms_are_skipped() {
        let uniforms = vec![Uniform {
            name: "_hidden".into(),
            position: 0x20,
            size: 1,
            ty: UniformType::Fvec,
        }];
        let text = generate("VSH", &uniforms);
        assert!(!text.contains("_hidden"));
    }

    #[test]
    fn fvec_and_bool_array_macros() {
        let uniforms = vec![
            Uniform {
                name: "proj".into(),
                position: 0x24,
                size: 4,
                ty: UniformType::Fvec,
            },
            Uniform {
                name: "flags".into(),
                position: 0x8A,
                size: 3,
                ty: UniformType::Bool,
            },
        ];
        let text = generate("VSH", &uniforms);
        assert!(text.contains("#define VSH_FVEC_proj 0x04"));
        assert!(text.contains("#define VSH_ULEN_proj 4"));
        assert!(text.contains("#define VSH_FLAG_flags(_n) BIT(2+(_n))"));
    }

    #[test]
    fn single_bool_uses_plain_bit_macro() {
        let uniforms = vec![Uniform {
            name: "solo".into(),
            position: 0x88,
            size: 1,
            ty: UniformType::Bool,
        }];
        let text = generate("GSH", &uniforms);
        assert!(text.contains("#define GSH_FLAG_solo BIT(0)"));
    }
}
