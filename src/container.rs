//! Bit-exact DVLB/DVLP/DVLE serialization. Little-endian throughout. Offsets
//! recorded inside a DVLE are relative to that DVLE's own start, matching the
//! on-disk SHBIN convention the reference emitter produces.

use crate::error::Result;
use crate::f24;
use crate::opdesc::Pool;
use crate::schema::GshType;
use crate::symbols::{Constant, ConstantValue, Output, Uniform, UniformType};
use crate::ByteSink;

/// One shader module's full DVLE record.
#[derive(Debug, Clone)]
pub struct Module {
    pub entrypoint_name: String,
    pub entry_start: u32,
    pub entry_end: u32,
    pub nodvle: bool,
    pub is_geoshader: bool,
    pub is_merge: bool,
    pub input_mask: u16,
    pub output_mask: u16,
    pub gsh_type: GshType,
    pub gsh_fixed_start: u8,
    pub gsh_variable_num: u8,
    pub gsh_fixed_num: u8,
    pub uniforms: Vec<Uniform>,
    pub constants: Vec<Constant>,
    pub outputs: Vec<Output>,
}

fn w_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}
fn w_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn w_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn w_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn w_magic(buf: &mut Vec<u8>, magic: &[u8; 4]) {
    buf.extend_from_slice(magic);
}

/// Remap an in-memory uniform position to its on-disk DVLE value: every
/// uniform class starts at or above `0x20`, so `pos -= 0x10` applies
/// unconditionally (see `original_source/picasso_frontend.cpp`'s emitter
/// loop; `DESIGN.md` records this resolving spec.md's open question).
fn remap_uniform_pos(pos: u16) -> u16 {
    if pos >= 0x20 {
        pos - 0x10
    } else {
        pos
    }
}

fn class_base(ty: UniformType) -> u16 {
    match ty {
        UniformType::Fvec => 0x20,
        UniformType::Ivec => 0x80,
        UniformType::Bool => 0x88,
    }
}

fn serialize_constants(constants: &[Constant]) -> Vec<u8> {
    let mut buf = Vec::new();
    for c in constants {
        let (ty_tag, reg_class_base): (u16, u16) = match c.value {
            ConstantValue::FVec(_) => (0, class_base(UniformType::Fvec)),
            ConstantValue::IVec(_) => (1, class_base(UniformType::Ivec)),
            ConstantValue::Bool(_) => (2, class_base(UniformType::Bool)),
        };
        w_u16(&mut buf, ty_tag);
        w_u16(&mut buf, u16::from(c.reg_id) - reg_class_base);

        let payload_start = buf.len();
        match &c.value {
            ConstantValue::FVec(v) => {
                for f in v {
                    w_u32(&mut buf, f24::encode(*f));
                }
            }
            ConstantValue::IVec(v) => {
                buf.extend_from_slice(v);
            }
            ConstantValue::Bool(b) => {
                w_u32(&mut buf, u32::from(*b));
            }
        }
        buf.resize(payload_start + 16, 0);
    }
    buf
}

fn serialize_outputs(outputs: &[Output]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (i, out) in outputs.iter().enumerate() {
        let ty = u64::from(u8::from(out.kind));
        let reg = u64::from(out.register);
        let mask = u64::from(out.mask);
        let _ = i;
        w_u64(&mut buf, ty | (reg << 16) | (mask << 32));
    }
    buf
}

/// Uniforms must be sorted by position before serialization (spec.md's
/// determinism requirement); the symbol blob is built alongside so each
/// uniform record's name offset is known.
fn serialize_uniforms(uniforms: &[Uniform]) -> (Vec<u8>, Vec<u8>) {
    let mut sorted: Vec<&Uniform> = uniforms.iter().collect();
    sorted.sort_by_key(|u| u.position);

    let mut symbol_blob = Vec::new();
    let mut uniform_blob = Vec::new();
    for u in &sorted {
        let name_offset = symbol_blob.len() as u32;
        push_symbol_name(&mut symbol_blob, &u.name);

        let pos = remap_uniform_pos(u.position);
        w_u32(&mut uniform_blob, name_offset);
        w_u16(&mut uniform_blob, pos);
        w_u16(&mut uniform_blob, pos + u.size - 1);
    }
    (uniform_blob, symbol_blob)
}

/// `$` in identifiers is written out as `.` in the symbol blob, matching the
/// reference emitter's name-mangling convention for register-indexed arrays.
fn push_symbol_name(buf: &mut Vec<u8>, name: &str) {
    for byte in name.bytes() {
        buf.push(if byte == b'$' { b'.' } else { byte });
    }
    buf.push(0);
}

fn pad4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

fn serialize_dvle(module: &Module) -> Vec<u8> {
    let constants = serialize_constants(&module.constants);
    let outputs = serialize_outputs(&module.outputs);
    let (uniforms, mut symbols) = serialize_uniforms(&module.uniforms);
    pad4(&mut symbols);

    const HEADER_LEN: u32 = 64;
    let constants_off = HEADER_LEN;
    let outputs_off = constants_off + constants.len() as u32;
    let uniforms_off = outputs_off + outputs.len() as u32;
    let symbols_off = uniforms_off + uniforms.len() as u32;

    let mut buf = Vec::new();
    w_magic(&mut buf, b"DVLE");
    w_u16(&mut buf, 0x1002);
    w_u8(&mut buf, u8::from(module.is_geoshader));
    w_u8(&mut buf, u8::from(module.is_merge));
    w_u32(&mut buf, module.entry_start);
    w_u32(&mut buf, module.entry_end);
    w_u16(&mut buf, module.input_mask);
    w_u16(&mut buf, module.output_mask);
    w_u8(&mut buf, u8::from(module.gsh_type));
    w_u8(&mut buf, module.gsh_fixed_start);
    w_u8(&mut buf, module.gsh_variable_num);
    w_u8(&mut buf, module.gsh_fixed_num);
    w_u32(&mut buf, constants_off);
    w_u32(&mut buf, module.constants.len() as u32);
    w_u32(&mut buf, 0); // label-table offset: unused, see open question (a)
    w_u32(&mut buf, 0); // label-table count: always 0
    w_u32(&mut buf, outputs_off);
    w_u32(&mut buf, module.outputs.len() as u32);
    w_u32(&mut buf, uniforms_off);
    w_u32(&mut buf, module.uniforms.len() as u32);
    w_u32(&mut buf, symbols_off);
    w_u32(&mut buf, symbols.len() as u32);
    debug_assert_eq!(buf.len() as u32, HEADER_LEN);

    buf.extend_from_slice(&constants);
    buf.extend_from_slice(&outputs);
    buf.extend_from_slice(&uniforms);
    buf.extend_from_slice(&symbols);
    pad4(&mut buf);
    buf
}

/// Assemble the whole DVLB+DVLP+DVLE(s) container and write it through
/// `sink`. `modules` must already have `nodvle` entries filtered out by the
/// caller if they shouldn't be emitted; their code still contributes to the
/// shared DVLP code blob regardless.
pub fn write_shbin(sink: &mut dyn ByteSink, code: &[u32], opdescs: &Pool, modules: &[Module]) -> Result<()> {
    let dvle_blobs: Vec<Vec<u8>> = modules.iter().map(serialize_dvle).collect();

    let dvlb_header_len = 4 + 4 + 4 * dvle_blobs.len();
    let dvlp_header_len = 40usize;
    let code_bytes = code.len() * 4;
    let opdesc_bytes = opdescs.len() * 8;
    let dvlp_len = dvlp_header_len + code_bytes + opdesc_bytes;

    let mut dvle_offsets = Vec::with_capacity(dvle_blobs.len());
    let mut cursor = dvlb_header_len + dvlp_len;
    for blob in &dvle_blobs {
        dvle_offsets.push(cursor as u32);
        cursor += blob.len();
    }

    let mut out = Vec::with_capacity(cursor);
    w_magic(&mut out, b"DVLB");
    w_u32(&mut out, dvle_blobs.len() as u32);
    for off in &dvle_offsets {
        w_u32(&mut out, *off);
    }

    let opdesc_offset = (dvlp_header_len + code_bytes) as u32;
    let sym_offset = opdesc_offset + opdesc_bytes as u32;
    w_magic(&mut out, b"DVLP");
    w_u32(&mut out, 0); // version
    w_u32(&mut out, dvlp_header_len as u32); // offset to code
    w_u32(&mut out, code.len() as u32);
    w_u32(&mut out, opdesc_offset);
    w_u32(&mut out, opdescs.len() as u32);
    w_u32(&mut out, sym_offset); // empty symtable
    w_u32(&mut out, 0);
    w_u32(&mut out, 0);
    w_u32(&mut out, 0);

    for word in code {
        w_u32(&mut out, *word);
    }
    for i in 0..opdescs.len() {
        w_u64(&mut out, u64::from(opdescs.value(i)));
    }

    for blob in &dvle_blobs {
        out.extend_from_slice(blob);
    }

    sink.write_bytes(&out).map_err(|e| crate::error::AssembleError::Structure {
        file: "<output>".to_string(),
        line: 0,
        message: format!("failed to write SHBIN output: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::OutputKind;

    struct VecSink(Vec<u8>);
    impl ByteSink for VecSink {
        fn write_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            self.0.extend_from_slice(bytes);
            Ok(())
        }
    }

    fn sample_module() -> Module {
        Module {
            entrypoint_name: "main".to_string(),
            entry_start: 0,
            entry_end: 2,
            nodvle: false,
            is_geoshader: false,
            is_merge: false,
            input_mask: 0,
            output_mask: 1,
            gsh_type: GshType::Point,
            gsh_fixed_start: 0,
            gsh_variable_num: 0,
            gsh_fixed_num: 0,
            uniforms: Vec::new(),
            constants: Vec::new(),
            outputs: vec![Output {
                kind: OutputKind::Position,
                register: 0,
                mask: 0xF,
            }],
        }
    }

    #[test]
    fn smoke_container_has_dvlb_dvlp_dvle_magics() {
        let module = sample_module();
        let code = vec![0x0840_0000u32, 0x0880_0000u32]; // nop, end placeholders
        let pool = Pool::new();
        let mut sink = VecSink(Vec::new());
        write_shbin(&mut sink, &code, &pool, &[module]).unwrap();
        assert_eq!(&sink.0[0..4], b"DVLB");
        let dvle_off = u32::from_le_bytes(sink.0[8..12].try_into().unwrap()) as usize;
        assert_eq!(&sink.0[dvle_off..dvle_off + 4], b"DVLE");
        let dvlp_off = 4 + 4 + 4; // magic + count + one offset entry
        assert_eq!(&sink.0[dvlp_off..dvlp_off + 4], b"DVLP");
    }

    #[test]
    fn remap_applies_uniformly_above_0x20() {
        assert_eq!(remap_uniform_pos(0x20), 0x10);
        assert_eq!(remap_uniform_pos(0x80), 0x70);
        assert_eq!(remap_uniform_pos(0x88), 0x78);
        assert_eq!(remap_uniform_pos(0x0F), 0x0F);
    }

    #[test]
    fn uniform_blob_sorted_by_position() {
        let uniforms = vec![
            Uniform {
                name: "b".into(),
                position: 0x30,
                size: 1,
                ty: UniformType::Fvec,
            },
            Uniform {
                name: "a".into(),
                position: 0x20,
                size: 1,
                ty: UniformType::Fvec,
            },
        ];
        let (blob, symbols) = serialize_uniforms(&uniforms);
        assert_eq!(blob.len(), 16);
        let first_name_off = u32::from_le_bytes(blob[0..4].try_into().unwrap());
        assert_eq!(first_name_off, 0);
        assert_eq!(&symbols[0..2], b"a\0");
    }

    #[test]
    fn dollar_sign_mangled_to_dot_in_symbol_blob() {
        let mut buf = Vec::new();
        push_symbol_name(&mut buf, "arr$0");
        assert_eq!(&buf, b"arr.0\0");
    }
}
