//! End-to-end tests driving the public `Assembler` API the way a CLI
//! frontend would: read source text, assemble one or more files, link, and
//! inspect the resulting SHBIN bytes.

use picasso_asm::{Assembler, AssemblerOptions, ByteSink};

struct VecSink(Vec<u8>);

impl ByteSink for VecSink {
    fn write_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.0.extend_from_slice(bytes);
        Ok(())
    }
}

fn dvle_count(shbin: &[u8]) -> u32 {
    u32::from_le_bytes(shbin[4..8].try_into().unwrap())
}

#[test]
fn smoke_source_links_to_one_dvle() {
    let source = "\
.fvec projection[4]
.proc main
.in in_pos v0
.out out_pos pos
mov r0, v0
mul r0, projection, r0
end
.end
";
    let mut assembler = Assembler::new(AssemblerOptions::default());
    assembler.assemble_file(source, "smoke.vsh").unwrap();

    let mut sink = VecSink(Vec::new());
    assembler.finish(&mut sink).unwrap();

    assert_eq!(&sink.0[0..4], b"DVLB");
    assert_eq!(dvle_count(&sink.0), 1);

    let header = assembler.generate_header();
    assert!(header.contains("#pragma once"));
    assert!(header.contains("VSH_FVEC_projection"));
    assert!(header.contains("VSH_ULEN_projection 4"));
}

#[test]
fn two_files_sharing_a_uniform_link_into_two_dvles() {
    let a = "\
.fvec shared
.proc main
mov r0, shared
end
.end
";
    let b = "\
.fvec shared
.proc main
mov r0, shared
end
.end
";
    let mut assembler = Assembler::new(AssemblerOptions::default());
    assembler.assemble_file(a, "a.vsh").unwrap();
    assembler.assemble_file(b, "b.vsh").unwrap();

    let mut sink = VecSink(Vec::new());
    assembler.finish(&mut sink).unwrap();
    assert_eq!(dvle_count(&sink.0), 2);
}

#[test]
fn nodvle_module_is_excluded_from_output_but_still_resolves_calls() {
    let lib = "\
.nodvle
.entry helper
.proc helper
mov r0, v0
end
.end
";
    let main = "\
.proc main
call helper
end
.end
";
    let mut assembler = Assembler::new(AssemblerOptions::default());
    assembler.assemble_file(lib, "lib.vsh").unwrap();
    assembler.assemble_file(main, "main.vsh").unwrap();

    let mut sink = VecSink(Vec::new());
    assembler.finish(&mut sink).unwrap();
    assert_eq!(dvle_count(&sink.0), 1);
}

#[test]
fn unknown_instruction_is_a_lex_error_and_aborts_cleanly() {
    let mut assembler = Assembler::new(AssemblerOptions::default());
    let err = assembler
        .assemble_file(".proc main\nbogus r0, r1\nend\n.end\n", "bad.vsh")
        .unwrap_err();
    assert!(err.to_string().contains("bad.vsh"));
}

#[test]
fn no_nop_option_still_produces_valid_output_with_a_warning() {
    let source = "\
.proc main
ifc cmp.x
jmpc cmp.y, done
.end
done: nop
end
.end
";
    let mut assembler = Assembler::new(AssemblerOptions { auto_nop: false });
    assembler.assemble_file(source, "warn.vsh").unwrap();
    let mut sink = VecSink(Vec::new());
    assembler.finish(&mut sink).unwrap();
    assert_eq!(&sink.0[0..4], b"DVLB");
}
