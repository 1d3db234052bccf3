//! Command-line driver for the assembler: reads one or more source files,
//! links them into a single SHBIN, and optionally writes a companion C
//! header. Argument handling is intentionally plain, matching how small
//! reference assemblers parse their own argv — no argument-parsing crate.

use std::fs;
use std::io::Write as _;
use std::process::ExitCode;

use picasso_asm::{AssembleError, Assembler, AssemblerOptions, ByteSink};

const VERSION: &str = env!("CARGO_PKG_VERSION");

struct FileSink(fs::File);

impl ByteSink for FileSink {
    fn write_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.0.write_all(bytes)
    }
}

fn usage() {
    eprintln!("usage: asm-cli [-o out.shbin] [-h out.h] [-n] file...");
    eprintln!("  -o, --out=<file>     output SHBIN path (required)");
    eprintln!("  -h, --header=<file>  write a companion C header");
    eprintln!("  -n, --no-nop         disable automatic padding NOPs (warn instead)");
    eprintln!("  -v, --version        print version and exit");
    eprintln!("  -?, --help           print this message and exit");
}

/// Splits `--flag=value` into `Some(value)`, or returns `None` for a bare
/// `--flag`/`-f` whose value is the next argv token instead.
fn flag_value(arg: &str, long_prefix: &str) -> Option<String> {
    arg.strip_prefix(long_prefix).map(str::to_string)
}

fn main() -> ExitCode {
    env_logger::init();

    let mut out_path: Option<String> = None;
    let mut header_path: Option<String> = None;
    let mut auto_nop = true;
    let mut inputs = Vec::new();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut it = args.into_iter().peekable();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-v" | "--version" => {
                println!("asm-cli {VERSION}");
                return ExitCode::SUCCESS;
            }
            "-?" | "--help" => {
                usage();
                return ExitCode::SUCCESS;
            }
            "-n" | "--no-nop" => auto_nop = false,
            "-o" | "--out" => out_path = it.next(),
            "-h" | "--header" => header_path = it.next(),
            _ if flag_value(&arg, "--out=").is_some() => out_path = flag_value(&arg, "--out="),
            _ if flag_value(&arg, "--header=").is_some() => header_path = flag_value(&arg, "--header="),
            _ if arg.starts_with('-') && arg != "-" => {
                eprintln!("asm-cli: unrecognized option '{arg}'");
                usage();
                return ExitCode::FAILURE;
            }
            _ => inputs.push(arg),
        }
    }

    let Some(out_path) = out_path else {
        eprintln!("asm-cli: -o/--out is required");
        usage();
        return ExitCode::FAILURE;
    };
    if inputs.is_empty() {
        eprintln!("asm-cli: no input files");
        usage();
        return ExitCode::FAILURE;
    }
    if !auto_nop {
        log::warn!("automatic padding NOPs disabled; malformed control flow will error instead of being patched");
    }

    let mut assembler = Assembler::new(AssemblerOptions { auto_nop });
    for path in &inputs {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("asm-cli: {path}: {e}");
                return ExitCode::FAILURE;
            }
        };
        if let Err(err) = assembler.assemble_file(&text, path) {
            report(&err);
            return ExitCode::FAILURE;
        }
    }

    let file = match fs::File::create(&out_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("asm-cli: {out_path}: {e}");
            return ExitCode::FAILURE;
        }
    };
    let mut sink = FileSink(file);
    if let Err(err) = assembler.finish(&mut sink) {
        report(&err);
        let _ = fs::remove_file(&out_path);
        return ExitCode::FAILURE;
    }

    if let Some(header_path) = header_path {
        let header = assembler.generate_header();
        if let Err(e) = fs::write(&header_path, header) {
            eprintln!("asm-cli: {header_path}: {e}");
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

fn report(err: &AssembleError) {
    eprintln!("asm-cli: {err}");
}
