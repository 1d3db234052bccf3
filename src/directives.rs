//! Recognizes directive names and groups their raw argument text the way
//! each directive expects it (comma-split vs. space-split), per
//! `picasso_assembler.cpp`'s `dirTable` dispatch and spec.md 4.H. Argument
//! *semantics* (register/float parsing, symbol table mutation) stay in
//! [`crate::assembler`], which has the state those need.

use crate::error::{AssembleError, Result};
use crate::scan::{split_args_comma, split_args_space};

/// One parsed directive line, argument tokens still raw text.
#[derive(Debug, Clone)]
pub enum Directive<'a> {
    Proc(&'a str),
    End,
    Else,
    Alias(&'a str, &'a str),
    Fvec(Vec<&'a str>),
    Ivec(Vec<&'a str>),
    Bool(Vec<&'a str>),
    Constf(&'a str, [&'a str; 4]),
    Consti(&'a str, [&'a str; 4]),
    Constfa(&'a str),
    Setf(&'a str, [&'a str; 4]),
    Seti(&'a str, [&'a str; 4]),
    Setb(&'a str, &'a str),
    In(&'a str, Option<&'a str>),
    Out(Option<&'a str>, &'a str, Option<&'a str>),
    Entry(&'a str),
    Nodvle,
    Gsh(Vec<&'a str>),
}

fn lex_err(file: &str, line: u32, message: impl Into<String>) -> AssembleError {
    AssembleError::Lex {
        file: file.to_string(),
        line,
        message: message.into(),
    }
}

/// Parse a `(a, b, c, d)` constant literal's four comma-separated fields.
fn parse_paren4<'a>(text: &'a str, file: &str, line: u32) -> Result<(&'a str, [&'a str; 4])> {
    let open = text.find('(').ok_or_else(|| lex_err(file, line, "missing '(' in constant"))?;
    let close = text
        .rfind(')')
        .ok_or_else(|| lex_err(file, line, "missing ')' in constant"))?;
    if close < open {
        return Err(lex_err(file, line, "malformed constant"));
    }
    let name = text[..open].trim();
    let fields: Vec<&str> = text[open + 1..close].split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(lex_err(file, line, format!("expected 4 constant fields, got {}", fields.len())));
    }
    Ok((name, [fields[0], fields[1], fields[2], fields[3]]))
}

/// Parse a directive's command name (without the leading `.`) and raw tail
/// into a [`Directive`].
pub fn parse<'a>(cmd: &'a str, tail: &'a str, file: &str, line: u32) -> Result<Directive<'a>> {
    match cmd.to_ascii_lowercase().as_str() {
        "proc" => Ok(Directive::Proc(tail.trim())),
        "end" => Ok(Directive::End),
        "else" => Ok(Directive::Else),
        "alias" => {
            let args = split_args_space(tail);
            match args.as_slice() {
                [name, reg] => Ok(Directive::Alias(name, reg)),
                _ => Err(lex_err(file, line, "expected: .alias name reg")),
            }
        }
        "fvec" => Ok(Directive::Fvec(split_args_comma(tail))),
        "ivec" => Ok(Directive::Ivec(split_args_comma(tail))),
        "bool" => Ok(Directive::Bool(split_args_comma(tail))),
        "constf" => {
            let (name, fields) = parse_paren4(tail, file, line)?;
            Ok(Directive::Constf(name, fields))
        }
        "consti" => {
            let (name, fields) = parse_paren4(tail, file, line)?;
            Ok(Directive::Consti(name, fields))
        }
        "constfa" => Ok(Directive::Constfa(tail.trim())),
        "setf" => {
            let (name, fields) = parse_paren4(tail, file, line)?;
            Ok(Directive::Setf(name, fields))
        }
        "seti" => {
            let (name, fields) = parse_paren4(tail, file, line)?;
            Ok(Directive::Seti(name, fields))
        }
        "setb" => {
            let args = split_args_space(tail);
            match args.as_slice() {
                [reg, value] => Ok(Directive::Setb(reg, value)),
                _ => Err(lex_err(file, line, "expected: .setb reg on|off|1|0")),
            }
        }
        "in" => {
            let args = split_args_space(tail);
            match args.as_slice() {
                [name] => Ok(Directive::In(name, None)),
                [name, reg] => Ok(Directive::In(name, Some(reg))),
                _ => Err(lex_err(file, line, "expected: .in name [reg]")),
            }
        }
        "out" => {
            let args = split_args_space(tail);
            match args.as_slice() {
                [name, ty] => {
                    let name = if *name == "-" { None } else { Some(*name) };
                    Ok(Directive::Out(name, ty, None))
                }
                [name, ty, reg] => {
                    let name = if *name == "-" { None } else { Some(*name) };
                    Ok(Directive::Out(name, ty, Some(reg)))
                }
                _ => Err(lex_err(file, line, "expected: .out name|- type[.mask] [reg]")),
            }
        }
        "entry" => Ok(Directive::Entry(tail.trim())),
        "nodvle" => Ok(Directive::Nodvle),
        "gsh" => Ok(Directive::Gsh(split_args_space(tail))),
        other => Err(lex_err(file, line, format!("unknown directive: .{other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_proc_and_end() {
        assert!(matches!(parse("proc", "main", "f", 1).unwrap(), Directive::Proc("main")));
        assert!(matches!(parse("end", "", "f", 1).unwrap(), Directive::End));
    }

    #[test]
    fn parses_fvec_list() {
        let d = parse("fvec", "a, b[4], c", "f", 1).unwrap();
        match d {
            Directive::Fvec(items) => assert_eq!(items, vec!["a", "b[4]", "c"]),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn parses_constant_literal() {
        let d = parse("constf", "myc(1.0, 2.0, 3.0, 4.0)", "f", 1).unwrap();
        match d {
            Directive::Constf(name, fields) => {
                assert_eq!(name, "myc");
                assert_eq!(fields, ["1.0", "2.0", "3.0", "4.0"]);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn out_dash_name_suppresses_alias() {
        let d = parse("out", "- pos", "f", 1).unwrap();
        assert!(matches!(d, Directive::Out(None, "pos", None)));
    }

    #[test]
    fn unknown_directive_is_lex_error() {
        let err = parse("bogus", "", "f", 1).unwrap_err();
        assert!(matches!(err, AssembleError::Lex { .. }));
    }
}
