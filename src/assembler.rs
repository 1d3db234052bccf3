//! Top-level orchestrator: consolidates what the reference implementation
//! keeps as process-wide globals (code buffer, OPDESC pool, procedure table,
//! DVLE list) into a single value threaded through every directive and
//! instruction handler, per the "Global mutable state" redesign note. No
//! static state anywhere.

use std::collections::HashSet;

use crate::alloc::UniformBundle;
use crate::blocks::{self, BlockStack, FrameExtra};
use crate::container::Module;
use crate::directives::{self, Directive};
use crate::encode::{self, Combinator, CondExpr, MovaDest};
use crate::error::{AssembleError, Result};
use crate::opdesc::{self, OpdescSite, Pool};
use crate::operand::{self, AliasEntry, IndexRegister, Swizzle};
use crate::relocate::{LabelReloc, ProcReloc};
use crate::scan::{split_args_comma, split_args_space, split_command, Scanner};
use crate::schema::{Condition, GshType, Opcode, OutputKind};
use crate::symbols::{
    is_hidden, AliasTable, Constant, ConstantValue, LabelTable, ModuleSymbols, Output, ProcedureTable, Uniform,
    UniformTable, UniformType,
};
use crate::ByteSink;

/// Driver-facing knobs. No file/env/CLI parsing happens inside the library;
/// a demo binary maps its own flags onto this.
#[derive(Debug, Clone, Copy)]
pub struct AssemblerOptions {
    /// When false, a required padding NOP is skipped and a warning logged
    /// instead (`--no-nop`).
    pub auto_nop: bool,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self { auto_nop: true }
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

fn capacity_err(file: &str, line: u32, message: impl Into<String>) -> AssembleError {
    AssembleError::Capacity {
        file: file.to_string(),
        line,
        message: message.into(),
    }
}

fn structure_err(file: &str, line: u32, message: impl Into<String>) -> AssembleError {
    AssembleError::Structure {
        file: file.to_string(),
        line,
        message: message.into(),
    }
}

fn semantic_err(file: &str, line: u32, message: impl Into<String>) -> AssembleError {
    AssembleError::Semantic {
        file: file.to_string(),
        line,
        message: message.into(),
    }
}

/// VSH/GSH code size limit (structure-category error per spec 7).
const MAX_PROGRAM_WORDS: usize = 512;

/// Per-module (per-input-file) bookkeeping. Reset at the start of every
/// [`Assembler::assemble_file`] call.
struct ModuleState {
    entry_name: String,
    nodvle: bool,
    is_geoshader: bool,
    is_merge: bool,
    gsh_type: GshType,
    gsh_fixed_start: u8,
    gsh_variable_num: u8,
    gsh_fixed_num: u8,
    /// Only meaningful once `is_geoshader` is set by `.gsh`.
    bundle: UniformBundle,
    uses_shared_space: bool,
    symbols: ModuleSymbols,
}

impl ModuleState {
    fn new(default_bundle: UniformBundle) -> Self {
        Self {
            entry_name: "main".to_string(),
            nodvle: false,
            is_geoshader: false,
            is_merge: false,
            gsh_type: GshType::Point,
            gsh_fixed_start: 0,
            gsh_variable_num: 0,
            gsh_fixed_num: 0,
            bundle: default_bundle,
            uses_shared_space: true,
            symbols: ModuleSymbols::new(),
        }
    }
}

/// The whole assemble-and-link pipeline's state. Construct once, call
/// [`Assembler::assemble_file`] once per input, then [`Assembler::finish`].
pub struct Assembler {
    options: AssemblerOptions,
    code: Vec<u32>,
    opdescs: Pool,
    procs: ProcedureTable,
    proc_relocs: Vec<ProcReloc>,
    global_uniforms: UniformTable,
    default_bundle: UniformBundle,
    modules: Vec<Module>,

    aliases: AliasTable,
    labels: LabelTable,
    label_relocs: Vec<LabelReloc>,
    blocks: BlockStack,
    last_opcode: Option<Opcode>,
    last_was_end: bool,
    cur: ModuleState,
}

impl Assembler {
    #[must_use]
    pub fn new(options: AssemblerOptions) -> Self {
        let default_bundle = UniformBundle::default_profile();
        Self {
            options,
            code: Vec::new(),
            opdescs: Pool::new(),
            procs: ProcedureTable::new(),
            proc_relocs: Vec::new(),
            global_uniforms: UniformTable::new(),
            default_bundle,
            modules: Vec::new(),
            aliases: AliasTable::new(),
            labels: LabelTable::new(),
            label_relocs: Vec::new(),
            blocks: BlockStack::new(),
            last_opcode: None,
            last_was_end: false,
            cur: ModuleState::new(default_bundle),
        }
    }

    fn emit(&mut self, opcode: Opcode, word: u32) -> usize {
        self.code.push(word);
        self.last_opcode = Some(opcode);
        self.last_was_end = false;
        self.code.len() - 1
    }

    fn active_bundle_mut(&mut self) -> &mut UniformBundle {
        if self.cur.is_geoshader {
            &mut self.cur.bundle
        } else {
            &mut self.default_bundle
        }
    }

    /// Assemble one input file. Per-file symbol state (aliases, labels,
    /// label relocs, the module being built) is reset here; the shared code
    /// buffer, OPDESC pool, procedure table, and procReloc table persist
    /// across calls. The local (high-end) portion of the default uniform
    /// bundle is cleared at the end, matching the lifecycle rule that
    /// per-module constants don't survive into the next file.
    pub fn assemble_file(&mut self, text: &str, filename: &str) -> Result<()> {
        self.aliases.clear();
        self.labels.clear();
        self.label_relocs.clear();
        self.last_was_end = false;
        self.last_opcode = None;
        self.cur = ModuleState::new(self.default_bundle);

        for line in Scanner::new(text, filename) {
            let line = line?;
            for label in &line.labels {
                self.labels.define(label, self.code.len(), &line.file, line.line)?;
            }
            if line.text.is_empty() {
                continue;
            }

            if let Some(top) = self.blocks.top() {
                if matches!(top.extra, FrameExtra::Array { .. }) && !line.text.starts_with('.') {
                    self.push_array_entry(&line.text, &line.file, line.line)?;
                    continue;
                }
            }

            let (cmd, tail) = split_command(&line.text);
            if let Some(directive_name) = cmd.strip_prefix('.') {
                let directive = directives::parse(directive_name, tail, &line.file, line.line)?;
                self.run_directive(directive, &line.file, line.line)?;
            } else {
                if self.blocks.is_empty() {
                    return Err(structure_err(&line.file, line.line, "instruction outside any PROC"));
                }
                self.run_instruction(cmd, tail, &line.file, line.line)?;
            }
        }

        self.blocks.ensure_closed(filename, 0)?;
        if self.code.len() > MAX_PROGRAM_WORDS {
            return Err(structure_err(filename, 0, format!("program exceeds {MAX_PROGRAM_WORDS} instructions")));
        }

        crate::relocate::resolve_labels(&mut self.code, &self.label_relocs, &self.labels)?;
        let (entry_start, entry_end) = crate::relocate::resolve_entrypoint(&self.cur.entry_name, &self.procs, filename, 0)?;

        let mut uniforms = self.cur.symbols.local_uniforms.clone();
        if self.cur.uses_shared_space {
            uniforms.extend(self.global_uniforms.iter().cloned());
        }

        let mut input_mask: u16 = 0;
        for &reg in self.cur.symbols.inputs.values() {
            input_mask |= 1 << reg;
        }
        let mut output_mask: u16 = 0;
        for out in &self.cur.symbols.outputs {
            output_mask |= 1 << out.register;
        }

        self.modules.push(Module {
            entrypoint_name: self.cur.entry_name.clone(),
            entry_start,
            entry_end,
            nodvle: self.cur.nodvle,
            is_geoshader: self.cur.is_geoshader,
            is_merge: self.cur.is_merge,
            input_mask,
            output_mask,
            gsh_type: self.cur.gsh_type,
            gsh_fixed_start: self.cur.gsh_fixed_start,
            gsh_variable_num: self.cur.gsh_variable_num,
            gsh_fixed_num: self.cur.gsh_fixed_num,
            uniforms,
            constants: self.cur.symbols.constants.clone(),
            outputs: self.cur.symbols.outputs.clone(),
        });

        self.default_bundle.clear_locals();
        Ok(())
    }

    /// Patch every procReloc against the final procedure table and write the
    /// finished DVLB/DVLP/DVLE container. Call once, after every input file
    /// has been passed to [`Assembler::assemble_file`].
    pub fn finish(&mut self, sink: &mut dyn ByteSink) -> Result<()> {
        crate::relocate::resolve_procedures(&mut self.code, &self.proc_relocs, &self.procs)?;
        let emitted: Vec<Module> = self.modules.iter().filter(|m| !m.nodvle).cloned().collect();
        crate::container::write_shbin(sink, &self.code, &self.opdescs, &emitted)
    }

    /// Render the companion C header for the global uniform table (or, for a
    /// geometry-shader-first run, the first module's local table).
    #[must_use]
    pub fn generate_header(&self) -> String {
        let is_gsh = self.modules.first().is_some_and(|m| m.is_geoshader);
        let prefix = if is_gsh { "GSH" } else { "VSH" };
        let uniforms: Vec<Uniform> = if is_gsh {
            self.modules.first().map(|m| m.uniforms.clone()).unwrap_or_default()
        } else {
            self.global_uniforms.iter().cloned().collect()
        };
        crate::header::generate(prefix, &uniforms)
    }

    // ---- directives -----------------------------------------------------

    fn run_directive(&mut self, directive: Directive<'_>, file: &str, line: u32) -> Result<()> {
        match directive {
            Directive::Proc(name) => {
                self.blocks.push(
                    self.code.len(),
                    FrameExtra::Proc { name: name.to_string() },
                    file,
                    line,
                )?;
            }
            Directive::End => self.handle_end(file, line)?,
            Directive::Else => self.handle_else(file, line)?,
            Directive::Alias(name, reg) => {
                let (op, _) = operand::parse(reg, self.aliases.map(), true, file, line)?;
                self.aliases.insert(name, AliasEntry::from(op), file, line)?;
            }
            Directive::Fvec(items) => self.declare_uniforms(items, UniformType::Fvec, file, line)?,
            Directive::Ivec(items) => self.declare_uniforms(items, UniformType::Ivec, file, line)?,
            Directive::Bool(items) => self.declare_uniforms(items, UniformType::Bool, file, line)?,
            Directive::Constf(name, fields) => self.declare_const(name, fields, true, file, line)?,
            Directive::Consti(name, fields) => self.declare_const(name, fields, false, file, line)?,
            Directive::Constfa(tag) => self.open_array(tag, file, line)?,
            Directive::Setf(reg, fields) => {
                self.set_existing(reg, ConstantValue::FVec(parse4f(fields, file, line)?), file, line)?;
            }
            Directive::Seti(reg, fields) => {
                self.set_existing(reg, ConstantValue::IVec(parse4u8(fields, file, line)?), file, line)?;
            }
            Directive::Setb(reg, value) => {
                self.set_existing(reg, ConstantValue::Bool(parse_bool_literal(value, file, line)?), file, line)?;
            }
            Directive::In(name, reg) => self.declare_input(name, reg, file, line)?,
            Directive::Out(name, ty, reg) => self.declare_output(name, ty, reg, file, line)?,
            Directive::Entry(name) => self.cur.entry_name = name.to_string(),
            Directive::Nodvle => self.cur.nodvle = true,
            Directive::Gsh(tokens) => self.configure_gsh(&tokens, file, line)?,
        }
        Ok(())
    }

    fn declare_uniforms(&mut self, items: Vec<&str>, ty: UniformType, file: &str, line: u32) -> Result<()> {
        for item in items {
            if item.is_empty() {
                continue;
            }
            let (name, size) = parse_name_size(item, file, line)?;

            let position = if self.cur.is_geoshader {
                alloc_global(self.active_bundle_mut(), ty, size, file, line)?
            } else if let Some(existing) = self.global_uniforms.check_reuse(name, ty, size, file, line)? {
                existing
            } else {
                let pos = alloc_global(&mut self.default_bundle, ty, size, file, line)?;
                self.global_uniforms.insert(Uniform {
                    name: name.to_string(),
                    position: pos,
                    size,
                    ty,
                });
                pos
            };

            if self.cur.is_geoshader {
                self.cur.symbols.local_uniforms.push(Uniform {
                    name: name.to_string(),
                    position,
                    size,
                    ty,
                });
            }
            let index = u8::try_from(position).map_err(|_| range_err(file, line, "uniform position out of range"))?;
            self.aliases.insert(
                name,
                AliasEntry {
                    index,
                    swizzle: Swizzle::IDENTITY,
                    negate: false,
                },
                file,
                line,
            )?;
        }
        Ok(())
    }

    fn declare_const(&mut self, name: &str, fields: [&str; 4], is_float: bool, file: &str, line: u32) -> Result<()> {
        let value = if is_float {
            ConstantValue::FVec(parse4f(fields, file, line)?)
        } else {
            ConstantValue::IVec(parse4u8(fields, file, line)?)
        };
        let position = {
            let bundle = self.active_bundle_mut();
            if is_float {
                bundle.fvec.alloc_local(1, file, line)?
            } else {
                bundle.ivec.alloc_local(1, file, line)?
            }
        };
        let reg_id = u8::try_from(position).map_err(|_| range_err(file, line, "constant register out of range"))?;
        self.cur.symbols.constants.push(Constant { reg_id, value });
        self.aliases.insert(
            name,
            AliasEntry {
                index: reg_id,
                swizzle: Swizzle::IDENTITY,
                negate: false,
            },
            file,
            line,
        )?;
        Ok(())
    }

    fn open_array(&mut self, tag: &str, file: &str, line: u32) -> Result<()> {
        let (name, _declared_size) = parse_name_size(tag, file, line)?;
        self.blocks.push(
            self.code.len(),
            FrameExtra::Array {
                name: name.to_string(),
                hidden: is_hidden(name),
                entries: Vec::new(),
            },
            file,
            line,
        )
    }

    fn push_array_entry(&mut self, text: &str, file: &str, line: u32) -> Result<()> {
        let open = text.find('(').ok_or_else(|| lex_err(file, line, "expected a constant tuple"))?;
        let close = text.rfind(')').ok_or_else(|| lex_err(file, line, "expected a constant tuple"))?;
        let fields: Vec<&str> = text[open + 1..close].split(',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(lex_err(file, line, format!("expected 4 constant fields, got {}", fields.len())));
        }
        let mut arr = [0f32; 4];
        for (i, f) in fields.iter().enumerate() {
            arr[i] = f.parse().map_err(|_| lex_err(file, line, format!("invalid float literal: {f}")))?;
        }
        let top = self
            .blocks
            .top_mut()
            .ok_or_else(|| structure_err(file, line, "constant entry outside an ARRAY block"))?;
        match &mut top.extra {
            FrameExtra::Array { entries, .. } => {
                entries.push(Constant {
                    reg_id: 0,
                    value: ConstantValue::FVec(arr),
                });
                Ok(())
            }
            _ => Err(structure_err(file, line, "constant entry outside an ARRAY block")),
        }
    }

    fn set_existing(&mut self, reg: &str, value: ConstantValue, file: &str, line: u32) -> Result<()> {
        let (op, _) = operand::parse(reg, self.aliases.map(), false, file, line)?;
        self.cur.symbols.constants.push(Constant { reg_id: op.index, value });
        Ok(())
    }

    fn declare_input(&mut self, name: &str, reg: Option<&str>, file: &str, line: u32) -> Result<()> {
        let register = match reg {
            Some(tok) => {
                let (op, _) = operand::parse(tok, self.aliases.map(), false, file, line)?;
                if op.index >= 0x10 {
                    return Err(range_err(file, line, "input register out of range"));
                }
                op.index
            }
            None => self
                .cur
                .symbols
                .lowest_free_input()
                .ok_or_else(|| capacity_err(file, line, "no free input registers"))?,
        };
        self.cur.symbols.add_input(name, register, file, line)?;
        self.aliases.insert(
            name,
            AliasEntry {
                index: register,
                swizzle: Swizzle::IDENTITY,
                negate: false,
            },
            file,
            line,
        )
    }

    fn declare_output(&mut self, name: Option<&str>, ty: &str, reg: Option<&str>, file: &str, line: u32) -> Result<()> {
        let (type_name, mask_text) = match ty.split_once('.') {
            Some((t, m)) => (t, Some(m)),
            None => (ty, None),
        };
        let kind = OutputKind::from_name(type_name).ok_or_else(|| lex_err(file, line, format!("unknown output type: {type_name}")))?;
        let mask = match mask_text {
            Some(m) => Swizzle::parse(m).ok_or_else(|| lex_err(file, line, format!("invalid output mask: {m}")))?.read_mask(),
            None => 0xF,
        };
        let register = match reg {
            Some(tok) => {
                let (op, _) = operand::parse(tok, self.aliases.map(), false, file, line)?;
                if op.index >= 0x10 {
                    return Err(range_err(file, line, "output register out of range"));
                }
                op.index
            }
            None => {
                let used: HashSet<u8> = self.cur.symbols.outputs.iter().map(|o| o.register).collect();
                (0..=0x0F).find(|r| !used.contains(r)).ok_or_else(|| capacity_err(file, line, "no free output registers"))?
            }
        };
        if self.cur.is_geoshader && register >= 7 && kind != OutputKind::Dummy {
            return Err(semantic_err(file, line, "geometry-shader register 7+ must be dummy"));
        }
        self.cur.symbols.add_output(Output { kind, register, mask }, file, line)?;
        if let Some(n) = name {
            self.aliases.insert(
                n,
                AliasEntry {
                    index: register,
                    swizzle: Swizzle::IDENTITY,
                    negate: false,
                },
                file,
                line,
            )?;
        }
        Ok(())
    }

    fn configure_gsh(&mut self, tokens: &[&str], file: &str, line: u32) -> Result<()> {
        self.cur.is_geoshader = true;
        self.cur.uses_shared_space = false;
        self.cur.bundle = UniformBundle::geometry_profile(0x20);
        if tokens.is_empty() {
            self.cur.is_merge = true;
            return Ok(());
        }
        let gsh_type = GshType::from_name(tokens[0]).ok_or_else(|| lex_err(file, line, format!("unknown gsh type: {}", tokens[0])))?;
        self.cur.gsh_type = gsh_type;
        match gsh_type {
            GshType::Point => {}
            GshType::Variable => {
                let count = tokens
                    .get(1)
                    .ok_or_else(|| lex_err(file, line, "gsh variable requires a count"))?
                    .parse()
                    .map_err(|_| lex_err(file, line, "invalid gsh variable count"))?;
                self.cur.gsh_variable_num = count;
            }
            GshType::Fixed => {
                let reg_tok = tokens.get(1).ok_or_else(|| lex_err(file, line, "gsh fixed requires a register"))?;
                let (op, _) = operand::parse(reg_tok, self.aliases.map(), false, file, line)?;
                let count: u8 = tokens
                    .get(2)
                    .ok_or_else(|| lex_err(file, line, "gsh fixed requires a count"))?
                    .parse()
                    .map_err(|_| lex_err(file, line, "invalid gsh fixed count"))?;
                self.cur.gsh_fixed_start = op.index;
                self.cur.gsh_fixed_num = count;
                self.cur.bundle = UniformBundle::geometry_profile(u16::from(op.index) + u16::from(count));
            }
        }
        Ok(())
    }

    // ---- block close/else ------------------------------------------------

    fn maybe_pad_before_close(&mut self, file: &str, line: u32) -> Result<()> {
        let top = self.blocks.top().ok_or_else(|| structure_err(file, line, ".end without a matching open"))?;
        if matches!(top.extra, FrameExtra::Array { .. }) {
            return Ok(());
        }
        let is_proc = matches!(top.extra, FrameExtra::Proc { .. });
        let is_if_or_for = matches!(top.extra, FrameExtra::If { .. } | FrameExtra::For);
        let body_len = self.code.len() - top.buffer_position;
        let branch_tail = self.last_opcode.is_some_and(Opcode::is_branch_class);
        let needs_pad = (is_if_or_for && self.last_was_end) || branch_tail || (!is_proc && body_len < 2) || (is_proc && body_len < 1);
        if needs_pad {
            if self.options.auto_nop {
                self.emit(Opcode::Nop, encode::f0(Opcode::Nop));
            } else {
                log::warn!("{file}:{line}: a padding NOP is required here (--no-nop is set)");
            }
        }
        Ok(())
    }

    fn handle_end(&mut self, file: &str, line: u32) -> Result<()> {
        self.maybe_pad_before_close(file, line)?;
        let kind_is_if_or_for = matches!(
            self.blocks.top().expect("checked by maybe_pad_before_close").extra,
            FrameExtra::If { .. } | FrameExtra::For
        );
        let frame = self.blocks.pop(file, line)?;
        match frame.extra {
            FrameExtra::Proc { name } => {
                let size = self.code.len() - frame.buffer_position;
                self.procs.define(&name, frame.buffer_position, size, file, line)?;
            }
            FrameExtra::For => {
                let target = (self.code.len() - 1) as u32;
                blocks::patch_for_target(&mut self.code[frame.buffer_position], target);
            }
            FrameExtra::If { else_jump_word } => match else_jump_word {
                None => {
                    let target = self.code.len() as u32;
                    blocks::patch_if_false_target(&mut self.code[frame.buffer_position], target);
                }
                Some(else_word) => {
                    let delta = (self.code.len() - else_word) as u32;
                    blocks::patch_else_delta(&mut self.code[else_word], delta);
                }
            },
            FrameExtra::Array { name, entries, .. } => {
                let size = (entries.len() as u16).max(1);
                let base = self.active_bundle_mut().fvec.alloc_local(size, file, line)?;
                for (i, mut c) in entries.into_iter().enumerate() {
                    c.reg_id = base as u8 + i as u8;
                    self.cur.symbols.constants.push(c);
                }
                let index = u8::try_from(base).map_err(|_| range_err(file, line, "array base out of range"))?;
                self.aliases.insert(
                    &name,
                    AliasEntry {
                        index,
                        swizzle: Swizzle::IDENTITY,
                        negate: false,
                    },
                    file,
                    line,
                )?;
            }
        }
        self.last_was_end = kind_is_if_or_for;
        Ok(())
    }

    fn handle_else(&mut self, file: &str, line: u32) -> Result<()> {
        self.maybe_pad_before_close(file, line)?;
        let buffer_position = {
            let frame = self.blocks.top().ok_or_else(|| structure_err(file, line, ".else without a matching open"))?;
            match &frame.extra {
                FrameExtra::If { else_jump_word: None } => frame.buffer_position,
                FrameExtra::If { else_jump_word: Some(_) } => return Err(structure_err(file, line, "duplicate .else")),
                _ => return Err(structure_err(file, line, ".else outside an IF block")),
            }
        };
        let word_index = self.emit(Opcode::Nop, encode::f0(Opcode::Nop));
        blocks::patch_if_false_target(&mut self.code[buffer_position], (word_index + 1) as u32);
        if let Some(frame) = self.blocks.top_mut() {
            if let FrameExtra::If { else_jump_word } = &mut frame.extra {
                *else_jump_word = Some(word_index);
            }
        }
        Ok(())
    }

    // ---- instructions -----------------------------------------------------

    fn run_instruction(&mut self, cmd: &str, tail: &str, file: &str, line: u32) -> Result<()> {
        let lname = cmd.to_ascii_lowercase();
        let opcode = lookup_opcode(&lname).ok_or_else(|| lex_err(file, line, format!("unknown instruction: {cmd}")))?;
        match opcode.format() {
            crate::schema::Format::F0 => {
                self.emit(opcode, encode::f0(opcode));
            }
            crate::schema::Format::F1 => self.handle_f1(opcode, tail, file, line)?,
            crate::schema::Format::F1u => self.handle_f1u(opcode, tail, file, line)?,
            crate::schema::Format::F1c => self.handle_f1c(opcode, tail, file, line)?,
            crate::schema::Format::F2 => self.handle_f2(opcode, tail, file, line)?,
            crate::schema::Format::F3 => self.handle_f3(opcode, tail, file, line)?,
            crate::schema::Format::F5 => self.handle_f5(tail, file, line)?,
            crate::schema::Format::Mova => self.handle_mova(tail, file, line)?,
            crate::schema::Format::Setemit => self.handle_setemit(tail, file, line)?,
            crate::schema::Format::Call => self.handle_call(tail, file, line)?,
            crate::schema::Format::For => self.handle_for(tail, file, line)?,
        }
        Ok(())
    }

    fn handle_f1(&mut self, opcode: Opcode, tail: &str, file: &str, line: u32) -> Result<()> {
        let args = split_args_comma(tail);
        let [dst_tok, src1_tok, src2_tok] = args.as_slice() else {
            return Err(lex_err(file, line, "expected: dst, src1, src2"));
        };
        let (dst, _) = operand::parse(dst_tok, self.aliases.map(), false, file, line)?;
        if dst.index >= 0x20 {
            return Err(range_err(file, line, "destination register out of range"));
        }
        // Both sources may carry an index register at this point; which one
        // actually gets to keep it depends on which ends up in the wide
        // (7-bit) field once inversion is decided below.
        let (src1, src1_idx) = operand::parse(src1_tok, self.aliases.map(), true, file, line)?;
        let (src2, src2_idx) = operand::parse(src2_tok, self.aliases.map(), true, file, line)?;

        // Non-inverted: src1 is the wide (uniform-capable) field, src2 narrow.
        // Inverted: the fields swap width, so a narrow src1/wide src2 pair
        // still fits.
        let (final_opcode, inverted) = match opcode.inverted() {
            Some(inv) if src1.index < 0x20 && src2.index >= 0x20 => (inv, true),
            _ => (opcode, false),
        };
        if !inverted && src2.index >= 0x20 {
            return Err(range_err(file, line, "src2 must be a narrow (non-uniform) register"));
        }
        let (wide_idx, narrow_idx) = if inverted { (src2_idx, src1_idx) } else { (src1_idx, src2_idx) };
        if narrow_idx.is_some() {
            return Err(lex_err(file, line, "index register only allowed on the wide operand"));
        }

        let desc = opdesc::make_opdesc(dst.swizzle.read_mask(), src1.opsrc(), src2.opsrc(), 0);
        let index = self.opdescs.find_or_add(desc, opdesc::MASK_D12, file, line)?;
        let word_index = self.code.len();
        let idx_byte = wide_idx.map(|r| r as u8).unwrap_or(0);
        let word = encode::f1(final_opcode, index as u32, dst.index, src1.index, idx_byte, src2.index, inverted);
        self.emit(final_opcode, word);
        self.opdescs.record_site(index, OpdescSite { word_index, field_width: 7 });
        Ok(())
    }

    fn handle_f1u(&mut self, opcode: Opcode, tail: &str, file: &str, line: u32) -> Result<()> {
        let args = split_args_comma(tail);
        let [dst_tok, src1_tok] = args.as_slice() else {
            return Err(lex_err(file, line, "expected: dst, src1"));
        };
        let (dst, _) = operand::parse(dst_tok, self.aliases.map(), false, file, line)?;
        if dst.index >= 0x20 {
            return Err(range_err(file, line, "destination register out of range"));
        }
        let (src1, src1_idx) = operand::parse(src1_tok, self.aliases.map(), true, file, line)?;

        let desc = opdesc::make_opdesc(dst.swizzle.read_mask(), src1.opsrc(), 0, 0);
        let index = self.opdescs.find_or_add(desc, opdesc::MASK_D1, file, line)?;
        let word_index = self.code.len();
        let idx_byte = src1_idx.map(|r| r as u8).unwrap_or(0);
        let word = encode::f1u(opcode, index as u32, dst.index, src1.index, idx_byte);
        self.emit(opcode, word);
        self.opdescs.record_site(index, OpdescSite { word_index, field_width: 7 });
        Ok(())
    }

    fn handle_f1c(&mut self, opcode: Opcode, tail: &str, file: &str, line: u32) -> Result<()> {
        let args = split_args_comma(tail);
        let [src1_tok, cmpx_tok, cmpy_tok, src2_tok] = args.as_slice() else {
            return Err(lex_err(file, line, "expected: src1, cmpX, cmpY, src2"));
        };
        let (src1, _) = operand::parse(src1_tok, self.aliases.map(), false, file, line)?;
        let (src2, _) = operand::parse(src2_tok, self.aliases.map(), false, file, line)?;
        let cmp_x = Condition::from_mnemonic(&cmpx_tok.trim().to_ascii_lowercase())
            .ok_or_else(|| lex_err(file, line, format!("invalid condition: {cmpx_tok}")))?;
        let cmp_y = Condition::from_mnemonic(&cmpy_tok.trim().to_ascii_lowercase())
            .ok_or_else(|| lex_err(file, line, format!("invalid condition: {cmpy_tok}")))?;

        let desc = opdesc::make_opdesc(0, src1.opsrc(), src2.opsrc(), 0);
        let index = self.opdescs.find_or_add(desc, opdesc::MASK_12, file, line)?;
        let word_index = self.code.len();
        let word = encode::f1c(opcode, index as u32, src1.index, src2.index, cmp_x, cmp_y);
        self.emit(opcode, word);
        self.opdescs.record_site(index, OpdescSite { word_index, field_width: 7 });
        Ok(())
    }

    fn handle_f2(&mut self, opcode: Opcode, tail: &str, file: &str, line: u32) -> Result<()> {
        let args = split_args_comma(tail);
        let cond = parse_cond_expr(args.first().copied().unwrap_or(""), file, line)?;
        match opcode {
            Opcode::Ifc => {
                if args.len() != 1 {
                    return Err(lex_err(file, line, "ifc takes no explicit target"));
                }
                let word_index = self.code.len();
                self.emit(opcode, encode::f2(opcode, cond, 0));
                self.blocks.push(word_index, FrameExtra::If { else_jump_word: None }, file, line)?;
            }
            Opcode::Breakc | Opcode::Jmpc | Opcode::Callc => {
                let [_, target] = args.as_slice() else {
                    return Err(lex_err(file, line, "expected: cond, target"));
                };
                let word_index = self.code.len();
                self.emit(opcode, encode::f2(opcode, cond, 0));
                if opcode == Opcode::Callc {
                    self.proc_relocs.push(ProcReloc {
                        word_index,
                        target_name: target.trim().to_string(),
                        file: file.to_string(),
                        line,
                    });
                } else {
                    self.label_relocs.push(LabelReloc {
                        word_index,
                        target_name: target.trim().to_string(),
                        file: file.to_string(),
                        line,
                    });
                }
            }
            _ => unreachable!("non-F2 opcode routed to handle_f2"),
        }
        Ok(())
    }

    fn handle_f3(&mut self, opcode: Opcode, tail: &str, file: &str, line: u32) -> Result<()> {
        let args = split_args_comma(tail);
        let term = args.first().copied().unwrap_or("").trim();
        let (negate, name) = match term.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, term),
        };
        if negate && opcode != Opcode::Jmpu {
            return Err(lex_err(file, line, "! is only permitted for jmpu"));
        }
        let (bool_op, _) = operand::parse(name, self.aliases.map(), false, file, line)?;
        if !(0x88..0x98).contains(&bool_op.index) {
            return Err(range_err(file, line, "expected a boolean uniform"));
        }
        let bool_index = bool_op.index - 0x88;

        match opcode {
            Opcode::Ifu => {
                if args.len() != 1 {
                    return Err(lex_err(file, line, "ifu takes no explicit target"));
                }
                let word_index = self.code.len();
                self.emit(opcode, encode::f3(opcode, bool_index, negate, 0));
                self.blocks.push(word_index, FrameExtra::If { else_jump_word: None }, file, line)?;
            }
            Opcode::Callu | Opcode::Jmpu => {
                let [_, target] = args.as_slice() else {
                    return Err(lex_err(file, line, "expected: cond, target"));
                };
                let word_index = self.code.len();
                self.emit(opcode, encode::f3(opcode, bool_index, negate, 0));
                if opcode == Opcode::Callu {
                    self.proc_relocs.push(ProcReloc {
                        word_index,
                        target_name: target.trim().to_string(),
                        file: file.to_string(),
                        line,
                    });
                } else {
                    self.label_relocs.push(LabelReloc {
                        word_index,
                        target_name: target.trim().to_string(),
                        file: file.to_string(),
                        line,
                    });
                }
            }
            _ => unreachable!("non-F3 opcode routed to handle_f3"),
        }
        Ok(())
    }

    /// `dst, src1(wide), src2(wide), src3(narrow)`; inverted when the
    /// written `src2` turns out to be narrow (see DESIGN.md — this crate's
    /// bit-exact F5 layout, ported verbatim from the reference encoder,
    /// leaves no room for an index register on any MAD operand).
    fn handle_f5(&mut self, tail: &str, file: &str, line: u32) -> Result<()> {
        let args = split_args_comma(tail);
        let [dst_tok, src1_tok, src2_tok, src3_tok] = args.as_slice() else {
            return Err(lex_err(file, line, "expected: dst, src1, src2, src3"));
        };
        let (dst, _) = operand::parse(dst_tok, self.aliases.map(), false, file, line)?;
        if dst.index >= 0x20 {
            return Err(range_err(file, line, "destination register out of range"));
        }
        let (src1, _) = operand::parse(src1_tok, self.aliases.map(), false, file, line)?;
        let (mut src2, _) = operand::parse(src2_tok, self.aliases.map(), false, file, line)?;
        let (mut src3, _) = operand::parse(src3_tok, self.aliases.map(), false, file, line)?;

        let opcode = if src2.index < 0x20 {
            std::mem::swap(&mut src2, &mut src3);
            Opcode::MadI
        } else {
            Opcode::Mad
        };

        let desc = opdesc::make_opdesc(dst.swizzle.read_mask(), src1.opsrc(), src2.opsrc(), src3.opsrc());
        let raw_index = self.opdescs.find_or_add(desc, opdesc::MASK_D123, file, line)?;
        let index = self.opdescs.ensure_mad_slot(raw_index, &mut self.code, file, line)?;
        let word_index = self.code.len();
        let word = encode::f5(opcode, index as u32, dst.index, src1.index, src2.index, src3.index);
        self.emit(opcode, word);
        self.opdescs.record_site(index, OpdescSite { word_index, field_width: 5 });
        Ok(())
    }

    fn handle_mova(&mut self, tail: &str, file: &str, line: u32) -> Result<()> {
        let args = split_args_comma(tail);
        let [dest_tok, src1_tok] = args.as_slice() else {
            return Err(lex_err(file, line, "expected: a0|a1|a01, src1"));
        };
        let dest = match dest_tok.trim().to_ascii_lowercase().as_str() {
            "a0" => MovaDest { a0: true, a1: false },
            "a1" => MovaDest { a0: false, a1: true },
            "a01" => MovaDest { a0: true, a1: true },
            other => return Err(lex_err(file, line, format!("invalid mova destination: {other}"))),
        };
        let (src1, src1_idx) = operand::parse(src1_tok, self.aliases.map(), true, file, line)?;

        let desc = opdesc::make_opdesc(0, src1.opsrc(), 0, 0);
        let index = self.opdescs.find_or_add(desc, opdesc::MASK_1, file, line)?;
        let word_index = self.code.len();
        let idx_byte = src1_idx.map(|r| r as u8).unwrap_or(0);
        let word = encode::mova(Opcode::Mova, index as u32, dest, src1.index, idx_byte);
        self.emit(Opcode::Mova, word);
        self.opdescs.record_site(index, OpdescSite { word_index, field_width: 7 });
        Ok(())
    }

    fn handle_setemit(&mut self, tail: &str, file: &str, line: u32) -> Result<()> {
        let args = split_args_comma(tail);
        let vertex_id: u8 = args
            .first()
            .ok_or_else(|| lex_err(file, line, "expected a vertex id"))?
            .trim()
            .parse()
            .map_err(|_| lex_err(file, line, "invalid vertex id"))?;
        if vertex_id > 2 {
            return Err(range_err(file, line, "vertex id must be 0..2"));
        }
        let flags = split_args_space(args.get(1).copied().unwrap_or(""));
        let primitive = flags.contains(&"prim");
        let invert = flags.contains(&"inv");
        self.emit(Opcode::Setemit, encode::setemit(Opcode::Setemit, vertex_id, primitive, invert));
        self.cur.is_geoshader = true;
        self.cur.is_merge = true;
        Ok(())
    }

    fn handle_call(&mut self, tail: &str, file: &str, line: u32) -> Result<()> {
        let word_index = self.code.len();
        self.emit(Opcode::Call, encode::call_placeholder(Opcode::Call));
        self.proc_relocs.push(ProcReloc {
            word_index,
            target_name: tail.trim().to_string(),
            file: file.to_string(),
            line,
        });
        Ok(())
    }

    fn handle_for(&mut self, tail: &str, file: &str, line: u32) -> Result<()> {
        let (op, _) = operand::parse(tail.trim(), self.aliases.map(), false, file, line)?;
        if !(0x80..0x84).contains(&op.index) {
            return Err(range_err(file, line, "expected an integer-vector uniform"));
        }
        let ivec_index = op.index - 0x80;
        let word_index = self.code.len();
        self.emit(Opcode::For, encode::for_loop(Opcode::For, ivec_index, 0));
        self.blocks.push(word_index, FrameExtra::For, file, line)
    }
}

fn alloc_global(bundle: &mut UniformBundle, ty: UniformType, size: u16, file: &str, line: u32) -> Result<u16> {
    match ty {
        UniformType::Fvec => bundle.fvec.alloc_global(size, file, line),
        UniformType::Ivec => bundle.ivec.alloc_global(size, file, line),
        UniformType::Bool => bundle.bool_.alloc_global(size, file, line),
    }
}

/// Parse a `.fvec`-family item: `name` or `name[size]`.
fn parse_name_size<'a>(item: &'a str, file: &str, line: u32) -> Result<(&'a str, u16)> {
    let item = item.trim();
    match item.find('[') {
        Some(open) => {
            let close = item.rfind(']').ok_or_else(|| lex_err(file, line, format!("missing ']' in: {item}")))?;
            let name = item[..open].trim();
            let size: u16 = item[open + 1..close]
                .trim()
                .parse()
                .map_err(|_| lex_err(file, line, format!("invalid array size in: {item}")))?;
            Ok((name, size))
        }
        None => Ok((item, 1)),
    }
}

fn parse4f(fields: [&str; 4], file: &str, line: u32) -> Result<[f32; 4]> {
    let mut out = [0f32; 4];
    for (i, f) in fields.iter().enumerate() {
        out[i] = f.trim().parse().map_err(|_| lex_err(file, line, format!("invalid float literal: {f}")))?;
    }
    Ok(out)
}

fn parse4u8(fields: [&str; 4], file: &str, line: u32) -> Result<[u8; 4]> {
    let mut out = [0u8; 4];
    for (i, f) in fields.iter().enumerate() {
        out[i] = f.trim().parse().map_err(|_| lex_err(file, line, format!("invalid integer literal: {f}")))?;
    }
    Ok(out)
}

fn parse_bool_literal(text: &str, file: &str, line: u32) -> Result<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "on" | "1" => Ok(true),
        "off" | "0" => Ok(false),
        other => Err(lex_err(file, line, format!("invalid boolean literal: {other}"))),
    }
}

fn lookup_opcode(name: &str) -> Option<Opcode> {
    use Opcode::*;
    Some(match name {
        "add" => Add,
        "dp3" => Dp3,
        "dp4" => Dp4,
        "dph" => Dph,
        "sge" => Sge,
        "slt" => Slt,
        "mul" => Mul,
        "max" => Max,
        "min" => Min,
        "ex2" => Ex2,
        "lg2" => Lg2,
        "flr" => Flr,
        "rcp" => Rcp,
        "rsq" => Rsq,
        "mov" => Mov,
        "cmp" => Cmp,
        "breakc" => Breakc,
        "callc" => Callc,
        "jmpc" => Jmpc,
        "ifc" => Ifc,
        "callu" => Callu,
        "jmpu" => Jmpu,
        "ifu" => Ifu,
        "mova" => Mova,
        "setemit" => Setemit,
        "call" => Call,
        "for" => For,
        "mad" => Mad,
        "nop" => Nop,
        "end" => End,
        "emit" => Emit,
        _ => return None,
    })
}

/// Parse a `!?cmp.x [&&|||] !?cmp.y` condition expression. A bare single
/// term must be `cmp.x`; it's encoded as an implicit `|| true` against the
/// unused `cmp.y` slot.
fn parse_cond_expr(text: &str, file: &str, line: u32) -> Result<CondExpr> {
    let text = text.trim();
    if let Some(idx) = text.find("&&") {
        let left = parse_cond_term(&text[..idx], file, line)?;
        let right = parse_cond_term(&text[idx + 2..], file, line)?;
        combine_cond_terms(left, right, Combinator::And, file, line)
    } else if let Some(idx) = text.find("||") {
        let left = parse_cond_term(&text[..idx], file, line)?;
        let right = parse_cond_term(&text[idx + 2..], file, line)?;
        combine_cond_terms(left, right, Combinator::Or, file, line)
    } else {
        let (negate, is_y) = parse_cond_term(text, file, line)?;
        if is_y {
            return Err(lex_err(file, line, "single-condition form requires cmp.x"));
        }
        Ok(CondExpr {
            negate_x: negate,
            negate_y: false,
            uses_y: false,
            combinator: Combinator::Or,
        })
    }
}

fn parse_cond_term(text: &str, file: &str, line: u32) -> Result<(bool, bool)> {
    let text = text.trim();
    let (negate, rest) = match text.strip_prefix('!') {
        Some(rest) => (true, rest.trim()),
        None => (false, text),
    };
    match rest.to_ascii_lowercase().as_str() {
        "cmp.x" => Ok((negate, false)),
        "cmp.y" => Ok((negate, true)),
        other => Err(lex_err(file, line, format!("invalid condition term: {other}"))),
    }
}

fn combine_cond_terms(left: (bool, bool), right: (bool, bool), combinator: Combinator, file: &str, line: u32) -> Result<CondExpr> {
    let (negate_x, negate_y) = match (left.1, right.1) {
        (false, true) => (left.0, right.0),
        (true, false) => (right.0, left.0),
        _ => return Err(lex_err(file, line, "condition expression must reference both cmp.x and cmp.y")),
    };
    Ok(CondExpr {
        negate_x,
        negate_y,
        uses_y: true,
        combinator,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asm() -> Assembler {
        Assembler::new(AssemblerOptions::default())
    }

    struct VecSink(Vec<u8>);
    impl ByteSink for VecSink {
        fn write_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            self.0.extend_from_slice(bytes);
            Ok(())
        }
    }

    #[test]
    fn smoke_scenario_s1() {
        let mut a = asm();
        a.assemble_file(".proc main\nnop\nend\n.end\n.out out_pos pos\n", "s1.vsh").unwrap();
        assert_eq!(a.code, vec![encode::f0(Opcode::Nop), encode::f0(Opcode::End)]);
        assert_eq!(a.modules.len(), 1);
        assert_eq!(a.modules[0].entry_start, 0);
        assert_eq!(a.modules[0].entry_end, 2);
        assert_eq!(a.modules[0].outputs.len(), 1);
        assert_eq!(a.modules[0].outputs[0].mask, 0xF);

        let mut sink = VecSink(Vec::new());
        a.finish(&mut sink).unwrap();
        assert_eq!(&sink.0[0..4], b"DVLB");
    }

    #[test]
    fn uniform_sharing_across_files_s2() {
        let mut a = asm();
        a.assemble_file(".proc main\n.fvec myu\nnop\nend\n.end\n", "f1.vsh").unwrap();
        a.assemble_file(".proc main\n.fvec myu\nnop\nend\n.end\n", "f2.vsh").unwrap();
        assert_eq!(a.global_uniforms.iter().count(), 1);
        assert_eq!(a.modules[0].uniforms.len(), 1);
        assert_eq!(a.modules[1].uniforms.len(), 1);
        assert_eq!(a.modules[0].uniforms[0].position, a.modules[1].uniforms[0].position);
    }

    #[test]
    fn opdesc_merge_differs_only_by_dest_mask_s3() {
        let mut a = asm();
        a.assemble_file(".proc main\nmov r0.x, c0.x\nmov r0.y, c0.y\nend\n.end\n", "s3.vsh").unwrap();
        assert_eq!(a.opdescs.len(), 1);
    }

    #[test]
    fn else_padding_inserts_nop_between_jmpc_and_else() {
        let mut a = asm();
        a.assemble_file(
            ".proc main\nifc cmp.x\njmpc cmp.y, l\n.else\nnop\n.end\nl: nop\nend\n.end\n",
            "s4.vsh",
        )
        .unwrap();
        // jmpc is branch-class, so closing the else-arm body (containing
        // just jmpc) with `.else` forces a NOP before the else-jump word.
        let jmpc_idx = 1; // ifc, jmpc, <padding nop>, <else-jump nop>, nop, l:nop, end
        assert_eq!(a.code[jmpc_idx] >> 26, u32::from(u8::from(Opcode::Jmpc)));
        assert!(a.code.len() > 5);
    }

    #[test]
    fn mad_demotion_keeps_index_below_limit_s5() {
        let mut a = asm();
        let mut src = String::from(".proc main\n");
        for i in 0..40 {
            src.push_str(&format!("mov r0.x, c{}.x\n", i % 64));
        }
        src.push_str("mad r1, r2, c0, r3\n");
        src.push_str("end\n.end\n");
        a.assemble_file(&src, "s5.vsh").unwrap();
        let mad_word = *a.code.last().unwrap();
        assert!(mad_word & 0x1F < 32);
    }

    #[test]
    fn geometry_shader_switches_to_geometry_bundle_s6() {
        let mut a = asm();
        a.assemble_file(".gsh fixed c20 4\n.proc main\n.fvec extra\nnop\nend\n.end\n", "s6.vsh").unwrap();
        assert!(a.modules[0].is_geoshader);
        assert_eq!(a.modules[0].gsh_type, GshType::Fixed);
        // "extra" was allocated from the geometry bundle starting after the
        // declared fixed array (c20..c23), i.e. at c24.
        assert_eq!(a.modules[0].uniforms[0].position, 0x20 + 24);
    }

    #[test]
    fn unclosed_block_is_structure_error() {
        let mut a = asm();
        let err = a.assemble_file(".proc main\nnop\n", "bad.vsh").unwrap_err();
        assert!(matches!(err, AssembleError::Structure { .. }));
    }

    #[test]
    fn undefined_entry_point_is_symbol_error() {
        let mut a = asm();
        let err = a.assemble_file(".proc other\nnop\nend\n.end\n", "bad.vsh").unwrap_err();
        assert!(matches!(err, AssembleError::Symbol { .. }));
    }
}
