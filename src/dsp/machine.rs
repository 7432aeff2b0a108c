//! The virtual machine: program loading, per-sample execution and state
//! introspection.

use std::path::Path;

use serde::Serialize;

use crate::assembler::assemble;
use crate::config::{EmulatorConfig, IdleMode};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::disasm::disassemble;
use crate::dsp::delay::DelayMemory;
use crate::dsp::fixed::{self, Coeff, WORD_FRAC};
use crate::dsp::lfo::{frequency, LfoBank, Snapshot};
use crate::error::LoadError;
use crate::isa::{Instruction, Lfo, Reg, SkipCondition, DELAY_MASK, NAMED_REGISTERS, REGISTER_COUNT};
use crate::program::Program;

/// Where a program comes from.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    /// SPN assembly text.
    Spn(&'a str),
    /// Packed big-endian instruction words.
    Binary(&'a [u8]),
    /// Base64 of the packed words.
    Encoded(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadOutcome {
    Loaded,
    /// Installed, but assembly reported errors; see [`Machine::diagnostics`].
    LoadedWithErrors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Idle,
    Loaded,
}

// ── Execution state ─────────────────────────────────────────

/// Everything a program can change. Zeroed on every (re)load.
#[derive(Debug, Clone)]
struct State {
    regs: [i32; REGISTER_COUNT],
    acc: i32,
    pacc: i32,
    /// Last word read from delay memory.
    lr: i32,
    /// False until the first tick after a load has completed.
    running: bool,
    delay: DelayMemory,
    lfos: LfoBank,
}

impl State {
    fn new() -> Self {
        State {
            regs: [0; REGISTER_COUNT],
            acc: 0,
            pacc: 0,
            lr: 0,
            running: false,
            delay: DelayMemory::new(),
            lfos: LfoBank::new(),
        }
    }

    fn reset(&mut self) {
        self.regs = [0; REGISTER_COUNT];
        self.acc = 0;
        self.pacc = 0;
        self.lr = 0;
        self.running = false;
        self.delay.clear();
        self.lfos.reset();
    }

    #[inline]
    fn reg(&self, reg: Reg) -> i32 {
        self.regs[reg.index()]
    }

    #[inline]
    fn condition(&self, cond: SkipCondition) -> bool {
        let acc = self.acc;
        (!cond.has(SkipCondition::NEG) || acc < 0)
            && (!cond.has(SkipCondition::GEZ) || acc >= 0)
            && (!cond.has(SkipCondition::ZRO) || acc == 0)
            && (!cond.has(SkipCondition::ZRC) || (acc < 0) != (self.pacc < 0))
            && (!cond.has(SkipCondition::RUN) || self.running)
    }

    fn tick(&mut self, code: &[Instruction], inputs: [i32; 2], pots: [i32; 3]) -> (i32, i32) {
        self.regs[Reg::POT0.index()] = pots[0];
        self.regs[Reg::POT1.index()] = pots[1];
        self.regs[Reg::POT2.index()] = pots[2];
        self.regs[Reg::ADCL.index()] = inputs[0];
        self.regs[Reg::ADCR.index()] = inputs[1];

        self.lfos.tick(&self.regs);
        self.execute(code);

        self.delay.commit();
        self.delay.advance();
        self.pacc = self.acc;
        self.running = true;

        (self.reg(Reg::DACL), self.reg(Reg::DACR))
    }

    fn execute(&mut self, code: &[Instruction]) {
        use fixed::{abs, add, mul_coeff, mul_word, sub, word_bits, word_from_bits};

        let mut pc = 0;
        while pc < code.len() {
            let inst = code[pc];
            pc += 1;
            match inst {
                Instruction::Rda { addr, coeff } => {
                    self.lr = self.delay.read(addr);
                    self.acc = add(self.acc, mul_coeff(self.lr, coeff));
                }
                Instruction::Rmpa { coeff } => {
                    let addr = (self.reg(Reg::ADDR_PTR) >> 8) as u16 & DELAY_MASK;
                    self.lr = self.delay.read(addr);
                    self.acc = add(self.acc, mul_coeff(self.lr, coeff));
                }
                Instruction::Wra { addr, coeff } => {
                    self.delay.write(addr, self.acc);
                    self.acc = mul_coeff(self.acc, coeff);
                }
                Instruction::Wrap { addr, coeff } => {
                    self.delay.write(addr, self.acc);
                    self.acc = add(mul_coeff(self.acc, coeff), self.lr);
                }
                Instruction::Rdax { reg, coeff } => {
                    self.acc = add(self.acc, mul_coeff(self.reg(reg), coeff));
                }
                Instruction::Rdfx { reg, coeff } => {
                    let r = self.reg(reg);
                    self.acc = add(mul_coeff(sub(self.acc, r), coeff), r);
                }
                Instruction::Wrax { reg, coeff } => {
                    self.regs[reg.index()] = self.acc;
                    self.acc = mul_coeff(self.acc, coeff);
                }
                Instruction::Wrhx { reg, coeff } => {
                    self.regs[reg.index()] = self.acc;
                    self.acc = add(mul_coeff(self.acc, coeff), self.pacc);
                }
                Instruction::Wrlx { reg, coeff } => {
                    self.regs[reg.index()] = self.acc;
                    self.acc = add(mul_coeff(sub(self.pacc, self.acc), coeff), self.pacc);
                }
                Instruction::Maxx { reg, coeff } => {
                    self.acc = abs(self.acc).max(abs(mul_coeff(self.reg(reg), coeff)));
                }
                Instruction::Mulx { reg } => {
                    self.acc = mul_word(self.acc, self.reg(reg));
                }
                Instruction::Log { coeff, offset } => self.acc = log(self.acc, coeff, offset),
                Instruction::Exp { coeff, offset } => self.acc = exp(self.acc, coeff, offset),
                Instruction::Sof { coeff, offset } => {
                    self.acc = add(mul_coeff(self.acc, coeff), offset.as_word());
                }
                Instruction::And { mask } => self.acc = word_from_bits(word_bits(self.acc) & mask),
                Instruction::Or { mask } => self.acc = word_from_bits(word_bits(self.acc) | mask),
                Instruction::Xor { mask } => self.acc = word_from_bits(word_bits(self.acc) ^ mask),
                Instruction::Skp { cond, count } => {
                    if self.condition(cond) {
                        pc += count as usize;
                    }
                }
                Instruction::Wlds { lfo, freq, amp } => {
                    let (rate, range) = lfo_registers(lfo);
                    self.regs[rate] = (freq as i32) << 14;
                    self.regs[range] = (amp as i32) << 8;
                    self.lfos.sines[lfo.unit() as usize].reset();
                }
                Instruction::Wldr { lfo, freq, amp } => {
                    let (rate, range) = lfo_registers(lfo);
                    self.regs[rate] = (freq as i32) << 8;
                    self.regs[range] = (amp.samples() as i32) << 8;
                }
                Instruction::Jam { lfo } => self.lfos.jam(lfo),
                Instruction::ChoRda { lfo, flags, addr } => {
                    let m = self.lfos.snapshot(lfo, flags, &self.regs).modulation(flags);
                    let addr = (addr as i32).wrapping_add(m.samples) as u16 & DELAY_MASK;
                    self.lr = self.delay.read(addr);
                    self.acc = add(self.acc, mul_word(self.lr, m.coeff));
                }
                Instruction::ChoSof { lfo, flags, offset } => {
                    let m = self.lfos.snapshot(lfo, flags, &self.regs).modulation(flags);
                    self.acc = add(mul_word(self.acc, m.coeff), offset.as_word());
                }
                Instruction::ChoRdal { lfo, flags } => {
                    self.acc = self.lfos.snapshot(lfo, flags, &self.regs).modulation(flags).value;
                }
            }
        }
    }
}

/// Rate and range register indices of an LFO.
fn lfo_registers(lfo: Lfo) -> (usize, usize) {
    let rate = lfo.index() * 2;
    (rate, rate + 1)
}

/// `C * log2(|ACC|) + D`, in the S4.19 domain (log2 / 16).
fn log(acc: i32, coeff: Coeff, offset: Coeff) -> i32 {
    let x = fixed::to_real(fixed::abs(acc)).max(1.0 / (1u64 << WORD_FRAC) as f64);
    fixed::from_real((coeff.real() * x.log2() + offset.real()) / 16.0)
}

/// `C * 2^(ACC * 16) + D`, ACC read as S4.19.
fn exp(acc: i32, coeff: Coeff, offset: Coeff) -> i32 {
    let x = fixed::to_real(acc) * 16.0;
    fixed::from_real(coeff.real() * x.exp2() + offset.real())
}

// ── Machine ─────────────────────────────────────────────────

/// One emulated chip. `Idle` until a program is loaded.
#[derive(Debug, Clone)]
pub struct Machine {
    config: EmulatorConfig,
    program: Option<Program>,
    state: State,
    diagnostics: Diagnostics,
    /// Outcome of the load that installed `program`.
    outcome: Option<LoadOutcome>,
}

impl Machine {
    pub fn new() -> Self {
        Self::with_config(EmulatorConfig::default())
    }

    pub fn with_config(config: EmulatorConfig) -> Self {
        Machine {
            config,
            program: None,
            state: State::new(),
            diagnostics: Diagnostics::new(),
            outcome: None,
        }
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EmulatorConfig) {
        self.config = config;
    }

    pub fn status(&self) -> Status {
        if self.program.is_some() { Status::Loaded } else { Status::Idle }
    }

    pub fn is_loaded(&self) -> bool {
        self.program.is_some()
    }

    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    /// Log of the most recent load attempt.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    // ── Loading ──────────────────────────────────────────────

    /// Load a program. On `Err` the previous program and its state are
    /// left untouched; on `Ok` all state is zeroed.
    pub fn load(&mut self, name: &str, source: Source<'_>) -> Result<LoadOutcome, LoadError> {
        self.diagnostics.clear();

        let (program, diagnostics) = match source {
            Source::Spn(text) => match assemble(name, text) {
                Ok(asm) => (asm.program, asm.diagnostics),
                Err(diagnostics) => return Err(self.fail_structural(name, diagnostics)),
            },
            Source::Binary(bytes) => match Program::from_bytes(name, bytes) {
                Ok(program) => (program, Diagnostics::new()),
                Err(e) => return Err(self.fail_decode(name, e)),
            },
            Source::Encoded(text) => match Program::from_encoded(name, text) {
                Ok(program) => (program, Diagnostics::new()),
                Err(e) => return Err(self.fail_decode(name, e)),
            },
        };

        self.diagnostics = diagnostics;
        let outcome = if self.diagnostics.has_errors() {
            if self.config.reject_on_error {
                tracing::warn!(name, errors = self.diagnostics.error_count(), "program rejected");
                return Err(LoadError::Rejected(self.diagnostics.clone()));
            }
            LoadOutcome::LoadedWithErrors
        } else {
            LoadOutcome::Loaded
        };

        tracing::info!(
            name,
            instructions = program.len(),
            errors = self.diagnostics.error_count(),
            warnings = self.diagnostics.warning_count(),
            "program loaded"
        );
        self.state.reset();
        self.program = Some(program);
        self.outcome = Some(outcome);
        Ok(outcome)
    }

    fn fail_structural(&mut self, name: &str, diagnostics: Diagnostics) -> LoadError {
        tracing::warn!(name, reason = ?diagnostics.first_error_message(), "load aborted");
        self.diagnostics = diagnostics.clone();
        LoadError::Structural(diagnostics)
    }

    fn fail_decode(&mut self, name: &str, error: crate::error::AsmError) -> LoadError {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::error(error, None));
        self.fail_structural(name, diagnostics)
    }

    pub fn load_spn(&mut self, name: &str, source: &str) -> Result<LoadOutcome, LoadError> {
        self.load(name, Source::Spn(source))
    }

    pub fn load_encoded(&mut self, name: &str, encoded: &str) -> Result<LoadOutcome, LoadError> {
        self.load(name, Source::Encoded(encoded))
    }

    /// Load from a file: `.bin` is a binary image, `.b64` the encoded form,
    /// anything else is read as SPN text.
    pub fn load_path(&mut self, path: impl AsRef<Path>) -> Result<LoadOutcome, LoadError> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        tracing::debug!(path = %path.display(), "loading program file");

        match ext.as_str() {
            "bin" => {
                let bytes = std::fs::read(path)?;
                self.load(&name, Source::Binary(&bytes))
            }
            "b64" => {
                let bytes = std::fs::read(path)?;
                self.load(&name, Source::Encoded(&String::from_utf8_lossy(&bytes)))
            }
            // Patch files are often Windows-1252; stray bytes become U+FFFD
            // and only matter outside comments.
            _ => {
                let bytes = std::fs::read(path)?;
                self.load(&name, Source::Spn(&String::from_utf8_lossy(&bytes)))
            }
        }
    }

    /// Back to `Idle`.
    pub fn unload(&mut self) {
        if let Some(program) = self.program.take() {
            tracing::debug!(name = %program.name, "program unloaded");
        }
        self.outcome = None;
        self.state.reset();
        self.diagnostics.clear();
    }

    // ── Running ──────────────────────────────────────────────

    /// Process one sample. Pots are clamped to `0..=1`.
    pub fn run(&mut self, in_left: f32, in_right: f32, pot0: f32, pot1: f32, pot2: f32) -> (f32, f32) {
        let Some(program) = &self.program else {
            return match self.config.idle {
                IdleMode::Silence => (0.0, 0.0),
                IdleMode::Passthrough => (in_left, in_right),
            };
        };
        let pot = |p: f32| fixed::from_f32(p.clamp(0.0, 1.0));
        let (l, r) = self.state.tick(
            &program.instructions,
            [fixed::from_f32(in_left), fixed::from_f32(in_right)],
            [pot(pot0), pot(pot1), pot(pot2)],
        );
        (fixed::to_f32(l), fixed::to_f32(r))
    }

    /// Run a block of samples with fixed pot values.
    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32], pots: [f32; 3]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (out_l, out_r) = self.run(*l, *r, pots[0], pots[1], pots[2]);
            *l = out_l;
            *r = out_r;
        }
    }

    // ── Introspection ────────────────────────────────────────

    pub fn acc(&self) -> i32 {
        self.state.acc
    }

    pub fn pacc(&self) -> i32 {
        self.state.pacc
    }

    pub fn register(&self, reg: Reg) -> i32 {
        self.state.reg(reg)
    }

    pub fn delay_memory(&self) -> &DelayMemory {
        &self.state.delay
    }

    pub fn lfos(&self) -> &LfoBank {
        &self.state.lfos
    }

    /// Two-line summary: program name, then pot labels or size.
    pub fn get_display(&self) -> String {
        let Some(program) = &self.program else {
            return "No program loaded".to_string();
        };
        let mut title = program.name.clone();
        if self.outcome == Some(LoadOutcome::LoadedWithErrors) {
            title.push_str(" (loaded with errors)");
        }
        let detail = if program.pot_labels.iter().any(Option::is_some) {
            program
                .pot_labels
                .iter()
                .enumerate()
                .map(|(i, l)| format!("P{i}: {}", l.as_deref().unwrap_or("-")))
                .collect::<Vec<_>>()
                .join("  ")
        } else {
            format!("{} instructions", program.len())
        };
        format!("{title}\n{detail}")
    }

    pub fn describe(&self) -> String {
        self.get_display()
    }

    /// Snapshot of the whole machine, one record per `sep`-joined entry.
    pub fn dump_state(&self, sep: &str) -> String {
        let s = &self.state;
        let mut records = vec![
            format!("STATUS {:?}", self.status()),
            word_record("ACC", s.acc),
            word_record("PACC", s.pacc),
            word_record("LR", s.lr),
            format!("RUN {}", s.running),
            format!("DPTR {}", s.delay.write_ptr()),
        ];
        for (name, reg) in NAMED_REGISTERS {
            records.push(word_record(name, s.reg(reg)));
        }
        for i in 0..32u8 {
            let reg = Reg(Reg::REG0.0 + i);
            records.push(word_record(&format!("REG{i}"), s.reg(reg)));
        }
        for lfo in Lfo::ALL {
            let hz = frequency(lfo, &s.regs, self.config.sample_rate);
            records.push(match s.lfos.live(lfo, &s.regs) {
                Snapshot::Sine { sin, cos } => format!(
                    "{} sin={:+.6} cos={:+.6} freq={hz:.3}Hz",
                    lfo.name(),
                    fixed::to_real(sin),
                    fixed::to_real(cos)
                ),
                Snapshot::Ramp { phase, amp } => {
                    format!("{} phase=${phase:07X} amp={amp} freq={hz:.3}Hz", lfo.name())
                }
            });
        }
        if let Some(program) = &self.program {
            records.extend(disassemble(program).lines().map(str::to_string));
        }
        records.join(sep)
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

fn word_record(name: &str, word: i32) -> String {
    format!("{name} {:+.6} ${:06X}", fixed::to_real(word), fixed::word_bits(word))
}
