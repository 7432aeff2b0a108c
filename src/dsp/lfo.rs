//! On-chip LFOs: two integer sine oscillators and two ramp generators.
//!
//! Rates and ranges live in the register file (`SIN0_RATE` ..
//! `RMP1_RANGE`) and are re-read every tick, so a program can modulate
//! them with `WRAX` just like `WLDS`/`WLDR` do at load time.

use crate::dsp::fixed::{saturate, WORD_MAX};
use crate::isa::{ChoFlags, Lfo, Reg, REGISTER_COUNT};
use serde::Serialize;

/// Ramp phase accumulator width.
pub const RAMP_BITS: u32 = 27;
const RAMP_MASK: u32 = (1 << RAMP_BITS) - 1;
const RAMP_HALF: u32 = 1 << (RAMP_BITS - 1);

/// Unity as an S.23 coefficient, before saturation.
const ONE: i64 = 1 << 23;

// ── Sine ────────────────────────────────────────────────────

/// Coupled-form quadrature oscillator.
///
/// `rate` is the 9-bit WLDS frequency field: the angular step per tick is
/// `rate / 2^17` radians.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SineLfo {
    pub sin: i32,
    pub cos: i32,
}

impl SineLfo {
    pub const fn new() -> Self {
        SineLfo { sin: 0, cos: WORD_MAX }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[inline]
    pub fn tick(&mut self, rate_reg: i32) {
        let rate = (rate_reg >> 14).clamp(0, 0x1FF) as i64;
        self.sin = saturate(self.sin as i64 + ((self.cos as i64 * rate) >> 17));
        self.cos = saturate(self.cos as i64 - ((self.sin as i64 * rate) >> 17));
    }
}

impl Default for SineLfo {
    fn default() -> Self {
        Self::new()
    }
}

// ── Ramp ────────────────────────────────────────────────────

/// Sawtooth phase generator used for pitch shifting and crossfades.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RampLfo {
    pub phase: u32,
}

impl RampLfo {
    /// Advance by the signed 16-bit WLDR rate held in `rate_reg`.
    #[inline]
    pub fn tick(&mut self, rate_reg: i32) {
        let rate = rate_reg >> 8;
        self.phase = (self.phase as i64 + rate as i64) as u32 & RAMP_MASK;
    }

    pub fn jam(&mut self) {
        self.phase = 0;
    }
}

/// Phase as an S.23 fraction of one cycle.
#[inline]
fn phase_fraction(phase: u32) -> i64 {
    (phase >> (RAMP_BITS - 23)) as i64
}

/// Triangle over one ramp cycle: 0 at the ends, unity in the middle.
#[inline]
fn crossfade(phase: u32) -> i64 {
    let p = phase_fraction(phase);
    if p < ONE / 2 { 2 * p } else { 2 * (ONE - p) }
}

// ── CHO support ─────────────────────────────────────────────

/// LFO outputs captured for CHO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Snapshot {
    /// Range-scaled sine and cosine, as words.
    Sine { sin: i32, cos: i32 },
    /// Raw phase and excursion in samples.
    Ramp { phase: u32, amp: u32 },
}

/// What a CHO instruction derives from a snapshot and its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modulation {
    /// Whole-sample part of the address offset.
    pub samples: i32,
    /// Interpolation / crossfade coefficient, S.23.
    pub coeff: i32,
    /// The modulation value itself, S.23.
    pub value: i32,
}

impl Snapshot {
    pub fn modulation(self, flags: ChoFlags) -> Modulation {
        let (offset9, value, fade) = match self {
            Snapshot::Sine { sin, cos } => {
                let v = (if flags.has(ChoFlags::COS) { cos } else { sin }) as i64;
                (v, v, None)
            }
            Snapshot::Ramp { phase, amp } => {
                let phase = if flags.has(ChoFlags::RPTR2) {
                    (phase + RAMP_HALF) & RAMP_MASK
                } else {
                    phase
                };
                let v = phase_fraction(phase) * amp as i64 / 4096;
                let fade = flags.has(ChoFlags::NA).then(|| crossfade(phase));
                (v >> 2, v, fade)
            }
        };
        let offset9 = if flags.has(ChoFlags::COMPA) { -offset9 } else { offset9 };
        let value = if flags.has(ChoFlags::COMPA) { -value } else { value };

        let (samples, coeff) = match fade {
            Some(fade) => (0, fade),
            None => (offset9 >> 9, (offset9 & 0x1FF) << 14),
        };
        let coeff = if flags.has(ChoFlags::COMPC) { ONE - coeff } else { coeff };

        Modulation {
            samples: samples as i32,
            coeff: saturate(coeff),
            value: saturate(value),
        }
    }
}

// ── Bank ────────────────────────────────────────────────────

/// All four LFOs plus the values held by `CHO ... REG`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LfoBank {
    pub sines: [SineLfo; 2],
    pub ramps: [RampLfo; 2],
    held: [Snapshot; 4],
}

impl LfoBank {
    pub fn new() -> Self {
        LfoBank {
            sines: [SineLfo::new(); 2],
            ramps: [RampLfo::default(); 2],
            held: [
                Snapshot::Sine { sin: 0, cos: 0 },
                Snapshot::Sine { sin: 0, cos: 0 },
                Snapshot::Ramp { phase: 0, amp: 0 },
                Snapshot::Ramp { phase: 0, amp: 0 },
            ],
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn tick(&mut self, regs: &[i32; REGISTER_COUNT]) {
        self.sines[0].tick(regs[Reg::SIN0_RATE.index()]);
        self.sines[1].tick(regs[Reg::SIN1_RATE.index()]);
        self.ramps[0].tick(regs[Reg::RMP0_RATE.index()]);
        self.ramps[1].tick(regs[Reg::RMP1_RATE.index()]);
    }

    /// Current output of `lfo`, scaled by its range register.
    pub fn live(&self, lfo: Lfo, regs: &[i32; REGISTER_COUNT]) -> Snapshot {
        match lfo {
            Lfo::Sin0 | Lfo::Sin1 => {
                let (osc, range_reg) = if lfo == Lfo::Sin0 {
                    (self.sines[0], Reg::SIN0_RANGE)
                } else {
                    (self.sines[1], Reg::SIN1_RANGE)
                };
                let range = (regs[range_reg.index()] >> 8).clamp(0, 0x7FFF) as i64;
                Snapshot::Sine {
                    sin: ((osc.sin as i64 * range) >> 15) as i32,
                    cos: ((osc.cos as i64 * range) >> 15) as i32,
                }
            }
            Lfo::Rmp0 | Lfo::Rmp1 => {
                let (ramp, range_reg) = if lfo == Lfo::Rmp0 {
                    (self.ramps[0], Reg::RMP0_RANGE)
                } else {
                    (self.ramps[1], Reg::RMP1_RANGE)
                };
                let amp = (regs[range_reg.index()] >> 8).clamp(0, 4096) as u32;
                Snapshot::Ramp { phase: ramp.phase, amp }
            }
        }
    }

    /// The snapshot a CHO instruction works from. With `REG` the live value
    /// is latched first; without it the last latched value is reused.
    pub fn snapshot(&mut self, lfo: Lfo, flags: ChoFlags, regs: &[i32; REGISTER_COUNT]) -> Snapshot {
        if flags.has(ChoFlags::REG) {
            self.held[lfo.index()] = self.live(lfo, regs);
        }
        self.held[lfo.index()]
    }

    pub fn jam(&mut self, lfo: Lfo) {
        self.ramps[lfo.unit() as usize].jam();
    }
}

/// Frequency of `lfo` in Hz at `sample_rate`, from its rate register.
pub fn frequency(lfo: Lfo, regs: &[i32; REGISTER_COUNT], sample_rate: u32) -> f64 {
    let sample_rate = sample_rate as f64;
    match lfo {
        Lfo::Sin0 | Lfo::Sin1 => {
            let reg = if lfo == Lfo::Sin0 { Reg::SIN0_RATE } else { Reg::SIN1_RATE };
            let rate = (regs[reg.index()] >> 14).clamp(0, 0x1FF) as f64;
            rate * sample_rate / (2.0 * std::f64::consts::PI * (1u64 << 17) as f64)
        }
        Lfo::Rmp0 | Lfo::Rmp1 => {
            let reg = if lfo == Lfo::Rmp0 { Reg::RMP0_RATE } else { Reg::RMP1_RATE };
            let rate = (regs[reg.index()] >> 8) as f64;
            rate.abs() * sample_rate / (1u64 << RAMP_BITS) as f64
        }
    }
}

impl Default for LfoBank {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regs_with(pairs: &[(Reg, i32)]) -> [i32; REGISTER_COUNT] {
        let mut regs = [0; REGISTER_COUNT];
        for &(reg, value) in pairs {
            regs[reg.index()] = value;
        }
        regs
    }

    #[test]
    fn test_sine_quarter_period() {
        // rate 511: period 2*pi*2^17/511 ~ 1611.6 ticks
        let mut osc = SineLfo::new();
        for _ in 0..403 {
            osc.tick(511 << 14);
        }
        let full = WORD_MAX as f64;
        assert!(osc.sin as f64 > 0.98 * full, "sin {}", osc.sin);
        assert!((osc.cos as f64).abs() < 0.05 * full, "cos {}", osc.cos);
        for _ in 0..403 {
            osc.tick(511 << 14);
        }
        assert!((osc.sin as f64).abs() < 0.05 * full);
        assert!((osc.cos as f64) < -0.98 * full);
    }

    #[test]
    fn test_sine_zero_rate_holds_still() {
        let mut osc = SineLfo::new();
        for _ in 0..100 {
            osc.tick(0);
        }
        assert_eq!(osc, SineLfo::new());
    }

    #[test]
    fn test_ramp_wraps_both_directions() {
        let mut ramp = RampLfo::default();
        ramp.tick(-1 << 8);
        assert_eq!(ramp.phase, RAMP_MASK);
        ramp.tick(1 << 8);
        assert_eq!(ramp.phase, 0);
        for _ in 0..4096 {
            ramp.tick(32767 << 8);
        }
        assert_eq!(ramp.phase, (4096u64 * 32767 % (1 << 27)) as u32);
        ramp.jam();
        assert_eq!(ramp.phase, 0);
    }

    #[test]
    fn test_sine_modulation_splits_offset() {
        let snap = Snapshot::Sine { sin: (10 << 9) | 0x100, cos: 0 };
        let m = snap.modulation(ChoFlags(0));
        assert_eq!(m.samples, 10);
        assert_eq!(m.coeff, 0x100 << 14);
        let m = snap.modulation(ChoFlags(ChoFlags::COMPC));
        assert_eq!(m.coeff, (1 << 23) - (0x100 << 14));
        let m = snap.modulation(ChoFlags(ChoFlags::COMPA));
        assert_eq!(m.samples, -11);
        assert_eq!(m.value, -((10 << 9) | 0x100));
    }

    #[test]
    fn test_ramp_modulation() {
        // Half a cycle at 4096 samples of excursion is 2048 samples.
        let half = Snapshot::Ramp { phase: RAMP_HALF, amp: 4096 };
        assert_eq!(half.modulation(ChoFlags(0)).samples, 2048);
        let zero = Snapshot::Ramp { phase: 0, amp: 4096 };
        assert_eq!(zero.modulation(ChoFlags(ChoFlags::RPTR2)).samples, 2048);

        let quarter = Snapshot::Ramp { phase: RAMP_HALF / 2, amp: 1024 };
        let m = quarter.modulation(ChoFlags(ChoFlags::NA));
        assert_eq!(m.samples, 0);
        assert_eq!(m.coeff, 1 << 22);
        assert_eq!(half.modulation(ChoFlags(ChoFlags::NA)).coeff, WORD_MAX);
    }

    #[test]
    fn test_frequency_in_hz() {
        let regs = regs_with(&[(Reg::SIN1_RATE, 511 << 14), (Reg::RMP0_RATE, 16384 << 8), (Reg::RMP1_RATE, -8192 << 8)]);
        assert_eq!(frequency(Lfo::Rmp0, &regs, 32768), 4.0);
        assert_eq!(frequency(Lfo::Rmp1, &regs, 32768), 2.0);
        assert_eq!(frequency(Lfo::Sin0, &regs, 32768), 0.0);
        let sin = frequency(Lfo::Sin1, &regs, 32768);
        assert!((sin - 511.0 / (8.0 * std::f64::consts::PI)).abs() < 1e-9, "{sin}");
    }

    #[test]
    fn test_reg_flag_latches() {
        let regs = regs_with(&[(Reg::SIN0_RATE, 511 << 14), (Reg::SIN0_RANGE, 0x7FFF << 8)]);
        let mut bank = LfoBank::new();
        for _ in 0..50 {
            bank.tick(&regs);
        }
        let latched = bank.snapshot(Lfo::Sin0, ChoFlags(ChoFlags::REG), &regs);
        assert!(matches!(latched, Snapshot::Sine { sin, .. } if sin > 0));
        bank.tick(&regs);
        assert_eq!(bank.snapshot(Lfo::Sin0, ChoFlags(0), &regs), latched);
        assert_ne!(bank.live(Lfo::Sin0, &regs), latched);
    }
}
