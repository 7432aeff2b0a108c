//! Fixed-point numerics shared by the assembler and the machine.
//!
//! Every value lives in an `i32`. A [`Format`] only says where the binary
//! point sits and how many bits the field has; the machine word itself is
//! S.23 (24 bits, range [-1, 1)). All arithmetic saturates silently.

use serde::Serialize;
use std::fmt;

/// Largest S.23 value (just under 1.0).
pub const WORD_MAX: i32 = (1 << 23) - 1;
/// Smallest S.23 value (-1.0).
pub const WORD_MIN: i32 = -(1 << 23);
/// Fractional bits of the machine word.
pub const WORD_FRAC: u8 = 23;

/// A signed two's-complement fixed-point format `S<int>.<frac>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Format {
    pub int_bits: u8,
    pub frac_bits: u8,
}

impl Format {
    /// Machine word: accumulator, registers and delay memory.
    pub const S_23: Format = Format::new(0, 23);
    /// RDAX-family, SOF, LOG and EXP multipliers.
    pub const S1_14: Format = Format::new(1, 14);
    /// Delay-memory access multipliers.
    pub const S1_9: Format = Format::new(1, 9);
    /// SOF and EXP offsets.
    pub const S_10: Format = Format::new(0, 10);
    /// LOG offset.
    pub const S4_6: Format = Format::new(4, 6);
    /// CHO SOF offset.
    pub const S_15: Format = Format::new(0, 15);

    pub const fn new(int_bits: u8, frac_bits: u8) -> Self {
        Format { int_bits, frac_bits }
    }

    /// Field width in bits, sign included.
    pub const fn width(self) -> u32 {
        1 + self.int_bits as u32 + self.frac_bits as u32
    }

    pub const fn max_raw(self) -> i32 {
        (1 << (self.width() - 1)) - 1
    }

    pub const fn min_raw(self) -> i32 {
        -(1 << (self.width() - 1))
    }

    fn scale(self) -> f64 {
        (1u64 << self.frac_bits) as f64
    }

    /// Exclusive upper bound of the real range (`2^int`).
    pub fn limit(self) -> f64 {
        (1u64 << self.int_bits) as f64
    }

    pub fn to_real(self, raw: i32) -> f64 {
        raw as f64 / self.scale()
    }

    /// Quantise a real value by rounding to nearest.
    ///
    /// Values below `-2^int` or above `2^int` are rejected; values between
    /// the largest representable value and `2^int` come back clamped with
    /// `Clamp::Clamped`.
    pub fn from_real(self, value: f64) -> Result<(i32, Clamp), RangeError> {
        if !value.is_finite() || value < -self.limit() || value > self.limit() {
            return Err(RangeError { format: self, value });
        }
        let raw = (value * self.scale()).round();
        if raw > self.max_raw() as f64 {
            Ok((self.max_raw(), Clamp::Clamped))
        } else {
            Ok((raw as i32, Clamp::Exact))
        }
    }

    /// Interpret the low `width()` bits of `bits` as a signed value.
    pub fn from_bits(self, bits: u32) -> i32 {
        let shift = 32 - self.width();
        ((bits << shift) as i32) >> shift
    }

    /// The raw value as an unsigned field of `width()` bits.
    pub fn to_bits(self, raw: i32) -> u32 {
        (raw as u32) & self.mask()
    }

    pub fn mask(self) -> u32 {
        ((1u64 << self.width()) - 1) as u32
    }

    /// Raw value shifted so its binary point lines up with the machine word.
    fn align(self, raw: i32) -> i64 {
        (raw as i64) << (WORD_FRAC - self.frac_bits)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.int_bits == 0 {
            write!(f, "S.{}", self.frac_bits)
        } else {
            write!(f, "S{}.{}", self.int_bits, self.frac_bits)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clamp {
    Exact,
    Clamped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeError {
    pub format: Format,
    pub value: f64,
}

impl RangeError {
    /// Human range description, e.g. `[-2, 2)`.
    pub fn range(&self) -> String {
        format!("[{}, {})", -self.format.limit(), self.format.limit())
    }
}

/// A coefficient operand: raw value plus the format it was encoded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Coeff {
    pub raw: i32,
    pub format: Format,
}

impl Coeff {
    pub const fn new(format: Format, raw: i32) -> Self {
        Coeff { raw, format }
    }

    pub const fn zero(format: Format) -> Self {
        Coeff { raw: 0, format }
    }

    pub fn from_bits(format: Format, bits: u32) -> Self {
        Coeff { raw: format.from_bits(bits), format }
    }

    pub fn bits(self) -> u32 {
        self.format.to_bits(self.raw)
    }

    pub fn real(self) -> f64 {
        self.format.to_real(self.raw)
    }

    /// The value as a machine word, saturated.
    pub fn as_word(self) -> i32 {
        saturate(self.format.align(self.raw))
    }
}

/// Prints the shortest decimal that assembles back to the same raw value.
impl fmt::Display for Coeff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let real = self.real();
        if real == real.trunc() {
            write!(f, "{real:.1}")
        } else {
            write!(f, "{real}")
        }
    }
}

/// Clamp to the machine word range.
#[inline]
pub fn saturate(value: i64) -> i32 {
    value.clamp(WORD_MIN as i64, WORD_MAX as i64) as i32
}

#[inline]
pub fn add(a: i32, b: i32) -> i32 {
    saturate(a as i64 + b as i64)
}

#[inline]
pub fn sub(a: i32, b: i32) -> i32 {
    saturate(a as i64 - b as i64)
}

/// Multiply a word by a coefficient with `frac_bits` fractional bits.
///
/// The full product is formed in 64 bits, half an LSB is added, and the
/// result is shifted back to S.23 and saturated (round half up).
#[inline]
pub fn mul(word: i32, coeff: i32, frac_bits: u8) -> i32 {
    let product = word as i64 * coeff as i64;
    if frac_bits == 0 {
        return saturate(product);
    }
    let half = 1i64 << (frac_bits - 1);
    saturate((product + half) >> frac_bits)
}

#[inline]
pub fn mul_coeff(word: i32, coeff: Coeff) -> i32 {
    mul(word, coeff.raw, coeff.format.frac_bits)
}

/// Word times word.
#[inline]
pub fn mul_word(a: i32, b: i32) -> i32 {
    mul(a, b, WORD_FRAC)
}

#[inline]
pub fn abs(word: i32) -> i32 {
    saturate((word as i64).abs())
}

/// Convert an audio-rate float to a word, saturating.
#[inline]
pub fn from_f32(value: f32) -> i32 {
    if value.is_nan() {
        return 0;
    }
    saturate((value as f64 * (1u64 << WORD_FRAC) as f64).round() as i64)
}

#[inline]
pub fn to_f32(word: i32) -> f32 {
    (word as f64 / (1u64 << WORD_FRAC) as f64) as f32
}

pub fn to_real(word: i32) -> f64 {
    Format::S_23.to_real(word)
}

/// Quantise an `f64` to a word, saturating.
pub fn from_real(value: f64) -> i32 {
    if value.is_nan() {
        return 0;
    }
    saturate((value * (1u64 << WORD_FRAC) as f64).round() as i64)
}

/// The low 24 bits of a word.
#[inline]
pub fn word_bits(word: i32) -> u32 {
    Format::S_23.to_bits(word)
}

/// Sign-extend 24 bits back into a word.
#[inline]
pub fn word_from_bits(bits: u32) -> i32 {
    Format::S_23.from_bits(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ranges() {
        assert_eq!(Format::S1_14.width(), 16);
        assert_eq!(Format::S1_14.max_raw(), 32767);
        assert_eq!(Format::S1_14.min_raw(), -32768);
        assert_eq!(Format::S_10.width(), 11);
        assert_eq!(Format::S4_6.width(), 11);
        assert_eq!(Format::S1_9.width(), 11);
        assert_eq!(Format::S_23.max_raw(), WORD_MAX);
    }

    #[test]
    fn test_from_real_rounds_and_rejects() {
        assert_eq!(Format::S1_14.from_real(0.5), Ok((8192, Clamp::Exact)));
        assert_eq!(Format::S1_14.from_real(-2.0), Ok((-32768, Clamp::Exact)));
        assert_eq!(Format::S_10.from_real(1.0), Ok((1023, Clamp::Clamped)));
        assert!(Format::S_10.from_real(1.5).is_err());
        assert!(Format::S1_9.from_real(-2.01).is_err());
        assert!(Format::S1_14.from_real(f64::NAN).is_err());
    }

    #[test]
    fn test_bits_sign_extend() {
        assert_eq!(Format::S1_9.from_bits(0x7FF), -1);
        assert_eq!(Format::S1_9.from_bits(0x400), -1024);
        assert_eq!(Format::S1_9.to_bits(-1), 0x7FF);
        assert_eq!(word_from_bits(0xFFFFFF), -1);
        assert_eq!(word_bits(-1), 0xFFFFFF);
    }

    #[test]
    fn test_saturation_at_extremes() {
        assert_eq!(add(WORD_MAX, WORD_MAX), WORD_MAX);
        assert_eq!(add(WORD_MIN, WORD_MIN), WORD_MIN);
        assert_eq!(sub(WORD_MIN, WORD_MAX), WORD_MIN);
        assert_eq!(abs(WORD_MIN), WORD_MAX);
        // -1.0 * -2.0 would be 2.0
        assert_eq!(mul(WORD_MIN, Format::S1_14.min_raw(), 14), WORD_MAX);
        assert_eq!(mul(WORD_MAX, Format::S1_14.min_raw(), 14), WORD_MIN);
        assert_eq!(mul(WORD_MAX, Format::S1_14.max_raw(), 14), WORD_MAX);
        assert_eq!(mul_word(WORD_MIN, WORD_MIN), WORD_MAX);
        for &a in &[WORD_MIN, -1, 0, 1, WORD_MAX] {
            for &c in &[-32768, -1, 0, 1, 32767] {
                let r = mul(a, c, 14);
                assert!((WORD_MIN..=WORD_MAX).contains(&r));
            }
        }
    }

    #[test]
    fn test_mul_rounds_half_up() {
        // 3 * 0.5 = 1.5 LSB -> 2
        assert_eq!(mul(3, 8192, 14), 2);
        // -3 * 0.5 = -1.5 LSB -> -1
        assert_eq!(mul(-3, 8192, 14), -1);
        // 1 * 0.25 = 0.25 LSB -> 0
        assert_eq!(mul(1, 4096, 14), 0);
    }

    #[test]
    fn test_f32_conversion() {
        assert_eq!(from_f32(0.5), 1 << 22);
        assert_eq!(from_f32(1.0), WORD_MAX);
        assert_eq!(from_f32(-4.0), WORD_MIN);
        assert_eq!(from_f32(f32::NAN), 0);
        assert_eq!(to_f32(1 << 22), 0.5);
    }

    #[test]
    fn test_coeff_display_reparses() {
        for raw in [-32768, -16384, -1, 0, 1, 8191, 16384, 32767] {
            let c = Coeff::new(Format::S1_14, raw);
            let text = c.to_string();
            let value: f64 = text.parse().unwrap();
            assert_eq!(Format::S1_14.from_real(value).unwrap().0, raw, "{text}");
        }
        assert_eq!(Coeff::new(Format::S1_14, 16384).to_string(), "1.0");
        assert_eq!(Coeff::new(Format::S_10, -512).to_string(), "-0.5");
    }

    #[test]
    fn test_coeff_as_word() {
        assert_eq!(Coeff::new(Format::S_10, 512).as_word(), 1 << 22);
        assert_eq!(Coeff::new(Format::S4_6, 64).as_word(), WORD_MAX);
        assert_eq!(Coeff::new(Format::S4_6, -640).as_word(), WORD_MIN);
    }
}
