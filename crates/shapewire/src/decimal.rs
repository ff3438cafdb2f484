//! 128-bit decimal scalar with the .NET bit layout.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

const SCALE_SHIFT: u32 = 16;
const SCALE_MASK: u32 = 0x00FF_0000;
const SIGN_MASK: u32 = 0x8000_0000;
const MAX_SCALE: u32 = 28;

/// A decimal number with a 96-bit mantissa and a scale of 0..=28, stored in
/// the same four-word layout the wire format uses: `lo`, `mid`, `hi` mantissa
/// words plus a `flags` word carrying the scale (bits 16-23) and the sign
/// (bit 31).
///
/// On the wire it is 16 raw bytes, each word little-endian, in
/// `lo mid hi flags` order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decimal {
    lo: u32,
    mid: u32,
    hi: u32,
    flags: u32,
}

impl Decimal {
    pub fn from_parts(mantissa: u128, scale: u32, negative: bool) -> Result<Decimal, Error> {
        if scale > MAX_SCALE {
            return Err(Error::Overflow { target: "Decimal" });
        }
        if mantissa >> 96 != 0 {
            return Err(Error::Overflow { target: "Decimal" });
        }
        let mut flags = scale << SCALE_SHIFT;
        if negative {
            flags |= SIGN_MASK;
        }
        Ok(Decimal {
            lo: mantissa as u32,
            mid: (mantissa >> 32) as u32,
            hi: (mantissa >> 64) as u32,
            flags,
        })
    }

    pub fn mantissa(&self) -> u128 {
        (self.hi as u128) << 64 | (self.mid as u128) << 32 | self.lo as u128
    }

    pub fn scale(&self) -> u32 {
        (self.flags & SCALE_MASK) >> SCALE_SHIFT
    }

    pub fn is_negative(&self) -> bool {
        self.flags & SIGN_MASK != 0 && self.mantissa() != 0
    }

    /// Encodes the 16-byte wire form.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.lo.to_le_bytes());
        out[4..8].copy_from_slice(&self.mid.to_le_bytes());
        out[8..12].copy_from_slice(&self.hi.to_le_bytes());
        out[12..16].copy_from_slice(&self.flags.to_le_bytes());
        out
    }

    /// Decodes the 16-byte wire form.
    pub fn from_bytes(bytes: &[u8; 16]) -> Result<Decimal, Error> {
        let word = |i: usize| {
            u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
        };
        let d = Decimal {
            lo: word(0),
            mid: word(4),
            hi: word(8),
            flags: word(12),
        };
        if d.flags & !(SCALE_MASK | SIGN_MASK) != 0 || d.scale() > MAX_SCALE {
            return Err(Error::stream("bad decimal flags"));
        }
        Ok(d)
    }
}

impl From<i64> for Decimal {
    fn from(v: i64) -> Decimal {
        Decimal::from_parts(v.unsigned_abs() as u128, 0, v < 0).expect("i64 fits 96 bits")
    }
}

impl From<u64> for Decimal {
    fn from(v: u64) -> Decimal {
        Decimal::from_parts(v as u128, 0, false).expect("u64 fits 96 bits")
    }
}

impl From<i32> for Decimal {
    fn from(v: i32) -> Decimal {
        Decimal::from(v as i64)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa().to_string();
        let scale = self.scale() as usize;
        if self.is_negative() {
            write!(f, "-")?;
        }
        if scale == 0 {
            return write!(f, "{digits}");
        }
        if digits.len() > scale {
            let (int, frac) = digits.split_at(digits.len() - scale);
            write!(f, "{int}.{frac}")
        } else {
            write!(f, "0.{:0>width$}", digits, width = scale)
        }
    }
}

impl FromStr for Decimal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Decimal, Error> {
        let bad = || Error::stream(format!("bad decimal literal '{s}'"));
        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        if rest.is_empty() {
            return Err(bad());
        }
        let (int_part, frac_part) = match rest.split_once('.') {
            Some((i, f)) => (i, f),
            None => (rest, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(bad());
        }
        let mut mantissa: u128 = 0;
        for ch in int_part.chars().chain(frac_part.chars()) {
            let d = ch.to_digit(10).ok_or_else(bad)?;
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(d as u128))
                .ok_or(Error::Overflow { target: "Decimal" })?;
        }
        Decimal::from_parts(mantissa, frac_part.len() as u32, negative)
    }
}
