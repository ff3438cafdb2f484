//! The wire tag vocabulary shared by both protocols.

use shapewire_buffers::{Reader, Writer};

use crate::error::Error;

/// Physical value kind of a wire value. These byte values are part of the
/// binary format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RoughType {
    None = 0,
    SByte = 1,
    Byte = 2,
    Short = 3,
    UShort = 4,
    Int = 5,
    UInt = 6,
    Long = 7,
    ULong = 8,
    Bool = 9,
    Char = 10,
    Float = 11,
    Double = 12,
    Decimal = 13,
    DateTime = 14,
    TimeSpan = 15,
    String = 16,
    Any = 17,
    Nullable = 18,

    Record = 32,
    Sequence = 33,
    Mapping = 34,
}

impl RoughType {
    pub const FIRST_ATOM: u8 = RoughType::SByte as u8;
    pub const LAST_ATOM: u8 = RoughType::Any as u8;

    pub fn from_byte(b: u8) -> Option<RoughType> {
        use RoughType::*;
        Some(match b {
            1 => SByte,
            2 => Byte,
            3 => Short,
            4 => UShort,
            5 => Int,
            6 => UInt,
            7 => Long,
            8 => ULong,
            9 => Bool,
            10 => Char,
            11 => Float,
            12 => Double,
            13 => Decimal,
            14 => DateTime,
            15 => TimeSpan,
            16 => String,
            17 => Any,
            18 => Nullable,
            32 => Record,
            33 => Sequence,
            34 => Mapping,
            _ => return Option::None,
        })
    }

    pub fn is_atom(self) -> bool {
        let b = self as u8;
        (Self::FIRST_ATOM..=Self::LAST_ATOM).contains(&b)
    }
}

/// Recursive self-describing type descriptor.
///
/// Field tables and `Any` values carry a `WireType`, which is enough to
/// decode any value generically without consulting a static schema. This is
/// what makes unknown-field tolerance possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireType {
    Atom(RoughType),
    Nullable(Box<WireType>),
    Record,
    Sequence(Box<WireType>),
    Mapping(Box<WireType>, Box<WireType>),
}

impl WireType {
    /// The leading tag byte of this descriptor.
    pub fn rough(&self) -> RoughType {
        match self {
            WireType::Atom(rt) => *rt,
            WireType::Nullable(_) => RoughType::Nullable,
            WireType::Record => RoughType::Record,
            WireType::Sequence(_) => RoughType::Sequence,
            WireType::Mapping(..) => RoughType::Mapping,
        }
    }

    pub fn write(&self, w: &mut Writer) {
        w.u8(self.rough() as u8);
        match self {
            WireType::Atom(_) | WireType::Record => {}
            WireType::Nullable(inner) | WireType::Sequence(inner) => inner.write(w),
            WireType::Mapping(k, v) => {
                k.write(w);
                v.write(w);
            }
        }
    }

    pub fn read(r: &mut Reader<'_>) -> Result<WireType, Error> {
        let at = r.position() as u64;
        let b = r.u8()?;
        let rt = RoughType::from_byte(b)
            .ok_or_else(|| Error::stream_at(format!("unknown rough type {b}"), at))?;
        Ok(match rt {
            RoughType::Record => WireType::Record,
            RoughType::Nullable => WireType::Nullable(Box::new(WireType::read(r)?)),
            RoughType::Sequence => WireType::Sequence(Box::new(WireType::read(r)?)),
            RoughType::Mapping => {
                let k = WireType::read(r)?;
                let v = WireType::read(r)?;
                WireType::Mapping(Box::new(k), Box::new(v))
            }
            RoughType::None => return Err(Error::stream_at("unknown rough type 0", at)),
            atom => WireType::Atom(atom),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rough_type_bytes_are_stable() {
        assert_eq!(RoughType::SByte as u8, 1);
        assert_eq!(RoughType::Any as u8, 17);
        assert_eq!(RoughType::Nullable as u8, 18);
        assert_eq!(RoughType::Record as u8, 32);
        assert_eq!(RoughType::Sequence as u8, 33);
        assert_eq!(RoughType::Mapping as u8, 34);
    }

    #[test]
    fn wire_type_roundtrip() {
        let cases = [
            WireType::Atom(RoughType::Int),
            WireType::Record,
            WireType::Nullable(Box::new(WireType::Atom(RoughType::Bool))),
            WireType::Sequence(Box::new(WireType::Record)),
            WireType::Mapping(
                Box::new(WireType::Atom(RoughType::Int)),
                Box::new(WireType::Sequence(Box::new(WireType::Atom(
                    RoughType::String,
                )))),
            ),
        ];
        for wt in cases {
            let mut w = Writer::new();
            wt.write(&mut w);
            let data = w.flush();
            let mut r = Reader::new(&data);
            assert_eq!(WireType::read(&mut r).unwrap(), wt);
            assert!(r.is_empty());
        }
    }

    #[test]
    fn mapping_of_ints_encodes_as_three_bytes() {
        let wt = WireType::Mapping(
            Box::new(WireType::Atom(RoughType::Int)),
            Box::new(WireType::Atom(RoughType::Int)),
        );
        let mut w = Writer::new();
        wt.write(&mut w);
        assert_eq!(w.flush(), vec![34, 5, 5]);
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let mut r = Reader::new(&[19]);
        assert!(WireType::read(&mut r).is_err());
    }
}
