//! The binary wire protocol.
//!
//! All integers are little-endian. Every stream value is self-describing at
//! the root and inside `Any` fields: a recursive [`WireType`] descriptor
//! precedes the payload. Records travel as a `u16` class id; the first
//! occurrence of a class also carries its name and field table, later
//! occurrences reuse the cached table. Class-id caches are scoped to one
//! stream and reset explicitly via `clear_class_ids`.

mod de;
mod ser;
mod specialized;

pub use de::{BinaryDeserializeOptions, BinaryDeserializer, ClassDef, Slot, TableField};
pub use ser::{BinarySerializeOptions, BinarySerializer};
pub use specialized::{specialized_target, SpecializedReadFn, SpecializedReaders};

use crate::error::Error;
use crate::meta::FieldType;
use crate::rough::{RoughType, WireType};
use crate::unknown::UnknownItem;

/// Leading bytes of self-describing streams when `auto_signature` is on.
pub const SIGNATURE: [u8; 4] = [0x53, 0x57, 0x01, 0x00];

/// Count value encoding a null sequence or mapping.
pub(crate) const NULL_COUNT: i32 = -1;

/// The wire descriptor a field actually travels as, with unconditional
/// surrogates resolved to their substitute type. A conditional surrogate
/// keeps the `Record` kind: both branches must be records, and the class
/// name discriminates them on read.
pub(crate) fn effective_wire_type(ft: &FieldType) -> Result<WireType, Error> {
    match ft {
        FieldType::Record(f) => {
            let shape = f()?;
            if let Some(sg) = shape.surrogate() {
                if sg.to.is_some() && sg.cond.is_none() {
                    return effective_wire_type(&sg.ty);
                }
                if sg.to.is_some()
                    && !matches!(sg.ty, FieldType::Record(_) | FieldType::AnyRecord)
                {
                    return Err(Error::schema(
                        shape.class_name,
                        "conditional surrogate requires a record surrogate type",
                    ));
                }
            }
            Ok(WireType::Record)
        }
        FieldType::Seq(inner) => Ok(WireType::Sequence(Box::new(effective_wire_type(inner)?))),
        FieldType::Map(k, v) => Ok(WireType::Mapping(
            Box::new(effective_wire_type(k)?),
            Box::new(effective_wire_type(v)?),
        )),
        FieldType::Opt(inner) => Ok(WireType::Nullable(Box::new(effective_wire_type(inner)?))),
        other => Ok(other.wire_type()),
    }
}

/// Whether a stream descriptor can be read into the given field, resolving
/// surrogates the same way the writer does.
pub(crate) fn accepts_effective(ft: &FieldType, wire: &WireType) -> Result<bool, Error> {
    match ft {
        FieldType::Record(f) => {
            let shape = f()?;
            if let Some(sg) = shape.surrogate() {
                if sg.to.is_some() && sg.cond.is_none() {
                    return accepts_effective(&sg.ty, wire);
                }
            }
            Ok(matches!(wire, WireType::Record))
        }
        FieldType::Seq(inner) => match wire {
            WireType::Sequence(w) => accepts_effective(inner, w),
            _ => Ok(false),
        },
        FieldType::Map(k, v) => match wire {
            WireType::Mapping(wk, wv) => {
                Ok(accepts_effective(k, wk)? && accepts_effective(v, wv)?)
            }
            _ => Ok(false),
        },
        FieldType::Opt(inner) => match wire {
            WireType::Nullable(w) => accepts_effective(inner, w),
            _ => Ok(false),
        },
        other => Ok(other.accepts(wire)),
    }
}

/// The field type a generically decoded value of the given descriptor is
/// modeled as.
pub(crate) fn wire_to_field_type(wire: &WireType) -> FieldType {
    match wire {
        WireType::Atom(RoughType::Bool) => FieldType::Bool,
        WireType::Atom(RoughType::SByte) => FieldType::SByte,
        WireType::Atom(RoughType::Byte) => FieldType::Byte,
        WireType::Atom(RoughType::Short) => FieldType::Short,
        WireType::Atom(RoughType::UShort) => FieldType::UShort,
        WireType::Atom(RoughType::Int) => FieldType::Int,
        WireType::Atom(RoughType::UInt) => FieldType::UInt,
        WireType::Atom(RoughType::Long) => FieldType::Long,
        WireType::Atom(RoughType::ULong) => FieldType::ULong,
        WireType::Atom(RoughType::Float) => FieldType::Float,
        WireType::Atom(RoughType::Double) => FieldType::Double,
        WireType::Atom(RoughType::Decimal) => FieldType::Decimal,
        WireType::Atom(RoughType::Char) => FieldType::Char,
        WireType::Atom(RoughType::String) => FieldType::Str,
        WireType::Atom(RoughType::DateTime) => FieldType::DateTime,
        WireType::Atom(RoughType::TimeSpan) => FieldType::TimeSpan,
        WireType::Atom(_) => FieldType::Any,
        WireType::Record => FieldType::AnyRecord,
        WireType::Sequence(inner) => FieldType::Seq(Box::new(wire_to_field_type(inner))),
        WireType::Mapping(k, v) => FieldType::Map(
            Box::new(wire_to_field_type(k)),
            Box::new(wire_to_field_type(v)),
        ),
        WireType::Nullable(inner) => FieldType::Opt(Box::new(wire_to_field_type(inner))),
    }
}

/// The table descriptor for a preserved unknown field: the one it arrived
/// with when it came off a binary stream, otherwise one derived from the
/// decoded value.
pub(crate) fn unknown_item_wire(item: &UnknownItem) -> Result<WireType, Error> {
    if let Some(wire) = &item.wire {
        return Ok(wire.clone());
    }
    match item.value.runtime_field_type() {
        Some(ft) => effective_wire_type(&ft),
        // A null value with no recorded descriptor re-encodes as a null
        // record, the one null spelling every reader accepts generically.
        None => Ok(WireType::Record),
    }
}
