//! Static field type descriptors.

use crate::error::Error;
use crate::meta::{Shape, Shaped};
use crate::rough::{RoughType, WireType};

/// Resolves the shape of a concrete record field type.
pub type ShapeFn = fn() -> Result<&'static Shape, Error>;

pub(crate) fn shape_fn_of<T: Shaped>() -> Result<&'static Shape, Error> {
    Shape::of::<T>()
}

/// A closed-universe enum description: variant names paired with their wire
/// values.
#[derive(Debug, PartialEq, Eq)]
pub struct EnumDef {
    pub name: &'static str,
    pub variants: &'static [(&'static str, i32)],
}

impl EnumDef {
    pub fn name_of(&self, value: i32) -> Option<&'static str> {
        self.variants
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, _)| *n)
    }

    pub fn value_of(&self, name: &str) -> Option<i32> {
        self.variants
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }
}

/// The physical kind of a declared member, computed once from the static
/// field type. `Any` is the exception: its wire kind is resolved per instance
/// at write time.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Bool,
    SByte,
    Byte,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    Decimal,
    Char,
    Str,
    DateTime,
    TimeSpan,
    Enum(&'static EnumDef),
    /// A concrete record type.
    Record(ShapeFn),
    /// An open polymorphic record field (`Box<dyn Record>`).
    AnyRecord,
    /// A dynamically typed field (`Value`).
    Any,
    Seq(Box<FieldType>),
    Map(Box<FieldType>, Box<FieldType>),
    /// An explicitly nullable scalar (`Option` over an atom).
    Opt(Box<FieldType>),
}

impl FieldType {
    pub fn record_of<T: Shaped>() -> FieldType {
        FieldType::Record(shape_fn_of::<T>)
    }

    /// The self-describing descriptor this field writes into binary field
    /// tables. Surrogates are not applied here; codecs resolve the effective
    /// type first.
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldType::Bool => WireType::Atom(RoughType::Bool),
            FieldType::SByte => WireType::Atom(RoughType::SByte),
            FieldType::Byte => WireType::Atom(RoughType::Byte),
            FieldType::Short => WireType::Atom(RoughType::Short),
            FieldType::UShort => WireType::Atom(RoughType::UShort),
            FieldType::Int => WireType::Atom(RoughType::Int),
            FieldType::UInt => WireType::Atom(RoughType::UInt),
            FieldType::Long => WireType::Atom(RoughType::Long),
            FieldType::ULong => WireType::Atom(RoughType::ULong),
            FieldType::Float => WireType::Atom(RoughType::Float),
            FieldType::Double => WireType::Atom(RoughType::Double),
            FieldType::Decimal => WireType::Atom(RoughType::Decimal),
            FieldType::Char => WireType::Atom(RoughType::Char),
            FieldType::Str => WireType::Atom(RoughType::String),
            FieldType::DateTime => WireType::Atom(RoughType::DateTime),
            FieldType::TimeSpan => WireType::Atom(RoughType::TimeSpan),
            FieldType::Enum(_) => WireType::Atom(RoughType::Int),
            FieldType::Record(_) | FieldType::AnyRecord => WireType::Record,
            FieldType::Any => WireType::Atom(RoughType::Any),
            FieldType::Seq(inner) => WireType::Sequence(Box::new(inner.wire_type())),
            FieldType::Map(k, v) => {
                WireType::Mapping(Box::new(k.wire_type()), Box::new(v.wire_type()))
            }
            FieldType::Opt(inner) => WireType::Nullable(Box::new(inner.wire_type())),
        }
    }

    /// Whether a stream value of descriptor `wire` can be read into this
    /// field.
    pub fn accepts(&self, wire: &WireType) -> bool {
        match (self, wire) {
            (FieldType::Any, _) => true,
            (FieldType::Enum(_), WireType::Atom(RoughType::Int)) => true,
            (FieldType::Record(_) | FieldType::AnyRecord, WireType::Record) => true,
            (FieldType::Seq(inner), WireType::Sequence(w)) => inner.accepts(w),
            (FieldType::Map(k, v), WireType::Mapping(wk, wv)) => k.accepts(wk) && v.accepts(wv),
            (FieldType::Opt(inner), WireType::Nullable(w)) => inner.accepts(w),
            (ft, WireType::Atom(rt)) => ft.wire_type() == WireType::Atom(*rt),
            _ => false,
        }
    }

    /// True for scalar kinds that fit a oneline record layout.
    pub fn is_primitive(&self) -> bool {
        !matches!(
            self,
            FieldType::Record(_)
                | FieldType::AnyRecord
                | FieldType::Any
                | FieldType::Seq(_)
                | FieldType::Map(..)
        )
    }
}
