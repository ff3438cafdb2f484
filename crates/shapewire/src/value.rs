//! The semantic value model shared by both wire protocols.
//!
//! Every value the generic codec paths touch is a [`Value`]. Member accessors
//! produce and consume them, unknown data is preserved as them, and the
//! [`FieldValue`] trait defines how concrete Rust field types convert to and
//! from them.

use std::collections::HashMap;
use std::hash::Hash;

use crate::decimal::Decimal;
use crate::error::Error;
use crate::meta::{EnumDef, FieldType, Record, Shaped};
use crate::time::{DateTime, TimeSpan};
use crate::unknown::UnknownRecord;

/// A dynamically typed wire value.
#[derive(Debug)]
pub enum Value {
    Null,
    Bool(bool),
    SByte(i8),
    Byte(u8),
    Short(i16),
    UShort(u16),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Char(char),
    Str(String),
    DateTime(DateTime),
    TimeSpan(TimeSpan),
    Enum(&'static EnumDef, i32),
    Seq {
        elem: FieldType,
        items: Vec<Value>,
    },
    Map {
        key: FieldType,
        val: FieldType,
        entries: Vec<(Value, Value)>,
    },
    Record(Box<dyn Record>),
    Unknown(UnknownRecord),
}

impl Clone for Value {
    fn clone(&self) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Bool(v) => Value::Bool(*v),
            Value::SByte(v) => Value::SByte(*v),
            Value::Byte(v) => Value::Byte(*v),
            Value::Short(v) => Value::Short(*v),
            Value::UShort(v) => Value::UShort(*v),
            Value::Int(v) => Value::Int(*v),
            Value::UInt(v) => Value::UInt(*v),
            Value::Long(v) => Value::Long(*v),
            Value::ULong(v) => Value::ULong(*v),
            Value::Float(v) => Value::Float(*v),
            Value::Double(v) => Value::Double(*v),
            Value::Decimal(v) => Value::Decimal(*v),
            Value::Char(v) => Value::Char(*v),
            Value::Str(v) => Value::Str(v.clone()),
            Value::DateTime(v) => Value::DateTime(*v),
            Value::TimeSpan(v) => Value::TimeSpan(*v),
            Value::Enum(def, v) => Value::Enum(def, *v),
            Value::Seq { elem, items } => Value::Seq {
                elem: elem.clone(),
                items: items.clone(),
            },
            Value::Map { key, val, entries } => Value::Map {
                key: key.clone(),
                val: val.clone(),
                entries: entries.clone(),
            },
            Value::Record(r) => Value::Record(r.clone_boxed()),
            Value::Unknown(u) => Value::Unknown(u.clone()),
        }
    }
}

/// Structural equality. Records compare unequal: reference-typed members are
/// always written even under default-skip, matching the write policy for
/// class instances.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::SByte(a), Value::SByte(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::UShort(a), Value::UShort(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::ULong(a), Value::ULong(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::TimeSpan(a), Value::TimeSpan(b)) => a == b,
            (Value::Enum(_, a), Value::Enum(_, b)) => a == b,
            (Value::Seq { items: a, .. }, Value::Seq { items: b, .. }) => a == b,
            (Value::Map { entries: a, .. }, Value::Map { entries: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// A short kind name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::SByte(_) => "sbyte",
            Value::Byte(_) => "byte",
            Value::Short(_) => "short",
            Value::UShort(_) => "ushort",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Long(_) => "long",
            Value::ULong(_) => "ulong",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Decimal(_) => "decimal",
            Value::Char(_) => "char",
            Value::Str(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::TimeSpan(_) => "timespan",
            Value::Enum(..) => "enum",
            Value::Seq { .. } => "sequence",
            Value::Map { .. } => "mapping",
            Value::Record(_) => "record",
            Value::Unknown(_) => "unknown record",
        }
    }

    /// The runtime field type of this value, used to tag `Any` members.
    /// `Null` has no runtime type.
    pub fn runtime_field_type(&self) -> Option<FieldType> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => FieldType::Bool,
            Value::SByte(_) => FieldType::SByte,
            Value::Byte(_) => FieldType::Byte,
            Value::Short(_) => FieldType::Short,
            Value::UShort(_) => FieldType::UShort,
            Value::Int(_) => FieldType::Int,
            Value::UInt(_) => FieldType::UInt,
            Value::Long(_) => FieldType::Long,
            Value::ULong(_) => FieldType::ULong,
            Value::Float(_) => FieldType::Float,
            Value::Double(_) => FieldType::Double,
            Value::Decimal(_) => FieldType::Decimal,
            Value::Char(_) => FieldType::Char,
            Value::Str(_) => FieldType::Str,
            Value::DateTime(_) => FieldType::DateTime,
            Value::TimeSpan(_) => FieldType::TimeSpan,
            Value::Enum(def, _) => FieldType::Enum(def),
            Value::Seq { elem, .. } => FieldType::Seq(Box::new(elem.clone())),
            Value::Map { key, val, .. } => {
                FieldType::Map(Box::new(key.clone()), Box::new(val.clone()))
            }
            Value::Record(_) | Value::Unknown(_) => FieldType::AnyRecord,
        })
    }

    fn as_int(&self) -> Option<i128> {
        Some(match self {
            Value::SByte(v) => *v as i128,
            Value::Byte(v) => *v as i128,
            Value::Short(v) => *v as i128,
            Value::UShort(v) => *v as i128,
            Value::Int(v) => *v as i128,
            Value::UInt(v) => *v as i128,
            Value::Long(v) => *v as i128,
            Value::ULong(v) => *v as i128,
            _ => return None,
        })
    }

    #[doc(hidden)]
    pub fn mismatch(&self, expected: &'static str) -> Error {
        Error::stream(format!("expected {expected} value, got {}", self.kind()))
    }
}

/// Conversion between a concrete Rust field type and the [`Value`] model.
///
/// Implemented for all supported atoms, `String`, `Option<V>`, `Vec<V>`,
/// `HashMap<K, V>`, `Box<dyn Record>`, `Value` itself, and (through the
/// [`record_value!`](crate::record_value) macro) shaped record types.
pub trait FieldValue: Sized + 'static {
    /// True when a decoded value can be merged into an existing instance
    /// instead of replacing it.
    const MERGEABLE: bool = false;

    fn field_type() -> FieldType;

    fn to_value(&self) -> Value;

    fn from_value(v: Value) -> Result<Self, Error>;

    /// Combines a decoded value into `self`. The default replaces; container
    /// and record types override to append/insert.
    fn merge_value(&mut self, v: Value) -> Result<(), Error> {
        *self = Self::from_value(v)?;
        Ok(())
    }

    /// A view of this field as a record, when it is one. Drives record-merge
    /// reads.
    fn as_record_mut(&mut self) -> Option<&mut dyn Record> {
        None
    }
}

macro_rules! int_field_value {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl FieldValue for $ty {
            fn field_type() -> FieldType {
                FieldType::$variant
            }
            fn to_value(&self) -> Value {
                Value::$variant(*self)
            }
            fn from_value(v: Value) -> Result<Self, Error> {
                let wide = v.as_int().ok_or_else(|| v.mismatch($name))?;
                <$ty>::try_from(wide).map_err(|_| Error::Overflow { target: $name })
            }
        }
    };
}

int_field_value!(i8, SByte, "sbyte");
int_field_value!(u8, Byte, "byte");
int_field_value!(i16, Short, "short");
int_field_value!(u16, UShort, "ushort");
int_field_value!(i32, Int, "int");
int_field_value!(u32, UInt, "uint");
int_field_value!(i64, Long, "long");
int_field_value!(u64, ULong, "ulong");

macro_rules! plain_field_value {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl FieldValue for $ty {
            fn field_type() -> FieldType {
                FieldType::$variant
            }
            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }
            fn from_value(v: Value) -> Result<Self, Error> {
                match v {
                    Value::$variant(x) => Ok(x),
                    other => Err(other.mismatch($name)),
                }
            }
        }
    };
}

plain_field_value!(bool, Bool, "bool");
plain_field_value!(f32, Float, "float");
plain_field_value!(Decimal, Decimal, "decimal");
plain_field_value!(String, Str, "string");
plain_field_value!(DateTime, DateTime, "datetime");
plain_field_value!(TimeSpan, TimeSpan, "timespan");

impl FieldValue for f64 {
    fn field_type() -> FieldType {
        FieldType::Double
    }
    fn to_value(&self) -> Value {
        Value::Double(*self)
    }
    fn from_value(v: Value) -> Result<Self, Error> {
        match v {
            Value::Double(x) => Ok(x),
            Value::Float(x) => Ok(x as f64),
            other => Err(other.mismatch("double")),
        }
    }
}

impl FieldValue for char {
    fn field_type() -> FieldType {
        FieldType::Char
    }
    fn to_value(&self) -> Value {
        Value::Char(*self)
    }
    fn from_value(v: Value) -> Result<Self, Error> {
        match v {
            Value::Char(c) => Ok(c),
            Value::Str(s) if s.chars().count() == 1 => Ok(s.chars().next().expect("one char")),
            other => Err(other.mismatch("char")),
        }
    }
}

impl<V: FieldValue> FieldValue for Option<V> {
    fn field_type() -> FieldType {
        let inner = V::field_type();
        if inner.is_primitive() && !matches!(inner, FieldType::Str) {
            FieldType::Opt(Box::new(inner))
        } else {
            // Reference-like kinds already have a null encoding of their own.
            inner
        }
    }
    fn to_value(&self) -> Value {
        match self {
            None => Value::Null,
            Some(v) => v.to_value(),
        }
    }
    fn from_value(v: Value) -> Result<Self, Error> {
        match v {
            Value::Null => Ok(None),
            other => Ok(Some(V::from_value(other)?)),
        }
    }
}

impl<V: FieldValue> FieldValue for Vec<V> {
    const MERGEABLE: bool = true;

    fn field_type() -> FieldType {
        FieldType::Seq(Box::new(V::field_type()))
    }
    fn to_value(&self) -> Value {
        Value::Seq {
            elem: V::field_type(),
            items: self.iter().map(FieldValue::to_value).collect(),
        }
    }
    fn from_value(v: Value) -> Result<Self, Error> {
        match v {
            Value::Null => Ok(Vec::new()),
            Value::Seq { items, .. } => items.into_iter().map(V::from_value).collect(),
            other => Err(other.mismatch("sequence")),
        }
    }
    fn merge_value(&mut self, v: Value) -> Result<(), Error> {
        match v {
            Value::Null => Ok(()),
            Value::Seq { items, .. } => {
                for item in items {
                    self.push(V::from_value(item)?);
                }
                Ok(())
            }
            other => Err(other.mismatch("sequence")),
        }
    }
}

impl<K, V> FieldValue for HashMap<K, V>
where
    K: FieldValue + Eq + Hash,
    V: FieldValue,
{
    const MERGEABLE: bool = true;

    fn field_type() -> FieldType {
        FieldType::Map(Box::new(K::field_type()), Box::new(V::field_type()))
    }
    fn to_value(&self) -> Value {
        Value::Map {
            key: K::field_type(),
            val: V::field_type(),
            entries: self
                .iter()
                .map(|(k, v)| (k.to_value(), v.to_value()))
                .collect(),
        }
    }
    fn from_value(v: Value) -> Result<Self, Error> {
        match v {
            Value::Null => Ok(HashMap::new()),
            Value::Map { entries, .. } => entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            other => Err(other.mismatch("mapping")),
        }
    }
    fn merge_value(&mut self, v: Value) -> Result<(), Error> {
        match v {
            Value::Null => Ok(()),
            Value::Map { entries, .. } => {
                for (k, v) in entries {
                    self.insert(K::from_value(k)?, V::from_value(v)?);
                }
                Ok(())
            }
            other => Err(other.mismatch("mapping")),
        }
    }
}

impl FieldValue for Box<dyn Record> {
    const MERGEABLE: bool = true;

    fn field_type() -> FieldType {
        FieldType::AnyRecord
    }
    fn to_value(&self) -> Value {
        Value::Record(self.clone_boxed())
    }
    fn from_value(v: Value) -> Result<Self, Error> {
        match v {
            Value::Record(r) => Ok(r),
            Value::Unknown(u) => Ok(Box::new(u)),
            other => Err(other.mismatch("record")),
        }
    }
    fn as_record_mut(&mut self) -> Option<&mut dyn Record> {
        Some(&mut **self)
    }
}

impl FieldValue for Value {
    fn field_type() -> FieldType {
        FieldType::Any
    }
    fn to_value(&self) -> Value {
        self.clone()
    }
    fn from_value(v: Value) -> Result<Self, Error> {
        Ok(v)
    }
}

/// Helpers used by [`record_value!`](crate::record_value).
pub mod record_conv {
    use super::*;

    pub fn to_value<T: Shaped>(obj: &T) -> Value {
        Value::Record(Box::new(obj.clone()))
    }

    pub fn from_value<T: Shaped>(v: Value) -> Result<T, Error> {
        match v {
            Value::Record(r) => {
                let shown = format!("{r:?}");
                r.into_any().downcast::<T>().map(|b| *b).map_err(|_| {
                    Error::stream(format!(
                        "cannot convert record {shown} into {}",
                        T::class_name()
                    ))
                })
            }
            other => Err(other.mismatch("record")),
        }
    }
}

/// Implements [`FieldValue`] for a [`Shaped`] record type so it can be used
/// as a field, element, or root value.
#[macro_export]
macro_rules! record_value {
    ($ty:ty) => {
        impl $crate::FieldValue for $ty {
            const MERGEABLE: bool = true;

            fn field_type() -> $crate::FieldType {
                $crate::FieldType::record_of::<$ty>()
            }
            fn to_value(&self) -> $crate::Value {
                $crate::value::record_conv::to_value(self)
            }
            fn from_value(v: $crate::Value) -> Result<Self, $crate::Error> {
                $crate::value::record_conv::from_value(v)
            }
            fn as_record_mut(&mut self) -> Option<&mut dyn $crate::Record> {
                Some(self)
            }
        }
    };
}

/// Declares the wire table of a C-like enum and implements [`FieldValue`]
/// for it.
///
/// ```ignore
/// enum_value!(Color { Red = 0, Green = 1, Blue = 2 });
/// ```
#[macro_export]
macro_rules! enum_value {
    ($ty:ident { $($variant:ident = $val:expr),+ $(,)? }) => {
        impl $ty {
            pub fn enum_def() -> &'static $crate::EnumDef {
                static DEF: $crate::EnumDef = $crate::EnumDef {
                    name: stringify!($ty),
                    variants: &[$((stringify!($variant), $val)),+],
                };
                &DEF
            }
        }

        impl $crate::FieldValue for $ty {
            fn field_type() -> $crate::FieldType {
                $crate::FieldType::Enum($ty::enum_def())
            }
            fn to_value(&self) -> $crate::Value {
                $crate::Value::Enum($ty::enum_def(), *self as i32)
            }
            fn from_value(v: $crate::Value) -> Result<Self, $crate::Error> {
                let raw = match v {
                    $crate::Value::Enum(_, raw) => raw,
                    $crate::Value::Int(raw) => raw,
                    $crate::Value::Str(name) => $ty::enum_def()
                        .value_of(&name)
                        .ok_or_else(|| $crate::Error::BadKey {
                            message: format!(
                                "no variant '{name}' in enum {}",
                                stringify!($ty)
                            ),
                        })?,
                    other => return Err(other.mismatch("enum")),
                };
                $(if raw == $val {
                    return Ok($ty::$variant);
                })+
                Err($crate::Error::BadKey {
                    message: format!("bad value {raw} for enum {}", stringify!($ty)),
                })
            }
        }
    };
}
