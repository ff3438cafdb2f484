//! Dictionary-key conversions for the JSON protocol.
//!
//! JSON object keys are strings, so mapping keys are rendered to text on
//! write and parsed back on read. Integer kinds, bool, char, enums, dates
//! and decimals are built in; keys of record types go through parsers
//! registered per class name.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::decimal::Decimal;
use crate::error::Error;
use crate::meta::FieldType;
use crate::time::{format_datetime, parse_datetime, TimeSpan};
use crate::value::Value;

/// Parses one key string into a value of the key's declared type.
pub type KeyParserFn = fn(&str) -> Result<Value, Error>;

fn parsers() -> &'static RwLock<HashMap<String, KeyParserFn>> {
    static PARSERS: OnceLock<RwLock<HashMap<String, KeyParserFn>>> = OnceLock::new();
    PARSERS.get_or_init(Default::default)
}

/// Registers a parser for keys of a type without a built-in string form,
/// keyed by its wire class name.
pub fn register_key_parser(class_name: &str, parser: KeyParserFn) {
    parsers()
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .insert(class_name.to_string(), parser);
}

/// Renders a key value to its string form.
pub fn key_to_string(key: &Value) -> Result<String, Error> {
    Ok(match key {
        Value::Str(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::SByte(v) => v.to_string(),
        Value::Byte(v) => v.to_string(),
        Value::Short(v) => v.to_string(),
        Value::UShort(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::ULong(v) => v.to_string(),
        Value::Char(c) => c.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::DateTime(dt) => format_datetime(dt),
        Value::TimeSpan(ts) => ts.to_string(),
        Value::Enum(def, raw) => match def.name_of(*raw) {
            Some(name) => name.to_string(),
            None => raw.to_string(),
        },
        other => {
            return Err(Error::BadKey {
                message: format!("{} values have no key form", other.kind()),
            })
        }
    })
}

fn parse_int(s: &str) -> Result<i128, Error> {
    s.parse::<i128>().map_err(|_| Error::BadKey {
        message: format!("bad integer key '{s}'"),
    })
}

macro_rules! narrow_key {
    ($s:expr, $ty:ty, $variant:ident, $name:literal) => {{
        let wide = parse_int($s)?;
        let v = <$ty>::try_from(wide).map_err(|_| Error::Overflow { target: $name })?;
        Value::$variant(v)
    }};
}

/// Parses a key string back into a value of the declared key type.
pub fn parse_key(ty: &FieldType, s: &str) -> Result<Value, Error> {
    Ok(match ty {
        FieldType::Str => Value::Str(s.to_string()),
        FieldType::Bool => match s {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => {
                return Err(Error::BadKey {
                    message: format!("bad bool key '{s}'"),
                })
            }
        },
        FieldType::SByte => narrow_key!(s, i8, SByte, "sbyte"),
        FieldType::Byte => narrow_key!(s, u8, Byte, "byte"),
        FieldType::Short => narrow_key!(s, i16, Short, "short"),
        FieldType::UShort => narrow_key!(s, u16, UShort, "ushort"),
        FieldType::Int => narrow_key!(s, i32, Int, "int"),
        FieldType::UInt => narrow_key!(s, u32, UInt, "uint"),
        FieldType::Long => narrow_key!(s, i64, Long, "long"),
        FieldType::ULong => narrow_key!(s, u64, ULong, "ulong"),
        FieldType::Char => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Value::Char(c),
                _ => {
                    return Err(Error::BadKey {
                        message: format!("bad char key '{s}'"),
                    })
                }
            }
        }
        FieldType::Decimal => Value::Decimal(s.parse::<Decimal>()?),
        FieldType::DateTime => Value::DateTime(parse_datetime(s)?),
        FieldType::TimeSpan => Value::TimeSpan(s.parse::<TimeSpan>()?),
        FieldType::Enum(def) => {
            let raw = match def.value_of(s) {
                Some(v) => v,
                None => parse_int(s).ok().and_then(|v| i32::try_from(v).ok()).ok_or_else(|| {
                    Error::BadKey {
                        message: format!("no variant '{s}' in enum {}", def.name),
                    }
                })?,
            };
            Value::Enum(def, raw)
        }
        FieldType::Record(f) => {
            let class = f()?.class_name;
            let parser = {
                let map = parsers().read().unwrap_or_else(|e| e.into_inner());
                map.get(class).copied()
            };
            match parser {
                Some(parse) => parse(s)?,
                None => {
                    return Err(Error::BadKey {
                        message: format!("no key parser registered for '{class}'"),
                    })
                }
            }
        }
        other => {
            return Err(Error::BadKey {
                message: format!("unsupported key type {other:?}"),
            })
        }
    })
}
