//! The binary writer.

use std::any::TypeId;
use std::collections::HashMap;
use std::io;

use shapewire_buffers::Writer;
use tracing::debug;

use crate::binary::{
    effective_wire_type, unknown_item_wire, wire_to_field_type, NULL_COUNT, SIGNATURE,
};
use crate::error::Error;
use crate::meta::{FieldType, Record, Shape};
use crate::options::CommonOptions;
use crate::rough::RoughType;
use crate::time::datetime_to_ticks;
use crate::unknown::{UnknownItem, UnknownRecord};
use crate::value::{FieldValue, Value};

/// Binary-specific serializer options.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinarySerializeOptions {
    /// Prefix streams with the 4-byte format signature.
    pub auto_signature: bool,
}

#[derive(PartialEq, Eq, Hash)]
enum ClassKey {
    Shaped {
        type_id: TypeId,
        extras: Vec<String>,
    },
    Unknown {
        class_tag: String,
        fields: Vec<String>,
    },
}

/// Writes object graphs to the binary wire format.
///
/// The serializer owns a stream-scoped class-id cache: the first record of
/// each class emits the full field table, repeats emit the bare id. Call
/// [`clear_class_ids`](BinarySerializer::clear_class_ids) between logically
/// independent messages that share one serializer instance.
#[derive(Default)]
pub struct BinarySerializer {
    pub options: CommonOptions,
    pub binary_options: BinarySerializeOptions,
    writer: Writer,
    class_ids: HashMap<ClassKey, u16>,
}

impl BinarySerializer {
    pub fn new() -> BinarySerializer {
        BinarySerializer::default()
    }

    /// Forgets all assigned class ids. The next record of each class will
    /// emit its field table again.
    pub fn clear_class_ids(&mut self) {
        self.class_ids.clear();
    }

    /// Serializes a value to a fresh byte buffer. The root's wire descriptor
    /// comes from the static type, so nullable and empty roots stay
    /// readable; `Value` roots fall back to the runtime type.
    pub fn to_bytes<V: FieldValue>(&mut self, value: &V) -> Result<Vec<u8>, Error> {
        let v = value.to_value();
        let ft = V::field_type();
        if matches!(ft, FieldType::Any) {
            return self.to_bytes_value(&v);
        }
        self.writer.reset();
        if self.binary_options.auto_signature {
            self.writer.bytes(&SIGNATURE);
        }
        effective_wire_type(&ft)?.write(&mut self.writer);
        self.write_field(&ft, &v)?;
        Ok(self.writer.flush())
    }

    /// Serializes a value to the given stream.
    pub fn to_stream<V: FieldValue>(
        &mut self,
        value: &V,
        target: &mut impl io::Write,
    ) -> Result<(), Error> {
        let bytes = self.to_bytes(value)?;
        target.write_all(&bytes)?;
        Ok(())
    }

    /// Serializes an already-dynamic value.
    pub fn value_to_bytes(&mut self, value: &Value) -> Result<Vec<u8>, Error> {
        self.to_bytes_value(value)
    }

    fn to_bytes_value(&mut self, v: &Value) -> Result<Vec<u8>, Error> {
        self.writer.reset();
        if self.binary_options.auto_signature {
            self.writer.bytes(&SIGNATURE);
        }
        self.write_any(v)?;
        Ok(self.writer.flush())
    }

    /// Writes a self-describing value: wire descriptor, then payload. The
    /// descriptor comes from the runtime value, so an interface-typed root
    /// or `Any` field can hold any implementation.
    fn write_any(&mut self, v: &Value) -> Result<(), Error> {
        match v {
            Value::Null => Err(Error::stream("cannot write an untyped null value")),
            Value::Record(obj) => {
                let shape = obj.shape()?;
                if let Some(sg) = shape.surrogate() {
                    if sg.applies_to(&**obj)
                        && !matches!(sg.ty, FieldType::Record(_) | FieldType::AnyRecord)
                    {
                        let sv = sg.produce(&**obj).expect("producer present");
                        effective_wire_type(&sg.ty)?.write(&mut self.writer);
                        return self.write_field(&sg.ty, &sv);
                    }
                }
                self.writer.u8(RoughType::Record as u8);
                self.write_record(v)
            }
            Value::Unknown(_) => {
                self.writer.u8(RoughType::Record as u8);
                self.write_record(v)
            }
            other => {
                let ft = other
                    .runtime_field_type()
                    .ok_or_else(|| other.mismatch("typed"))?;
                effective_wire_type(&ft)?.write(&mut self.writer);
                self.write_field(&ft, other)
            }
        }
    }

    /// Writes one payload (no leading descriptor) of the given declared
    /// type.
    fn write_field(&mut self, ft: &FieldType, v: &Value) -> Result<(), Error> {
        match (ft, v) {
            (FieldType::Bool, Value::Bool(x)) => self.writer.bool(*x),
            (FieldType::SByte, Value::SByte(x)) => self.writer.i8(*x),
            (FieldType::Byte, Value::Byte(x)) => self.writer.u8(*x),
            (FieldType::Short, Value::Short(x)) => self.writer.i16(*x),
            (FieldType::UShort, Value::UShort(x)) => self.writer.u16(*x),
            (FieldType::Int, Value::Int(x)) => self.writer.i32(*x),
            (FieldType::UInt, Value::UInt(x)) => self.writer.u32(*x),
            (FieldType::Long, Value::Long(x)) => self.writer.i64(*x),
            (FieldType::ULong, Value::ULong(x)) => self.writer.u64(*x),
            (FieldType::Float, Value::Float(x)) => self.writer.f32(*x),
            (FieldType::Double, Value::Double(x)) => self.writer.f64(*x),
            (FieldType::Decimal, Value::Decimal(x)) => self.writer.bytes(&x.to_bytes()),
            (FieldType::Char, Value::Char(x)) => self.writer.u32(*x as u32),
            (FieldType::Str, Value::Str(s)) => self.writer.lp_str(Some(s.as_str())),
            (FieldType::Str, Value::Null) => self.writer.lp_str(None),
            (FieldType::DateTime, Value::DateTime(dt)) => self.writer.i64(datetime_to_ticks(dt)),
            (FieldType::TimeSpan, Value::TimeSpan(ts)) => self.writer.i64(ts.ticks()),
            (FieldType::Enum(_), Value::Enum(_, raw)) => self.writer.i32(*raw),
            (FieldType::Opt(inner), v) => {
                if matches!(v, Value::Null) {
                    self.writer.bool(true);
                } else {
                    self.writer.bool(false);
                    self.write_field(inner, v)?;
                }
            }
            (FieldType::Seq(_), Value::Null) => self.writer.i32(NULL_COUNT),
            (FieldType::Seq(inner), Value::Seq { items, .. }) => {
                self.writer.i32(items.len() as i32);
                for item in items {
                    self.write_field(inner, item)?;
                }
            }
            (FieldType::Map(..), Value::Null) => self.writer.i32(NULL_COUNT),
            (FieldType::Map(kt, vt), Value::Map { entries, .. }) => {
                self.writer.i32(entries.len() as i32);
                for (k, v) in entries {
                    self.write_field(kt, k)?;
                    self.write_field(vt, v)?;
                }
            }
            (FieldType::Record(f), Value::Null) => {
                let shape = f()?;
                let scalar_surrogate = shape.surrogate().is_some_and(|sg| {
                    sg.to.is_some()
                        && sg.cond.is_none()
                        && !matches!(sg.ty, FieldType::Record(_) | FieldType::AnyRecord)
                });
                if scalar_surrogate {
                    return Err(Error::schema(
                        shape.class_name,
                        "cannot encode null through a non-record surrogate",
                    ));
                }
                self.writer.u16(0);
            }
            (FieldType::Record(_) | FieldType::AnyRecord, v) => self.write_record(v)?,
            (FieldType::Any, v) => self.write_any(v)?,
            (ft, v) => {
                return Err(Error::stream(format!(
                    "cannot encode {} value as {ft:?}",
                    v.kind()
                )))
            }
        }
        Ok(())
    }

    fn write_record(&mut self, v: &Value) -> Result<(), Error> {
        match v {
            Value::Null => {
                self.writer.u16(0);
                Ok(())
            }
            Value::Unknown(u) => self.write_unknown_record(u),
            Value::Record(obj) => {
                if let Some(u) = obj.as_any().downcast_ref::<UnknownRecord>() {
                    return self.write_unknown_record(u);
                }
                let shape = obj.shape()?;
                if let Some(sg) = shape.surrogate() {
                    if sg.applies_to(&**obj) {
                        if sg.cond.is_some()
                            && !matches!(sg.ty, FieldType::Record(_) | FieldType::AnyRecord)
                        {
                            return Err(Error::schema(
                                shape.class_name,
                                "conditional surrogate requires a record surrogate type",
                            ));
                        }
                        let sv = sg.produce(&**obj).expect("producer present");
                        return if matches!(sg.ty, FieldType::Record(_) | FieldType::AnyRecord) {
                            self.write_record(&sv)
                        } else {
                            self.write_field(&sg.ty, &sv)
                        };
                    }
                }
                self.write_record_body(&**obj, shape)
            }
            other => Err(other.mismatch("record")),
        }
    }

    fn write_record_body(&mut self, obj: &dyn Record, shape: &'static Shape) -> Result<(), Error> {
        let extras: Vec<UnknownItem> = shape
            .storage_of(obj)
            .map(|s| s.fields().to_vec())
            .unwrap_or_default();
        let key = ClassKey::Shaped {
            type_id: shape.type_id,
            extras: extras.iter().map(|i| i.name.clone()).collect(),
        };
        self.write_class_header(key, shape.wire_name(), Some(shape), &extras)?;
        if shape.is_compact {
            for member in &shape.members {
                let value = member.get_value(obj);
                self.write_field(&member.ty, &value)?;
            }
            return Ok(());
        }
        for (i, member) in shape.members.iter().enumerate() {
            let value = member.get_value(obj);
            if !member.should_write(obj, &value) {
                continue;
            }
            self.writer.u16(i as u16 + 1);
            self.write_field(&member.ty, &value)?;
        }
        let base = shape.members.len();
        for (j, item) in extras.iter().enumerate() {
            self.writer.u16((base + j) as u16 + 1);
            let ft = wire_to_field_type(&unknown_item_wire(item)?);
            self.write_field(&ft, &item.value)?;
        }
        self.writer.u16(0);
        Ok(())
    }

    fn write_unknown_record(&mut self, u: &UnknownRecord) -> Result<(), Error> {
        let key = ClassKey::Unknown {
            class_tag: u.class_tag.clone(),
            fields: u.fields.iter().map(|i| i.name.clone()).collect(),
        };
        self.write_class_header(key, &u.class_tag, None, &u.fields)?;
        for (i, item) in u.fields.iter().enumerate() {
            self.writer.u16(i as u16 + 1);
            let ft = wire_to_field_type(&unknown_item_wire(item)?);
            self.write_field(&ft, &item.value)?;
        }
        self.writer.u16(0);
        Ok(())
    }

    /// Writes the class id; the first occurrence of a class in the stream
    /// also carries its name and field table.
    fn write_class_header(
        &mut self,
        key: ClassKey,
        wire_name: &str,
        shape: Option<&'static Shape>,
        extras: &[UnknownItem],
    ) -> Result<(), Error> {
        if let Some(id) = self.class_ids.get(&key) {
            self.writer.u16(*id);
            return Ok(());
        }
        let next = self.class_ids.len() + 1;
        let id = u16::try_from(next)
            .map_err(|_| Error::stream("class id space exhausted for this stream"))?;
        self.class_ids.insert(key, id);
        debug!(class = wire_name, id, "assigned class id");
        self.writer.u16(id);
        self.writer.lp_str(Some(wire_name));
        let member_count = shape.map_or(0, |s| s.members.len());
        self.writer.u16((member_count + extras.len()) as u16);
        if let Some(shape) = shape {
            for member in &shape.members {
                self.writer.lp_str(Some(member.tag(self.options.tag_mode)));
                effective_wire_type(&member.ty)?.write(&mut self.writer);
            }
        }
        for item in extras {
            self.writer.lp_str(Some(item.name.as_str()));
            unknown_item_wire(item)?.write(&mut self.writer);
        }
        Ok(())
    }
}
