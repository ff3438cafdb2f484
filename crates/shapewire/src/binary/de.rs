//! The binary reader.

use std::io;
use std::rc::Rc;

use shapewire_buffers::Reader;
use tracing::{debug, trace};

use crate::binary::{accepts_effective, wire_to_field_type, SpecializedReadFn, SpecializedReaders, NULL_COUNT, SIGNATURE};
use crate::decimal::Decimal;
use crate::error::Error;
use crate::meta::{registry, FieldType, ItemKind, Record, Shape};
use crate::options::CommonOptions;
use crate::rough::WireType;
use crate::time::{datetime_from_ticks, TimeSpan};
use crate::unknown::UnknownRecord;
use crate::value::{FieldValue, Value};

/// Binary-specific deserializer options.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryDeserializeOptions {
    /// Require the 4-byte format signature at stream start.
    pub auto_signature: bool,
}

/// Where a stream field lands in the target shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Index into the target shape's member list.
    Member(usize),
    /// Not declared by the target; decoded generically.
    Unknown,
}

/// One entry of a stream field table.
#[derive(Debug)]
pub struct TableField {
    pub name: String,
    pub wire: WireType,
    pub slot: Slot,
}

/// A stream-scoped class definition: the wire field table of one class id,
/// pre-matched against the target shape when this process recognizes the
/// class name.
pub struct ClassDef {
    pub class_name: String,
    pub target: Option<&'static Shape>,
    pub fields: Vec<TableField>,
    pub(crate) specialized: Option<SpecializedReadFn>,
}

/// Reads object graphs from the binary wire format.
///
/// The class-def cache mirrors the writer's class-id cache and is likewise
/// stream-scoped: call
/// [`clear_class_ids`](BinaryDeserializer::clear_class_ids) between
/// independent messages read through one instance. After an error the
/// current stream's cache state is unusable; discard or reset the reader.
#[derive(Default)]
pub struct BinaryDeserializer {
    pub options: CommonOptions,
    pub binary_options: BinaryDeserializeOptions,
    class_defs: Vec<Rc<ClassDef>>,
    specialized: SpecializedReaders,
}

impl BinaryDeserializer {
    pub fn new() -> BinaryDeserializer {
        BinaryDeserializer::default()
    }

    /// Installs pre-compiled per-type field readers (see
    /// [`SpecializedReaders`]).
    pub fn with_specialized(readers: SpecializedReaders) -> BinaryDeserializer {
        BinaryDeserializer {
            specialized: readers,
            ..BinaryDeserializer::default()
        }
    }

    /// Forgets all cached class definitions.
    pub fn clear_class_ids(&mut self) {
        self.class_defs.clear();
    }

    /// Deserializes a value of type `V` from a byte buffer.
    pub fn from_bytes<V: FieldValue>(&mut self, data: &[u8]) -> Result<V, Error> {
        let mut r = Reader::new(data);
        self.check_signature(&mut r)?;
        let v = self.read_root(&mut r, &V::field_type())?;
        V::from_value(v)
    }

    /// Deserializes from a byte buffer into an existing instance, honoring
    /// merge semantics for records and containers.
    pub fn from_bytes_into<V: FieldValue>(&mut self, obj: &mut V, data: &[u8]) -> Result<(), Error> {
        let mut r = Reader::new(data);
        self.check_signature(&mut r)?;
        let ft = V::field_type();
        if let Some(rec) = obj.as_record_mut() {
            let wire = WireType::read(&mut r)?;
            if !accepts_effective(&ft, &wire)? {
                return Err(Error::stream(format!(
                    "incompatible stream value {wire:?} for {ft:?}"
                )));
            }
            self.read_record_into(&mut r, rec)
        } else {
            let v = self.read_root(&mut r, &ft)?;
            obj.merge_value(v)
        }
    }

    /// Decodes any stream value generically.
    pub fn value_from_bytes(&mut self, data: &[u8]) -> Result<Value, Error> {
        let mut r = Reader::new(data);
        self.check_signature(&mut r)?;
        let wire = WireType::read(&mut r)?;
        self.read_by_wire(&mut r, &wire)
    }

    /// Deserializes a value of type `V` from a stream.
    pub fn from_stream<V: FieldValue>(&mut self, source: &mut impl io::Read) -> Result<V, Error> {
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;
        self.from_bytes(&data)
    }

    fn check_signature(&self, r: &mut Reader<'_>) -> Result<(), Error> {
        if !self.binary_options.auto_signature {
            return Ok(());
        }
        let lead = r.take(SIGNATURE.len()).map_err(Error::from)?;
        if lead != SIGNATURE {
            return Err(Error::stream_at("bad stream signature", 0));
        }
        Ok(())
    }

    fn read_root(&mut self, r: &mut Reader<'_>, ft: &FieldType) -> Result<Value, Error> {
        let at = r.position() as u64;
        let wire = WireType::read(r)?;
        if !accepts_effective(ft, &wire)? {
            return Err(Error::stream_at(
                format!("incompatible stream value {wire:?} for {ft:?}"),
                at,
            ));
        }
        match ft {
            FieldType::Any => self.read_by_wire(r, &wire),
            _ => self.read_field(r, ft),
        }
    }

    /// Reads one payload (no leading descriptor) of the given declared type.
    pub fn read_field(&mut self, r: &mut Reader<'_>, ft: &FieldType) -> Result<Value, Error> {
        Ok(match ft {
            FieldType::Bool => Value::Bool(self.read_bool(r)?),
            FieldType::SByte => Value::SByte(r.i8()?),
            FieldType::Byte => Value::Byte(r.u8()?),
            FieldType::Short => Value::Short(r.i16()?),
            FieldType::UShort => Value::UShort(r.u16()?),
            FieldType::Int => Value::Int(r.i32()?),
            FieldType::UInt => Value::UInt(r.u32()?),
            FieldType::Long => Value::Long(r.i64()?),
            FieldType::ULong => Value::ULong(r.u64()?),
            FieldType::Float => Value::Float(r.f32()?),
            FieldType::Double => Value::Double(r.f64()?),
            FieldType::Decimal => {
                let bytes: &[u8] = r.take(16)?;
                let mut raw = [0u8; 16];
                raw.copy_from_slice(bytes);
                Value::Decimal(Decimal::from_bytes(&raw)?)
            }
            FieldType::Char => {
                let at = r.position() as u64;
                let code = r.u32()?;
                Value::Char(
                    char::from_u32(code)
                        .ok_or_else(|| Error::stream_at(format!("bad char {code:#x}"), at))?,
                )
            }
            FieldType::Str => match r.lp_str()? {
                Some(s) => Value::Str(s),
                None => Value::Null,
            },
            FieldType::DateTime => Value::DateTime(datetime_from_ticks(r.i64()?)?),
            FieldType::TimeSpan => Value::TimeSpan(TimeSpan::from_ticks(r.i64()?)),
            FieldType::Enum(def) => Value::Enum(def, r.i32()?),
            FieldType::Opt(inner) => {
                if self.read_bool(r)? {
                    Value::Null
                } else {
                    self.read_field(r, inner)?
                }
            }
            FieldType::Seq(inner) => {
                let count = r.i32()?;
                if count == NULL_COUNT {
                    Value::Null
                } else {
                    let count = usize::try_from(count)
                        .map_err(|_| Error::stream(format!("bad sequence count {count}")))?;
                    let mut items = Vec::with_capacity(count.min(4096));
                    for _ in 0..count {
                        items.push(self.read_field(r, inner)?);
                    }
                    Value::Seq {
                        elem: (**inner).clone(),
                        items,
                    }
                }
            }
            FieldType::Map(kt, vt) => {
                let count = r.i32()?;
                if count == NULL_COUNT {
                    Value::Null
                } else {
                    let count = usize::try_from(count)
                        .map_err(|_| Error::stream(format!("bad mapping count {count}")))?;
                    let mut entries = Vec::with_capacity(count.min(4096));
                    for _ in 0..count {
                        let k = self.read_field(r, kt)?;
                        let v = self.read_field(r, vt)?;
                        entries.push((k, v));
                    }
                    Value::Map {
                        key: (**kt).clone(),
                        val: (**vt).clone(),
                        entries,
                    }
                }
            }
            FieldType::Record(f) => return self.read_expected_record(r, f()?),
            FieldType::AnyRecord => return self.read_record(r, None),
            FieldType::Any => {
                let wire = WireType::read(r)?;
                return self.read_by_wire(r, &wire);
            }
        })
    }

    /// Decodes one value by its stream descriptor alone.
    pub fn read_by_wire(&mut self, r: &mut Reader<'_>, wire: &WireType) -> Result<Value, Error> {
        match wire {
            WireType::Record => self.read_record(r, None),
            other => {
                let ft = wire_to_field_type(other);
                self.read_field(r, &ft)
            }
        }
    }

    /// Reads a record field declared as a concrete type, resolving its
    /// surrogate consumer when one is registered.
    fn read_expected_record(
        &mut self,
        r: &mut Reader<'_>,
        shape: &'static Shape,
    ) -> Result<Value, Error> {
        if let Some(sg) = shape.surrogate() {
            if sg.from.is_some() && sg.to.is_some() && sg.cond.is_none() {
                // The wire always carries the surrogate form.
                let v = match &sg.ty {
                    FieldType::Record(fs) => self.read_expected_record(r, fs()?)?,
                    FieldType::AnyRecord => self.read_record(r, None)?,
                    scalar => self.read_field(r, scalar)?,
                };
                if matches!(v, Value::Null) {
                    return Ok(Value::Null);
                }
                let rec = sg.consume(v).expect("consumer present")?;
                return Ok(Value::Record(rec));
            }
            if sg.to.is_some() && sg.from.is_none() && sg.cond.is_none() {
                return Err(Error::schema(
                    shape.class_name,
                    "surrogate declares a producer but no consumer",
                ));
            }
        }
        self.read_record(r, Some(shape))
    }

    /// Reads a record value: class id, table on first sight, then the field
    /// stream. `expected` demands that concrete class (or its surrogate).
    fn read_record(
        &mut self,
        r: &mut Reader<'_>,
        expected: Option<&'static Shape>,
    ) -> Result<Value, Error> {
        let id = r.u16()?;
        if id == 0 {
            return Ok(Value::Null);
        }
        let def = self.class_def(r, id)?;
        match def.target {
            Some(shape) => {
                if let Some(exp) = expected {
                    if exp.type_id != shape.type_id {
                        if let Some(v) = self.try_surrogate_read(r, exp, shape, &def)? {
                            return Ok(v);
                        }
                        return Err(Error::stream(format!(
                            "cannot read class '{}' into '{}'",
                            shape.class_name, exp.class_name
                        )));
                    }
                }
                let mut instance = shape.make_instance();
                self.read_fields(r, &def, instance.as_mut())?;
                Ok(Value::Record(instance))
            }
            None => {
                if expected.is_some() {
                    return Err(Error::UnknownType {
                        name: def.class_name.clone(),
                    });
                }
                debug!(class = %def.class_name, "decoding unknown class generically");
                self.read_unknown_fields(r, &def)
            }
        }
    }

    /// Conditional record surrogate: the stream class names the surrogate
    /// type instead of the expected owner.
    fn try_surrogate_read(
        &mut self,
        r: &mut Reader<'_>,
        expected: &'static Shape,
        actual: &'static Shape,
        def: &Rc<ClassDef>,
    ) -> Result<Option<Value>, Error> {
        let Some(sg) = expected.surrogate() else {
            return Ok(None);
        };
        if sg.from.is_none() {
            return Ok(None);
        }
        match sg.record_shape() {
            Some(Ok(sshape)) if sshape.type_id == actual.type_id => {
                let mut instance = actual.make_instance();
                self.read_fields(r, def, instance.as_mut())?;
                let rec = sg.consume(Value::Record(instance)).expect("consumer present")?;
                Ok(Some(Value::Record(rec)))
            }
            Some(Err(e)) => Err(e),
            _ => Ok(None),
        }
    }

    /// Reads the field stream of a known class into an existing instance.
    pub fn read_fields(
        &mut self,
        r: &mut Reader<'_>,
        def: &Rc<ClassDef>,
        obj: &mut dyn Record,
    ) -> Result<(), Error> {
        if let Some(spec) = def.specialized {
            return spec(self, r, def, obj);
        }
        let shape = def
            .target
            .ok_or_else(|| Error::stream("reading fields of an unknown class into an instance"))?;
        if shape.is_compact {
            for i in 0..def.fields.len() {
                self.read_table_field(r, shape, def, i, obj)?;
            }
            return Ok(());
        }
        let mut prev = 0usize;
        loop {
            let at = r.position() as u64;
            let idx = r.u16()? as usize;
            if idx == 0 {
                self.check_skipped(shape, def, prev + 1, def.fields.len() + 1)?;
                return Ok(());
            }
            if idx <= prev || idx > def.fields.len() {
                return Err(Error::stream_at(
                    format!(
                        "field index {idx} out of order in class '{}'",
                        def.class_name
                    ),
                    at,
                ));
            }
            self.check_skipped(shape, def, prev + 1, idx)?;
            self.read_table_field(r, shape, def, idx - 1, obj)?;
            prev = idx;
        }
    }

    /// Stream table entries skipped by the writer must all map to optional
    /// members.
    fn check_skipped(
        &self,
        shape: &'static Shape,
        def: &ClassDef,
        from: usize,
        to: usize,
    ) -> Result<(), Error> {
        for field in &def.fields[from - 1..to - 1] {
            if let Slot::Member(m) = field.slot {
                if shape.members[m].kind == ItemKind::Required {
                    return Err(Error::missing(field.name.as_str(), def.class_name.as_str()));
                }
            }
        }
        Ok(())
    }

    fn read_table_field(
        &mut self,
        r: &mut Reader<'_>,
        shape: &'static Shape,
        def: &ClassDef,
        index: usize,
        obj: &mut dyn Record,
    ) -> Result<(), Error> {
        let field = &def.fields[index];
        match field.slot {
            Slot::Member(m) => {
                let member = &shape.members[m];
                if member.merge {
                    return match &member.ty {
                        FieldType::Record(_) | FieldType::AnyRecord => {
                            match (member.project_record)(obj) {
                                Some(rec) => self.read_record_into(r, rec),
                                None => Err(Error::schema(
                                    shape.class_name,
                                    format!("unable to merge into field '{}'", member.name),
                                )),
                            }
                        }
                        ty => {
                            let v = self.read_field(r, ty)?;
                            member.merge_value(obj, v)
                        }
                    };
                }
                let v = self.read_field(r, &member.ty)?;
                member.set_value(obj, v)
            }
            Slot::Unknown => {
                let v = self.read_by_wire(r, &field.wire)?;
                match shape.storage_of_mut(obj) {
                    Some(storage) => {
                        storage.add(field.name.clone(), v, Some(field.wire.clone()));
                    }
                    None => {
                        trace!(field = %field.name, class = shape.class_name, "dropped unknown field");
                    }
                }
                Ok(())
            }
        }
    }

    /// Reads a record into an existing instance; the stream class must be
    /// exactly the instance's class.
    pub fn read_record_into(
        &mut self,
        r: &mut Reader<'_>,
        obj: &mut dyn Record,
    ) -> Result<(), Error> {
        let at = r.position() as u64;
        let id = r.u16()?;
        if id == 0 {
            return Err(Error::stream_at("cannot read null into an existing instance", at));
        }
        let def = self.class_def(r, id)?;
        let shape = obj.shape()?;
        match def.target {
            Some(target) if target.type_id == shape.type_id => {
                self.read_fields(r, &def, obj)
            }
            _ => Err(Error::stream(format!(
                "cannot read class '{}' into '{}'",
                def.class_name, shape.class_name
            ))),
        }
    }

    /// Generic field-by-field decode of an unrecognized class.
    fn read_unknown_fields(
        &mut self,
        r: &mut Reader<'_>,
        def: &Rc<ClassDef>,
    ) -> Result<Value, Error> {
        let mut u = UnknownRecord::new(def.class_name.clone());
        let mut prev = 0usize;
        loop {
            let at = r.position() as u64;
            let idx = r.u16()? as usize;
            if idx == 0 {
                return Ok(Value::Unknown(u));
            }
            if idx <= prev || idx > def.fields.len() {
                return Err(Error::stream_at(
                    format!(
                        "field index {idx} out of order in class '{}'",
                        def.class_name
                    ),
                    at,
                ));
            }
            let field = &def.fields[idx - 1];
            let v = self.read_by_wire(r, &field.wire)?;
            u.push(field.name.clone(), v, Some(field.wire.clone()));
            prev = idx;
        }
    }

    /// Resolves a class id, reading and matching the field table on first
    /// sight.
    fn class_def(&mut self, r: &mut Reader<'_>, id: u16) -> Result<Rc<ClassDef>, Error> {
        let index = id as usize;
        if index <= self.class_defs.len() {
            return Ok(self.class_defs[index - 1].clone());
        }
        if index != self.class_defs.len() + 1 {
            return Err(Error::stream(format!("bad class id {id}")));
        }
        let name = r
            .lp_str()?
            .ok_or_else(|| Error::stream("null class name"))?;
        let count = r.u16()? as usize;
        let target = registry::resolve(&name);
        let mut seen = vec![false; target.map_or(0, |s| s.members.len())];
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            let field_name = r
                .lp_str()?
                .ok_or_else(|| Error::stream("null field tag"))?;
            let wire = WireType::read(r)?;
            let slot = match target {
                Some(shape) => self.match_field(shape, &name, &field_name, &wire, &mut seen)?,
                None => Slot::Unknown,
            };
            fields.push(TableField {
                name: field_name,
                wire,
                slot,
            });
        }
        if let Some(shape) = target {
            for (i, member) in shape.members.iter().enumerate() {
                if member.kind == ItemKind::Required && !seen[i] {
                    return Err(Error::missing(member.tag(self.options.tag_mode), name.as_str()));
                }
            }
        }
        let specialized = target
            .filter(|shape| table_matches_declared(shape, &fields))
            .and_then(|shape| self.specialized.get(&shape.type_id));
        debug!(class = %name, id, known = target.is_some(), "cached class def");
        let def = Rc::new(ClassDef {
            class_name: name,
            target,
            fields,
            specialized,
        });
        self.class_defs.push(def.clone());
        Ok(def)
    }

    fn match_field(
        &self,
        shape: &'static Shape,
        class_name: &str,
        field_name: &str,
        wire: &WireType,
        seen: &mut [bool],
    ) -> Result<Slot, Error> {
        match shape.member_by_tag(field_name, self.options.tag_mode) {
            Some((idx, member)) => {
                if seen[idx] {
                    return Err(Error::stream(format!(
                        "duplicate field '{field_name}' in class '{class_name}'"
                    )));
                }
                seen[idx] = true;
                if !accepts_effective(&member.ty, wire)? {
                    return Err(Error::stream(format!(
                        "incompatible type for field '{field_name}' of class '{class_name}'"
                    )));
                }
                Ok(Slot::Member(idx))
            }
            None => {
                let tolerated = shape.storage.is_some()
                    || shape.allow_unknown_fields
                    || self.options.allow_unknown_fields;
                if !tolerated {
                    return Err(Error::UnknownField {
                        field: field_name.to_string(),
                        class: class_name.to_string(),
                    });
                }
                Ok(Slot::Unknown)
            }
        }
    }

    fn read_bool(&self, r: &mut Reader<'_>) -> Result<bool, Error> {
        let at = r.position() as u64;
        match r.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::stream_at(format!("bad bool byte {other:#x}"), at)),
        }
    }
}

fn table_matches_declared(shape: &Shape, fields: &[TableField]) -> bool {
    fields.len() == shape.members.len()
        && fields
            .iter()
            .enumerate()
            .all(|(i, f)| f.slot == Slot::Member(i))
}
