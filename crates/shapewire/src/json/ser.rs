//! The JSON writer.

use std::io;

use tracing::debug;

use crate::error::Error;
use crate::json::escape::push_escaped;
use crate::json::{keys, JsonOptions};
use crate::meta::{FieldType, Record, Shape};
use crate::options::CommonOptions;
use crate::time::format_datetime;
use crate::unknown::{UnknownItem, UnknownRecord};
use crate::value::{FieldValue, Value};

/// Writes object graphs as JSON text.
#[derive(Default)]
pub struct JsonSerializer {
    pub options: CommonOptions,
    pub json_options: JsonOptions,
    out: Vec<u8>,
    depth: usize,
    oneline: usize,
}

impl JsonSerializer {
    pub fn new() -> JsonSerializer {
        JsonSerializer::default()
    }

    /// Serializes a value to JSON text.
    pub fn to_string<V: FieldValue>(&mut self, value: &V) -> Result<String, Error> {
        let bytes = self.to_bytes(value)?;
        Ok(String::from_utf8(bytes).expect("writer emits UTF-8"))
    }

    /// Serializes a value to UTF-8 JSON bytes.
    pub fn to_bytes<V: FieldValue>(&mut self, value: &V) -> Result<Vec<u8>, Error> {
        let v = value.to_value();
        self.render_root(&V::field_type(), &v)
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
    pub fn value_to_string(&mut self, value: &Value) -> Result<String, Error> {
        let bytes = self.render_root(&FieldType::Any, value)?;
        Ok(String::from_utf8(bytes).expect("writer emits UTF-8"))
    }

    fn render_root(&mut self, ft: &FieldType, v: &Value) -> Result<Vec<u8>, Error> {
        self.out.clear();
        self.depth = 0;
        self.oneline = 0;
        match ft {
            FieldType::Record(f) => self.write_record(v, Some(f()?), true)?,
            FieldType::AnyRecord => self.write_record(v, None, true)?,
            _ => self.write_field(ft, v)?,
        }
        Ok(std::mem::take(&mut self.out))
    }

    fn push(&mut self, b: u8) {
        self.out.push(b);
    }

    fn push_str(&mut self, s: &str) {
        self.out.extend_from_slice(s.as_bytes());
    }

    fn sep(&mut self) {
        if self.oneline == 0 && !self.json_options.field_separator.is_empty() {
            let s = self.json_options.field_separator.clone();
            self.push_str(&s);
        }
    }

    fn indent(&mut self) {
        if self.oneline == 0 && !self.json_options.indent.is_empty() {
            let unit = self.json_options.indent.clone();
            for _ in 0..self.depth {
                self.push_str(&unit);
            }
        }
    }

    fn write_sep(&mut self, is_first: &mut bool) {
        if !*is_first {
            self.push(b',');
            self.sep();
        }
        *is_first = false;
    }

    fn write_name(&mut self, name: &str, is_first: &mut bool) {
        self.write_sep(is_first);
        self.indent();
        push_escaped(&mut self.out, name);
        self.push(b':');
    }

    fn write_field(&mut self, ft: &FieldType, v: &Value) -> Result<(), Error> {
        match (ft, v) {
            (_, Value::Null) => self.push_str("null"),
            (FieldType::Bool, Value::Bool(x)) => {
                self.push_str(if *x { "true" } else { "false" })
            }
            (FieldType::SByte, Value::SByte(x)) => self.push_str(&x.to_string()),
            (FieldType::Byte, Value::Byte(x)) => self.push_str(&x.to_string()),
            (FieldType::Short, Value::Short(x)) => self.push_str(&x.to_string()),
            (FieldType::UShort, Value::UShort(x)) => self.push_str(&x.to_string()),
            (FieldType::Int, Value::Int(x)) => self.push_str(&x.to_string()),
            (FieldType::UInt, Value::UInt(x)) => self.push_str(&x.to_string()),
            (FieldType::Long, Value::Long(x)) => {
                let text = x.to_string();
                self.write_number_maybe_quoted(&text, self.json_options.int64_as_string);
            }
            (FieldType::ULong, Value::ULong(x)) => {
                let text = x.to_string();
                self.write_number_maybe_quoted(&text, self.json_options.int64_as_string);
            }
            (FieldType::Float, Value::Float(x)) => self.push_str(&x.to_string()),
            (FieldType::Double, Value::Double(x)) => self.push_str(&x.to_string()),
            (FieldType::Decimal, Value::Decimal(x)) => {
                let text = x.to_string();
                self.write_number_maybe_quoted(&text, self.json_options.decimal_as_string);
            }
            (FieldType::Char, Value::Char(c)) => {
                push_escaped(&mut self.out, &c.to_string());
            }
            (FieldType::Str, Value::Str(s)) => {
                let s = s.clone();
                push_escaped(&mut self.out, &s);
            }
            (FieldType::DateTime, Value::DateTime(dt)) => {
                let text = if self.json_options.date_format == "O" {
                    format_datetime(dt)
                } else {
                    dt.format(&self.json_options.date_format).to_string()
                };
                push_escaped(&mut self.out, &text);
            }
            (FieldType::TimeSpan, Value::TimeSpan(ts)) => {
                if self.json_options.time_span_format != "c" {
                    return Err(Error::stream(format!(
                        "unsupported time span format '{}'",
                        self.json_options.time_span_format
                    )));
                }
                let text = ts.to_string();
                push_escaped(&mut self.out, &text);
            }
            (FieldType::Enum(_), Value::Enum(def, raw)) => {
                match def.name_of(*raw).filter(|_| self.json_options.enum_as_string) {
                    Some(name) => push_escaped(&mut self.out, name),
                    None => self.push_str(&raw.to_string()),
                }
            }
            (FieldType::Opt(inner), v) => self.write_field(inner, v)?,
            (FieldType::Seq(inner), Value::Seq { items, .. }) => {
                self.write_array(items, |this, item| this.write_field(inner, item))?
            }
            (FieldType::Map(_, vt), Value::Map { entries, .. }) => {
                self.write_map(entries, vt)?
            }
            (FieldType::Record(f), v) => self.write_record(v, Some(f()?), false)?,
            (FieldType::AnyRecord, v) => self.write_record(v, None, false)?,
            (FieldType::Any, v) => self.write_any(v)?,
            (ft, v) => {
                return Err(Error::stream(format!(
                    "cannot render {} value as {ft:?}",
                    v.kind()
                )))
            }
        }
        Ok(())
    }

    fn write_number_maybe_quoted(&mut self, text: &str, quoted: bool) {
        if quoted {
            self.push(b'"');
            self.push_str(text);
            self.push(b'"');
        } else {
            self.push_str(text);
        }
    }

    fn write_any(&mut self, v: &Value) -> Result<(), Error> {
        match v {
            Value::Null => {
                self.push_str("null");
                Ok(())
            }
            Value::Record(_) | Value::Unknown(_) => self.write_record(v, None, false),
            other => {
                let ft = other
                    .runtime_field_type()
                    .ok_or_else(|| other.mismatch("typed"))?;
                self.write_field(&ft, other)
            }
        }
    }

    fn write_array<F>(&mut self, items: &[Value], mut write_item: F) -> Result<(), Error>
    where
        F: FnMut(&mut Self, &Value) -> Result<(), Error>,
    {
        if items.is_empty() {
            self.push_str("[]");
            return Ok(());
        }
        self.push(b'[');
        self.depth += 1;
        let mut is_first = true;
        for item in items {
            if !is_first {
                self.push(b',');
            }
            is_first = false;
            self.sep();
            self.indent();
            write_item(self, item)?;
        }
        self.depth -= 1;
        self.sep();
        self.indent();
        self.push(b']');
        Ok(())
    }

    fn write_map(&mut self, entries: &[(Value, Value)], vt: &FieldType) -> Result<(), Error> {
        if entries.is_empty() {
            self.push_str("{}");
            return Ok(());
        }
        self.push(b'{');
        self.sep();
        self.depth += 1;
        let mut is_first = true;
        for (k, v) in entries {
            let key = keys::key_to_string(k)?;
            self.write_name(&key, &mut is_first);
            self.write_field(vt, v)?;
        }
        self.depth -= 1;
        self.sep();
        self.indent();
        self.push(b'}');
        Ok(())
    }

    fn write_record(
        &mut self,
        v: &Value,
        expected: Option<&'static Shape>,
        is_root: bool,
    ) -> Result<(), Error> {
        match v {
            Value::Null => {
                self.push_str("null");
                Ok(())
            }
            Value::Unknown(u) => self.write_unknown(u),
            Value::Record(obj) => {
                if let Some(u) = obj.as_any().downcast_ref::<UnknownRecord>() {
                    return self.write_unknown(u);
                }
                let shape = obj.shape()?;
                if let Some(sg) = shape.surrogate() {
                    if sg.applies_to(&**obj) {
                        let sv = sg.produce(&**obj).expect("producer present");
                        // Under a condition the reader discriminates the two
                        // branches, so a non-compact surrogate object keeps
                        // the owner's expectation and gets a class tag.
                        if sg.cond.is_some()
                            && matches!(sg.ty, FieldType::Record(_) | FieldType::AnyRecord)
                        {
                            return self.write_record(&sv, expected, false);
                        }
                        return self.write_field(&sg.ty, &sv);
                    }
                }
                if shape.is_compact && !self.json_options.ignore_compact {
                    self.write_compact(&**obj, shape)
                } else {
                    self.write_object(&**obj, shape, expected, is_root)
                }
            }
            other => Err(other.mismatch("record")),
        }
    }

    fn is_oneline(&self, shape: &Shape) -> bool {
        self.json_options.max_oneline_fields > 0
            && shape
                .primitive_member_count()
                .is_some_and(|n| n <= self.json_options.max_oneline_fields)
    }

    fn write_compact(&mut self, obj: &dyn Record, shape: &'static Shape) -> Result<(), Error> {
        let oneline = self.is_oneline(shape);
        if oneline {
            self.oneline += 1;
        }
        self.push(b'[');
        self.depth += 1;
        let mut is_first = true;
        for member in &shape.members {
            if !is_first {
                self.push(b',');
            }
            is_first = false;
            self.sep();
            self.indent();
            let value = member.get_value(obj);
            self.write_field(&member.ty, &value)?;
        }
        self.depth -= 1;
        if !shape.members.is_empty() {
            self.sep();
        }
        self.indent();
        self.push(b']');
        if oneline {
            self.oneline -= 1;
        }
        Ok(())
    }

    fn write_object(
        &mut self,
        obj: &dyn Record,
        shape: &'static Shape,
        expected: Option<&'static Shape>,
        is_root: bool,
    ) -> Result<(), Error> {
        let oneline = self.is_oneline(shape);
        if oneline {
            self.oneline += 1;
        }
        self.push(b'{');
        self.sep();
        self.depth += 1;
        let mut is_first = true;
        let needs_class_tag = expected.map_or(true, |e| e.type_id != shape.type_id)
            || (is_root && self.json_options.save_root_class)
            || shape.write_alias.is_some();
        if needs_class_tag {
            let tag = self.json_options.class_tag.clone();
            self.write_name(&tag, &mut is_first);
            push_escaped(&mut self.out, shape.wire_name());
        }
        let storage_items: Vec<UnknownItem> = shape
            .storage_of(obj)
            .filter(|s| !s.is_empty())
            .map(|s| s.fields().to_vec())
            .unwrap_or_default();
        if storage_items.is_empty() || self.json_options.unordered {
            for member in &shape.members {
                let value = member.get_value(obj);
                if !member.should_write(obj, &value) {
                    continue;
                }
                let tag = member.tag(self.options.tag_mode).to_string();
                self.write_name(&tag, &mut is_first);
                self.write_field(&member.ty, &value)?;
            }
            for item in &storage_items {
                self.write_unknown_item(item, &mut is_first)?;
            }
        } else {
            // Interleave stored unknown fields with known members by
            // ordinal tag name, reproducing the producer's order.
            let mut sorted = storage_items.clone();
            sorted.sort_by(|a, b| a.name.cmp(&b.name));
            let mut next = 0usize;
            for member in &shape.members {
                let value = member.get_value(obj);
                if !member.should_write(obj, &value) {
                    continue;
                }
                let tag = member.tag(self.options.tag_mode).to_string();
                while next < sorted.len() && sorted[next].name.as_str() < tag.as_str() {
                    let item = sorted[next].clone();
                    self.write_unknown_item(&item, &mut is_first)?;
                    next += 1;
                }
                self.write_name(&tag, &mut is_first);
                self.write_field(&member.ty, &value)?;
            }
            while next < sorted.len() {
                let item = sorted[next].clone();
                self.write_unknown_item(&item, &mut is_first)?;
                next += 1;
            }
        }
        self.depth -= 1;
        if !is_first {
            self.sep();
        }
        self.indent();
        self.push(b'}');
        if oneline {
            self.oneline -= 1;
        }
        Ok(())
    }

    fn write_unknown_item(
        &mut self,
        item: &UnknownItem,
        is_first: &mut bool,
    ) -> Result<(), Error> {
        let name = item.name.clone();
        self.write_name(&name, is_first);
        self.write_any(&item.value)
    }

    fn write_unknown(&mut self, u: &UnknownRecord) -> Result<(), Error> {
        debug!(class = %u.class_tag, "writing unknown class");
        self.push(b'{');
        self.sep();
        self.depth += 1;
        let mut is_first = true;
        let tag = self.json_options.class_tag.clone();
        self.write_name(&tag, &mut is_first);
        push_escaped(&mut self.out, &u.class_tag);
        for item in &u.fields {
            let item = item.clone();
            self.write_unknown_item(&item, &mut is_first)?;
        }
        self.depth -= 1;
        if !is_first {
            self.sep();
        }
        self.indent();
        self.push(b'}');
        Ok(())
    }
}
