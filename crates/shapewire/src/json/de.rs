//! The JSON reader.

use std::io;

use tracing::{debug, trace};

use crate::decimal::Decimal;
use crate::error::Error;
use crate::json::escape::unescape;
use crate::json::{keys, JsonOptions};
use crate::meta::{registry, FieldType, ItemKind, Record, Shape};
use crate::options::CommonOptions;
use crate::time::{parse_datetime, TimeSpan};
use crate::unknown::UnknownRecord;
use crate::value::{FieldValue, Value};

/// Byte-level JSON scanner with optional error positions.
struct Lexer<'a> {
    buf: &'a [u8],
    pos: usize,
    report: bool,
}

impl<'a> Lexer<'a> {
    fn new(buf: &'a [u8], report: bool) -> Lexer<'a> {
        Lexer { buf, pos: 0, report }
    }

    fn err(&self, message: impl Into<String>) -> Error {
        if self.report {
            Error::stream_at(message, self.pos as u64)
        } else {
            Error::stream(message)
        }
    }

    fn skip_ws(&mut self) {
        while let Some(&b) = self.buf.get(self.pos) {
            match b {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                _ => break,
            }
        }
    }

    fn next(&mut self) -> Result<u8, Error> {
        let b = self
            .buf
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.err("unexpected end of input"))?;
        self.pos += 1;
        Ok(b)
    }

    fn peek_token(&mut self) -> Result<u8, Error> {
        self.skip_ws();
        self.buf
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.err("unexpected end of input"))
    }

    /// Consumes one of the given punctuation bytes after whitespace.
    fn expect(&mut self, chars: &[u8]) -> Result<u8, Error> {
        self.skip_ws();
        let b = self.next()?;
        if !chars.contains(&b) {
            return Err(self.err(format!(
                "expected one of {}, but found '{}'",
                chars
                    .iter()
                    .map(|c| format!("'{}'", *c as char))
                    .collect::<Vec<_>>()
                    .join(","),
                b as char
            )));
        }
        Ok(b)
    }

    fn expect_seq(&mut self, rest: &[u8]) -> Result<(), Error> {
        for &expected in rest {
            let b = self.next()?;
            if b != expected {
                return Err(self.err(format!(
                    "expected '{}', but found '{}'",
                    expected as char, b as char
                )));
            }
        }
        Ok(())
    }

    /// Consumes `null` or hands back the first non-ws byte unconsumed.
    fn take_null(&mut self) -> Result<bool, Error> {
        if self.peek_token()? == b'n' {
            self.pos += 1;
            self.expect_seq(b"ull")?;
            return Ok(true);
        }
        Ok(false)
    }

    fn take_bool(&mut self) -> Result<bool, Error> {
        match self.expect(&[b't', b'f'])? {
            b't' => {
                self.expect_seq(b"rue")?;
                Ok(true)
            }
            _ => {
                self.expect_seq(b"alse")?;
                Ok(false)
            }
        }
    }

    /// Reads a quoted string after whitespace.
    fn take_string(&mut self) -> Result<String, Error> {
        self.expect(&[b'"'])?;
        let mut out = String::new();
        loop {
            let b = self.next()?;
            match b {
                b'"' => return Ok(out),
                b'\\' => {
                    let esc = self.next()?;
                    if esc == b'u' {
                        let code = self.take_hex4()?;
                        let ch = if (0xD800..0xDC00).contains(&code) {
                            self.expect_seq(b"\\u")?;
                            let low = self.take_hex4()?;
                            if !(0xDC00..0xE000).contains(&low) {
                                return Err(self.err("unpaired surrogate escape"));
                            }
                            let c = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                            char::from_u32(c)
                        } else {
                            char::from_u32(code)
                        };
                        out.push(ch.ok_or_else(|| self.err("bad unicode escape"))?);
                    } else {
                        match unescape(esc) {
                            Some(ch) => out.push(ch),
                            None => {
                                return Err(self.err(format!(
                                    "unexpected escape character '{}'",
                                    esc as char
                                )))
                            }
                        }
                    }
                }
                _ => {
                    // Multi-byte UTF-8 passes through untouched.
                    let start = self.pos - 1;
                    let len = utf8_len(b);
                    for _ in 1..len {
                        self.next()?;
                    }
                    let s = std::str::from_utf8(&self.buf[start..self.pos])
                        .map_err(|_| self.err("invalid UTF-8 in string"))?;
                    out.push_str(s);
                }
            }
        }
    }

    fn take_hex4(&mut self) -> Result<u32, Error> {
        let mut code = 0u32;
        for _ in 0..4 {
            let b = self.next()?;
            let digit = (b as char)
                .to_digit(16)
                .ok_or_else(|| self.err(format!(
                    "bad hexadecimal digit in unicode escape: '{}'",
                    b as char
                )))?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn take_string_or_null(&mut self) -> Result<Option<String>, Error> {
        if self.take_null()? {
            return Ok(None);
        }
        Ok(Some(self.take_string()?))
    }

    /// Collects one number token (after whitespace) as text.
    fn take_number_text(&mut self) -> Result<String, Error> {
        self.skip_ws();
        let start = self.pos;
        if self.buf.get(self.pos) == Some(&b'-') {
            self.pos += 1;
        }
        while self
            .buf
            .get(self.pos)
            .is_some_and(|&b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.err(format!(
                "expected a number, but found '{}'",
                self.buf.get(self.pos).map(|b| *b as char).unwrap_or('?')
            )));
        }
        Ok(String::from_utf8(self.buf[start..self.pos].to_vec())
            .expect("number token is ASCII"))
    }

    fn take_int(&mut self) -> Result<i128, Error> {
        let text = self.take_number_text()?;
        text.parse::<i128>()
            .map_err(|_| self.err(format!("bad integer literal '{text}'")))
    }

    fn take_f64(&mut self) -> Result<f64, Error> {
        let text = self.take_number_text()?;
        text.parse::<f64>()
            .map_err(|_| self.err(format!("bad number literal '{text}'")))
    }

    /// The next object key, or `None` at `}`. Expects the comma separator
    /// before every key but the first.
    fn next_name(&mut self, first: bool) -> Result<Option<String>, Error> {
        if self.peek_token()? == b'}' {
            self.pos += 1;
            return Ok(None);
        }
        if !first {
            self.expect(&[b','])?;
        }
        let name = self.take_string()?;
        self.expect(&[b':'])?;
        Ok(Some(name))
    }

    fn expect_end(&mut self) -> Result<(), Error> {
        self.skip_ws();
        if self.pos != self.buf.len() {
            return Err(self.err("trailing garbage after value"));
        }
        Ok(())
    }
}

fn utf8_len(lead: u8) -> usize {
    match lead {
        0xF0..=0xF7 => 4,
        0xE0..=0xEF => 3,
        0xC0..=0xDF => 2,
        _ => 1,
    }
}

/// Reads object graphs from JSON text.
#[derive(Default)]
pub struct JsonDeserializer {
    pub options: CommonOptions,
    pub json_options: JsonOptions,
}

impl JsonDeserializer {
    pub fn new() -> JsonDeserializer {
        JsonDeserializer::default()
    }

    /// Deserializes a value of type `V` from JSON text.
    pub fn from_str<V: FieldValue>(&mut self, source: &str) -> Result<V, Error> {
        let mut lex = Lexer::new(source.as_bytes(), self.options.report_error_position);
        let v = self.read_field(&mut lex, &V::field_type())?;
        lex.expect_end()?;
        V::from_value(v)
    }

    /// Deserializes JSON text into an existing instance, honoring merge
    /// semantics for records and containers.
    pub fn from_str_into<V: FieldValue>(&mut self, obj: &mut V, source: &str) -> Result<(), Error> {
        let mut lex = Lexer::new(source.as_bytes(), self.options.report_error_position);
        if let Some(rec) = obj.as_record_mut() {
            self.read_into_record(&mut lex, rec)?;
        } else {
            let v = self.read_field(&mut lex, &V::field_type())?;
            obj.merge_value(v)?;
        }
        lex.expect_end()
    }

    /// Decodes any JSON value generically.
    pub fn value_from_str(&mut self, source: &str) -> Result<Value, Error> {
        let mut lex = Lexer::new(source.as_bytes(), self.options.report_error_position);
        let v = self.read_any(&mut lex)?;
        lex.expect_end()?;
        Ok(v)
    }

    /// Deserializes from UTF-8 JSON bytes.
    pub fn from_bytes<V: FieldValue>(&mut self, data: &[u8]) -> Result<V, Error> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::stream("JSON input is not valid UTF-8"))?;
        self.from_str(text)
    }

    /// Deserializes from a stream.
    pub fn from_stream<V: FieldValue>(&mut self, source: &mut impl io::Read) -> Result<V, Error> {
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;
        self.from_bytes(&data)
    }

    fn read_field(&mut self, lex: &mut Lexer<'_>, ft: &FieldType) -> Result<Value, Error> {
        Ok(match ft {
            FieldType::Bool => Value::Bool(lex.take_bool()?),
            FieldType::SByte => Value::SByte(self.narrow(lex.take_int()?, "sbyte")?),
            FieldType::Byte => Value::Byte(self.narrow(lex.take_int()?, "byte")?),
            FieldType::Short => Value::Short(self.narrow(lex.take_int()?, "short")?),
            FieldType::UShort => Value::UShort(self.narrow(lex.take_int()?, "ushort")?),
            FieldType::Int => Value::Int(self.narrow(lex.take_int()?, "int")?),
            FieldType::UInt => Value::UInt(self.narrow(lex.take_int()?, "uint")?),
            FieldType::Long => Value::Long(self.take_int64(lex, "long")?),
            FieldType::ULong => {
                let wide = self.take_int64_wide(lex)?;
                Value::ULong(
                    u64::try_from(wide).map_err(|_| Error::Overflow { target: "ulong" })?,
                )
            }
            FieldType::Float => {
                let text = lex.take_number_text()?;
                Value::Float(
                    text.parse::<f32>()
                        .map_err(|_| lex.err(format!("bad number literal '{text}'")))?,
                )
            }
            FieldType::Double => Value::Double(lex.take_f64()?),
            FieldType::Decimal => {
                let text = if self.json_options.decimal_as_string {
                    lex.take_string()?
                } else {
                    lex.take_number_text()?
                };
                Value::Decimal(text.parse::<Decimal>()?)
            }
            FieldType::Char => {
                let s = lex.take_string()?;
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Char(c),
                    _ => return Err(lex.err(format!("expected a single char, found '{s}'"))),
                }
            }
            FieldType::Str => match lex.take_string_or_null()? {
                Some(s) => Value::Str(s),
                None => Value::Null,
            },
            FieldType::DateTime => {
                let s = lex.take_string()?;
                let dt = if self.json_options.date_format == "O" {
                    parse_datetime(&s)?
                } else {
                    chrono::NaiveDateTime::parse_from_str(&s, &self.json_options.date_format)
                        .map_err(|_| lex.err(format!("bad date literal '{s}'")))?
                };
                Value::DateTime(dt)
            }
            FieldType::TimeSpan => {
                let s = lex.take_string()?;
                Value::TimeSpan(s.parse::<TimeSpan>()?)
            }
            FieldType::Enum(def) => {
                if self.json_options.enum_as_string {
                    let name = lex.take_string()?;
                    let raw = def.value_of(&name).ok_or_else(|| Error::BadKey {
                        message: format!("no variant '{name}' in enum {}", def.name),
                    })?;
                    Value::Enum(def, raw)
                } else {
                    Value::Enum(def, self.narrow(lex.take_int()?, "int")?)
                }
            }
            FieldType::Opt(inner) => {
                if lex.take_null()? {
                    Value::Null
                } else {
                    self.read_field(lex, inner)?
                }
            }
            FieldType::Seq(inner) => {
                if lex.take_null()? {
                    return Ok(Value::Null);
                }
                lex.expect(&[b'['])?;
                let mut items = Vec::new();
                if lex.peek_token()? == b']' {
                    lex.pos += 1;
                } else {
                    loop {
                        items.push(self.read_field(lex, inner)?);
                        if lex.expect(&[b',', b']'])? == b']' {
                            break;
                        }
                    }
                }
                Value::Seq {
                    elem: (**inner).clone(),
                    items,
                }
            }
            FieldType::Map(kt, vt) => {
                if lex.take_null()? {
                    return Ok(Value::Null);
                }
                lex.expect(&[b'{'])?;
                let mut entries = Vec::new();
                if lex.peek_token()? == b'}' {
                    lex.pos += 1;
                } else {
                    loop {
                        let raw = lex.take_string()?;
                        lex.expect(&[b':'])?;
                        let key = keys::parse_key(kt, &raw)?;
                        let value = self.read_field(lex, vt)?;
                        entries.push((key, value));
                        if lex.expect(&[b',', b'}'])? == b'}' {
                            break;
                        }
                    }
                }
                Value::Map {
                    key: (**kt).clone(),
                    val: (**vt).clone(),
                    entries,
                }
            }
            FieldType::Record(f) => return self.read_expected_record(lex, f()?),
            FieldType::AnyRecord => return self.read_record(lex, None),
            FieldType::Any => return self.read_any(lex),
        })
    }

    fn narrow<T: TryFrom<i128>>(&self, wide: i128, name: &'static str) -> Result<T, Error> {
        T::try_from(wide).map_err(|_| Error::Overflow { target: name })
    }

    fn take_int64(&mut self, lex: &mut Lexer<'_>, name: &'static str) -> Result<i64, Error> {
        let wide = self.take_int64_wide(lex)?;
        i64::try_from(wide).map_err(|_| Error::Overflow { target: name })
    }

    fn take_int64_wide(&mut self, lex: &mut Lexer<'_>) -> Result<i128, Error> {
        if self.json_options.int64_as_string {
            let s = lex.take_string()?;
            s.parse::<i128>()
                .map_err(|_| lex.err(format!("bad integer literal '{s}'")))
        } else {
            lex.take_int()
        }
    }

    /// Reads a record field declared as a concrete type, resolving its
    /// surrogate consumer when one is registered.
    fn read_expected_record(
        &mut self,
        lex: &mut Lexer<'_>,
        shape: &'static Shape,
    ) -> Result<Value, Error> {
        if let Some(sg) = shape.surrogate() {
            if sg.from.is_some() && sg.to.is_some() && sg.cond.is_none() {
                let v = match &sg.ty {
                    FieldType::Record(fs) => self.read_expected_record(lex, fs()?)?,
                    FieldType::AnyRecord => self.read_record(lex, None)?,
                    scalar => self.read_field(lex, scalar)?,
                };
                if matches!(v, Value::Null) {
                    return Ok(Value::Null);
                }
                let rec = sg.consume(v).expect("consumer present")?;
                return Ok(Value::Record(rec));
            }
            if sg.from.is_some() && sg.cond.is_some() {
                // Conditional surrogate: the syntax discriminates. The
                // surrogate branch is a compact array, the plain branch an
                // object (possibly tagged with the surrogate class name).
                if lex.peek_token()? == b'[' {
                    if let Some(sshape) = sg.record_shape().transpose()? {
                        let v = self.read_expected_record(lex, sshape)?;
                        let rec = sg.consume(v).expect("consumer present")?;
                        return Ok(Value::Record(rec));
                    }
                }
            }
        }
        self.read_record(lex, Some(shape))
    }

    /// Reads a record value from `null`, a compact array, or an object.
    fn read_record(
        &mut self,
        lex: &mut Lexer<'_>,
        expected: Option<&'static Shape>,
    ) -> Result<Value, Error> {
        if lex.take_null()? {
            return Ok(Value::Null);
        }
        match lex.peek_token()? {
            b'[' => {
                let shape = expected
                    .ok_or_else(|| lex.err("cannot read a compact record without a target type"))?;
                let mut instance = shape.make_instance();
                self.read_compact_into(lex, instance.as_mut(), shape)?;
                Ok(Value::Record(instance))
            }
            b'{' => {
                lex.pos += 1;
                let first = lex.next_name(true)?;
                let Some(first_name) = first else {
                    // Empty object: all members must be optional.
                    let shape = expected
                        .ok_or_else(|| lex.err("expected a class tag in untyped object"))?;
                    let instance = shape.make_instance();
                    self.check_required_from(shape, 0)?;
                    return Ok(Value::Record(instance));
                };
                if first_name == self.json_options.class_tag {
                    let class_name = lex.take_string()?;
                    return self.read_tagged_record(lex, expected, &class_name);
                }
                let shape = expected
                    .ok_or_else(|| lex.err(format!("expected class tag, but found '{first_name}'")))?;
                let mut instance = shape.make_instance();
                self.read_fields_into(lex, instance.as_mut(), shape, Some(first_name))?;
                Ok(Value::Record(instance))
            }
            other => Err(lex.err(format!("expected an object or array, found '{}'", other as char))),
        }
    }

    /// Continues an object whose first key was the class tag.
    fn read_tagged_record(
        &mut self,
        lex: &mut Lexer<'_>,
        expected: Option<&'static Shape>,
        class_name: &str,
    ) -> Result<Value, Error> {
        match registry::resolve(class_name) {
            Some(actual) => {
                if let Some(exp) = expected {
                    if exp.type_id != actual.type_id {
                        // A conditional record surrogate writes its own
                        // class name; detect and convert.
                        if let Some(sg) = exp.surrogate() {
                            if sg.from.is_some() {
                                if let Some(sshape) = sg.record_shape().transpose()? {
                                    if sshape.type_id == actual.type_id {
                                        let mut inst = actual.make_instance();
                                        let next = lex.next_name(false)?;
                                        self.read_fields_into(lex, inst.as_mut(), actual, next)?;
                                        let rec = sg
                                            .consume(Value::Record(inst))
                                            .expect("consumer present")?;
                                        return Ok(Value::Record(rec));
                                    }
                                }
                            }
                        }
                        return Err(lex.err(format!(
                            "expected type '{}', but got '{class_name}'",
                            exp.class_name
                        )));
                    }
                }
                let mut instance = actual.make_instance();
                let next = lex.next_name(false)?;
                self.read_fields_into(lex, instance.as_mut(), actual, next)?;
                Ok(Value::Record(instance))
            }
            None => {
                if expected.is_some() {
                    return Err(Error::UnknownType {
                        name: class_name.to_string(),
                    });
                }
                debug!(class = class_name, "decoding unknown class generically");
                let mut u = UnknownRecord::new(class_name);
                let mut key = lex.next_name(false)?;
                while let Some(name) = key {
                    let v = self.read_any(lex)?;
                    u.push(name, v, None);
                    key = lex.next_name(false)?;
                }
                Ok(Value::Unknown(u))
            }
        }
    }

    /// Reads a compact (positional array) record body into an instance.
    fn read_compact_into(
        &mut self,
        lex: &mut Lexer<'_>,
        obj: &mut dyn Record,
        shape: &'static Shape,
    ) -> Result<(), Error> {
        if !shape.is_compact && !self.json_options.ignore_compact {
            return Err(lex.err(format!(
                "attempt to read non-compact type '{}' from compact format",
                shape.class_name
            )));
        }
        lex.expect(&[b'['])?;
        for (i, member) in shape.members.iter().enumerate() {
            if i > 0 {
                lex.expect(&[b','])?;
            }
            let v = self.read_field(lex, &member.ty)?;
            member.set_value(obj, v)?;
        }
        lex.expect(&[b']'])?;
        Ok(())
    }

    /// Reads object fields into an instance, starting from an already
    /// consumed first key.
    fn read_fields_into(
        &mut self,
        lex: &mut Lexer<'_>,
        obj: &mut dyn Record,
        shape: &'static Shape,
        first_key: Option<String>,
    ) -> Result<(), Error> {
        if self.json_options.unordered {
            self.read_fields_unordered(lex, obj, shape, first_key)
        } else {
            self.read_fields_ordered(lex, obj, shape, first_key)
        }
    }

    fn read_fields_ordered(
        &mut self,
        lex: &mut Lexer<'_>,
        obj: &mut dyn Record,
        shape: &'static Shape,
        first_key: Option<String>,
    ) -> Result<(), Error> {
        let mode = self.options.tag_mode;
        let mut cursor = 0usize;
        let mut key = first_key;
        while let Some(name) = key {
            match shape.members[cursor..]
                .iter()
                .position(|m| m.tag(mode) == name)
            {
                Some(offset) => {
                    for member in &shape.members[cursor..cursor + offset] {
                        if member.kind == ItemKind::Required {
                            return Err(Error::missing(member.tag(mode), shape.class_name));
                        }
                    }
                    let member = &shape.members[cursor + offset];
                    self.read_member(lex, obj, shape, member)?;
                    cursor += offset + 1;
                }
                None => {
                    if shape.member_by_tag(&name, mode).is_some() {
                        return Err(lex.err(format!(
                            "field '{name}' out of declared order in class '{}'",
                            shape.class_name
                        )));
                    }
                    self.stash_unknown(lex, obj, shape, name)?;
                }
            }
            key = lex.next_name(false)?;
        }
        self.check_required_from(shape, cursor)
    }

    fn read_fields_unordered(
        &mut self,
        lex: &mut Lexer<'_>,
        obj: &mut dyn Record,
        shape: &'static Shape,
        first_key: Option<String>,
    ) -> Result<(), Error> {
        let mode = self.options.tag_mode;
        let mut seen = vec![false; shape.members.len()];
        let mut key = first_key;
        while let Some(name) = key {
            match shape.member_by_tag(&name, mode) {
                Some((idx, member)) => {
                    if seen[idx] {
                        return Err(lex.err(format!(
                            "duplicate field '{name}' in class '{}'",
                            shape.class_name
                        )));
                    }
                    seen[idx] = true;
                    self.read_member(lex, obj, shape, member)?;
                }
                None => self.stash_unknown(lex, obj, shape, name)?,
            }
            key = lex.next_name(false)?;
        }
        for (i, member) in shape.members.iter().enumerate() {
            if member.kind == ItemKind::Required && !seen[i] {
                return Err(Error::missing(member.tag(mode), shape.class_name));
            }
        }
        Ok(())
    }

    fn check_required_from(&self, shape: &'static Shape, from: usize) -> Result<(), Error> {
        for member in &shape.members[from..] {
            if member.kind == ItemKind::Required {
                return Err(Error::missing(
                    member.tag(self.options.tag_mode),
                    shape.class_name,
                ));
            }
        }
        Ok(())
    }

    fn read_member(
        &mut self,
        lex: &mut Lexer<'_>,
        obj: &mut dyn Record,
        shape: &'static Shape,
        member: &crate::meta::Member,
    ) -> Result<(), Error> {
        if member.merge {
            return match &member.ty {
                FieldType::Record(_) | FieldType::AnyRecord => {
                    match (member.project_record)(obj) {
                        Some(rec) => self.read_into_record(lex, rec),
                        None => Err(Error::schema(
                            shape.class_name,
                            format!("unable to merge into field '{}'", member.name),
                        )),
                    }
                }
                ty => {
                    let v = self.read_field(lex, ty)?;
                    member.merge_value(obj, v)
                }
            };
        }
        let v = self.read_field(lex, &member.ty)?;
        member.set_value(obj, v)
    }

    fn stash_unknown(
        &mut self,
        lex: &mut Lexer<'_>,
        obj: &mut dyn Record,
        shape: &'static Shape,
        name: String,
    ) -> Result<(), Error> {
        let v = self.read_any(lex)?;
        match shape.storage_of_mut(obj) {
            Some(storage) => {
                storage.add(name, v, None);
                Ok(())
            }
            None if shape.allow_unknown_fields || self.options.allow_unknown_fields => {
                trace!(field = %name, class = shape.class_name, "dropped unknown field");
                Ok(())
            }
            None => Err(Error::UnknownField {
                field: name,
                class: shape.class_name.to_string(),
            }),
        }
    }

    /// Reads a record into an existing instance; a class tag, when present,
    /// must name the instance's own class.
    fn read_into_record(&mut self, lex: &mut Lexer<'_>, obj: &mut dyn Record) -> Result<(), Error> {
        let shape = obj.shape()?;
        if lex.take_null()? {
            return Err(lex.err("cannot read null into an existing instance"));
        }
        match lex.peek_token()? {
            b'[' => self.read_compact_into(lex, obj, shape),
            b'{' => {
                lex.pos += 1;
                let mut first = lex.next_name(true)?;
                if first.as_deref() == Some(self.json_options.class_tag.as_str()) {
                    let class_name = lex.take_string()?;
                    if !shape.matches_name(&class_name) {
                        return Err(lex.err(format!(
                            "expected type '{}', but got '{class_name}'",
                            shape.class_name
                        )));
                    }
                    first = lex.next_name(false)?;
                }
                self.read_fields_into(lex, obj, shape, first)
            }
            other => Err(lex.err(format!("expected an object or array, found '{}'", other as char))),
        }
    }

    /// Decodes any JSON value without a schema: objects tagged with the
    /// class pseudo-field become records (or unknown records), plain objects
    /// become string-keyed mappings, numbers become doubles.
    fn read_any(&mut self, lex: &mut Lexer<'_>) -> Result<Value, Error> {
        match lex.peek_token()? {
            b'"' => Ok(Value::Str(lex.take_string()?)),
            b't' | b'f' => Ok(Value::Bool(lex.take_bool()?)),
            b'n' => {
                lex.take_null()?;
                Ok(Value::Null)
            }
            b'[' => {
                lex.pos += 1;
                let mut items = Vec::new();
                if lex.peek_token()? == b']' {
                    lex.pos += 1;
                } else {
                    loop {
                        items.push(self.read_any(lex)?);
                        if lex.expect(&[b',', b']'])? == b']' {
                            break;
                        }
                    }
                }
                Ok(Value::Seq {
                    elem: FieldType::Any,
                    items,
                })
            }
            b'{' => {
                lex.pos += 1;
                let first = lex.next_name(true)?;
                let Some(first_name) = first else {
                    return Ok(Value::Map {
                        key: FieldType::Str,
                        val: FieldType::Any,
                        entries: Vec::new(),
                    });
                };
                if first_name == self.json_options.class_tag {
                    let class_name = lex.take_string()?;
                    return self.read_tagged_record(lex, None, &class_name);
                }
                let mut entries = Vec::new();
                let mut key = Some(first_name);
                while let Some(name) = key {
                    let v = self.read_any(lex)?;
                    entries.push((Value::Str(name), v));
                    key = lex.next_name(false)?;
                }
                Ok(Value::Map {
                    key: FieldType::Str,
                    val: FieldType::Any,
                    entries,
                })
            }
            _ => Ok(Value::Double(lex.take_f64()?)),
        }
    }
}
