//! Fallback containers preserving round-trip fidelity for data whose shape
//! this process does not know.

use crate::rough::WireType;
use crate::value::Value;
use crate::{ShapeBuilder, Shaped};

/// One preserved field: its original wire tag, decoded value, and (when it
/// came off the binary protocol) the stream's type descriptor for it.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownItem {
    pub name: String,
    pub value: Value,
    pub wire: Option<WireType>,
}

/// A wholly unrecognized wire class, decoded generically field by field.
///
/// Re-serializing it reproduces the original encoding (modulo stream-local
/// class-id renumbering). It participates in the object model as a regular
/// record, so polymorphic fields can hold it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnknownRecord {
    /// The class name the producing process wrote.
    pub class_tag: String,
    pub fields: Vec<UnknownItem>,
}

impl UnknownRecord {
    pub fn new(class_tag: impl Into<String>) -> UnknownRecord {
        UnknownRecord {
            class_tag: class_tag.into(),
            fields: Vec::new(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value, wire: Option<WireType>) {
        self.fields.push(UnknownItem {
            name: name.into(),
            value,
            wire,
        });
    }
}

impl Shaped for UnknownRecord {
    fn class_name() -> &'static str {
        "<unknown>"
    }

    fn describe(b: &mut ShapeBuilder<Self>) {
        b.allow_empty();
    }
}

/// Per-instance stash for fields present on the wire but absent from the
/// current shape. Types opt in through
/// [`ShapeBuilder::unknown_storage`](crate::ShapeBuilder::unknown_storage);
/// stored fields are written back out on re-serialization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnknownStorage {
    fields: Vec<UnknownItem>,
    ordered: bool,
}

impl UnknownStorage {
    pub fn new() -> UnknownStorage {
        UnknownStorage {
            fields: Vec::new(),
            ordered: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True while stored field names are in ascending ordinal order.
    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn fields(&self) -> &[UnknownItem] {
        &self.fields
    }

    pub fn clear(&mut self) {
        self.fields.clear();
        self.ordered = true;
    }

    pub fn add(&mut self, name: impl Into<String>, value: Value, wire: Option<WireType>) {
        let name = name.into();
        if let Some(last) = self.fields.last() {
            if last.name.as_str() > name.as_str() {
                self.ordered = false;
            }
        }
        self.fields.push(UnknownItem { name, value, wire });
    }

    /// Sorts stored fields by ordinal name, the order the ordered JSON
    /// writer interleaves them in.
    pub fn sort(&mut self) {
        if !self.ordered {
            self.fields.sort_by(|a, b| a.name.cmp(&b.name));
            self.ordered = true;
        }
    }
}
