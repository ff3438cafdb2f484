//! Pre-compiled per-type binary field readers.
//!
//! For throughput-sensitive callers, a type can register a monomorphic
//! reader that assigns fields directly off the stream instead of going
//! through generic per-field dispatch. The deserializer only engages a
//! specialized reader when the stream's field table matches the declared
//! shape exactly; any schema drift falls back to the generic path, so
//! results are always identical to the generic reader's.

use std::any::TypeId;
use std::collections::HashMap;

use shapewire_buffers::Reader;

use crate::binary::{BinaryDeserializer, ClassDef};
use crate::error::Error;
use crate::meta::{Record, Shaped};

/// A monomorphic field reader for one record type. It consumes the tagged
/// field stream of one record body (everything after the class id) and
/// assigns directly into the instance.
pub type SpecializedReadFn = fn(
    &mut BinaryDeserializer,
    &mut Reader<'_>,
    &ClassDef,
    &mut dyn Record,
) -> Result<(), Error>;

/// Registry of specialized readers, installed via
/// [`BinaryDeserializer::with_specialized`].
#[derive(Default)]
pub struct SpecializedReaders {
    map: HashMap<TypeId, SpecializedReadFn>,
}

impl SpecializedReaders {
    pub fn new() -> SpecializedReaders {
        SpecializedReaders::default()
    }

    pub fn register<T: Shaped>(&mut self, f: SpecializedReadFn) {
        self.map.insert(TypeId::of::<T>(), f);
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub(crate) fn get(&self, id: &TypeId) -> Option<SpecializedReadFn> {
        self.map.get(id).copied()
    }
}

/// Downcasts the instance a specialized reader receives.
pub fn specialized_target<T: Shaped>(obj: &mut dyn Record) -> Result<&mut T, Error> {
    // The deserializer only dispatches here for the registered TypeId, so a
    // mismatch means the registration itself paired the wrong type.
    obj.as_any_mut()
        .downcast_mut::<T>()
        .ok_or_else(|| Error::schema(T::class_name(), "specialized reader bound to wrong type"))
}
