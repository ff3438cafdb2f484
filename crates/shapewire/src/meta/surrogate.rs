//! Surrogate pairs: alternate wire representations substituted for a type.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::error::Error;
use crate::meta::{FieldType, Record, Shape};
use crate::value::Value;

pub(crate) type ToFn = Box<dyn Fn(&dyn Record) -> Value + Send + Sync>;
pub(crate) type FromFn = Box<dyn Fn(Value) -> Result<Box<dyn Record>, Error> + Send + Sync>;
pub(crate) type IfFn = Box<dyn Fn(&dyn Record) -> bool + Send + Sync>;

/// An alternate wire representation for a type: a producer substitutes the
/// surrogate value at write time, a consumer materializes the original back
/// at read time, and an optional gate decides per instance whether the
/// substitution applies.
pub struct Surrogate {
    /// The surrogate's own field type; it decides the wire shape.
    pub ty: FieldType,
    pub(crate) to: Option<ToFn>,
    pub(crate) from: Option<FromFn>,
    pub(crate) cond: Option<IfFn>,
}

impl Surrogate {
    /// Whether writing `obj` substitutes the surrogate value.
    pub(crate) fn applies_to(&self, obj: &dyn Record) -> bool {
        self.to.is_some() && self.cond.as_ref().is_none_or(|c| c(obj))
    }

    /// The surrogate's shape when it is itself a record type.
    pub(crate) fn record_shape(&self) -> Option<Result<&'static Shape, Error>> {
        match self.ty {
            FieldType::Record(f) => Some(f()),
            _ => None,
        }
    }

    pub(crate) fn produce(&self, obj: &dyn Record) -> Option<Value> {
        self.to.as_ref().map(|to| to(obj))
    }

    pub(crate) fn consume(&self, v: Value) -> Option<Result<Box<dyn Record>, Error>> {
        self.from.as_ref().map(|from| from(v))
    }
}

pub(crate) const STATE_IS: u8 = 1;
pub(crate) const STATE_HAS: u8 = 2;

fn state_map() -> &'static RwLock<HashMap<TypeId, u8>> {
    static MAP: OnceLock<RwLock<HashMap<TypeId, u8>>> = OnceLock::new();
    MAP.get_or_init(Default::default)
}

/// Records that a type participates in a surrogate pair on one side. A type
/// that ends up on both sides forms a chain, which the model rejects: at
/// most one substitution hop is permitted.
pub(crate) fn mark(
    t: TypeId,
    bit: u8,
    owner_name: &str,
    other_name: &str,
) -> Result<(), Error> {
    let mut map = state_map().write().unwrap_or_else(|e| e.into_inner());
    let state = map.entry(t).or_insert(0);
    if *state | bit == STATE_IS | STATE_HAS {
        return Err(Error::schema(
            owner_name,
            format!("surrogate chain involving type '{other_name}'"),
        ));
    }
    *state |= bit;
    Ok(())
}
