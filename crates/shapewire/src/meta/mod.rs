//! The compiled type model: shapes, members, and the process-wide shape
//! cache.

mod builder;
mod field;
pub mod registry;
mod surrogate;

pub use builder::{MemberCfg, ShapeBuilder};
pub use field::{EnumDef, FieldType, ShapeFn};
pub use surrogate::Surrogate;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, RwLock};

use tracing::debug;

use crate::error::Error;
use crate::options::TagMode;
use crate::unknown::UnknownStorage;
use crate::value::Value;

/// A serializable record type, declared through a [`ShapeBuilder`].
///
/// Implementors get the object-safe [`Record`] trait for free and usually
/// also invoke [`record_value!`](crate::record_value) so the type can appear
/// as a field of other records.
pub trait Shaped: Any + Default + Clone + Send + Sync + fmt::Debug + Sized {
    /// The wire class name.
    fn class_name() -> &'static str;

    /// Declares members, aliases, compactness, surrogates, and storage.
    fn describe(b: &mut ShapeBuilder<Self>);
}

/// Object-safe view of a shaped record instance. Blanket-implemented for all
/// [`Shaped`] types; codecs traverse object graphs through it.
pub trait Record: Any + Send + Sync + fmt::Debug {
    fn shape(&self) -> Result<&'static Shape, Error>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn clone_boxed(&self) -> Box<dyn Record>;
}

impl<T: Shaped> Record for T {
    fn shape(&self) -> Result<&'static Shape, Error> {
        Shape::of::<T>()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
    fn clone_boxed(&self) -> Box<dyn Record> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Record> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

pub(crate) fn downcast_ref<T: Shaped>(r: &dyn Record) -> &T {
    match r.as_any().downcast_ref::<T>() {
        Some(t) => t,
        None => panic!(
            "shape accessor for {} applied to a different record type",
            T::class_name()
        ),
    }
}

pub(crate) fn downcast_mut<T: Shaped>(r: &mut dyn Record) -> &mut T {
    match r.as_any_mut().downcast_mut::<T>() {
        Some(t) => t,
        None => panic!(
            "shape accessor for {} applied to a different record type",
            T::class_name()
        ),
    }
}

pub(crate) fn make_boxed<T: Shaped>() -> Box<dyn Record> {
    Box::new(T::default())
}

/// Member kind, deciding read/write policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// Must appear on read; absence is a hard error.
    Required,
    /// May be absent; absence leaves the pre-existing value untouched.
    Optional,
    /// Implicit-optional, skipped on write while equal to the type's default.
    Member,
}

pub(crate) type GetFn = Box<dyn Fn(&dyn Record) -> Value + Send + Sync>;
pub(crate) type SetFn = Box<dyn Fn(&mut dyn Record, Value) -> Result<(), Error> + Send + Sync>;
pub(crate) type ProjectFn =
    Box<dyn for<'a> Fn(&'a mut dyn Record) -> Option<&'a mut dyn Record> + Send + Sync>;
pub(crate) type CondFn = Box<dyn Fn(&dyn Record) -> bool + Send + Sync>;

/// One serializable member of a [`Shape`].
pub struct Member {
    pub name: &'static str,
    pub alias: Option<&'static str>,
    /// Generated short id used by the `Ids` tag mode.
    pub id: String,
    pub kind: ItemKind,
    pub merge: bool,
    pub ty: FieldType,
    pub(crate) get: GetFn,
    pub(crate) set: SetFn,
    pub(crate) merge_in: SetFn,
    pub(crate) project_record: ProjectFn,
    pub(crate) serialize_if: Option<CondFn>,
    pub(crate) default: Option<Value>,
    pub(crate) mergeable: bool,
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("kind", &self.kind)
            .field("merge", &self.merge)
            .field("ty", &self.ty)
            .finish()
    }
}

impl Member {
    pub fn tag(&self, mode: TagMode) -> &str {
        match mode {
            TagMode::Names => self.name,
            TagMode::Aliases => self.alias.unwrap_or(self.name),
            TagMode::Ids => &self.id,
        }
    }

    pub fn is_optional(&self) -> bool {
        self.kind != ItemKind::Required
    }

    /// Write-time skip policy: an explicit condition wins, otherwise
    /// `Member`-kind values equal to the type default are skipped.
    pub(crate) fn should_write(&self, obj: &dyn Record, value: &Value) -> bool {
        if let Some(cond) = &self.serialize_if {
            return cond(obj);
        }
        match (&self.default, self.kind) {
            (Some(default), ItemKind::Member) => value != default,
            _ => true,
        }
    }

    pub(crate) fn get_value(&self, obj: &dyn Record) -> Value {
        (self.get)(obj)
    }

    pub(crate) fn set_value(&self, obj: &mut dyn Record, v: Value) -> Result<(), Error> {
        (self.set)(obj, v)
    }

    pub(crate) fn merge_value(&self, obj: &mut dyn Record, v: Value) -> Result<(), Error> {
        (self.merge_in)(obj, v)
    }
}

pub(crate) struct StorageAccessor {
    pub(crate) get: Box<dyn for<'a> Fn(&'a dyn Record) -> &'a UnknownStorage + Send + Sync>,
    pub(crate) get_mut:
        Box<dyn for<'a> Fn(&'a mut dyn Record) -> &'a mut UnknownStorage + Send + Sync>,
}

/// The compiled, process-wide-cached description of a type's serializable
/// members and per-type policy flags.
pub struct Shape {
    pub class_name: &'static str,
    /// Written in place of the class name when set (also forces the class
    /// tag in JSON output).
    pub write_alias: Option<&'static str>,
    /// Additional names accepted when reading.
    pub read_aliases: Vec<&'static str>,
    pub is_compact: bool,
    pub allow_unknown_fields: bool,
    pub allow_empty: bool,
    pub members: Vec<Member>,
    pub type_id: TypeId,
    pub(crate) make: fn() -> Box<dyn Record>,
    pub(crate) storage: Option<StorageAccessor>,
    pub(crate) surrogate: Option<Surrogate>,
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape")
            .field("class_name", &self.class_name)
            .field("is_compact", &self.is_compact)
            .field("members", &self.members)
            .finish()
    }
}

impl Shape {
    /// Returns the compiled shape of `T`, compiling and caching it on first
    /// use. Compilation failures surface as [`Error::Schema`] on every call.
    pub fn of<T: Shaped>() -> Result<&'static Shape, Error> {
        let cache = shape_cache();
        let type_id = TypeId::of::<T>();
        {
            let guard = cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(shape) = guard.get(&type_id).copied() {
                return Ok(shape);
            }
        }
        // Compile outside the lock; only a complete shape is published.
        let shape = builder::compile::<T>()?;
        debug!(
            class = shape.class_name,
            members = shape.members.len(),
            "compiled shape"
        );
        let mut guard = cache.write().unwrap_or_else(|e| e.into_inner());
        let entry = guard
            .entry(type_id)
            .or_insert_with(|| Box::leak(Box::new(shape)));
        Ok(*entry)
    }

    /// The name written to the wire for this class.
    pub fn wire_name(&self) -> &str {
        self.write_alias.unwrap_or(self.class_name)
    }

    /// Whether `name` identifies this class on read.
    pub fn matches_name(&self, name: &str) -> bool {
        self.class_name == name
            || self.write_alias == Some(name)
            || self.read_aliases.iter().any(|a| *a == name)
    }

    pub fn member_by_tag(&self, tag: &str, mode: TagMode) -> Option<(usize, &Member)> {
        self.members
            .iter()
            .enumerate()
            .find(|(_, m)| m.tag(mode) == tag)
    }

    /// Member count when every member is primitive, `None` otherwise. Drives
    /// the oneline JSON layout.
    pub fn primitive_member_count(&self) -> Option<usize> {
        if self.members.iter().all(|m| m.ty.is_primitive()) {
            Some(self.members.len())
        } else {
            None
        }
    }

    pub fn make_instance(&self) -> Box<dyn Record> {
        (self.make)()
    }

    pub(crate) fn storage_of<'a>(&self, obj: &'a dyn Record) -> Option<&'a UnknownStorage> {
        self.storage.as_ref().map(|acc| (acc.get)(obj))
    }

    pub(crate) fn storage_of_mut<'a>(
        &self,
        obj: &'a mut dyn Record,
    ) -> Option<&'a mut UnknownStorage> {
        self.storage.as_ref().map(|acc| (acc.get_mut)(obj))
    }

    pub(crate) fn surrogate(&self) -> Option<&Surrogate> {
        self.surrogate.as_ref()
    }
}

fn shape_cache() -> &'static RwLock<HashMap<TypeId, &'static Shape>> {
    static CACHE: OnceLock<RwLock<HashMap<TypeId, &'static Shape>>> = OnceLock::new();
    CACHE.get_or_init(Default::default)
}
