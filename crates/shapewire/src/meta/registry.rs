//! The process-wide class registry resolving wire class names to shapes and
//! constructors, the basis of polymorphic reads.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use tracing::debug;

use crate::error::Error;
use crate::meta::{make_boxed, Record, Shape, Shaped};

#[derive(Clone, Copy)]
struct Entry {
    shape: &'static Shape,
    make: fn() -> Box<dyn Record>,
}

fn registry() -> &'static RwLock<HashMap<String, Entry>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, Entry>>> = OnceLock::new();
    REGISTRY.get_or_init(Default::default)
}

/// Registers `T` under its class name and read aliases so readers can
/// instantiate it when the wire names it. Compiles (and validates) the shape
/// eagerly; registration is idempotent per type, and claiming a name already
/// held by a different type is a schema error.
pub fn register<T: Shaped>() -> Result<(), Error> {
    let shape = Shape::of::<T>()?;
    let entry = Entry {
        shape,
        make: make_boxed::<T>,
    };
    let mut map = registry().write().unwrap_or_else(|e| e.into_inner());
    let mut names = vec![shape.class_name];
    names.extend(shape.read_aliases.iter().copied());
    for name in names {
        match map.get(name) {
            Some(existing) if existing.shape.type_id != shape.type_id => {
                return Err(Error::schema(
                    shape.class_name,
                    format!("class name '{name}' already registered by another type"),
                ));
            }
            Some(_) => {}
            None => {
                debug!(class = name, "registered class");
                map.insert(name.to_string(), entry);
            }
        }
    }
    Ok(())
}

/// Resolves a wire class name to its shape, if this process knows it.
pub fn resolve(name: &str) -> Option<&'static Shape> {
    let map = registry().read().unwrap_or_else(|e| e.into_inner());
    map.get(name).map(|e| e.shape)
}

/// Default-constructs an instance of the named class.
pub fn make(name: &str) -> Option<Box<dyn Record>> {
    let map = registry().read().unwrap_or_else(|e| e.into_inner());
    map.get(name).map(|e| (e.make)())
}
