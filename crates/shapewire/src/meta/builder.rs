//! The declarative schema builder types implement [`Shaped::describe`] with.

use std::any::{type_name, TypeId};
use std::collections::HashSet;
use std::marker::PhantomData;

use crate::error::Error;
use crate::meta::surrogate::{self, Surrogate};
use crate::meta::{
    downcast_mut, downcast_ref, make_boxed, ItemKind, Member, Shape, Shaped, StorageAccessor,
};
use crate::options::{next_member_id, TagMode};
use crate::unknown::UnknownStorage;
use crate::value::FieldValue;

pub(crate) fn compile<T: Shaped>() -> Result<Shape, Error> {
    let mut b = ShapeBuilder::<T>::new();
    T::describe(&mut b);
    b.build()
}

/// Collects a type's member declarations and per-type flags, then validates
/// them into a [`Shape`].
pub struct ShapeBuilder<T: Shaped> {
    members: Vec<Member>,
    is_compact: bool,
    aliases: Vec<&'static str>,
    allow_unknown_fields: bool,
    allow_empty: bool,
    storage: Option<StorageAccessor>,
    surrogate: Option<Surrogate>,
    surrogate_other: Option<(TypeId, &'static str)>,
    pending_cond: Option<crate::meta::surrogate::IfFn>,
    default_instance: T,
    errors: Vec<String>,
}

impl<T: Shaped> ShapeBuilder<T> {
    pub(crate) fn new() -> ShapeBuilder<T> {
        ShapeBuilder {
            members: Vec::new(),
            is_compact: false,
            aliases: Vec::new(),
            allow_unknown_fields: false,
            allow_empty: false,
            storage: None,
            surrogate: None,
            surrogate_other: None,
            pending_cond: None,
            default_instance: T::default(),
            errors: Vec::new(),
        }
    }

    /// Serialize this type as a positional tuple without member tags.
    pub fn compact(&mut self) {
        self.is_compact = true;
    }

    /// Accepts `alias` as a class name on read. The first declared alias is
    /// also used for writing.
    pub fn alias(&mut self, alias: &'static str) {
        if alias.is_empty() {
            self.errors.push("empty class alias".to_string());
            return;
        }
        if self.aliases.contains(&alias) {
            self.errors.push(format!("duplicate class alias '{alias}'"));
            return;
        }
        self.aliases.push(alias);
    }

    /// Tolerate unknown wire fields for this type regardless of the global
    /// policy.
    pub fn allow_unknown_fields(&mut self) {
        self.allow_unknown_fields = true;
    }

    /// Permit this type to have zero serializable members.
    pub fn allow_empty(&mut self) {
        self.allow_empty = true;
    }

    /// Stores unrecognized wire fields in the given
    /// [`UnknownStorage`]-typed field and writes them back on
    /// re-serialization.
    pub fn unknown_storage(
        &mut self,
        get: fn(&T) -> &UnknownStorage,
        get_mut: fn(&mut T) -> &mut UnknownStorage,
    ) {
        self.storage = Some(StorageAccessor {
            get: Box::new(move |r| get(downcast_ref::<T>(r))),
            get_mut: Box::new(move |r| get_mut(downcast_mut::<T>(r))),
        });
    }

    /// Declares a member that must be present on read.
    pub fn required<V: FieldValue>(
        &mut self,
        name: &'static str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> MemberCfg<'_, T> {
        self.add_member(ItemKind::Required, name, get, get_mut)
    }

    /// Declares a member that may be absent on read.
    pub fn optional<V: FieldValue>(
        &mut self,
        name: &'static str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> MemberCfg<'_, T> {
        self.add_member(ItemKind::Optional, name, get, get_mut)
    }

    /// Declares an implicit-optional member, skipped on write while its
    /// value equals the type default.
    pub fn member<V: FieldValue>(
        &mut self,
        name: &'static str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> MemberCfg<'_, T> {
        self.add_member(ItemKind::Member, name, get, get_mut)
    }

    fn add_member<V: FieldValue>(
        &mut self,
        kind: ItemKind,
        name: &'static str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> MemberCfg<'_, T> {
        let default = match kind {
            ItemKind::Member => Some(get(&self.default_instance).to_value()),
            _ => None,
        };
        self.members.push(Member {
            name,
            alias: None,
            id: next_member_id(),
            kind,
            merge: false,
            ty: V::field_type(),
            get: Box::new(move |r| get(downcast_ref::<T>(r)).to_value()),
            set: Box::new(move |r, v| {
                *get_mut(downcast_mut::<T>(r)) = V::from_value(v)?;
                Ok(())
            }),
            merge_in: Box::new(move |r, v| get_mut(downcast_mut::<T>(r)).merge_value(v)),
            project_record: Box::new(move |r| get_mut(downcast_mut::<T>(r)).as_record_mut()),
            serialize_if: None,
            default,
            mergeable: V::MERGEABLE,
        });
        MemberCfg {
            member: self.members.last_mut().expect("member just pushed"),
            errors: &mut self.errors,
            _marker: PhantomData,
        }
    }

    /// Registers the surrogate producer: `to` is substituted for the
    /// instance at write time.
    pub fn surrogate_to<S: FieldValue>(&mut self, to: fn(&T) -> S) {
        if self.surrogate.as_ref().is_some_and(|s| s.to.is_some()) {
            self.errors.push("duplicate surrogate producer".to_string());
            return;
        }
        if TypeId::of::<S>() == TypeId::of::<T>() {
            self.errors
                .push("surrogate producer returns the owner type".to_string());
            return;
        }
        let from = self.surrogate.take().and_then(|s| s.from);
        self.surrogate = Some(Surrogate {
            ty: S::field_type(),
            to: Some(Box::new(move |r| to(downcast_ref::<T>(r)).to_value())),
            from,
            cond: None,
        });
        self.surrogate_other = Some((TypeId::of::<S>(), type_name::<S>()));
    }

    /// Registers the surrogate consumer: decoded surrogate values are passed
    /// through `from` to materialize the original type.
    pub fn surrogate_from<S: FieldValue>(&mut self, from: fn(S) -> T) {
        if self.surrogate.as_ref().is_some_and(|s| s.from.is_some()) {
            self.errors.push("duplicate surrogate consumer".to_string());
            return;
        }
        if TypeId::of::<S>() == TypeId::of::<T>() {
            self.errors
                .push("surrogate consumer accepts the owner type".to_string());
            return;
        }
        let from_fn: crate::meta::surrogate::FromFn = Box::new(move |v| {
            let s = S::from_value(v)?;
            Ok(Box::new(from(s)) as Box<dyn crate::meta::Record>)
        });
        match &mut self.surrogate {
            Some(s) => s.from = Some(from_fn),
            None => {
                self.surrogate = Some(Surrogate {
                    ty: S::field_type(),
                    to: None,
                    from: Some(from_fn),
                    cond: None,
                });
                // A consumer alone does not make the owner a surrogate
                // writer, but it still pins the surrogate type.
                self.surrogate_other = Some((TypeId::of::<S>(), type_name::<S>()));
            }
        }
    }

    /// Declares both sides of a surrogate pair.
    pub fn surrogate<S: FieldValue>(&mut self, to: fn(&T) -> S, from: fn(S) -> T) {
        self.surrogate_to(to);
        self.surrogate_from(from);
    }

    /// Gates the surrogate substitution per instance. Re-evaluated for each
    /// concrete runtime type.
    pub fn surrogate_if(&mut self, cond: fn(&T) -> bool) {
        if self.pending_cond.is_some() {
            self.errors
                .push("duplicate surrogate condition".to_string());
            return;
        }
        self.pending_cond = Some(Box::new(move |r| cond(downcast_ref::<T>(r))));
    }

    pub(crate) fn build(mut self) -> Result<Shape, Error> {
        let class = T::class_name();
        if !self.errors.is_empty() {
            return Err(Error::schema(class, self.errors.remove(0)));
        }
        // Surrogate types get their wire shape from the substitute, so they
        // need no members of their own.
        if self.members.is_empty() && !self.allow_empty && self.surrogate.is_none() {
            return Err(Error::schema(class, "no serializable members"));
        }
        for mode in [TagMode::Names, TagMode::Aliases] {
            check_tags(&self.members, mode, class)?;
        }
        if self.is_compact && self.storage.is_some() {
            return Err(Error::schema(
                class,
                "compact types cannot carry unknown-field storage",
            ));
        }
        match (self.pending_cond.take(), &mut self.surrogate) {
            (Some(cond), Some(s)) => s.cond = Some(cond),
            (Some(_), None) => {
                return Err(Error::schema(class, "surrogate condition without a producer"))
            }
            _ => {}
        }
        if let (Some(s), Some((other_id, other_name))) = (&self.surrogate, self.surrogate_other) {
            if s.to.is_some() {
                surrogate::mark(other_id, surrogate::STATE_IS, class, other_name)?;
            }
            surrogate::mark(TypeId::of::<T>(), surrogate::STATE_HAS, class, other_name)?;
        }
        Ok(Shape {
            class_name: class,
            write_alias: self.aliases.first().copied(),
            read_aliases: self.aliases,
            is_compact: self.is_compact,
            allow_unknown_fields: self.allow_unknown_fields,
            allow_empty: self.allow_empty,
            members: self.members,
            type_id: TypeId::of::<T>(),
            make: make_boxed::<T>,
            storage: self.storage,
            surrogate: self.surrogate,
        })
    }
}

fn check_tags(members: &[Member], mode: TagMode, class: &str) -> Result<(), Error> {
    let mut seen = HashSet::new();
    for m in members {
        let tag = m.tag(mode);
        if tag.is_empty() {
            return Err(Error::schema(class, format!("empty tag for field '{}'", m.name)));
        }
        if let Some(ch) = tag.chars().find(|&ch| ch <= ' ' || ch >= '\u{7f}') {
            return Err(Error::schema(
                class,
                format!("bad character '{ch}' in tag for field '{}'", m.name),
            ));
        }
        if !seen.insert(tag) {
            return Err(Error::schema(
                class,
                format!("duplicate tag '{tag}' for field '{}'", m.name),
            ));
        }
    }
    Ok(())
}

/// Per-member follow-up configuration returned by the builder's member
/// methods.
pub struct MemberCfg<'a, T: Shaped> {
    member: &'a mut Member,
    errors: &'a mut Vec<String>,
    _marker: PhantomData<fn(T)>,
}

impl<T: Shaped> MemberCfg<'_, T> {
    /// Tags the member with a short wire alias.
    pub fn alias(self, alias: &'static str) -> Self {
        self.member.alias = Some(alias);
        self
    }

    /// Reads into the existing container/record instead of replacing it.
    pub fn merge(self) -> Self {
        if !self.member.mergeable {
            self.errors.push(format!(
                "member '{}' cannot merge: its type has no existing-instance target",
                self.member.name
            ));
        }
        self.member.merge = true;
        self
    }

    /// Skips writing the member when the predicate returns false.
    pub fn serialize_if(self, cond: fn(&T) -> bool) -> Self {
        self.member.serialize_if = Some(Box::new(move |r| cond(downcast_ref::<T>(r))));
        self
    }
}
