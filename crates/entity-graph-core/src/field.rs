//! The field introspector's vocabulary: what a field holds (§4.1).
//!
//! Field classification in this port is resolved once, at derive-macro
//! expansion time, rather than once per call the way the dynamically typed
//! source does it (see DESIGN.md, "Field introspector"). A field's declared
//! Rust type already fixes whether it is entity-bearing and which container
//! shape it has; there is no runtime ambiguity left to resolve the way a
//! reflective walk over a dynamically typed record would need to.

use indexmap::IndexMap;

use crate::entity::EntityHandle;
use crate::id::EcsId;

/// Declared-type wrapper for a `list-of-entity` field (§4.1). The derive
/// macro recognises this type by name and emits `EntityField::List` for it;
/// a plain `Vec<EntityHandle>` would be ambiguous with `EntityTuple`'s and
/// `EntitySet`'s own backing storage, so each container shape gets its own
/// newtype rather than overloading one Rust type for three different
/// `EdgeKind`s.
#[derive(Clone, Debug, Default)]
pub struct EntityList(pub Vec<EntityHandle>);

/// Declared-type wrapper for a `dict-of-entity` field (§4.1). Key order is
/// the container's own insertion order, matching `IndexMap` semantics
/// elsewhere in this crate, but kept as a `Vec` here so the derive macro
/// does not need to depend on `indexmap` itself.
#[derive(Clone, Debug, Default)]
pub struct EntityDict(pub Vec<(String, EntityHandle)>);

/// Declared-type wrapper for a `set-of-entity` field (§4.1). Order is
/// stable per process but not meaningful, same as the tree builder's
/// treatment of `EdgeKind::Set`.
#[derive(Clone, Debug, Default)]
pub struct EntitySet(pub Vec<EntityHandle>);

/// Declared-type wrapper for a `tuple-of-entity` field (§4.1): fixed arity,
/// but the tree builder only cares about iteration order, so it is
/// represented identically to `EntityList` at this layer.
#[derive(Clone, Debug, Default)]
pub struct EntityTuple(pub Vec<EntityHandle>);

/// Converts a plain (non-entity) domain field to and from [`PlainValue`],
/// the diff engine's comparison currency. Implemented here for the common
/// scalar and collection shapes `#[derive(GraphEntity)]` fields use; a type
/// that implements none of these cannot be used as a plain field today
/// (documented limitation, see DESIGN.md).
pub trait AsPlainValue: Sized {
    fn to_plain(&self) -> PlainValue;
    fn from_plain(value: PlainValue) -> Option<Self>;
}

macro_rules! as_plain_value_int {
    ($ty:ty) => {
        impl AsPlainValue for $ty {
            fn to_plain(&self) -> PlainValue {
                PlainValue::Int(i64::from(*self))
            }

            fn from_plain(value: PlainValue) -> Option<Self> {
                match value {
                    PlainValue::Int(v) => Self::try_from(v).ok(),
                    _ => None,
                }
            }
        }
    };
}

as_plain_value_int!(i8);
as_plain_value_int!(i16);
as_plain_value_int!(i32);
as_plain_value_int!(u8);
as_plain_value_int!(u16);
as_plain_value_int!(u32);

impl AsPlainValue for i64 {
    fn to_plain(&self) -> PlainValue {
        PlainValue::Int(*self)
    }

    fn from_plain(value: PlainValue) -> Option<Self> {
        match value {
            PlainValue::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl AsPlainValue for u64 {
    fn to_plain(&self) -> PlainValue {
        PlainValue::Int(i64::try_from(*self).unwrap_or(i64::MAX))
    }

    fn from_plain(value: PlainValue) -> Option<Self> {
        match value {
            PlainValue::Int(v) => Self::try_from(v).ok(),
            _ => None,
        }
    }
}

impl AsPlainValue for f64 {
    fn to_plain(&self) -> PlainValue {
        PlainValue::Float(*self)
    }

    fn from_plain(value: PlainValue) -> Option<Self> {
        match value {
            PlainValue::Float(v) => Some(v),
            _ => None,
        }
    }
}

impl AsPlainValue for bool {
    fn to_plain(&self) -> PlainValue {
        PlainValue::Bool(*self)
    }

    fn from_plain(value: PlainValue) -> Option<Self> {
        match value {
            PlainValue::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl AsPlainValue for String {
    fn to_plain(&self) -> PlainValue {
        PlainValue::Text(self.clone())
    }

    fn from_plain(value: PlainValue) -> Option<Self> {
        match value {
            PlainValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl AsPlainValue for Vec<u8> {
    fn to_plain(&self) -> PlainValue {
        PlainValue::Bytes(self.clone())
    }

    fn from_plain(value: PlainValue) -> Option<Self> {
        match value {
            PlainValue::Bytes(v) => Some(v),
            _ => None,
        }
    }
}

impl<T: AsPlainValue> AsPlainValue for Option<T> {
    fn to_plain(&self) -> PlainValue {
        self.as_ref().map_or(PlainValue::Null, AsPlainValue::to_plain)
    }

    fn from_plain(value: PlainValue) -> Option<Self> {
        match value {
            PlainValue::Null => Some(None),
            other => T::from_plain(other).map(Some),
        }
    }
}

impl<T: AsPlainValue> AsPlainValue for Vec<T> {
    fn to_plain(&self) -> PlainValue {
        PlainValue::List(self.iter().map(AsPlainValue::to_plain).collect())
    }

    fn from_plain(value: PlainValue) -> Option<Self> {
        match value {
            PlainValue::List(items) => items.into_iter().map(T::from_plain).collect(),
            _ => None,
        }
    }
}

/// One entity-bearing field of a [`GraphEntity`](crate::entity::GraphEntity),
/// together with the entities it currently holds.
#[derive(Clone)]
pub enum EntityField {
    /// A field that directly holds at most one entity.
    Single(&'static str, Option<EntityHandle>),
    /// A field holding an ordered sequence of entities.
    List(&'static str, Vec<EntityHandle>),
    /// A field holding a keyed map of entities. Key order is the container's
    /// own insertion order.
    Dict(&'static str, Vec<(String, EntityHandle)>),
    /// A field holding an unordered collection of entities. Order is stable
    /// per process but not meaningful.
    Set(&'static str, Vec<EntityHandle>),
    /// A field holding a fixed-arity tuple of entities.
    Tuple(&'static str, Vec<EntityHandle>),
}

impl EntityField {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Single(name, _)
            | Self::List(name, _)
            | Self::Dict(name, _)
            | Self::Set(name, _)
            | Self::Tuple(name, _) => name,
        }
    }

    /// Yields every entity this field currently holds together with its
    /// container coordinate, in the container's natural iteration order.
    pub fn children(&self) -> Vec<(EntityHandle, Option<usize>, Option<String>)> {
        match self {
            Self::Single(_, Some(child)) => vec![(child.clone(), None, None)],
            Self::Single(_, None) => Vec::new(),
            Self::List(_, children) | Self::Tuple(_, children) => children
                .iter()
                .enumerate()
                .map(|(i, c)| (c.clone(), Some(i), None))
                .collect(),
            Self::Set(_, children) => children.iter().map(|c| (c.clone(), None, None)).collect(),
            Self::Dict(_, children) => children
                .iter()
                .map(|(k, c)| (c.clone(), None, Some(k.clone())))
                .collect(),
        }
    }
}

/// A plain (non-entity) value, used for the introspector's complement
/// operation and for diff stage 3's attribute comparison. Structural
/// equality on this type is exactly the "equality on primitives and on plain
/// containers" the diff engine relies on.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum PlainValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<PlainValue>),
    Map(IndexMap<String, PlainValue>),
}

/// Provenance of a field's value: `None` means "locally created". Otherwise
/// records which entity (or, per-element, which entities) supplied the
/// value; see `borrow_attribute_from` (§4.6).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum AttributeSource {
    None,
    Scalar(EcsId),
    List(Vec<EcsId>),
    Map(IndexMap<String, EcsId>),
}

impl Default for AttributeSource {
    fn default() -> Self {
        Self::None
    }
}
