//! An immutable, versioned entity graph store with structural diffing and
//! provenance-tracked execution.
//!
//! Application code models domain data as trees of typed records (entities)
//! rooted at a single root entity. This crate persists immutable snapshots
//! of each tree, detects structural and attribute-level changes between a
//! live tree and its last snapshot, and produces a new version only for the
//! sub-entities that actually changed.
//!
//! The crate is organized around the five components a versioned graph
//! store needs, leaves first: the [`field`] introspector resolves which
//! fields of an entity hold other entities; [`tree`] builds an
//! [`tree::EntityTree`] snapshot from a live object graph; [`diff`]
//! compares two snapshots; [`versioning`] re-stamps the changed
//! sub-entities; [`registry`] indexes snapshots by root, lineage, type and
//! member identity. [`lifecycle`] layers promote/detach/attach/borrow on
//! top of the registry's `version_entity`.

pub mod diff;
pub mod entity;
pub mod error;
pub mod event;
pub mod field;
pub mod lifecycle;
pub mod registry;
pub mod tree;
pub mod versioning;

#[cfg(any(test, feature = "testing"))]
pub mod test_support;

pub use entity::{clone_handle, EntityHandle, EntityKey, EntityMeta, GraphEntity};
pub use error::{GraphError, GraphResult};
pub use event::{EventSink, NoopEventSink, Operation, Outcome};
pub use field::{
    AsPlainValue, AttributeSource, EntityDict, EntityField, EntityList, EntitySet, EntityTuple,
    PlainValue,
};
pub use id::{EcsId, LineageId, LiveId};
pub use lifecycle::DetachPolicy;
pub use registry::Registry;
pub use tree::{build_tree, EdgeKind, EntityEdge, EntityTree};

mod id;
