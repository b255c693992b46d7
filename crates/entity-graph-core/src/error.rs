//! Error kinds surfaced by the core. Every operation either applies fully or
//! returns one of these and leaves the registry unmodified. See §7 of the
//! design: no error is caught and turned into a default value inside the
//! core.

use thiserror::Error;

use crate::id::EcsId;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    /// The tree builder discovered an entity reachable through two distinct
    /// parent chains. No partial tree is ever returned when this fires.
    #[error("cycle detected while building tree: entity {0} reachable from more than one parent")]
    CycleDetected(EcsId),

    /// An operation required a non-empty `root_ecs_id`/`root_live_id` and
    /// found an orphan instead.
    #[error("operation requires a non-orphan entity, but {0} has no root")]
    OrphanOperation(EcsId),

    /// `register_root`/`attach` received an entity whose `root_ecs_id` does
    /// not equal its own `ecs_id`.
    #[error("entity {0} is not a root (root_ecs_id does not equal ecs_id)")]
    NotARoot(EcsId),

    /// `register_tree` was called for a `root_ecs_id` that already has a
    /// stored snapshot.
    #[error("a snapshot already exists for root {0}")]
    DuplicateRegistration(EcsId),

    /// An index mapping pointed at a node absent from `nodes`. Always a bug
    /// in the core, never a caller mistake.
    #[error("internal invariant violation: index referenced missing entity {0}")]
    MissingEntity(EcsId),

    /// `borrow_attribute_from` named a field the entity does not declare.
    #[error("field '{0}' is not declared on this entity type")]
    FieldNotFound(String),

    /// Catch-all for post-condition failures, e.g. a non-empty modified set
    /// that does not contain the root, or a rebuilt tree that diverges from
    /// the in-place-updated one.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

pub type GraphResult<T> = Result<T, GraphError>;
