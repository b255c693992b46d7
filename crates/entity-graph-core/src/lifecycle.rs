//! Entity lifecycle transitions (§4.6): operations that move an entity
//! across trees or copy an attribute between entities. Each ends by calling
//! into the versioning engine through the [`Registry`] it is handed.

use std::time::Instant;

use tracing::instrument;

use crate::entity::EntityHandle;
use crate::error::{GraphError, GraphResult};
use crate::event::{Operation, Outcome};
use crate::field::{AttributeSource, EntityField};
use crate::registry::Registry;
use crate::tree::build_tree;

fn emit<T>(registry: &Registry, op: Operation, subject: crate::id::EcsId, start: Instant, result: &GraphResult<T>)
where
    T: OutcomeHint,
{
    let outcome = match result {
        Ok(value) => value.outcome_hint(),
        Err(_) => Outcome::Failed,
    };
    registry.sink().on_completed(op, subject, start.elapsed(), outcome);
}

/// Lets `emit` report `NoChange` for lifecycle ops that return `bool`
/// (mirroring `version_entity`'s own outcome reporting) while still
/// reporting `Applied` for ops that return `()`.
trait OutcomeHint {
    fn outcome_hint(&self) -> Outcome;
}

impl OutcomeHint for bool {
    fn outcome_hint(&self) -> Outcome {
        if *self {
            Outcome::Applied
        } else {
            Outcome::NoChange
        }
    }
}

impl OutcomeHint for () {
    fn outcome_hint(&self) -> Outcome {
        Outcome::Applied
    }
}

/// Promotes `entity` to be the root of its own tree (§4.6).
///
/// - Orphan: points its root refs at itself, then registers.
/// - Attached to a different root: re-stamps its identity first (the old
///   version stays reachable through `old_ids`), then points root refs at
///   itself, then registers.
/// - Already root: idempotent. Calling `version_entity` does not mint a
///   new `ecs_id` unless something besides the promotion itself changed.
#[instrument(skip(registry, entity))]
pub fn promote_to_root(registry: &Registry, entity: &EntityHandle) -> GraphResult<bool> {
    let subject = entity.borrow().meta().ecs_id;
    let start = Instant::now();
    registry.sink().on_start(Operation::PromoteToRoot, subject);

    let result = (|| {
        let is_orphan = entity.borrow().meta().is_orphan();
        let is_root = entity.borrow().meta().is_root();

        if is_orphan {
            let ecs_id = entity.borrow().meta().ecs_id;
            let live_id = entity.borrow().meta().live_id;
            let mut e = entity.borrow_mut();
            e.meta_mut().root_ecs_id = Some(ecs_id);
            e.meta_mut().root_live_id = Some(live_id);
        } else if !is_root {
            let mut e = entity.borrow_mut();
            e.meta_mut().restamp_ecs_id();
            let ecs_id = e.meta().ecs_id;
            let live_id = e.meta().live_id;
            e.meta_mut().root_ecs_id = Some(ecs_id);
            e.meta_mut().root_live_id = Some(live_id);
        }

        registry.version_entity(Some(entity), false)
    })();

    emit(registry, Operation::PromoteToRoot, subject, start, &result);
    result
}

/// Detaches `entity` from whatever tree it used to belong to (§4.6). The
/// caller must have already removed `entity` from its former parent's
/// field; this only updates bookkeeping and re-versions.
///
/// Policy (resolving §9's open question, see `DetachPolicy`): the former
/// root is versioned if it is still reachable live; otherwise `entity` is
/// promoted to root instead of silently doing nothing.
#[instrument(skip(registry, entity))]
pub fn detach(registry: &Registry, entity: &EntityHandle) -> GraphResult<bool> {
    let subject = entity.borrow().meta().ecs_id;
    let start = Instant::now();
    registry.sink().on_start(Operation::Detach, subject);

    let result = (|| {
        if entity.borrow().meta().is_root() {
            return registry.version_entity(Some(entity), false);
        }

        if entity.borrow().meta().is_orphan() {
            return promote_to_root(registry, entity);
        }

        match registry.get_live_root_from_entity(entity) {
            Some(former_root) => registry.version_entity(Some(&former_root), false),
            None => promote_to_root(registry, entity),
        }
    })();

    emit(registry, Operation::Detach, subject, start, &result);
    result
}

/// The only implemented detach policy (§9 open question 1): version the
/// former root if it is reachable live, otherwise promote. The enum exists
/// so a caller-selectable alternative can be added later without breaking
/// the `detach` signature.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum DetachPolicy {
    #[default]
    VersionFormerRoot,
}

/// Moves `entity`, which must currently be a root, under `new_root` (§4.6).
/// The caller must have already performed the physical attachment (`entity`
/// must already be reachable by traversing `new_root`'s live fields) before
/// calling this.
///
/// Versions the old root first (if still reachable live, recording the
/// departure) and the new root second (recording the arrival), per
/// SPEC_FULL's resolution of the ordering left open by spec.md.
#[instrument(skip(registry, entity, new_root))]
pub fn attach(registry: &Registry, entity: &EntityHandle, new_root: &EntityHandle) -> GraphResult<bool> {
    let subject = entity.borrow().meta().ecs_id;
    let start = Instant::now();
    registry.sink().on_start(Operation::Attach, subject);

    let result = (|| {
        if !entity.borrow().meta().is_root() {
            return Err(GraphError::NotARoot(entity.borrow().meta().ecs_id));
        }
        if !new_root.borrow().meta().is_root() {
            return Err(GraphError::NotARoot(new_root.borrow().meta().ecs_id));
        }

        let new_root_ecs_id = new_root.borrow().meta().ecs_id;
        if entity.borrow().meta().root_ecs_id == Some(new_root_ecs_id) {
            return registry.version_entity(Some(new_root), false);
        }

        let pre_attach_ecs_id = entity.borrow().meta().ecs_id;
        let probe = build_tree(new_root)?;
        if !probe.nodes.contains_key(&pre_attach_ecs_id) {
            return Err(GraphError::InvariantViolation(format!(
                "attach: entity {pre_attach_ecs_id} is not reachable from new root {new_root_ecs_id}; \
                 the physical attachment must happen before calling attach"
            )));
        }

        let entity_live_id = entity.borrow().meta().live_id;
        let old_root_live = registry.get_live_root_from_entity(entity);

        {
            let new_root_live_id = new_root.borrow().meta().live_id;
            let new_lineage = new_root.borrow().meta().lineage_id;
            let mut e = entity.borrow_mut();
            e.meta_mut().restamp_ecs_id();
            e.meta_mut().root_ecs_id = Some(new_root_ecs_id);
            e.meta_mut().root_live_id = Some(new_root_live_id);
            e.meta_mut().lineage_id = new_lineage;
        }

        // If the old root was `entity` itself (it was a singleton root
        // before this move), there is nothing left behind to re-version.
        if let Some(old_root) = old_root_live {
            if old_root.borrow().meta().live_id != entity_live_id {
                registry.version_entity(Some(&old_root), false)?;
            }
        }

        registry.version_entity(Some(new_root), false)
    })();

    emit(registry, Operation::Attach, subject, start, &result);
    result
}

/// Copies `source.source_field` into `target.target_field` (§4.6).
///
/// Plain-data values are deep-copied (they already are, since
/// `plain_fields`/`set_plain_field` move owned [`PlainValue`]s). Entity
/// references are assigned by reference: the same handle(s) are threaded
/// into `target`'s field, no cloning. `target.attribute_source` is updated
/// to record provenance.
#[instrument(skip(registry, target, source))]
pub fn borrow_attribute_from(
    registry: &Registry,
    target: &EntityHandle,
    source: &EntityHandle,
    source_field: &str,
    target_field: &str,
) -> GraphResult<()> {
    let subject = target.borrow().meta().ecs_id;
    let start = Instant::now();
    registry.sink().on_start(Operation::BorrowAttributeFrom, subject);

    let result = (|| {
        let source_ecs_id = source.borrow().meta().ecs_id;

        let plain_value = source
            .borrow()
            .plain_fields()
            .into_iter()
            .find(|(name, _)| *name == source_field)
            .map(|(_, value)| value);

        if let Some(value) = plain_value {
            target.borrow_mut().set_plain_field(target_field, value)?;
            target
                .borrow_mut()
                .meta_mut()
                .attribute_source
                .insert(target_field.to_string(), AttributeSource::Scalar(source_ecs_id));
            return Ok(());
        }

        let entity_field = source
            .borrow()
            .entity_fields()
            .into_iter()
            .find(|field| field.name() == source_field);

        let Some(field) = entity_field else {
            return Err(GraphError::FieldNotFound(source_field.to_string()));
        };

        let provenance = match &field {
            EntityField::Single(..) => AttributeSource::Scalar(source_ecs_id),
            EntityField::List(_, children) | EntityField::Tuple(_, children) | EntityField::Set(_, children) => {
                AttributeSource::List(vec![source_ecs_id; children.len()])
            }
            EntityField::Dict(_, children) => AttributeSource::Map(
                children
                    .iter()
                    .map(|(key, _)| (key.clone(), source_ecs_id))
                    .collect(),
            ),
        };

        target.borrow_mut().set_entity_field(target_field, field)?;
        target
            .borrow_mut()
            .meta_mut()
            .attribute_source
            .insert(target_field.to_string(), provenance);
        Ok(())
    })();

    emit(registry, Operation::BorrowAttributeFrom, subject, start, &result);
    result
}
