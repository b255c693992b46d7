//! Hand-written stand-ins for `#[derive(GraphEntity)]` output, used only by
//! this crate's own test modules. A real consumer would never implement
//! [`GraphEntity`] by hand like this; it exists here so the tree builder,
//! diff engine, versioning engine and registry can be exercised without
//! depending on `entity-graph-macros` (which depends back on this crate).

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::entity::{clone_handle, EntityHandle, EntityMeta, GraphEntity};
use crate::error::{GraphError, GraphResult};
use crate::field::{EntityField, PlainValue};

#[derive(Debug)]
pub struct RootEntity {
    pub meta: EntityMeta,
    pub name: String,
    pub untyped_data: String,
    pub child: Option<EntityHandle>,
    pub children: Vec<EntityHandle>,
    pub branch_a: Option<EntityHandle>,
    pub branch_b: Option<EntityHandle>,
}

impl RootEntity {
    #[must_use]
    pub fn new_handle(name: &str) -> EntityHandle {
        let entity = Self {
            meta: EntityMeta::new(),
            name: name.to_string(),
            untyped_data: String::new(),
            child: None,
            children: Vec::new(),
            branch_a: None,
            branch_b: None,
        };
        Rc::new(RefCell::new(entity))
    }

    pub fn attach_child(root: &EntityHandle, child: EntityHandle) {
        let mut entity = root.borrow_mut();
        let root = entity.as_any_mut().downcast_mut::<Self>().unwrap();
        root.child = Some(child);
    }

    pub fn push_list_child(root: &EntityHandle, child: EntityHandle) {
        let mut entity = root.borrow_mut();
        let root = entity.as_any_mut().downcast_mut::<Self>().unwrap();
        root.children.push(child);
    }

    pub fn attach_branch_a(root: &EntityHandle, branch: EntityHandle) {
        let mut entity = root.borrow_mut();
        let root = entity.as_any_mut().downcast_mut::<Self>().unwrap();
        root.branch_a = Some(branch);
    }

    pub fn attach_branch_b(root: &EntityHandle, branch: EntityHandle) {
        let mut entity = root.borrow_mut();
        let root = entity.as_any_mut().downcast_mut::<Self>().unwrap();
        root.branch_b = Some(branch);
    }
}

#[derive(Debug)]
pub struct ChildEntity {
    pub meta: EntityMeta,
    pub name: String,
    pub untyped_data: String,
    pub leaf: Option<EntityHandle>,
    pub back: Option<EntityHandle>,
}

impl ChildEntity {
    #[must_use]
    pub fn new_handle(name: &str) -> EntityHandle {
        let entity = Self {
            meta: EntityMeta::new(),
            name: name.to_string(),
            untyped_data: String::new(),
            leaf: None,
            back: None,
        };
        Rc::new(RefCell::new(entity))
    }

    pub fn attach_leaf(parent: &EntityHandle, leaf: EntityHandle) {
        let mut entity = parent.borrow_mut();
        let parent = entity.as_any_mut().downcast_mut::<Self>().unwrap();
        parent.leaf = Some(leaf);
    }

    /// Test-only: physically removes whatever leaf `parent` currently holds,
    /// modelling the caller-side detach step a real move between two
    /// branches requires before the registry side of it runs.
    pub fn clear_leaf(parent: &EntityHandle) {
        let mut entity = parent.borrow_mut();
        let parent = entity.as_any_mut().downcast_mut::<Self>().unwrap();
        parent.leaf = None;
    }

    /// Test-only: wires a back edge so the tree builder observes a cycle.
    pub fn attach_back_edge(child: &EntityHandle, target: EntityHandle) {
        let mut entity = child.borrow_mut();
        let child = entity.as_any_mut().downcast_mut::<Self>().unwrap();
        child.back = Some(target);
    }

    pub fn set_untyped_data(handle: &EntityHandle, value: &str) {
        let mut entity = handle.borrow_mut();
        let child = entity.as_any_mut().downcast_mut::<Self>().unwrap();
        child.untyped_data = value.to_string();
    }
}

pub fn set_untyped_data(handle: &EntityHandle, value: &str) {
    let mut entity = handle.borrow_mut();
    if let Some(root) = entity.as_any_mut().downcast_mut::<RootEntity>() {
        root.untyped_data = value.to_string();
        return;
    }
    drop(entity);
    ChildEntity::set_untyped_data(handle, value);
}

macro_rules! fields_common {
    ($self:ident) => {
        fn as_any(&$self) -> &dyn Any {
            $self
        }

        fn as_any_mut(&mut $self) -> &mut dyn Any {
            $self
        }
    };
}

impl GraphEntity for RootEntity {
    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn entity_type(&self) -> &'static str {
        "RootEntity"
    }

    fn entity_fields(&self) -> Vec<EntityField> {
        vec![
            EntityField::Single("child", self.child.clone()),
            EntityField::Single("branch_a", self.branch_a.clone()),
            EntityField::Single("branch_b", self.branch_b.clone()),
            EntityField::List("children", self.children.clone()),
        ]
    }

    fn plain_fields(&self) -> Vec<(&'static str, PlainValue)> {
        vec![
            ("name", PlainValue::Text(self.name.clone())),
            ("untyped_data", PlainValue::Text(self.untyped_data.clone())),
        ]
    }

    fn clone_node(&self) -> Box<dyn GraphEntity> {
        Box::new(Self {
            meta: self.meta.clone(),
            name: self.name.clone(),
            untyped_data: self.untyped_data.clone(),
            child: self.child.as_ref().map(clone_handle),
            children: self.children.iter().map(clone_handle).collect(),
            branch_a: self.branch_a.as_ref().map(clone_handle),
            branch_b: self.branch_b.as_ref().map(clone_handle),
        })
    }

    fn set_plain_field(&mut self, name: &str, value: PlainValue) -> GraphResult<()> {
        match (name, value) {
            ("name", PlainValue::Text(v)) => self.name = v,
            ("untyped_data", PlainValue::Text(v)) => self.untyped_data = v,
            _ => return Err(GraphError::FieldNotFound(name.to_string())),
        }
        Ok(())
    }

    fn set_entity_field(&mut self, name: &str, field: EntityField) -> GraphResult<()> {
        match (name, field) {
            ("child", EntityField::Single(_, v)) => self.child = v,
            ("branch_a", EntityField::Single(_, v)) => self.branch_a = v,
            ("branch_b", EntityField::Single(_, v)) => self.branch_b = v,
            ("children", EntityField::List(_, v)) => self.children = v,
            (other, _) => return Err(GraphError::FieldNotFound(other.to_string())),
        }
        Ok(())
    }

    fields_common!(self);
}

impl GraphEntity for ChildEntity {
    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn entity_type(&self) -> &'static str {
        "ChildEntity"
    }

    fn entity_fields(&self) -> Vec<EntityField> {
        vec![
            EntityField::Single("leaf", self.leaf.clone()),
            EntityField::Single("back", self.back.clone()),
        ]
    }

    fn plain_fields(&self) -> Vec<(&'static str, PlainValue)> {
        vec![
            ("name", PlainValue::Text(self.name.clone())),
            ("untyped_data", PlainValue::Text(self.untyped_data.clone())),
        ]
    }

    fn clone_node(&self) -> Box<dyn GraphEntity> {
        Box::new(Self {
            meta: self.meta.clone(),
            name: self.name.clone(),
            untyped_data: self.untyped_data.clone(),
            leaf: self.leaf.as_ref().map(clone_handle),
            back: self.back.as_ref().map(clone_handle),
        })
    }

    fn set_plain_field(&mut self, name: &str, value: PlainValue) -> GraphResult<()> {
        match (name, value) {
            ("name", PlainValue::Text(v)) => self.name = v,
            ("untyped_data", PlainValue::Text(v)) => self.untyped_data = v,
            _ => return Err(GraphError::FieldNotFound(name.to_string())),
        }
        Ok(())
    }

    fn set_entity_field(&mut self, name: &str, field: EntityField) -> GraphResult<()> {
        match (name, field) {
            ("leaf", EntityField::Single(_, v)) => self.leaf = v,
            ("back", EntityField::Single(_, v)) => self.back = v,
            (other, _) => return Err(GraphError::FieldNotFound(other.to_string())),
        }
        Ok(())
    }

    fields_common!(self);
}
