//! Change notification hooks.
//!
//! Subscribers are plain closures registered on a store. They are invoked
//! synchronously from the operation that caused the change, after the
//! storage is consistent again.
//!
//! ## Ordering
//! For one entity, command-buffer playback fires tag changes first, then
//! component removals, then component additions and updates. Within a phase,
//! events follow ascending id order of the relevant bitset.

use std::any::Any;

use crate::engine::entity::Entity;
use crate::engine::types::{ComponentID, TagBits};

/// Kind of component change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentAction {
    /// The entity did not carry the component before.
    Add,
    /// The entity carried the component and its value was replaced.
    Update,
    /// The component was removed from the entity.
    Remove,
}

/// A component was added, updated or removed.
pub struct ComponentChanged<'a> {
    /// Affected entity.
    pub entity: Entity,
    /// Component id.
    pub component: ComponentID,
    /// What happened.
    pub action: ComponentAction,
    /// Previous value, present for `Update` and `Remove`.
    pub old_value: Option<&'a dyn Any>,
}

impl ComponentChanged<'_> {
    /// Previous value downcast to `T`.
    pub fn old<T: 'static>(&self) -> Option<&T> {
        self.old_value?.downcast_ref::<T>()
    }
}

/// Tags were added to and/or removed from an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagsChanged {
    /// Affected entity.
    pub entity: Entity,
    /// Tags that became present.
    pub added: TagBits,
    /// Tags that became absent.
    pub removed: TagBits,
}

/// Handle returned by a subscription, usable to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ComponentListener = Box<dyn FnMut(&ComponentChanged<'_>) + Send + Sync>;
type TagListener = Box<dyn FnMut(&TagsChanged) + Send + Sync>;
type EntityListener = Box<dyn FnMut(Entity) + Send + Sync>;

/// Registered subscribers of one store.
#[derive(Default)]
pub struct EventHub {
    next_id: u64,
    component: Vec<(SubscriptionId, ComponentListener)>,
    tags: Vec<(SubscriptionId, TagListener)>,
    created: Vec<(SubscriptionId, EntityListener)>,
    deleted: Vec<(SubscriptionId, EntityListener)>,
}

impl EventHub {
    fn next(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    pub(crate) fn on_component_changed(&mut self, f: impl FnMut(&ComponentChanged<'_>) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next();
        self.component.push((id, Box::new(f)));
        id
    }

    pub(crate) fn on_tags_changed(&mut self, f: impl FnMut(&TagsChanged) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next();
        self.tags.push((id, Box::new(f)));
        id
    }

    pub(crate) fn on_entity_created(&mut self, f: impl FnMut(Entity) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next();
        self.created.push((id, Box::new(f)));
        id
    }

    pub(crate) fn on_entity_deleted(&mut self, f: impl FnMut(Entity) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next();
        self.deleted.push((id, Box::new(f)));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.len();
        self.component.retain(|(sub, _)| *sub != id);
        self.tags.retain(|(sub, _)| *sub != id);
        self.created.retain(|(sub, _)| *sub != id);
        self.deleted.retain(|(sub, _)| *sub != id);
        self.len() != before
    }

    fn len(&self) -> usize {
        self.component.len() + self.tags.len() + self.created.len() + self.deleted.len()
    }

    /// Returns `true` if anyone listens for component changes.
    #[inline]
    pub(crate) fn wants_components(&self) -> bool {
        !self.component.is_empty()
    }

    #[inline]
    pub(crate) fn wants_tags(&self) -> bool {
        !self.tags.is_empty()
    }

    pub(crate) fn component_changed(&mut self, event: &ComponentChanged<'_>) {
        for (_, listener) in &mut self.component {
            listener(event);
        }
    }

    pub(crate) fn tags_changed(&mut self, event: &TagsChanged) {
        for (_, listener) in &mut self.tags {
            listener(event);
        }
    }

    pub(crate) fn entity_created(&mut self, entity: Entity) {
        for (_, listener) in &mut self.created {
            listener(entity);
        }
    }

    pub(crate) fn entity_deleted(&mut self, entity: Entity) {
        for (_, listener) in &mut self.deleted {
            listener(entity);
        }
    }
}
