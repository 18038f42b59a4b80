//! Entity handles, the node table, and id allocation.
//!
//! An [`Entity`] is a `(id, revision)` pair. The `id` indexes the node table;
//! the `revision` invalidates handles that outlived a delete once the id is
//! recycled. Id `0` is reserved as the null entity.
//!
//! ## Node table
//! One [`Node`] per id ever handed out. A node points (non-owning) at the
//! archetype and row currently holding the entity, or at nothing once the
//! entity was deleted.
//!
//! ## Allocation
//! * Deleted ids go to a LIFO free list; their revision is bumped on free so
//!   every outstanding handle turns stale.
//! * [`EntityNodes::reserve`] hands out fresh ids through a shared `&self`
//!   using an atomic counter past the end of the node table. Reserved ids
//!   become real nodes on the next [`EntityNodes::flush_reserved`].

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

use crate::engine::types::{ArchetypeID, EntityID, Revision, RowID};

/// Handle to an entity inside one store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Entity {
    /// Index into the node table. `0` is null.
    pub id: EntityID,
    /// Revision the handle was issued with.
    pub revision: Revision,
}

impl Entity {
    /// The null handle.
    pub const NULL: Entity = Entity { id: 0, revision: 0 };

    /// Creates a handle from raw parts.
    #[inline]
    pub const fn new(id: EntityID, revision: Revision) -> Self {
        Self { id, revision }
    }

    /// Returns `true` when `id == 0`.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.id == 0
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.id, self.revision)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.id, self.revision)
    }
}

bitflags! {
    /// Auxiliary ownership recorded per node so deletes can skip lookups.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u8 {
        /// The entity owns at least one relation row.
        const RELATION_SOURCE = 1 << 0;
        /// At least one relation row links to this entity.
        const RELATION_TARGET = 1 << 1;
        /// At least one link component points at this entity.
        const LINK_TARGET = 1 << 2;
    }
}

/// Location of an entity: archetype and row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityLocation {
    /// Archetype holding the entity.
    pub archetype: ArchetypeID,
    /// Row inside that archetype.
    pub row: RowID,
}

/// One slot of the node table.
#[derive(Clone, Copy, Debug, Default)]
pub struct Node {
    /// Archetype currently holding the entity; `None` when unused.
    pub archetype: Option<ArchetypeID>,
    /// Row inside `archetype`.
    pub row: RowID,
    /// Current revision of the id.
    pub revision: Revision,
    /// Auxiliary ownership flags.
    pub flags: NodeFlags,
}

impl Node {
    /// Returns the location if the node is in use.
    #[inline]
    pub fn location(&self) -> Option<EntityLocation> {
        self.archetype.map(|archetype| EntityLocation { archetype, row: self.row })
    }
}

/// Node table plus free list and reservation counter.
pub struct EntityNodes {
    nodes: Vec<Node>,
    free_ids: Vec<EntityID>,
    reserved: AtomicU32,
    alive: usize,
}

impl EntityNodes {
    /// Creates a table with room for `capacity` ids. Slot `0` is reserved.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut nodes = Vec::with_capacity(capacity.max(1) + 1);
        nodes.push(Node::default());
        Self {
            nodes,
            free_ids: Vec::new(),
            reserved: AtomicU32::new(0),
            alive: 0,
        }
    }

    /// Number of live entities, not counting unflushed reservations.
    #[inline]
    pub fn alive(&self) -> usize {
        self.alive
    }

    /// Length of the node table including the null slot.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no id was ever handed out.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Number of recycled ids waiting for reuse.
    #[inline]
    pub fn free_len(&self) -> usize {
        self.free_ids.len()
    }

    /// Returns the node of a live entity whose revision matches the handle.
    #[inline]
    pub fn get(&self, entity: Entity) -> Option<&Node> {
        if entity.is_null() {
            return None;
        }
        self.nodes
            .get(entity.id as usize)
            .filter(|node| node.archetype.is_some() && node.revision == entity.revision)
    }

    /// Mutable node of a live handle.
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut Node> {
        if entity.is_null() {
            return None;
        }
        self.nodes
            .get_mut(entity.id as usize)
            .filter(|node| node.archetype.is_some() && node.revision == entity.revision)
    }

    /// Returns `true` if the handle refers to a live entity.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.get(entity).is_some()
    }

    /// Raw node access by id.
    #[inline]
    pub fn node(&self, id: EntityID) -> Option<&Node> {
        self.nodes.get(id as usize)
    }

    /// Raw mutable node access by id.
    #[inline]
    pub fn node_mut(&mut self, id: EntityID) -> Option<&mut Node> {
        self.nodes.get_mut(id as usize)
    }

    /// Current handle of a live id.
    #[inline]
    pub fn entity_of(&self, id: EntityID) -> Option<Entity> {
        self.nodes
            .get(id as usize)
            .filter(|node| node.archetype.is_some())
            .map(|node| Entity::new(id, node.revision))
    }

    /// Points node `id` at `(archetype, row)`.
    #[inline]
    pub fn set_location(&mut self, id: EntityID, archetype: ArchetypeID, row: RowID) {
        if let Some(node) = self.nodes.get_mut(id as usize) {
            node.archetype = Some(archetype);
            node.row = row;
        }
    }

    /// Allocates an id, reusing the free list first. The caller places the
    /// entity into an archetype right after.
    pub fn allocate(&mut self, archetype: ArchetypeID, row: RowID) -> Entity {
        debug_assert_eq!(self.reserved.load(Ordering::Relaxed), 0, "flush reservations before allocating");
        let id = match self.free_ids.pop() {
            Some(id) => id,
            None => {
                self.nodes.push(Node::default());
                (self.nodes.len() - 1) as EntityID
            }
        };
        let node = &mut self.nodes[id as usize];
        node.archetype = Some(archetype);
        node.row = row;
        node.flags = NodeFlags::empty();
        self.alive += 1;
        Entity::new(id, node.revision)
    }

    /// Reserves a fresh id without exclusive access.
    pub fn reserve(&self) -> Entity {
        let offset = self.reserved.fetch_add(1, Ordering::Relaxed);
        Entity::new(self.nodes.len() as EntityID + offset, 0)
    }

    /// Materializes every reserved id, returning them in reservation order.
    /// Each new node is placed at `archetype` starting at row `first_row`.
    pub fn flush_reserved(&mut self, archetype: ArchetypeID, first_row: RowID) -> Vec<Entity> {
        let count = std::mem::replace(self.reserved.get_mut(), 0);
        let mut created = Vec::with_capacity(count as usize);
        for offset in 0..count {
            let id = self.nodes.len() as EntityID;
            self.nodes.push(Node {
                archetype: Some(archetype),
                row: first_row + offset,
                revision: 0,
                flags: NodeFlags::empty(),
            });
            created.push(Entity::new(id, 0));
        }
        self.alive += created.len();
        created
    }

    /// Number of reservations not yet flushed.
    #[inline]
    pub fn pending_reservations(&self) -> u32 {
        self.reserved.load(Ordering::Relaxed)
    }

    /// Releases a live id: clears its location, bumps the revision and pushes
    /// it onto the free list.
    pub fn free(&mut self, id: EntityID) {
        if let Some(node) = self.nodes.get_mut(id as usize) {
            if node.archetype.take().is_some() {
                node.revision = node.revision.wrapping_add(1);
                node.row = 0;
                node.flags = NodeFlags::empty();
                self.free_ids.push(id);
                self.alive -= 1;
            }
        }
    }

    /// Iterates over the handles of all live entities in id order.
    pub fn iter_alive(&self) -> impl Iterator<Item = Entity> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, node)| node.archetype.is_some())
            .map(|(id, node)| Entity::new(id as EntityID, node.revision))
    }
}
