//! # Archetypes
//!
//! An [`Archetype`] stores every entity sharing one exact [`Signature`]:
//! one dense column per component type in the signature, plus a parallel
//! `row -> entity` array.
//!
//! ## Design
//! - Component data is stored column-major by component type.
//! - Rows are densely packed using swap-remove; there are no tombstones.
//! - Moving a row to another archetype is split in three phases over the
//!   component bits: *shared* columns move their value across,
//!   *destination-only* columns receive the caller's new value,
//!   *source-only* columns drop (or hand back) the old value.
//!
//! ## Invariants
//! - Every column has exactly `len()` rows.
//! - `columns[c]` is `Some` iff bit `c` is set in `signature.components`.
//! - For every row `r`, the node of `entities[r]` points back at
//!   `(self.id(), r)`. The store patches nodes from the [`RowMove`] and
//!   [`RowRemoval`] reports returned here.

use std::any::Any;

use crate::engine::component::{Component, Schema};
use crate::engine::entity::Entity;
use crate::engine::error::{ColumnError, StoreError, StoreResult};
use crate::engine::storage::{BoxedValue, Column, TypeErasedColumn};
use crate::engine::types::{ArchetypeID, ComponentBits, ComponentID, RowID, Signature};

/// Outcome of moving one row into another archetype.
#[derive(Debug)]
pub struct RowMove {
    /// Row the entity now occupies in the destination.
    pub destination_row: RowID,
    /// Entity swapped into the vacated source row, if any.
    pub swapped: Option<Entity>,
    /// Values of source-only components, when requested.
    pub removed: Vec<(ComponentID, BoxedValue)>,
}

/// Outcome of removing one row.
#[derive(Debug)]
pub struct RowRemoval {
    /// Entity swapped into the vacated row, if any.
    pub swapped: Option<Entity>,
    /// Values of every column at the removed row, when requested.
    pub removed: Vec<(ComponentID, BoxedValue)>,
}

/// Table of entities sharing one signature.
pub struct Archetype {
    id: ArchetypeID,
    signature: Signature,
    columns: Vec<Option<Box<dyn TypeErasedColumn>>>,
    entities: Vec<Entity>,
    lanes: usize,
}

impl Archetype {
    /// Creates an empty archetype with one column per component bit.
    pub fn new(id: ArchetypeID, signature: Signature, schema: &Schema) -> StoreResult<Self> {
        let mut columns: Vec<Option<Box<dyn TypeErasedColumn>>> =
            (0..schema.component_count()).map(|_| None).collect();
        let mut lanes = 1;
        for component_id in signature.components.iter() {
            let desc = schema
                .component(component_id)
                .ok_or(StoreError::Internal("signature references unknown component"))?;
            columns[component_id as usize] = Some(desc.new_column());
            lanes = crate::engine::types::lcm(lanes, desc.lanes);
        }
        Ok(Self { id, signature, columns, entities: Vec::new(), lanes })
    }

    /// Creates the archetype without components or tags.
    pub(crate) fn empty(id: ArchetypeID, schema: &Schema) -> Self {
        Self {
            id,
            signature: Signature::empty(),
            columns: (0..schema.component_count()).map(|_| None).collect(),
            entities: Vec::new(),
            lanes: 1,
        }
    }

    /// Archetype id.
    #[inline]
    pub fn id(&self) -> ArchetypeID {
        self.id
    }

    /// Signature identifying this archetype.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the archetype holds no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in row order.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Least common multiple of the SIMD lane grouping of all columns.
    #[inline]
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// Returns `true` if the archetype stores component `component_id`.
    #[inline]
    pub fn has(&self, component_id: ComponentID) -> bool {
        self.signature.components.has(component_id)
    }

    /// Type-erased column for `component_id`.
    #[inline]
    pub fn column_dyn(&self, component_id: ComponentID) -> Option<&dyn TypeErasedColumn> {
        self.columns.get(component_id as usize)?.as_deref()
    }

    /// Mutable type-erased column for `component_id`.
    #[inline]
    pub fn column_dyn_mut(&mut self, component_id: ComponentID) -> Option<&mut (dyn TypeErasedColumn + 'static)> {
        self.columns.get_mut(component_id as usize)?.as_deref_mut()
    }

    /// Typed slice over all rows of component `T`.
    pub fn column<T: Component>(&self, component_id: ComponentID) -> Option<&[T]> {
        self.column_dyn(component_id)?
            .as_any()
            .downcast_ref::<Column<T>>()
            .map(Column::as_slice)
    }

    /// Mutable typed slice over all rows of component `T`.
    pub fn column_mut<T: Component>(&mut self, component_id: ComponentID) -> Option<&mut [T]> {
        self.column_dyn_mut(component_id)?
            .as_any_mut()
            .downcast_mut::<Column<T>>()
            .map(Column::as_mut_slice)
    }

    /// Disjoint mutable columns for distinct `ids`, in the order requested.
    ///
    /// Returns `None` if an id is missing or listed twice.
    pub fn columns_mut(&mut self, ids: &[ComponentID]) -> Option<Vec<&mut Box<dyn TypeErasedColumn>>> {
        self.entities_and_columns_mut(ids).map(|(_, columns)| columns)
    }

    /// Entity array together with disjoint mutable columns for `ids`.
    pub fn entities_and_columns_mut(
        &mut self,
        ids: &[ComponentID],
    ) -> Option<(&[Entity], Vec<&mut Box<dyn TypeErasedColumn>>)> {
        let mut slots: Vec<Option<&mut Box<dyn TypeErasedColumn>>> = (0..ids.len()).map(|_| None).collect();
        for (component_id, column) in self.columns.iter_mut().enumerate() {
            let Some(column) = column.as_mut() else { continue };
            if let Some(position) = ids.iter().position(|&id| id as usize == component_id) {
                slots[position] = Some(column);
            }
        }
        let columns = slots.into_iter().collect::<Option<Vec<_>>>()?;
        Some((&self.entities, columns))
    }

    /// Borrows the value of `component_id` at `row`.
    pub fn get_any(&self, component_id: ComponentID, row: RowID) -> Option<&dyn Any> {
        self.column_dyn(component_id)?.get_any(row)
    }

    /// Typed value of `component_id` at `row`.
    pub fn get<T: Component>(&self, component_id: ComponentID, row: RowID) -> Option<&T> {
        self.column::<T>(component_id)?.get(row as usize)
    }

    /// Mutable typed value of `component_id` at `row`.
    pub fn get_mut<T: Component>(&mut self, component_id: ComponentID, row: RowID) -> Option<&mut T> {
        self.column_mut::<T>(component_id)?.get_mut(row as usize)
    }

    /// Overwrites the value of `component_id` at `row`, returning the old value.
    pub fn replace_value(&mut self, component_id: ComponentID, row: RowID, value: BoxedValue) -> StoreResult<BoxedValue> {
        let column = self
            .column_dyn_mut(component_id)
            .ok_or(StoreError::Internal("replace on absent column"))?;
        Ok(column.replace_dyn(row, value)?)
    }

    /// Appends a row for `entity`. `values` must cover every column.
    pub fn push_row(&mut self, entity: Entity, mut values: Vec<(ComponentID, BoxedValue)>) -> StoreResult<RowID> {
        if values.len() != self.signature.components.count() {
            return Err(StoreError::Internal("row values do not match archetype columns"));
        }
        values.sort_unstable_by_key(|(id, _)| *id);
        if values.iter().any(|(id, _)| !self.has(*id)) {
            return Err(StoreError::Internal("row values do not match archetype columns"));
        }
        for (component_id, value) in values {
            if let Some(column) = self.column_dyn_mut(component_id) {
                column.push_dyn(value)?;
            }
        }
        self.entities.push(entity);
        Ok((self.entities.len() - 1) as RowID)
    }

    /// Appends `entities.len()` rows whose values are clones of `values`.
    ///
    /// ## Returns
    /// The first new row.
    pub fn extend_cloned(&mut self, entities: &[Entity], values: &[(ComponentID, &dyn Any)]) -> StoreResult<RowID> {
        if values.len() != self.signature.components.count() || values.iter().any(|(id, _)| !self.has(*id)) {
            return Err(StoreError::Internal("bundle values do not match archetype columns"));
        }
        let first = self.entities.len() as RowID;
        for &(component_id, value) in values {
            if let Some(column) = self.column_dyn_mut(component_id) {
                column.extend_cloned_dyn(value, entities.len())?;
            }
        }
        self.entities.extend_from_slice(entities);
        Ok(first)
    }

    /// Appends rows for entities of an archetype without components.
    pub fn extend_empty(&mut self, entities: &[Entity]) -> StoreResult<RowID> {
        self.extend_cloned(entities, &[])
    }

    /// Removes `row` via swap-with-last.
    ///
    /// When `capture` is set, the removed values are handed back instead of
    /// being dropped.
    pub fn swap_remove_row(&mut self, row: RowID, capture: bool) -> StoreResult<RowRemoval> {
        let len = self.entities.len();
        if row as usize >= len {
            return Err(ColumnError::RowOutOfBounds { row, len }.into());
        }
        let mut removed = Vec::new();
        for (component_id, column) in self.columns.iter_mut().enumerate() {
            let Some(column) = column.as_deref_mut() else { continue };
            if capture {
                removed.push((component_id as ComponentID, column.swap_remove_dyn(row)?));
            } else {
                column.drop_row(row)?;
            }
        }
        self.entities.swap_remove(row as usize);
        let swapped = self.entities.get(row as usize).copied();
        Ok(RowRemoval { swapped, removed })
    }

    /// Moves `row` into `destination`.
    ///
    /// ## Phases
    /// 1. Shared columns: value moved across (swap-remove in `self`).
    /// 2. Destination-only columns: value taken from `added`.
    /// 3. Source-only columns: value dropped, or handed back when `capture`.
    ///
    /// `added` must hold exactly one value per destination-only column; this
    /// is checked before any column is touched.
    pub fn move_row_to_archetype(
        &mut self,
        destination: &mut Archetype,
        row: RowID,
        mut added: Vec<(ComponentID, BoxedValue)>,
        capture: bool,
    ) -> StoreResult<RowMove> {
        let len = self.entities.len();
        if row as usize >= len {
            return Err(ColumnError::RowOutOfBounds { row, len }.into());
        }
        let source_bits = self.signature.components;
        let destination_bits = destination.signature.components;
        let shared: ComponentBits = source_bits.intersection(&destination_bits);
        let source_only: ComponentBits = source_bits.difference(&destination_bits);
        let destination_only: ComponentBits = destination_bits.difference(&source_bits);

        let mut destination_only_values: Vec<(ComponentID, BoxedValue)> =
            Vec::with_capacity(destination_only.count());
        for need_id in destination_only.iter() {
            match added.iter().position(|(id, _)| *id == need_id) {
                Some(position) => destination_only_values.push(added.swap_remove(position)),
                None => return Err(StoreError::Internal("missing value for added component")),
            }
        }
        if !added.is_empty() {
            return Err(StoreError::Internal("value supplied for component not added by move"));
        }

        for component_id in shared.iter() {
            let (Some(Some(source)), Some(Some(target))) = (
                self.columns.get_mut(component_id as usize),
                destination.columns.get_mut(component_id as usize),
            ) else {
                return Err(StoreError::Internal("shared column missing"));
            };
            target.push_from_dyn(&mut **source, row)?;
        }

        for (component_id, value) in destination_only_values {
            if let Some(column) = destination.column_dyn_mut(component_id) {
                column.push_dyn(value)?;
            }
        }

        let mut removed = Vec::new();
        for component_id in source_only.iter() {
            if let Some(column) = self.column_dyn_mut(component_id) {
                if capture {
                    removed.push((component_id, column.swap_remove_dyn(row)?));
                } else {
                    column.drop_row(row)?;
                }
            }
        }

        let entity = self.entities.swap_remove(row as usize);
        let swapped = self.entities.get(row as usize).copied();
        destination.entities.push(entity);
        let destination_row = (destination.entities.len() - 1) as RowID;

        Ok(RowMove { destination_row, swapped, removed })
    }

    /// Returns the entity at `row`.
    #[inline]
    pub fn entity_at(&self, row: RowID) -> Option<Entity> {
        self.entities.get(row as usize).copied()
    }

    /// Debug check that every column has `len()` rows.
    pub fn is_consistent(&self) -> bool {
        self.columns
            .iter()
            .flatten()
            .all(|column| column.len() == self.entities.len())
    }
}
