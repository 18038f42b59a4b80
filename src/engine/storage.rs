//! Dense component columns and their type-erased interface.
//!
//! This module implements [`Column<T>`], the growable array holding every
//! value of one component type inside one archetype, and
//! [`TypeErasedColumn`], the object-safe view archetypes use to manage
//! heterogeneous columns behind `Box<dyn TypeErasedColumn>`.
//!
//! # Storage model
//!
//! A column is a plain `Vec<T>`. Row `r` of the owning archetype is element
//! `r` of every column. Values are packed from row 0 upward with no gaps.
//!
//! # Core operations
//!
//! - **Append**: `push` writes a new last row.
//! - **Remove**: `swap_remove` deletes a row in `O(1)` by moving the last row
//!   into the vacated slot (unless the removed row already was last).
//! - **Transfer**: `push_from` moves a row from one column into another of the
//!   same element type, swap-removing it in the source.
//!
//! None of these preserve element order; archetypes track the displaced row
//! and patch the owning entity's node.
//!
//! # Type erasure
//!
//! [`TypeErasedColumn`] exposes the element [`TypeId`] and type name,
//! downcasting hooks, and `*_dyn` mutators that take `Box<dyn Any + Send>`
//! values. A `*_dyn` mutator checks the element type before touching storage
//! and reports [`ColumnError::TypeMismatch`] instead of panicking.

use std::any::{type_name, Any, TypeId};

use crate::engine::error::ColumnError;
use crate::engine::types::RowID;

/// Boxed component value travelling through type-erased paths.
pub type BoxedValue = Box<dyn Any + Send>;

/// Borrows a boxed value as `&dyn Any`.
#[inline]
pub(crate) fn value_ref(value: &BoxedValue) -> &dyn Any {
    &**value
}

/// Dense storage for one component type.
#[derive(Clone, Debug)]
pub struct Column<T> {
    values: Vec<T>,
}

impl<T> Default for Column<T> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<T: 'static + Send + Sync + Clone> Column<T> {
    /// Creates an empty column.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the column holds no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Read-only view over all rows.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    /// Mutable view over all rows.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Returns the value at `row`.
    #[inline]
    pub fn get(&self, row: RowID) -> Option<&T> {
        self.values.get(row as usize)
    }

    /// Returns the value at `row` mutably.
    #[inline]
    pub fn get_mut(&mut self, row: RowID) -> Option<&mut T> {
        self.values.get_mut(row as usize)
    }

    /// Appends a value and returns its row.
    #[inline]
    pub fn push(&mut self, value: T) -> RowID {
        self.values.push(value);
        (self.values.len() - 1) as RowID
    }

    /// Removes `row` by moving the last row into it.
    ///
    /// ## Returns
    /// The removed value, and the index the last row was moved from when a move
    /// took place.
    pub fn swap_remove(&mut self, row: RowID) -> Result<(T, Option<RowID>), ColumnError> {
        let len = self.values.len();
        if row as usize >= len {
            return Err(ColumnError::RowOutOfBounds { row, len });
        }
        let last = len - 1;
        let value = self.values.swap_remove(row as usize);
        let moved_from = (row as usize != last).then_some(last as RowID);
        Ok((value, moved_from))
    }

    /// Moves `row` out of `source` into a new last row of `self`.
    pub fn push_from(&mut self, source: &mut Column<T>, row: RowID) -> Result<RowID, ColumnError> {
        let (value, _) = source.swap_remove(row)?;
        Ok(self.push(value))
    }

    /// Overwrites `row` and returns the previous value.
    pub fn replace(&mut self, row: RowID, value: T) -> Result<T, ColumnError> {
        let len = self.values.len();
        match self.values.get_mut(row as usize) {
            Some(slot) => Ok(std::mem::replace(slot, value)),
            None => Err(ColumnError::RowOutOfBounds { row, len }),
        }
    }

    /// Appends `count` clones of `value`.
    pub fn extend_cloned(&mut self, value: &T, count: usize) {
        self.values.reserve(count);
        self.values.extend(std::iter::repeat(value).take(count).cloned());
    }

    fn downcast_value(value: BoxedValue) -> Result<T, ColumnError> {
        value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|value| ColumnError::TypeMismatch {
                expected: type_name::<T>(),
                actual: (*value).type_id(),
            })
    }
}

/// Object-safe interface over a [`Column<T>`] of unknown `T`.
///
/// ## Invariants
/// - `element_type_id()` is the `TypeId` of `T` for the backing `Column<T>`.
/// - `*_dyn` operations never change length on error.
pub trait TypeErasedColumn: Any + Send + Sync {
    /// Number of stored rows.
    fn len(&self) -> usize;

    /// Returns `true` if the column is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `TypeId` of the element type.
    fn element_type_id(&self) -> TypeId;

    /// Human readable element type name.
    fn element_type_name(&self) -> &'static str;

    /// Downcasting hook.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcasting hook.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Creates an empty column of the same element type.
    fn new_empty(&self) -> Box<dyn TypeErasedColumn>;

    /// Reserves room for `additional` rows.
    fn reserve(&mut self, additional: usize);

    /// Appends a boxed value.
    fn push_dyn(&mut self, value: BoxedValue) -> Result<RowID, ColumnError>;

    /// Appends `count` clones of a borrowed value.
    fn extend_cloned_dyn(&mut self, value: &dyn Any, count: usize) -> Result<(), ColumnError>;

    /// Swap-removes `row`, returning the removed value.
    fn swap_remove_dyn(&mut self, row: RowID) -> Result<BoxedValue, ColumnError>;

    /// Swap-removes `row`, dropping the removed value.
    fn drop_row(&mut self, row: RowID) -> Result<(), ColumnError>;

    /// Moves `row` of `source` into a new last row of `self`.
    fn push_from_dyn(&mut self, source: &mut dyn TypeErasedColumn, row: RowID) -> Result<RowID, ColumnError>;

    /// Overwrites `row`, returning the previous value.
    fn replace_dyn(&mut self, row: RowID, value: BoxedValue) -> Result<BoxedValue, ColumnError>;

    /// Borrows the value at `row`.
    fn get_any(&self, row: RowID) -> Option<&dyn Any>;

    /// Clones the value at `row` into a box.
    fn clone_row(&self, row: RowID) -> Option<BoxedValue>;
}

impl<T: 'static + Send + Sync + Clone> TypeErasedColumn for Column<T> {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn element_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn element_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn new_empty(&self) -> Box<dyn TypeErasedColumn> {
        Box::new(Column::<T>::new())
    }

    fn reserve(&mut self, additional: usize) {
        self.values.reserve(additional);
    }

    fn push_dyn(&mut self, value: BoxedValue) -> Result<RowID, ColumnError> {
        let value = Self::downcast_value(value)?;
        Ok(self.push(value))
    }

    fn extend_cloned_dyn(&mut self, value: &dyn Any, count: usize) -> Result<(), ColumnError> {
        let value = value.downcast_ref::<T>().ok_or(ColumnError::TypeMismatch {
            expected: type_name::<T>(),
            actual: value.type_id(),
        })?;
        self.extend_cloned(value, count);
        Ok(())
    }

    fn swap_remove_dyn(&mut self, row: RowID) -> Result<BoxedValue, ColumnError> {
        let (value, _) = self.swap_remove(row)?;
        Ok(Box::new(value))
    }

    fn drop_row(&mut self, row: RowID) -> Result<(), ColumnError> {
        self.swap_remove(row).map(|_| ())
    }

    fn push_from_dyn(&mut self, source: &mut dyn TypeErasedColumn, row: RowID) -> Result<RowID, ColumnError> {
        let actual = source.element_type_id();
        let source = source
            .as_any_mut()
            .downcast_mut::<Column<T>>()
            .ok_or(ColumnError::TypeMismatch { expected: type_name::<T>(), actual })?;
        self.push_from(source, row)
    }

    fn replace_dyn(&mut self, row: RowID, value: BoxedValue) -> Result<BoxedValue, ColumnError> {
        let value = Self::downcast_value(value)?;
        let previous = self.replace(row, value)?;
        Ok(Box::new(previous))
    }

    fn get_any(&self, row: RowID) -> Option<&dyn Any> {
        self.values.get(row as usize).map(|value| value as &dyn Any)
    }

    fn clone_row(&self, row: RowID) -> Option<BoxedValue> {
        self.values
            .get(row as usize)
            .map(|value| Box::new(value.clone()) as BoxedValue)
    }
}
