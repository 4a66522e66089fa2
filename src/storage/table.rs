//! Column-oriented row storage for one archetype.
//!
//! A table stores every entity of one exact component composition in
//! contiguous per-component columns plus a parallel row-to-entity list.
//! Rows are appended at the end, removed by swap-with-last, and moved
//! between tables when an entity's composition changes.
//!
//! # Invariants
//! - Every column's length equals the entity list's length after each
//!   operation.
//! - The mask's set bits correspond exactly to the component types present
//!   as columns.
//! - Every live entity's directory location points back at its current row.

use std::any::TypeId as StdTypeId;

use std::cell::RefCell;

use crate::component::{ComponentMask, ComponentType};
use crate::config;
use crate::entity::{Entity, EntryIndex, Location};
use crate::error::Error;
use crate::storage::archetype::ArchetypeId;
use crate::storage::column::{Column, TypedColumn};

/// A column store holding every entity of one component composition.
pub struct Table {
    /// The composition mask. Order-free archetype identity.
    mask: ComponentMask,

    /// Component identities in column order (the creating caller's input
    /// order, deduplicated).
    types: Vec<ComponentType>,

    /// One column per component type, parallel to `types`.
    columns: Vec<Box<dyn Column>>,

    /// Row-to-entity list, parallel to every column.
    entries: RefCell<Vec<Entity>>,
}

impl Table {
    /// Create an empty table for the given component columns and mask.
    pub(crate) fn new(types: Vec<ComponentType>, mask: ComponentMask) -> Self {
        let columns = types.iter().map(|ty| ty.new_column()).collect();
        Self {
            mask,
            types,
            columns,
            entries: RefCell::new(Vec::new()),
        }
    }

    /// The number of rows in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether the table has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// The table's composition mask.
    #[inline]
    pub fn mask(&self) -> &ComponentMask {
        &self.mask
    }

    /// Component identities in column order.
    #[inline]
    pub fn column_types(&self) -> &[ComponentType] {
        &self.types
    }

    /// Whether the table carries a column for the given component.
    #[inline]
    pub fn contains(&self, component: ComponentType) -> bool {
        self.contains_type_id(component.type_id())
    }

    /// Whether the table carries a column for the given Rust type.
    #[inline]
    pub fn contains_type_id(&self, type_id: StdTypeId) -> bool {
        self.position_of(type_id).is_some()
    }

    /// The entity occupying `row`, if the row exists.
    pub fn entry(&self, row: usize) -> Option<Entity> {
        self.entries.borrow().get(row).copied()
    }

    fn position_of(&self, type_id: StdTypeId) -> Option<usize> {
        self.types.iter().position(|ty| ty.type_id() == type_id)
    }

    /// The typed column for `T`, if present.
    pub(crate) fn typed<T: Default + 'static>(&self) -> Option<&TypedColumn<T>> {
        let position = self.position_of(StdTypeId::of::<T>())?;
        self.columns[position].as_any().downcast_ref::<TypedColumn<T>>()
    }

    /// Append `n` default-initialized rows, allocating fresh entity IDs and
    /// recording each entity's location. Returns the new handles.
    ///
    /// A zero count appends nothing and returns an empty vec.
    pub(crate) fn new_entries(
        &self,
        n: usize,
        index: &mut EntryIndex,
        archetype: ArchetypeId,
    ) -> Vec<Entity> {
        if n == 0 {
            return Vec::new();
        }

        let entities = index.alloc_many(n);
        let start = self.entries.borrow().len();

        for column in &self.columns {
            for _ in 0..n {
                column.push_default();
            }
        }

        {
            let mut entries = self.entries.borrow_mut();
            entries.reserve(n);
            for (i, entity) in entities.iter().enumerate() {
                entries.push(*entity);
                index.set_location(
                    *entity,
                    Location {
                        archetype,
                        row: start + i,
                    },
                );
            }
        }

        #[cfg(debug_assertions)]
        self.verify_invariants();

        for entity in &entities {
            config::emit_row_created(*entity);
        }

        entities
    }

    /// Delete the given rows by swap-with-last, largest index first so the
    /// remaining indices stay valid. Freed IDs go back to the allocator
    /// with their generation incremented.
    ///
    /// Fails with [`Error::IndexOutOfRange`] before mutating anything if
    /// any index is out of range. Duplicate indices are deleted once.
    pub(crate) fn delete_rows(&self, rows: &[usize], index: &mut EntryIndex) -> Result<(), Error> {
        let len = self.len();
        for &row in rows {
            if row >= len {
                debug_assert!(row < len, "delete of out-of-range row {row} (len {len})");
                return Err(Error::IndexOutOfRange { index: row, len });
            }
        }

        let mut sorted = rows.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.dedup();

        for row in sorted {
            let (removed, moved) = self.remove_row(row);
            if let Some(moved) = moved {
                index.set_row(moved, row);
            }
            index.free(removed);
            config::emit_row_deleted(removed);
        }

        #[cfg(debug_assertions)]
        self.verify_invariants();

        Ok(())
    }

    /// Move the row at `row` into `dest`, preserving the entity's identity.
    ///
    /// Component values present in both tables move with the row; columns
    /// present only in `dest` are default-initialized; columns present only
    /// here are discarded. The source row is then removed by swap-with-last
    /// and the entity's location is repointed at the destination. Returns
    /// the new row index in `dest`.
    pub(crate) fn transfer_row(
        &self,
        dest: &Table,
        row: usize,
        index: &mut EntryIndex,
        dest_archetype: ArchetypeId,
    ) -> Result<usize, Error> {
        let len = self.len();
        if row >= len {
            debug_assert!(row < len, "transfer of out-of-range row {row} (len {len})");
            return Err(Error::IndexOutOfRange { index: row, len });
        }

        let entity = self.entries.borrow()[row];

        // Build the destination row column by column. Shared components
        // move; destination-only components start from their default.
        for (ty, dest_column) in dest.types.iter().zip(&dest.columns) {
            match self.position_of(ty.type_id()) {
                Some(position) => self.columns[position].move_cell_to(row, dest_column.as_ref()),
                None => dest_column.push_default(),
            }
        }

        let new_row = dest.entries.borrow().len();
        dest.entries.borrow_mut().push(entity);

        // Remove the vacated source row; source-only component values are
        // dropped here.
        let (_, moved) = self.remove_row(row);
        if let Some(moved) = moved {
            index.set_row(moved, row);
        }

        index.set_location(
            entity,
            Location {
                archetype: dest_archetype,
                row: new_row,
            },
        );

        #[cfg(debug_assertions)]
        {
            self.verify_invariants();
            dest.verify_invariants();
        }

        config::emit_row_transferred(entity);

        Ok(new_row)
    }

    /// Copy this row's component values into an existing row of `dest`,
    /// matching columns by component identity. Columns with no counterpart
    /// on either side are left untouched. Used for cross-storage transfers.
    pub(crate) fn export_row(&self, row: usize, dest: &Table, dest_row: usize) {
        for (ty, dest_column) in dest.types.iter().zip(&dest.columns) {
            if let Some(position) = self.position_of(ty.type_id()) {
                self.columns[position].take_cell_into(row, dest_column.as_ref(), dest_row);
            }
        }
    }

    /// Swap-remove one row from the entity list and every column. Returns
    /// the removed entity and, when another row was swapped into the hole,
    /// the entity now occupying `row`.
    fn remove_row(&self, row: usize) -> (Entity, Option<Entity>) {
        let mut entries = self.entries.borrow_mut();
        let last = entries.len() - 1;
        let removed = entries.swap_remove(row);
        for column in &self.columns {
            column.swap_remove(row);
        }
        let moved = if row < last { Some(entries[row]) } else { None };
        (removed, moved)
    }

    /// Check that every column length matches the entity list.
    #[cfg(debug_assertions)]
    fn verify_invariants(&self) {
        let expected = self.entries.borrow().len();
        for (i, column) in self.columns.iter().enumerate() {
            assert_eq!(
                column.len(),
                expected,
                "column {i} length {} drifted from row count {expected}",
                column.len(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::component::component;
    use crate::component::{ComponentMask, Schema};
    use crate::entity::EntryIndex;

    use super::*;

    #[derive(Default, Debug, PartialEq)]
    struct Position {
        x: f64,
        y: f64,
    }

    #[derive(Default, Debug, PartialEq)]
    struct Velocity {
        x: f64,
        y: f64,
    }

    #[derive(Default, Debug, PartialEq)]
    struct Health {
        current: i32,
    }

    fn table_of(types: &[ComponentType]) -> Table {
        let schema = Schema::new();
        let mut mask = ComponentMask::new();
        for &ty in types {
            mask.mark(schema.register(ty).unwrap());
        }
        Table::new(types.to_vec(), mask)
    }

    #[test]
    fn new_entries_appends_default_rows() {
        // Given
        let table = table_of(&[
            component::<Position>().erased(),
            component::<Velocity>().erased(),
        ]);
        let mut index = EntryIndex::new();

        // When
        let entities = table.new_entries(3, &mut index, ArchetypeId::new(1));

        // Then
        assert_eq!(entities.len(), 3);
        assert_eq!(table.len(), 3);
        for (row, entity) in entities.iter().enumerate() {
            assert_eq!(table.entry(row), Some(*entity));
            assert_eq!(*component::<Position>().get(&table, row), Position::default());
        }
    }

    #[test]
    fn new_entries_zero_is_empty() {
        // Given
        let table = table_of(&[component::<Position>().erased()]);
        let mut index = EntryIndex::new();

        // When
        let entities = table.new_entries(0, &mut index, ArchetypeId::new(1));

        // Then
        assert!(entities.is_empty());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn contains_follows_columns() {
        // Given
        let table = table_of(&[component::<Position>().erased()]);

        // Then
        assert!(table.contains(component::<Position>().erased()));
        assert!(!table.contains(component::<Velocity>().erased()));
    }

    #[test]
    fn delete_rows_swaps_last_into_hole() {
        // Given
        let position = component::<Position>();
        let table = table_of(&[position.erased()]);
        let mut index = EntryIndex::new();
        let entities = table.new_entries(4, &mut index, ArchetypeId::new(1));
        for row in 0..4 {
            position.get_mut(&table, row).x = row as f64;
        }

        // When - delete the first row
        table.delete_rows(&[0], &mut index).unwrap();

        // Then - last row swapped into row 0, its location updated
        assert_eq!(table.len(), 3);
        assert_eq!(position.get(&table, 0).x, 3.0);
        assert_eq!(index.location(entities[3]).unwrap().row, 0);

        // And the removed id is recycled with a bumped generation
        assert!(index.slot(entities[0]).is_none());
        let reused = index.alloc_many(1)[0];
        assert_eq!(reused.id(), entities[0].id());
        assert_eq!(reused.generation().raw(), 1);
    }

    #[test]
    fn delete_rows_multiple_largest_first() {
        // Given
        let position = component::<Position>();
        let table = table_of(&[position.erased()]);
        let mut index = EntryIndex::new();
        table.new_entries(10, &mut index, ArchetypeId::new(1));
        for row in 0..10 {
            position.get_mut(&table, row).x = row as f64;
        }

        // When - delete alternating rows in ascending order
        table.delete_rows(&[0, 2, 4, 6, 8], &mut index).unwrap();

        // Then - five rows remain, all odd-valued
        assert_eq!(table.len(), 5);
        for row in 0..5 {
            let x = position.get(&table, row).x;
            assert_eq!((x as usize) % 2, 1, "unexpected survivor {x}");
        }
    }

    #[test]
    fn delete_rows_out_of_range_fails_before_mutation() {
        // Given
        let table = table_of(&[component::<Position>().erased()]);
        let mut index = EntryIndex::new();
        table.new_entries(2, &mut index, ArchetypeId::new(1));

        // When - one valid index, one out of range
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            table.delete_rows(&[1, 5], &mut index)
        }));

        // Then - nothing was deleted (debug builds assert, release returns
        // the error)
        match result {
            Ok(Err(Error::IndexOutOfRange { index: 5, len: 2 })) => {}
            Ok(other) => panic!("unexpected result: {other:?}"),
            Err(_) => {} // debug_assert tripped
        }
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn transfer_row_moves_shared_values() {
        // Given
        let position = component::<Position>();
        let velocity = component::<Velocity>();
        let source = table_of(&[position.erased()]);
        let dest = table_of(&[position.erased(), velocity.erased()]);
        let mut index = EntryIndex::new();
        let entities = source.new_entries(1, &mut index, ArchetypeId::new(1));
        position.get_mut(&source, 0).x = 5.0;

        // When
        let new_row = source
            .transfer_row(&dest, 0, &mut index, ArchetypeId::new(2))
            .unwrap();

        // Then - the shared column moved, the new column is defaulted
        assert_eq!(source.len(), 0);
        assert_eq!(dest.len(), 1);
        assert_eq!(position.get(&dest, new_row).x, 5.0);
        assert_eq!(*velocity.get(&dest, new_row), Velocity::default());

        // Row identity is preserved
        assert_eq!(dest.entry(new_row), Some(entities[0]));
        let location = index.location(entities[0]).unwrap();
        assert_eq!(location.archetype, ArchetypeId::new(2));
        assert_eq!(location.row, new_row);
    }

    #[test]
    fn transfer_row_discards_source_only_values() {
        // Given
        let position = component::<Position>();
        let health = component::<Health>();
        let source = table_of(&[position.erased(), health.erased()]);
        let dest = table_of(&[position.erased()]);
        let mut index = EntryIndex::new();
        source.new_entries(1, &mut index, ArchetypeId::new(1));
        health.get_mut(&source, 0).current = 99;

        // When
        source
            .transfer_row(&dest, 0, &mut index, ArchetypeId::new(2))
            .unwrap();

        // Then
        assert_eq!(dest.len(), 1);
        assert!(!dest.contains(health.erased()));
    }

    #[test]
    fn transfer_row_fixes_swapped_source_row() {
        // Given
        let position = component::<Position>();
        let source = table_of(&[position.erased()]);
        let dest = table_of(&[position.erased()]);
        let mut index = EntryIndex::new();
        let entities = source.new_entries(3, &mut index, ArchetypeId::new(1));

        // When - move the first row out
        source
            .transfer_row(&dest, 0, &mut index, ArchetypeId::new(2))
            .unwrap();

        // Then - the old last row now sits at row 0
        assert_eq!(source.len(), 2);
        assert_eq!(source.entry(0), Some(entities[2]));
        assert_eq!(index.location(entities[2]).unwrap().row, 0);
    }

    #[test]
    fn export_row_copies_matching_columns() {
        // Given
        let position = component::<Position>();
        let velocity = component::<Velocity>();
        let source = table_of(&[position.erased(), velocity.erased()]);
        let dest = table_of(&[position.erased()]);
        let mut source_index = EntryIndex::new();
        let mut dest_index = EntryIndex::new();
        source.new_entries(1, &mut source_index, ArchetypeId::new(1));
        dest.new_entries(1, &mut dest_index, ArchetypeId::new(1));
        position.get_mut(&source, 0).y = 8.0;

        // When
        source.export_row(0, &dest, 0);

        // Then
        assert_eq!(position.get(&dest, 0).y, 8.0);
    }
}
