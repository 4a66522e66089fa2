//! Component identity and typed access.
//!
//! A component is any `'static + Default` Rust type. The crate never stores
//! component values behind trait objects visible to the caller; instead a
//! zero-sized, copyable [`Component<T>`] handle carries both:
//!
//! - an erased identity ([`ComponentType`]) used for schema registration,
//!   archetype masks, and queries, and
//! - the typed read/write path into a table column, so component access is
//!   statically checked and needs no runtime type inspection.
//!
//! # Example
//!
//! ```rust,ignore
//! let position = component::<Position>();
//! let velocity = component::<Velocity>();
//!
//! let storage = Storage::new(Schema::new());
//! storage.new_entities(10, &[position.erased(), velocity.erased()])?;
//!
//! let mut query = Query::new();
//! let node = query.and([position.into(), velocity.into()]);
//! let mut cursor = Cursor::new(node, &storage);
//! while cursor.next() {
//!     let mut pos = position.get_mut_from_cursor(&cursor);
//!     let vel = velocity.get_from_cursor(&cursor);
//!     pos.x += vel.x;
//! }
//! ```

mod mask;
mod schema;

pub use mask::{ComponentMask, MAX_COMPONENT_TYPES};
pub use schema::Schema;

use std::any::TypeId as StdTypeId;
use std::cell::{Ref, RefMut};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::query::cursor::Cursor;
use crate::storage::column::{new_typed_column, Column};
use crate::storage::table::Table;

/// Create the component handle for type `T`.
///
/// Handles are zero-sized and freely copyable; calling this twice for the
/// same `T` yields interchangeable handles with the same identity.
pub fn component<T: Default + 'static>() -> Component<T> {
    Component {
        _marker: PhantomData,
    }
}

/// A typed component handle for `T`.
///
/// Carries the component identity for queries and archetype routing, plus
/// typed accessors into table columns. `T: Default` supplies the value used
/// for freshly appended rows and for columns present only in a transfer
/// destination.
pub struct Component<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Component<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Component<T> {}

impl<T: Default + 'static> Default for Component<T> {
    fn default() -> Self {
        component::<T>()
    }
}

impl<T: Default + 'static> Component<T> {
    /// The erased identity of this component type.
    pub fn erased(&self) -> ComponentType {
        ComponentType {
            type_id: StdTypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            new_column: new_typed_column::<T>,
        }
    }

    /// Whether the given table carries a column for this component.
    pub fn check(&self, table: &Table) -> bool {
        table.contains_type_id(StdTypeId::of::<T>())
    }

    /// Borrow the component value at `row` in `table`.
    ///
    /// # Panics
    /// Panics if the table has no column for this component or the row is
    /// out of range. Use [`check`](Self::check) first when unsure.
    pub fn get<'t>(&self, table: &'t Table, row: usize) -> Ref<'t, T> {
        table
            .typed::<T>()
            .expect("component not present in table")
            .cell(row)
    }

    /// Mutably borrow the component value at `row` in `table`.
    ///
    /// # Panics
    /// Panics if the table has no column for this component, the row is out
    /// of range, or the column is already mutably borrowed.
    pub fn get_mut<'t>(&self, table: &'t Table, row: usize) -> RefMut<'t, T> {
        table
            .typed::<T>()
            .expect("component not present in table")
            .cell_mut(row)
    }

    /// Borrow the component value for the cursor's current row.
    ///
    /// Valid only after `cursor.next()` has returned `true`; the cursor's
    /// one-based advancement is mapped to the zero-based column index here,
    /// so callers never compute the offset themselves.
    pub fn get_from_cursor<'c>(&self, cursor: &'c Cursor<'_>) -> Ref<'c, T> {
        self.get(cursor.table(), cursor.row())
    }

    /// Mutably borrow the component value for the cursor's current row.
    ///
    /// Valid only after `cursor.next()` has returned `true`.
    pub fn get_mut_from_cursor<'c>(&self, cursor: &'c Cursor<'_>) -> RefMut<'c, T> {
        self.get_mut(cursor.table(), cursor.row())
    }

    /// Borrow the component value for the cursor's current row, or `None`
    /// when the current archetype lacks this component.
    pub fn get_from_cursor_checked<'c>(&self, cursor: &'c Cursor<'_>) -> Option<Ref<'c, T>> {
        if self.check(cursor.table()) {
            Some(self.get_from_cursor(cursor))
        } else {
            None
        }
    }
}

impl<T: Default + 'static> From<Component<T>> for ComponentType {
    fn from(component: Component<T>) -> Self {
        component.erased()
    }
}

/// The erased identity of a component type.
///
/// Identity is the Rust type, not the handle instance: every
/// `ComponentType` produced for the same `T` compares equal. The attached
/// column factory lets tables allocate a matching typed column without
/// knowing `T`.
#[derive(Debug, Clone, Copy)]
pub struct ComponentType {
    type_id: StdTypeId,
    name: &'static str,
    new_column: fn() -> Box<dyn Column>,
}

impl ComponentType {
    /// The Rust `TypeId` backing this identity.
    #[inline]
    pub fn type_id(&self) -> StdTypeId {
        self.type_id
    }

    /// The full Rust type name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The type name with any module path stripped.
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }

    /// Allocate an empty column for this component type.
    pub(crate) fn new_column(&self) -> Box<dyn Column> {
        (self.new_column)()
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ComponentType {}

impl Hash for ComponentType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}
