//! Archetype-based entity-component storage.
//!
//! `depot` groups entities by their exact component composition into
//! contiguous column-oriented tables, routes entity rows between tables as
//! compositions change, evaluates set-algebra queries against per-table
//! component bitmasks, and defers structural mutation while iteration
//! holds the storage open.
//!
//! # Core concepts
//!
//! - **Entity**: a stable `{id, generation}` handle to one row.
//! - **Component**: any `'static + Default` Rust type, accessed through a
//!   typed [`Component<T>`](component::Component) handle.
//! - **Archetype**: the unique table for one exact component set, interned
//!   by bitmask.
//! - **Query**: an AND/OR/NOT tree over component sets, evaluated against
//!   archetype masks so whole tables are pruned before any row is touched.
//! - **Cursor**: a one-shot iteration view over every matching row,
//!   holding a lock bit so table shapes stay frozen while it is open.
//!
//! # Basic usage
//!
//! ```rust
//! use depot::{component, Cursor, Query, Schema, Storage};
//!
//! #[derive(Default)]
//! struct Position { x: f64, y: f64 }
//! #[derive(Default)]
//! struct Velocity { x: f64, y: f64 }
//!
//! let position = component::<Position>();
//! let velocity = component::<Velocity>();
//!
//! let storage = Storage::new(Schema::new());
//! storage.new_entities(100, &[position.erased(), velocity.erased()]).unwrap();
//!
//! let mut query = Query::new();
//! let node = query.and([position.into(), velocity.into()]);
//! let mut cursor = Cursor::new(node, &storage);
//! while cursor.next() {
//!     let mut pos = position.get_mut_from_cursor(&cursor);
//!     let vel = velocity.get_from_cursor(&cursor);
//!     pos.x += vel.x;
//!     pos.y += vel.y;
//! }
//! ```
//!
//! Structural mutations issued while a cursor is open go through the
//! `enqueue_*` methods on [`Storage`] and take effect when the last cursor
//! releases its lock bit.

pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod query;
pub mod storage;

pub use component::{component, Component, ComponentMask, ComponentType, Schema, MAX_COMPONENT_TYPES};
pub use config::{clear_table_events, set_table_events, TableEvents};
pub use entity::{Entity, EntityRef, EntryId, Generation};
pub use error::Error;
pub use query::cursor::{Cursor, Rows};
pub use query::{Node, Query, QueryItem, QueryOp};
pub use storage::{Archetype, ArchetypeId, Storage, Table};
