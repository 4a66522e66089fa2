//! Process-wide table event callbacks.
//!
//! An application may install a [`TableEvents`] bundle to observe row
//! lifecycle changes across every table in the process: row creation, row
//! deletion, and row transfer between tables. Tables invoke the installed
//! callbacks synchronously from inside their mutation paths.
//!
//! The callbacks run while storage internals are borrowed, so they must not
//! call back into a [`Storage`](crate::storage::Storage). They are intended
//! for counters, tracing, and similar side channels.

use std::sync::RwLock;

use crate::entity::Entity;

/// Callback bundle invoked on table row lifecycle events.
///
/// Each callback is optional; unset callbacks cost a single read of the
/// process-wide bundle. Callbacks are plain function pointers so the bundle
/// can live in a `static`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableEvents {
    /// Invoked once per row appended by entity creation.
    pub on_row_created: Option<fn(Entity)>,
    /// Invoked once per row removed by entity destruction.
    pub on_row_deleted: Option<fn(Entity)>,
    /// Invoked once per row moved between tables on composition change.
    pub on_row_transferred: Option<fn(Entity)>,
}

impl TableEvents {
    /// A bundle with no callbacks installed.
    pub const NONE: Self = Self {
        on_row_created: None,
        on_row_deleted: None,
        on_row_transferred: None,
    };
}

static TABLE_EVENTS: RwLock<TableEvents> = RwLock::new(TableEvents::NONE);

/// Install the process-wide table event callbacks, replacing any previous
/// bundle.
pub fn set_table_events(events: TableEvents) {
    *TABLE_EVENTS.write().expect("table events lock poisoned") = events;
}

/// Remove all installed table event callbacks.
pub fn clear_table_events() {
    set_table_events(TableEvents::NONE);
}

pub(crate) fn emit_row_created(entity: Entity) {
    let events = TABLE_EVENTS.read().expect("table events lock poisoned");
    if let Some(callback) = events.on_row_created {
        callback(entity);
    }
}

pub(crate) fn emit_row_deleted(entity: Entity) {
    let events = TABLE_EVENTS.read().expect("table events lock poisoned");
    if let Some(callback) = events.on_row_deleted {
        callback(entity);
    }
}

pub(crate) fn emit_row_transferred(entity: Entity) {
    let events = TABLE_EVENTS.read().expect("table events lock poisoned");
    if let Some(callback) = events.on_row_transferred {
        callback(entity);
    }
}
