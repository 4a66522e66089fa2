//! Row iteration over matched archetypes.
//!
//! A [`Cursor`] binds a query node to a storage and walks every row of
//! every matching archetype. Construction does no work: the first call to
//! [`next`](Cursor::next), [`rows`](Cursor::rows), or
//! [`total_matched`](Cursor::total_matched) claims a lock bit from the
//! storage and collects matching archetypes in id order. Exhausting or
//! resetting the cursor releases the bit; releasing the storage's last bit
//! drains the deferred queue.
//!
//! The cursor advances one-based — `next()` moves `entity_index` from 1 to
//! the archetype's row count — while column access is zero-based. The
//! accessors ([`row`](Cursor::row), the `Component` cursor methods)
//! encapsulate that offset so callers never compute it.

use std::rc::Rc;

use crate::entity::Entity;
use crate::query::Node;
use crate::storage::{Archetype, Storage};

/// A one-shot iteration view over all rows of all archetypes matching a
/// query, holding a storage lock bit for the duration.
pub struct Cursor<'s> {
    query: Node,
    storage: &'s Storage,

    matched: Vec<Rc<Archetype>>,
    storage_index: usize,
    entity_index: usize,
    remaining: usize,

    lock_bit: Option<u32>,
}

impl<'s> Cursor<'s> {
    /// Bind a query node to a storage. No work happens until the first
    /// advance.
    pub fn new(query: Node, storage: &'s Storage) -> Self {
        Self {
            query,
            storage,
            matched: Vec::new(),
            storage_index: 0,
            entity_index: 0,
            remaining: 0,
            lock_bit: None,
        }
    }

    /// Advance to the next row. Returns `false` once every matched row has
    /// been visited, at which point the cursor has reset itself and
    /// released its lock bit.
    pub fn next(&mut self) -> bool {
        if self.entity_index < self.remaining {
            self.entity_index += 1;
            return true;
        }
        self.advance()
    }

    fn advance(&mut self) -> bool {
        if self.lock_bit.is_none() {
            self.initialize();
        }

        while self.storage_index < self.matched.len() {
            // Row counts are volatile; re-read at every archetype
            // transition rather than caching across the iteration.
            self.remaining = self.matched[self.storage_index].len();
            if self.entity_index < self.remaining {
                self.entity_index += 1;
                return true;
            }
            self.storage_index += 1;
            self.entity_index = 0;
        }

        self.reset();
        false
    }

    /// Claim a lock bit and collect matching archetypes in id order.
    fn initialize(&mut self) {
        let bit = self
            .storage
            .acquire_cursor_lock()
            .expect("no free cursor lock bits");
        self.lock_bit = Some(bit);

        let mut matched = Vec::new();
        for archetype in self.storage.archetypes() {
            if self.query.evaluate(&archetype, self.storage) {
                matched.push(archetype);
            }
        }
        self.matched = matched;
        self.storage_index = 0;
        self.entity_index = 0;
        self.remaining = self.matched.first().map(|a| a.len()).unwrap_or(0);
    }

    /// Clear iteration state and release the lock bit. Idempotent; invoked
    /// automatically on exhaustion.
    pub fn reset(&mut self) {
        self.storage_index = 0;
        self.entity_index = 0;
        self.remaining = 0;
        self.matched.clear();
        if let Some(bit) = self.lock_bit.take() {
            self.storage.remove_lock(bit);
        }
    }

    /// Iterate the matched rows as `(row, archetype)` pairs.
    ///
    /// Dropping the iterator — including breaking out of a `for` loop —
    /// resets the cursor and releases the lock bit. Drop any column
    /// borrows before dropping the iterator mid-loop, since the release
    /// may drain deferred mutations into the borrowed columns.
    pub fn rows(&mut self) -> Rows<'_, 's> {
        Rows { cursor: self }
    }

    /// The total number of rows across every matched archetype. Initializes
    /// if needed, then resets, releasing the lock bit.
    pub fn total_matched(&mut self) -> usize {
        if self.lock_bit.is_none() {
            self.initialize();
        }
        let total = self.matched.iter().map(|archetype| archetype.len()).sum();
        self.reset();
        total
    }

    /// The current archetype's table.
    ///
    /// # Panics
    /// Panics unless the last [`next`](Self::next) returned `true`.
    pub(crate) fn table(&self) -> &crate::storage::Table {
        self.matched[self.storage_index].table()
    }

    /// The zero-based column row for the cursor's current position.
    pub(crate) fn row(&self) -> usize {
        debug_assert!(self.entity_index > 0, "cursor has not been advanced");
        self.entity_index - 1
    }

    /// The one-based advancement position within the current archetype.
    pub fn entity_index(&self) -> usize {
        self.entity_index
    }

    /// How many rows remain in the current archetype.
    pub fn remaining_in_archetype(&self) -> usize {
        self.remaining - self.entity_index
    }

    /// The entity at the cursor's current row.
    pub fn current_entity(&self) -> Option<Entity> {
        if self.entity_index == 0 {
            return None;
        }
        self.table().entry(self.row())
    }

    /// The entity `offset` rows from the current one within the current
    /// archetype.
    pub fn entity_at_offset(&self, offset: isize) -> Option<Entity> {
        if self.entity_index == 0 {
            return None;
        }
        let row = self.row() as isize + offset;
        if row < 0 {
            return None;
        }
        self.table().entry(row as usize)
    }
}

/// Iterator over a cursor's matched rows; see [`Cursor::rows`].
pub struct Rows<'c, 's> {
    cursor: &'c mut Cursor<'s>,
}

impl<'c, 's> Iterator for Rows<'c, 's> {
    type Item = (usize, Rc<Archetype>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.next() {
            let archetype = self.cursor.matched[self.cursor.storage_index].clone();
            Some((self.cursor.row(), archetype))
        } else {
            None
        }
    }
}

impl<'c, 's> Drop for Rows<'c, 's> {
    fn drop(&mut self) {
        self.cursor.reset();
    }
}
