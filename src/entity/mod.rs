//! Entity identity, allocation, and the storage directory.
//!
//! An [`Entity`] is a lightweight, copyable handle pairing an [`EntryId`]
//! with a [`Generation`]. The ID identifies a directory slot owned by a
//! storage; the generation counts how many times that slot has been
//! recycled. Stale handles are detected by a generation mismatch, so
//! use-after-destroy degrades to a no-op instead of touching another
//! entity's data.
//!
//! The [`EntryIndex`] is both the allocator (monotonic 1-based IDs with a
//! dead pool for recycling) and the directory: each slot tracks the
//! entity's current table location, its sorted component list, an optional
//! weak parent link, and an optional destroy callback.

use std::rc::Rc;

use crate::component::ComponentType;
use crate::storage::archetype::{Archetype, ArchetypeId};
use crate::storage::table::Table;

/// A 1-based entity identifier. Zero is reserved as the invalid ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(u32);

impl EntryId {
    /// The invalid identifier.
    pub const INVALID: Self = Self(0);

    /// Construct an id from its raw value.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw identifier value.
    #[inline]
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Whether this is a live (non-zero) identifier.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    /// The directory index for this id.
    #[inline]
    pub(crate) fn index(&self) -> usize {
        debug_assert!(self.0 != 0, "invalid entry id has no index");
        (self.0 - 1) as usize
    }
}

/// The recycle count of a directory slot. Incremented each time the slot's
/// ID is freed, invalidating handles to the previous occupant.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u32);

impl Generation {
    /// The generation of a slot's first occupant.
    pub const FIRST: Self = Self(0);

    /// The next generation after this one.
    #[inline]
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// The raw counter value.
    #[inline]
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// A stable handle to an entity in a storage.
///
/// Handles stay valid across table transfers (adding or removing
/// components never changes the ID or generation) and go stale when the
/// entity is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    id: EntryId,
    generation: Generation,
}

impl Entity {
    /// Construct a handle from its parts.
    #[inline]
    pub(crate) const fn new(id: EntryId, generation: Generation) -> Self {
        Self { id, generation }
    }

    /// The entity's identifier.
    #[inline]
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// The generation snapshot carried by this handle.
    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

/// Where an entity currently lives: its archetype and row within that
/// archetype's table.
///
/// Row indices are volatile. Any delete-by-swap or transfer may reassign
/// them, so locations must be re-read rather than cached across mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Location {
    pub archetype: ArchetypeId,
    pub row: usize,
}

/// A borrowed view of one entity's row.
///
/// Holds the archetype alive for the duration of the borrow and resolves
/// component accessors without recomputing the location. The captured row
/// goes stale if the storage is mutated structurally; re-fetch the view
/// after adds, removes, or destroys.
pub struct EntityRef {
    archetype: Rc<Archetype>,
    row: usize,
}

impl EntityRef {
    pub(crate) fn new(archetype: Rc<Archetype>, row: usize) -> Self {
        Self { archetype, row }
    }

    /// The table holding the entity's row.
    #[inline]
    pub fn table(&self) -> &Table {
        self.archetype.table()
    }

    /// The entity's row within [`table`](Self::table).
    #[inline]
    pub fn row(&self) -> usize {
        self.row
    }

    /// Borrow one of the entity's component values.
    ///
    /// # Panics
    /// Panics if the entity's archetype lacks the component.
    pub fn get<T: Default + 'static>(
        &self,
        component: crate::component::Component<T>,
    ) -> std::cell::Ref<'_, T> {
        component.get(self.table(), self.row)
    }

    /// Mutably borrow one of the entity's component values.
    ///
    /// # Panics
    /// Panics if the entity's archetype lacks the component.
    pub fn get_mut<T: Default + 'static>(
        &self,
        component: crate::component::Component<T>,
    ) -> std::cell::RefMut<'_, T> {
        component.get_mut(self.table(), self.row)
    }
}

/// A callback invoked when the entity carrying it is destroyed.
pub type DestroyCallback = Box<dyn Fn(Entity)>;

/// Per-entity directory slot.
pub(crate) struct Slot {
    pub generation: Generation,
    pub location: Option<Location>,
    pub components: Vec<ComponentType>,
    pub parent: Option<Entity>,
    pub on_destroy: Option<DestroyCallback>,
}

impl Slot {
    fn new() -> Self {
        Self {
            generation: Generation::FIRST,
            location: None,
            components: Vec::new(),
            parent: None,
            on_destroy: None,
        }
    }
}

/// The entity allocator and directory owned by a storage.
///
/// IDs are allocated monotonically starting at one; freed IDs are recycled
/// from a dead pool with their generation incremented, so the ID space stays
/// compact without ever resurrecting a stale handle.
pub(crate) struct EntryIndex {
    slots: Vec<Slot>,
    free: Vec<Entity>,
    next_id: u32,
}

impl EntryIndex {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            next_id: 1,
        }
    }

    /// Allocate `count` entities, recycling from the dead pool first.
    pub fn alloc_many(&mut self, count: usize) -> Vec<Entity> {
        let mut entities = Vec::with_capacity(count);

        let from_pool = count.min(self.free.len());
        entities.extend(self.free.drain(self.free.len() - from_pool..));

        let remaining = count - entities.len();
        for _ in 0..remaining {
            let raw = self.next_id;
            self.next_id += 1;
            self.slots.push(Slot::new());
            entities.push(Entity::new(EntryId::new(raw), Generation::FIRST));
        }

        entities
    }

    /// Free an entity's slot, bumping its generation and returning the ID
    /// to the dead pool. Stale handles are ignored.
    pub fn free(&mut self, entity: Entity) {
        let recycled = match self.slot_mut(entity) {
            Some(slot) => {
                slot.generation = slot.generation.next();
                slot.location = None;
                slot.components.clear();
                slot.parent = None;
                slot.on_destroy = None;
                Entity::new(entity.id(), slot.generation)
            }
            None => return,
        };
        self.free.push(recycled);
    }

    /// The slot for a handle, if the handle is current.
    pub fn slot(&self, entity: Entity) -> Option<&Slot> {
        if !entity.id().is_valid() {
            return None;
        }
        self.slots
            .get(entity.id().index())
            .filter(|slot| slot.generation == entity.generation())
    }

    /// The mutable slot for a handle, if the handle is current.
    pub fn slot_mut(&mut self, entity: Entity) -> Option<&mut Slot> {
        if !entity.id().is_valid() {
            return None;
        }
        self.slots
            .get_mut(entity.id().index())
            .filter(|slot| slot.generation == entity.generation())
    }

    /// Whether the handle refers to a live, placed entity.
    pub fn is_live(&self, entity: Entity) -> bool {
        self.slot(entity).is_some_and(|slot| slot.location.is_some())
    }

    /// Rebuild the current handle for a raw ID, if that slot holds a live
    /// entity.
    pub fn entity(&self, raw_id: u32) -> Option<Entity> {
        let id = EntryId::new(raw_id);
        if !id.is_valid() {
            return None;
        }
        self.slots
            .get(id.index())
            .filter(|slot| slot.location.is_some())
            .map(|slot| Entity::new(id, slot.generation))
    }

    pub fn location(&self, entity: Entity) -> Option<Location> {
        self.slot(entity).and_then(|slot| slot.location)
    }

    pub fn set_location(&mut self, entity: Entity, location: Location) {
        if let Some(slot) = self.slot_mut(entity) {
            slot.location = Some(location);
        }
    }

    /// Update only the row of an entity's location, after a swap-remove
    /// moved its row within the same table.
    pub fn set_row(&mut self, entity: Entity, row: usize) {
        if let Some(slot) = self.slot_mut(entity) {
            if let Some(location) = slot.location.as_mut() {
                location.row = row;
            }
        }
    }

    pub fn set_components(&mut self, entity: Entity, components: Vec<ComponentType>) {
        if let Some(slot) = self.slot_mut(entity) {
            slot.components = components;
        }
    }
}
