//! The storage façade: archetype routing, locking, and deferred mutation.
//!
//! A [`Storage`] owns the schema, the mask-keyed archetype registry, the
//! entity directory, the lock mask, and the deferred operation queue. It is
//! the single entry point for every structural mutation: entity creation
//! and destruction, component adds/removes, and cross-storage transfers.
//!
//! # Concurrency model
//!
//! Storages are single-threaded and cooperative. The lock is not a mutex:
//! it is a reentrant iteration guard. Each open cursor holds one bit of a
//! bitset-shaped lock mask; while any bit is set, structural mutation
//! either fails with [`Error::Locked`] or, through the `enqueue_*`
//! variants, is recorded in the deferred queue. When the last bit clears,
//! the queue drains in three phases: creations, component adds/removes,
//! destroys. A drain failure aborts the drain and is surfaced from the
//! next fallible call on the storage.
//!
//! Component *values* are not guarded by the lock: cursor iteration hands
//! out cell borrows precisely so callers can mutate values in place while
//! the shape of every table stays frozen.

pub(crate) mod archetype;
pub(crate) mod column;
pub(crate) mod ops;
pub(crate) mod table;

pub use archetype::{Archetype, ArchetypeId};
pub use table::Table;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::component::{Component, ComponentMask, ComponentType, Schema, MAX_COMPONENT_TYPES};
use crate::entity::{Entity, EntityRef, EntryIndex};
use crate::error::Error;
use archetype::Archetypes;
use ops::{CellWrite, Op, OpQueue};

/// An archetype-based column store for entities.
///
/// See the [module documentation](self) for the locking and deferral
/// rules. `Storage` is `!Send` and `!Sync`; share it by reference within
/// one thread.
pub struct Storage {
    schema: Schema,
    archetypes: RefCell<Archetypes>,
    index: RefCell<EntryIndex>,
    locks: RefCell<ComponentMask>,
    queue: RefCell<OpQueue>,
    drain_error: RefCell<Option<Error>>,
}

impl Storage {
    /// Create a storage over the given schema.
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            archetypes: RefCell::new(Archetypes::new()),
            index: RefCell::new(EntryIndex::new()),
            locks: RefCell::new(ComponentMask::new()),
            queue: RefCell::new(OpQueue::new()),
            drain_error: RefCell::new(None),
        }
    }

    /// The storage's schema.
    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Register component types without creating an archetype.
    pub fn register(&self, components: &[ComponentType]) -> Result<(), Error> {
        for &component in components {
            self.schema.register(component)?;
        }
        Ok(())
    }

    /// All archetypes in creation (id) order.
    pub fn archetypes(&self) -> Vec<Rc<Archetype>> {
        self.archetypes.borrow().snapshot()
    }

    /// Resolve the archetype for a composition, creating it on first use.
    pub fn archetype_for(&self, components: &[ComponentType]) -> Result<Rc<Archetype>, Error> {
        self.archetypes
            .borrow_mut()
            .get_or_create(&self.schema, components)
    }

    // ==================== Entity creation and destruction ====================

    /// Create `n` entities with the given composition, returning their
    /// handles in order.
    ///
    /// Fails with [`Error::Locked`] while any lock bit is held and with
    /// [`Error::NoComponents`] for an empty composition.
    pub fn new_entities(
        &self,
        n: usize,
        components: &[ComponentType],
    ) -> Result<Vec<Entity>, Error> {
        self.check_drain_error()?;
        self.new_entities_unchecked(n, components)
    }

    fn new_entities_unchecked(
        &self,
        n: usize,
        components: &[ComponentType],
    ) -> Result<Vec<Entity>, Error> {
        if self.locked() {
            return Err(Error::Locked);
        }
        if components.is_empty() {
            return Err(Error::NoComponents);
        }
        if n == 0 {
            return Ok(Vec::new());
        }

        let sorted = self.sorted_by_bit(components)?;
        let archetype = self.archetype_for(components)?;

        let entities = {
            let mut index = self.index.borrow_mut();
            let entities = archetype.table().new_entries(n, &mut index, archetype.id());
            for entity in &entities {
                index.set_components(*entity, sorted.clone());
            }
            entities
        };

        log::trace!(
            "created {n} entities in archetype {}",
            archetype.id().raw()
        );
        Ok(entities)
    }

    /// Create entities now, or queue the creation if the storage is locked.
    pub fn enqueue_new_entities(
        &self,
        n: usize,
        components: &[ComponentType],
    ) -> Result<(), Error> {
        self.check_drain_error()?;
        if !self.locked() {
            return self.new_entities_unchecked(n, components).map(|_| ());
        }
        self.queue.borrow_mut().push_create(n, components.to_vec());
        Ok(())
    }

    /// Destroy the given entities, recycling their IDs. Stale handles are
    /// skipped silently.
    pub fn destroy_entities(&self, entities: &[Entity]) -> Result<(), Error> {
        self.check_drain_error()?;
        self.destroy_unchecked(entities)
    }

    fn destroy_unchecked(&self, entities: &[Entity]) -> Result<(), Error> {
        if self.locked() {
            return Err(Error::Locked);
        }

        // Group rows per archetype so each table deletes its rows in one
        // largest-first pass.
        let mut groups: HashMap<ArchetypeId, Vec<usize>> = HashMap::new();
        let mut callbacks = Vec::new();
        {
            let mut index = self.index.borrow_mut();
            for &entity in entities {
                let Some(slot) = index.slot_mut(entity) else {
                    continue;
                };
                let Some(location) = slot.location else {
                    continue;
                };
                if let Some(callback) = slot.on_destroy.take() {
                    callbacks.push((callback, entity));
                }
                groups.entry(location.archetype).or_default().push(location.row);
            }
        }

        for (archetype_id, rows) in groups {
            let archetype = self.archetype(archetype_id);
            let mut index = self.index.borrow_mut();
            archetype.table().delete_rows(&rows, &mut index)?;
        }

        // Callbacks run after every internal borrow is released; the
        // handles they receive are already stale.
        for (callback, entity) in callbacks {
            callback(entity);
        }
        Ok(())
    }

    /// Destroy entities now, or queue the destruction if the storage is
    /// locked.
    pub fn enqueue_destroy_entities(&self, entities: &[Entity]) -> Result<(), Error> {
        self.check_drain_error()?;
        if !self.locked() {
            return self.destroy_unchecked(entities);
        }
        let mut queue = self.queue.borrow_mut();
        for &entity in entities {
            queue.push_destroy(entity);
        }
        Ok(())
    }

    // ==================== Component mutation ====================

    /// Add a component to an entity, moving its row to the matching
    /// archetype. Adding a component the entity already has is a no-op;
    /// stale handles are ignored.
    pub fn add_component(
        &self,
        entity: Entity,
        component: impl Into<ComponentType>,
    ) -> Result<(), Error> {
        self.check_drain_error()?;
        self.add_component_unchecked(entity, component.into())
    }

    fn add_component_unchecked(
        &self,
        entity: Entity,
        component: ComponentType,
    ) -> Result<(), Error> {
        if self.locked() {
            return Err(Error::Locked);
        }
        let Some((source_id, row, mut components)) = self.place_of(entity) else {
            return Ok(());
        };
        let source = self.archetype(source_id);
        if source.table().contains(component) {
            return Ok(());
        }

        components.push(component);
        let components = self.sorted_by_bit(&components)?;
        let dest = self.archetype_for(&components)?;
        {
            let mut index = self.index.borrow_mut();
            source
                .table()
                .transfer_row(dest.table(), row, &mut index, dest.id())?;
            index.set_components(entity, components);
        }
        Ok(())
    }

    /// Add a component and write an initial value into the new column.
    ///
    /// If the entity already has the component this is a no-op and the
    /// value is dropped, matching [`add_component`](Self::add_component).
    pub fn add_component_with_value<T: Default + 'static>(
        &self,
        entity: Entity,
        component: Component<T>,
        value: T,
    ) -> Result<(), Error> {
        self.check_drain_error()?;
        self.add_with_value_unchecked(entity, component, value)
    }

    fn add_with_value_unchecked<T: Default + 'static>(
        &self,
        entity: Entity,
        component: Component<T>,
        value: T,
    ) -> Result<(), Error> {
        if self.locked() {
            return Err(Error::Locked);
        }
        let erased = component.erased();
        let Some((source_id, _, _)) = self.place_of(entity) else {
            return Ok(());
        };
        if self.archetype(source_id).table().contains(erased) {
            return Ok(());
        }

        self.add_component_unchecked(entity, erased)?;
        let (archetype, row) = self
            .locate(entity)
            .expect("entity disappeared during component add");
        archetype
            .table()
            .typed::<T>()
            .expect("column missing after component add")
            .write(row, value);
        Ok(())
    }

    /// Remove a component from an entity, moving its row to the matching
    /// archetype. Removing an absent component is a no-op; stale handles
    /// are ignored.
    pub fn remove_component(
        &self,
        entity: Entity,
        component: impl Into<ComponentType>,
    ) -> Result<(), Error> {
        self.check_drain_error()?;
        self.remove_component_unchecked(entity, component.into())
    }

    fn remove_component_unchecked(
        &self,
        entity: Entity,
        component: ComponentType,
    ) -> Result<(), Error> {
        if self.locked() {
            return Err(Error::Locked);
        }
        let Some((source_id, row, mut components)) = self.place_of(entity) else {
            return Ok(());
        };
        let source = self.archetype(source_id);
        if !source.table().contains(component) {
            return Ok(());
        }

        components.retain(|c| *c != component);
        let dest = self.archetype_for(&components)?;
        {
            let mut index = self.index.borrow_mut();
            source
                .table()
                .transfer_row(dest.table(), row, &mut index, dest.id())?;
            index.set_components(entity, components);
        }
        Ok(())
    }

    /// Add a component now, or queue the add if the storage is locked.
    pub fn enqueue_add_component(
        &self,
        entity: Entity,
        component: impl Into<ComponentType>,
    ) -> Result<(), Error> {
        self.check_drain_error()?;
        let component = component.into();
        if !self.locked() {
            return self.add_component_unchecked(entity, component);
        }
        self.queue.borrow_mut().push_mod(Op::Add {
            entity,
            component,
            write: None,
        });
        Ok(())
    }

    /// Add a component with an initial value now, or queue it if the
    /// storage is locked. The value is captured and written at drain time.
    pub fn enqueue_add_component_with_value<T: Default + 'static>(
        &self,
        entity: Entity,
        component: Component<T>,
        value: T,
    ) -> Result<(), Error> {
        self.check_drain_error()?;
        if !self.locked() {
            return self.add_with_value_unchecked(entity, component, value);
        }
        let write: CellWrite = Box::new(move |table: &table::Table, row: usize| {
            if let Some(column) = table.typed::<T>() {
                column.write(row, value);
            }
        });
        self.queue.borrow_mut().push_mod(Op::Add {
            entity,
            component: component.erased(),
            write: Some(write),
        });
        Ok(())
    }

    /// Remove a component now, or queue the removal if the storage is
    /// locked.
    pub fn enqueue_remove_component(
        &self,
        entity: Entity,
        component: impl Into<ComponentType>,
    ) -> Result<(), Error> {
        self.check_drain_error()?;
        let component = component.into();
        if !self.locked() {
            return self.remove_component_unchecked(entity, component);
        }
        self.queue.borrow_mut().push_mod(Op::Remove { entity, component });
        Ok(())
    }

    // ==================== Cross-storage transfer ====================

    /// Move entities into `target`, preserving all component values.
    ///
    /// The target archetype is resolved by composition mask, created on
    /// first use. Each storage owns its ID space, so every moved entity is
    /// re-homed under a fresh target-side handle; the new handles are
    /// returned in input order (stale inputs are skipped). The source rows
    /// are deleted and their IDs recycled.
    pub fn transfer_entities(
        &self,
        target: &Storage,
        entities: &[Entity],
    ) -> Result<Vec<Entity>, Error> {
        self.check_drain_error()?;
        if self.locked() || target.locked() {
            return Err(Error::Locked);
        }

        let mut moved = Vec::with_capacity(entities.len());
        for &entity in entities {
            let Some((source_id, row, components)) = self.place_of(entity) else {
                continue;
            };
            let source = self.archetype(source_id);
            let components = target.sorted_by_bit(&components)?;
            let dest = target.archetype_for(&components)?;

            let handle = {
                let mut target_index = target.index.borrow_mut();
                let handle = dest.table().new_entries(1, &mut target_index, dest.id())[0];
                let dest_row = dest.table().len() - 1;
                source.table().export_row(row, dest.table(), dest_row);
                target_index.set_components(handle, components);
                handle
            };
            {
                let mut index = self.index.borrow_mut();
                source.table().delete_rows(&[row], &mut index)?;
            }

            log::trace!(
                "transferred entity {} to target as {}",
                entity.id().raw(),
                handle.id().raw()
            );
            moved.push(handle);
        }
        Ok(moved)
    }

    // ==================== Entity inspection ====================

    /// Whether the handle refers to a live entity in this storage.
    pub fn valid(&self, entity: Entity) -> bool {
        entity.id().is_valid() && self.index.borrow().is_live(entity)
    }

    /// Rebuild the current handle for a raw entity ID in O(1), if that
    /// slot holds a live entity.
    pub fn entity(&self, raw_id: u32) -> Option<Entity> {
        self.index.borrow().entity(raw_id)
    }

    /// Borrow the entity's current row. The view holds its archetype alive
    /// and goes stale on the next structural mutation.
    pub fn entity_ref(&self, entity: Entity) -> Option<EntityRef> {
        let (archetype, row) = self.locate(entity)?;
        Some(EntityRef::new(archetype, row))
    }

    /// The entity's components, sorted by schema bit.
    pub fn components(&self, entity: Entity) -> Vec<ComponentType> {
        self.index
            .borrow()
            .slot(entity)
            .map(|slot| slot.components.clone())
            .unwrap_or_default()
    }

    /// The entity's component names, alphabetized, as `[A, B, C]`.
    pub fn components_as_string(&self, entity: Entity) -> String {
        let components = self.components(entity);
        let mut names: Vec<&str> = components.iter().map(|c| c.short_name()).collect();
        names.sort_unstable();
        format!("[{}]", names.join(", "))
    }

    // ==================== Relationships ====================

    /// Record `parent` as the entity's parent and install `callback` as the
    /// parent's destroy callback. The parent reference is weak: it carries
    /// a generation snapshot and lapses once the parent is recycled.
    ///
    /// Fails with [`Error::AlreadyHasParent`] if a parent is already set.
    pub fn set_parent(
        &self,
        child: Entity,
        parent: Entity,
        callback: impl Fn(Entity) + 'static,
    ) -> Result<(), Error> {
        let mut index = self.index.borrow_mut();
        {
            let Some(slot) = index.slot_mut(child) else {
                return Ok(());
            };
            if slot.parent.is_some() {
                return Err(Error::AlreadyHasParent);
            }
            slot.parent = Some(parent);
        }
        if let Some(parent_slot) = index.slot_mut(parent) {
            parent_slot.on_destroy = Some(Box::new(callback));
        }
        Ok(())
    }

    /// The entity's parent, if one was set and has not been recycled since.
    pub fn parent(&self, child: Entity) -> Option<Entity> {
        let index = self.index.borrow();
        let parent = index.slot(child)?.parent?;
        if index.slot(parent).is_some() {
            Some(parent)
        } else {
            None
        }
    }

    /// Install a callback invoked when the entity is destroyed, replacing
    /// any previous one. Stale handles are ignored.
    pub fn set_destroy_callback(
        &self,
        entity: Entity,
        callback: impl Fn(Entity) + 'static,
    ) -> Result<(), Error> {
        if let Some(slot) = self.index.borrow_mut().slot_mut(entity) {
            slot.on_destroy = Some(Box::new(callback));
        }
        Ok(())
    }

    // ==================== Locking ====================

    /// Whether any lock bit is held.
    pub fn locked(&self) -> bool {
        !self.locks.borrow().is_empty()
    }

    /// Set one lock bit.
    pub fn add_lock(&self, bit: u32) {
        self.locks.borrow_mut().mark(bit);
    }

    /// Clear one lock bit. When the last bit clears, the deferred queue
    /// drains. This call is infallible; a drain failure is surfaced from
    /// the next fallible call on the storage.
    pub fn remove_lock(&self, bit: u32) {
        let unlocked = {
            let mut locks = self.locks.borrow_mut();
            locks.unmark(bit);
            locks.is_empty()
        };
        if unlocked {
            self.drain();
        }
    }

    /// Claim the lowest free lock bit for a cursor.
    pub(crate) fn acquire_cursor_lock(&self) -> Result<u32, Error> {
        let mut locks = self.locks.borrow_mut();
        let bit = locks.first_clear().ok_or(Error::CapacityExceeded {
            limit: MAX_COMPONENT_TYPES,
        })?;
        locks.mark(bit);
        Ok(bit)
    }

    // ==================== Internals ====================

    /// The entity's archetype and row, with the archetype held alive.
    pub(crate) fn locate(&self, entity: Entity) -> Option<(Rc<Archetype>, usize)> {
        let location = self.index.borrow().location(entity)?;
        let archetype = self.archetypes.borrow().get(location.archetype)?;
        Some((archetype, location.row))
    }

    fn place_of(&self, entity: Entity) -> Option<(ArchetypeId, usize, Vec<ComponentType>)> {
        let index = self.index.borrow();
        let slot = index.slot(entity)?;
        let location = slot.location?;
        Some((location.archetype, location.row, slot.components.clone()))
    }

    fn archetype(&self, id: ArchetypeId) -> Rc<Archetype> {
        self.archetypes
            .borrow()
            .get(id)
            .expect("live entity points at unknown archetype")
    }

    /// Register and sort a composition by schema bit, dropping duplicates.
    fn sorted_by_bit(&self, components: &[ComponentType]) -> Result<Vec<ComponentType>, Error> {
        let mut keyed: Vec<(u32, ComponentType)> = Vec::with_capacity(components.len());
        for &component in components {
            keyed.push((self.schema.register(component)?, component));
        }
        keyed.sort_unstable_by_key(|(bit, _)| *bit);
        keyed.dedup_by_key(|(bit, _)| *bit);
        Ok(keyed.into_iter().map(|(_, component)| component).collect())
    }

    fn check_drain_error(&self) -> Result<(), Error> {
        match self.drain_error.borrow_mut().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Apply every queued operation. On failure the drain aborts, the
    /// remaining operations are discarded, and the error is held for the
    /// next fallible call.
    fn drain(&self) {
        let ops = self.queue.borrow_mut().take_all();
        if ops.is_empty() {
            return;
        }
        log::debug!("draining {} deferred operation(s)", ops.len());
        for op in ops {
            if let Err(error) = self.apply(op) {
                log::warn!("deferred drain aborted: {error}");
                *self.drain_error.borrow_mut() = Some(error);
                break;
            }
        }
    }

    fn apply(&self, op: Op) -> Result<(), Error> {
        match op {
            Op::Create { count, components } => {
                self.new_entities_unchecked(count, &components).map(|_| ())
            }
            Op::Add {
                entity,
                component,
                write,
            } => {
                if !self.valid(entity) {
                    return Ok(());
                }
                let already_present = self
                    .locate(entity)
                    .map(|(archetype, _)| archetype.table().contains(component))
                    .unwrap_or(false);
                self.add_component_unchecked(entity, component)?;
                if !already_present {
                    if let Some(write) = write {
                        if let Some((archetype, row)) = self.locate(entity) {
                            write(archetype.table(), row);
                        }
                    }
                }
                Ok(())
            }
            Op::Remove { entity, component } => {
                if !self.valid(entity) {
                    return Ok(());
                }
                self.remove_component_unchecked(entity, component)
            }
            Op::Destroy { entity } => {
                if !self.valid(entity) {
                    return Ok(());
                }
                self.destroy_unchecked(&[entity])
            }
        }
    }
}
