//! Archetype identity and the mask-keyed registry.
//!
//! An archetype is the unique table for one exact component composition
//! within a storage. The registry interns archetypes by
//! [`ComponentMask`]: the first request for a composition creates the
//! table, every later request resolves to the same archetype regardless of
//! the order components were listed. Archetypes are created lazily and
//! never destroyed for the storage's lifetime; their IDs are dense,
//! 1-based, and never reused.

use std::collections::HashMap;
use std::rc::Rc;

use crate::component::{ComponentMask, ComponentType, Schema};
use crate::error::Error;
use crate::storage::table::Table;

/// A unique identifier for an archetype within one storage. IDs start at
/// one and increase in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// Construct an id from its raw value.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw identifier value.
    #[inline]
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// The registry index for this id.
    #[inline]
    pub(crate) fn index(&self) -> usize {
        debug_assert!(self.0 != 0, "archetype ids are 1-based");
        (self.0 - 1) as usize
    }
}

/// The unique table for one component composition, tagged with its
/// registry-assigned id.
pub struct Archetype {
    id: ArchetypeId,
    table: Table,
}

impl Archetype {
    pub(crate) fn new(id: ArchetypeId, table: Table) -> Self {
        Self { id, table }
    }

    /// The archetype's registry id.
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The archetype's column store.
    #[inline]
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// The number of entities in the archetype.
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the archetype holds no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// The archetype's composition mask.
    #[inline]
    pub fn mask(&self) -> &ComponentMask {
        self.table.mask()
    }
}

/// The mask-keyed archetype registry of one storage.
pub(crate) struct Archetypes {
    /// Archetypes in creation order, indexed by `ArchetypeId - 1`.
    list: Vec<Rc<Archetype>>,

    /// Intern map from composition mask to archetype id.
    by_mask: HashMap<ComponentMask, ArchetypeId>,

    /// The next id to assign.
    next_id: u32,
}

impl Archetypes {
    pub fn new() -> Self {
        Self {
            list: Vec::new(),
            by_mask: HashMap::new(),
            next_id: 1,
        }
    }

    /// Resolve the archetype for the given components, creating it on first
    /// use. Components are registered in the schema as a side effect; the
    /// new table's column order is the caller's input order, deduplicated.
    pub fn get_or_create(
        &mut self,
        schema: &Schema,
        components: &[ComponentType],
    ) -> Result<Rc<Archetype>, Error> {
        let mut mask = ComponentMask::new();
        let mut types: Vec<ComponentType> = Vec::with_capacity(components.len());
        for &component in components {
            let bit = schema.register(component)?;
            if !mask.contains(bit) {
                types.push(component);
            }
            mask.mark(bit);
        }

        if let Some(id) = self.by_mask.get(&mask) {
            return Ok(self.list[id.index()].clone());
        }

        let id = ArchetypeId::new(self.next_id);
        self.next_id += 1;
        let archetype = Rc::new(Archetype::new(id, Table::new(types, mask.clone())));
        self.list.push(archetype.clone());
        self.by_mask.insert(mask, id);
        log::debug!(
            "created archetype {} with {} component(s)",
            id.raw(),
            archetype.table().column_types().len()
        );
        Ok(archetype)
    }

    /// Look up an archetype by id.
    pub fn get(&self, id: ArchetypeId) -> Option<Rc<Archetype>> {
        self.list.get(id.index()).cloned()
    }

    /// All archetypes in id order.
    pub fn snapshot(&self) -> Vec<Rc<Archetype>> {
        self.list.clone()
    }
}

impl Default for Archetypes {
    fn default() -> Self {
        Self::new()
    }
}
