//! The deferred operation queue.
//!
//! Structural mutations that arrive while a storage is locked are recorded
//! here and drained when the last lock bit clears. The queue is phased:
//! entity creations apply first, then component adds/removes, then
//! destroys, each phase in insertion order.
//!
//! Intent is coalesced at enqueue time:
//! - a queued destroy voids any earlier queued add/remove for the same
//!   entity, and later add/removes for it are dropped silently;
//! - a second add/remove for the same entity overwrites the first in place,
//!   keeping only the latest intent.
//!
//! Entity-bearing operations carry the `{id, generation}` handle and are
//! re-validated against the directory at drain time, so operations against
//! entities destroyed in the meantime degrade to no-ops.

use std::collections::HashSet;

use crate::component::ComponentType;
use crate::entity::Entity;
use crate::storage::table::Table;

/// Writes one captured component value into a table row. Produced by the
/// typed enqueue path so the queue never inspects value types.
pub(crate) type CellWrite = Box<dyn FnOnce(&Table, usize)>;

/// A deferred structural mutation.
pub(crate) enum Op {
    /// Create `count` entities with the given composition.
    Create {
        count: usize,
        components: Vec<ComponentType>,
    },

    /// Add a component to an entity, optionally writing a captured value
    /// into the new column afterwards.
    Add {
        entity: Entity,
        component: ComponentType,
        write: Option<CellWrite>,
    },

    /// Remove a component from an entity.
    Remove {
        entity: Entity,
        component: ComponentType,
    },

    /// Destroy an entity.
    Destroy { entity: Entity },
}

impl Op {
    fn entity(&self) -> Option<Entity> {
        match self {
            Op::Create { .. } => None,
            Op::Add { entity, .. } | Op::Remove { entity, .. } | Op::Destroy { entity } => {
                Some(*entity)
            }
        }
    }
}

/// The phased, coalescing queue of deferred operations.
#[derive(Default)]
pub(crate) struct OpQueue {
    creates: Vec<Op>,
    mods: Vec<Op>,
    destroys: Vec<Op>,

    /// Entities with a queued destroy; add/removes for these are dropped.
    doomed: HashSet<Entity>,
}

impl OpQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The total number of queued operations.
    pub fn len(&self) -> usize {
        self.creates.len() + self.mods.len() + self.destroys.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue an entity creation.
    pub fn push_create(&mut self, count: usize, components: Vec<ComponentType>) {
        self.creates.push(Op::Create { count, components });
    }

    /// Queue a component add or remove, coalescing per entity.
    pub fn push_mod(&mut self, op: Op) {
        let entity = op.entity().expect("component op without an entity");
        if self.doomed.contains(&entity) {
            return;
        }
        if let Some(position) = self
            .mods
            .iter()
            .position(|queued| queued.entity() == Some(entity))
        {
            self.mods[position] = op;
        } else {
            self.mods.push(op);
        }
    }

    /// Queue a destroy, voiding any queued add/removes for the entity.
    pub fn push_destroy(&mut self, entity: Entity) {
        if !self.doomed.insert(entity) {
            return;
        }
        self.mods
            .retain(|queued| queued.entity() != Some(entity));
        self.destroys.push(Op::Destroy { entity });
    }

    /// Take every queued operation in drain order, leaving the queue empty.
    pub fn take_all(&mut self) -> Vec<Op> {
        self.doomed.clear();
        let mut ops = Vec::with_capacity(self.len());
        ops.append(&mut self.creates);
        ops.append(&mut self.mods);
        ops.append(&mut self.destroys);
        ops
    }
}
