use std::any::TypeId as StdTypeId;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::component::mask::MAX_COMPONENT_TYPES;
use crate::component::ComponentType;
use crate::error::Error;

/// Assigns a stable, dense bit index to each registered component type.
///
/// Registration is idempotent: registering a known type returns its existing
/// bit. Bits are assigned in registration order starting at zero and are
/// immutable for the schema's lifetime. The pool is bounded; registration
/// fails with [`Error::CapacityExceeded`] once every bit is in use.
///
/// Registration is keyed by the component's `std::any::TypeId`, so the same
/// Rust type always resolves to the same bit within one schema, while two
/// schemas are free to assign the same type different bits.
pub struct Schema {
    /// Map from Rust type to assigned bit. Lock-free reads on the hot path.
    bits: DashMap<StdTypeId, u32>,

    /// Next unassigned bit.
    next: AtomicU32,

    /// Upper bound on assignable bits.
    limit: usize,
}

impl Schema {
    /// Create a schema with the default component bound.
    pub fn new() -> Self {
        Self::with_limit(MAX_COMPONENT_TYPES)
    }

    /// Create a schema with a custom bit pool bound. The bound may not
    /// exceed [`MAX_COMPONENT_TYPES`], which is the mask width.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            bits: DashMap::new(),
            next: AtomicU32::new(0),
            limit: limit.min(MAX_COMPONENT_TYPES),
        }
    }

    /// Register a component type, returning its bit. Idempotent.
    pub fn register(&self, component: ComponentType) -> Result<u32, Error> {
        // Fast path: already registered.
        if let Some(bit) = self.bits.get(&component.type_id()) {
            return Ok(*bit);
        }

        match self.bits.entry(component.type_id()) {
            Entry::Occupied(occupied) => Ok(*occupied.get()),
            Entry::Vacant(vacant) => {
                let bit = self.next.fetch_add(1, Ordering::Relaxed);
                if bit as usize >= self.limit {
                    return Err(Error::CapacityExceeded { limit: self.limit });
                }
                vacant.insert(bit);
                Ok(bit)
            }
        }
    }

    /// Look up the bit for a component type without registering it.
    pub fn bit_for(&self, component: ComponentType) -> Option<u32> {
        self.bits.get(&component.type_id()).map(|bit| *bit)
    }

    /// The number of registered component types.
    pub fn len(&self) -> usize {
        (self.next.load(Ordering::Relaxed) as usize).min(self.limit)
    }

    /// Whether no component types are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The schema's bit pool bound.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::component::component;
    use crate::error::Error;

    use super::*;

    #[derive(Default)]
    struct Position {
        #[allow(dead_code)]
        x: f64,
        #[allow(dead_code)]
        y: f64,
    }

    #[derive(Default)]
    struct Velocity {
        #[allow(dead_code)]
        x: f64,
        #[allow(dead_code)]
        y: f64,
    }

    #[derive(Default)]
    struct Health {
        #[allow(dead_code)]
        current: i32,
    }

    #[test]
    fn register_assigns_dense_bits() {
        // Given
        let schema = Schema::new();

        // When
        let pos = schema.register(component::<Position>().erased()).unwrap();
        let vel = schema.register(component::<Velocity>().erased()).unwrap();
        let health = schema.register(component::<Health>().erased()).unwrap();

        // Then
        assert_eq!(pos, 0);
        assert_eq!(vel, 1);
        assert_eq!(health, 2);
        assert_eq!(schema.len(), 3);
    }

    #[test]
    fn register_is_idempotent() {
        // Given
        let schema = Schema::new();

        // When
        let first = schema.register(component::<Position>().erased()).unwrap();
        let second = schema.register(component::<Position>().erased()).unwrap();

        // Then
        assert_eq!(first, second);
        assert_eq!(schema.len(), 1);
    }

    #[test]
    fn bit_for_unregistered_is_none() {
        // Given
        let schema = Schema::new();

        // Then
        assert_eq!(schema.bit_for(component::<Position>().erased()), None);

        // When
        schema.register(component::<Position>().erased()).unwrap();

        // Then
        assert_eq!(schema.bit_for(component::<Position>().erased()), Some(0));
    }

    #[test]
    fn capacity_exceeded_past_the_limit() {
        // Given
        let schema = Schema::with_limit(2);

        // When
        schema.register(component::<Position>().erased()).unwrap();
        schema.register(component::<Velocity>().erased()).unwrap();
        let result = schema.register(component::<Health>().erased());

        // Then
        assert!(matches!(
            result,
            Err(Error::CapacityExceeded { limit: 2 })
        ));

        // Existing registrations survive
        assert_eq!(schema.bit_for(component::<Position>().erased()), Some(0));
        assert_eq!(schema.bit_for(component::<Velocity>().erased()), Some(1));
    }

    #[test]
    fn separate_schemas_assign_bits_independently() {
        // Given
        let first = Schema::new();
        let second = Schema::new();

        // When
        first.register(component::<Position>().erased()).unwrap();
        let pos_in_first = first.register(component::<Velocity>().erased()).unwrap();
        let pos_in_second = second.register(component::<Velocity>().erased()).unwrap();

        // Then
        assert_eq!(pos_in_first, 1);
        assert_eq!(pos_in_second, 0);
    }
}
