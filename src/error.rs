use thiserror::Error;

/// Errors surfaced by the storage API.
///
/// All failures are returned values at the API boundary. Invariant
/// violations inside the table layer (column length drift, dangling row
/// indices) are programmer bugs: they trip `debug_assert!`s in debug builds
/// and are reported as [`Error::IndexOutOfRange`] otherwise.
#[derive(Debug, Error)]
pub enum Error {
    /// A structural mutation was attempted while one or more lock bits were
    /// held. Use the `enqueue_*` variants to defer the operation instead.
    #[error("storage is locked; use the enqueue variants while iterating")]
    Locked,

    /// The schema bit pool (or the cursor lock-bit pool) is exhausted.
    #[error("capacity exceeded ({limit} slots)")]
    CapacityExceeded {
        /// The fixed bound that was hit.
        limit: usize,
    },

    /// `set_parent` was called on an entity that already has a parent.
    #[error("entity already has a parent")]
    AlreadyHasParent,

    /// Entities cannot be created without at least one component.
    #[error("cannot create entities without any components")]
    NoComponents,

    /// A row index did not resolve inside its table.
    #[error("row index {index} out of range for table of length {len}")]
    IndexOutOfRange {
        /// The offending row index.
        index: usize,
        /// The table length at the time of the failure.
        len: usize,
    },
}
