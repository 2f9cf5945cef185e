//! Incremental object store
//!
//! A copy-on-write layer over an immutable [`BaseCatalog`]. Edited objects live
//! in a [`ChangeOverlay`] until the revision is written out or discarded, and
//! new references are handed out by a [`ReferenceAllocator`] that prefers
//! reusing free cross-reference slots over minting new numbers.
//!
//! # Example
//!
//! ```rust
//! use oxidize_pdf_kernel::objects::{Object, ObjectType};
//! use oxidize_pdf_kernel::store::{IndirectObjectStore, MemoryCatalog, StoreOptions};
//!
//! # fn main() -> oxidize_pdf_kernel::Result<()> {
//! let catalog = MemoryCatalog::empty();
//! let mut store = IndirectObjectStore::new(catalog, StoreOptions::default());
//!
//! let (id, _) = store.create_object(ObjectType::Array)?;
//! store.change(id, &Object::Array(vec![1.into(), 2.into()]))?;
//! assert_eq!(store.num_objects(), 1);
//! # Ok(())
//! # }
//! ```

mod allocator;
mod catalog;
mod indirect;
mod memory;
mod overlay;

pub use allocator::ReferenceAllocator;
pub use catalog::{BaseCatalog, EntryKind, XRefEntry};
pub use indirect::IndirectObjectStore;
pub use memory::{MemoryCatalog, Revision};
pub use overlay::{ChangeOverlay, ObjectEntry};

/// Largest object number a cross-reference table can address
pub const MAX_OBJECT_NUMBER: u32 = 8_388_607;

/// Largest generation number a cross-reference entry can carry
pub const MAX_GENERATION: u16 = 65_535;

/// Lifecycle of a reference within one editing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefState {
    /// Not known to the store
    Unused,
    /// Handed out by the allocator, no value stored yet
    Reserved,
    /// Holds a value, either from the base catalog or from the overlay
    Initialized,
}

/// Configuration options for the object store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Object numbers at or above this bound are never allocated
    pub max_object_number: u32,
    /// Free slots whose generation reached this bound are not reused
    pub max_generation: u16,
    /// Deepest container nesting a stored value may have
    pub max_nesting_depth: Option<usize>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_object_number: MAX_OBJECT_NUMBER,
            max_generation: MAX_GENERATION,
            max_nesting_depth: None,
        }
    }
}

impl StoreOptions {
    pub fn with_max_object_number(mut self, max: u32) -> Self {
        self.max_object_number = max;
        self
    }

    pub fn with_max_generation(mut self, max: u16) -> Self {
        self.max_generation = max;
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = Some(depth);
        self
    }
}
