use crate::error::Result;
use crate::objects::{Dictionary, Object, ObjectId};
use crate::store::RefState;

/// Kind of a cross-reference slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Released slot; its generation is the one to use on reuse
    Free,
    /// Object stored at a byte offset
    InUse,
    /// Object stored inside an object stream
    Compressed,
}

impl EntryKind {
    pub fn is_in_use(&self) -> bool {
        !matches!(self, EntryKind::Free)
    }
}

/// One slot of a cross-reference table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XRefEntry {
    pub kind: EntryKind,
    pub generation: u16,
}

impl XRefEntry {
    pub fn free(generation: u16) -> Self {
        Self {
            kind: EntryKind::Free,
            generation,
        }
    }

    pub fn in_use(generation: u16) -> Self {
        Self {
            kind: EntryKind::InUse,
            generation,
        }
    }

    pub fn compressed() -> Self {
        Self {
            kind: EntryKind::Compressed,
            generation: 0,
        }
    }
}

/// Read-only view of the objects a document held when it was loaded.
///
/// Implementations are owned by an
/// [`IndirectObjectStore`](crate::store::IndirectObjectStore), which only
/// mutates them through [`destroy_internals`](BaseCatalog::destroy_internals)
/// and [`init_internals`](BaseCatalog::init_internals) when reopening.
pub trait BaseCatalog {
    /// Value of `id` as stored in the file, or [`Object::Null`] if the
    /// catalog has no such object.
    fn fetch(&self, id: ObjectId) -> Result<Object>;

    /// Number of in-use objects.
    fn object_count(&self) -> usize;

    /// Number of cross-reference slots, including free ones.
    fn size(&self) -> u32;

    /// Slot for `number`; `None` when the table does not cover it.
    fn entry(&self, number: u32) -> Option<XRefEntry>;

    fn trailer(&self) -> &Dictionary;

    fn knows_ref(&self, id: ObjectId) -> RefState {
        match self.entry(id.number()) {
            Some(entry) if entry.kind.is_in_use() && entry.generation == id.generation() => {
                RefState::Initialized
            }
            _ => RefState::Unused,
        }
    }

    /// Checks that a revision starts at `offset` without touching the
    /// current view.
    fn check_revision(&self, offset: u64) -> Result<()>;

    /// Drops the current view of the cross-reference data.
    fn destroy_internals(&mut self);

    /// Builds the view of the revision whose cross-reference section starts
    /// at `offset`.
    fn init_internals(&mut self, offset: u64) -> Result<()>;
}
