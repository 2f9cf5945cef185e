use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId};
use crate::store::{BaseCatalog, XRefEntry};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// One incremental update: the objects it writes, the slots it frees and its
/// trailer. Older revisions are reached through the trailer's `/Prev` offset.
///
/// `freed` is filled in when building a catalog by hand (see
/// [`MemoryCatalog::free`]); the object store never deletes objects, so the
/// revisions it produces leave it empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Revision {
    pub objects: BTreeMap<ObjectId, Object>,
    /// Freed object numbers with the generation to use on reuse
    pub freed: BTreeMap<u32, u16>,
    pub trailer: Dictionary,
}

impl Revision {
    pub fn new(trailer: Dictionary) -> Self {
        Self {
            trailer,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.freed.is_empty()
    }

    /// Offset of the previous revision, if the trailer names one.
    pub fn prev_offset(&self) -> Option<u64> {
        self.trailer
            .get("Prev")
            .and_then(Object::as_integer)
            .and_then(|offset| u64::try_from(offset).ok())
    }
}

#[derive(Debug, Clone, Default)]
struct CatalogView {
    entries: BTreeMap<u32, XRefEntry>,
    objects: HashMap<ObjectId, Object>,
    trailer: Dictionary,
    size: u32,
    object_count: usize,
}

/// In-memory stack of revisions keyed by the offset of their
/// cross-reference section.
///
/// The current view merges the revision at the selected offset with every
/// revision reachable through `/Prev`; the newest mention of an object number
/// wins.
#[derive(Debug, Clone)]
pub struct MemoryCatalog {
    revisions: BTreeMap<u64, Revision>,
    current: u64,
    view: CatalogView,
}

impl MemoryCatalog {
    /// Catalog with a single empty revision at offset 0.
    pub fn new(trailer: Dictionary) -> Self {
        let mut revisions = BTreeMap::new();
        revisions.insert(0, Revision::new(trailer));
        let mut catalog = Self {
            revisions,
            current: 0,
            view: CatalogView::default(),
        };
        catalog.refresh();
        catalog
    }

    pub fn empty() -> Self {
        Self::new(Dictionary::new())
    }

    pub fn with_object(mut self, id: ObjectId, value: impl Into<Object>) -> Self {
        self.insert(id, value);
        self
    }

    pub fn with_free(mut self, number: u32, generation: u16) -> Self {
        self.free(number, generation);
        self
    }

    /// Writes `value` into the current revision.
    pub fn insert(&mut self, id: ObjectId, value: impl Into<Object>) {
        if let Some(revision) = self.revisions.get_mut(&self.current) {
            revision.freed.remove(&id.number());
            revision.objects.insert(id, value.into());
        }
        self.refresh();
    }

    /// Marks `number` free in the current revision.
    pub fn free(&mut self, number: u32, generation: u16) {
        if let Some(revision) = self.revisions.get_mut(&self.current) {
            revision.objects.retain(|id, _| id.number() != number);
            revision.freed.insert(number, generation);
        }
        self.refresh();
    }

    pub fn set_trailer_entry(&mut self, key: &str, value: impl Into<Object>) {
        if let Some(revision) = self.revisions.get_mut(&self.current) {
            revision.trailer.set(key, value);
        }
        self.refresh();
    }

    /// Stores `revision` at `offset` without switching the view to it.
    pub fn append_revision(&mut self, offset: u64, revision: Revision) -> Result<()> {
        if self.revisions.contains_key(&offset) {
            return Err(PdfError::InvalidOperation(format!(
                "a revision already starts at offset {offset}"
            )));
        }
        debug!(
            offset,
            objects = revision.objects.len(),
            "appending revision"
        );
        self.revisions.insert(offset, revision);
        Ok(())
    }

    pub fn current_offset(&self) -> u64 {
        self.current
    }

    pub fn latest_offset(&self) -> u64 {
        self.revisions.keys().next_back().copied().unwrap_or(0)
    }

    pub fn revision_offsets(&self) -> Vec<u64> {
        self.revisions.keys().copied().collect()
    }

    fn refresh(&mut self) {
        match self.build_view(self.current) {
            Ok(view) => self.view = view,
            Err(e) => warn!("failed to rebuild catalog view at {}: {e}", self.current),
        }
    }

    fn build_view(&self, offset: u64) -> Result<CatalogView> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(offset);
        while let Some(at) = next {
            if !visited.insert(at) {
                warn!("revision chain loops back to offset {at}");
                break;
            }
            let revision = self
                .revisions
                .get(&at)
                .ok_or_else(|| PdfError::NotFound(format!("xref revision at offset {at}")))?;
            chain.push(revision);
            next = revision.prev_offset();
        }

        let mut view = CatalogView::default();
        for revision in &chain {
            for (id, value) in &revision.objects {
                if !view.entries.contains_key(&id.number()) {
                    view.entries
                        .insert(id.number(), XRefEntry::in_use(id.generation()));
                    view.objects.insert(*id, value.clone());
                }
            }
            for (&number, &generation) in &revision.freed {
                view.entries
                    .entry(number)
                    .or_insert(XRefEntry::free(generation));
            }
        }

        view.trailer = chain
            .first()
            .map(|revision| revision.trailer.clone())
            .unwrap_or_default();
        let declared = view
            .trailer
            .get("Size")
            .and_then(Object::as_integer)
            .and_then(|size| u32::try_from(size).ok())
            .unwrap_or(0);
        let covered = view
            .entries
            .keys()
            .next_back()
            .map(|number| number + 1)
            .unwrap_or(1);
        view.size = declared.max(covered);
        view.object_count = view
            .entries
            .values()
            .filter(|entry| entry.kind.is_in_use())
            .count();

        Ok(view)
    }
}

impl BaseCatalog for MemoryCatalog {
    fn fetch(&self, id: ObjectId) -> Result<Object> {
        if id.number() == 0 {
            return Err(PdfError::InvalidObjectReference(0, id.generation()));
        }
        Ok(self.view.objects.get(&id).cloned().unwrap_or(Object::Null))
    }

    fn object_count(&self) -> usize {
        self.view.object_count
    }

    fn size(&self) -> u32 {
        self.view.size
    }

    fn entry(&self, number: u32) -> Option<XRefEntry> {
        self.view.entries.get(&number).copied()
    }

    fn trailer(&self) -> &Dictionary {
        &self.view.trailer
    }

    fn check_revision(&self, offset: u64) -> Result<()> {
        self.build_view(offset).map(|_| ())
    }

    fn destroy_internals(&mut self) {
        self.view = CatalogView::default();
    }

    fn init_internals(&mut self, offset: u64) -> Result<()> {
        let view = self.build_view(offset)?;
        debug!(
            offset,
            size = view.size,
            objects = view.object_count,
            "catalog view initialized"
        );
        self.view = view;
        self.current = offset;
        Ok(())
    }
}
