use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId, ObjectType, Resolve};
use crate::store::{
    BaseCatalog, ChangeOverlay, ReferenceAllocator, RefState, Revision, StoreOptions,
};
use tracing::{debug, error, info};

/// Copy-on-write store of indirect objects.
///
/// Reads fall through the overlay to the base catalog. Every value going in
/// or coming out is an independent copy, so callers can never alias the
/// stored state.
#[derive(Debug)]
pub struct IndirectObjectStore<C: BaseCatalog> {
    catalog: C,
    allocator: ReferenceAllocator,
    overlay: ChangeOverlay,
    trailer: Dictionary,
    options: StoreOptions,
    last_xref_offset: u64,
}

impl<C: BaseCatalog> IndirectObjectStore<C> {
    /// Wraps an already initialized catalog view.
    pub fn new(catalog: C, options: StoreOptions) -> Self {
        let trailer = catalog.trailer().clone();
        Self {
            catalog,
            allocator: ReferenceAllocator::new(),
            overlay: ChangeOverlay::new(),
            trailer,
            options,
            last_xref_offset: 0,
        }
    }

    /// Initializes the catalog view at `offset` and wraps it.
    pub fn open(mut catalog: C, offset: u64, options: StoreOptions) -> Result<Self> {
        catalog.init_internals(offset)?;
        let mut store = Self::new(catalog, options);
        store.last_xref_offset = offset;
        Ok(store)
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Mutable access for appending revisions; the view itself only changes
    /// through [`reopen`](Self::reopen).
    pub fn catalog_mut(&mut self) -> &mut C {
        &mut self.catalog
    }

    pub fn allocator(&self) -> &ReferenceAllocator {
        &self.allocator
    }

    /// Current value of `id`, Null when nothing is stored for it.
    pub fn fetch(&self, id: ObjectId) -> Result<Object> {
        debug!("fetch {id}");
        check_addressable(id)?;

        match self.overlay.get(id) {
            Some(value) => value.deep_copy(self.options.max_nesting_depth),
            None => self.catalog.fetch(id),
        }
    }

    /// Stores a copy of `value` as the new value of `id`.
    ///
    /// Returns the previous overlay value; base catalog values are never
    /// returned here because they are not owned by the overlay.
    pub fn change(&mut self, id: ObjectId, value: &Object) -> Result<Option<Object>> {
        debug!("change {id} to {}", value.type_name());
        check_addressable(id)?;
        if value.is_reference() {
            return Err(PdfError::type_mismatch("direct object", "reference"));
        }

        let copy = value.deep_copy(self.options.max_nesting_depth)?;
        let previous = self.overlay.install(id, copy);
        if self.allocator.mark_initialized(id) {
            debug!("{id} is now initialized");
        }
        Ok(previous)
    }

    pub fn reserve(&mut self) -> Result<ObjectId> {
        self.allocator.reserve(&self.catalog, &self.options)
    }

    /// Reserves a reference and builds the default value for `object_type`.
    ///
    /// The value is not stored; pass it to [`change`](Self::change) once it
    /// has been filled in.
    pub fn create_object(&mut self, object_type: ObjectType) -> Result<(ObjectId, Object)> {
        debug!("create_object {object_type}");
        let value = object_type.default_value().ok_or_else(|| {
            PdfError::InvalidOperation(format!("cannot create an indirect {object_type}"))
        })?;
        let id = self.reserve()?;
        Ok((id, value))
    }

    pub fn knows_ref(&self, id: ObjectId) -> RefState {
        match self.allocator.state(id) {
            RefState::Unused => self.catalog.knows_ref(id),
            state => state,
        }
    }

    /// Whether `second` may replace `first`, comparing tags after one
    /// reference hop on each side.
    ///
    /// A reference `first` whose target does not exist accepts anything; a
    /// dangling `second` gets no such leniency.
    pub fn type_safe(&self, first: &Object, second: &Object) -> Result<bool> {
        let first_type = self.direct_type(first)?;
        let second_type = self.direct_type(second)?;

        let compatible = first_type == second_type
            || (first.is_reference() && first_type == ObjectType::Null);
        debug!("type_safe({first_type}, {second_type}) = {compatible}");
        Ok(compatible)
    }

    fn direct_type(&self, value: &Object) -> Result<ObjectType> {
        match value {
            Object::Reference(id) => Ok(self.fetch(*id)?.object_type()),
            other => Ok(other.object_type()),
        }
    }

    /// Copy of the trailer value bound to `name`.
    pub fn trailer_entry(&self, name: &str) -> Result<Object> {
        debug!("trailer_entry /{name}");
        let value = self
            .trailer
            .get(name)
            .ok_or_else(|| PdfError::NotFound(format!("trailer entry /{name}")))?;
        value.deep_copy(self.options.max_nesting_depth)
    }

    /// Binds `name` in the trailer to a copy of `value`, returning the
    /// previous binding.
    pub fn change_trailer(&mut self, name: &str, value: &Object) -> Result<Option<Object>> {
        debug!("change_trailer /{name} to {}", value.type_name());
        let copy = value.deep_copy(self.options.max_nesting_depth)?;
        Ok(self.trailer.set(name, copy))
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// The document information dictionary, Null when the trailer has none.
    pub fn doc_info(&self) -> Result<Object> {
        match self.trailer.get("Info") {
            Some(Object::Reference(id)) => self.fetch(*id),
            Some(value) => value.deep_copy(self.options.max_nesting_depth),
            None => Ok(Object::Null),
        }
    }

    /// The trailer's `/Info` entry as stored, without following the
    /// reference; Null when the trailer has none.
    pub fn doc_info_nf(&self) -> Result<Object> {
        match self.trailer.get("Info") {
            Some(value) => value.deep_copy(self.options.max_nesting_depth),
            None => Ok(Object::Null),
        }
    }

    pub fn num_objects(&self) -> usize {
        self.catalog.object_count() + self.allocator.initialized_count()
    }

    pub fn is_changed(&self, id: ObjectId) -> bool {
        self.overlay.contains(id)
    }

    pub fn changed_ids(&self) -> Vec<ObjectId> {
        self.overlay.ids().collect()
    }

    pub fn last_xref_offset(&self) -> u64 {
        self.last_xref_offset
    }

    /// Snapshot of the overlay as the next incremental update.
    ///
    /// The trailer's `/Size` covers every number in use and `/Prev` points
    /// at the revision this session was opened from.
    pub fn pending_revision(&self) -> Revision {
        let objects = self
            .overlay
            .iter()
            .map(|(id, value)| (id, value.clone()))
            .collect();

        let highest = [
            self.allocator.max_number(),
            self.overlay.ids().map(|id| id.number()).max(),
        ]
        .into_iter()
        .flatten()
        .max()
        .map(|number| number + 1)
        .unwrap_or(0);
        let size = self.catalog.size().max(highest);

        let mut trailer = self.trailer.clone();
        trailer.set("Size", size as i64);
        trailer.set("Prev", self.last_xref_offset as i64);

        Revision {
            objects,
            freed: Default::default(),
            trailer,
        }
    }

    /// Discards every change and reservation made in this session.
    pub fn clean_up(&mut self) {
        debug!(
            changed = self.overlay.len(),
            reserved = self.allocator.len(),
            "clean_up"
        );

        for (id, state) in self.allocator.iter() {
            if state == RefState::Initialized && !self.overlay.contains(id) {
                error!("{id} is initialized but has no stored value, skipping");
            }
        }

        for (id, entry) in self.overlay.drain() {
            debug!("dropping changed {id} ({})", entry.value().type_name());
        }
        self.allocator.clear();
    }

    /// Drops all changes and switches to the revision starting at `offset`.
    ///
    /// Nothing is discarded when no revision starts at `offset`.
    pub fn reopen(&mut self, offset: u64) -> Result<()> {
        info!("reopening at xref offset {offset}");
        self.catalog.check_revision(offset)?;
        self.clean_up();
        self.catalog.destroy_internals();
        if let Err(e) = self.catalog.init_internals(offset) {
            error!(
                "failed to open revision at {offset} ({e}), restoring {}",
                self.last_xref_offset
            );
            self.catalog.init_internals(self.last_xref_offset)?;
            self.trailer = self.catalog.trailer().clone();
            return Err(e);
        }
        self.trailer = self.catalog.trailer().clone();
        self.last_xref_offset = offset;
        Ok(())
    }
}

impl<C: BaseCatalog> Resolve for IndirectObjectStore<C> {
    fn resolve(&self, id: ObjectId) -> Result<Object> {
        self.fetch(id)
    }
}

fn check_addressable(id: ObjectId) -> Result<()> {
    if id.number() == 0 {
        return Err(PdfError::InvalidObjectReference(0, id.generation()));
    }
    Ok(())
}
