//! Editing facade over one object store and one observer bus
//!
//! Every edit made through a [`Document`] is a copy-on-write change of the
//! owning indirect object followed by a notification of the observers of that
//! object. Dictionary and array member edits are reported as complex changes
//! naming the changed key or index; replacing a whole object is a basic change.
//!
//! Observers are called synchronously. While they run, the document rejects
//! further edits with [`PdfError::InvalidOperation`]; reads and registration
//! changes are allowed.

use crate::error::{PdfError, Result};
use crate::objects::{helpers, Object, ObjectId, ObjectType, Resolve};
use crate::observer::{ChangeContext, Observer, ObserverBus, PropertyId, Subject};
use crate::page::{Page, PageInner};
use crate::store::{BaseCatalog, IndirectObjectStore, MemoryCatalog, StoreOptions};
use std::cell::{Cell, Ref, RefCell};
use std::collections::HashSet;
use std::rc::{Rc, Weak};
use tracing::{debug, info, warn};

pub(crate) struct Shared<C: BaseCatalog + 'static> {
    pub(crate) store: RefCell<IndirectObjectStore<C>>,
    pub(crate) bus: RefCell<ObserverBus>,
    delivering: Cell<bool>,
    pages: RefCell<Vec<Weak<PageInner<C>>>>,
}

/// Restores the delivery flag even if an observer panics.
struct DeliveryGuard<'a> {
    flag: &'a Cell<bool>,
    outer: bool,
}

impl<'a> DeliveryGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        let outer = flag.replace(true);
        Self { flag, outer }
    }
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.outer);
    }
}

/// Handle to an editable document; clones share the same state.
pub struct Document<C: BaseCatalog + 'static = MemoryCatalog> {
    pub(crate) shared: Rc<Shared<C>>,
}

impl<C: BaseCatalog + 'static> Clone for Document<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<C: BaseCatalog + 'static> std::fmt::Debug for Document<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("bus", &*self.shared.bus.borrow())
            .field("delivering", &self.shared.delivering.get())
            .finish_non_exhaustive()
    }
}

impl<C: BaseCatalog + 'static> Document<C> {
    pub fn new(catalog: C) -> Self {
        Self::with_options(catalog, StoreOptions::default())
    }

    pub fn with_options(catalog: C, options: StoreOptions) -> Self {
        Self::from_store(IndirectObjectStore::new(catalog, options))
    }

    /// Opens the revision whose cross-reference section starts at `offset`.
    pub fn open(catalog: C, offset: u64, options: StoreOptions) -> Result<Self> {
        Ok(Self::from_store(IndirectObjectStore::open(
            catalog, offset, options,
        )?))
    }

    pub fn from_store(store: IndirectObjectStore<C>) -> Self {
        Self {
            shared: Rc::new(Shared {
                store: RefCell::new(store),
                bus: RefCell::new(ObserverBus::new()),
                delivering: Cell::new(false),
                pages: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> Ref<'_, IndirectObjectStore<C>> {
        self.shared.store.borrow()
    }

    pub fn is_delivering(&self) -> bool {
        self.shared.delivering.get()
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.shared.delivering.get() {
            return Err(PdfError::InvalidOperation(
                "document cannot be edited while observers are being notified".to_string(),
            ));
        }
        Ok(())
    }

    fn broadcast(&self, new_value: &Object, context: ChangeContext) {
        let listeners = self.shared.bus.borrow().snapshot(context.subject);
        if listeners.is_empty() {
            return;
        }
        debug!(
            "notifying {} observers of {}",
            listeners.len(),
            context.subject
        );

        let _guard = DeliveryGuard::enter(&self.shared.delivering);
        ObserverBus::deliver(&listeners, new_value, &context);
    }

    /// Delivers a page level event. Skipped when the bus is already
    /// borrowed, which only happens while it is being cleared.
    pub(crate) fn broadcast_page_event(&self, new_value: &Object, context: ChangeContext) {
        let Ok(bus) = self.shared.bus.try_borrow() else {
            debug!("bus busy, dropping event for {}", context.subject);
            return;
        };
        let listeners = bus.snapshot(context.subject);
        drop(bus);
        if listeners.is_empty() {
            return;
        }

        let _guard = DeliveryGuard::enter(&self.shared.delivering);
        ObserverBus::deliver(&listeners, new_value, &context);
    }

    pub fn fetch(&self, id: ObjectId) -> Result<Object> {
        self.shared.store.borrow().fetch(id)
    }

    /// Replaces the whole value of `id` and notifies its observers with a
    /// basic change.
    pub fn change(&self, id: ObjectId, value: &Object) -> Result<Option<Object>> {
        self.ensure_mutable()?;
        let previous = self.fetch(id)?;
        let replaced = self.shared.store.borrow_mut().change(id, value)?;
        self.broadcast(value, ChangeContext::basic(Subject::Object(id), previous));
        Ok(replaced)
    }

    /// Stores `value` as a new indirect object.
    pub fn add_object(&self, value: impl Into<Object>) -> Result<ObjectId> {
        self.ensure_mutable()?;
        let value = value.into();
        let mut store = self.shared.store.borrow_mut();
        let id = store.reserve()?;
        store.change(id, &value)?;
        debug!("added {id} ({})", value.type_name());
        Ok(id)
    }

    pub fn create_object(&self, object_type: ObjectType) -> Result<(ObjectId, Object)> {
        self.ensure_mutable()?;
        self.shared.store.borrow_mut().create_object(object_type)
    }

    pub fn num_objects(&self) -> usize {
        self.shared.store.borrow().num_objects()
    }

    /// Sets `key` in the dictionary (or stream dictionary) `id`.
    pub fn set_property(
        &self,
        id: ObjectId,
        key: &str,
        value: impl Into<Object>,
    ) -> Result<Option<Object>> {
        self.ensure_mutable()?;
        let value = value.into();
        let mut object = self.fetch(id)?;
        let found = object.type_name();
        let dict = object
            .as_dict_mut()
            .ok_or_else(|| PdfError::type_mismatch("dictionary", found))?;
        let previous = dict.set(key, value.clone());

        self.shared.store.borrow_mut().change(id, &object)?;
        self.broadcast(
            &value,
            ChangeContext::complex(
                Subject::Object(id),
                PropertyId::Key(key.to_string()),
                previous.clone().unwrap_or(Object::Null),
            ),
        );
        Ok(previous)
    }

    /// Removes `key`; nothing is stored or notified when it is absent.
    pub fn remove_property(&self, id: ObjectId, key: &str) -> Result<Option<Object>> {
        self.ensure_mutable()?;
        let mut object = self.fetch(id)?;
        let found = object.type_name();
        let dict = object
            .as_dict_mut()
            .ok_or_else(|| PdfError::type_mismatch("dictionary", found))?;
        let Some(previous) = dict.remove(key) else {
            return Ok(None);
        };

        self.shared.store.borrow_mut().change(id, &object)?;
        self.broadcast(
            &Object::Null,
            ChangeContext::complex(
                Subject::Object(id),
                PropertyId::Key(key.to_string()),
                previous.clone(),
            ),
        );
        Ok(Some(previous))
    }

    fn edit_array<T>(
        &self,
        id: ObjectId,
        edit: impl FnOnce(&mut Vec<Object>) -> Result<(T, usize, Object, Object)>,
    ) -> Result<T> {
        self.ensure_mutable()?;
        let mut object = self.fetch(id)?;
        let found = object.type_name();
        let items = object
            .as_array_mut()
            .ok_or_else(|| PdfError::type_mismatch("array", found))?;
        let (result, index, new_value, previous) = edit(items)?;

        self.shared.store.borrow_mut().change(id, &object)?;
        self.broadcast(
            &new_value,
            ChangeContext::complex(Subject::Object(id), PropertyId::Index(index), previous),
        );
        Ok(result)
    }

    /// Replaces element `index`, returning the old element.
    pub fn array_set(&self, id: ObjectId, index: usize, value: impl Into<Object>) -> Result<Object> {
        let value = value.into();
        self.edit_array(id, |items| {
            let len = items.len();
            let slot = items.get_mut(index).ok_or_else(|| out_of_range(index, len))?;
            let previous = std::mem::replace(slot, value.clone());
            Ok((previous.clone(), index, value, previous))
        })
    }

    pub fn array_insert(&self, id: ObjectId, index: usize, value: impl Into<Object>) -> Result<()> {
        let value = value.into();
        self.edit_array(id, |items| {
            if index > items.len() {
                return Err(out_of_range(index, items.len()));
            }
            items.insert(index, value.clone());
            Ok(((), index, value, Object::Null))
        })
    }

    /// Appends `value`, returning its index.
    pub fn array_push(&self, id: ObjectId, value: impl Into<Object>) -> Result<usize> {
        let value = value.into();
        self.edit_array(id, |items| {
            items.push(value.clone());
            let index = items.len() - 1;
            Ok((index, index, value, Object::Null))
        })
    }

    pub fn array_remove(&self, id: ObjectId, index: usize) -> Result<Object> {
        self.edit_array(id, |items| {
            if index >= items.len() {
                return Err(out_of_range(index, items.len()));
            }
            let previous = items.remove(index);
            Ok((previous.clone(), index, Object::Null, previous))
        })
    }

    pub fn trailer_entry(&self, name: &str) -> Result<Object> {
        self.shared.store.borrow().trailer_entry(name)
    }

    pub fn change_trailer(&self, name: &str, value: &Object) -> Result<Option<Object>> {
        self.ensure_mutable()?;
        let previous = self.shared.store.borrow_mut().change_trailer(name, value)?;
        self.broadcast(
            value,
            ChangeContext::complex(
                Subject::Trailer,
                PropertyId::Key(name.to_string()),
                previous.clone().unwrap_or(Object::Null),
            ),
        );
        Ok(previous)
    }

    pub fn doc_info(&self) -> Result<Object> {
        self.shared.store.borrow().doc_info()
    }

    pub fn doc_info_nf(&self) -> Result<Object> {
        self.shared.store.borrow().doc_info_nf()
    }

    pub fn register_observer(&self, subject: Subject, observer: Rc<dyn Observer>) -> bool {
        self.shared.bus.borrow_mut().register(subject, observer)
    }

    pub fn unregister_observer(&self, subject: Subject, observer: &Rc<dyn Observer>) -> bool {
        self.shared.bus.borrow_mut().unregister(subject, observer)
    }

    pub fn observer_count(&self, subject: Subject) -> usize {
        self.shared.bus.borrow().observer_count(subject)
    }

    pub fn is_registered(&self, subject: Subject, observer: &Rc<dyn Observer>) -> bool {
        self.shared.bus.borrow().is_registered(subject, observer)
    }

    pub fn page(&self, id: ObjectId) -> Result<Page<C>> {
        let page = Page::open(self.clone(), id)?;
        let mut pages = self.shared.pages.borrow_mut();
        pages.retain(|weak| weak.strong_count() > 0);
        pages.push(page.downgrade());
        Ok(page)
    }

    /// Page references in document order, read from `/Root /Pages`.
    pub fn page_ids(&self) -> Result<Vec<ObjectId>> {
        let root = self.trailer_entry("Root")?;
        let catalog = helpers::dict_from_ref(self, &root)?;
        let pages_root = helpers::ref_from_dict(&catalog, "Pages")?;

        let mut ids = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![pages_root];
        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                warn!("page tree visits {node} twice, skipping");
                continue;
            }
            let value = self.fetch(node)?;
            let Some(dict) = value.as_dict() else {
                warn!("page tree node {node} is a {}", value.type_name());
                continue;
            };

            let kids = dict.get("Kids").and_then(Object::as_array);
            match (helpers::dict_type(dict).as_str(), kids) {
                ("Page", _) | (_, None) => ids.push(node),
                (_, Some(kids)) => {
                    stack.extend(kids.iter().rev().filter_map(Object::as_reference));
                }
            }
        }
        Ok(ids)
    }

    pub fn pages(&self) -> Result<Vec<Page<C>>> {
        self.page_ids()?
            .into_iter()
            .map(|id| self.page(id))
            .collect()
    }

    /// Discards all changes and switches to the revision at `offset`.
    ///
    /// Every page opened from this document is invalidated and all observers
    /// are dropped. When no revision starts at `offset` the document is left
    /// as it was.
    pub fn reopen(&self, offset: u64) -> Result<()> {
        self.ensure_mutable()?;
        self.shared.store.borrow_mut().reopen(offset)?;

        let pages = std::mem::take(&mut *self.shared.pages.borrow_mut());
        for page in pages.iter().filter_map(Weak::upgrade) {
            page.invalidate();
        }
        self.shared.bus.borrow_mut().clear();
        info!("document reopened at offset {offset}");
        Ok(())
    }
}

impl Document<MemoryCatalog> {
    /// Appends the pending changes as a new revision at `offset` and reopens
    /// the document there.
    pub fn save_incremental(&self, offset: u64) -> Result<()> {
        self.ensure_mutable()?;
        {
            let mut store = self.shared.store.borrow_mut();
            let revision = store.pending_revision();
            store.catalog_mut().append_revision(offset, revision)?;
        }
        self.reopen(offset)
    }
}

impl<C: BaseCatalog + 'static> Resolve for Document<C> {
    fn resolve(&self, id: ObjectId) -> Result<Object> {
        self.fetch(id)
    }
}

fn out_of_range(index: usize, len: usize) -> PdfError {
    PdfError::InvalidOperation(format!("index {index} out of range for array of {len}"))
}
