//! Pages and the caches derived from them
//!
//! A [`Page`] exposes its `/Annots` entries as [`Annotation`] wrappers and its
//! `/Contents` streams as [`ContentStream`] segments. Both lists are built on
//! first use and kept in step with the document by watchdog observers, so an
//! edit made anywhere through the [`Document`] is reflected by the next call.

pub mod annotations;
pub mod contents;
pub(crate) mod sync;

use crate::content::{write_operations, Operation};
use crate::observer::{ChangeContext, Observer, Subject};
use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::geometry::Rectangle;
use crate::objects::{Dictionary, Object, ObjectId, Stream};
use crate::store::{BaseCatalog, MemoryCatalog};
use annotations::Annotation;
use contents::{build_segments, ContentStream};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashSet};
use std::rc::{Rc, Weak};
use sync::{CacheState, PropertyWatchDog, Watched};
use tracing::{debug, error, info, warn};

/// Page dictionary opened from a [`Document`]; clones share the caches.
pub struct Page<C: BaseCatalog + 'static = MemoryCatalog> {
    inner: Rc<PageInner<C>>,
}

impl<C: BaseCatalog + 'static> Clone for Page<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C: BaseCatalog + 'static> std::fmt::Debug for Page<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("id", &self.inner.id)
            .field("valid", &self.inner.valid.get())
            .finish()
    }
}

pub(crate) struct PageInner<C: BaseCatalog + 'static> {
    id: ObjectId,
    doc: Document<C>,
    valid: Cell<bool>,
    annotations: RefCell<CacheState<Annotation>>,
    contents: RefCell<CacheState<ContentStream>>,
    annotations_watch: Rc<PropertyWatchDog<C>>,
    contents_watch: Rc<PropertyWatchDog<C>>,
}

/// Where a page's array property lives.
enum Container {
    Absent,
    Direct(Vec<Object>),
    Indirect(ObjectId, Vec<Object>),
}

impl Container {
    fn items(&self) -> &[Object] {
        match self {
            Container::Absent => &[],
            Container::Direct(items) | Container::Indirect(_, items) => items,
        }
    }
}

impl<C: BaseCatalog + 'static> PageInner<C> {
    fn watchdog(&self, watched: Watched) -> &Rc<PropertyWatchDog<C>> {
        match watched {
            Watched::Annots => &self.annotations_watch,
            Watched::Contents => &self.contents_watch,
        }
    }

    fn ensure_valid(&self) -> Result<()> {
        if !self.valid.get() {
            return Err(PdfError::InvalidOperation(format!(
                "page {} is no longer valid",
                self.id
            )));
        }
        Ok(())
    }

    fn dictionary(&self) -> Result<Dictionary> {
        let value = self.doc.fetch(self.id)?;
        let found = value.type_name();
        match value {
            Object::Dictionary(dict) => Ok(dict),
            _ => Err(PdfError::type_mismatch("dictionary", found)),
        }
    }

    /// Rebuilds the cache for `watched` after a relevant notification.
    pub(crate) fn refresh(&self, watched: Watched) {
        if !self.valid.get() {
            return;
        }
        if let Err(e) = self.sync(watched) {
            error!(
                "failed to rebuild {} of page {}: {e}",
                watched.key(),
                self.id
            );
            match watched {
                Watched::Annots => {
                    invalidate_all(&mut self.annotations.borrow_mut(), Annotation::invalidate)
                }
                Watched::Contents => {
                    invalidate_all(&mut self.contents.borrow_mut(), ContentStream::invalidate)
                }
            }
        }
    }

    fn sync(&self, watched: Watched) -> Result<()> {
        let container = match watched {
            Watched::Annots => self.array_property(Watched::Annots),
            Watched::Contents => self.contents_property(),
        };
        let container = match container {
            Ok(container) => container,
            Err(e) => {
                // only the page dictionary registration stays
                self.watchdog(watched)
                    .resubscribe(&self.doc.shared.bus, BTreeSet::new());
                return Err(e);
            }
        };
        self.resubscribe(watched, &container);

        match watched {
            Watched::Annots => {
                let fresh = self.annotation_entries(container.items())?;
                let mut cache = self.annotations.borrow_mut();
                let old = cache.take_built();
                *cache = CacheState::Built(reconcile(
                    old,
                    fresh,
                    |kept, new| kept.matches(new.reference(), new.dictionary()),
                    Annotation::invalidate,
                ));
            }
            Watched::Contents => {
                let streams = reference_elements(container.items());
                let fresh = build_segments(&self.doc, &streams)?;
                let mut cache = self.contents.borrow_mut();
                let old = cache.take_built();
                *cache = CacheState::Built(reconcile(
                    old,
                    fresh,
                    ContentStream::matches,
                    ContentStream::invalidate,
                ));
            }
        }
        debug!("page {} {} cache rebuilt", self.id, watched.key());
        Ok(())
    }

    fn resubscribe(&self, watched: Watched, container: &Container) {
        let mut subjects: BTreeSet<ObjectId> =
            reference_elements(container.items()).into_iter().collect();
        if let Container::Indirect(id, _) = container {
            subjects.insert(*id);
        }
        self.watchdog(watched).resubscribe(&self.doc.shared.bus, subjects);
    }

    /// Resolves an array-valued page property one reference hop deep.
    fn array_property(&self, watched: Watched) -> Result<Container> {
        let dict = self.dictionary()?;
        match dict.get(watched.key()) {
            None | Some(Object::Null) => Ok(Container::Absent),
            Some(Object::Array(items)) => Ok(Container::Direct(items.clone())),
            Some(Object::Reference(id)) => match self.doc.fetch(*id)? {
                Object::Array(items) => Ok(Container::Indirect(*id, items)),
                Object::Null => Ok(Container::Indirect(*id, Vec::new())),
                other => Err(PdfError::type_mismatch("array", other.type_name())),
            },
            Some(other) => Err(PdfError::type_mismatch("array", other.type_name())),
        }
    }

    /// Like [`array_property`](Self::array_property), but a single stream
    /// reference counts as a one-element container.
    fn contents_property(&self) -> Result<Container> {
        let dict = self.dictionary()?;
        if let Some(Object::Reference(id)) = dict.get(Watched::Contents.key()) {
            if self.doc.fetch(*id)?.as_stream().is_some() {
                return Ok(Container::Direct(vec![Object::Reference(*id)]));
            }
        }
        self.array_property(Watched::Contents)
    }

    fn annotation_entries(&self, items: &[Object]) -> Result<Vec<Annotation>> {
        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Object::Reference(id) => match self.doc.fetch(*id)? {
                    Object::Dictionary(dict) => entries.push(Annotation::new(Some(*id), dict)),
                    other => warn!("annotation {id} is a {}, skipping", other.type_name()),
                },
                Object::Dictionary(dict) => entries.push(Annotation::new(None, dict.clone())),
                other => warn!("annotation entry is a {}, skipping", other.type_name()),
            }
        }
        Ok(entries)
    }

    /// Invalidates the page and tells its page observers.
    pub(crate) fn invalidate(&self) {
        if self.release() {
            self.doc.broadcast_page_event(
                &Object::Null,
                ChangeContext::invalidated(Subject::Page(self.id)),
            );
        }
    }

    /// Drops the watchdogs and caches; `false` if already released.
    fn release(&self) -> bool {
        if !self.valid.replace(false) {
            return false;
        }
        info!("invalidating page {}", self.id);
        self.annotations_watch.detach(&self.doc.shared.bus);
        self.contents_watch.detach(&self.doc.shared.bus);
        invalidate_all(&mut self.annotations.borrow_mut(), Annotation::invalidate);
        invalidate_all(&mut self.contents.borrow_mut(), ContentStream::invalidate);
        *self.annotations.borrow_mut() = CacheState::Invalidated;
        *self.contents.borrow_mut() = CacheState::Invalidated;
        true
    }

    /// Reports a finished page edit to the page observers.
    fn edited(&self, before: Dictionary) {
        let after = match self.dictionary() {
            Ok(dict) => Object::Dictionary(dict),
            Err(e) => {
                warn!("page {} unreadable after edit: {e}", self.id);
                Object::Null
            }
        };
        self.doc.broadcast_page_event(
            &after,
            ChangeContext::basic(Subject::Page(self.id), Object::Dictionary(before)),
        );
    }
}

impl<C: BaseCatalog + 'static> Drop for PageInner<C> {
    fn drop(&mut self) {
        // other handles on the same dictionary stay usable
        self.release();
    }
}

/// Drops built entries back to unbuilt, invalidating every wrapper.
fn invalidate_all<T>(state: &mut CacheState<T>, invalidate: impl Fn(&T)) {
    for entry in state.take_built() {
        invalidate(&entry);
    }
}

/// Keeps old wrappers that still describe an entry and invalidates the rest.
fn reconcile<T>(
    old: Vec<Rc<T>>,
    fresh: Vec<T>,
    same: impl Fn(&T, &T) -> bool,
    invalidate: impl Fn(&T),
) -> Vec<Rc<T>> {
    let mut old: Vec<Option<Rc<T>>> = old.into_iter().map(Some).collect();
    let rebuilt = fresh
        .into_iter()
        .map(|entry| {
            let reused = old
                .iter_mut()
                .find(|slot| slot.as_deref().is_some_and(|kept| same(kept, &entry)))
                .and_then(Option::take);
            reused.unwrap_or_else(|| Rc::new(entry))
        })
        .collect();
    for stale in old.into_iter().flatten() {
        invalidate(&stale);
    }
    rebuilt
}

fn reference_elements(items: &[Object]) -> Vec<ObjectId> {
    items.iter().filter_map(Object::as_reference).collect()
}

impl<C: BaseCatalog + 'static> Page<C> {
    /// Opens the page dictionary `id`; use [`Document::page`] instead so the
    /// document can invalidate the page on reopen.
    pub(crate) fn open(doc: Document<C>, id: ObjectId) -> Result<Self> {
        let value = doc.fetch(id)?;
        let Object::Dictionary(dict) = &value else {
            return Err(PdfError::type_mismatch("dictionary", value.type_name()));
        };
        if let Some(kind) = dict.get("Type").and_then(Object::as_name) {
            if kind != "Page" {
                return Err(PdfError::InvalidOperation(format!(
                    "{id} is a /{kind}, not a page"
                )));
            }
        }

        let inner = Rc::new_cyclic(|me: &Weak<PageInner<C>>| PageInner {
            id,
            doc,
            valid: Cell::new(true),
            annotations: RefCell::new(CacheState::Unbuilt),
            contents: RefCell::new(CacheState::Unbuilt),
            annotations_watch: PropertyWatchDog::new(Watched::Annots, id, me.clone()),
            contents_watch: PropertyWatchDog::new(Watched::Contents, id, me.clone()),
        });
        inner.annotations_watch.attach(&inner.doc.shared.bus);
        inner.contents_watch.attach(&inner.doc.shared.bus);
        debug!("opened page {id}");
        Ok(Self { inner })
    }

    pub(crate) fn downgrade(&self) -> Weak<PageInner<C>> {
        Rc::downgrade(&self.inner)
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub fn is_valid(&self) -> bool {
        self.inner.valid.get()
    }

    /// Current page dictionary.
    pub fn dictionary(&self) -> Result<Dictionary> {
        self.inner.ensure_valid()?;
        self.inner.dictionary()
    }

    /// Invalidates the page and every wrapper it handed out.
    pub fn invalidate(&self) {
        self.inner.invalidate();
    }

    /// Subscribes `observer` to [`Subject::Page`] events of this page: one
    /// basic change after every edit made through a page handle, carrying
    /// the page dictionaries before and after, and one invalidation.
    pub fn register_observer(&self, observer: Rc<dyn Observer>) -> bool {
        self.inner
            .doc
            .register_observer(Subject::Page(self.id()), observer)
    }

    pub fn unregister_observer(&self, observer: &Rc<dyn Observer>) -> bool {
        self.inner
            .doc
            .unregister_observer(Subject::Page(self.id()), observer)
    }

    pub fn annotations(&self) -> Result<Vec<Rc<Annotation>>> {
        self.inner.ensure_valid()?;
        if matches!(*self.inner.annotations.borrow(), CacheState::Unbuilt) {
            self.inner.sync(Watched::Annots)?;
        }
        Ok(self
            .inner
            .annotations
            .borrow()
            .built()
            .map(<[_]>::to_vec)
            .unwrap_or_default())
    }

    /// Stores a copy of `annotation` as a new indirect object owned by this
    /// page and appends it to `/Annots`.
    pub fn add_annotation(&self, annotation: &Dictionary) -> Result<ObjectId> {
        let before = self.dictionary()?;
        let container = self.inner.array_property(Watched::Annots)?;

        let mut dict = annotation.clone();
        dict.set("P", self.id());
        let id = self.inner.doc.add_object(dict)?;

        let entry = Object::Reference(id);
        match container {
            Container::Absent => {
                self.inner
                    .doc
                    .set_property(self.id(), "Annots", vec![entry])?;
            }
            Container::Indirect(array, _) => {
                self.inner.doc.array_push(array, entry)?;
            }
            Container::Direct(mut items) => {
                items.push(entry);
                self.inner.doc.set_property(self.id(), "Annots", items)?;
            }
        }
        debug!("added annotation {id} to page {}", self.id());
        self.inner.edited(before);
        Ok(id)
    }

    /// Removes the `/Annots` entry of `annotation`; `false` when the page no
    /// longer has it.
    pub fn remove_annotation(&self, annotation: &Annotation) -> Result<bool> {
        let before = self.dictionary()?;
        if !annotation.is_valid() {
            return Ok(false);
        }

        let container = self.inner.array_property(Watched::Annots)?;
        let position = container.items().iter().position(|item| match item {
            Object::Reference(id) => annotation.reference() == Some(*id),
            Object::Dictionary(dict) => {
                annotation.reference().is_none() && dict == annotation.dictionary()
            }
            _ => false,
        });
        let Some(index) = position else {
            return Ok(false);
        };

        match container {
            Container::Absent => return Ok(false),
            Container::Indirect(array, _) => {
                self.inner.doc.array_remove(array, index)?;
            }
            Container::Direct(mut items) => {
                items.remove(index);
                self.inner.doc.set_property(self.id(), "Annots", items)?;
            }
        }
        self.inner.edited(before);
        Ok(true)
    }

    pub fn content_streams(&self) -> Result<Vec<Rc<ContentStream>>> {
        self.inner.ensure_valid()?;
        if matches!(*self.inner.contents.borrow(), CacheState::Unbuilt) {
            self.inner.sync(Watched::Contents)?;
        }
        Ok(self
            .inner
            .contents
            .borrow()
            .built()
            .map(<[_]>::to_vec)
            .unwrap_or_default())
    }

    /// Adds a stream painted before everything else on the page.
    pub fn add_content_stream_to_front(&self, operations: &[Operation]) -> Result<ObjectId> {
        self.add_content_stream(operations, true)
    }

    /// Adds a stream painted after everything else on the page.
    pub fn add_content_stream_to_back(&self, operations: &[Operation]) -> Result<ObjectId> {
        self.add_content_stream(operations, false)
    }

    fn add_content_stream(&self, operations: &[Operation], front: bool) -> Result<ObjectId> {
        let before = self.dictionary()?;
        let id = self.insert_content_stream(operations, front)?;
        self.inner.edited(before);
        Ok(id)
    }

    fn insert_content_stream(&self, operations: &[Operation], front: bool) -> Result<ObjectId> {
        let mut refs = self.content_refs()?;
        let id = self
            .inner
            .doc
            .add_object(Stream::new(write_operations(operations)))?;
        if front {
            refs.insert(0, id);
        } else {
            refs.push(id);
        }
        self.write_content_refs(refs)?;
        Ok(id)
    }

    /// Removes the streams of segment `index` from `/Contents`.
    pub fn remove_content_stream(&self, index: usize) -> Result<()> {
        let before = self.dictionary()?;
        let segments = self.content_streams()?;
        let segment = segment_at(&segments, index)?;
        self.drop_content_refs(segment.streams())?;
        self.inner.edited(before);
        Ok(())
    }

    fn drop_content_refs(&self, streams: &[ObjectId]) -> Result<()> {
        let drop: HashSet<ObjectId> = streams.iter().copied().collect();
        let mut refs = self.content_refs()?;
        refs.retain(|id| !drop.contains(id));
        self.write_content_refs(refs)
    }

    /// Swaps segment `index` with the one painted after it.
    pub fn move_above(&self, index: usize) -> Result<()> {
        let segments = self.content_streams()?;
        segment_at(&segments, index)?;
        if index + 1 == segments.len() {
            debug!("segment {index} is already topmost");
            return Ok(());
        }
        self.swap_segments(&segments, index)
    }

    /// Swaps segment `index` with the one painted before it.
    pub fn move_below(&self, index: usize) -> Result<()> {
        let segments = self.content_streams()?;
        segment_at(&segments, index)?;
        if index == 0 {
            debug!("segment 0 is already bottommost");
            return Ok(());
        }
        self.swap_segments(&segments, index - 1)
    }

    fn swap_segments(&self, segments: &[Rc<ContentStream>], lower: usize) -> Result<()> {
        let before = self.dictionary()?;
        let refs: Vec<ObjectId> = segments
            .iter()
            .enumerate()
            .flat_map(|(i, segment)| {
                let source = match i {
                    i if i == lower => &segments[lower + 1],
                    i if i == lower + 1 => &segments[lower],
                    _ => segment,
                };
                source.streams().to_vec()
            })
            .collect();
        self.write_content_refs(refs)?;
        self.inner.edited(before);
        Ok(())
    }

    /// Applies `matrix` to what the page paints by inserting a `cm`
    /// operation before the first `cm` of the page, or in front of
    /// everything when the page has none.
    pub fn set_transform_matrix(&self, matrix: [f64; 6]) -> Result<()> {
        let before = self.dictionary()?;
        let cm = Operation::new("cm", matrix.iter().map(|&v| Object::Real(v)).collect());
        let segments = self.content_streams()?;
        let first_cm = segments.iter().enumerate().find_map(|(index, segment)| {
            segment
                .operations()
                .iter()
                .position(|op| op.operator == "cm")
                .map(|at| (index, at))
        });

        match first_cm {
            None => {
                self.insert_content_stream(&[cm], true)?;
            }
            Some((index, at)) => {
                let segment = &segments[index];
                let data = segment.bytes_with(at, cm);
                let Some((&target, merged)) = segment.streams().split_first() else {
                    return Err(PdfError::InvalidOperation(format!(
                        "content stream {index} has no backing stream"
                    )));
                };
                let merged = merged.to_vec();

                let value = self.inner.doc.fetch(target)?;
                let found = value.type_name();
                let Object::Stream(stream) = value else {
                    return Err(PdfError::type_mismatch("stream", found));
                };
                let mut dict = stream.dictionary().clone();
                dict.remove("Filter");
                dict.remove("DecodeParms");
                self.inner
                    .doc
                    .change(target, &Stream::with_dictionary(dict, data).into())?;
                // the rewritten stream holds the whole segment now
                if !merged.is_empty() {
                    self.drop_content_refs(&merged)?;
                }
            }
        }
        debug!("transform matrix set on page {}", self.id());
        self.inner.edited(before);
        Ok(())
    }

    fn content_refs(&self) -> Result<Vec<ObjectId>> {
        Ok(reference_elements(self.inner.contents_property()?.items()))
    }

    fn write_content_refs(&self, refs: Vec<ObjectId>) -> Result<()> {
        let value: Vec<Object> = refs.into_iter().map(Object::Reference).collect();
        match self.inner.array_property(Watched::Contents) {
            Ok(Container::Indirect(array, _)) => {
                self.inner.doc.change(array, &Object::Array(value))?;
            }
            // a single stream reference reads as a type mismatch here
            Ok(Container::Absent | Container::Direct(_)) | Err(PdfError::TypeMismatch { .. }) => {
                self.inner.doc.set_property(self.id(), "Contents", value)?;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Inheritable page attribute, looked up through `/Parent`.
    fn inherited(&self, key: &str) -> Result<Option<Object>> {
        self.inner.ensure_valid()?;
        let mut dict = self.inner.dictionary()?;
        let mut visited = HashSet::from([self.id()]);
        loop {
            if let Some(value) = dict.get(key) {
                return match value {
                    Object::Reference(id) => self.inner.doc.fetch(*id).map(Some),
                    other => Ok(Some(other.clone())),
                };
            }
            let Some(parent) = dict.get("Parent").and_then(Object::as_reference) else {
                return Ok(None);
            };
            if !visited.insert(parent) {
                warn!("page tree loop at {parent} while looking up /{key}");
                return Ok(None);
            }
            dict = match self.inner.doc.fetch(parent)? {
                Object::Dictionary(parent) => parent,
                _ => return Ok(None),
            };
        }
    }

    pub fn media_box(&self) -> Result<Rectangle> {
        let value = self
            .inherited("MediaBox")?
            .ok_or_else(|| PdfError::NotFound(format!("/MediaBox of page {}", self.id())))?;
        Rectangle::from_object(&value)
    }

    pub fn set_media_box(&self, rect: Rectangle) -> Result<()> {
        let before = self.dictionary()?;
        self.inner
            .doc
            .set_property(self.id(), "MediaBox", rect.to_object())?;
        self.inner.edited(before);
        Ok(())
    }

    /// Clockwise rotation in degrees, normalized to `0..360`.
    pub fn rotation(&self) -> Result<i32> {
        match self.inherited("Rotate")? {
            None => Ok(0),
            Some(Object::Integer(degrees)) => Ok(degrees.rem_euclid(360) as i32),
            Some(other) => Err(PdfError::type_mismatch("integer", other.type_name())),
        }
    }

    pub fn set_rotation(&self, degrees: i32) -> Result<()> {
        let before = self.dictionary()?;
        if degrees % 90 != 0 {
            return Err(PdfError::InvalidOperation(format!(
                "rotation must be a multiple of 90, got {degrees}"
            )));
        }
        self.inner
            .doc
            .set_property(self.id(), "Rotate", degrees.rem_euclid(360))?;
        self.inner.edited(before);
        Ok(())
    }
}

fn segment_at(segments: &[Rc<ContentStream>], index: usize) -> Result<&Rc<ContentStream>> {
    segments.get(index).ok_or_else(|| {
        PdfError::InvalidOperation(format!(
            "content stream {index} out of range for page with {}",
            segments.len()
        ))
    })
}
