//! Keeps a page's derived caches in step with its dictionary
//!
//! Each cache has one [`PropertyWatchDog`]. It stays registered on the page
//! dictionary for the life of the page and is additionally registered on the
//! property's container (when the property is a reference) and on every
//! reference element of the container. Whenever one of those subjects
//! changes, the page rebuilds the cache and the watchdog moves its
//! registrations to the new set of subjects.

use crate::objects::{Object, ObjectId};
use crate::observer::{ChangeContext, ChangeKind, Observer, ObserverBus, PropertyId, Subject};
use crate::page::PageInner;
use crate::store::BaseCatalog;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};
use tracing::debug;

/// Page property a cache is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Watched {
    Annots,
    Contents,
}

impl Watched {
    pub(crate) fn key(&self) -> &'static str {
        match self {
            Watched::Annots => "Annots",
            Watched::Contents => "Contents",
        }
    }
}

#[derive(Debug)]
pub(crate) enum CacheState<T> {
    Unbuilt,
    Built(Vec<Rc<T>>),
    Invalidated,
}

impl<T> CacheState<T> {
    /// Moves the built entries out, leaving the cache unbuilt.
    pub(crate) fn take_built(&mut self) -> Vec<Rc<T>> {
        match std::mem::replace(self, CacheState::Unbuilt) {
            CacheState::Built(entries) => entries,
            CacheState::Invalidated => {
                *self = CacheState::Invalidated;
                Vec::new()
            }
            CacheState::Unbuilt => Vec::new(),
        }
    }

    pub(crate) fn built(&self) -> Option<&[Rc<T>]> {
        match self {
            CacheState::Built(entries) => Some(entries),
            _ => None,
        }
    }
}

pub(crate) struct PropertyWatchDog<C: BaseCatalog + 'static> {
    watched: Watched,
    page_id: ObjectId,
    page: Weak<PageInner<C>>,
    me: Weak<PropertyWatchDog<C>>,
    subscribed: RefCell<BTreeSet<ObjectId>>,
}

impl<C: BaseCatalog + 'static> PropertyWatchDog<C> {
    pub(crate) fn new(watched: Watched, page_id: ObjectId, page: Weak<PageInner<C>>) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            watched,
            page_id,
            page,
            me: me.clone(),
            subscribed: RefCell::new(BTreeSet::new()),
        })
    }

    fn observer(&self) -> Option<Rc<dyn Observer>> {
        let me: Rc<Self> = self.me.upgrade()?;
        Some(me)
    }

    /// Registers on the page dictionary.
    pub(crate) fn attach(&self, bus: &RefCell<ObserverBus>) {
        if let Some(observer) = self.observer() {
            bus.borrow_mut()
                .register(Subject::Object(self.page_id), observer);
        }
    }

    /// Drops every registration, the page dictionary one included.
    pub(crate) fn detach(&self, bus: &RefCell<ObserverBus>) {
        let Some(observer) = self.observer() else {
            return;
        };
        let Ok(mut bus) = bus.try_borrow_mut() else {
            debug!("bus busy, leaving {} watchdog registrations", self.watched.key());
            return;
        };
        for id in self.subscribed.take() {
            bus.unregister(Subject::Object(id), &observer);
        }
        bus.unregister(Subject::Object(self.page_id), &observer);
    }

    /// Moves the container and element registrations to `subjects`.
    pub(crate) fn resubscribe(&self, bus: &RefCell<ObserverBus>, mut subjects: BTreeSet<ObjectId>) {
        let Some(observer) = self.observer() else {
            return;
        };
        subjects.remove(&self.page_id);

        let mut bus = bus.borrow_mut();
        for id in self.subscribed.take() {
            bus.unregister(Subject::Object(id), &observer);
        }
        for id in &subjects {
            bus.register(Subject::Object(*id), Rc::clone(&observer));
        }
        debug!(
            "{} of page {} watches {} objects",
            self.watched.key(),
            self.page_id,
            subjects.len()
        );
        *self.subscribed.borrow_mut() = subjects;
    }

    #[cfg(test)]
    pub(crate) fn subscribed(&self) -> BTreeSet<ObjectId> {
        self.subscribed.borrow().clone()
    }

    fn is_relevant(&self, context: &ChangeContext) -> bool {
        if context.subject != Subject::Object(self.page_id) {
            return true;
        }
        match &context.kind {
            ChangeKind::Basic { .. } | ChangeKind::Invalidated => true,
            ChangeKind::Complex {
                property: PropertyId::Key(key),
                ..
            } => key == self.watched.key(),
            ChangeKind::Complex { .. } => false,
        }
    }
}

impl<C: BaseCatalog + 'static> Observer for PropertyWatchDog<C> {
    fn notify(&self, _new_value: &Object, context: &ChangeContext) {
        if !self.is_relevant(context) {
            return;
        }
        if let Some(page) = self.page.upgrade() {
            page.refresh(self.watched);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::annotations::Annotation;
    use crate::objects::Dictionary;

    #[test]
    fn test_watched_keys() {
        assert_eq!(Watched::Annots.key(), "Annots");
        assert_eq!(Watched::Contents.key(), "Contents");
    }

    #[test]
    fn test_take_built() {
        let mut state = CacheState::Built(vec![Rc::new(Annotation::new(None, Dictionary::new()))]);
        assert_eq!(state.built().map(<[_]>::len), Some(1));
        assert_eq!(state.take_built().len(), 1);
        assert!(matches!(state, CacheState::Unbuilt));

        let mut state: CacheState<Annotation> = CacheState::Invalidated;
        assert!(state.take_built().is_empty());
        assert!(matches!(state, CacheState::Invalidated));
    }
}
