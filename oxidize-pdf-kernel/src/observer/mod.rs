//! Change notification
//!
//! Observers subscribe to a [`Subject`] (an indirect object, the trailer or
//! an opened page) and are told about every mutation of it. A notification carries the new
//! value together with a [`ChangeContext`] describing what changed.
//!
//! Listeners of one subject are notified in ascending
//! [`priority`](Observer::priority) order, ties broken by registration order.

use crate::objects::{Object, ObjectId};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Position of an observer in the delivery order; lower runs first.
pub type Priority = i32;

/// Something observers can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subject {
    Object(ObjectId),
    Trailer,
    /// Edits made through a [`Page`](crate::Page) and its invalidation
    Page(ObjectId),
}

impl From<ObjectId> for Subject {
    fn from(id: ObjectId) -> Self {
        Subject::Object(id)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Object(id) => write!(f, "{id}"),
            Subject::Trailer => f.write_str("trailer"),
            Subject::Page(id) => write!(f, "page {id}"),
        }
    }
}

/// Member of a container addressed by a complex change
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyId {
    Key(String),
    Index(usize),
}

impl PropertyId {
    pub fn key(&self) -> Option<&str> {
        match self {
            PropertyId::Key(key) => Some(key),
            PropertyId::Index(_) => None,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            PropertyId::Index(index) => Some(*index),
            PropertyId::Key(_) => None,
        }
    }
}

impl From<&str> for PropertyId {
    fn from(key: &str) -> Self {
        PropertyId::Key(key.to_string())
    }
}

impl From<usize> for PropertyId {
    fn from(index: usize) -> Self {
        PropertyId::Index(index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    /// The subject itself was replaced; `new_value` is the whole new value.
    Basic { previous: Object },
    /// One member of the subject was added, removed or replaced;
    /// `new_value` is the member's new value. Absent values are `Null`.
    Complex {
        property: PropertyId,
        previous: Object,
    },
    /// The subject is gone; `new_value` is `Null`.
    Invalidated,
}

static NULL: Object = Object::Null;

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeContext {
    pub subject: Subject,
    pub kind: ChangeKind,
}

impl ChangeContext {
    pub fn basic(subject: Subject, previous: Object) -> Self {
        Self {
            subject,
            kind: ChangeKind::Basic { previous },
        }
    }

    pub fn complex(subject: Subject, property: PropertyId, previous: Object) -> Self {
        Self {
            subject,
            kind: ChangeKind::Complex { property, previous },
        }
    }

    pub fn invalidated(subject: Subject) -> Self {
        Self {
            subject,
            kind: ChangeKind::Invalidated,
        }
    }

    /// Value before the change, `Null` for invalidations.
    pub fn previous(&self) -> &Object {
        match &self.kind {
            ChangeKind::Basic { previous } | ChangeKind::Complex { previous, .. } => previous,
            ChangeKind::Invalidated => &NULL,
        }
    }

    /// Changed member for complex changes.
    pub fn property(&self) -> Option<&PropertyId> {
        match &self.kind {
            ChangeKind::Complex { property, .. } => Some(property),
            ChangeKind::Basic { .. } | ChangeKind::Invalidated => None,
        }
    }

    pub fn is_basic(&self) -> bool {
        matches!(self.kind, ChangeKind::Basic { .. })
    }

    pub fn is_invalidated(&self) -> bool {
        matches!(self.kind, ChangeKind::Invalidated)
    }
}

pub trait Observer {
    fn notify(&self, new_value: &Object, context: &ChangeContext);

    fn priority(&self) -> Priority {
        0
    }
}

fn same_observer(a: &Rc<dyn Observer>, b: &Rc<dyn Observer>) -> bool {
    std::ptr::eq(
        Rc::as_ptr(a) as *const (),
        Rc::as_ptr(b) as *const (),
    )
}

/// Per-subject listener registry
#[derive(Default)]
pub struct ObserverBus {
    listeners: HashMap<Subject, Vec<Rc<dyn Observer>>>,
}

impl fmt::Debug for ObserverBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverBus")
            .field("subjects", &self.listeners.len())
            .field("registrations", &self.registration_count())
            .finish()
    }
}

impl ObserverBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `observer` to `subject`.
    ///
    /// Returns `false` if this observer was already registered there.
    pub fn register(&mut self, subject: Subject, observer: Rc<dyn Observer>) -> bool {
        let listeners = self.listeners.entry(subject).or_default();
        if listeners.iter().any(|known| same_observer(known, &observer)) {
            return false;
        }
        listeners.push(observer);
        true
    }

    pub fn unregister(&mut self, subject: Subject, observer: &Rc<dyn Observer>) -> bool {
        let Some(listeners) = self.listeners.get_mut(&subject) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|known| !same_observer(known, observer));
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            self.listeners.remove(&subject);
        }
        removed
    }

    pub fn is_registered(&self, subject: Subject, observer: &Rc<dyn Observer>) -> bool {
        self.listeners
            .get(&subject)
            .is_some_and(|listeners| listeners.iter().any(|known| same_observer(known, observer)))
    }

    pub fn observer_count(&self, subject: Subject) -> usize {
        self.listeners.get(&subject).map_or(0, Vec::len)
    }

    pub fn registration_count(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Listeners of `subject` in delivery order.
    ///
    /// The returned list is detached from the bus, so observers may register
    /// or unregister while it is being delivered to.
    pub fn snapshot(&self, subject: Subject) -> Vec<Rc<dyn Observer>> {
        let mut listeners = self.listeners.get(&subject).cloned().unwrap_or_default();
        listeners.sort_by_key(|observer| observer.priority());
        listeners
    }

    /// Delivers one notification to each listener of a snapshot.
    pub fn deliver(listeners: &[Rc<dyn Observer>], new_value: &Object, context: &ChangeContext) {
        for observer in listeners {
            observer.notify(new_value, context);
        }
    }

    pub fn notify(&self, new_value: &Object, context: &ChangeContext) {
        Self::deliver(&self.snapshot(context.subject), new_value, context);
    }
}
