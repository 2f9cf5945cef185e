use crate::objects::{Object, ObjectId};
use std::collections::BTreeMap;

/// Owned slot holding the current value of one changed object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEntry {
    value: Object,
}

impl ObjectEntry {
    pub fn new(value: Object) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &Object {
        &self.value
    }

    /// Installs `value`, handing back the one it displaced.
    pub fn replace(&mut self, value: Object) -> Object {
        std::mem::replace(&mut self.value, value)
    }

    pub fn into_value(self) -> Object {
        self.value
    }
}

/// Objects edited since the catalog view was loaded
#[derive(Debug, Clone, Default)]
pub struct ChangeOverlay {
    entries: BTreeMap<ObjectId, ObjectEntry>,
}

impl ChangeOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.entries.get(&id).map(ObjectEntry::value)
    }

    /// Stores `value` for `id`, returning the previous overlay value.
    pub fn install(&mut self, id: ObjectId, value: Object) -> Option<Object> {
        match self.entries.get_mut(&id) {
            Some(entry) => Some(entry.replace(value)),
            None => {
                self.entries.insert(id, ObjectEntry::new(value));
                None
            }
        }
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.entries.iter().map(|(id, entry)| (*id, entry.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry, yielding them in reference order.
    pub fn drain(&mut self) -> impl Iterator<Item = (ObjectId, ObjectEntry)> {
        std::mem::take(&mut self.entries).into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_returns_previous() {
        let mut overlay = ChangeOverlay::new();
        let id = ObjectId::new(4, 0);

        assert_eq!(overlay.install(id, Object::Integer(1)), None);
        assert_eq!(overlay.install(id, Object::Integer(2)), Some(Object::Integer(1)));
        assert_eq!(overlay.get(id), Some(&Object::Integer(2)));
        assert_eq!(overlay.len(), 1);
    }

    #[test]
    fn test_drain_empties() {
        let mut overlay = ChangeOverlay::new();
        overlay.install(ObjectId::new(2, 0), Object::Null);
        overlay.install(ObjectId::new(1, 0), Object::Boolean(true));

        let ids: Vec<_> = overlay.drain().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![ObjectId::new(1, 0), ObjectId::new(2, 0)]);
        assert!(overlay.is_empty());
        assert!(!overlay.contains(ObjectId::new(1, 0)));
    }

    #[test]
    fn test_entry_replace() {
        let mut entry = ObjectEntry::new(Object::Name("A".into()));
        let old = entry.replace(Object::Name("B".into()));
        assert_eq!(old, Object::Name("A".into()));
        assert_eq!(entry.into_value(), Object::Name("B".into()));
    }
}
