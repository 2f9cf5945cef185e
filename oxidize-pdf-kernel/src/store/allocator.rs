use crate::error::{PdfError, Result};
use crate::objects::ObjectId;
use crate::store::{BaseCatalog, RefState, StoreOptions};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Hands out references for new indirect objects.
///
/// Free slots of the base catalog are reused before new numbers are minted.
/// Every reference handed out during a session is remembered, so the same
/// pair is never returned twice.
#[derive(Debug, Clone, Default)]
pub struct ReferenceAllocator {
    table: BTreeMap<ObjectId, RefState>,
}

impl ReferenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(
        &mut self,
        catalog: &dyn BaseCatalog,
        options: &StoreOptions,
    ) -> Result<ObjectId> {
        let size = catalog.size();
        let live = catalog.object_count();
        let mut in_use_seen = 0usize;
        let mut number = 1u32;

        while number < size && number < options.max_object_number && in_use_seen < live {
            let (in_use, generation) = match catalog.entry(number) {
                Some(entry) => (entry.kind.is_in_use(), entry.generation),
                None => (false, 0),
            };
            if in_use {
                in_use_seen += 1;
            } else if generation < options.max_generation {
                let candidate = ObjectId::new(number, generation);
                if !self.table.contains_key(&candidate) {
                    info!("reusing free slot {candidate}");
                    self.table.insert(candidate, RefState::Reserved);
                    return Ok(candidate);
                }
            }
            number += 1;
        }

        while number < options.max_object_number {
            let candidate = ObjectId::new(number, 0);
            if !self.table.contains_key(&candidate) {
                info!("minting new reference {candidate}");
                self.table.insert(candidate, RefState::Reserved);
                return Ok(candidate);
            }
            number += 1;
        }

        debug!(
            reserved = self.table.len(),
            "no object number left below {}", options.max_object_number
        );
        Err(PdfError::ReferenceExhausted)
    }

    /// State of `id` as far as this allocator knows.
    pub fn state(&self, id: ObjectId) -> RefState {
        self.table.get(&id).copied().unwrap_or(RefState::Unused)
    }

    /// Promotes a reserved reference once it holds a value.
    ///
    /// Returns `true` if the state changed.
    pub fn mark_initialized(&mut self, id: ObjectId) -> bool {
        match self.table.get_mut(&id) {
            Some(state) if *state == RefState::Reserved => {
                *state = RefState::Initialized;
                true
            }
            _ => false,
        }
    }

    pub fn initialized_count(&self) -> usize {
        self.table
            .values()
            .filter(|state| **state == RefState::Initialized)
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, RefState)> + '_ {
        self.table.iter().map(|(id, state)| (*id, *state))
    }

    /// Highest object number handed out, if any.
    pub fn max_number(&self) -> Option<u32> {
        self.table.keys().map(ObjectId::number).max()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }
}
