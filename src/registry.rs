//! Voice registry with stable identifiers
//!
//! Each registered voice lives in its own lock-free slot. Editors publish
//! whole new [`Voice`] snapshots into the slot; the scheduler loads the
//! latest committed snapshot every time it fires, without taking the
//! scheduler lock.

use crate::error::ConfigError;
use crate::voice::Voice;
use arc_swap::{ArcSwap, Guard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoiceId(u64);

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Shared reference to a registered voice
#[derive(Clone)]
pub struct VoiceHandle {
    id: VoiceId,
    slot: Arc<ArcSwap<Voice>>,
}

impl VoiceHandle {
    pub fn id(&self) -> VoiceId {
        self.id
    }

    /// Latest committed snapshot
    pub fn snapshot(&self) -> Arc<Voice> {
        self.slot.load_full()
    }

    /// Replace the voice wholesale
    pub fn commit(&self, voice: Voice) {
        self.slot.store(Arc::new(voice));
    }

    /// Derive a new snapshot from the current one and publish it.
    ///
    /// If another editor commits in between, `edit` runs again on the
    /// newer snapshot, so it may be called more than once. On error
    /// nothing is published and the running voice is unchanged.
    pub fn update<F>(&self, mut edit: F) -> Result<(), ConfigError>
    where
        F: FnMut(Voice) -> Result<Voice, ConfigError>,
    {
        let mut current = self.slot.load_full();
        loop {
            let next = Arc::new(edit(Voice::clone(&current))?);
            let previous = self.slot.compare_and_swap(&current, next);
            if Arc::ptr_eq(&previous, &current) {
                return Ok(());
            }
            current = Guard::into_inner(previous);
        }
    }
}

impl fmt::Debug for VoiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceHandle")
            .field("id", &self.id)
            .field("voice", &self.slot.load_full())
            .finish()
    }
}

/// Ordered collection of voices; insertion order is fire order
#[derive(Debug, Default)]
pub struct VoiceRegistry {
    next_id: u64,
    voices: Vec<VoiceHandle>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a voice at the end of the fire order
    pub fn insert(&mut self, voice: Voice) -> VoiceHandle {
        let id = VoiceId(self.next_id);
        self.next_id += 1;

        let handle = VoiceHandle {
            id,
            slot: Arc::new(ArcSwap::from_pointee(voice)),
        };
        self.voices.push(handle.clone());
        handle
    }

    pub fn get(&self, id: VoiceId) -> Option<VoiceHandle> {
        self.voices.iter().find(|h| h.id == id).cloned()
    }

    pub fn remove(&mut self, id: VoiceId) -> bool {
        let before = self.voices.len();
        self.voices.retain(|h| h.id != id);
        self.voices.len() != before
    }

    /// Drop every voice. Identifiers are never reused.
    pub fn clear(&mut self) {
        self.voices.clear();
    }

    pub fn ids(&self) -> Vec<VoiceId> {
        self.voices.iter().map(|h| h.id).collect()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VoiceHandle> {
        self.voices.iter()
    }
}
