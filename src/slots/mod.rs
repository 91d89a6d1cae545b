//! Per-slot run state shared with the UI.
//!
//! The store keeps one [`Slot`] per playground column and publishes the whole
//! set as a [`SlotsSnapshot`] on a `watch` channel. Writers replace individual
//! fields; readers either take a snapshot or subscribe for change
//! notifications.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

mod chunks;

pub use chunks::{apply_chunk, StreamAccumulator};

use crate::types::{RunChunk, RunId};

/// Number of playground columns.
pub const SLOT_COUNT: usize = 3;

/// Index of a playground column, always in `0..SLOT_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct SlotIndex(u8);

impl SlotIndex {
    pub const ALL: [SlotIndex; SLOT_COUNT] = [SlotIndex(0), SlotIndex(1), SlotIndex(2)];

    pub fn new(index: usize) -> Option<Self> {
        (index < SLOT_COUNT).then_some(Self(index as u8))
    }

    pub fn get(self) -> usize {
        usize::from(self.0)
    }
}

impl TryFrom<usize> for SlotIndex {
    type Error = String;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::new(index).ok_or_else(|| format!("slot index {index} out of range 0..{SLOT_COUNT}"))
    }
}

impl From<SlotIndex> for usize {
    fn from(index: SlotIndex) -> Self {
        index.get()
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error shown in a slot after its run failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotError {
    /// Model the failed run targeted.
    pub model: Option<String>,
    pub message: String,
}

/// State of one playground column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Slot {
    pub model_id: Option<String>,
    /// Last known run. Set once the run is created (confirmed or not).
    pub run_id: Option<RunId>,
    pub in_progress: bool,
    /// Partial output of the in-flight run.
    pub stream: Option<StreamAccumulator>,
    pub error: Option<SlotError>,
}

impl Slot {
    /// No run, no output, no error and nothing in flight.
    pub fn is_empty(&self) -> bool {
        self.run_id.is_none() && self.stream.is_none() && self.error.is_none() && !self.in_progress
    }

    /// Drop run state, keeping the selected model.
    pub fn clear(&mut self) {
        self.run_id = None;
        self.in_progress = false;
        self.stream = None;
        self.error = None;
    }
}

/// Immutable view of every slot at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotsSnapshot {
    slots: [Slot; SLOT_COUNT],
}

impl SlotsSnapshot {
    pub fn get(&self, index: SlotIndex) -> &Slot {
        &self.slots[index.get()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotIndex, &Slot)> {
        SlotIndex::ALL.into_iter().zip(self.slots.iter())
    }

    pub fn in_progress_indexes(&self) -> Vec<SlotIndex> {
        self.iter()
            .filter(|(_, slot)| slot.in_progress)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn any_in_progress(&self) -> bool {
        self.slots.iter().any(|slot| slot.in_progress)
    }
}

/// Observable store of slot state. Cloning yields another handle to the same
/// store.
#[derive(Clone)]
pub struct SlotStore {
    tx: Arc<watch::Sender<SlotsSnapshot>>,
}

impl Default for SlotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SlotsSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self, index: SlotIndex) -> Slot {
        self.tx.borrow().get(index).clone()
    }

    pub fn snapshot(&self) -> SlotsSnapshot {
        self.tx.borrow().clone()
    }

    /// Receiver notified after every change that altered a slot.
    pub fn subscribe(&self) -> watch::Receiver<SlotsSnapshot> {
        self.tx.subscribe()
    }

    pub fn any_in_progress(&self) -> bool {
        self.tx.borrow().any_in_progress()
    }

    /// Apply `mutator` to one slot. Observers are only woken when the slot
    /// actually changed.
    pub fn update<F>(&self, index: SlotIndex, mutator: F)
    where
        F: FnOnce(&mut Slot),
    {
        self.tx.send_if_modified(|snapshot| {
            let slot = &mut snapshot.slots[index.get()];
            let before = slot.clone();
            mutator(slot);
            *slot != before
        });
    }

    /// Clear run state of one slot. The selected model is kept.
    pub fn reset(&self, index: SlotIndex) {
        self.update(index, Slot::clear);
    }

    /// Replace the streamed output of one slot, or clear it with `None`.
    pub fn apply_chunk(&self, index: SlotIndex, chunk: Option<&RunChunk>) {
        self.update(index, |slot| apply_chunk(slot, chunk));
    }
}
