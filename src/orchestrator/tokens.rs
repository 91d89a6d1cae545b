//! Per-slot cancellation leases.
//!
//! Starting a run for a slot hands out a [`SlotLease`]: a cancellation token
//! tagged with a generation. Any earlier lease of that slot is cancelled at the
//! same moment. Slot writes go through [`SlotTokens::with_current`], which runs
//! the write under the table lock only while the lease is still the slot's
//! live one, so a late response can never overwrite a newer run's state.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

use crate::slots::{SlotIndex, SLOT_COUNT};

/// Why a lease may no longer write to its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupted {
    /// The lease was cancelled and is still the slot's newest.
    Cancelled,
    /// A newer run took over the slot.
    Superseded,
}

/// Right of one task to write one slot.
#[derive(Debug, Clone)]
pub(crate) struct SlotLease {
    pub(crate) index: SlotIndex,
    generation: u64,
    pub(crate) token: CancellationToken,
}

#[derive(Default)]
struct TokenTable {
    next_generation: u64,
    live: [Option<(u64, CancellationToken)>; SLOT_COUNT],
}

impl TokenTable {
    fn check(&self, lease: &SlotLease) -> Result<(), Interrupted> {
        match &self.live[lease.index.get()] {
            Some((generation, token)) if *generation == lease.generation => {
                if token.is_cancelled() {
                    Err(Interrupted::Cancelled)
                } else {
                    Ok(())
                }
            }
            _ => Err(Interrupted::Superseded),
        }
    }
}

/// Registry of the live lease of every slot.
#[derive(Default)]
pub(crate) struct SlotTokens {
    table: Mutex<TokenTable>,
}

impl SlotTokens {
    fn lock(&self) -> MutexGuard<'_, TokenTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel any lease of `index` and hand out a fresh one.
    pub(crate) fn acquire(&self, index: SlotIndex) -> SlotLease {
        let mut table = self.lock();
        table.next_generation += 1;
        let generation = table.next_generation;
        let token = CancellationToken::new();
        if let Some((_, previous)) =
            table.live[index.get()].replace((generation, token.clone()))
        {
            previous.cancel();
        }
        SlotLease {
            index,
            generation,
            token,
        }
    }

    /// Cancel the live lease of `index` and run `clear` under the same lock.
    /// Returns false, without clearing, when there was nothing left to cancel.
    pub(crate) fn cancel(&self, index: SlotIndex, clear: impl FnOnce()) -> bool {
        let table = self.lock();
        match &table.live[index.get()] {
            Some((_, token)) if !token.is_cancelled() => {
                token.cancel();
                clear();
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_live(&self, index: SlotIndex) -> bool {
        self.lock().live[index.get()].is_some()
    }

    /// Run `write` while `lease` is live and uncancelled.
    pub(crate) fn with_current<R>(
        &self,
        lease: &SlotLease,
        write: impl FnOnce() -> R,
    ) -> Result<R, Interrupted> {
        let table = self.lock();
        table.check(lease)?;
        Ok(write())
    }

    /// Like [`with_current`](Self::with_current), then give the slot up.
    pub(crate) fn finish<R>(
        &self,
        lease: &SlotLease,
        write: impl FnOnce() -> R,
    ) -> Result<R, Interrupted> {
        let mut table = self.lock();
        table.check(lease)?;
        let out = write();
        table.live[lease.index.get()] = None;
        Ok(out)
    }

    /// Give up an interrupted lease: run `clear` and free the slot if the
    /// lease is still the slot's newest.
    pub(crate) fn abandon(&self, lease: &SlotLease, clear: impl FnOnce()) -> Interrupted {
        let mut table = self.lock();
        let slot = &mut table.live[lease.index.get()];
        if !matches!(slot, Some((generation, _)) if *generation == lease.generation) {
            return Interrupted::Superseded;
        }
        clear();
        *slot = None;
        Interrupted::Cancelled
    }
}
