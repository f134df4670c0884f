use alloy_primitives::Address;
use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Terminal result of one token's fetch loop. Exactly one is recorded per
/// token id per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    /// The contract reported a current owner.
    Owned { owner: Address },
    /// The contract reported that the id does not exist.
    Absent,
    /// Every retry was spent on transient failures; the last error message
    /// is kept as the reason.
    Failed { reason: String },
}

impl TokenOutcome {
    pub fn owner(&self) -> Option<Address> {
        match self {
            TokenOutcome::Owned { owner } => Some(*owner),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TokenOutcome::Failed { .. })
    }
}

/// Accumulates outcomes from concurrent fetchers and replays them in token
/// id order once the run settles.
///
/// The map is the only mutable state shared between fetchers; appends are
/// serialized by the mutex and completion order never leaks into the
/// output because `BTreeMap` iteration is already sorted.
#[derive(Debug, Default)]
pub struct SnapshotSink {
    entries: Mutex<BTreeMap<u64, TokenOutcome>>,
}

impl SnapshotSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one terminal outcome. A second outcome for the same id is a
    /// scheduler bug; the first write wins.
    pub fn record(&self, token_id: u64, outcome: TokenOutcome) {
        let mut entries = self.entries.lock().expect("snapshot sink mutex poisoned");
        if entries.contains_key(&token_id) {
            tracing::warn!(token_id, "duplicate outcome for token id; keeping the first");
            debug_assert!(false, "duplicate outcome recorded for token id {token_id}");
            return;
        }
        entries.insert(token_id, outcome);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("snapshot sink mutex poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All outcomes, ascending by token id.
    pub fn sorted_rows(&self) -> Vec<(u64, TokenOutcome)> {
        self.entries
            .lock()
            .expect("snapshot sink mutex poisoned")
            .iter()
            .map(|(id, outcome)| (*id, outcome.clone()))
            .collect()
    }

    /// Failed ids with their reasons, ascending by token id.
    pub fn failures(&self) -> Vec<(u64, String)> {
        self.entries
            .lock()
            .expect("snapshot sink mutex poisoned")
            .iter()
            .filter_map(|(id, outcome)| match outcome {
                TokenOutcome::Failed { reason } => Some((*id, reason.clone())),
                _ => None,
            })
            .collect()
    }

    /// Confirms the sink holds exactly one outcome for every id in
    /// `[start_id, end_id]`.
    pub fn verify_complete(&self, start_id: u64, end_id: u64) -> Result<()> {
        let entries = self.entries.lock().expect("snapshot sink mutex poisoned");
        let expected = (end_id - start_id + 1) as usize;
        if entries.len() != expected {
            bail!(
                "snapshot holds {} outcomes but the range [{start_id}, {end_id}] has {expected}",
                entries.len()
            );
        }
        for (key, wanted) in entries.keys().zip(start_id..=end_id) {
            if *key != wanted {
                bail!("snapshot is missing token id {wanted}");
            }
        }
        Ok(())
    }
}
