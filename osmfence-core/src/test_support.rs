//! In-memory sinks and replication stores used by unit and behaviour tests.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use thiserror::Error;

use crate::{
    Change, ChangeSink, EntityId, EntityKind, Metadata, ReplicationState, ReplicationStore,
    SinkError,
};

/// Sink recording every lifecycle call.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    /// Number of `initialize` calls.
    pub initialized: usize,
    /// Changes received, in order.
    pub changes: Vec<Change>,
    /// Number of `complete` calls.
    pub completed: usize,
    /// Number of `release` calls.
    pub released: usize,
    /// Fail every `process` call once this many changes were accepted.
    pub fail_after: Option<usize>,
}

impl RecordingSink {
    /// A sink failing on the change after the first `accepted` ones.
    #[must_use]
    pub fn failing_after(accepted: usize) -> Self {
        Self {
            fail_after: Some(accepted),
            ..Self::default()
        }
    }

    /// Kind and identifier of each received change.
    #[must_use]
    pub fn emitted(&self) -> Vec<(EntityKind, EntityId)> {
        self.changes
            .iter()
            .map(|change| (change.entity.kind(), change.entity.id()))
            .collect()
    }
}

/// Failure injected by [`RecordingSink::failing_after`].
#[derive(Debug, Error)]
#[error("injected sink failure")]
pub struct InjectedFailure;

impl ChangeSink for RecordingSink {
    fn initialize(&mut self, _metadata: &Metadata) -> Result<(), SinkError> {
        self.initialized += 1;
        Ok(())
    }

    fn process(&mut self, change: Change) -> Result<(), SinkError> {
        if self.fail_after.is_some_and(|limit| self.changes.len() >= limit) {
            return Err(SinkError::Downstream {
                stage: "recording sink",
                source: Box::new(InjectedFailure),
            });
        }
        self.changes.push(change);
        Ok(())
    }

    fn complete(&mut self) -> Result<(), SinkError> {
        self.completed += 1;
        Ok(())
    }

    fn release(&mut self) {
        self.released += 1;
    }
}

/// Everything a [`MemoryReplicationStore`] has persisted.
#[derive(Debug, Default, Clone)]
pub struct MemoryReplica {
    /// Current persisted state.
    pub state: Option<ReplicationState>,
    /// Every saved state, in order.
    pub saved_states: Vec<ReplicationState>,
    /// Completed batches by sequence number.
    pub batches: BTreeMap<u64, Vec<Change>>,
    /// Writers opened, by sequence number, in order.
    pub opened: Vec<u64>,
    /// Writers released, by sequence number, in order.
    pub released: Vec<u64>,
    /// Reject `save_state` calls.
    pub fail_saves: bool,
}

/// Replication store keeping its data in shared memory.
///
/// Clones share the same replica, so a test can keep a handle while a
/// splitter owns the store.
#[derive(Debug, Default, Clone)]
pub struct MemoryReplicationStore {
    replica: Rc<RefCell<MemoryReplica>>,
}

impl MemoryReplicationStore {
    /// A store already holding `state`.
    #[must_use]
    pub fn with_state(state: ReplicationState) -> Self {
        let store = Self::default();
        store.replica.borrow_mut().state = Some(state);
        store
    }

    /// A copy of everything persisted so far.
    #[must_use]
    pub fn snapshot(&self) -> MemoryReplica {
        self.replica.borrow().clone()
    }

    /// Make subsequent `save_state` calls fail.
    pub fn fail_saves(&self) {
        self.replica.borrow_mut().fail_saves = true;
    }
}

/// Error returned by [`MemoryReplicationStore`] when saves are rejected.
#[derive(Debug, Error)]
#[error("saving replication state was rejected")]
pub struct SaveRejected;

impl ReplicationStore for MemoryReplicationStore {
    type Writer = MemoryBatchWriter;
    type Error = SaveRejected;

    fn current_state(&self) -> Result<Option<ReplicationState>, Self::Error> {
        Ok(self.replica.borrow().state)
    }

    fn save_state(&mut self, state: &ReplicationState) -> Result<(), Self::Error> {
        let mut replica = self.replica.borrow_mut();
        if replica.fail_saves {
            return Err(SaveRejected);
        }
        replica.state = Some(*state);
        replica.saved_states.push(*state);
        Ok(())
    }

    fn open_writer(&mut self, sequence_number: u64) -> Result<Self::Writer, Self::Error> {
        self.replica.borrow_mut().opened.push(sequence_number);
        Ok(MemoryBatchWriter {
            sequence_number,
            pending: Vec::new(),
            replica: Rc::clone(&self.replica),
            released: false,
        })
    }
}

/// Writer collecting one batch for a [`MemoryReplicationStore`].
#[derive(Debug)]
pub struct MemoryBatchWriter {
    sequence_number: u64,
    pending: Vec<Change>,
    replica: Rc<RefCell<MemoryReplica>>,
    released: bool,
}

impl ChangeSink for MemoryBatchWriter {
    fn initialize(&mut self, _metadata: &Metadata) -> Result<(), SinkError> {
        Ok(())
    }

    fn process(&mut self, change: Change) -> Result<(), SinkError> {
        self.pending.push(change);
        Ok(())
    }

    fn complete(&mut self) -> Result<(), SinkError> {
        let batch = std::mem::take(&mut self.pending);
        self.replica
            .borrow_mut()
            .batches
            .insert(self.sequence_number, batch);
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.replica.borrow_mut().released.push(self.sequence_number);
        }
    }
}
