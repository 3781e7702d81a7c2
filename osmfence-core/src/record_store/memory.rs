use super::{RecordStore, RecordStoreError, Replay};

/// Record store keeping everything in a vector.
#[derive(Debug, Clone)]
pub struct MemoryRecordStore<T> {
    records: Option<Vec<T>>,
}

impl<T> Default for MemoryRecordStore<T> {
    fn default() -> Self {
        Self {
            records: Some(Vec::new()),
        }
    }
}

impl<T: Clone + std::fmt::Debug + 'static> RecordStore<T> for MemoryRecordStore<T> {
    fn add(&mut self, record: T) -> Result<(), RecordStoreError> {
        self.records
            .as_mut()
            .ok_or(RecordStoreError::Released)?
            .push(record);
        Ok(())
    }

    fn iterate(&mut self) -> Result<Replay<'_, T>, RecordStoreError> {
        let records = self.records.as_ref().ok_or(RecordStoreError::Released)?;
        Ok(Box::new(records.iter().cloned().map(Ok)))
    }

    fn len(&self) -> usize {
        self.records.as_ref().map_or(0, Vec::len)
    }

    fn release(&mut self) {
        self.records = None;
    }
}
