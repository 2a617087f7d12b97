use super::{Storage, StorageError, StorageKey};
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Record {
    data: Vec<u8>,
    reserved: usize,
    open: bool,
}

/// RAM-backed [`Storage`] with a fixed capacity, for hosts without
/// non-volatile memory and for simulating write failures.
#[derive(Debug)]
pub struct MemoryStorage {
    capacity: usize,
    records: HashMap<StorageKey, Record>,
    write_budget: Option<usize>,
}

impl MemoryStorage {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: HashMap::new(),
            write_budget: None,
        }
    }

    /// After `bytes` more bytes have been appended, every further append
    /// comes up short.
    pub fn fail_writes_after(&mut self, bytes: usize) {
        self.write_budget = Some(bytes);
    }

    pub fn clear_fault(&mut self) {
        self.write_budget = None;
    }

    pub fn contains(&self, key: StorageKey) -> bool {
        self.records.contains_key(&key)
    }

    fn reserved(&self) -> usize {
        self.records.values().map(|r| r.reserved).sum()
    }
}

impl Storage for MemoryStorage {
    fn create(&mut self, key: StorageKey, size: usize) -> Result<(), StorageError> {
        self.records.remove(&key);
        let available = self.free_capacity();
        if size > available {
            return Err(StorageError::NoSpace {
                requested: size,
                available,
            });
        }
        self.records.insert(
            key,
            Record {
                data: Vec::with_capacity(size),
                reserved: size,
                open: true,
            },
        );
        Ok(())
    }

    fn append(&mut self, key: StorageKey, data: &[u8]) -> Result<usize, StorageError> {
        let record = match self.records.get_mut(&key) {
            Some(record) if record.open => record,
            _ => return Err(StorageError::NotOpen(key)),
        };

        let room = record.reserved - record.data.len();
        let mut take = data.len().min(room);
        if let Some(budget) = self.write_budget.as_mut() {
            take = take.min(*budget);
            *budget -= take;
        }
        record.data.extend_from_slice(&data[..take]);
        Ok(take)
    }

    fn close(&mut self, key: StorageKey) -> Result<(), StorageError> {
        let record = self
            .records
            .get_mut(&key)
            .ok_or(StorageError::NotOpen(key))?;
        record.open = false;
        Ok(())
    }

    fn read(&self, key: StorageKey) -> Option<Vec<u8>> {
        self.records
            .get(&key)
            .filter(|r| !r.open)
            .map(|r| r.data.clone())
    }

    fn delete(&mut self, key: StorageKey) {
        self.records.remove(&key);
    }

    fn free_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.reserved())
    }
}
