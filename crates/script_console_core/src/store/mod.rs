//! Persisted script records.
//!
//! A script survives reboots as three independent records: its name, its
//! payload (length prefix followed by the bytes) and a byte-count record used
//! to recover the size when the in-memory cache is empty.

mod memory;

pub use memory::MemoryStorage;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const PREFIX_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageKey {
    ScriptName,
    ScriptPayload,
    ScriptSize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Short write: {written} of {requested} bytes")]
    ShortWrite { requested: usize, written: usize },

    #[error("No space for {requested} bytes, {available} available")]
    NoSpace { requested: usize, available: usize },

    #[error("Record {0:?} is not open for writing")]
    NotOpen(StorageKey),

    #[error("Storage I/O failure: {0}")]
    Io(String),
}

/// Non-volatile key/value primitives provided by the device.
pub trait Storage {
    /// Opens `key` for writing, replacing any previous record and reserving
    /// `size` bytes.
    fn create(&mut self, key: StorageKey, size: usize) -> Result<(), StorageError>;

    /// Appends to an open record and returns how many bytes were written.
    fn append(&mut self, key: StorageKey, data: &[u8]) -> Result<usize, StorageError>;

    fn close(&mut self, key: StorageKey) -> Result<(), StorageError>;

    fn read(&self, key: StorageKey) -> Option<Vec<u8>>;

    fn delete(&mut self, key: StorageKey);

    fn free_capacity(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedScript {
    pub name: String,
    pub length: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct ScriptStore {
    cached_len: Option<u32>,
}

impl ScriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs may use three quarters of whatever storage is free right now.
    pub fn max_script_len<S: Storage + ?Sized>(storage: &S) -> u32 {
        let free = storage.free_capacity() as u64;
        (free * 3 / 4).min(u32::MAX as u64) as u32
    }

    pub fn save_name<S: Storage + ?Sized>(
        &self,
        storage: &mut S,
        name: &str,
    ) -> Result<(), StorageError> {
        storage.create(StorageKey::ScriptName, name.len())?;
        write_all(storage, StorageKey::ScriptName, name.as_bytes())?;
        storage.close(StorageKey::ScriptName)
    }

    /// Opens the payload record and writes its length prefix. The returned
    /// writer deletes the payload record unless it is committed.
    pub fn begin_payload<'a, S: Storage + ?Sized>(
        &'a mut self,
        storage: &'a mut S,
        len: u32,
    ) -> Result<PayloadWriter<'a, S>, StorageError> {
        let mut writer = PayloadWriter {
            storage,
            cached_len: &mut self.cached_len,
            len,
            written: 0,
            committed: false,
        };
        writer
            .storage
            .create(StorageKey::ScriptPayload, PREFIX_LEN + len as usize)?;
        write_all(&mut *writer.storage, StorageKey::ScriptPayload, &len.to_le_bytes())?;
        Ok(writer)
    }

    /// Drops the payload record so a failed install never leaves the
    /// previous script behind without its name.
    pub fn discard_payload<S: Storage + ?Sized>(&mut self, storage: &mut S) {
        storage.delete(StorageKey::ScriptPayload);
        self.cached_len = None;
    }

    /// Payload length from the cache, or from the byte-count record when the
    /// cache is empty (e.g. after a reboot).
    pub fn script_len<S: Storage + ?Sized>(&self, storage: &S) -> Option<u32> {
        self.cached_len.or_else(|| {
            let record = storage.read(StorageKey::ScriptSize)?;
            let raw: [u8; PREFIX_LEN] = record.get(..PREFIX_LEN)?.try_into().ok()?;
            Some(u32::from_le_bytes(raw))
        })
    }

    pub fn load<S: Storage + ?Sized>(&self, storage: &S) -> Option<PersistedScript> {
        let record = storage.read(StorageKey::ScriptPayload)?;
        let raw: [u8; PREFIX_LEN] = record.get(..PREFIX_LEN)?.try_into().ok()?;
        let prefix = u32::from_le_bytes(raw);
        let length = self.script_len(storage).unwrap_or(prefix);

        if length != prefix || record.len() < PREFIX_LEN + length as usize {
            tracing::warn!(
                recorded = length,
                prefix,
                stored = record.len(),
                "Stored script record is inconsistent"
            );
            return None;
        }

        let name = storage
            .read(StorageKey::ScriptName)
            .map(|raw| String::from_utf8_lossy(&raw).into_owned())
            .unwrap_or_default();

        Some(PersistedScript {
            name,
            length,
            bytes: record[PREFIX_LEN..PREFIX_LEN + length as usize].to_vec(),
        })
    }
}

fn write_all<S: Storage + ?Sized>(
    storage: &mut S,
    key: StorageKey,
    data: &[u8],
) -> Result<(), StorageError> {
    let written = storage.append(key, data)?;
    if written != data.len() {
        return Err(StorageError::ShortWrite {
            requested: data.len(),
            written,
        });
    }
    Ok(())
}

pub struct PayloadWriter<'a, S: Storage + ?Sized> {
    storage: &'a mut S,
    cached_len: &'a mut Option<u32>,
    len: u32,
    written: u32,
    committed: bool,
}

impl<S: Storage + ?Sized> PayloadWriter<'_, S> {
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        write_all(&mut *self.storage, StorageKey::ScriptPayload, chunk)?;
        self.written += chunk.len() as u32;
        Ok(())
    }

    /// Closes the payload and writes the byte-count record.
    pub fn commit(mut self) -> Result<u32, StorageError> {
        if self.written != self.len {
            return Err(StorageError::ShortWrite {
                requested: self.len as usize,
                written: self.written as usize,
            });
        }
        self.storage.close(StorageKey::ScriptPayload)?;

        self.storage.create(StorageKey::ScriptSize, PREFIX_LEN)?;
        write_all(&mut *self.storage, StorageKey::ScriptSize, &self.len.to_le_bytes())?;
        self.storage.close(StorageKey::ScriptSize)?;

        *self.cached_len = Some(self.len);
        self.committed = true;
        Ok(self.len)
    }
}

impl<S: Storage + ?Sized> Drop for PayloadWriter<'_, S> {
    fn drop(&mut self) {
        if !self.committed {
            tracing::warn!(
                expected = self.len,
                written = self.written,
                "Discarding partially written script"
            );
            let _ = self.storage.close(StorageKey::ScriptPayload);
            self.storage.delete(StorageKey::ScriptPayload);
            *self.cached_len = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn install(store: &mut ScriptStore, storage: &mut MemoryStorage, bytes: &[u8]) -> Result<u32, StorageError> {
        let mut writer = store.begin_payload(storage, bytes.len() as u32)?;
        for chunk in bytes.chunks(5) {
            writer.write(chunk)?;
        }
        writer.commit()
    }

    #[test]
    fn test_install_then_load_round_trip() {
        let mut storage = MemoryStorage::new(4096);
        let mut store = ScriptStore::new();
        store.save_name(&mut storage, "blink.js").unwrap();
        install(&mut store, &mut storage, b"setInterval(blink, 500);").unwrap();

        let script = store.load(&storage).unwrap();
        assert_eq!(script.name, "blink.js");
        assert_eq!(script.length, 24);
        assert_eq!(script.bytes, b"setInterval(blink, 500);");
    }

    #[test]
    fn test_size_record_matches_payload_len() {
        let mut storage = MemoryStorage::new(4096);
        let mut store = ScriptStore::new();
        install(&mut store, &mut storage, b"print('hi')").unwrap();

        let record = storage.read(StorageKey::ScriptSize).unwrap();
        assert_eq!(record, 11u32.to_le_bytes());
    }

    #[test]
    fn test_size_recovered_after_reboot() {
        let mut storage = MemoryStorage::new(4096);
        let mut store = ScriptStore::new();
        install(&mut store, &mut storage, b"var x = 1;").unwrap();

        let rebooted = ScriptStore::new();
        assert_eq!(rebooted.script_len(&storage), Some(10));
        assert_eq!(rebooted.load(&storage).unwrap().bytes, b"var x = 1;");
    }

    #[test]
    fn test_failed_write_removes_payload() {
        let mut storage = MemoryStorage::new(4096);
        let mut store = ScriptStore::new();
        storage.fail_writes_after(12);

        let err = install(&mut store, &mut storage, b"a script that will not fit").unwrap_err();
        assert!(matches!(err, StorageError::ShortWrite { .. }));
        assert!(storage.read(StorageKey::ScriptPayload).is_none());
        assert!(store.load(&storage).is_none());
    }

    #[test]
    fn test_uncommitted_writer_is_discarded() {
        let mut storage = MemoryStorage::new(4096);
        let mut store = ScriptStore::new();
        {
            let mut writer = store.begin_payload(&mut storage, 8).unwrap();
            writer.write(b"half").unwrap();
        }
        assert!(storage.read(StorageKey::ScriptPayload).is_none());
        assert_eq!(store.script_len(&storage), None);
    }

    #[test]
    fn test_max_script_len_tracks_free_capacity() {
        let mut storage = MemoryStorage::new(1000);
        assert_eq!(ScriptStore::max_script_len(&storage), 750);

        let store = ScriptStore::new();
        store.save_name(&mut storage, &"n".repeat(200)).unwrap();
        assert_eq!(ScriptStore::max_script_len(&storage), 600);
    }
}
