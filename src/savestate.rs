//! Snapshot serialization
//!
//! A [`Serializer`] is a byte buffer with a read cursor. Components append
//! their state with [`Serializer::put`] and read it back in the same order
//! with [`Serializer::get`]. Every buffer starts with a magic number and a
//! format version so that snapshots from an incompatible build are rejected
//! before any component is touched.
//!
//! Values are encoded with bincode through its serde integration.

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Current save state format version
pub const CURRENT_SAVE_STATE_VERSION: u32 = 1;

const MAGIC: &[u8; 4] = b"VCSS";

const HEADER_SIZE: usize = MAGIC.len() + 4;

/// Errors that can occur during save state operations
#[derive(Error, Debug)]
pub enum SaveStateError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::error::EncodeError),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] bincode::error::DecodeError),

    #[error("Not a save state")]
    BadMagic,

    #[error("Incompatible save state version: found {0}, expected {1}")]
    IncompatibleVersion(u32, u32),

    #[error("Save state has {0} unread bytes")]
    TrailingData(usize),
}

fn config() -> bincode::config::Configuration {
    bincode::config::standard()
}

/// Snapshot buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Serializer {
    data: Vec<u8>,

    /// Read position
    cursor: usize,
}

impl Default for Serializer {
    fn default() -> Self {
        Serializer::new()
    }
}

impl Serializer {
    /// Empty snapshot containing only the header
    pub fn new() -> Self {
        let mut data = Vec::with_capacity(HEADER_SIZE);
        data.extend_from_slice(MAGIC);
        data.extend_from_slice(&CURRENT_SAVE_STATE_VERSION.to_le_bytes());

        Serializer {
            data,
            cursor: HEADER_SIZE,
        }
    }

    /// Wrap existing snapshot bytes, checking the header
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, SaveStateError> {
        if data.len() < HEADER_SIZE || &data[..MAGIC.len()] != MAGIC {
            return Err(SaveStateError::BadMagic);
        }

        let mut version = [0; 4];
        version.copy_from_slice(&data[MAGIC.len()..HEADER_SIZE]);
        let version = u32::from_le_bytes(version);
        if version != CURRENT_SAVE_STATE_VERSION {
            return Err(SaveStateError::IncompatibleVersion(
                version,
                CURRENT_SAVE_STATE_VERSION,
            ));
        }

        Ok(Serializer {
            data,
            cursor: HEADER_SIZE,
        })
    }

    /// Append a value
    pub fn put<T: Serialize>(&mut self, value: &T) -> Result<(), SaveStateError> {
        let encoded = bincode::serde::encode_to_vec(value, config())?;
        self.data.extend_from_slice(&encoded);
        Ok(())
    }

    /// Read the next value; the cursor only moves on success
    pub fn get<T: DeserializeOwned>(&mut self) -> Result<T, SaveStateError> {
        let (value, read) = bincode::serde::decode_from_slice(&self.data[self.cursor..], config())?;
        self.cursor += read;
        Ok(value)
    }

    /// Fail if anything is left unread
    pub fn finish(&self) -> Result<(), SaveStateError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(SaveStateError::TrailingData(n)),
        }
    }

    /// Unread bytes
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// Move the read cursor back to the first value
    pub fn rewind(&mut self) {
        self.cursor = HEADER_SIZE;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether no values have been written
    pub fn is_empty(&self) -> bool {
        self.data.len() <= HEADER_SIZE
    }

    /// Save state to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SaveStateError> {
        fs::write(path.as_ref(), &self.data)?;
        info!("Save state written to {}", path.as_ref().display());
        Ok(())
    }

    /// Load state from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SaveStateError> {
        let data = fs::read(path.as_ref())?;
        debug!("Read {} bytes from {}", data.len(), path.as_ref().display());
        Self::from_bytes(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_in_order() {
        let mut s = Serializer::new();
        s.put(&42u32).unwrap();
        s.put(&vec![1u8, 2, 3]).unwrap();
        s.put(&(true, -7i16)).unwrap();

        let mut s = Serializer::from_bytes(s.into_bytes()).unwrap();
        assert_eq!(s.get::<u32>().unwrap(), 42);
        assert_eq!(s.get::<Vec<u8>>().unwrap(), vec![1, 2, 3]);
        assert_eq!(s.get::<(bool, i16)>().unwrap(), (true, -7));
        assert!(s.finish().is_ok());
    }

    #[test]
    fn test_failed_read_keeps_cursor() {
        let mut s = Serializer::new();
        s.put(&1u8).unwrap();

        assert!(s.get::<(u8, u64)>().is_err());
        assert_eq!(s.get::<u8>().unwrap(), 1);
    }

    #[test]
    fn test_trailing_data() {
        let mut s = Serializer::new();
        s.put(&1u8).unwrap();
        s.put(&2u8).unwrap();
        s.get::<u8>().unwrap();
        assert!(matches!(s.finish(), Err(SaveStateError::TrailingData(1))));
    }

    #[test]
    fn test_header_checks() {
        assert!(matches!(
            Serializer::from_bytes(b"junk".to_vec()),
            Err(SaveStateError::BadMagic)
        ));

        let mut data = Serializer::new().into_bytes();
        data[4] = 99;
        assert!(matches!(
            Serializer::from_bytes(data),
            Err(SaveStateError::IncompatibleVersion(99, CURRENT_SAVE_STATE_VERSION))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("rusty_vcs_state_{}.bin", std::process::id()));

        let mut s = Serializer::new();
        s.put(&"snapshot").unwrap();
        s.save_to_file(&path).unwrap();

        let mut loaded = Serializer::load_from_file(&path).unwrap();
        assert_eq!(loaded.get::<String>().unwrap(), "snapshot");

        fs::remove_file(&path).unwrap();
    }
}
