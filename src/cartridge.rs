//! Cartridge ROM
//!
//! The cartridge is an opaque read-only device in the 4K window selected by
//! address line A12. Only unbanked 2K and 4K images are supported; a 2K image
//! appears twice in the window.

use std::fmt;
use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of the cartridge address window
pub const CARTRIDGE_WINDOW: usize = 4 * 1024;

const SUPPORTED_SIZES: [usize; 2] = [2 * 1024, 4 * 1024];

/// Errors that can occur when loading ROM images
#[derive(Error, Debug)]
pub enum CartridgeError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unsupported ROM size: {0} bytes (expected 2048 or 4096)")]
    InvalidRomSize(usize),
}

/// Cartridge ROM image
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cartridge {
    rom: Vec<u8>,
}

impl fmt::Debug for Cartridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cartridge")
            .field("size", &self.rom.len())
            .finish()
    }
}

impl Cartridge {
    /// Create a cartridge from a raw ROM image
    pub fn from_bytes(data: &[u8]) -> Result<Self, CartridgeError> {
        if !SUPPORTED_SIZES.contains(&data.len()) {
            return Err(CartridgeError::InvalidRomSize(data.len()));
        }

        debug!("Cartridge image: {} bytes", data.len());
        Ok(Cartridge { rom: data.to_vec() })
    }

    /// Load a ROM image from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CartridgeError> {
        let data = fs::read(path.as_ref())?;
        let cartridge = Self::from_bytes(&data)?;
        info!("Loaded ROM {} ({} bytes)", path.as_ref().display(), data.len());
        Ok(cartridge)
    }

    /// Built-in image used by the display kernel: a 256 entry colour table
    /// at the start of the window, one background colour per visible row
    pub fn demo() -> Self {
        let mut rom = vec![0; CARTRIDGE_WINDOW];
        for (row, byte) in rom.iter_mut().take(256).enumerate() {
            let hue = (row / 16) as u8;
            let luma = (row % 8) as u8;
            *byte = (hue << 4) | (luma << 1);
        }
        Cartridge { rom }
    }

    pub fn size(&self) -> usize {
        self.rom.len()
    }

    /// Read from the cartridge window; `addr` is masked to the ROM size
    pub fn peek(&self, addr: u16) -> u8 {
        self.rom[addr as usize % self.rom.len()]
    }
}
