//! Configuration structures for the Tilery key store.

use crate::memory;
use crate::{Result, TileryError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use sysinfo::System;

/// Default log2 of the segment size in bytes (1 MiB segments).
pub const DEFAULT_SEGMENT_BITS: u8 = 20;

/// Backing medium for key-store segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Heap-allocated segments; fastest, no disk footprint.
    #[default]
    Ram,
    /// Segments mapped from a scratch file, trading memory pressure for
    /// I/O latency.
    Mmap,
}

impl StorageKind {
    /// Recommends a backing medium for a key domain reaching `max_key`.
    ///
    /// Picks `Ram` when the worst-case resident footprint (every segment up
    /// to `max_key` allocated) fits in 25% of available system memory, and
    /// `Mmap` otherwise.
    pub fn recommended_for(max_key: u64) -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let budget = sys.available_memory() / 4;
        let worst_case = max_key.saturating_mul(memory::VALUE_BYTES as u64);
        if worst_case <= budget {
            StorageKind::Ram
        } else {
            StorageKind::Mmap
        }
    }
}

/// Configuration for a key-store instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyStoreConfig {
    /// Backing medium for segments.
    pub storage: StorageKind,
    /// log2 of the segment size in bytes. Smaller segments waste less
    /// memory on sparse key ranges; larger segments amortize the shared
    /// index lookup over more keys.
    pub segment_bits: u8,
    /// Directory for the scratch file (`Mmap` storage only).
    pub data_dir: PathBuf,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            storage: StorageKind::Ram,
            segment_bits: DEFAULT_SEGMENT_BITS,
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl KeyStoreConfig {
    /// Smallest supported segment size: 8 bytes, one value per segment.
    pub const MIN_SEGMENT_BITS: u8 = 3;
    /// Largest supported segment size: 1 GiB per segment.
    pub const MAX_SEGMENT_BITS: u8 = 30;

    /// Returns the segment size in bytes.
    pub fn segment_size_bytes(&self) -> usize {
        1 << self.segment_bits
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(Self::MIN_SEGMENT_BITS..=Self::MAX_SEGMENT_BITS).contains(&self.segment_bits) {
            return Err(TileryError::InvalidParameter {
                name: "segment_bits".to_string(),
                value: self.segment_bits.to_string(),
            });
        }
        Ok(())
    }
}
