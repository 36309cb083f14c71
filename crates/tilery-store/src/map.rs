//! The long-to-long map contract and backing selection.

use crate::mmap::MmapBacking;
use crate::ram::HeapBacking;
use crate::segment::SegmentLayout;
use crate::store::SegmentedMap;
use tilery_common::{KeyStoreConfig, Result, StorageKind};

/// A write session bound to one map, owned by a single producer thread.
///
/// Keys presented to one writer must be non-decreasing by segment index:
/// any order is fine within a segment, but once a writer has crossed a
/// segment boundary it can never go back. Violations mean the upstream
/// producer did not honor its assigned ordered sub-range and fail the
/// call with an unrecoverable error.
pub trait MapWriter {
    /// Stores `value` under `key`.
    ///
    /// Fails with `OutOfOrderKey` when `key` maps to a segment behind one
    /// this writer already advanced past, with `SegmentOverflow` when the
    /// segment index leaves the addressable range, and with `StoreClosed`
    /// when the owning map has been closed.
    fn put(&mut self, key: u64, value: u64) -> Result<()>;
}

/// A map from `u64` keys to `u64` values, bulk-loaded once by parallel
/// writers and then read concurrently.
///
/// The lifecycle has two phases: during bulk load, each producer thread
/// owns one writer and streams its assigned key sub-range; after the
/// orchestrating pipeline's load barrier, any number of threads may call
/// [`LongLongMap::get`] with no further synchronization. Distinct writers
/// must not target the same key offsets at the same instant; the usual
/// arrangement gives each producer a disjoint-by-segment key range.
///
/// Storing the value `0` is indistinguishable from never storing the key:
/// `get` answers `None` for both. Callers whose values can legitimately
/// serialize to zero must bias them (e.g. add 1) before storing.
pub trait LongLongMap: Send + Sync {
    /// Creates a fresh writer bound to this map's segments.
    ///
    /// May be called any number of times; each independent producer thread
    /// takes its own writer.
    fn new_writer(&self) -> Box<dyn MapWriter + Send + '_>;

    /// Returns the value stored under `key`, or `None` if absent.
    ///
    /// Absence is a normal outcome for sparse domains and never an error.
    fn get(&self, key: u64) -> Option<u64>;

    /// Bytes resident on persistent storage for this instance.
    fn disk_usage_bytes(&self) -> u64;

    /// Estimated resident memory: segment-index overhead (including
    /// reserved placeholder entries) plus all allocated segments.
    ///
    /// Safe to poll at any time, including mid-load; O(1), and never
    /// undercounts the actually allocated memory.
    fn estimate_memory_usage_bytes(&self) -> u64;

    /// Releases all backing resources. Closing twice is a no-op; any
    /// other use after close fails loudly.
    fn close(&self) -> Result<()>;
}

/// Opens a key store with the backing medium selected by `config`.
pub fn open(config: &KeyStoreConfig) -> Result<Box<dyn LongLongMap>> {
    config.validate()?;
    let layout = SegmentLayout::new(config.segment_bits);

    Ok(match config.storage {
        StorageKind::Ram => Box::new(SegmentedMap::new(HeapBacking::new(layout), layout)),
        StorageKind::Mmap => {
            let backing = MmapBacking::create(&config.data_dir, layout)?;
            Box::new(SegmentedMap::new(backing, layout))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilery_common::TileryError;

    #[test]
    fn test_open_ram_store() {
        let map = open(&KeyStoreConfig::default()).unwrap();

        let mut writer = map.new_writer();
        writer.put(100, 7).unwrap();
        drop(writer);

        assert_eq!(map.get(100), Some(7));
        assert_eq!(map.get(101), None);
        assert_eq!(map.disk_usage_bytes(), 0);
    }

    #[test]
    fn test_open_mmap_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = KeyStoreConfig {
            storage: StorageKind::Mmap,
            segment_bits: 10,
            data_dir: dir.path().to_path_buf(),
        };
        let map = open(&config).unwrap();

        let mut writer = map.new_writer();
        writer.put(0, 1).unwrap();
        writer.put(500, 2).unwrap();
        drop(writer);

        assert_eq!(map.get(0), Some(1));
        assert_eq!(map.get(500), Some(2));
        assert!(map.disk_usage_bytes() > 0);

        map.close().unwrap();
        assert!(!dir.path().join("keystore.dat").exists());
    }

    #[test]
    fn test_open_rejects_invalid_segment_bits() {
        let config = KeyStoreConfig {
            segment_bits: 2,
            ..Default::default()
        };
        let err = open(&config).err().unwrap();
        assert!(matches!(err, TileryError::InvalidParameter { .. }));
    }

    #[test]
    fn test_writers_are_send() {
        fn assert_send<T: Send + ?Sized>() {}
        assert_send::<dyn MapWriter + Send>();
    }
}
