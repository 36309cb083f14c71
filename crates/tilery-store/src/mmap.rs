//! File-backed segments mapped on demand.
//!
//! All segments live in one sparse scratch file; each segment is an
//! independent mapped window at byte offset `index << segment_bits`.
//! Windows are created lazily and never remapped, so the addressing scheme
//! and stability guarantees match the heap backing exactly.

use crate::segment::{Segment, SegmentBacking, SegmentLayout};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use tilery_common::{memory, Result};

/// Name of the scratch file holding all segments.
const SCRATCH_FILE: &str = "keystore.dat";

/// One segment mapped from the scratch file.
pub struct MmapSegment {
    /// Holding this keeps the window mapped; dropping it unmaps the
    /// region, so it must outlive every reference handed out by `slots`.
    #[allow(dead_code)]
    mmap: MmapMut,
    ptr: *mut u8,
    slots: usize,
}

// The window is owned by this segment and only ever accessed through its
// atomic slots.
unsafe impl Send for MmapSegment {}
unsafe impl Sync for MmapSegment {}

impl Segment for MmapSegment {
    #[inline(always)]
    fn slots(&self) -> &[AtomicU64] {
        // The window starts at a multiple of the segment size, itself a
        // multiple of 8, satisfying AtomicU64 alignment; it covers exactly
        // `slots * 8` bytes.
        unsafe { std::slice::from_raw_parts(self.ptr as *const AtomicU64, self.slots) }
    }
}

/// Allocates segments as mapped windows of one sparse scratch file.
pub struct MmapBacking {
    file: File,
    path: PathBuf,
    segment_bytes: usize,
    slots_per_segment: usize,
}

impl MmapBacking {
    /// Creates the scratch file under `dir`, truncating any leftover from
    /// an earlier run.
    pub fn create(dir: &Path, layout: SegmentLayout) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(SCRATCH_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        Ok(Self {
            file,
            path,
            segment_bytes: layout.segment_bytes(),
            slots_per_segment: layout.slots_per_segment(),
        })
    }

    /// Returns the path of the scratch file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SegmentBacking for MmapBacking {
    type Segment = MmapSegment;

    fn allocate(&self, index: u64) -> Result<MmapSegment> {
        let offset = index * self.segment_bytes as u64;
        let end = offset + self.segment_bytes as u64;

        // Extend the file to cover this segment. Skipped-over regions stay
        // holes in the sparse file until their segment is first touched.
        if self.file.metadata()?.len() < end {
            self.file.set_len(end)?;
        }

        let mut mmap = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(self.segment_bytes)
                .map_mut(&self.file)?
        };
        let ptr = mmap.as_mut_ptr();

        Ok(MmapSegment {
            mmap,
            ptr,
            slots: self.slots_per_segment,
        })
    }

    fn disk_usage_bytes(&self) -> u64 {
        self.file.metadata().map(|m| m.len()).unwrap_or(0)
    }

    fn segment_memory_bytes(&self) -> u64 {
        // Mapped pages are file-backed and reclaimable under pressure;
        // only the mapping bookkeeping counts against resident memory.
        (memory::ARC_HEADER_BYTES + std::mem::size_of::<MmapSegment>()) as u64
    }

    fn release(&self) -> Result<()> {
        // The store holds scratch data for a single run; nothing survives.
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn create_test_backing(segment_bits: u8) -> (MmapBacking, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let backing = MmapBacking::create(dir.path(), SegmentLayout::new(segment_bits)).unwrap();
        (backing, dir)
    }

    #[test]
    fn test_create_scratch_file() {
        let (backing, dir) = create_test_backing(10);
        assert!(backing.path().exists());
        assert_eq!(backing.path(), dir.path().join(SCRATCH_FILE));
        assert_eq!(backing.disk_usage_bytes(), 0);
    }

    #[test]
    fn test_allocate_extends_file() {
        let (backing, _dir) = create_test_backing(10);

        backing.allocate(0).unwrap();
        assert_eq!(backing.disk_usage_bytes(), 1024);

        // Skipping ahead leaves a hole but extends the length.
        backing.allocate(4).unwrap();
        assert_eq!(backing.disk_usage_bytes(), 5 * 1024);
    }

    #[test]
    fn test_allocate_zeroed_and_writable() {
        let (backing, _dir) = create_test_backing(10);
        let segment = backing.allocate(2).unwrap();

        assert_eq!(segment.slots().len(), 128);
        assert_eq!(segment.slots()[0].load(Ordering::Relaxed), 0);

        segment.slots()[5].store(777, Ordering::Relaxed);
        assert_eq!(segment.slots()[5].load(Ordering::Relaxed), 777);
    }

    #[test]
    fn test_segments_are_independent_windows() {
        let (backing, _dir) = create_test_backing(10);
        let first = backing.allocate(0).unwrap();
        let second = backing.allocate(1).unwrap();

        first.slots()[0].store(1, Ordering::Relaxed);
        second.slots()[0].store(2, Ordering::Relaxed);

        assert_eq!(first.slots()[0].load(Ordering::Relaxed), 1);
        assert_eq!(second.slots()[0].load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_release_deletes_scratch_file() {
        let (backing, _dir) = create_test_backing(10);
        backing.allocate(0).unwrap();

        let path = backing.path().to_path_buf();
        assert!(path.exists());
        backing.release().unwrap();
        assert!(!path.exists());
    }
}
