//! Long-to-long key store for bulk tile-generation ingest.
//!
//! This crate provides:
//! - The `LongLongMap` contract: parallel bulk writes, then concurrent reads
//! - A segmented in-memory backing with lazily created fixed-size segments
//! - A drop-in file-backed (mmap) backing for memory-constrained runs
//! - Per-producer writers with ordered-write enforcement

mod map;
mod mmap;
mod ram;
mod segment;
mod store;

pub use map::{open, LongLongMap, MapWriter};
pub use mmap::{MmapBacking, MmapSegment};
pub use ram::{HeapBacking, HeapSegment};
pub use segment::{Segment, SegmentBacking, SegmentLayout, MAX_SEGMENT_INDEX};
pub use store::SegmentedMap;
