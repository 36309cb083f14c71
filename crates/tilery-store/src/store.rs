//! The segmented store: a growable index of lazily created value segments,
//! the per-producer writer, and the map facade over both backings.

use crate::map::{LongLongMap, MapWriter};
use crate::segment::{Segment, SegmentBacking, SegmentLayout, MAX_SEGMENT_INDEX};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tilery_common::{memory, Result, TileryError};

/// A growable, lazily populated sequence of fixed-size segments.
///
/// The index only ever grows, and a segment, once installed, is never
/// reallocated or moved, so writers may keep references across calls.
/// Mutual exclusion covers only index growth and segment installation;
/// value stores against installed segments take no lock, and lookups hold
/// the index read-side, which is uncontended once the load phase ends.
struct SegmentStore<B: SegmentBacking> {
    backing: B,
    layout: SegmentLayout,
    /// Installed segments; `None` marks a reserved, never-written index.
    slots: RwLock<Vec<Option<Arc<B::Segment>>>>,
    /// Number of segments allocated, counted eagerly so concurrent
    /// memory estimates never undercount.
    allocated: AtomicUsize,
    closed: AtomicBool,
}

impl<B: SegmentBacking> SegmentStore<B> {
    fn new(backing: B, layout: SegmentLayout) -> Self {
        Self {
            backing,
            layout,
            slots: RwLock::new(Vec::new()),
            allocated: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) {
        assert!(!self.is_closed(), "key store used after close");
    }

    /// Returns the segment at `index`, allocating it on first touch.
    ///
    /// Writers may race here for the same index; the first one in installs
    /// the single buffer every later caller observes.
    fn get_or_create(&self, index: u64) -> Result<Arc<B::Segment>> {
        let index = index as usize;
        let mut slots = self.slots.write();

        if slots.len() <= index {
            slots.resize_with(index + 1, || None);
        }

        let slot = &mut slots[index];
        if let Some(segment) = slot {
            return Ok(Arc::clone(segment));
        }

        self.allocated.fetch_add(1, Ordering::Relaxed);
        let segment = match self.backing.allocate(index as u64) {
            Ok(segment) => Arc::new(segment),
            Err(err) => {
                self.allocated.fetch_sub(1, Ordering::Relaxed);
                return Err(err);
            }
        };
        *slot = Some(Arc::clone(&segment));
        Ok(segment)
    }

    /// Reads the raw slot for `key`; 0 means the slot was never written.
    fn load(&self, key: u64) -> u64 {
        let segment_index = self.layout.segment_of(key);
        if segment_index > MAX_SEGMENT_INDEX {
            return 0;
        }

        let slots = self.slots.read();
        match slots.get(segment_index as usize) {
            Some(Some(segment)) => {
                segment.slots()[self.layout.slot_of(key)].load(Ordering::Relaxed)
            }
            _ => 0,
        }
    }
}

/// A `LongLongMap` backed by a segment store over any backing medium.
pub struct SegmentedMap<B: SegmentBacking> {
    store: SegmentStore<B>,
}

impl<B: SegmentBacking> SegmentedMap<B> {
    /// Creates an empty map over `backing`.
    pub fn new(backing: B, layout: SegmentLayout) -> Self {
        Self {
            store: SegmentStore::new(backing, layout),
        }
    }
}

impl<B: SegmentBacking> LongLongMap for SegmentedMap<B> {
    fn new_writer(&self) -> Box<dyn MapWriter + Send + '_> {
        self.store.ensure_open();
        Box::new(SegmentWriter {
            store: &self.store,
            current: None,
        })
    }

    fn get(&self, key: u64) -> Option<u64> {
        self.store.ensure_open();
        match self.store.load(key) {
            0 => None,
            value => Some(value),
        }
    }

    fn disk_usage_bytes(&self) -> u64 {
        self.store.backing.disk_usage_bytes()
    }

    fn estimate_memory_usage_bytes(&self) -> u64 {
        let index_slots = self.store.slots.read().capacity();
        let allocated = self.store.allocated.load(Ordering::Relaxed) as u64;
        memory::estimate_slot_index_bytes(index_slots)
            + allocated * self.store.backing.segment_memory_bytes()
    }

    fn close(&self) -> Result<()> {
        if self.store.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Drop all segments before releasing the medium beneath them.
        self.store.slots.write().clear();
        self.store.backing.release()
    }
}

/// A single-producer write session against one `SegmentedMap`.
struct SegmentWriter<'a, B: SegmentBacking> {
    store: &'a SegmentStore<B>,
    /// The last segment this writer touched, cached so keys within one
    /// segment skip the shared index entirely.
    current: Option<(u64, Arc<B::Segment>)>,
}

impl<B: SegmentBacking> MapWriter for SegmentWriter<'_, B> {
    fn put(&mut self, key: u64, value: u64) -> Result<()> {
        if self.store.is_closed() {
            return Err(TileryError::StoreClosed);
        }

        let layout = self.store.layout;
        let segment_index = layout.segment_of(key);

        match &self.current {
            Some((cached_index, segment)) if *cached_index == segment_index => {
                segment.slots()[layout.slot_of(key)].store(value, Ordering::Relaxed);
            }
            Some((cached_index, _)) if *cached_index > segment_index => {
                return Err(TileryError::OutOfOrderKey {
                    key,
                    segment: segment_index,
                    last_segment: *cached_index,
                });
            }
            _ => {
                if segment_index > MAX_SEGMENT_INDEX {
                    return Err(TileryError::SegmentOverflow {
                        segment: segment_index,
                        max: MAX_SEGMENT_INDEX,
                    });
                }
                let segment = self.store.get_or_create(segment_index)?;
                segment.slots()[layout.slot_of(key)].store(value, Ordering::Relaxed);
                self.current = Some((segment_index, segment));
            }
        }
        Ok(())
    }
}
