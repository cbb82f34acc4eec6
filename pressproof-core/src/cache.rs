//! Per-document store of fetched page rasters.
//!
//! One cache per document, discarded wholesale when the document changes;
//! there is no partial invalidation and no eviction (the footprint is bounded
//! by the page count). `Pending` doubles as the coalescing guard: a page with
//! an in-flight request is never requested again until the result lands.

use bytes::Bytes;
use std::collections::HashMap;

/// Opaque encoded page image, immutable once cached. `placeholder` marks a
/// synthetic page substituted by the rendering service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRaster {
    pub payload: Bytes,
    pub placeholder: bool,
}

impl PageRaster {
    pub fn new(payload: Bytes) -> Self {
        Self {
            payload,
            placeholder: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSlot {
    /// Never requested.
    Missing,
    /// Request in flight.
    Pending,
    Ready(PageRaster),
    /// Fetch failed; retried once per re-navigation, never per render.
    Failed,
    /// Page number outside `[1, page_count]`: a visually distinct blank slot.
    Absent,
}

#[derive(Debug, Default)]
pub struct PageCache {
    page_count: u32,
    slots: HashMap<u32, PageSlot>,
}

impl PageCache {
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            slots: HashMap::new(),
        }
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    fn in_range(&self, page: u32) -> bool {
        page >= 1 && page <= self.page_count
    }

    pub fn slot(&self, page: u32) -> PageSlot {
        if !self.in_range(page) {
            return PageSlot::Absent;
        }
        self.slots.get(&page).cloned().unwrap_or(PageSlot::Missing)
    }

    /// Marks a page in flight. Returns false for out-of-range pages and for
    /// pages already pending or ready, so duplicate fetches coalesce.
    pub fn mark_pending(&mut self, page: u32) -> bool {
        if !self.in_range(page) {
            return false;
        }
        match self.slots.get(&page) {
            Some(PageSlot::Pending) | Some(PageSlot::Ready(_)) => false,
            _ => {
                self.slots.insert(page, PageSlot::Pending);
                true
            }
        }
    }

    /// Stores a fetched raster. A raster already cached wins: slots are
    /// immutable once ready.
    pub fn complete(&mut self, page: u32, raster: PageRaster) {
        if !self.in_range(page) {
            return;
        }
        if matches!(self.slots.get(&page), Some(PageSlot::Ready(_))) {
            return;
        }
        self.slots.insert(page, PageSlot::Ready(raster));
    }

    pub fn fail(&mut self, page: u32) {
        if !self.in_range(page) {
            return;
        }
        if matches!(self.slots.get(&page), Some(PageSlot::Ready(_))) {
            return;
        }
        self.slots.insert(page, PageSlot::Failed);
    }

    pub fn ready_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot, PageSlot::Ready(_)))
            .count()
    }
}

/// A fetch the scheduler wants issued, with its rendering-quality hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub page: u32,
    pub width: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(byte: u8) -> PageRaster {
        PageRaster::new(Bytes::from(vec![byte]))
    }

    #[test]
    fn out_of_range_pages_are_absent() {
        let cache = PageCache::new(3);
        assert_eq!(cache.slot(0), PageSlot::Absent);
        assert_eq!(cache.slot(4), PageSlot::Absent);
        assert_eq!(cache.slot(1), PageSlot::Missing);
    }

    #[test]
    fn pending_coalesces_duplicate_fetches() {
        let mut cache = PageCache::new(5);
        assert!(cache.mark_pending(2));
        assert!(!cache.mark_pending(2));
        assert_eq!(cache.slot(2), PageSlot::Pending);
        assert!(!cache.mark_pending(0));
    }

    #[test]
    fn ready_slots_are_immutable() {
        let mut cache = PageCache::new(5);
        cache.mark_pending(1);
        cache.complete(1, raster(7));
        cache.complete(1, raster(9));
        cache.fail(1);
        match cache.slot(1) {
            PageSlot::Ready(r) => assert_eq!(r.payload.as_ref(), &[7]),
            other => panic!("unexpected slot: {:?}", other),
        }
        assert!(!cache.mark_pending(1));
    }

    #[test]
    fn failed_pages_can_be_marked_pending_again() {
        let mut cache = PageCache::new(5);
        cache.mark_pending(3);
        cache.fail(3);
        assert_eq!(cache.slot(3), PageSlot::Failed);
        assert!(cache.mark_pending(3));
    }

    #[test]
    fn zero_page_document_has_no_slots() {
        let mut cache = PageCache::new(0);
        assert_eq!(cache.slot(1), PageSlot::Absent);
        assert!(!cache.mark_pending(1));
    }
}
