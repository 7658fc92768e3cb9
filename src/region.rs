//! Byte-range reservations inside a PURB header.
//!
//! Entry points and the payload take exclusive reservations; cornerstones are
//! recorded without the check.

/// A reserved half-open byte interval `[start, end)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Region {
    pub start: usize,
    pub end: usize,
    pub tag: String,
}

impl Region {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }
}

/// Set of reserved regions, kept sorted by start position.
#[derive(Clone, Debug, Default)]
pub struct RegionReservation {
    regions: Vec<Region>,
}

impl RegionReservation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `[start, end)` under `tag`.
    ///
    /// With `require_free`, fails and leaves the reservations untouched if any
    /// byte of the range is already reserved. Without it the range is recorded
    /// whatever it overlaps. Empty ranges are refused.
    pub fn reserve(&mut self, start: usize, end: usize, require_free: bool, tag: &str) -> bool {
        if end <= start {
            return false;
        }
        if require_free && !self.is_free(start, end) {
            return false;
        }
        self.regions.push(Region {
            start,
            end,
            tag: tag.to_string(),
        });
        insertion_sort(&mut self.regions);
        true
    }

    /// True if no reservation touches `[start, end)`.
    pub fn is_free(&self, start: usize, end: usize) -> bool {
        !self.regions.iter().any(|r| r.overlaps(start, end))
    }

    /// Call `f(gap_start, gap_end)` for every maximal unreserved interval in
    /// `[0, total_len)`, in ascending order. Empty gaps are skipped.
    pub fn scan_free_regions<F: FnMut(usize, usize)>(&self, mut f: F, total_len: usize) {
        let mut cursor = 0;
        for region in &self.regions {
            if cursor >= total_len {
                return;
            }
            if region.start > cursor {
                f(cursor, region.start.min(total_len));
            }
            cursor = cursor.max(region.end);
        }
        if cursor < total_len {
            f(cursor, total_len);
        }
    }

    /// Collected form of [`RegionReservation::scan_free_regions`].
    pub fn free_regions(&self, total_len: usize) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        self.scan_free_regions(|start, end| out.push((start, end)), total_len);
        out
    }

    /// One past the last reserved byte, or 0 when nothing is reserved.
    pub fn high_water_mark(&self) -> usize {
        self.regions.iter().map(|r| r.end).max().unwrap_or(0)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }
}

/// Stable insertion sort by start position.
///
/// The region count is bounded by recipients and suites, never by payload size.
fn insertion_sort(regions: &mut [Region]) {
    for i in 1..regions.len() {
        let mut j = i;
        while j > 0 && regions[j - 1].start > regions[j].start {
            regions.swap(j - 1, j);
            j -= 1;
        }
    }
}
