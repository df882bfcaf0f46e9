//! One-sided communication windows.
//!
//! A window exposes one region of `i32` words per rank. `get` takes a shared
//! lock on the target region and `put` an exclusive one, the way a
//! passive-target epoch brackets a single remote access.

use parking_lot::RwLock;

#[derive(Debug)]
pub struct RmaWindow {
    regions: Vec<RwLock<Vec<i32>>>,
    size: usize,
}

impl RmaWindow {
    /// `world_size` regions of `size` words, all set to `init`.
    pub fn new(world_size: usize, size: usize, init: i32) -> Self {
        RmaWindow {
            regions: (0..world_size).map(|_| RwLock::new(vec![init; size])).collect(),
            size,
        }
    }

    pub fn region_size(&self) -> usize {
        self.size
    }

    pub fn get_one(&self, rank: usize, index: usize) -> i32 {
        self.regions[rank].read().get(index).copied().unwrap_or(0)
    }

    /// Copy `len` words of the region of `rank` starting at `index`.
    pub fn get(&self, rank: usize, index: usize, len: usize) -> Vec<i32> {
        let region = self.regions[rank].read();
        let end = (index + len).min(region.len());
        region[index.min(end)..end].to_vec()
    }

    /// Read into a caller-owned buffer, avoiding an allocation per poll.
    pub fn get_into(&self, rank: usize, index: usize, out: &mut Vec<i32>) {
        let region = self.regions[rank].read();
        out.clear();
        out.extend_from_slice(region.get(index..).unwrap_or(&[]));
    }

    pub fn put_one(&self, rank: usize, index: usize, value: i32) {
        self.put(rank, index, &[value]);
    }

    /// Write `values` at `index` of the region of `rank`; words past the
    /// region end are dropped.
    pub fn put(&self, rank: usize, index: usize, values: &[i32]) {
        let mut region = self.regions[rank].write();
        debug_assert!(index + values.len() <= region.len(), "put past the window end");
        for (slot, v) in region.iter_mut().skip(index).zip(values) {
            *slot = *v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regions_are_independent() {
        let w = RmaWindow::new(3, 4, 7);
        w.put(1, 1, &[1, 2]);
        assert_eq!(w.get(1, 0, 4), vec![7, 1, 2, 7]);
        assert_eq!(w.get(0, 0, 4), vec![7; 4]);
        assert_eq!(w.get_one(1, 2), 2);
        w.put_one(2, 3, -1);
        let mut buf = Vec::new();
        w.get_into(2, 2, &mut buf);
        assert_eq!(buf, vec![7, -1]);
    }
}
