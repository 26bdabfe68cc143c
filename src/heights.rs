//! Cumulative row-height index: prefix sums over display-list row heights.
//!
//! Maps a vertical pixel offset to a display index (Fenwick lower bound) and
//! a display index to its offset (prefix sum). Rows may override the default
//! height (detail rows typically do), so the index is rebuilt from the
//! display list on each pipeline rerun and point-updated when a single row's
//! height changes.

use core::cmp;

#[derive(Clone, Debug, Default)]
pub(crate) struct HeightIndex {
    heights: Vec<u32>,
    tree: Vec<u64>, // 1-indexed Fenwick tree
    total: u64,
    max_bit: usize,
}

impl HeightIndex {
    pub(crate) fn from_heights(heights: Vec<u32>) -> Self {
        let n = heights.len();
        let mut tree = vec![0u64; n + 1];
        let mut total = 0u64;
        for i in 1..=n {
            let v = heights[i - 1] as u64;
            total = total.saturating_add(v);
            tree[i] = tree[i].saturating_add(v);
            let j = i + lsb(i);
            if j <= n {
                tree[j] = tree[j].saturating_add(tree[i]);
            }
        }
        Self {
            heights,
            tree,
            total,
            max_bit: if n == 0 { 0 } else { highest_power_of_two_leq(n) },
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.heights.len()
    }

    pub(crate) fn total(&self) -> u64 {
        self.total
    }

    pub(crate) fn height_of(&self, index: usize) -> Option<u32> {
        self.heights.get(index).copied()
    }

    /// Offset of a row's top edge. O(log n).
    pub(crate) fn offset_of(&self, index: usize) -> u64 {
        let mut i = cmp::min(index, self.len());
        let mut sum = 0u64;
        while i > 0 {
            sum = sum.saturating_add(self.tree[i]);
            i &= i - 1;
        }
        sum
    }

    /// Row index containing a vertical offset, `None` past the end.
    pub(crate) fn index_at(&self, offset: u64) -> Option<usize> {
        let n = self.len();
        if n == 0 || offset >= self.total {
            return None;
        }
        Some(self.lower_bound(offset).min(n - 1))
    }

    /// Point height update; keeps the prefix sums consistent. O(log n).
    pub(crate) fn set_height(&mut self, index: usize, height: u32) {
        let n = self.len();
        if index >= n {
            return;
        }
        let cur = self.heights[index];
        if cur == height {
            return;
        }
        self.heights[index] = height;
        let delta = height as i64 - cur as i64;
        if delta > 0 {
            self.total = self.total.saturating_add(delta as u64);
        } else {
            self.total = self.total.saturating_sub((-delta) as u64);
        }
        let mut i = index + 1;
        while i <= n {
            let cur = self.tree[i] as i128;
            let next = cur + delta as i128;
            debug_assert!(next >= 0, "height index underflow (idx={i}, delta={delta})");
            self.tree[i] = next.clamp(0, u64::MAX as i128) as u64;
            i += lsb(i);
        }
    }

    /// Number of rows whose prefix sum is <= `target`.
    fn lower_bound(&self, mut target: u64) -> usize {
        let n = self.len();
        if n == 0 {
            return 0;
        }
        let mut idx = 0usize;
        let mut bit = self.max_bit;
        while bit != 0 {
            let next = idx + bit;
            if next <= n && self.tree[next] <= target {
                target -= self.tree[next];
                idx = next;
            }
            bit >>= 1;
        }
        idx
    }
}

fn lsb(i: usize) -> usize {
    i & i.wrapping_neg()
}

fn highest_power_of_two_leq(n: usize) -> usize {
    let mut p = 1usize;
    while p <= n / 2 {
        p <<= 1;
    }
    p
}
