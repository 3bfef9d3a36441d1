//! Index-tracked binary min-heap keyed by due time
//!
//! Targets learn their slot through `heap_idx` on every sift so that the
//! control surface can delete them from the middle of the heap. A target
//! is on the heap iff its `heap_idx` is not NOIDX; violating that is a
//! programming error and panics.

use std::sync::Arc;

use super::target::Target;

/// Sentinel for "not on the heap"
pub(crate) const NOIDX: usize = usize::MAX;

#[derive(Debug, Default)]
pub(crate) struct DueHeap {
    slots: Vec<Arc<Target>>,
}

impl DueHeap {
    /// The target due soonest, if any
    pub fn root(&self) -> Option<&Arc<Target>> {
        self.slots.first()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn insert(&mut self, vt: Arc<Target>) {
        assert_eq!(vt.heap_idx(), NOIDX, "target already on the probe heap");
        let idx = self.slots.len();
        self.slots.push(vt);
        self.set_idx(idx);
        self.sift_up(idx);
    }

    /// Remove the target at `idx` and return it
    pub fn delete(&mut self, idx: usize) -> Arc<Target> {
        assert!(idx < self.slots.len(), "heap index out of range");
        assert_eq!(self.slots[idx].heap_idx(), idx, "corrupt heap index");

        let removed = self.slots.swap_remove(idx);
        removed.set_heap_idx(NOIDX);

        if idx < self.slots.len() {
            self.set_idx(idx);
            self.sift_down(idx);
            self.sift_up(idx);
        }
        removed
    }

    fn set_idx(&self, idx: usize) {
        self.slots[idx].set_heap_idx(idx);
    }

    fn less(&self, a: usize, b: usize) -> bool {
        self.slots[a].due_ms() < self.slots[b].due_ms()
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.less(idx, parent) {
                break;
            }
            self.slots.swap(idx, parent);
            self.set_idx(idx);
            self.set_idx(parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        loop {
            let left = 2 * idx + 1;
            if left >= self.slots.len() {
                break;
            }
            let right = left + 1;
            let mut child = left;
            if right < self.slots.len() && self.less(right, left) {
                child = right;
            }
            if !self.less(child, idx) {
                break;
            }
            self.slots.swap(idx, child);
            self.set_idx(idx);
            self.set_idx(child);
            idx = child;
        }
    }
}
