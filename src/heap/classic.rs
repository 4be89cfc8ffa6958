//! The classic external-memory heap (§4.7): a binary heap over variable
//! IDs with an inverse index, percolated under per-index locks that are
//! real `HashSet` bookkeeping, not a debug-only stand-in. Grounded on the
//! original accelerator's `Heap` sub-component (`percolateUp`/
//! `percolateDown`/`removeMin`/`varBump`), re-architected per §9 as
//! explicit step machines over a shared arena rather than stackful
//! coroutines spinning on a yield pointer.

use std::collections::HashSet;

use crate::activity::ActivityVector;
use crate::formula::Var;
use crate::sched::WorkerState;

use super::{HeapOp, HeapResp, VsidsHeap};

/// `indices[v]` is `None` exactly when `v` is not currently in the heap
/// (I1); this is the in-process analogue of the external `-1` sentinel
/// the spec's Q1 insists must be the value left behind by `removeMin`,
/// never the aliasing `0`.
pub struct ClassicHeap {
    heap: Vec<Var>,
    indices: vec_map::VecMap<usize>,
    /// Per-index lock bits (§3, §4.7), live on every build: `insert`
    /// returning `false` is a held lock another lane must spin-yield on,
    /// not a debug-only assertion.
    locks: HashSet<usize>,
}

/// Ordering used throughout: VSIDS means "higher activity wins" (Q2) —
/// `before(a, b)` is true when `a` belongs above `b` in heap order.
#[inline]
fn before(activity: &ActivityVector, a: Var, b: Var) -> bool {
    activity.read(a) > activity.read(b)
}

impl ClassicHeap {
    pub fn new() -> Self {
        ClassicHeap {
            heap: Vec::new(),
            indices: vec_map::VecMap::new(),
            locks: HashSet::new(),
        }
    }

    pub fn contains(&self, v: Var) -> bool {
        self.indices.contains_key(v.index())
    }

    pub fn position_of(&self, v: Var) -> Option<usize> {
        self.indices.get(v.index()).copied()
    }

    pub fn read_at(&self, pos: usize) -> Option<Var> {
        self.heap.get(pos).copied()
    }

    fn acquire(&mut self, i: usize) -> bool {
        self.locks.insert(i)
    }

    fn release(&mut self, i: usize) {
        self.locks.remove(&i);
    }

    /// A single concurrent percolate-up lane (§4.7: "acquire lock for
    /// the current index and its parent, spin-yield if held"). The lane
    /// keeps holding its own current-index lock across calls from the
    /// moment it first acquires it until it settles, so a genuinely
    /// concurrent second lane checking the same index mid-flight
    /// observes the hold rather than a freshly-released slot. This is
    /// the sole percolate-up path: `insert`/`bump` below drive it to
    /// completion rather than duplicating its comparison logic behind a
    /// debug-only assertion.
    pub fn step_percolate_up(
        &mut self,
        state: &mut PercolateUpState,
        activity: &ActivityVector,
    ) -> WorkerState<()> {
        if !state.holds_self {
            if self.locks.contains(&state.i) {
                return WorkerState::Yielded;
            }
            self.locks.insert(state.i);
            state.holds_self = true;
        }

        if state.i == 0 {
            self.indices.insert(self.heap[0].index(), 0);
            self.locks.remove(&state.i);
            state.holds_self = false;
            return WorkerState::Done(());
        }

        let parent = (state.i - 1) >> 1;
        if self.locks.contains(&parent) {
            return WorkerState::Yielded;
        }
        self.locks.insert(parent);

        if before(activity, self.heap[state.i], self.heap[parent]) {
            self.heap.swap(state.i, parent);
            self.indices.insert(self.heap[state.i].index(), state.i);
            self.indices.insert(self.heap[parent].index(), parent);
            self.locks.remove(&state.i);
            // `holds_self` stays true: the lock we just took on `parent`
            // now stands for our own position, carried forward as the
            // new `state.i`.
            state.i = parent;
            WorkerState::Yielded
        } else {
            self.indices.insert(self.heap[state.i].index(), state.i);
            self.locks.remove(&parent);
            self.locks.remove(&state.i);
            state.holds_self = false;
            WorkerState::Done(())
        }
    }

    fn run_percolate_up(&mut self, i: usize, activity: &ActivityVector) {
        let mut state = PercolateUpState::new(i);
        loop {
            if let WorkerState::Done(()) = self.step_percolate_up(&mut state, activity) {
                break;
            }
        }
    }

    fn percolate_down(&mut self, mut i: usize, activity: &ActivityVector) {
        loop {
            let l = 2 * i + 1;
            if l >= self.heap.len() {
                break;
            }
            let r = l + 1;
            let smaller_child = if r < self.heap.len() && before(activity, self.heap[r], self.heap[l]) {
                r
            } else {
                l
            };

            self.acquire(i);
            self.acquire(smaller_child);
            if before(activity, self.heap[smaller_child], self.heap[i]) {
                self.heap.swap(i, smaller_child);
                self.indices.insert(self.heap[i].index(), i);
                self.release(i);
                i = smaller_child;
            } else {
                self.release(smaller_child);
                self.release(i);
                break;
            }
        }
        self.indices.insert(self.heap[i].index(), i);
    }

    fn insert(&mut self, v: Var, activity: &ActivityVector) {
        if self.contains(v) {
            return;
        }
        let place = self.heap.len();
        self.heap.push(v);
        self.indices.insert(v.index(), place);
        self.run_percolate_up(place, activity);
    }

    fn remove_min(&mut self, activity: &ActivityVector) -> Option<Var> {
        if self.heap.is_empty() {
            return None;
        }
        let res = self.heap.swap_remove(0);
        // Q1: drop the popped variable's inverse index to "not present"
        // (None) and never let it read back as `0`/aliasing the root.
        self.indices.remove(res.index());
        if !self.heap.is_empty() {
            self.indices.insert(self.heap[0].index(), 0);
            self.percolate_down(0, activity);
        }
        Some(res)
    }

    fn bump(&mut self, v: Var, activity: &mut ActivityVector) {
        activity.bump(v);
        // A uniform rescale (if triggered) preserves relative order, so
        // only `v` itself might need to move, and only upward: VSIDS
        // bumping can never decrease anyone's priority.
        if let Some(pos) = self.position_of(v) {
            self.run_percolate_up(pos, activity);
        }
    }

    /// DEBUG_HEAP (§4.8, P4): every variable with a non-`None` inverse
    /// index must sit at the advertised position and nowhere else.
    pub fn debug_heap(&self) -> usize {
        let mut inconsistencies = 0;
        for (i, v) in self.heap.iter().enumerate() {
            match self.indices.get(v.index()) {
                Some(&pos) if pos == i => {}
                _ => inconsistencies += 1,
            }
        }
        for (idx, &pos) in self.indices.iter() {
            if self.heap.get(pos).map(|v| v.index()) != Some(idx) {
                inconsistencies += 1;
            }
        }
        if !self.locks.is_empty() {
            inconsistencies += self.locks.len(); // lock held at quiescence (§7)
        }
        inconsistencies
    }
}

pub struct PercolateUpState {
    i: usize,
    /// Whether this lane currently owns the lock at `i` (which may have
    /// started life as some other index before a swap carried it here).
    holds_self: bool,
}

impl PercolateUpState {
    pub fn new(i: usize) -> Self {
        PercolateUpState { i, holds_self: false }
    }
}

impl VsidsHeap for ClassicHeap {
    fn init_var(&mut self, _v: Var, _activity: &mut ActivityVector) {
        // Variables enter the heap on explicit `Insert`, not at init
        // (decision eligibility is governed upstream by the heuristic).
    }

    fn handle_req(&mut self, op: HeapOp, activity: &mut ActivityVector) -> HeapResp {
        match op {
            HeapOp::Insert(v) => {
                self.insert(v, activity);
                HeapResp::Ack
            }
            HeapOp::RemoveMin => HeapResp::Var(self.remove_min(activity)),
            HeapOp::Read(pos) => HeapResp::Var(self.read_at(pos)),
            HeapOp::Bump(v) => {
                self.bump(v, activity);
                HeapResp::Ack
            }
            HeapOp::DebugHeap => HeapResp::InconsistencyCount(self.debug_heap()),
        }
    }

    fn size(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(n: usize) -> (ClassicHeap, ActivityVector) {
        let mut heap = ClassicHeap::new();
        let mut act = ActivityVector::new(0.95);
        for i in 0..n {
            let v = Var::from_index(i);
            act.init_var(v, 0.0);
            heap.insert(v, &act);
        }
        (heap, act)
    }

    #[test]
    fn remove_min_yields_non_increasing_activity_order() {
        let mut act = ActivityVector::new(0.95);
        for i in 0..4 {
            act.init_var(Var::from_index(i), 0.0);
        }
        act.write(Var::from_index(0), 1.0);
        act.write(Var::from_index(1), 5.0);
        act.write(Var::from_index(2), 3.0);
        act.write(Var::from_index(3), 4.0);

        let mut heap = ClassicHeap::new();
        for i in 0..4 {
            heap.insert(Var::from_index(i), &act);
        }
        let mut order = Vec::new();
        while let Some(v) = heap.remove_min(&act) {
            order.push(act.read(v));
        }
        for w in order.windows(2) {
            assert!(w[0] >= w[1]);
        }
    }

    #[test]
    fn replace_on_empty_heap_returns_none() {
        let mut heap = ClassicHeap::new();
        let act = ActivityVector::new(0.95);
        assert_eq!(heap.remove_min(&act), None);
    }

    #[test]
    fn remove_min_on_singleton_leaves_size_zero() {
        let (mut heap, act) = setup(1);
        let v = heap.remove_min(&act).unwrap();
        assert_eq!(v, Var::from_index(0));
        assert_eq!(heap.size(), 0);
    }

    #[test]
    fn popped_variable_inverse_index_is_none_not_zero() {
        let (mut heap, act) = setup(3);
        let popped = heap.remove_min(&act).unwrap();
        assert_eq!(heap.position_of(popped), None);
    }

    #[test]
    fn debug_heap_reports_no_inconsistencies_after_normal_use() {
        let (mut heap, mut act) = setup(8);
        heap.bump(Var::from_index(3), &mut act);
        heap.bump(Var::from_index(3), &mut act);
        heap.remove_min(&act);
        assert_eq!(heap.debug_heap(), 0);
    }

    #[test]
    fn insert_via_the_public_api_leaves_no_lock_held() {
        // `insert`/`bump` now drive the same locked `step_percolate_up`
        // lane `concurrent_percolate_lanes_respect_per_index_locks`
        // exercises directly; a real swap must happen here (distinct
        // activities) to exercise the carried-forward lock, not just the
        // zero-swap no-op case.
        let mut heap = ClassicHeap::new();
        let mut act = ActivityVector::new(0.95);
        for i in 0..8 {
            act.init_var(Var::from_index(i), 0.0);
        }
        for i in 0..8 {
            heap.insert(Var::from_index(i), &act);
        }
        act.write(Var::from_index(7), 100.0);
        heap.bump(Var::from_index(7), &mut act);
        assert_eq!(heap.debug_heap(), 0);
        assert_eq!(heap.position_of(Var::from_index(7)), Some(0));
    }

    #[test]
    fn concurrent_percolate_lanes_respect_per_index_locks() {
        let (mut heap, act) = setup(8);
        let mut a = PercolateUpState::new(heap.position_of(Var::from_index(6)).unwrap());
        let mut b = PercolateUpState::new(heap.position_of(Var::from_index(7)).unwrap());
        loop {
            let sa = heap.step_percolate_up(&mut a, &act);
            let sb = heap.step_percolate_up(&mut b, &act);
            if matches!(sa, WorkerState::Done(())) && matches!(sb, WorkerState::Done(())) {
                break;
            }
        }
        assert_eq!(heap.debug_heap(), 0);
    }
}
