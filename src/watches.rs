//! The per-literal watcher list (§3 Watcher node / "watcher block";
//! §4.2). Grounded on `minisat/watches.rs`'s `Watches`
//! (`WatchesLine { watchers: Vec<Watcher>, dirty }`), but re-architected
//! per §9 ("raw pointers into external memory... as arena + typed
//! index") into the memory-layout the spec actually describes: a small
//! inline "pre-watchers" array per literal plus a singly linked chain of
//! fixed-size watcher blocks, rather than one growable `Vec` per
//! literal. `BlockRef` is a 32-bit arena index, never a machine pointer.

use crate::clause::ClauseRef;
use crate::formula::{Lit, LitVec, Var};

/// Inline slots held directly on the per-literal head, before any block
/// needs to be allocated at all (§3: "a small inline pre-watchers
/// array").
pub const PRE_WATCHERS: usize = 2;

/// Watcher nodes per block (§3: "a fixed-size aggregate of K watcher
/// nodes").
pub const WATCHERS_PER_BLOCK: usize = 4;

type BlockRef = u32;

/// §3 Watcher node: `{clause-ref, blocker, next}`. The `next` pointer of
/// the spec is realized here as the owning block's `next` field rather
/// than per-node, since nodes only ever move as a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Watcher {
    pub clause: ClauseRef,
    pub blocker: Lit,
}

#[derive(Clone, Copy)]
struct Block {
    /// `None` in a slot is the spec's `valid = 0`.
    slots: [Option<Watcher>; WATCHERS_PER_BLOCK],
    next: Option<BlockRef>,
}

impl Block {
    fn empty() -> Block {
        Block {
            slots: [None; WATCHERS_PER_BLOCK],
            next: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

#[derive(Clone, Copy, Default)]
struct WatchHead {
    pre: [Option<Watcher>; PRE_WATCHERS],
    head: Option<BlockRef>,
}

/// The watcher-node arena and the per-literal head-pointer table (§3).
/// Blocks freed by [`Watches::remove`] return to `free_blocks` so later
/// allocations reuse them rather than growing the arena without bound.
pub struct Watches {
    lists: LitVec<WatchHead>,
    blocks: Vec<Block>,
    free_blocks: Vec<BlockRef>,
}

impl Watches {
    pub fn new() -> Self {
        Watches {
            lists: LitVec::new(),
            blocks: Vec::new(),
            free_blocks: Vec::new(),
        }
    }

    pub fn init_var(&mut self, v: Var) {
        self.lists.init(v.pos_lit());
        self.lists.init(v.neg_lit());
    }

    /// Registers `cr`'s two watched literals (§4.2: clause watches
    /// `head.0` and `head.1` directly; propagation on literal `p` then
    /// inspects the list at `!p`).
    pub fn watch_clause(&mut self, head: (Lit, Lit), cr: ClauseRef) {
        self.add(head.0, cr, head.1);
        self.add(head.1, cr, head.0);
    }

    pub fn add(&mut self, lit: Lit, clause: ClauseRef, blocker: Lit) {
        self.add_raw(lit, Watcher { clause, blocker });
    }

    pub fn add_raw(&mut self, lit: Lit, w: Watcher) {
        let list = &mut self.lists[lit];
        for slot in list.pre.iter_mut() {
            if slot.is_none() {
                *slot = Some(w);
                return;
            }
        }
        let block_id = self.free_blocks.pop().unwrap_or_else(|| {
            self.blocks.push(Block::empty());
            (self.blocks.len() - 1) as BlockRef
        });
        let mut block = Block::empty();
        block.slots[0] = Some(w);
        block.next = self.lists[lit].head;
        self.blocks[block_id as usize] = block;
        self.lists[lit].head = Some(block_id);
    }

    /// Removes `cr`'s node from `lit`'s list, used when unwatching a
    /// clause directly (e.g. DB reduction). A block that loses its last
    /// valid node is unlinked from the chain and its index returned to
    /// `free_blocks` (B1).
    pub fn remove(&mut self, lit: Lit, cr: ClauseRef) {
        {
            let list = &mut self.lists[lit];
            for slot in list.pre.iter_mut() {
                if matches!(slot, Some(w) if w.clause == cr) {
                    *slot = None;
                    return;
                }
            }
        }
        let mut prev: Option<BlockRef> = None;
        let mut cur = self.lists[lit].head;
        while let Some(bid) = cur {
            let next = self.blocks[bid as usize].next;
            let mut hit = false;
            for slot in self.blocks[bid as usize].slots.iter_mut() {
                if matches!(slot, Some(w) if w.clause == cr) {
                    *slot = None;
                    hit = true;
                    break;
                }
            }
            if hit {
                if self.blocks[bid as usize].is_empty() {
                    match prev {
                        Some(p) => self.blocks[p as usize].next = next,
                        None => self.lists[lit].head = next,
                    }
                    self.free_blocks.push(bid);
                }
                return;
            }
            prev = cur;
            cur = next;
        }
    }

    /// Drains the entire list for `lit` (pre-watchers and every block in
    /// the chain), freeing every visited block, and returns the
    /// watchers found plus how many blocks were traversed (for
    /// `PropagationStats::blocks_visited`). The propagation engine
    /// reinserts whichever watchers it decides to keep via [`Self::add`].
    pub fn take_all(&mut self, lit: Lit) -> (Vec<Watcher>, usize) {
        let mut out = Vec::new();
        let mut blocks_visited = 0;
        let list = &mut self.lists[lit];
        for slot in list.pre.iter_mut() {
            if let Some(w) = slot.take() {
                out.push(w);
            }
        }
        let mut cur = list.head.take();
        while let Some(bid) = cur {
            blocks_visited += 1;
            let next = self.blocks[bid as usize].next;
            for slot in self.blocks[bid as usize].slots.iter_mut() {
                if let Some(w) = slot.take() {
                    out.push(w);
                }
            }
            self.free_blocks.push(bid);
            cur = next;
        }
        (out, blocks_visited)
    }

    /// Read-only snapshot, for tests and debug tooling that must not
    /// disturb the list's block layout.
    pub fn snapshot(&self, lit: Lit) -> Vec<Watcher> {
        let list = &self.lists[lit];
        let mut out: Vec<Watcher> = list.pre.iter().filter_map(|s| *s).collect();
        let mut cur = list.head;
        while let Some(bid) = cur {
            let b = &self.blocks[bid as usize];
            out.extend(b.slots.iter().filter_map(|s| *s));
            cur = b.next;
        }
        out
    }

    pub fn watcher_count(&self, lit: Lit) -> usize {
        self.snapshot(lit).len()
    }

    /// P2/I4 support + B1: every block reachable from any literal's
    /// chain must have at least one valid slot (an emptied block is
    /// always unlinked immediately by [`Self::remove`]/[`Self::take_all`]
    /// rebuilding through [`Self::add`]).
    pub fn debug_consistency(&self) -> usize {
        let mut dangling = 0;
        for list in self.lists.iter() {
            let mut cur = list.head;
            while let Some(bid) = cur {
                let b = &self.blocks[bid as usize];
                if b.is_empty() {
                    dangling += 1;
                }
                cur = b.next;
            }
        }
        dangling
    }
}

impl Default for Watches {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::ClauseRef;
    use crate::formula::Var;

    fn cr(i: u32) -> ClauseRef {
        ClauseRef::from_index(i)
    }

    #[test]
    fn watch_clause_registers_both_watched_literals() {
        let mut w = Watches::new();
        let x = Var::from_index(0);
        let y = Var::from_index(1);
        w.init_var(x);
        w.init_var(y);
        w.watch_clause((x.pos_lit(), y.pos_lit()), cr(0));
        assert_eq!(w.watcher_count(x.pos_lit()), 1);
        assert_eq!(w.watcher_count(y.pos_lit()), 1);
    }

    #[test]
    fn spilling_past_pre_watchers_allocates_a_block() {
        let mut w = Watches::new();
        let v = Var::from_index(0);
        w.init_var(v);
        for i in 0..(PRE_WATCHERS + 3) {
            w.add(v.pos_lit(), cr(i as u32), v.neg_lit());
        }
        assert_eq!(w.watcher_count(v.pos_lit()), PRE_WATCHERS + 3);
    }

    #[test]
    fn removing_the_last_node_in_a_block_detaches_it() {
        let mut w = Watches::new();
        let v = Var::from_index(0);
        w.init_var(v);
        // Fill both pre-watchers, then push exactly one into a block.
        w.add(v.pos_lit(), cr(0), v.neg_lit());
        w.add(v.pos_lit(), cr(1), v.neg_lit());
        w.add(v.pos_lit(), cr(2), v.neg_lit());
        assert_eq!(w.debug_consistency(), 0);
        w.remove(v.pos_lit(), cr(2));
        assert_eq!(w.watcher_count(v.pos_lit()), 2);
        assert_eq!(w.debug_consistency(), 0); // block B1-detached, not left dangling
        assert!(!w.free_blocks.is_empty());
    }

    #[test]
    fn take_all_empties_the_list_and_frees_its_blocks() {
        let mut w = Watches::new();
        let v = Var::from_index(0);
        w.init_var(v);
        for i in 0..6 {
            w.add(v.pos_lit(), cr(i), v.neg_lit());
        }
        let (drained, blocks_visited) = w.take_all(v.pos_lit());
        assert_eq!(drained.len(), 6);
        assert!(blocks_visited > 0);
        assert_eq!(w.watcher_count(v.pos_lit()), 0);
    }
}
