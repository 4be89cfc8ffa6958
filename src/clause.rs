//! Clauses and clause storage (§3 Clause / Clause storage). Grounded on
//! `minisat/formula/clause.rs`'s `ClauseHeader` struct (`mark`/`learnt`/
//! `has_extra`/`reloced`/`size`) and on the `ClauseRef` newtype-over-index
//! / header-plus-payload layout from that same file, re-targeted from an
//! in-process `Vec<Clause>`
//! onto the segregated-fit byte arena of [`crate::alloc`].

use std::num::NonZeroU32;

use crate::alloc::ClauseAllocator;
use crate::formula::Lit;

/// Tag distinguishing an input clause (carries a subsumption
/// abstraction) from a learnt one (carries an activity), mirroring the
/// teacher's `ClauseHeader` enum exactly in shape.
#[derive(Clone, Copy, Debug)]
pub enum ClauseHeader {
    Clause { abstraction: Option<NonZeroU32> },
    Learnt { activity: f32 },
}

impl ClauseHeader {
    pub fn activity(&self) -> f32 {
        match self {
            ClauseHeader::Learnt { activity } => *activity,
            ClauseHeader::Clause { .. } => panic!("Learnt expected"),
        }
    }

    pub fn is_learnt(&self) -> bool {
        matches!(self, ClauseHeader::Learnt { .. })
    }
}

/// An index into the clause metadata array (§3 Clause storage); never a
/// raw byte address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ClauseRef(u32);

impl ClauseRef {
    pub fn from_index(i: u32) -> ClauseRef {
        ClauseRef(i)
    }

    pub fn index(&self) -> u32 {
        self.0
    }
}

/// One metadata-array entry: `{offset, size}` into the byte arena (§3).
#[derive(Clone, Copy, Debug)]
struct ClauseMeta {
    offset: u32,
    size: u32,
    header: ClauseHeader,
}

/// The clause store: a metadata array plus the byte arena backing it.
/// The first `n_orig` entries describe input clauses, packed once at
/// init and never freed; later entries are learnt and may be reclaimed
/// through [`ClauseStore::remove`].
pub struct ClauseStore {
    meta: Vec<ClauseMeta>,
    arena: ClauseAllocator,
    n_orig: usize,
}

impl ClauseStore {
    pub fn new(arena_capacity: usize) -> Self {
        ClauseStore {
            meta: Vec::new(),
            arena: ClauseAllocator::new(0, arena_capacity),
            n_orig: 0,
        }
    }

    fn payload_bytes(lits: &[Lit], header: &ClauseHeader) -> usize {
        let tag = 8; // size + allocation bit, packed with any activity
        let body = lits.len() * 4;
        let extra = if header.is_learnt() { 4 } else { 0 };
        tag + body + extra
    }

    fn encode(&mut self, addr: u32, lits: &[Lit]) {
        let buf = self.arena.payload_mut(addr);
        let mut off = 8; // reserve the clause-level tag prefix
        for &l in lits {
            buf[off..off + 4].copy_from_slice(&(l.index() as u32).to_le_bytes());
            off += 4;
        }
    }

    fn push(&mut self, lits: &[Lit], header: ClauseHeader) -> crate::error::Result<ClauseRef> {
        let size = Self::payload_bytes(lits, &header);
        let addr = self.arena.allocate(size)?;
        self.encode(addr, lits);
        let idx = self.meta.len();
        self.meta.push(ClauseMeta {
            offset: addr,
            size: size as u32,
            header,
        });
        Ok(ClauseRef::from_index(idx as u32))
    }

    /// Adds an original (input) clause. Must be called only during
    /// INIT, before any learnt clause is added.
    pub fn add_input_clause(&mut self, lits: &[Lit]) -> crate::error::Result<ClauseRef> {
        debug_assert_eq!(self.meta.len(), self.n_orig);
        let abstraction = calc_abstraction(lits);
        let cr = self.push(
            lits,
            ClauseHeader::Clause {
                abstraction: NonZeroU32::new(abstraction),
            },
        )?;
        self.n_orig += 1;
        Ok(cr)
    }

    pub fn add_learnt_clause(&mut self, lits: &[Lit]) -> crate::error::Result<ClauseRef> {
        self.push(lits, ClauseHeader::Learnt { activity: 0.0 })
    }

    pub fn is_learnt(&self, cr: ClauseRef) -> bool {
        self.meta[cr.index() as usize].header.is_learnt()
    }

    pub fn activity(&self, cr: ClauseRef) -> f32 {
        self.meta[cr.index() as usize].header.activity()
    }

    pub fn set_activity(&mut self, cr: ClauseRef, act: f32) {
        if let ClauseHeader::Learnt { activity } = &mut self.meta[cr.index() as usize].header {
            *activity = act;
        }
    }

    pub fn lits(&self, cr: ClauseRef) -> Vec<Lit> {
        let meta = &self.meta[cr.index() as usize];
        let n = (meta.size as usize - 8) / 4;
        let buf = self.arena.payload(meta.offset);
        (0..n)
            .map(|i| {
                let off = 8 + i * 4;
                let idx = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
                Lit::from_index(idx)
            })
            .collect()
    }

    pub fn len(&self, cr: ClauseRef) -> usize {
        (self.meta[cr.index() as usize].size as usize - 8) / 4
    }

    /// The two watched literals, per §3 ("the first two literals are the
    /// watched literals").
    pub fn head(&self, cr: ClauseRef) -> (Lit, Lit) {
        let lits = self.lits(cr);
        (lits[0], lits[1])
    }

    pub fn swap_lits(&mut self, cr: ClauseRef, i: usize, j: usize) {
        let meta = self.meta[cr.index() as usize];
        let buf = self.arena.payload_mut(meta.offset);
        let oi = 8 + i * 4;
        let oj = 8 + j * 4;
        for k in 0..4 {
            buf.swap(oi + k, oj + k);
        }
    }

    /// Reclaims a learnt clause's block. Must never be called on an
    /// input clause.
    pub fn remove(&mut self, cr: ClauseRef) {
        let meta = self.meta[cr.index() as usize];
        debug_assert!(meta.header.is_learnt());
        self.arena.free(meta.offset, meta.size as usize);
    }

    pub fn stats(&self) -> crate::alloc::FragmentationStats {
        self.arena.stats()
    }

    pub fn n_orig(&self) -> usize {
        self.n_orig
    }
}

fn calc_abstraction(lits: &[Lit]) -> u32 {
    lits.iter().fold(0, |acc, l| acc | l.abstraction())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Var;

    fn lits(idxs: &[usize]) -> Vec<Lit> {
        idxs.iter().map(|&i| Var::from_index(i).pos_lit()).collect()
    }

    #[test]
    fn input_clause_round_trips_its_literals() {
        let mut store = ClauseStore::new(4096);
        let ls = lits(&[1, 2, 3]);
        let cr = store.add_input_clause(&ls).unwrap();
        assert_eq!(store.lits(cr), ls);
        assert!(!store.is_learnt(cr));
    }

    #[test]
    fn learnt_clause_carries_an_activity() {
        let mut store = ClauseStore::new(4096);
        let cr = store.add_learnt_clause(&lits(&[4, 5])).unwrap();
        assert!(store.is_learnt(cr));
        store.set_activity(cr, 3.5);
        assert_eq!(store.activity(cr), 3.5);
    }

    #[test]
    fn swap_lits_reorders_in_place() {
        let mut store = ClauseStore::new(4096);
        let ls = lits(&[1, 2, 3]);
        let cr = store.add_input_clause(&ls).unwrap();
        store.swap_lits(cr, 0, 2);
        assert_eq!(store.lits(cr), vec![ls[2], ls[1], ls[0]]);
    }

    #[test]
    fn removing_a_learnt_clause_frees_its_block() {
        let mut store = ClauseStore::new(4096);
        let before = store.stats().allocated_bytes;
        let cr = store.add_learnt_clause(&lits(&[1, 2])).unwrap();
        store.remove(cr);
        assert_eq!(store.stats().allocated_bytes, before);
    }
}
