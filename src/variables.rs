//! The fixed-stride variable record store and the trail (§3 Variables /
//! Trail). Grounded on `minisat/assignment.rs`'s `Assignment`
//! (`VarLine { assign: [LitVal; 2], vd: VarData }`, `trail`/`lim`/
//! `qhead`), re-targeted from minisat's general-purpose assignment
//! bookkeeping onto exactly the fields §3 specifies: a `VarData {
//! decision_level, reason}` record where `reason = None` is the spec's
//! `UNDEF` sentinel.

use crate::clause::ClauseRef;
use crate::formula::{Lit, Var};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LitVal {
    Undef,
    False,
    True,
}

impl LitVal {
    #[inline]
    fn is_undef(&self) -> bool {
        matches!(self, LitVal::Undef)
    }
}

/// §3 Variables: "{decision_level: uint, reason: clause-ref}"; `reason =
/// UNDEF` marks a decision or an unassigned variable.
#[derive(Clone, Copy, Debug)]
pub struct VarData {
    pub level: usize,
    pub reason: Option<ClauseRef>,
}

struct VarLine {
    assign: [LitVal; 2],
    data: VarData,
}

impl VarLine {
    fn fresh() -> VarLine {
        VarLine {
            assign: [LitVal::Undef, LitVal::Undef],
            data: VarData {
                level: 0,
                reason: None,
            },
        }
    }
}

/// The variable record store plus the trail (§3). One `VariableStore` is
/// the propagation engine's, the analyzer's and the FSM's shared view of
/// "what is currently assigned and why".
pub struct VariableStore {
    lines: Vec<VarLine>,
    trail: Vec<Lit>,
    trail_lim: Vec<usize>,
    qhead: usize,
}

impl VariableStore {
    pub fn new() -> Self {
        VariableStore {
            lines: Vec::new(),
            trail: Vec::new(),
            trail_lim: Vec::new(),
            qhead: 0,
        }
    }

    pub fn new_var(&mut self) -> Var {
        self.lines.push(VarLine::fresh());
        Var::from_index(self.lines.len() - 1)
    }

    #[inline]
    pub fn num_vars(&self) -> usize {
        self.lines.len()
    }

    #[inline]
    pub fn num_assigns(&self) -> usize {
        self.trail.len()
    }

    #[inline]
    pub fn decision_level(&self) -> usize {
        self.trail_lim.len()
    }

    #[inline]
    pub fn is_ground_level(&self) -> bool {
        self.trail_lim.is_empty()
    }

    #[inline]
    pub fn new_decision_level(&mut self) {
        self.trail_lim.push(self.trail.len());
    }

    /// The first trail index at decision level `d` (I5: `trail_lim[d] <=
    /// trail_lim[d+1]`, maintained simply by only ever pushing onto a
    /// stack).
    #[inline]
    pub fn trail_lim(&self, d: usize) -> usize {
        if d == 0 {
            0
        } else {
            self.trail_lim[d - 1]
        }
    }

    #[inline]
    pub fn trail(&self) -> &[Lit] {
        &self.trail
    }

    #[inline]
    pub fn qhead(&self) -> usize {
        self.qhead
    }

    /// I5: records `lit` true at the current decision level with `reason`
    /// (`None` for a decision literal).
    pub fn assign(&mut self, lit: Lit, reason: Option<ClauseRef>) {
        let line = &mut self.lines[lit.var().index()];
        debug_assert!(line.assign[0].is_undef());
        let sign = lit.sign() as usize;
        line.assign[sign] = LitVal::True;
        line.assign[sign ^ 1] = LitVal::False;
        line.data.level = self.trail_lim.len();
        line.data.reason = reason;
        self.trail.push(lit);
    }

    #[inline]
    pub fn value(&self, lit: Lit) -> LitVal {
        self.lines[lit.var().index()].assign[lit.sign() as usize]
    }

    #[inline]
    pub fn is_true(&self, lit: Lit) -> bool {
        matches!(self.value(lit), LitVal::True)
    }

    #[inline]
    pub fn is_false(&self, lit: Lit) -> bool {
        matches!(self.value(lit), LitVal::False)
    }

    #[inline]
    pub fn is_undef_var(&self, v: Var) -> bool {
        self.lines[v.index()].assign[0].is_undef()
    }

    /// The `{decision_level, reason}` record for whichever literal of `v`
    /// is currently assigned (§3; only meaningful once `v` is assigned).
    pub fn vardata(&self, v: Var) -> VarData {
        self.lines[v.index()].data
    }

    pub fn level_of(&self, v: Var) -> usize {
        self.lines[v.index()].data.level
    }

    pub fn reason_of(&self, v: Var) -> Option<ClauseRef> {
        self.lines[v.index()].data.reason
    }

    pub fn dequeue(&mut self) -> Option<Lit> {
        if self.qhead < self.trail.len() {
            let p = self.trail[self.qhead];
            self.qhead += 1;
            Some(p)
        } else {
            None
        }
    }

    /// Drops every queued-but-unprocessed trail entry, used once a
    /// conflict halts propagation for the round (B3).
    pub fn dequeue_all(&mut self) {
        self.qhead = self.trail.len();
    }

    /// Undoes every assignment above `level`, invoking `f(lit)` for each
    /// one in reverse chronological order so the caller (backtrack, §4.6)
    /// can capture its polarity and feed the freed variable back to the
    /// heap before the record is gone.
    pub fn cancel_until<F: FnMut(Lit)>(&mut self, level: usize, mut f: F) {
        while self.trail_lim.len() > level {
            let bottom = self.trail_lim.pop().unwrap();
            while self.trail.len() > bottom {
                let lit = self.trail.pop().unwrap();
                f(lit);
                let line = &mut self.lines[lit.var().index()];
                line.assign = [LitVal::Undef, LitVal::Undef];
                line.data.reason = None;
            }
        }
        self.qhead = self.qhead.min(self.trail.len());
    }
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Var;

    #[test]
    fn assigning_a_literal_marks_its_negation_false() {
        let mut vars = VariableStore::new();
        let v = vars.new_var();
        vars.assign(v.pos_lit(), None);
        assert!(vars.is_true(v.pos_lit()));
        assert!(vars.is_false(v.neg_lit()));
    }

    #[test]
    fn cancel_until_restores_undef_and_rewinds_trail() {
        let mut vars = VariableStore::new();
        let a = vars.new_var();
        let b = vars.new_var();
        vars.new_decision_level();
        vars.assign(a.pos_lit(), None);
        vars.new_decision_level();
        vars.assign(b.neg_lit(), None);

        let mut undone = Vec::new();
        vars.cancel_until(1, |lit| undone.push(lit));
        assert_eq!(undone, vec![b.neg_lit()]);
        assert!(vars.is_undef_var(b));
        assert!(vars.is_true(a.pos_lit()));
        assert_eq!(vars.decision_level(), 1);
    }

    #[test]
    fn trail_lim_tracks_decision_boundaries() {
        let mut vars = VariableStore::new();
        let a = vars.new_var();
        let b = vars.new_var();
        vars.assign(a.pos_lit(), None); // ground level
        vars.new_decision_level();
        vars.assign(b.pos_lit(), None);
        assert_eq!(vars.trail_lim(0), 0);
        assert_eq!(vars.trail_lim(1), 1);
    }

    #[test]
    fn dequeue_drains_in_trail_order() {
        let mut vars = VariableStore::new();
        let a = vars.new_var();
        let b = vars.new_var();
        vars.assign(a.pos_lit(), None);
        vars.assign(b.pos_lit(), None);
        assert_eq!(vars.dequeue(), Some(a.pos_lit()));
        assert_eq!(vars.dequeue(), Some(b.pos_lit()));
        assert_eq!(vars.dequeue(), None);
    }
}
