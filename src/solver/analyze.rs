//! Conflict analysis (§4.3) and clause minimization (§4.4). Grounded on
//! `minisat/conflict.rs`'s `AnalyzeContext::analyze`/
//! `lit_redundant`/`lit_redundant_basic`, split here into a pure,
//! side-effect-free per-conflict analyzer (so up to LEARNERS conflict
//! clauses can each be analyzed independently, per §4.3) plus a merge
//! step that picks a winner and is the only place activity bumps are
//! actually applied (§4.3 post-analysis; decided as Open Question Q3 —
//! see DESIGN.md).

use crate::clause::ClauseStore;
use crate::formula::{Lit, Var, VarMap};
use crate::settings::CCMinMode;
use crate::variables::VariableStore;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Seen {
    Undef,
    Source,
    Removable,
    Failed,
}

pub enum Conflict {
    /// The conflict clause's every literal was already false at the
    /// ground level; the formula is unsatisfiable.
    Ground,
    Unit(usize, Lit),
    Learned(usize, Lit, Vec<Lit>),
}

pub struct AnalysisResult {
    pub conflict: Conflict,
    /// Every variable whose activity this analysis would bump, in visit
    /// order (may repeat only if a variable were revisited, which the
    /// `seen` marking below prevents).
    pub bumped_vars: Vec<Var>,
    pub bumped_clauses: Vec<crate::clause::ClauseRef>,
}

/// One analyzer's private scratch state (§3: "seen vector"). Each
/// concurrently-run analysis owns its own, cleared back to `Undef` by
/// the end of [`AnalyzeContext::analyze`] regardless of outcome.
pub struct AnalyzeContext {
    ccmin_mode: CCMinMode,
    seen: VarMap<Seen>,
    analyze_toclear: Vec<Lit>,
    pub max_literals: u64,
    pub tot_literals: u64,
}

impl AnalyzeContext {
    pub fn new(ccmin_mode: CCMinMode) -> Self {
        AnalyzeContext {
            ccmin_mode,
            seen: VarMap::new(),
            analyze_toclear: Vec::new(),
            max_literals: 0,
            tot_literals: 0,
        }
    }

    pub fn init_var(&mut self, v: Var) {
        self.seen.insert(&v, Seen::Undef);
    }

    /// 1-UIP analysis of a single conflict clause. Pre-condition: the
    /// current decision level is above ground. `minimizers` bounds how
    /// many literals of the learnt clause the minimization pass below
    /// treats as concurrently in flight (§4.4).
    pub fn analyze(
        &mut self,
        vars: &VariableStore,
        clauses: &ClauseStore,
        confl0: crate::clause::ClauseRef,
        minimizers: usize,
    ) -> AnalysisResult {
        let mut bumped_vars = Vec::new();
        let mut bumped_clauses = Vec::new();

        if vars.is_ground_level() {
            return AnalysisResult {
                conflict: Conflict::Ground,
                bumped_vars,
                bumped_clauses,
            };
        }

        let mut out_learnt = Vec::with_capacity(vars.num_assigns());
        let mut confl = confl0;
        let mut path_c: i64 = 0;
        let trail = vars.trail();
        let mut index = trail.len();

        loop {
            bumped_clauses.push(confl);

            let lits = clauses.lits(confl);
            let base = if confl == confl0 { 0 } else { 1 };
            for &q in &lits[base..] {
                let v = q.var();
                if self.seen[&v] == Seen::Undef {
                    let level = vars.level_of(v);
                    if level > 0 {
                        self.seen[&v] = Seen::Source;
                        bumped_vars.push(v);
                        if level >= vars.decision_level() {
                            path_c += 1;
                        } else {
                            out_learnt.push(q);
                        }
                    }
                }
            }

            let pl = loop {
                index -= 1;
                if self.seen[&trail[index].var()] != Seen::Undef {
                    break trail[index];
                }
            };
            self.seen[&pl.var()] = Seen::Undef;

            path_c -= 1;
            if path_c <= 0 {
                out_learnt.insert(0, !pl);
                break;
            }
            confl = vars.reason_of(pl.var()).expect("trail literal on the path must have a reason");
        }

        self.analyze_toclear = out_learnt.clone();
        self.max_literals += out_learnt.len() as u64;
        let minimizers = minimizers.max(1);
        match self.ccmin_mode {
            CCMinMode::Deep => {
                let mut keep = Vec::with_capacity(out_learnt.len());
                for batch in out_learnt.chunks(minimizers) {
                    for &l in batch {
                        if !self.lit_redundant(clauses, vars, l) {
                            keep.push(l);
                        }
                    }
                }
                out_learnt = keep;
            }
            CCMinMode::Basic => {
                let mut keep = Vec::with_capacity(out_learnt.len());
                for batch in out_learnt.chunks(minimizers) {
                    for &l in batch {
                        if !self.lit_redundant_basic(clauses, vars, l) {
                            keep.push(l);
                        }
                    }
                }
                out_learnt = keep;
            }
            CCMinMode::Off => {}
        }
        self.tot_literals += out_learnt.len() as u64;

        for l in self.analyze_toclear.drain(..) {
            self.seen[&l.var()] = Seen::Undef;
        }

        let conflict = if out_learnt.len() == 1 {
            Conflict::Unit(0, out_learnt[0])
        } else {
            let mut max_i = 1;
            let mut max_level = vars.level_of(out_learnt[1].var());
            for i in 2..out_learnt.len() {
                let level = vars.level_of(out_learnt[i].var());
                if level > max_level {
                    max_i = i;
                    max_level = level;
                }
            }
            out_learnt.swap(1, max_i);
            Conflict::Learned(max_level, out_learnt[0], out_learnt)
        };

        AnalysisResult {
            conflict,
            bumped_vars,
            bumped_clauses,
        }
    }

    fn lit_redundant_basic(&self, clauses: &ClauseStore, vars: &VariableStore, literal: Lit) -> bool {
        match vars.reason_of(literal.var()) {
            None => false,
            Some(cr) => {
                let lits = clauses.lits(cr);
                for &lit in &lits[1..] {
                    if self.seen[&lit.var()] == Seen::Undef && vars.level_of(lit.var()) > 0 {
                        return false;
                    }
                }
                true
            }
        }
    }

    /// DFS through the reason graph (§4.4), deciding whether `literal`
    /// can be dropped from the learnt clause without weakening it.
    fn lit_redundant(&mut self, clauses: &ClauseStore, vars: &VariableStore, literal: Lit) -> bool {
        debug_assert!(matches!(self.seen[&literal.var()], Seen::Undef | Seen::Source));

        let mut stack: Vec<(Lit, Vec<Lit>)> = match vars.reason_of(literal.var()) {
            None => return false,
            Some(cr) => vec![(literal, clauses.lits(cr)[1..].to_vec())],
        };

        while let Some((p, mut lits)) = stack.pop() {
            match lits.pop() {
                Some(l) => {
                    let remaining = lits;
                    stack.push((p, remaining));

                    let level = vars.level_of(l.var());
                    let seen = self.seen[&l.var()];

                    if level == 0 || seen == Seen::Source || seen == Seen::Removable {
                        continue;
                    }

                    match vars.reason_of(l.var()) {
                        Some(cr) if seen == Seen::Undef => {
                            stack.push((l, clauses.lits(cr)[1..].to_vec()));
                        }
                        _ => {
                            for &(l2, _) in stack.iter() {
                                if self.seen[&l2.var()] == Seen::Undef {
                                    self.seen[&l2.var()] = Seen::Failed;
                                    self.analyze_toclear.push(l2);
                                }
                            }
                            return false;
                        }
                    }
                }
                None => {
                    if self.seen[&p.var()] == Seen::Undef {
                        self.seen[&p.var()] = Seen::Removable;
                        self.analyze_toclear.push(p);
                    }
                }
            }
        }

        true
    }
}

/// Merge (§4.3): of every analyzed conflict clause, the one whose
/// `(btlevel, size)` pair is lexicographically smallest wins; only its
/// bump sets are ever applied (Q3).
pub fn pick_winner(results: Vec<AnalysisResult>) -> Option<AnalysisResult> {
    results.into_iter().min_by_key(|r| match &r.conflict {
        Conflict::Ground => (0usize, 0usize),
        Conflict::Unit(level, _) => (*level, 1),
        Conflict::Learned(level, _, lits) => (*level, lits.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Var;

    fn setup(n: usize) -> (VariableStore, ClauseStore, AnalyzeContext) {
        let mut vars = VariableStore::new();
        for _ in 0..n {
            vars.new_var();
        }
        let clauses = ClauseStore::new(1 << 16);
        let mut ctx = AnalyzeContext::new(CCMinMode::Deep);
        for i in 0..n {
            ctx.init_var(Var::from_index(i));
        }
        (vars, clauses, ctx)
    }

    #[test]
    fn a_conflict_at_ground_level_is_unsat() {
        let (vars, _clauses, mut ctx) = setup(1);
        let result = ctx.analyze(&vars, &_clauses, crate::clause::ClauseRef::from_index(0), 4);
        assert!(matches!(result.conflict, Conflict::Ground));
    }

    #[test]
    fn a_simple_conflict_learns_a_unit_clause() {
        let (mut vars, mut clauses, mut ctx) = setup(2);
        let a = Var::from_index(0);
        let b = Var::from_index(1);

        // Decide a; propagate b false with reason (¬a ∨ ¬b); conflict
        // clause (¬a ∨ b) falsified by both.
        vars.new_decision_level();
        vars.assign(a.pos_lit(), None);
        // The reason clause's asserting literal (b.neg_lit()) must sit at
        // index 0, matching the invariant the propagation engine
        // maintains on its watched literals.
        let reason = clauses.add_input_clause(&[b.neg_lit(), a.neg_lit()]).unwrap();
        vars.assign(b.neg_lit(), Some(reason));
        let confl = clauses.add_input_clause(&[a.neg_lit(), b.pos_lit()]).unwrap();

        let result = ctx.analyze(&vars, &clauses, confl, 4);
        match result.conflict {
            Conflict::Unit(level, lit) => {
                assert_eq!(level, 0);
                assert_eq!(lit, a.neg_lit());
            }
            _ => panic!("expected a unit conflict"),
        }
    }

    #[test]
    fn pick_winner_prefers_the_smaller_backtrack_level() {
        let low = AnalysisResult {
            conflict: Conflict::Learned(1, Lit::from_index(0), vec![Lit::from_index(0), Lit::from_index(2)]),
            bumped_vars: vec![],
            bumped_clauses: vec![],
        };
        let high = AnalysisResult {
            conflict: Conflict::Learned(3, Lit::from_index(0), vec![Lit::from_index(0)]),
            bumped_vars: vec![],
            bumped_clauses: vec![],
        };
        let winner = pick_winner(vec![high, low]).unwrap();
        match winner.conflict {
            Conflict::Learned(level, _, _) => assert_eq!(level, 1),
            _ => panic!(),
        }
    }
}
