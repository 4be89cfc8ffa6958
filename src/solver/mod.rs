//! The top-level solver (§2, §4). Bundles the per-module stores behind
//! the public surface the teacher's `minisat/solver/mod.rs` exposes —
//! `new_var`/`add_clause`/`solve` — grounded on that file's
//! `Solver::add_clause`/`Searcher::search`, but built on this crate's
//! own propagation, analysis and heap components rather than minisat's.

pub mod analyze;
pub mod fsm;
pub mod propagate;

use std::collections::HashSet;

use crate::activity::ActivityVector;
use crate::clause::{ClauseRef, ClauseStore};
use crate::formula::{Lit, Var, VarMap};
use crate::heap::{Heap, HeapOp, HeapResp, VsidsHeap};
use crate::mem::{self, ReorderBuffer};
use crate::settings::Settings;
use crate::util::Random;
use crate::variables::VariableStore;
use crate::watches::Watches;

use analyze::{AnalysisResult, AnalyzeContext, Conflict, pick_winner};
use fsm::{FsmState, ReduceGuard};
use propagate::PropagationEngine;

const DEFAULT_ARENA_BYTES: usize = 1 << 22;

/// The single cooperative worker id the solver's own heap traffic is
/// registered under when it round-trips through the reorder buffer
/// (§4.10). There is exactly one caller of the heap from `Solver` itself,
/// so one fixed id suffices; concurrently-run analyzers never touch the
/// heap directly.
const SOLVER_WORKER: mem::WorkerId = 0;

fn encode_var(v: Var) -> Vec<u8> {
    v.index().to_le_bytes().to_vec()
}

fn decode_var(bytes: &[u8]) -> Option<Var> {
    let width = std::mem::size_of::<usize>();
    if bytes.len() < width {
        return None;
    }
    let mut buf = [0u8; std::mem::size_of::<usize>()];
    buf.copy_from_slice(&bytes[..width]);
    Some(Var::from_index(usize::from_le_bytes(buf)))
}

/// The three terminal outcomes of §6; `Unknown` only arises under a
/// conflict or cycle budget (§4.1's restart loop can also be stopped
/// externally by a caller that checks `timeout_cycles` between calls).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveOutcome {
    Sat,
    Unsat,
    Unknown,
}

/// Grounded on the teacher's `AddClauseRes` — what happened when a
/// clause was handed to the solver before search ever started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddClauseOutcome {
    Added(ClauseRef),
    /// A size-1 clause was never stored; its literal was assigned
    /// directly (mirroring minisat, which never allocates a clause for
    /// a unit).
    UnitAssigned(Lit),
    AlreadySatisfied,
    Tautology,
    ImmediatelyUnsat,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SolverStats {
    pub conflicts: u64,
    pub decisions: u64,
    pub restarts: u64,
    pub propagations: u64,
    pub learnts_removed: u64,
}

pub struct Solver {
    settings: Settings,
    vars: VariableStore,
    watches: Watches,
    clauses: ClauseStore,
    heap: Heap,
    heap_rob: ReorderBuffer,
    activity: ActivityVector,
    analyzer: AnalyzeContext,
    propagation: PropagationEngine,
    reduce: ReduceGuard,
    random: Random,
    polarity: VarMap<bool>,
    learnts: Vec<ClauseRef>,
    cla_inc: f64,
    unsat: bool,
    stats: SolverStats,
}

impl Solver {
    pub fn new(settings: Settings) -> Self {
        Self::with_arena(settings, DEFAULT_ARENA_BYTES)
    }

    pub fn with_arena(settings: Settings, arena_bytes: usize) -> Self {
        let seed = if settings.heuristic.random_seed == 0.0 {
            1.0
        } else {
            settings.heuristic.random_seed
        };
        Solver {
            vars: VariableStore::new(),
            watches: Watches::new(),
            clauses: ClauseStore::new(arena_bytes),
            heap: Heap::new(settings.heap_kind, &settings.concurrency),
            heap_rob: ReorderBuffer::new(),
            activity: ActivityVector::new(settings.heuristic.var_decay),
            analyzer: AnalyzeContext::new(settings.ccmin_mode),
            propagation: PropagationEngine::new(&settings.concurrency),
            reduce: ReduceGuard::new(settings.learn),
            random: Random::new(seed),
            polarity: VarMap::new(),
            learnts: Vec::new(),
            cla_inc: 1.0,
            unsat: false,
            stats: SolverStats::default(),
            settings,
        }
    }

    pub fn num_vars(&self) -> usize {
        self.vars.num_vars()
    }

    pub fn stats(&self) -> SolverStats {
        self.stats
    }

    pub fn new_var(&mut self) -> Var {
        let v = self.vars.new_var();
        self.watches.init_var(v);
        self.analyzer.init_var(v);
        self.polarity.insert(&v, false);
        let initial = if self.settings.heuristic.rnd_init_act {
            self.random.drand() * 0.00001
        } else {
            0.0
        };
        self.activity.init_var(v, initial);
        self.heap.init_var(v, &mut self.activity);
        self.heap.handle_req(HeapOp::Insert(v), &mut self.activity);
        v
    }

    /// Adds a clause before (or between) search rounds: sorts and dedups
    /// its literals, drops it if it is a tautology or already satisfied
    /// by a ground-level assignment, and stores what remains (§3, §4.2).
    pub fn add_clause(&mut self, lits: &[Lit]) -> crate::error::Result<AddClauseOutcome> {
        let mut ps: Vec<Lit> = lits.to_vec();
        ps.sort();
        ps.dedup();

        let mut prev: Option<Lit> = None;
        for &l in &ps {
            if let Some(p) = prev {
                if p == !l {
                    return Ok(AddClauseOutcome::Tautology);
                }
            }
            prev = Some(l);
        }

        if ps.iter().any(|&l| self.vars.is_true(l)) {
            return Ok(AddClauseOutcome::AlreadySatisfied);
        }
        ps.retain(|&l| !self.vars.is_false(l));

        if ps.is_empty() {
            self.unsat = true;
            return Ok(AddClauseOutcome::ImmediatelyUnsat);
        }
        if ps.len() == 1 {
            self.vars.assign(ps[0], None);
            return Ok(AddClauseOutcome::UnitAssigned(ps[0]));
        }

        let cr = self.clauses.add_input_clause(&ps)?;
        self.watches.watch_clause(self.clauses.head(cr), cr);
        Ok(AddClauseOutcome::Added(cr))
    }

    /// Drives the restart loop (§4.1) until the formula is decided or a
    /// `timeout_cycles` external budget would be exceeded — the caller
    /// governs that by not calling `solve` again, since cycle counting
    /// lives with whatever drives the memory-timing layer, not here.
    /// Errs on allocator exhaustion or a DEBUG_HEAP invariant violation,
    /// since both leave the solver's own state unreliable rather than
    /// just the formula undecided.
    pub fn solve(&mut self) -> crate::error::Result<SolveOutcome> {
        if self.unsat {
            return Ok(SolveOutcome::Unsat);
        }
        self.reduce.reset(self.clauses.n_orig().max(1));

        let mut restarts: u32 = 0;
        loop {
            let budget = self.settings.restart.conflicts_to_go(restarts);
            trace!("{:?}: restart #{}, budget {} conflicts", FsmState::Restart, restarts, budget);
            match self.search(budget)? {
                SolveOutcome::Unknown => {
                    restarts += 1;
                    self.stats.restarts += 1;
                    self.backtrack_to(0);
                    self.check_heap_invariant()?;
                }
                outcome => return Ok(outcome),
            }
        }
    }

    /// DEBUG_HEAP (§4.8, §6): surfaces the heap's own inconsistency count
    /// as a real, fatal `SimError` rather than a number nothing ever
    /// reads. Run once per restart, when the heap is quiescent.
    fn check_heap_invariant(&mut self) -> crate::error::Result<()> {
        match self.heap.handle_req(HeapOp::DebugHeap, &mut self.activity) {
            HeapResp::InconsistencyCount(0) => Ok(()),
            HeapResp::InconsistencyCount(n) => Err(crate::error::SimError::InvariantViolation {
                detail: format!("DEBUG_HEAP reported {} inconsistencies", n),
            }),
            _ => Ok(()),
        }
    }

    /// Looks up a variable's current VSIDS activity, failing with
    /// [`crate::error::SimError::UnknownVar`] for an index `new_var` has
    /// never allocated.
    pub fn var_activity(&self, v: Var) -> crate::error::Result<f64> {
        if v.index() >= self.vars.num_vars() {
            return Err(crate::error::SimError::UnknownVar(v));
        }
        Ok(self.activity.read(v))
    }

    /// One restart round: propagate to fixpoint or conflict, analyze and
    /// learn on conflict, decide otherwise, until SAT/UNSAT is settled or
    /// the round's conflict budget runs out (§4.1 STEP/PROPAGATE/DECIDE/
    /// ANALYZE/BACKTRACK/REDUCE transitions).
    fn search(&mut self, budget: u64) -> crate::error::Result<SolveOutcome> {
        let mut conflicts_this_round: u64 = 0;

        loop {
            trace!("{:?}", FsmState::Propagate);
            let (prop_stats, conflicts) =
                self.propagation.run(&mut self.vars, &mut self.watches, &mut self.clauses);
            self.stats.propagations += prop_stats.parallel_vars_consumed;

            if conflicts.is_empty() {
                if conflicts_this_round >= budget {
                    return Ok(SolveOutcome::Unknown);
                }
                trace!("{:?}", FsmState::Decide);
                match self.pick_decision_lit() {
                    None => return Ok(SolveOutcome::Sat),
                    Some(lit) => {
                        self.stats.decisions += 1;
                        self.vars.new_decision_level();
                        self.vars.assign(lit, None);
                    }
                }
                continue;
            }

            self.stats.conflicts += 1;
            conflicts_this_round += 1;

            if self.vars.is_ground_level() {
                self.unsat = true;
                return Ok(SolveOutcome::Unsat);
            }

            trace!(
                "{:?}: {} conflict clause(s) to analyze",
                FsmState::Analyze,
                conflicts.len()
            );
            // At most LEARNERS conflict clauses are analyzed per round
            // (§4.3): the rest stay queued in `conflicts` for the next
            // propagate/analyze pass, rather than pretending every
            // reported conflict had its own concurrent analyzer lane.
            let learners = self.settings.concurrency.learners.max(1);
            let minimizers = self.settings.concurrency.minimizers;
            let results: Vec<AnalysisResult> = conflicts
                .iter()
                .take(learners)
                .map(|&cr| self.analyzer.analyze(&self.vars, &self.clauses, cr, minimizers))
                .collect();
            let winner = pick_winner(results).expect("propagation reported a conflict");

            self.bump_vars(&winner.bumped_vars);
            self.activity.decay();
            self.bump_clauses(&winner.bumped_clauses);
            self.cla_inc *= 1.0 / self.settings.heuristic.clause_decay;

            trace!("{:?}", FsmState::Backtrack);
            match winner.conflict {
                Conflict::Ground => {
                    self.unsat = true;
                    return Ok(SolveOutcome::Unsat);
                }
                Conflict::Unit(level, lit) => {
                    self.backtrack_to(level);
                    self.vars.assign(lit, None);
                }
                Conflict::Learned(level, asserting, lits) => {
                    self.backtrack_to(level);
                    let cr = self.clauses.add_learnt_clause(&lits)?;
                    self.learnts.push(cr);
                    self.watches.watch_clause(self.clauses.head(cr), cr);
                    self.vars.assign(asserting, Some(cr));
                }
            }

            self.reduce.bump();
            if (self.learnts.len() as f64) >= self.reduce.border() {
                trace!(
                    "{:?}: {} learnt clauses, border {}",
                    FsmState::Reduce,
                    self.learnts.len(),
                    self.reduce.border()
                );
                self.reduce_db();
            }
        }
    }

    /// Round-trips a heap read through [`mem::ReorderBuffer`] (§4.10):
    /// the read's result is registered against [`SOLVER_WORKER`], handed
    /// to the reorder buffer as if it were a memory response, and
    /// immediately taken back out before this call returns. The heap
    /// itself still answers synchronously (§9's in-process
    /// re-architecture), but every read the decision step makes now
    /// genuinely passes through the request/response contract rather
    /// than calling the heap directly.
    fn heap_read_via_mem(&mut self, pos: usize) -> Option<Var> {
        let req = self.heap_rob.register_request(SOLVER_WORKER);
        let v = match self.heap.handle_req(HeapOp::Read(pos), &mut self.activity) {
            HeapResp::Var(v) => v,
            _ => None,
        };
        let bytes = v.map(encode_var).unwrap_or_default();
        self.heap_rob.store_response(req, bytes);
        self.heap_rob.take_response(SOLVER_WORKER).and_then(|b| decode_var(&b))
    }

    /// Round-trips a heap re-insert through [`mem::ReorderBuffer`], the
    /// counterpart of [`Self::heap_read_via_mem`] used by
    /// [`Self::backtrack_to`].
    fn heap_insert_via_mem(&mut self, v: Var) {
        let req = self.heap_rob.register_request(SOLVER_WORKER);
        self.heap.handle_req(HeapOp::Insert(v), &mut self.activity);
        self.heap_rob.store_response(req, encode_var(v));
        self.heap_rob.take_response(SOLVER_WORKER);
    }

    fn pick_decision_lit(&mut self) -> Option<Lit> {
        let mut next: Option<Var> = None;
        if self.settings.heuristic.random_var_freq > 0.0 && self.heap.size() > 0 {
            if self.random.chance(self.settings.heuristic.random_var_freq) {
                let pos = self.random.irand(self.heap.size());
                if let Some(v) = self.heap_read_via_mem(pos) {
                    if self.vars.is_undef_var(v) {
                        next = Some(v);
                    }
                }
            }
        }

        let v = loop {
            if let Some(v) = next {
                break v;
            }
            match self.heap.handle_req(HeapOp::RemoveMin, &mut self.activity) {
                HeapResp::Var(Some(v)) if self.vars.is_undef_var(v) => break v,
                HeapResp::Var(Some(_)) => continue,
                _ => return None,
            }
        };

        let rnd_pol = self.settings.heuristic.rnd_pol && self.random.chance(0.5);
        let negated = if rnd_pol {
            self.random.chance(0.5)
        } else {
            *self.polarity.get(&v).unwrap_or(&false)
        };
        Some(v.lit(negated))
    }

    /// Undoes every assignment above `level`, feeding each freed variable
    /// back to the heap and recording its last polarity for phase
    /// saving (§4.6, §4.8).
    fn backtrack_to(&mut self, level: usize) {
        let mut freed = Vec::new();
        let Solver { vars, polarity, .. } = self;
        vars.cancel_until(level, |lit| {
            polarity.insert(&lit.var(), lit.sign());
            freed.push(lit.var());
        });
        for v in freed {
            self.heap_insert_via_mem(v);
        }
    }

    fn bump_vars(&mut self, vars: &[Var]) {
        for &v in vars {
            self.heap.handle_req(HeapOp::Bump(v), &mut self.activity);
        }
    }

    /// Clause-activity bump with the 1e20/1e-20 rescale (§4.3
    /// post-analysis), matching the teacher's `ClauseDB::bump_activity`.
    fn bump_clauses(&mut self, refs: &[ClauseRef]) {
        for &cr in refs {
            if !self.clauses.is_learnt(cr) {
                continue;
            }
            let new_act = self.clauses.activity(cr) + self.cla_inc as f32;
            self.clauses.set_activity(cr, new_act);
            if new_act > 1e20 {
                for &lr in &self.learnts {
                    let rescaled = self.clauses.activity(lr) * 1e-20;
                    self.clauses.set_activity(lr, rescaled);
                }
                self.cla_inc *= 1e-20;
            }
        }
    }

    fn is_locked(&self, cr: ClauseRef) -> bool {
        let lits = self.clauses.lits(cr);
        let c0 = lits[0];
        self.vars.is_true(c0) && self.vars.reason_of(c0.var()) == Some(cr)
    }

    /// Deletes the lower-activity half of the learnt database, excluding
    /// binary and currently-locked clauses (§4.1 REDUCE, grounded on
    /// `ClauseDB::reduce`).
    fn reduce_db(&mut self) {
        let mut candidates: Vec<ClauseRef> = self
            .learnts
            .iter()
            .copied()
            .filter(|&cr| self.clauses.len(cr) > 2 && !self.is_locked(cr))
            .collect();
        candidates.sort_by(|&a, &b| {
            self.clauses
                .activity(a)
                .partial_cmp(&self.clauses.activity(b))
                .unwrap()
        });

        let remove_count = candidates.len() / 2;
        let mut removed: HashSet<u32> = HashSet::new();
        for &cr in candidates.iter().take(remove_count) {
            let (c0, c1) = self.clauses.head(cr);
            self.watches.remove(c0, cr);
            self.watches.remove(c1, cr);
            self.clauses.remove(cr);
            removed.insert(cr.index());
            self.stats.learnts_removed += 1;
        }
        debug!("reduce_db: removed {} of {} learnt clauses", removed.len(), self.learnts.len());
        self.learnts.retain(|cr| !removed.contains(&cr.index()));
    }

    /// The satisfying assignment after `solve` returns `Sat`, indexed by
    /// variable index (§6).
    pub fn model(&self) -> Vec<bool> {
        (0..self.vars.num_vars())
            .map(|i| self.vars.is_true(Var::from_index(i).pos_lit()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_single_satisfiable_clause_is_sat() {
        let mut s = Solver::new(Settings::default());
        let a = s.new_var();
        let b = s.new_var();
        s.add_clause(&[a.pos_lit(), b.pos_lit()]).unwrap();
        assert_eq!(s.solve().unwrap(), SolveOutcome::Sat);
        let model = s.model();
        assert!(model[a.index()] || model[b.index()]);
    }

    #[test]
    fn two_complementary_unit_clauses_are_unsat() {
        let mut s = Solver::new(Settings::default());
        let a = s.new_var();
        assert_eq!(
            s.add_clause(&[a.pos_lit()]).unwrap(),
            AddClauseOutcome::UnitAssigned(a.pos_lit())
        );
        assert_eq!(
            s.add_clause(&[a.neg_lit()]).unwrap(),
            AddClauseOutcome::ImmediatelyUnsat
        );
        assert_eq!(s.solve().unwrap(), SolveOutcome::Unsat);
    }

    #[test]
    fn a_binary_clause_falsified_by_two_units_is_unsat() {
        let mut s = Solver::new(Settings::default());
        let a = s.new_var();
        let b = s.new_var();
        s.add_clause(&[a.neg_lit(), b.neg_lit()]).unwrap();
        s.add_clause(&[a.pos_lit()]).unwrap();
        s.add_clause(&[b.pos_lit()]).unwrap();
        assert_eq!(s.solve().unwrap(), SolveOutcome::Unsat);
    }

    #[test]
    fn a_tautological_clause_is_dropped_without_effect() {
        let mut s = Solver::new(Settings::default());
        let a = s.new_var();
        assert_eq!(
            s.add_clause(&[a.pos_lit(), a.neg_lit()]).unwrap(),
            AddClauseOutcome::Tautology
        );
    }

    #[test]
    fn pigeonhole_two_pigeons_one_hole_is_unsat() {
        // p0 in h0, p0 in h1, p1 in h0, p1 in h1, each pigeon in at least
        // one hole, no hole holds both pigeons.
        let mut s = Solver::new(Settings::default());
        let p0h0 = s.new_var();
        let p0h1 = s.new_var();
        let p1h0 = s.new_var();
        let p1h1 = s.new_var();
        s.add_clause(&[p0h0.pos_lit(), p0h1.pos_lit()]).unwrap();
        s.add_clause(&[p1h0.pos_lit(), p1h1.pos_lit()]).unwrap();
        s.add_clause(&[p0h0.neg_lit(), p1h0.neg_lit()]).unwrap();
        s.add_clause(&[p0h1.neg_lit(), p1h1.neg_lit()]).unwrap();
        assert_eq!(s.solve().unwrap(), SolveOutcome::Unsat);
    }

    #[test]
    fn var_activity_reports_unknown_var_past_the_allocated_range() {
        let mut s = Solver::new(Settings::default());
        let a = s.new_var();
        assert!(s.var_activity(a).is_ok());
        let phantom = Var::from_index(a.index() + 1);
        assert!(matches!(
            s.var_activity(phantom),
            Err(crate::error::SimError::UnknownVar(_))
        ));
    }
}
