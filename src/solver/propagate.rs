//! Unit propagation (§4.2). Grounded on `minisat/watches.rs`'s
//! `Watches::propagate` (the head/tail in-place compaction over one
//! literal's watcher vector), re-expressed as a drain-and-rebuild
//! traversal of [`crate::watches::Watches`]'s block-chain lists driven by
//! a [`crate::sched::CtxWorker`] per dequeued trail literal, so the
//! PARA_LITS/PROPAGATORS fan-out bounds of the concurrency model have an
//! actual cooperative-scheduling expression rather than being folded into
//! a single sequential loop.

use std::collections::HashSet;

use crate::clause::ClauseRef;
use crate::formula::Lit;
use crate::sched::{CtxScheduler, CtxWorker, WorkerState};
use crate::settings::ConcurrencySettings;
use crate::variables::VariableStore;
use crate::watches::{Watcher, Watches};

#[derive(Clone, Copy, Debug, Default)]
pub struct PropagationStats {
    pub watchers_inspected: u64,
    pub blocks_visited: u64,
    pub parallel_vars_consumed: u64,
}

/// The state a [`LiteralWorker`] needs mutable access to, threaded
/// through every `step` call rather than captured (§5: workers never own
/// the structures they operate on).
pub struct PropagateCtx<'a> {
    pub vars: &'a mut VariableStore,
    pub watches: &'a mut Watches,
    pub clauses: &'a mut crate::clause::ClauseStore,
    pub stats: &'a mut PropagationStats,
    pub conflicts: &'a mut Vec<ClauseRef>,
    pub max_confl: usize,
    pub propagators: usize,
    /// Clauses currently being inspected/mutated by some lane's watcher
    /// (§4.2: "acquire the clause's lock before touching its watched
    /// literals"). A second lane whose own watcher touches the same
    /// clause — two binary clauses sharing both watched literals is the
    /// common case — must spin-yield rather than race it.
    pub clause_locks: &'a mut HashSet<ClauseRef>,
    /// Watch lists a lane is currently migrating a watcher onto, keyed by
    /// the destination literal.
    pub migrate_locks: &'a mut HashSet<Lit>,
}

/// Processes the watch list of one falsified literal (§4.2's per-literal
/// worker), inspecting up to `propagators` watchers per `step` call.
pub struct LiteralWorker {
    false_lit: Lit,
    drained: Option<Vec<Watcher>>,
    total: usize,
    idx: usize,
    kept: Vec<Watcher>,
}

impl LiteralWorker {
    pub fn new(false_lit: Lit) -> Self {
        LiteralWorker {
            false_lit,
            drained: None,
            total: 0,
            idx: 0,
            kept: Vec::new(),
        }
    }
}

impl<'a> CtxWorker<PropagateCtx<'a>> for LiteralWorker {
    type Output = Option<ClauseRef>;

    fn step(&mut self, ctx: &mut PropagateCtx<'a>) -> WorkerState<Option<ClauseRef>> {
        if self.drained.is_none() {
            let (watchers, blocks) = ctx.watches.take_all(self.false_lit);
            ctx.stats.blocks_visited += blocks as u64;
            self.total = watchers.len();
            self.drained = Some(watchers);
        }

        let batch_end = (self.idx + ctx.propagators).min(self.total);
        let mut conflict = None;

        while self.idx < batch_end {
            let w = self.drained.as_ref().unwrap()[self.idx];

            // Acquire the clause's lock before touching its watched
            // literals (§4.2): a binary clause watched by both of its own
            // literals can have two lanes' watchers land on it in the
            // same tick, and they must not interleave swaps.
            if ctx.clause_locks.contains(&w.clause) {
                return WorkerState::Yielded;
            }
            ctx.clause_locks.insert(w.clause);
            self.idx += 1;
            ctx.stats.watchers_inspected += 1;

            // Step 1: a watcher whose blocker is already true needs no work.
            if ctx.vars.is_true(w.blocker) {
                self.kept.push(w);
                ctx.clause_locks.remove(&w.clause);
                continue;
            }

            // Step 2: orient the clause so its second watched literal is
            // the one that just became false.
            let (c0, c1) = ctx.clauses.head(w.clause);
            if c0 == self.false_lit {
                ctx.clauses.swap_lits(w.clause, 0, 1);
            } else {
                debug_assert_eq!(c1, self.false_lit);
            }
            let (c0, _) = ctx.clauses.head(w.clause);

            // Step 3: the other watched literal is already true.
            if ctx.vars.is_true(c0) {
                self.kept.push(Watcher {
                    clause: w.clause,
                    blocker: c0,
                });
                ctx.clause_locks.remove(&w.clause);
                continue;
            }

            // Step 4: look past the two watched literals for a literal
            // that is not currently false, and migrate the watch there.
            // The destination watch list gets its own lock, since a
            // second lane may simultaneously be migrating a different
            // clause's watch onto the same literal.
            let lits = ctx.clauses.lits(w.clause);
            let mut moved = false;
            let mut blocked_on_migrate = false;
            for k in 2..lits.len() {
                let l = lits[k];
                if !ctx.vars.is_false(l) {
                    if ctx.migrate_locks.contains(&l) {
                        blocked_on_migrate = true;
                        break;
                    }
                    ctx.migrate_locks.insert(l);
                    ctx.clauses.swap_lits(w.clause, 1, k);
                    ctx.watches.add(l, w.clause, c0);
                    ctx.migrate_locks.remove(&l);
                    moved = true;
                    break;
                }
            }
            if blocked_on_migrate {
                // Undo the bookkeeping for this watcher and retry it next
                // tick rather than spin on the held migration lock here.
                self.idx -= 1;
                ctx.stats.watchers_inspected -= 1;
                ctx.clause_locks.remove(&w.clause);
                return WorkerState::Yielded;
            }
            if moved {
                ctx.clause_locks.remove(&w.clause);
                continue;
            }

            // Step 5: unit or conflicting under the current assignment.
            self.kept.push(Watcher {
                clause: w.clause,
                blocker: c0,
            });
            if ctx.vars.is_false(c0) {
                conflict = Some(w.clause);
                ctx.clause_locks.remove(&w.clause);
                break;
            } else {
                ctx.vars.assign(c0, Some(w.clause));
            }
            ctx.clause_locks.remove(&w.clause);
        }

        if let Some(cr) = conflict {
            let drained = self.drained.take().unwrap();
            self.kept.extend_from_slice(&drained[self.idx..]);
            for w in self.kept.drain(..) {
                ctx.watches.add_raw(self.false_lit, w);
            }
            ctx.vars.dequeue_all();
            if ctx.conflicts.len() < ctx.max_confl {
                ctx.conflicts.push(cr);
            }
            return WorkerState::Done(Some(cr));
        }

        if self.idx >= self.total {
            for w in self.kept.drain(..) {
                ctx.watches.add_raw(self.false_lit, w);
            }
            return WorkerState::Done(None);
        }

        WorkerState::Yielded
    }
}

/// Drives up to `para_lits` [`LiteralWorker`]s concurrently until the
/// trail is fully drained (or MAX_CONFL is reached and the remaining
/// queue is discarded by [`VariableStore::dequeue_all`] from inside a
/// conflicting worker).
pub struct PropagationEngine {
    para_lits: usize,
    propagators: usize,
    max_confl: usize,
}

impl PropagationEngine {
    pub fn new(concurrency: &ConcurrencySettings) -> Self {
        PropagationEngine {
            para_lits: concurrency.para_lits.max(1),
            propagators: concurrency.propagators.max(1),
            max_confl: concurrency.max_confl.max(1),
        }
    }

    pub fn run(
        &self,
        vars: &mut VariableStore,
        watches: &mut Watches,
        clauses: &mut crate::clause::ClauseStore,
    ) -> (PropagationStats, Vec<ClauseRef>) {
        let mut stats = PropagationStats::default();
        let mut conflicts = Vec::new();
        let mut clause_locks = HashSet::new();
        let mut migrate_locks = HashSet::new();
        let mut scheduler: CtxScheduler<PropagateCtx, LiteralWorker> =
            CtxScheduler::new(self.para_lits);

        let mut ctx = PropagateCtx {
            vars,
            watches,
            clauses,
            stats: &mut stats,
            conflicts: &mut conflicts,
            max_confl: self.max_confl,
            propagators: self.propagators,
            clause_locks: &mut clause_locks,
            migrate_locks: &mut migrate_locks,
        };

        loop {
            while scheduler.in_flight() < self.para_lits {
                match ctx.vars.dequeue() {
                    Some(p) => scheduler.spawn(LiteralWorker::new(!p)),
                    None => break,
                }
            }
            if scheduler.is_idle() {
                break;
            }
            let done = scheduler.tick(&mut ctx);
            ctx.stats.parallel_vars_consumed += done.len() as u64;
        }

        debug_assert!(ctx.clause_locks.is_empty() && ctx.migrate_locks.is_empty());
        (stats, conflicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::ClauseStore;
    use crate::formula::Var;
    use crate::settings::ConcurrencySettings;

    fn setup(n: usize) -> (VariableStore, Watches, ClauseStore) {
        let mut vars = VariableStore::new();
        let mut watches = Watches::new();
        for _ in 0..n {
            let v = vars.new_var();
            watches.init_var(v);
        }
        (vars, watches, ClauseStore::new(1 << 16))
    }

    #[test]
    fn a_satisfied_binary_clause_moves_no_watchers() {
        let (mut vars, mut watches, mut clauses) = setup(2);
        let x = Var::from_index(0);
        let y = Var::from_index(1);
        let cr = clauses.add_input_clause(&[x.pos_lit(), y.pos_lit()]).unwrap();
        watches.watch_clause(clauses.head(cr), cr);

        vars.assign(x.pos_lit(), None);
        let engine = PropagationEngine::new(&ConcurrencySettings::default());
        let (_stats, conflicts) = engine.run(&mut vars, &mut watches, &mut clauses);
        assert!(conflicts.is_empty());
        // x.pos_lit() watches the clause under x's own slot untouched;
        // y's binary partner slot still watches the clause too.
        assert_eq!(watches.watcher_count(y.pos_lit()), 1);
    }

    #[test]
    fn a_unit_clause_under_assignment_propagates_its_other_literal() {
        let (mut vars, mut watches, mut clauses) = setup(2);
        let x = Var::from_index(0);
        let y = Var::from_index(1);
        let cr = clauses.add_input_clause(&[x.pos_lit(), y.pos_lit()]).unwrap();
        watches.watch_clause(clauses.head(cr), cr);

        vars.assign(x.neg_lit(), None);
        let engine = PropagationEngine::new(&ConcurrencySettings::default());
        let (_stats, conflicts) = engine.run(&mut vars, &mut watches, &mut clauses);
        assert!(conflicts.is_empty());
        assert!(vars.is_true(y.pos_lit()));
        assert_eq!(vars.reason_of(y), Some(cr));
    }

    #[test]
    fn falsifying_both_literals_of_a_binary_clause_is_a_conflict() {
        let (mut vars, mut watches, mut clauses) = setup(2);
        let x = Var::from_index(0);
        let y = Var::from_index(1);
        let cr = clauses.add_input_clause(&[x.pos_lit(), y.pos_lit()]).unwrap();
        watches.watch_clause(clauses.head(cr), cr);

        vars.assign(y.neg_lit(), None);
        vars.assign(x.neg_lit(), None);
        let engine = PropagationEngine::new(&ConcurrencySettings::default());
        let (_stats, conflicts) = engine.run(&mut vars, &mut watches, &mut clauses);
        assert_eq!(conflicts, vec![cr]);
    }

    #[test]
    fn a_third_literal_absorbs_the_watch_when_its_partner_falls() {
        let (mut vars, mut watches, mut clauses) = setup(3);
        let x = Var::from_index(0);
        let y = Var::from_index(1);
        let z = Var::from_index(2);
        let cr = clauses
            .add_input_clause(&[x.pos_lit(), y.pos_lit(), z.pos_lit()])
            .unwrap();
        watches.watch_clause(clauses.head(cr), cr);

        vars.assign(x.neg_lit(), None);
        let engine = PropagationEngine::new(&ConcurrencySettings::default());
        let (_stats, conflicts) = engine.run(&mut vars, &mut watches, &mut clauses);
        assert!(conflicts.is_empty());
        assert!(vars.is_undef_var(y));
        assert!(vars.is_undef_var(z));
        // The watch formerly registered at x's own literal has migrated
        // onto z, leaving x's slot empty rather than stale.
        assert_eq!(watches.watcher_count(x.pos_lit()), 0);
        assert_eq!(watches.watcher_count(z.pos_lit()), 1);
    }
}
