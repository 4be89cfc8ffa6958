//! The control FSM's state tag (§4.1) and the two cadence guards that
//! gate its REDUCE/RESTART transitions. Grounded on
//! `minisat/solver/mod.rs`'s restart/learnt-size-adjustment cadence;
//! MINIMIZE and BTLEVEL are folded into the ANALYZE transition here,
//! since [`super::analyze::AnalyzeContext::analyze`] already performs
//! clause minimization and backtrack-level selection as one call, the
//! same way the teacher's own `analyze()` does.

use crate::settings::LearnSettings;

/// One tick of the solver loop is always in exactly one of these states
/// (used for `trace!` transition logging, §2a).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsmState {
    Idle,
    Init,
    Propagate,
    Decide,
    Analyze,
    Backtrack,
    Reduce,
    Restart,
    WaitHeap,
    Done,
}

/// Tracks the DB-reduction schedule (§4.1): `max_learnts` grows by
/// `size_inc` every `size_adjust_cnt` conflicts, and that cadence itself
/// stretches by `size_adjust_inc` each time it fires.
pub struct ReduceGuard {
    settings: LearnSettings,
    max_learnts: f64,
    size_adjust_confl: f64,
    size_adjust_cnt: i32,
}

impl ReduceGuard {
    pub fn new(settings: LearnSettings) -> Self {
        ReduceGuard {
            settings,
            max_learnts: 0.0,
            size_adjust_confl: 0.0,
            size_adjust_cnt: 0,
        }
    }

    pub fn reset(&mut self, num_clauses: usize) {
        self.max_learnts =
            ((num_clauses as f64) * self.settings.size_factor).max(self.settings.min_learnts_lim as f64);
        self.size_adjust_confl = self.settings.size_adjust_start_confl as f64;
        self.size_adjust_cnt = self.settings.size_adjust_start_confl;
    }

    /// Call once per conflict; returns `true` on the conflict where the
    /// cadence fires (border widens).
    pub fn bump(&mut self) -> bool {
        self.size_adjust_cnt -= 1;
        if self.size_adjust_cnt == 0 {
            self.size_adjust_confl *= self.settings.size_adjust_inc;
            self.size_adjust_cnt = self.size_adjust_confl as i32;
            self.max_learnts *= self.settings.size_inc;
            true
        } else {
            false
        }
    }

    pub fn border(&self) -> f64 {
        self.max_learnts
    }
}
