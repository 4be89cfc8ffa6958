//! Configuration layer (§2c). Grouped the way the teacher splits
//! `CoreSettings`/`SearcherSettings`/`DecisionHeuristicSettings`/
//! `ClauseDBSettings`: one small `Default`-able struct per subsystem
//! rather than one flat bag of fields.

/// Selects which VSIDS heap implementation backs the solver — a
/// construction-time tagged choice rather than a trait object (§9 Design
/// Notes: "dynamic dispatch... select at construction via a tagged
/// variant").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapKind {
    Classic,
    Pipelined,
}

impl Default for HeapKind {
    fn default() -> Self {
        HeapKind::Classic
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RestartSettings {
    pub luby_restart: bool,
    pub restart_first: f64,
    pub restart_inc: f64,
}

impl Default for RestartSettings {
    fn default() -> Self {
        RestartSettings {
            luby_restart: true,
            restart_first: 100.0,
            restart_inc: 2.0,
        }
    }
}

impl RestartSettings {
    /// Conflicts to go before the next restart (§4.1 restart schedule).
    pub fn conflicts_to_go(&self, restarts: u32) -> u64 {
        let base = if self.luby_restart {
            crate::util::luby(self.restart_inc, restarts)
        } else {
            self.restart_inc.powi(restarts as i32)
        };
        (base * self.restart_first) as u64
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LearnSettings {
    pub min_learnts_lim: i32,
    pub size_factor: f64,
    pub size_inc: f64,
    pub size_adjust_start_confl: i32,
    pub size_adjust_inc: f64,
}

impl Default for LearnSettings {
    fn default() -> Self {
        LearnSettings {
            min_learnts_lim: 0,
            size_factor: 1.0 / 3.0,
            size_inc: 1.1,
            size_adjust_start_confl: 100,
            size_adjust_inc: 1.5,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum CCMinMode {
    Off,
    Basic,
    Deep,
}

impl Default for CCMinMode {
    fn default() -> Self {
        CCMinMode::Deep
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseSaving {
    None,
    Limited,
    Full,
}

#[derive(Clone, Copy, Debug)]
pub struct HeuristicSettings {
    pub var_decay: f64,
    pub clause_decay: f64,
    pub random_var_freq: f64,
    pub random_seed: f64,
    pub phase_saving: PhaseSaving,
    pub rnd_pol: bool,
    pub rnd_init_act: bool,
}

impl Default for HeuristicSettings {
    fn default() -> Self {
        HeuristicSettings {
            var_decay: 0.95,
            clause_decay: 0.999,
            random_var_freq: 0.0,
            random_seed: 91648253.0,
            phase_saving: PhaseSaving::Full,
            rnd_pol: false,
            rnd_init_act: false,
        }
    }
}

/// The fan-out bounds named throughout §4: how many cooperative workers
/// of each kind may be in flight at once.
#[derive(Clone, Copy, Debug)]
pub struct ConcurrencySettings {
    pub para_lits: usize,
    pub propagators: usize,
    pub learners: usize,
    pub minimizers: usize,
    pub heaplanes: usize,
    pub max_confl: usize,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        ConcurrencySettings {
            para_lits: 4,
            propagators: 4,
            learners: 4,
            minimizers: 4,
            heaplanes: 4,
            max_confl: 16,
        }
    }
}

/// The eight base addresses of §6, distinct by prefix so a downstream
/// cache profiler can classify accesses by region. Overridable for tests
/// that want a non-default layout.
#[derive(Clone, Copy, Debug)]
pub struct AddressMap {
    pub heap_array: u64,
    pub indices_array: u64,
    pub variables: u64,
    pub watch_heads: u64,
    pub watcher_nodes: u64,
    pub clause_metadata: u64,
    pub clause_literals: u64,
    pub variable_activity: u64,
}

impl Default for AddressMap {
    fn default() -> Self {
        AddressMap {
            heap_array: 0x0000_0000,
            indices_array: 0x1000_0000,
            variables: 0x2000_0000,
            watch_heads: 0x3000_0000,
            watcher_nodes: 0x4000_0000,
            clause_metadata: 0x5000_0000,
            clause_literals: 0x6000_0000,
            variable_activity: 0x7000_0000,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Settings {
    pub heap_kind: HeapKind,
    pub restart: RestartSettings,
    pub learn: LearnSettings,
    pub ccmin_mode: CCMinMode,
    pub heuristic: HeuristicSettings,
    pub concurrency: ConcurrencySettings,
    pub addr: AddressMap,
    pub timeout_cycles: Option<u64>,
}
