//! The cooperative concurrency substrate (§5, §9 Design Notes). The
//! original model expresses long-latency memory operations as stackful
//! coroutines; here each worker is instead a step-function state machine
//! that reports whether it yielded (still waiting on something) or ran
//! to completion, and the [`Scheduler`] is the tick loop that resumes
//! ready workers, polls stalled ones, and admits new workers while lanes
//! are free. There are no true threads and no asynchronous runtime.

/// What a worker reports after being stepped once.
pub enum WorkerState<T> {
    /// Still waiting on a memory response or a contested lock; try again
    /// next tick.
    Yielded,
    /// Finished, with its result.
    Done(T),
}

/// A single cooperative unit of work. `step` must be idempotent with
/// respect to "no progress possible yet" — calling it again before the
/// blocking condition clears just yields again.
pub trait Worker {
    type Output;

    fn step(&mut self) -> WorkerState<Self::Output>;
}

/// Runs a worker to completion by stepping it every tick, counting how
/// many ticks it took. Used where the surrounding algorithm needs a
/// single synchronous result (e.g. classic-heap `insert`/`bump` driven
/// to completion before the caller proceeds) while still expressing the
/// operation as a steppable worker, so the same type can also be driven
/// concurrently with other lanes by a real [`Scheduler`].
pub fn run_to_completion<W: Worker>(mut w: W) -> (W::Output, u64) {
    let mut ticks = 0u64;
    loop {
        ticks += 1;
        match w.step() {
            WorkerState::Done(out) => return (out, ticks),
            WorkerState::Yielded => continue,
        }
    }
}

/// A bounded pool of concurrently in-flight workers of one kind (PARA_LITS,
/// PROPAGATORS, LEARNERS, MINIMIZERS, HEAPLANES — §4.2-§4.7). Each tick,
/// every resident worker is stepped once; finished workers free their
/// lane for newly spawned ones.
pub struct Scheduler<W: Worker> {
    capacity: usize,
    lanes: Vec<W>,
    pending: std::collections::VecDeque<W>,
}

impl<W: Worker> Scheduler<W> {
    pub fn new(capacity: usize) -> Self {
        Scheduler {
            capacity,
            lanes: Vec::new(),
            pending: std::collections::VecDeque::new(),
        }
    }

    pub fn spawn(&mut self, w: W) {
        if self.lanes.len() < self.capacity {
            self.lanes.push(w);
        } else {
            self.pending.push_back(w);
        }
    }

    pub fn is_idle(&self) -> bool {
        self.lanes.is_empty() && self.pending.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.lanes.len() + self.pending.len()
    }

    /// Step every resident lane once, collecting completed outputs and
    /// admitting queued workers into freed lanes.
    pub fn tick(&mut self) -> Vec<W::Output> {
        let mut done = Vec::new();
        let mut i = 0;
        while i < self.lanes.len() {
            match self.lanes[i].step() {
                WorkerState::Done(out) => {
                    done.push(out);
                    self.lanes.swap_remove(i);
                }
                WorkerState::Yielded => {
                    i += 1;
                }
            }
        }
        while self.lanes.len() < self.capacity {
            match self.pending.pop_front() {
                Some(w) => self.lanes.push(w),
                None => break,
            }
        }
        done
    }
}

/// A cooperative unit of work that needs mutable access to shared state
/// it does not own (§4.2: literal workers read/write the watch lists,
/// the clause store and the trail). `Ctx` is threaded through every
/// `step` call rather than captured by the worker, since a captured
/// `&mut` would have to outlive the worker's residency in a
/// [`CtxScheduler`] across many ticks, which Rust's borrow checker
/// cannot express for a struct held in a `Vec`.
pub trait CtxWorker<Ctx: ?Sized> {
    type Output;

    fn step(&mut self, ctx: &mut Ctx) -> WorkerState<Self::Output>;
}

/// [`Scheduler`]'s counterpart for [`CtxWorker`]s. Identical admission
/// and draining policy; `tick` additionally takes the shared context and
/// passes it to every resident lane.
pub struct CtxScheduler<Ctx: ?Sized, W: CtxWorker<Ctx>> {
    capacity: usize,
    lanes: Vec<W>,
    pending: std::collections::VecDeque<W>,
    _ctx: std::marker::PhantomData<fn(&mut Ctx)>,
}

impl<Ctx: ?Sized, W: CtxWorker<Ctx>> CtxScheduler<Ctx, W> {
    pub fn new(capacity: usize) -> Self {
        CtxScheduler {
            capacity,
            lanes: Vec::new(),
            pending: std::collections::VecDeque::new(),
            _ctx: std::marker::PhantomData,
        }
    }

    pub fn spawn(&mut self, w: W) {
        if self.lanes.len() < self.capacity {
            self.lanes.push(w);
        } else {
            self.pending.push_back(w);
        }
    }

    pub fn is_idle(&self) -> bool {
        self.lanes.is_empty() && self.pending.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.lanes.len() + self.pending.len()
    }

    pub fn tick(&mut self, ctx: &mut Ctx) -> Vec<W::Output> {
        let mut done = Vec::new();
        let mut i = 0;
        while i < self.lanes.len() {
            match self.lanes[i].step(ctx) {
                WorkerState::Done(out) => {
                    done.push(out);
                    self.lanes.swap_remove(i);
                }
                WorkerState::Yielded => {
                    i += 1;
                }
            }
        }
        while self.lanes.len() < self.capacity {
            match self.pending.pop_front() {
                Some(w) => self.lanes.push(w),
                None => break,
            }
        }
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown(u32);
    impl Worker for Countdown {
        type Output = u32;
        fn step(&mut self) -> WorkerState<u32> {
            if self.0 == 0 {
                WorkerState::Done(0)
            } else {
                self.0 -= 1;
                WorkerState::Yielded
            }
        }
    }

    #[test]
    fn run_to_completion_counts_ticks() {
        let (out, ticks) = run_to_completion(Countdown(3));
        assert_eq!(out, 0);
        assert_eq!(ticks, 4);
    }

    #[test]
    fn scheduler_admits_pending_work_as_lanes_free() {
        let mut sched: Scheduler<Countdown> = Scheduler::new(2);
        sched.spawn(Countdown(0));
        sched.spawn(Countdown(0));
        sched.spawn(Countdown(1));
        assert_eq!(sched.in_flight(), 3);
        let done = sched.tick();
        assert_eq!(done.len(), 2);
        assert_eq!(sched.in_flight(), 1);
        let done = sched.tick();
        assert_eq!(done.len(), 0); // third worker still counting down
        let done = sched.tick();
        assert_eq!(done.len(), 1);
        assert!(sched.is_idle());
    }

    struct Accumulate(u32);
    impl CtxWorker<i64> for Accumulate {
        type Output = u32;
        fn step(&mut self, ctx: &mut i64) -> WorkerState<u32> {
            *ctx += 1;
            if self.0 == 0 {
                WorkerState::Done(0)
            } else {
                self.0 -= 1;
                WorkerState::Yielded
            }
        }
    }

    #[test]
    fn ctx_scheduler_threads_shared_state_through_every_lane() {
        let mut sched: CtxScheduler<i64, Accumulate> = CtxScheduler::new(2);
        sched.spawn(Accumulate(0));
        sched.spawn(Accumulate(1));
        let mut ctx = 0i64;
        let done = sched.tick(&mut ctx);
        assert_eq!(done.len(), 1);
        assert_eq!(ctx, 2);
        let done = sched.tick(&mut ctx);
        assert_eq!(done.len(), 1);
        assert_eq!(ctx, 3);
        assert!(sched.is_idle());
    }
}
