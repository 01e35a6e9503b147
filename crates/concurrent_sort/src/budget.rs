use parking_lot::{Condvar, Mutex};

/// Counters of a [`WorkerBudget`] observed under its lock.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BudgetSnapshot {
    pub initial: usize,
    pub available: usize,
    pub acquired: usize,
    pub released: usize,
}

impl BudgetSnapshot {
    /// Permits handed out and not yet released.
    pub fn pending(&self) -> usize {
        self.acquired - self.released
    }

    pub fn is_balanced(&self) -> bool {
        self.acquired == self.released && self.available == self.initial
    }
}

/// Licence to run extra concurrent tasks.
///
/// Every successful [`try_acquire`](Self::try_acquire) yields a [`Permit`]
/// that gives its unit back when dropped, so acquire and release are always
/// paired, also when the holder unwinds. [`await_all`](Self::await_all) is a
/// join barrier over all outstanding permits, including ones handed out
/// while the caller is already waiting.
#[derive(Debug)]
pub struct WorkerBudget {
    state: Mutex<BudgetSnapshot>,
    drained: Condvar,
}

impl WorkerBudget {
    pub fn new(extra_workers: usize) -> Self {
        Self {
            state: Mutex::new(BudgetSnapshot {
                initial: extra_workers,
                available: extra_workers,
                acquired: 0,
                released: 0,
            }),
            drained: Condvar::new(),
        }
    }

    /// The calling thread is the first worker, so `workers - 1` permits.
    pub fn for_workers(workers: usize) -> Self {
        Self::new(workers.saturating_sub(1))
    }

    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut state = self.state.lock();
        if state.available == 0 {
            return None;
        }
        state.available -= 1;
        state.acquired += 1;
        Some(Permit { budget: self })
    }

    fn release(&self) {
        let mut state = self.state.lock();
        debug_assert!(
            state.released < state.acquired,
            "release without matching acquire: {state:?}"
        );
        state.available += 1;
        state.released += 1;
        if state.pending() == 0 {
            self.drained.notify_all();
        }
    }

    pub fn await_all(&self) {
        let mut state = self.state.lock();
        while state.pending() > 0 {
            self.drained.wait(&mut state);
        }
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        *self.state.lock()
    }
}

/// One unit of a [`WorkerBudget`], returned on drop.
#[must_use = "dropping a permit releases it immediately"]
#[derive(Debug)]
pub struct Permit<'a> {
    budget: &'a WorkerBudget,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.budget.release();
    }
}
