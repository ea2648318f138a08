use std::sync::Arc;

use covar_core::{CovarError, Result};
use parking_lot::{Condvar, Mutex};

use crate::scheduler::Task;

enum State<T> {
    /// Not yet resolved; tasks waiting on this version.
    Pending(Vec<Arc<Task>>),
    Ready(Arc<T>),
    Failed(CovarError),
}

struct Shared<T> {
    state: Mutex<State<T>>,
    cond: Condvar,
}

/// A single-assignment future for one tile version.
///
/// A handle resolves exactly once, to either a value or an error.
/// Consumers that hold a handle to a prior version never observe a
/// later write — "updating" a tile means fulfilling a brand-new handle
/// and swapping it into the grid slot.
pub struct Handle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Handle<T> {
    /// A fresh unresolved version.
    pub fn pending() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Pending(Vec::new())),
                cond: Condvar::new(),
            }),
        }
    }

    /// An already-resolved version.
    pub fn ready(value: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Ready(Arc::new(value))),
                cond: Condvar::new(),
            }),
        }
    }

    /// An already-poisoned version.
    pub fn failed(err: CovarError) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Failed(err)),
                cond: Condvar::new(),
            }),
        }
    }

    pub(crate) fn fulfill(&self, value: T) {
        self.resolve(Ok(value));
    }

    pub(crate) fn fail(&self, err: CovarError) {
        tracing::debug!(%err, "tile version poisoned");
        self.resolve(Err(err));
    }

    fn resolve(&self, outcome: Result<T>) {
        let subscribers = {
            let mut state = self.shared.state.lock();
            match &*state {
                State::Pending(_) => {
                    let next = match outcome {
                        Ok(v) => State::Ready(Arc::new(v)),
                        Err(e) => State::Failed(e),
                    };
                    match std::mem::replace(&mut *state, next) {
                        State::Pending(subs) => subs,
                        _ => unreachable!(),
                    }
                }
                _ => {
                    // Single-assignment: a version resolves exactly once.
                    debug_assert!(false, "tile version resolved twice");
                    return;
                }
            }
        };
        self.shared.cond.notify_all();
        for task in subscribers {
            task.dep_resolved();
        }
    }

    /// Non-blocking read. Inside a task this is called only after the
    /// scheduler has seen every input resolve, so `Pending` here is a
    /// dependency-registration bug, not a race.
    pub fn value(&self) -> Result<Arc<T>> {
        match &*self.shared.state.lock() {
            State::Ready(v) => Ok(Arc::clone(v)),
            State::Failed(e) => Err(e.clone()),
            State::Pending(_) => Err(CovarError::InvalidArgument(
                "tile version read before it resolved".into(),
            )),
        }
    }

    /// Blocking read — the terminal synchronization point.
    pub fn get(&self) -> Result<Arc<T>> {
        let mut state = self.shared.state.lock();
        while matches!(&*state, State::Pending(_)) {
            self.shared.cond.wait(&mut state);
        }
        match &*state {
            State::Ready(v) => Ok(Arc::clone(v)),
            State::Failed(e) => Err(e.clone()),
            State::Pending(_) => unreachable!(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(&*self.shared.state.lock(), State::Pending(_))
    }

    /// Register a task as waiting on this version. Returns `false` if
    /// the version has already resolved (the caller decrements the
    /// task's pending count itself).
    fn subscribe(&self, task: &Arc<Task>) -> bool {
        let mut state = self.shared.state.lock();
        match &mut *state {
            State::Pending(subs) => {
                subs.push(Arc::clone(task));
                true
            }
            _ => false,
        }
    }
}

/// Type-erased dependency edge, so one task can wait on tile handles
/// and scalar handles alike.
pub trait Dep {
    fn subscribe_task(&self, task: &Arc<Task>) -> bool;
}

impl<T> Dep for Handle<T> {
    fn subscribe_task(&self, task: &Arc<Task>) -> bool {
        self.subscribe(task)
    }
}
