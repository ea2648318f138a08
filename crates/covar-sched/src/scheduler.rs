use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use covar_core::Result;
use parking_lot::Mutex;

use crate::handle::{Dep, Handle};

/// One node in the dataflow graph: a continuation gated on a count of
/// unresolved inputs. When the count reaches zero the job is spawned
/// on the worker pool; it runs at most once.
pub struct Task {
    pending: AtomicUsize,
    job: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    sched: Scheduler,
}

impl Task {
    pub(crate) fn dep_resolved(self: &Arc<Self>) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            if let Some(job) = self.job.lock().take() {
                self.sched.spawn(job);
            }
        }
    }
}

/// Issues tile operations as dependency-gated tasks.
///
/// Execution order is causal only: the dependency edges decide what may
/// run, never the issue order. Independent tiles run concurrently on
/// the rayon pool (the process-global pool by default).
#[derive(Clone, Default)]
pub struct Scheduler {
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { pool: None }
    }

    /// Run tasks on a dedicated pool instead of the global one.
    pub fn with_pool(pool: Arc<rayon::ThreadPool>) -> Self {
        Self { pool: Some(pool) }
    }

    fn spawn(&self, job: Box<dyn FnOnce() + Send>) {
        match &self.pool {
            Some(pool) => pool.spawn(job),
            None => rayon::spawn(job),
        }
    }

    /// Register `f` as a continuation of `deps`. The returned handle is
    /// the sole new version produced by this task.
    pub fn task<T, F>(&self, deps: &[&dyn Dep], f: F) -> Handle<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        tracing::trace!(deps = deps.len(), "dataflow task issued");
        let out = Handle::pending();
        let slot = out.clone();
        let job: Box<dyn FnOnce() + Send> = Box::new(move || match f() {
            Ok(value) => slot.fulfill(value),
            Err(err) => slot.fail(err),
        });
        // The +1 guard keeps the task from firing while its
        // dependencies are still being registered.
        let task = Arc::new(Task {
            pending: AtomicUsize::new(deps.len() + 1),
            job: Mutex::new(Some(job)),
            sched: self.clone(),
        });
        for dep in deps {
            if !dep.subscribe_task(&task) {
                task.dep_resolved();
            }
        }
        task.dep_resolved();
        out
    }

    /// Continuation of one input, unwrapped.
    pub fn dataflow1<A, T, F>(&self, a: &Handle<A>, f: F) -> Handle<T>
    where
        A: Send + Sync + 'static,
        T: Send + Sync + 'static,
        F: FnOnce(&A) -> Result<T> + Send + 'static,
    {
        let a2 = a.clone();
        self.task(&[a], move || f(&*a2.value()?))
    }

    /// Continuation of two inputs, unwrapped.
    pub fn dataflow2<A, B, T, F>(&self, a: &Handle<A>, b: &Handle<B>, f: F) -> Handle<T>
    where
        A: Send + Sync + 'static,
        B: Send + Sync + 'static,
        T: Send + Sync + 'static,
        F: FnOnce(&A, &B) -> Result<T> + Send + 'static,
    {
        let (a2, b2) = (a.clone(), b.clone());
        self.task(&[a, b], move || f(&*a2.value()?, &*b2.value()?))
    }

    /// Continuation of three inputs, unwrapped.
    pub fn dataflow3<A, B, C, T, F>(
        &self,
        a: &Handle<A>,
        b: &Handle<B>,
        c: &Handle<C>,
        f: F,
    ) -> Handle<T>
    where
        A: Send + Sync + 'static,
        B: Send + Sync + 'static,
        C: Send + Sync + 'static,
        T: Send + Sync + 'static,
        F: FnOnce(&A, &B, &C) -> Result<T> + Send + 'static,
    {
        let (a2, b2, c2) = (a.clone(), b.clone(), c.clone());
        self.task(&[a, b, c], move || {
            f(&*a2.value()?, &*b2.value()?, &*c2.value()?)
        })
    }

    /// Continuation over a whole set of inputs — the reduction barrier
    /// used for trace and loss accumulation. Per-set, not global: other
    /// parts of the graph keep running.
    pub fn reduce<A, T, F>(&self, items: &[Handle<A>], f: F) -> Handle<T>
    where
        A: Send + Sync + 'static,
        T: Send + Sync + 'static,
        F: FnOnce(&[Arc<A>]) -> Result<T> + Send + 'static,
    {
        let owned: Vec<Handle<A>> = items.to_vec();
        let deps: Vec<&dyn Dep> = items.iter().map(|h| h as &dyn Dep).collect();
        self.task(&deps, move || {
            let values = owned
                .iter()
                .map(|h| h.value())
                .collect::<Result<Vec<_>>>()?;
            f(&values)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covar_core::CovarError;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn test_ready_value() {
        let h = Handle::ready(41.0_f64);
        assert!(h.is_resolved());
        assert_eq!(*h.get().unwrap(), 41.0);
    }

    #[test]
    fn test_chain_resolves_in_dependency_order() {
        let sched = Scheduler::new();
        let a = Handle::ready(2.0_f64);
        let b = sched.dataflow1(&a, |x| Ok(x * 3.0));
        let c = sched.dataflow1(&b, |x| Ok(x + 1.0));
        assert_eq!(*c.get().unwrap(), 7.0);
    }

    #[test]
    fn test_diamond() {
        let sched = Scheduler::new();
        let a = Handle::ready(1.0_f64);
        let b = sched.dataflow1(&a, |x| Ok(x + 1.0));
        let c = sched.dataflow1(&a, |x| Ok(x + 2.0));
        let d = sched.dataflow2(&b, &c, |x, y| Ok(x * y));
        assert_eq!(*d.get().unwrap(), 6.0);
    }

    #[test]
    fn test_task_waits_for_late_dependency() {
        let sched = Scheduler::new();
        let gate: Handle<f64> = Handle::pending();
        let out = sched.dataflow1(&gate, |x| Ok(x * 2.0));
        assert!(!out.is_resolved());
        gate.fulfill(10.0);
        assert_eq!(*out.get().unwrap(), 20.0);
    }

    #[test]
    fn test_reduce_sums_inputs() {
        let sched = Scheduler::new();
        let parts: Vec<Handle<f64>> = (0..10)
            .map(|i| {
                let a = Handle::ready(i as f64);
                sched.dataflow1(&a, |x| Ok(x + 1.0))
            })
            .collect();
        let total = sched.reduce(&parts, |vs| Ok(vs.iter().map(|v| **v).sum::<f64>()));
        assert_eq!(*total.get().unwrap(), 55.0);
    }

    #[test]
    fn test_failure_poisons_transitive_consumers() {
        let sched = Scheduler::new();
        let a = Handle::ready(1.0_f64);
        let b: Handle<f64> = sched.dataflow1(&a, |_| {
            Err(CovarError::NotPositiveDefinite { minor: 1 })
        });
        let c = sched.dataflow1(&b, |x| Ok(x + 1.0));
        let d = sched.dataflow2(&a, &c, |x, y| Ok(x + y));
        assert_eq!(
            d.get().unwrap_err(),
            CovarError::NotPositiveDefinite { minor: 1 }
        );
        assert_eq!(
            c.get().unwrap_err(),
            CovarError::NotPositiveDefinite { minor: 1 }
        );
    }

    #[test]
    fn test_poisoned_seed_handle() {
        let sched = Scheduler::new();
        let a: Handle<f64> = Handle::failed(CovarError::Device("stream lost".into()));
        let b = sched.dataflow1(&a, |x| Ok(x + 1.0));
        assert!(matches!(b.get(), Err(CovarError::Device(_))));
    }

    #[test]
    fn test_independent_tasks_all_complete() {
        let sched = Scheduler::new();
        let counter = Arc::new(AtomicU64::new(0));
        let handles: Vec<Handle<u64>> = (0..64)
            .map(|i| {
                let counter = Arc::clone(&counter);
                sched.task(&[], move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                    Ok(i)
                })
            })
            .collect();
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(*h.get().unwrap(), i as u64);
        }
        assert_eq!(counter.load(Ordering::Relaxed), 64);
    }

    #[test]
    fn test_dedicated_pool() {
        let pool = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(2)
                .build()
                .unwrap(),
        );
        let sched = Scheduler::with_pool(pool);
        let a = Handle::ready(5.0_f64);
        let b = sched.dataflow1(&a, |x| Ok(x * x));
        assert_eq!(*b.get().unwrap(), 25.0);
    }
}
