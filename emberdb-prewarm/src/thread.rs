use std::thread::{self, Scope, ScopedJoinHandle};
use tracing::debug;

/// Spawn a named worker inside `scope`, logging start and finish.
/// The scope joins the worker before it exits.
#[inline]
pub fn spawn_scoped_named<'scope, 'env, S, F>(
    scope: &'scope Scope<'scope, 'env>,
    name: S,
    f: F,
) -> ScopedJoinHandle<'scope, ()>
where
    String: From<S>,
    F: FnOnce() + Send + 'scope,
{
    let thread_name = String::from(name);
    thread::Builder::new()
        .name(thread_name)
        .spawn_scoped(scope, || {
            let thd = thread::current();
            debug!(name = thd.name().unwrap_or("unknown"), "thread started");
            f();
            let thd = thread::current();
            debug!(name = thd.name().unwrap_or("unknown"), "thread finished");
        })
        .unwrap()
}

pub type Task<'a> = Box<dyn FnOnce() + Send + 'a>;

/// Fixed-width task executor.
///
/// Tasks are queued up front and drained by at most `thread_count`
/// worker threads. `run` returns only after every task has finished.
pub struct TaskExecutor {
    thread_count: usize,
}

impl TaskExecutor {
    #[inline]
    pub fn new(thread_count: usize) -> Self {
        TaskExecutor {
            thread_count: thread_count.max(1),
        }
    }

    /// Run all tasks and wait for completion.
    pub fn run<'env>(&self, tasks: Vec<Task<'env>>) {
        if tasks.is_empty() {
            return;
        }
        if self.thread_count == 1 || tasks.len() == 1 {
            for task in tasks {
                task();
            }
            return;
        }
        let workers = self.thread_count.min(tasks.len());
        let (tx, rx) = flume::unbounded::<Task<'env>>();
        for task in tasks {
            // receiver is alive, send cannot fail
            let _ = tx.send(task);
        }
        drop(tx);
        thread::scope(|s| {
            for worker_id in 0..workers {
                let rx = rx.clone();
                spawn_scoped_named(s, format!("prewarm-worker-{worker_id}"), move || {
                    while let Ok(task) = rx.recv() {
                        task();
                    }
                });
            }
        });
    }
}

/// Default worker width when the configuration leaves it unset.
#[inline]
pub fn default_thread_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_executor_runs_all_tasks() {
        let counter = AtomicUsize::new(0);
        let executor = TaskExecutor::new(4);
        let tasks: Vec<Task<'_>> = (0..100)
            .map(|_| {
                let counter = &counter;
                Box::new(move || {
                    counter.fetch_add(1, Ordering::AcqRel);
                }) as Task<'_>
            })
            .collect();
        executor.run(tasks);
        assert_eq!(counter.load(Ordering::Acquire), 100);
    }

    #[test]
    fn test_executor_single_thread_inline() {
        let counter = AtomicUsize::new(0);
        let executor = TaskExecutor::new(1);
        let tasks: Vec<Task<'_>> = (0..10)
            .map(|_| {
                let counter = &counter;
                Box::new(move || {
                    counter.fetch_add(1, Ordering::AcqRel);
                }) as Task<'_>
            })
            .collect();
        executor.run(tasks);
        assert_eq!(counter.load(Ordering::Acquire), 10);
    }

    #[test]
    fn test_spawn_scoped_named_runs_to_completion() {
        let counter = AtomicUsize::new(0);
        thread::scope(|s| {
            spawn_scoped_named(s, "prewarm-test", || {
                counter.fetch_add(1, Ordering::AcqRel);
            });
        });
        assert_eq!(counter.load(Ordering::Acquire), 1);
    }
}
