//! Fixed pool of worker threads with a ready barrier.

use crate::dfs::Worker;
use crate::error::McResult;
use crate::report::WorkerStats;
use std::sync::Barrier;
use std::thread;
use tracing::{debug, info_span};

/// Adapter turning a closure into a [`Worker`].
pub struct FnWorker<F>(pub F);

impl<F: FnOnce() -> McResult<WorkerStats>> Worker for FnWorker<F> {
    fn run(self) -> McResult<WorkerStats> {
        (self.0)()
    }
}

/// Build one worker per thread, start them together once every worker is
/// built, join them all and return their statistics ordered by `tid`.
///
/// The first error reported by a worker wins; a panicking worker is
/// re-raised on the calling thread after every other worker has joined.
pub fn run_workers<W, F>(workers: usize, make: F) -> McResult<Vec<WorkerStats>>
where
    W: Worker,
    F: Fn(usize) -> W + Sync,
{
    let barrier = Barrier::new(workers);
    let results: Vec<thread::Result<McResult<WorkerStats>>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|tid| {
                let barrier = &barrier;
                let make = &make;
                scope.spawn(move || {
                    let span = info_span!("worker", tid);
                    let _guard = span.enter();
                    let worker = make(tid);
                    barrier.wait();
                    debug!("worker started");
                    worker.run()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });

    let mut stats = Vec::with_capacity(workers);
    let mut first_error = None;
    for result in results {
        match result {
            Ok(Ok(s)) => stats.push(s),
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }
    stats.sort_by_key(|s| s.tid);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::McError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_every_worker_runs_once() {
        let ran = AtomicUsize::new(0);
        let stats = run_workers(4, |tid| {
            let ran = &ran;
            FnWorker(move || {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(WorkerStats::new(tid))
            })
        })
        .unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 4);
        let tids: Vec<_> = stats.iter().map(|s| s.tid).collect();
        assert_eq!(tids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_error_is_reported() {
        let result = run_workers(3, |tid| {
            FnWorker(move || {
                if tid == 1 {
                    Err(McError::MemoryExhausted { requested: 7 })
                } else {
                    Ok(WorkerStats::new(tid))
                }
            })
        });
        assert!(matches!(result, Err(McError::MemoryExhausted { requested: 7 })));
    }
}
