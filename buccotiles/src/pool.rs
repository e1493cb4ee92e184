//! Bounded worker pool for subprocess-bound stages.
//!
//! Each job mostly waits on a child process, so a plain rayon pool of
//! `workers` threads bounds how many tools run at once. Results come back in
//! submission order regardless of completion order.

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{info, warn};

/// Worker count used when the CPU count cannot be detected.
pub const FALLBACK_WORKERS: usize = 4;

/// Number of workers to use: the override if given, else the CPU count.
pub fn worker_count(requested: Option<usize>) -> usize {
    requested.filter(|&n| n > 0).unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(FALLBACK_WORKERS)
    })
}

/// Run `job` over every item on a pool of `workers` threads.
///
/// The returned vector lines up with `items`.
pub fn run_ordered<T, R, F>(items: Vec<T>, workers: usize, job: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Send + Sync,
{
    let workers = workers.max(1);
    info!("Using {} workers.", workers);

    match ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(|| items.into_par_iter().map(&job).collect()),
        Err(e) => {
            warn!(error = %e, "failed to build worker pool, running sequentially");
            items.into_iter().map(job).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_worker_count_override() {
        assert_eq!(worker_count(Some(3)), 3);
        assert!(worker_count(None) >= 1);
        assert_eq!(worker_count(Some(0)), worker_count(None));
    }

    #[test]
    fn test_results_follow_submission_order() {
        // Earlier items sleep longer, so they finish last.
        let items: Vec<u64> = (0..8).collect();
        let results = run_ordered(items, 4, |i| {
            std::thread::sleep(Duration::from_millis((8 - i) * 5));
            i * 10
        });
        assert_eq!(results, vec![0, 10, 20, 30, 40, 50, 60, 70]);
    }

    #[test]
    fn test_empty_input() {
        let results: Vec<u8> = run_ordered(Vec::<u8>::new(), 2, |i| i);
        assert!(results.is_empty());
    }
}
