//! Bounded worker pool for the parallel stages.

use std::collections::HashMap;
use std::path::PathBuf;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::Result;
use crate::matrix::Blueprint;
use crate::utils::cpu_affinity::core_count;

/// Worker count: the caller cap, or the number of online cores.
pub fn worker_count(jobs: Option<usize>) -> usize {
    jobs.filter(|&n| n > 0).or_else(core_count).unwrap_or(1)
}

pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    pub fn new(jobs: Option<usize>) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_count(jobs))
            .thread_name(|i| format!("mutabench-worker-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    pub fn size(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `task` on every blueprint and key the results by binary path.
    /// Returns once every task has finished.
    pub fn map<T, F>(&self, blueprints: &[&Blueprint], task: F) -> HashMap<PathBuf, T>
    where
        T: Send,
        F: Fn(&Blueprint) -> T + Send + Sync,
    {
        self.pool.install(|| {
            blueprints
                .par_iter()
                .map(|blueprint| (blueprint.binary.clone(), task(*blueprint)))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn blueprint(name: &str) -> Blueprint {
        Blueprint {
            source_original: PathBuf::from("a.c"),
            original_binary: PathBuf::from(name),
            kernel: "k".to_string(),
            mutation: None,
            source: PathBuf::from("a.c"),
            compiler: "cc".to_string(),
            compile_command: "cc".to_string(),
            binary: PathBuf::from(name),
            profile_report: PathBuf::from(format!("{name}.profile")),
            sim_report: PathBuf::from(format!("{name}.sim")),
            sensitivity_report: PathBuf::from(format!("{name}.sim-sensitivity")),
        }
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(worker_count(Some(3)), 3);
        assert!(worker_count(None) >= 1);
        assert!(worker_count(Some(0)) >= 1, "zero falls back to the hardware");
    }

    #[test]
    fn test_map_runs_every_task_once() {
        let pool = WorkerPool::new(Some(2)).unwrap();
        assert_eq!(pool.size(), 2);

        let owned: Vec<Blueprint> = (0..20).map(|i| blueprint(&format!("b{i}"))).collect();
        let refs: Vec<&Blueprint> = owned.iter().collect();
        let calls = AtomicUsize::new(0);
        let results = pool.map(&refs, |b| {
            calls.fetch_add(1, Ordering::SeqCst);
            b.name().len()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 20);
        assert_eq!(results.len(), 20);
        assert_eq!(results[&PathBuf::from("b13")], 3);
    }
}
