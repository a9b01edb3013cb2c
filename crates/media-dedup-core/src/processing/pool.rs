//! Bounded hashing pool.
//!
//! One producer thread feeds discovered files into a bounded queue, a fixed
//! set of workers hash them in parallel, and the calling thread drains the
//! results. Results are tagged with the producer's discovery sequence
//! number and released to the sink strictly in that order, so the writer
//! sees the same ordering a sequential walk would produce regardless of
//! which worker finishes first.
//!
//! The producer takes a permit before handing out each job and the drainer
//! returns it once the result reaches the sink. At most [`HashPool::window`]
//! jobs are in flight, so one slow file holds back a bounded number of
//! finished results.

use crossbeam::channel::bounded;
use std::collections::BTreeMap;
use std::io;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use super::digest::compute_digest;
use crate::types::HashEntry;

/// A file waiting to be hashed
#[derive(Debug, Clone)]
pub struct HashJob {
    pub path: PathBuf,
    /// Path as it will be recorded in the store
    pub recorded: String,
}

/// Result of hashing one job
#[derive(Debug)]
pub enum HashOutcome {
    Hashed(HashEntry),
    Skipped { path: PathBuf, error: io::Error },
}

struct Completed {
    seq: u64,
    outcome: HashOutcome,
}

/// Configuration of the worker pool
#[derive(Debug, Clone, Copy)]
pub struct HashPool {
    threads: usize,
    queue_depth: usize,
    buffer_size: usize,
}

impl HashPool {
    pub fn new(threads: usize, queue_depth: usize, buffer_size: usize) -> Self {
        Self {
            threads: threads.max(1),
            queue_depth: queue_depth.max(1),
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Most jobs handed out but not yet delivered to the sink
    pub fn window(&self) -> usize {
        self.queue_depth + self.threads
    }

    /// Hash every job from `jobs` and hand outcomes to `sink` in discovery
    /// order. Returning `ControlFlow::Break` from the sink stops the
    /// producer and the workers; outcomes not yet delivered are dropped.
    ///
    /// `jobs` is consumed on the producer thread.
    pub fn run<I, F>(&self, jobs: I, sink: F)
    where
        I: IntoIterator<Item = HashJob>,
        I::IntoIter: Send,
        F: FnMut(HashOutcome) -> ControlFlow<()>,
    {
        let buffer_size = self.buffer_size;
        self.run_with(jobs, |job| hash_job(job, buffer_size), sink);
    }

    fn run_with<I, H, F>(&self, jobs: I, hash: H, mut sink: F)
    where
        I: IntoIterator<Item = HashJob>,
        I::IntoIter: Send,
        H: Fn(HashJob) -> HashOutcome + Sync,
        F: FnMut(HashOutcome) -> ControlFlow<()>,
    {
        let window = self.window();
        let (job_tx, job_rx) = bounded::<(u64, HashJob)>(self.queue_depth);
        let (done_tx, done_rx) = bounded::<Completed>(window);
        let (permit_tx, permit_rx) = bounded::<()>(window);
        for _ in 0..window {
            // Capacity equals the number of permits
            let _ = permit_tx.send(());
        }
        let stop = AtomicBool::new(false);
        let mut jobs = jobs.into_iter();

        thread::scope(|scope| {
            let stop = &stop;
            let hash = &hash;

            scope.spawn(move || {
                let mut seq = 0u64;
                // Fails once the drainer has gone away
                while permit_rx.recv().is_ok() {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    let Some(job) = jobs.next() else {
                        break;
                    };
                    if job_tx.send((seq, job)).is_err() {
                        break;
                    }
                    seq += 1;
                }
                // Dropping the sender closes the queue for the workers
            });

            for _ in 0..self.threads {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for (seq, job) in job_rx.iter() {
                        if stop.load(Ordering::Relaxed) {
                            break;
                        }
                        let outcome = hash(job);
                        if done_tx.send(Completed { seq, outcome }).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(done_tx);

            let mut pending: BTreeMap<u64, HashOutcome> = BTreeMap::new();
            let mut next = 0u64;
            'drain: for completed in done_rx.iter() {
                pending.insert(completed.seq, completed.outcome);
                while let Some(outcome) = pending.remove(&next) {
                    next += 1;
                    if sink(outcome).is_break() {
                        stop.store(true, Ordering::Relaxed);
                        break 'drain;
                    }
                    let _ = permit_tx.send(());
                }
            }
            // Unblocks the producer and any worker still waiting to deliver
            drop(permit_tx);
            drop(done_rx);
        });
    }
}

fn hash_job(job: HashJob, buffer_size: usize) -> HashOutcome {
    match compute_digest(&job.path, buffer_size) {
        Ok(digest) => HashOutcome::Hashed(HashEntry::new(digest, job.recorded)),
        Err(error) => HashOutcome::Skipped {
            path: job.path,
            error,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn jobs_for(dir: &std::path::Path, count: usize) -> Vec<HashJob> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("file_{:03}.bin", i));
                // Vary sizes so workers finish out of order
                fs::write(&path, vec![i as u8; (count - i) * 512]).unwrap();
                HashJob {
                    recorded: path.to_string_lossy().into_owned(),
                    path,
                }
            })
            .collect()
    }

    #[test]
    fn test_outcomes_arrive_in_discovery_order() {
        let dir = tempdir().unwrap();
        let jobs = jobs_for(dir.path(), 40);
        let expected: Vec<String> = jobs.iter().map(|j| j.recorded.clone()).collect();

        let mut seen = Vec::new();
        HashPool::new(4, 2, 64).run(jobs, |outcome| {
            if let HashOutcome::Hashed(entry) = outcome {
                seen.push(entry.path);
            }
            ControlFlow::Continue(())
        });

        assert_eq!(seen, expected);
    }

    #[test]
    fn test_break_stops_delivery() {
        let dir = tempdir().unwrap();
        let jobs = jobs_for(dir.path(), 30);

        let mut delivered = 0;
        HashPool::new(3, 1, 64).run(jobs, |_| {
            delivered += 1;
            if delivered == 5 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        assert_eq!(delivered, 5);
    }

    #[test]
    fn test_unreadable_file_is_skipped_in_order() {
        let dir = tempdir().unwrap();
        let mut jobs = jobs_for(dir.path(), 3);
        let missing = dir.path().join("vanished.bin");
        jobs.insert(
            1,
            HashJob {
                recorded: missing.to_string_lossy().into_owned(),
                path: missing.clone(),
            },
        );

        let mut kinds = Vec::new();
        HashPool::new(2, 4, 64).run(jobs, |outcome| {
            kinds.push(match outcome {
                HashOutcome::Hashed(_) => "hashed",
                HashOutcome::Skipped { .. } => "skipped",
            });
            ControlFlow::Continue(())
        });

        assert_eq!(kinds, vec!["hashed", "skipped", "hashed", "hashed"]);
    }

    #[test]
    fn test_slow_first_job_bounds_work_in_flight() {
        use std::sync::atomic::AtomicUsize;
        use std::time::Duration;

        let pool = HashPool::new(4, 2, 64);
        let handed_out = AtomicUsize::new(0);
        let seen_while_blocked = AtomicUsize::new(0);
        let jobs = (0..200).map(|i| {
            handed_out.fetch_add(1, Ordering::SeqCst);
            HashJob {
                path: PathBuf::from(format!("/virtual/{i}")),
                recorded: format!("/virtual/{i}"),
            }
        });

        let mut delivered = 0;
        pool.run_with(
            jobs,
            |job| {
                if job.recorded == "/virtual/0" {
                    thread::sleep(Duration::from_millis(300));
                    seen_while_blocked.store(handed_out.load(Ordering::SeqCst), Ordering::SeqCst);
                }
                HashOutcome::Skipped {
                    path: job.path,
                    error: io::Error::from(io::ErrorKind::NotFound),
                }
            },
            |_| {
                delivered += 1;
                ControlFlow::Continue(())
            },
        );

        assert_eq!(delivered, 200);
        assert!(seen_while_blocked.load(Ordering::SeqCst) <= pool.window());
    }
}
