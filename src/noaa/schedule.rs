use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Shared stop flag checked between units of work.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The raw flag, for registering with signal handlers.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Sleeps up to `duration`; returns `false` early if cancelled meanwhile.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// A job fired at a fixed interval. Overlap handling is the job's own business.
pub struct PeriodicJob {
    pub name: &'static str,
    pub interval: Duration,
    pub run: Arc<dyn Fn(&CancellationToken) + Send + Sync>,
}

struct JobTimer {
    job: PeriodicJob,
    next_due: Instant,
    workers: Vec<JoinHandle<()>>,
}

impl JobTimer {
    fn fire(&mut self, cancel: &CancellationToken) {
        self.workers.retain(|worker| !worker.is_finished());
        let run = Arc::clone(&self.job.run);
        let cancel = cancel.clone();
        let name = self.job.name;
        let spawned = thread::Builder::new()
            .name(format!("{name}-worker"))
            .spawn(move || run(&cancel));
        match spawned {
            Ok(handle) => self.workers.push(handle),
            Err(err) => tracing::error!(job = name, "failed to spawn worker: {err}"),
        }
    }
}

/// Fires every job immediately and then once per interval until `cancel` is set,
/// then joins in-flight workers.
pub fn run_periodic(jobs: Vec<PeriodicJob>, cancel: &CancellationToken) {
    let start = Instant::now();
    let mut timers = jobs
        .into_iter()
        .map(|job| JobTimer {
            job,
            next_due: start,
            workers: Vec::new(),
        })
        .collect::<Vec<_>>();

    while !cancel.is_cancelled() {
        let now = Instant::now();
        for timer in timers.iter_mut() {
            if timer.next_due <= now {
                timer.fire(cancel);
                // Missed ticks are skipped rather than replayed.
                while timer.next_due <= now {
                    timer.next_due += timer.job.interval;
                }
            }
        }

        let Some(next) = timers.iter().map(|timer| timer.next_due).min() else {
            break;
        };
        cancel.sleep(next.saturating_duration_since(Instant::now()));
    }

    for timer in timers {
        for worker in timer.workers {
            if worker.join().is_err() {
                tracing::error!(job = timer.job.name, "worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn sleep_returns_early_when_cancelled() {
        let cancel = CancellationToken::new();
        let remote = cancel.clone();
        let started = Instant::now();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });
        assert!(!cancel.sleep(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().expect("join");
    }

    #[test]
    fn jobs_fire_on_start_then_per_interval_and_stop_on_cancel() {
        let cancel = CancellationToken::new();
        let fast = Arc::new(AtomicUsize::new(0));
        let slow = Arc::new(AtomicUsize::new(0));

        let jobs = vec![
            PeriodicJob {
                name: "fast",
                interval: Duration::from_millis(40),
                run: {
                    let fast = Arc::clone(&fast);
                    Arc::new(move |_: &CancellationToken| {
                        fast.fetch_add(1, Ordering::SeqCst);
                    })
                },
            },
            PeriodicJob {
                name: "slow",
                interval: Duration::from_secs(3600),
                run: {
                    let slow = Arc::clone(&slow);
                    Arc::new(move |_: &CancellationToken| {
                        slow.fetch_add(1, Ordering::SeqCst);
                    })
                },
            },
        ];

        let stopper = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            stopper.cancel();
        });
        run_periodic(jobs, &cancel);
        handle.join().expect("join");

        assert_eq!(slow.load(Ordering::SeqCst), 1);
        assert!(fast.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn overlapping_triggers_are_dropped_by_the_job_guard() {
        let cancel = CancellationToken::new();
        let guard = Arc::new(Mutex::new(()));
        let ran = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicUsize::new(0));

        let job = PeriodicJob {
            name: "slow-body",
            interval: Duration::from_millis(20),
            run: {
                let guard = Arc::clone(&guard);
                let ran = Arc::clone(&ran);
                let dropped = Arc::clone(&dropped);
                Arc::new(move |_: &CancellationToken| {
                    let Ok(_held) = guard.try_lock() else {
                        dropped.fetch_add(1, Ordering::SeqCst);
                        return;
                    };
                    ran.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(250));
                })
            },
        };

        let stopper = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            stopper.cancel();
        });
        run_periodic(vec![job], &cancel);
        handle.join().expect("join");

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(dropped.load(Ordering::SeqCst) >= 1);
    }
}
