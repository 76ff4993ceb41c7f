use std::time::{Duration, Instant};

use anyhow::Result;
use thiserror::Error;
use tracing::{error, info};

pub mod diff;
pub mod extract;
pub mod fetch;
pub mod monitor;
pub mod notify;
pub mod state;
pub mod subprocess;
#[cfg(test)]
mod testing;
pub mod util;

use fetch::SearchPage;
use monitor::{Monitor, TargetMonitor};
use notify::Telegram;
use state::{MemoryStore, StateError};
use subprocess::SubprocessJob;
use util::FetchError;

/// Everything that can end a monitoring cycle early. None of it is fatal to
/// the polling loop.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("network error: {0}")]
    Network(#[from] FetchError),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("notification failed: {0}")]
    Send(FetchError),
    #[error("baseline store error: {0}")]
    State(#[from] StateError),
}

trait Runnable {
    async fn run(&mut self) -> Result<()>;
}

pub type LiveMonitor = Monitor<SearchPage, Telegram, MemoryStore>;
pub type LiveTargetMonitor = TargetMonitor<SearchPage, Telegram, MemoryStore>;

/// Define a job (by name) and the 'runner' type it wraps.
///
/// The runner must implement the `Runnable` trait.
macro_rules! define_jobs {
    ($(($jobname:ident, $runnable:ty)),+) => {
        pub enum JobRunner {
            $($jobname($runnable)),*
        }

        $(impl From<$runnable> for JobRunner {
            fn from(runner: $runnable) -> Self {
                JobRunner::$jobname(runner)
            }
        })*

        impl JobRunner {
            fn name(&self) -> &'static str {
                match self {
                    $(JobRunner::$jobname(_) => stringify!($jobname)),*
                }
            }

            async fn run(&mut self) -> Result<()> {
                match self {
                    $(JobRunner::$jobname(runner) => runner.run().await),*
                }
            }
        }
    };
}

define_jobs!(
    (Watch, LiveMonitor),
    (Target, LiveTargetMonitor),
    (Schedule, SubprocessJob)
);

/// Decides how long to wait after a failed run.
///
/// The delay is fixed: it does not grow with consecutive failures and
/// retries never stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        RetryPolicy { delay }
    }

    pub fn delay_after(&self, _consecutive_failures: u32) -> Duration {
        self.delay
    }
}

struct Job {
    last_ran: Option<Instant>,
    run_interval: Duration,
    wait: Duration,
    failures: u32,
    retry: RetryPolicy,
    job_runner: JobRunner,
}
impl Job {
    fn should_run(&self) -> bool {
        if let Some(time) = self.last_ran {
            return (Instant::now() - time) >= self.wait;
        }
        true
    }

    fn new(job_runner: JobRunner, interval: Duration, retry: RetryPolicy) -> Self {
        Job {
            last_ran: None,
            run_interval: interval,
            wait: interval,
            failures: 0,
            retry,
            job_runner,
        }
    }

    /// Runs the job and schedules the next run. The clock starts when the run
    /// ends, so the effective period is the interval plus the run time.
    async fn run(&mut self) {
        match self.job_runner.run().await {
            Ok(()) => {
                self.failures = 0;
                self.wait = self.run_interval;
            }
            Err(e) => {
                self.failures += 1;
                self.wait = self.retry.delay_after(self.failures);
                error!(
                    job = self.job_runner.name(),
                    failures = self.failures,
                    retry_in = ?self.wait,
                    "job failed: {e:#}"
                );
            }
        }
        self.last_ran = Some(Instant::now());
    }
}

#[derive(Default)]
pub struct Jobs {
    joblist: Vec<Job>,
}

impl Jobs {
    pub fn new() -> Self {
        Jobs::default()
    }

    /// Adds a job that runs every `interval` and retries after the same delay.
    pub fn add(self, job: impl Into<JobRunner>, interval: Duration) -> Self {
        self.add_with_retry(job, interval, RetryPolicy::fixed(interval))
    }

    pub fn add_with_retry(
        mut self,
        job: impl Into<JobRunner>,
        interval: Duration,
        retry: RetryPolicy,
    ) -> Self {
        self.joblist.push(Job::new(job.into(), interval, retry));
        self
    }

    /// Polls jobs in the defined order, running those that are due.
    /// A failing job is logged and rescheduled; it never stops the others.
    pub async fn poll(&mut self) {
        for job in &mut self.joblist {
            if job.should_run() {
                job.run().await;
            }
        }
    }

    /// Polls forever, checking for due jobs every `tick`.
    pub async fn run_forever(mut self, tick: Duration) {
        info!(jobs = self.joblist.len(), "job loop started");
        loop {
            self.poll().await;
            tokio::time::sleep(tick).await;
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> SubprocessJob {
        SubprocessJob::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn retry_delay_does_not_grow() {
        let policy = RetryPolicy::fixed(Duration::from_secs(60));
        assert_eq!(policy.delay_after(1), Duration::from_secs(60));
        assert_eq!(policy.delay_after(1_000), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn new_jobs_run_immediately_then_wait_for_their_interval() {
        let mut jobs = Jobs::new().add(shell("exit 0"), Duration::from_secs(3600));
        assert!(jobs.joblist[0].should_run());

        jobs.poll().await;

        let job = &jobs.joblist[0];
        assert!(job.last_ran.is_some());
        assert_eq!(job.failures, 0);
        assert!(!job.should_run());
    }

    #[tokio::test]
    async fn failing_job_is_rescheduled_with_the_retry_delay() {
        let mut jobs = Jobs::new()
            .add_with_retry(
                shell("exit 1"),
                Duration::from_secs(3600),
                RetryPolicy::fixed(Duration::ZERO),
            )
            .add(shell("exit 0"), Duration::from_secs(3600));

        jobs.poll().await;
        jobs.poll().await;

        assert_eq!(jobs.joblist[0].failures, 2);
        assert_eq!(jobs.joblist[0].wait, Duration::ZERO);
        assert!(jobs.joblist[0].should_run());
        assert_eq!(jobs.joblist[1].failures, 0);
        assert_eq!(jobs.joblist[1].job_runner.name(), "Schedule");
    }

    #[tokio::test]
    async fn success_resets_the_failure_count() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran-once");
        let script = format!(
            "if [ -e {0} ]; then exit 0; else touch {0}; exit 1; fi",
            marker.display()
        );
        let mut jobs = Jobs::new().add_with_retry(
            shell(&script),
            Duration::from_secs(3600),
            RetryPolicy::fixed(Duration::ZERO),
        );

        jobs.poll().await;
        assert_eq!(jobs.joblist[0].failures, 1);

        jobs.poll().await;
        assert_eq!(jobs.joblist[0].failures, 0);
        assert_eq!(jobs.joblist[0].wait, Duration::from_secs(3600));
    }
}
