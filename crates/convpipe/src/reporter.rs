//! Cursor reporter: periodically prints records added since the last poll.
//!
//! Each tick asks every repository for its new records and writes a heading
//! plus one indented line per record. The reporter stops when cancellation
//! fires, or once every queue is closed: it then waits (bounded by the
//! drain grace) for the consumers to empty their queues and does one last
//! poll so the final batch is not lost.

use std::io::Write;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use convpipe_core::{Record, RecordKind};
use convpipe_store::{Repository, RepositorySet};

use crate::queue::QueueStatus;
use crate::shutdown::ShutdownListener;

/// Why the reporter stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterExit {
    /// Cancellation fired.
    Cancelled,
    /// Every queue closed and drained; the final poll ran.
    Drained,
    /// Every queue closed but consumers did not finish within the grace
    /// period; the final poll ran anyway.
    GraceElapsed,
}

/// Outcome of one reporter run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReporterReport {
    pub ticks: u64,
    pub requests: usize,
    pub responses: usize,
    pub logs: usize,
    pub exit: ReporterExit,
}

impl ReporterReport {
    pub fn emitted(&self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::Request => self.requests,
            RecordKind::Response => self.responses,
            RecordKind::Log => self.logs,
        }
    }

    pub fn total(&self) -> usize {
        self.requests + self.responses + self.logs
    }
}

/// Polls the repositories and writes what is new.
pub struct CursorReporter {
    repos: RepositorySet,
    queues: Vec<QueueStatus>,
    poll_interval: Duration,
    drain_grace: Duration,
    out: Box<dyn Write + Send>,
    ticks: u64,
    emitted: [usize; 3],
}

impl CursorReporter {
    pub fn new(
        repos: RepositorySet,
        queues: Vec<QueueStatus>,
        poll_interval: Duration,
        drain_grace: Duration,
        out: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            repos,
            queues,
            poll_interval,
            drain_grace,
            out,
            ticks: 0,
            emitted: [0; 3],
        }
    }

    pub fn spawn(self, shutdown: ShutdownListener) -> JoinHandle<ReporterReport> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(mut self, mut shutdown: ShutdownListener) -> ReporterReport {
        let mut timer = interval(self.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break ReporterExit::Cancelled,
                _ = timer.tick() => {
                    self.poll().await;
                    if self.all_closed() {
                        break self.final_drain(&mut shutdown).await;
                    }
                }
            }
        };

        info!(
            ticks = self.ticks,
            emitted = self.emitted.iter().sum::<usize>(),
            ?exit,
            "reporter stopped"
        );
        ReporterReport {
            ticks: self.ticks,
            requests: self.emitted[0],
            responses: self.emitted[1],
            logs: self.emitted[2],
            exit,
        }
    }

    fn all_closed(&self) -> bool {
        self.queues.iter().all(|q| !q.is_open())
    }

    fn all_drained(&self) -> bool {
        self.queues.iter().all(|q| q.is_drained())
    }

    async fn final_drain(&mut self, shutdown: &mut ShutdownListener) -> ReporterExit {
        debug!("all queues closed, waiting for consumers to drain");
        let deadline = Instant::now() + self.drain_grace;

        let exit = loop {
            if self.all_drained() {
                break ReporterExit::Drained;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(grace = ?self.drain_grace, "consumers did not drain in time");
                break ReporterExit::GraceElapsed;
            }
            let step = self.poll_interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = shutdown.recv() => return ReporterExit::Cancelled,
                _ = sleep(step) => self.poll().await,
            }
        };

        self.poll().await;
        exit
    }

    /// One pass over all three repositories.
    pub async fn poll(&mut self) {
        self.ticks += 1;
        let repos = self.repos.clone();
        self.emitted[0] += self.emit(repos.requests.as_ref()).await;
        self.emitted[1] += self.emit(repos.responses.as_ref()).await;
        self.emitted[2] += self.emit(repos.logs.as_ref()).await;
    }

    async fn emit<T: Record>(&mut self, repo: &dyn Repository<T>) -> usize {
        let fresh = match repo.get_new_since_cursor().await {
            Ok(fresh) => fresh,
            Err(e) => {
                error!(kind = %T::KIND, error = %e, "failed to read new records");
                return 0;
            }
        };
        if fresh.is_empty() {
            return 0;
        }

        if let Err(e) = write_batch(&mut self.out, T::KIND, &fresh) {
            error!(kind = %T::KIND, error = %e, "failed to write report");
        }
        fresh.len()
    }
}

fn write_batch<T: Record>(
    out: &mut dyn Write,
    kind: RecordKind,
    records: &[T],
) -> std::io::Result<()> {
    writeln!(out, "{}", kind.heading())?;
    for record in records {
        writeln!(out, "  {}", record)?;
    }
    out.flush()
}
