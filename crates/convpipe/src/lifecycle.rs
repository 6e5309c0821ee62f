//! Lifecycle coordinator: wires queues, consumers and the reporter around a
//! repository set, owns the cancellation signal, and waits for every task.
//!
//! # Shutdown paths
//!
//! - **Producer done**: the producer closes its queues, consumers drain and
//!   stop, the reporter does its final poll and stops.
//! - **Cancelled**: an OS signal, the run deadline or an explicit trigger
//!   fires the shared signal; consumers stop at once and discard what is
//!   still queued, the reporter stops without a final poll.
//!
//! Either way [`Coordinator::wait`] returns only after all tasks ended, then
//! closes the repositories.

use std::io::Write;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use convpipe_core::{ConversionLog, ConversionRequest, ConversionResponse, RecordKind};
use convpipe_store::RepositorySet;

use crate::config::PipelineConfig;
use crate::consumer::{spawn_consumer, ConsumerReport};
use crate::error::{PipelineError, Result};
use crate::producer::{ExampleProducer, ProducerReport};
use crate::queue::{bounded, QueueSender, QueueStatus};
use crate::reporter::{CursorReporter, ReporterReport};
use crate::shutdown::Shutdown;

/// Producer-side handles for the three queues.
pub struct Ingress {
    pub requests: QueueSender<ConversionRequest>,
    pub responses: QueueSender<ConversionResponse>,
    pub logs: QueueSender<ConversionLog>,
}

impl Ingress {
    /// Close all three queues.
    pub fn close(self) {
        self.requests.close();
        self.responses.close();
        self.logs.close();
    }

    pub fn statuses(&self) -> Vec<QueueStatus> {
        vec![
            self.requests.status(),
            self.responses.status(),
            self.logs.status(),
        ]
    }
}

/// Aggregate outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub requests: ConsumerReport,
    pub responses: ConsumerReport,
    pub logs: ConsumerReport,
    pub reporter: ReporterReport,
    /// Present when the producer was started through the coordinator.
    pub producer: Option<ProducerReport>,
    /// Whether the run ended through cancellation.
    pub cancelled: bool,
}

impl PipelineReport {
    pub fn consumer(&self, kind: RecordKind) -> &ConsumerReport {
        match kind {
            RecordKind::Request => &self.requests,
            RecordKind::Response => &self.responses,
            RecordKind::Log => &self.logs,
        }
    }

    pub fn stored(&self) -> usize {
        self.requests.stored + self.responses.stored + self.logs.stored
    }
}

/// Running pipeline.
pub struct Coordinator {
    shutdown: Shutdown,
    repos: RepositorySet,
    requests: JoinHandle<ConsumerReport>,
    responses: JoinHandle<ConsumerReport>,
    logs: JoinHandle<ConsumerReport>,
    reporter: JoinHandle<ReporterReport>,
    producer: Option<JoinHandle<Result<ProducerReport>>>,
    /// Signal and deadline watchers; aborted once the pipeline stops.
    watchers: Vec<JoinHandle<()>>,
}

impl Coordinator {
    /// Create the queues and start the consumers and the reporter.
    ///
    /// Must be called inside a Tokio runtime. Returns the producer-side
    /// queue handles; closing them lets the pipeline finish.
    pub fn start(
        config: &PipelineConfig,
        repos: RepositorySet,
        out: Box<dyn Write + Send>,
    ) -> Result<(Self, Ingress)> {
        config.validate()?;
        let shutdown = Shutdown::new();

        let (req_tx, req_rx) = bounded(RecordKind::Request, config.queue_capacity);
        let (resp_tx, resp_rx) = bounded(RecordKind::Response, config.queue_capacity);
        let (log_tx, log_rx) = bounded(RecordKind::Log, config.queue_capacity);
        let ingress = Ingress {
            requests: req_tx,
            responses: resp_tx,
            logs: log_tx,
        };

        let requests = spawn_consumer(req_rx, repos.requests.clone(), shutdown.subscribe());
        let responses = spawn_consumer(resp_rx, repos.responses.clone(), shutdown.subscribe());
        let logs = spawn_consumer(log_rx, repos.logs.clone(), shutdown.subscribe());

        let reporter = CursorReporter::new(
            repos.clone(),
            ingress.statuses(),
            config.poll_interval,
            config.drain_grace,
            out,
        )
        .spawn(shutdown.subscribe());

        let mut coordinator = Self {
            shutdown,
            repos,
            requests,
            responses,
            logs,
            reporter,
            producer: None,
            watchers: Vec::new(),
        };
        if let Some(timeout) = config.run_timeout {
            coordinator.watch_deadline(timeout);
        }

        info!(capacity = config.queue_capacity, "pipeline started");
        Ok((coordinator, ingress))
    }

    /// Handle for triggering cancellation from outside.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run the example producer as a tracked task.
    pub fn spawn_producer(&mut self, ingress: Ingress, producer: ExampleProducer) {
        let listener = self.shutdown.subscribe();
        self.track_producer(tokio::spawn(producer.run(ingress, listener)));
    }

    fn track_producer(&mut self, handle: JoinHandle<Result<ProducerReport>>) {
        self.producer = Some(handle);
    }

    /// Trigger cancellation when SIGINT or SIGTERM arrives (Ctrl+C
    /// elsewhere).
    pub fn watch_signals(&mut self) -> Result<()> {
        let shutdown = self.shutdown.clone();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;

            self.watchers.push(tokio::spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => shutdown.trigger("received SIGTERM"),
                    _ = sigint.recv() => shutdown.trigger("received SIGINT"),
                }
            }));
        }

        #[cfg(not(unix))]
        {
            self.watchers.push(tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    shutdown.trigger("received Ctrl+C");
                }
            }));
        }

        Ok(())
    }

    fn watch_deadline(&mut self, timeout: Duration) {
        let shutdown = self.shutdown.clone();
        let mut listener = shutdown.subscribe();
        self.watchers.push(tokio::spawn(async move {
            tokio::select! {
                _ = listener.recv() => {}
                _ = tokio::time::sleep(timeout) => shutdown.trigger("run timeout elapsed"),
            }
        }));
    }

    /// Wait for every consumer, the reporter and the producer (if any),
    /// then close the repositories.
    pub async fn wait(self) -> Result<PipelineReport> {
        let (requests, responses, logs, reporter) =
            tokio::join!(self.requests, self.responses, self.logs, self.reporter);

        let producer = match self.producer {
            Some(handle) => Some(handle.await.map_err(join_error).and_then(|run| run)),
            None => None,
        };

        for watcher in &self.watchers {
            watcher.abort();
        }

        // Repositories are closed even when a task failed.
        let closed = self.repos.close().await;

        let report = PipelineReport {
            requests: requests.map_err(join_error)?,
            responses: responses.map_err(join_error)?,
            logs: logs.map_err(join_error)?,
            reporter: reporter.map_err(join_error)?,
            producer: producer.transpose()?,
            cancelled: self.shutdown.is_triggered(),
        };
        closed?;

        info!(
            stored = report.stored(),
            reported = report.reporter.total(),
            cancelled = report.cancelled,
            "pipeline stopped"
        );
        Ok(report)
    }
}

fn join_error(e: tokio::task::JoinError) -> PipelineError {
    PipelineError::Task(e.to_string())
}
