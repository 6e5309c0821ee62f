//! Example producer feeding the pipeline when no real client is attached.
//!
//! Each iteration emits one request, its response and a log pairing the
//! two by value, then pauses. When done (or cancelled) it closes all three
//! queues.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use convpipe_core::{validate_request, ConversionLog, ConversionRequest, ConversionResponse, Info};

use crate::error::Result;
use crate::lifecycle::Ingress;
use crate::shutdown::ShutdownListener;

/// Rate used for the example responses.
pub const EXAMPLE_QUOTE: f64 = 0.9134;

/// One iteration's worth of records.
#[derive(Debug, Clone, PartialEq)]
pub struct ExampleBatch {
    pub request: ConversionRequest,
    pub response: ConversionResponse,
    pub log: ConversionLog,
}

/// Build the records for iteration `i` (zero-based).
///
/// USD→EUR for `105 × (i + 1)`; even iterations succeed, odd ones fail.
pub fn example_batch(i: usize, now: DateTime<Utc>) -> Result<ExampleBatch> {
    let request = ConversionRequest::new("USD", "EUR", 105.0 * (i as f64 + 1.0));
    validate_request(&request)?;

    let info = Info {
        timestamp: now.timestamp(),
        quote: EXAMPLE_QUOTE,
    };
    let response = if i % 2 == 0 {
        ConversionResponse::success(request.clone(), info)
    } else {
        ConversionResponse::failure(request.clone(), info)
    };
    let log = ConversionLog::at(now, request.clone(), response.clone());

    Ok(ExampleBatch {
        request,
        response,
        log,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerConfig {
    pub iterations: usize,
    /// Pause between iterations.
    pub pause: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            iterations: 5,
            pause: Duration::from_millis(500),
        }
    }
}

/// Outcome of one producer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerReport {
    /// Iterations whose three records were all enqueued.
    pub batches: usize,
    /// Every configured iteration ran.
    pub completed: bool,
}

pub struct ExampleProducer {
    config: ProducerConfig,
}

impl ExampleProducer {
    pub fn new(config: ProducerConfig) -> Self {
        Self { config }
    }

    /// Enqueue the example batches, then close the queues.
    ///
    /// Stops early on cancellation or when a consumer has gone away.
    pub async fn run(
        self,
        ingress: Ingress,
        mut shutdown: ShutdownListener,
    ) -> Result<ProducerReport> {
        let mut batches = 0;

        for i in 0..self.config.iterations {
            if shutdown.is_triggered() {
                break;
            }

            let batch = example_batch(i, Utc::now())?;
            let sent = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                sent = send_batch(&ingress, batch) => sent,
            };
            if let Err(e) = sent {
                warn!(iteration = i, error = %e, "producer stopping early");
                break;
            }
            batches += 1;
            debug!(iteration = i, "example batch enqueued");

            if i + 1 < self.config.iterations {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(self.config.pause) => {}
                }
            }
        }

        ingress.close();
        let completed = batches == self.config.iterations;
        info!(batches, completed, "producer finished, queues closed");
        Ok(ProducerReport { batches, completed })
    }
}

async fn send_batch(ingress: &Ingress, batch: ExampleBatch) -> Result<()> {
    ingress.requests.send(batch.request).await?;
    ingress.responses.send(batch.response).await?;
    ingress.logs.send(batch.log).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_example_batch_values() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let first = example_batch(0, now).unwrap();
        assert_eq!(first.request.from, "USD");
        assert_eq!(first.request.to, "EUR");
        assert_eq!(first.request.amount, 105.0);
        assert!(first.response.success);
        assert!((first.response.result - 105.0 * EXAMPLE_QUOTE).abs() < 1e-9);
        assert_eq!(first.response.info.timestamp, now.timestamp());
        assert_eq!(first.log.request, first.request);
        assert_eq!(first.log.response, first.response);

        let second = example_batch(1, now).unwrap();
        assert_eq!(second.request.amount, 210.0);
        assert!(!second.response.success);
        assert_eq!(second.response.result, 0.0);
    }

    #[test]
    fn test_example_batches_are_valid() {
        for i in 0..100 {
            let batch = example_batch(i, Utc::now()).unwrap();
            assert!(validate_request(&batch.request).is_ok());
        }
    }
}
