//! End-to-end pipeline scenarios: drain on close, drop on cancel, deadline,
//! and every backend under the example producer.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use convpipe::{
    open_repositories, ConsumerExit, Coordinator, ExampleProducer, PipelineConfig,
    ProducerConfig, ReporterExit, StorageKind,
};
use convpipe_core::{ConversionLog, ConversionRequest, ConversionResponse, RecordKind};
use convpipe_store::{open_file_repositories, FileRepository, Repository};
use convpipe_testkit::{
    parse_lines, records_from_params, ConversionParams, SharedOutput, SlowFixture, StorageFixture,
};

fn params(i: usize) -> ConversionParams {
    ConversionParams {
        from: "USD".into(),
        to: "EUR".into(),
        amount: 105.0 * (i as f64 + 1.0),
        quote: 0.9134,
        timestamp: 1_700_000_000 + i as i64,
        success: i % 2 == 0,
    }
}

#[tokio::test]
async fn close_after_five_drains_everything_quickly() {
    let fixture = StorageFixture::new().unwrap();
    let output = SharedOutput::default();
    let (coordinator, ingress) = Coordinator::start(
        &PipelineConfig::default(),
        fixture.open_files().unwrap(),
        Box::new(output.clone()),
    )
    .unwrap();

    for i in 0..5 {
        let (request, response, log) = records_from_params(&params(i));
        ingress.requests.send(request).await.unwrap();
        ingress.responses.send(response).await.unwrap();
        ingress.logs.send(log).await.unwrap();
    }

    let closed_at = Instant::now();
    ingress.close();
    let report = tokio::time::timeout(Duration::from_secs(1), coordinator.wait())
        .await
        .expect("pipeline must stop within a second of closing its queues")
        .unwrap();
    assert!(closed_at.elapsed() < Duration::from_secs(1));

    assert!(!report.cancelled);
    for kind in RecordKind::ALL {
        assert_eq!(report.consumer(kind).stored, 5, "{kind}");
        assert_eq!(report.consumer(kind).exit, ConsumerExit::Drained);
        assert_eq!(report.reporter.emitted(kind), 5, "{kind}");
        assert!(output.text().contains(kind.heading()));
    }
    assert_eq!(report.reporter.exit, ReporterExit::Drained);

    // Every line on disk parses, and a fresh open sees exactly five each.
    assert_eq!(parse_lines::<ConversionRequest>(&fixture.paths.requests).unwrap().len(), 5);
    assert_eq!(parse_lines::<ConversionResponse>(&fixture.paths.responses).unwrap().len(), 5);
    assert_eq!(parse_lines::<ConversionLog>(&fixture.paths.logs).unwrap().len(), 5);

    let reopened = open_file_repositories(&fixture.paths).unwrap();
    assert_eq!(reopened.requests.get_all().await.unwrap().len(), 5);
    assert_eq!(reopened.responses.get_all().await.unwrap().len(), 5);
    assert_eq!(reopened.logs.get_all().await.unwrap().len(), 5);
    assert!(reopened.requests.get_new_since_cursor().await.unwrap().is_empty());
}

#[tokio::test]
async fn cancel_drops_unconsumed_items() {
    let slow = SlowFixture::new(Duration::from_millis(100));
    let (coordinator, ingress) = Coordinator::start(
        &PipelineConfig::default(),
        slow.set(),
        Box::new(std::io::sink()),
    )
    .unwrap();
    let shutdown = coordinator.shutdown();

    for i in 0..5 {
        let (request, _, _) = records_from_params(&params(i));
        ingress.requests.send(request).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.trigger("test cancel");

    let report = tokio::time::timeout(Duration::from_secs(2), coordinator.wait())
        .await
        .unwrap()
        .unwrap();

    assert!(report.cancelled);
    assert!(slow.requests.len() < 5);
    assert_eq!(report.requests.stored, slow.requests.len());
    match report.requests.exit {
        ConsumerExit::Cancelled { dropped } => {
            assert!(dropped > 0);
            assert_eq!(dropped + report.requests.stored, 5);
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(report.reporter.exit, ReporterExit::Cancelled);

    // The producer side learns that nobody is listening any more.
    let (late, _, _) = records_from_params(&params(9));
    assert!(ingress.requests.send(late).await.is_err());
}

#[tokio::test]
async fn run_timeout_stops_an_idle_pipeline() {
    let fixture = StorageFixture::new().unwrap();
    let config = PipelineConfig {
        run_timeout: Some(Duration::from_millis(100)),
        ..PipelineConfig::default()
    };
    let (coordinator, ingress) =
        Coordinator::start(&config, fixture.open_files().unwrap(), Box::new(std::io::sink()))
            .unwrap();

    let (request, _, _) = records_from_params(&params(0));
    ingress.requests.send(request).await.unwrap();

    let report = tokio::time::timeout(Duration::from_secs(2), coordinator.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(report.cancelled);
    assert!(matches!(report.logs.exit, ConsumerExit::Cancelled { dropped: 0 }));
    assert_eq!(report.requests.stored, 1);
    drop(ingress);
}

#[tokio::test]
async fn example_producer_runs_on_every_backend() {
    for kind in [
        StorageKind::File,
        StorageKind::DocumentStore,
        StorageKind::RelationalStore,
    ] {
        let fixture = StorageFixture::new().unwrap();
        let storage = fixture.config(kind);
        let config = PipelineConfig {
            poll_interval: Duration::from_millis(20),
            ..PipelineConfig::default()
        };
        let (mut coordinator, ingress) = Coordinator::start(
            &config,
            open_repositories(&storage).unwrap(),
            Box::new(std::io::sink()),
        )
        .unwrap();
        coordinator.spawn_producer(
            ingress,
            ExampleProducer::new(ProducerConfig {
                iterations: 3,
                pause: Duration::from_millis(10),
            }),
        );

        let report = tokio::time::timeout(Duration::from_secs(5), coordinator.wait())
            .await
            .unwrap()
            .unwrap();
        assert!(report.producer.as_ref().unwrap().completed, "{kind}");

        let repos = open_repositories(&storage).unwrap();
        let requests = repos.requests.get_all().await.unwrap();
        let amounts: Vec<f64> = requests.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![105.0, 210.0, 315.0], "{kind}");

        let responses = repos.responses.get_all().await.unwrap();
        let successes: Vec<bool> = responses.iter().map(|r| r.success).collect();
        assert_eq!(successes, vec![true, false, true], "{kind}");
        assert_eq!(repos.logs.get_all().await.unwrap().len(), 3, "{kind}");

        // Only the document backend has nothing to report.
        let reported = report.reporter.emitted(RecordKind::Request);
        if kind == StorageKind::DocumentStore {
            assert_eq!(reported, 0);
        } else {
            assert_eq!(reported, 3, "{kind}");
        }
        repos.close().await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_never_tear_lines() {
    let fixture = StorageFixture::new().unwrap();
    let repo =
        Arc::new(FileRepository::<ConversionRequest>::open(&fixture.paths.requests).unwrap());

    let mut handles = Vec::new();
    for worker in 0..8 {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for i in 0..25 {
                let (request, _, _) = records_from_params(&params(worker * 25 + i));
                ids.push(repo.create(request).await.unwrap().id);
            }
            ids
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.extend(handle.await.unwrap());
    }
    assert_eq!(ids.len(), 200);
    assert_eq!(repo.get_all().await.unwrap().len(), 200);

    let on_disk = parse_lines::<ConversionRequest>(&fixture.paths.requests).unwrap();
    assert_eq!(on_disk.len(), 200);
    assert!(on_disk.iter().all(|r| ids.contains(&r.id)));
}
