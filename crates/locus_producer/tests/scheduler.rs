mod common;

use async_trait::async_trait;
use common::*;
use locus_core::{PipelineLock, RunMode};
use locus_producer::{AlertSink, CriticalAlert, ScheduledRunner};
use locus_quality::QualityPolicy;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const LOCK_KEY: &str = "locus-producer";

#[tokio::test]
async fn test_runs_every_request_and_releases_lock() {
    let harness = Harness::new(ScriptedGenerator::always(Step::Pass));
    let runner = ScheduledRunner::new(harness.producer.clone());
    let requests = vec![request("Roofing"), request("Pest Control"), request("Fence Repair")];

    let report = runner.run(&requests, RunMode::Batch).await.unwrap();

    assert!(!report.skipped);
    assert_eq!(report.produced.len(), 3);
    assert!(report.failed.is_empty());
    assert_eq!(report.fallback_count(), 0);
    assert_eq!(harness.storage.articles().await.len(), 3);

    let acquired = harness
        .storage
        .try_acquire(LOCK_KEY, "next-runner", Duration::from_secs(60))
        .await
        .unwrap();
    assert!(acquired);
}

#[tokio::test]
async fn test_skips_when_lock_is_held_elsewhere() {
    let harness = Harness::new(ScriptedGenerator::always(Step::Pass));
    assert!(harness
        .storage
        .try_acquire(LOCK_KEY, "other-host", Duration::from_secs(600))
        .await
        .unwrap());

    let runner = ScheduledRunner::new(harness.producer.clone());
    let report = runner.run(&[request("Roofing")], RunMode::Periodic).await.unwrap();

    assert!(report.skipped);
    assert!(report.produced.is_empty());
    assert_eq!(harness.generator.outlines(), 0);
    assert!(harness.storage.runs().await.is_empty());
}

#[tokio::test]
async fn test_expired_lease_is_taken_over() {
    let harness = Harness::new(ScriptedGenerator::always(Step::Pass));
    harness
        .storage
        .try_acquire(LOCK_KEY, "crashed-host", Duration::from_millis(1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let runner = ScheduledRunner::new(harness.producer.clone());
    let report = runner.run(&[request("Roofing")], RunMode::Periodic).await.unwrap();

    assert!(!report.skipped);
    assert_eq!(report.produced.len(), 1);
}

#[tokio::test]
async fn test_failed_request_does_not_stop_batch() {
    let harness = Harness::new(ScriptedGenerator::always(Step::Pass));
    let runner = ScheduledRunner::new(harness.producer.clone());
    let mut broken = request("Roofing");
    broken.keyword = String::new();
    let requests = vec![request("Pest Control"), broken, request("Fence Repair")];

    let report = runner.run_as("batch-holder", &requests, RunMode::Batch).await.unwrap();

    assert_eq!(report.holder, "batch-holder");
    assert_eq!(report.produced.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].error.contains("required"));
}

#[tokio::test]
async fn test_same_holder_can_renew() {
    let harness = Harness::new(ScriptedGenerator::always(Step::Pass));
    assert!(harness
        .storage
        .try_acquire(LOCK_KEY, "holder-a", Duration::from_secs(60))
        .await
        .unwrap());

    let runner = ScheduledRunner::new(harness.producer.clone());
    let report = runner
        .run_as("holder-a", &[request("Roofing"), request("Pest Control")], RunMode::Batch)
        .await
        .unwrap();

    assert!(!report.skipped);
    assert_eq!(report.produced.len(), 2);
}

#[derive(Debug, Default)]
struct RecordingSink {
    sent: Mutex<Vec<CriticalAlert>>,
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send(&self, alert: &CriticalAlert) -> locus_core::Result<()> {
        self.sent.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_fatal_failure_raises_one_alert() {
    let mut policy = QualityPolicy::default().with_min_score(100);
    policy.min_source_links = 5;
    let harness = Harness::with_config(ScriptedGenerator::always(Step::OutlineError), config_with_policy(policy));
    let sink = Arc::new(RecordingSink::default());
    let runner = ScheduledRunner::new(harness.producer.clone()).with_alerts(sink.clone());
    let mut broken = request("Roofing");
    broken.keyword = String::new();
    let requests = vec![request("Pest Control"), broken];

    let first = runner.run(&requests, RunMode::Batch).await.unwrap();
    let second = runner.run(&requests, RunMode::Batch).await.unwrap();

    assert_eq!(first.failed.len(), 2);
    assert_eq!(second.failed.len(), 2);
    let sent = sink.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].message, "pipeline failed");
    assert_eq!(sent[0].payload["sourceKey"], request("Pest Control").source_key());
    assert_eq!(sent[0].payload["mode"], "batch");
    assert!(sent[0].payload["message"].as_str().unwrap().contains("source-links-minimum"));
}
