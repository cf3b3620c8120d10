use locus_core::{Error, ProducerRequest, Result, RunMode};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::alerts::{AlertDispatcher, AlertSink, CriticalAlert};
use crate::orchestrator::{ProduceOutcome, Producer};

#[derive(Debug, Clone)]
pub struct RequestFailure {
    pub source_key: String,
    pub error: String,
}

/// What one scheduled pass did.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub holder: String,
    pub skipped: bool,
    pub produced: Vec<ProduceOutcome>,
    pub failed: Vec<RequestFailure>,
}

impl BatchReport {
    fn new(holder: String) -> Self {
        Self {
            holder,
            ..Self::default()
        }
    }

    pub fn fallback_count(&self) -> usize {
        self.produced.iter().filter(|o| o.used_fallback).count()
    }
}

/// Runs requests one after another while holding the pipeline lock, so two
/// schedulers never produce at the same time.
#[derive(Debug, Clone)]
pub struct ScheduledRunner {
    producer: Arc<Producer>,
    alerts: Option<Arc<AlertDispatcher>>,
}

impl ScheduledRunner {
    pub fn new(producer: Arc<Producer>) -> Self {
        Self { producer, alerts: None }
    }

    /// Sends a critical alert for every request that fails fatally.
    pub fn with_alerts(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(Arc::new(AlertDispatcher::new(sink)));
        self
    }

    pub fn producer(&self) -> &Arc<Producer> {
        &self.producer
    }

    pub async fn run(&self, requests: &[ProducerRequest], mode: RunMode) -> Result<BatchReport> {
        let holder = Uuid::new_v4().to_string();
        self.run_as(&holder, requests, mode).await
    }

    /// Same as [`ScheduledRunner::run`] with a caller-chosen lock holder.
    pub async fn run_as(&self, holder: &str, requests: &[ProducerRequest], mode: RunMode) -> Result<BatchReport> {
        let config = self.producer.config();
        let storage = self.producer.storage();

        if !storage.try_acquire(&config.lock_key, holder, config.lock_lease).await? {
            info!(lock_key = %config.lock_key, "pipeline lock held elsewhere, skipping run");
            let mut report = BatchReport::new(holder.to_string());
            report.skipped = true;
            return Ok(report);
        }
        info!(lock_key = %config.lock_key, holder, requests = requests.len(), "pipeline lock acquired");

        let result = self.run_locked(holder, requests, mode).await;

        if let Err(e) = storage.release(&config.lock_key, holder).await {
            warn!(lock_key = %config.lock_key, holder, error = %e, "failed to release pipeline lock");
        }
        result
    }

    async fn run_locked(&self, holder: &str, requests: &[ProducerRequest], mode: RunMode) -> Result<BatchReport> {
        let config = self.producer.config();
        let storage = self.producer.storage();
        let mut report = BatchReport::new(holder.to_string());

        for (index, request) in requests.iter().enumerate() {
            if index > 0 && !storage.try_acquire(&config.lock_key, holder, config.lock_lease).await? {
                return Err(Error::Lock(format!(
                    "lease on {} lost after {} of {} requests",
                    config.lock_key,
                    index,
                    requests.len()
                )));
            }

            match self.producer.produce(request, mode).await {
                Ok(outcome) => report.produced.push(outcome),
                Err(e) => {
                    error!(source_key = %request.source_key(), error = %e, "request failed");
                    if e.is_fatal() {
                        self.alert(request, mode, &e).await;
                    }
                    report.failed.push(RequestFailure {
                        source_key: request.source_key(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            produced = report.produced.len(),
            fallbacks = report.fallback_count(),
            failed = report.failed.len(),
            "scheduled run finished"
        );
        Ok(report)
    }

    async fn alert(&self, request: &ProducerRequest, mode: RunMode, error: &Error) {
        if let Some(alerts) = &self.alerts {
            let alert = CriticalAlert::new(
                "pipeline failed",
                json!({
                    "mode": mode.to_string(),
                    "sourceKey": request.source_key(),
                    "message": error.to_string(),
                }),
            );
            alerts.dispatch(&alert).await;
        }
    }
}
