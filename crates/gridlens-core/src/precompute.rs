//! Batch cache warming over agents × scenarios.

use crate::cache::{ArtifactStoreBuilder, CacheKey, ProduceOutcome};
use crate::errors::StoreError;
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Duration};

#[derive(Debug, Clone)]
pub struct WarmOptions {
    /// 1 runs every pair in order on a single producer store.
    pub workers: usize,
    pub task_timeout: Option<Duration>,
}

impl Default for WarmOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            task_timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    Error { message: String },
    TimedOut { after_secs: f64 },
    Panicked { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskFailure {
    pub key: CacheKey,
    #[serde(flatten)]
    pub kind: FailureKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub persisted: usize,
    pub already_cached: usize,
    pub failures: Vec<TaskFailure>,
    pub elapsed_ms: u64,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, key: CacheKey, result: Result<ProduceOutcome, FailureKind>) {
        match result {
            Ok(ProduceOutcome::Persisted) => self.persisted += 1,
            Ok(ProduceOutcome::AlreadyCached) => self.already_cached += 1,
            Err(kind) => {
                tracing::warn!(
                    event = "gridlens.warm.task_failed",
                    key = %key,
                    failure = ?kind
                );
                self.failures.push(TaskFailure { key, kind });
            }
        }
    }
}

/// Every (agent, scenario) pair to warm, agents outermost. Agents outside
/// `selection` are dropped; pairs the agent never ran are kept and fail as
/// not found.
pub fn plan(scenarios: &[String], agents: &[String], selection: Option<&[String]>) -> Vec<CacheKey> {
    agents
        .iter()
        .filter(|a| selection.map_or(true, |sel| sel.contains(*a)))
        .flat_map(|agent| {
            scenarios
                .iter()
                .map(move |scenario| CacheKey::new(agent.clone(), scenario.clone()))
        })
        .collect()
}

#[derive(Clone)]
pub struct Precomputer {
    stores: ArtifactStoreBuilder,
    options: WarmOptions,
}

impl Precomputer {
    pub fn new(stores: ArtifactStoreBuilder, options: WarmOptions) -> Self {
        Self { stores, options }
    }

    pub async fn run(
        &self,
        scenarios: &[String],
        agents: &[String],
        selection: Option<&[String]>,
    ) -> anyhow::Result<BatchReport> {
        let keys = plan(scenarios, agents, selection);
        tracing::info!(
            event = "gridlens.warm.start",
            tasks = keys.len(),
            workers = self.options.workers
        );

        let started = Instant::now();
        let mut report = if self.options.workers <= 1 {
            let this = self.clone();
            tokio::task::spawn_blocking(move || this.run_sequential(&keys)).await?
        } else {
            self.run_pool(keys).await?
        };
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            event = "gridlens.warm.done",
            total = report.total,
            persisted = report.persisted,
            already_cached = report.already_cached,
            failed = report.failures.len(),
            elapsed_ms = report.elapsed_ms
        );
        Ok(report)
    }

    /// In-order pass on one producer store. No deadline applies.
    pub fn run_sequential(&self, keys: &[CacheKey]) -> BatchReport {
        let store = self.stores.producer();
        let mut report = BatchReport {
            total: keys.len(),
            ..Default::default()
        };
        for key in keys {
            let result = catch_unwind(AssertUnwindSafe(|| store.ensure_persisted(key)));
            let result = match result {
                Ok(r) => r.map_err(failure),
                Err(payload) => Err(FailureKind::Panicked {
                    message: panic_message(payload),
                }),
            };
            report.record(key.clone(), result);
        }
        report
    }

    async fn run_pool(&self, keys: Vec<CacheKey>) -> anyhow::Result<BatchReport> {
        let sem = Arc::new(Semaphore::new(self.options.workers));
        let mut handles = Vec::with_capacity(keys.len());

        for key in keys {
            let permit = sem.clone().acquire_owned().await?;
            let stores = self.stores.clone();
            let task_timeout = self.options.task_timeout;
            let task_key = key.clone();
            let h = tokio::spawn(async move {
                // The slot frees when the build ends, not when the deadline fires.
                let work = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    stores.producer().ensure_persisted(&task_key)
                });
                let joined = match task_timeout {
                    Some(limit) => match timeout(limit, work).await {
                        Ok(joined) => joined,
                        // the blocking task keeps running and still holds its slot
                        Err(_) => {
                            return Err(FailureKind::TimedOut {
                                after_secs: limit.as_secs_f64(),
                            })
                        }
                    },
                    None => work.await,
                };
                match joined {
                    Ok(r) => r.map_err(failure),
                    Err(e) if e.is_panic() => Err(FailureKind::Panicked {
                        message: panic_message(e.into_panic()),
                    }),
                    Err(e) => Err(FailureKind::Error {
                        message: format!("join error: {}", e),
                    }),
                }
            });
            handles.push((key, h));
        }

        let mut report = BatchReport {
            total: handles.len(),
            ..Default::default()
        };
        for (key, h) in handles {
            let result = match h.await {
                Ok(r) => r,
                Err(e) => Err(FailureKind::Error {
                    message: format!("join error: {}", e),
                }),
            };
            report.record(key, result);
        }

        // Timed-out builds may still be writing; all slots back means none is.
        let _drained = sem.acquire_many(u32::try_from(self.options.workers)?).await?;
        Ok(report)
    }
}

fn failure(e: StoreError) -> FailureKind {
    FailureKind::Error {
        message: e.to_string(),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
