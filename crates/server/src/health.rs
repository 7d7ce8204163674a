//! Pluggable health checks run under a shared deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// The overall deadline for one health report.
const CHECK_DEADLINE: Duration = Duration::from_secs(5);

/// Outcome of one named check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// `healthy`, `unhealthy`, or `timeout`.
    pub status: &'static str,
    /// How long the check took.
    pub latency_ms: u64,
    /// Optional check-specific detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

/// One registered health check.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// The check's name in the report.
    fn name(&self) -> &str;

    /// Runs the check. `Ok` payloads become the report detail.
    async fn check(&self) -> Result<Option<Value>, String>;
}

/// The set of registered checks.
#[derive(Clone, Default)]
pub struct HealthRegistry {
    checks: Vec<Arc<dyn HealthCheck>>,
}

/// A full health report.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// `healthy` when every check passed within the deadline.
    pub status: &'static str,
    /// Per-check outcomes.
    pub checks: serde_json::Map<String, Value>,
}

impl HealthRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a check.
    pub fn register(&mut self, check: Arc<dyn HealthCheck>) {
        self.checks.push(check);
    }

    /// Runs every check concurrently under the shared deadline.
    pub async fn run(&self) -> HealthReport {
        let futures = self.checks.iter().map(|check| {
            let check = check.clone();

            async move {
                let started = Instant::now();

                let outcome = tokio::time::timeout(CHECK_DEADLINE, check.check()).await;
                let latency_ms = started.elapsed().as_millis() as u64;

                let result = match outcome {
                    Ok(Ok(detail)) => CheckResult {
                        status: "healthy",
                        latency_ms,
                        detail,
                    },
                    Ok(Err(reason)) => {
                        log::warn!("Health check '{}' failed: {reason}", check.name());

                        CheckResult {
                            status: "unhealthy",
                            latency_ms,
                            detail: Some(Value::String(reason)),
                        }
                    }
                    Err(_) => CheckResult {
                        status: "timeout",
                        latency_ms,
                        detail: None,
                    },
                };

                (check.name().to_string(), result)
            }
        });

        let results = futures::future::join_all(futures).await;

        let mut checks = serde_json::Map::new();
        let mut healthy = true;

        for (name, result) in results {
            healthy &= result.status == "healthy";

            if let Ok(value) = serde_json::to_value(&result) {
                checks.insert(name, value);
            }
        }

        HealthReport {
            status: if healthy { "healthy" } else { "unhealthy" },
            checks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticCheck {
        name: &'static str,
        result: Result<Option<Value>, String>,
    }

    #[async_trait]
    impl HealthCheck for StaticCheck {
        fn name(&self) -> &str {
            self.name
        }

        async fn check(&self) -> Result<Option<Value>, String> {
            self.result.clone()
        }
    }

    #[tokio::test]
    async fn all_passing_checks_report_healthy() {
        let mut registry = HealthRegistry::new();
        registry.register(Arc::new(StaticCheck {
            name: "a",
            result: Ok(None),
        }));
        registry.register(Arc::new(StaticCheck {
            name: "b",
            result: Ok(Some(serde_json::json!({"runs": 3}))),
        }));

        let report = registry.run().await;

        assert_eq!(report.status, "healthy");
        assert_eq!(report.checks["b"]["detail"]["runs"], 3);
    }

    #[tokio::test]
    async fn one_failing_check_reports_unhealthy() {
        let mut registry = HealthRegistry::new();
        registry.register(Arc::new(StaticCheck {
            name: "ok",
            result: Ok(None),
        }));
        registry.register(Arc::new(StaticCheck {
            name: "broken",
            result: Err("backend unreachable".to_string()),
        }));

        let report = registry.run().await;

        assert_eq!(report.status, "unhealthy");
        assert_eq!(report.checks["broken"]["status"], "unhealthy");
    }
}
