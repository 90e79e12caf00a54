//! Health checker (spec §4.10), grounded on
//! `original_source/registry/health.go`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use meshrpc_core::Result;
use tokio::sync::mpsc;
use tracing::{info, instrument};

use crate::instance::{ServiceInstance, ServiceStatus};

/// Notified when a tracked instance's status changes. A weak, non-owning
/// boundary (mirroring the Go original's `RegistryNotifier` interface) so
/// the checker never keeps a registry alive past its last external
/// reference.
#[async_trait::async_trait]
pub trait RegistryNotifier: Send + Sync {
    async fn notify_status_change(&self, service_name: &str, instance_id: &str, status: ServiceStatus);
}

struct CheckTask {
    stop: mpsc::Sender<()>,
}

pub struct HealthChecker {
    notifier: Arc<dyn RegistryNotifier>,
    tasks: Mutex<HashMap<String, CheckTask>>,
}

impl HealthChecker {
    pub fn new(notifier: Arc<dyn RegistryNotifier>) -> Self {
        HealthChecker {
            notifier,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start periodically checking `instance`. Replaces any existing
    /// check task for the same instance id.
    pub fn add_instance(self: &Arc<Self>, instance: ServiceInstance) {
        self.remove_instance(&instance.id);
        let instance_id = instance.id.clone();

        let (stop_tx, mut stop_rx) = mpsc::channel(1);
        let checker = self.clone();
        let mut instance = instance;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(instance.health_check.interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let status = checker.check(&instance).await;
                        if status != instance.status {
                            instance.status = status;
                            checker
                                .notifier
                                .notify_status_change(&instance.name, &instance.id, status)
                                .await;
                        }
                    }
                    _ = stop_rx.recv() => return,
                }
            }
        });

        self.tasks
            .lock()
            .unwrap()
            .insert(instance_id, CheckTask { stop: stop_tx });
    }

    pub fn remove_instance(&self, instance_id: &str) {
        if let Some(task) = self.tasks.lock().unwrap().remove(instance_id) {
            let _ = task.stop.try_send(());
        }
    }

    #[instrument(skip(self, instance), fields(instance = %instance.id))]
    async fn check(&self, instance: &ServiceInstance) -> ServiceStatus {
        if instance.health_check.url.is_empty() {
            let age = SystemTime::now()
                .duration_since(instance.last_heartbeat)
                .unwrap_or_default();
            return if age > instance.health_check.interval * 2 {
                ServiceStatus::Down
            } else {
                ServiceStatus::Up
            };
        }

        match probe(&instance.health_check.url, instance.health_check.timeout).await {
            Ok(true) => ServiceStatus::Up,
            _ => ServiceStatus::Down,
        }
    }
}

async fn probe(url: &str, timeout: std::time::Duration) -> Result<bool> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| meshrpc_core::Error::LinkFailure(e.to_string()))?;
    match client.get(url).send().await {
        Ok(resp) => Ok(resp.status().is_success()),
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingNotifier {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RegistryNotifier for CountingNotifier {
        async fn notify_status_change(
            &self,
            _service_name: &str,
            _instance_id: &str,
            _status: ServiceStatus,
        ) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn default_health_check_config_matches_spec() {
        let cfg = crate::instance::HealthCheckConfig::default();
        assert_eq!(cfg.interval, Duration::from_secs(10));
        assert_eq!(cfg.timeout, Duration::from_secs(5));
        assert!(cfg.url.is_empty());
    }

    #[tokio::test]
    async fn no_url_falls_back_to_heartbeat_age() {
        let notifier = Arc::new(CountingNotifier {
            calls: AtomicUsize::new(0),
        });
        let checker = Arc::new(HealthChecker::new(notifier));

        let mut instance = ServiceInstance::new("i1", "Echo", vec!["a:1".into()]);
        instance.health_check.interval = Duration::from_millis(10);
        assert_eq!(checker.check(&instance).await, ServiceStatus::Up);

        instance.last_heartbeat = SystemTime::now() - Duration::from_secs(1);
        assert_eq!(checker.check(&instance).await, ServiceStatus::Down);
    }
}
