//! `Registry` trait and the in-memory implementation (spec §4.8),
//! grounded on `original_source/registry/memory.go`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use std::time::SystemTime;

use async_trait::async_trait;
use meshrpc_core::{Error, Result};
use tokio::sync::mpsc;

use crate::balancer::Balancer;
use crate::health::{HealthChecker, RegistryNotifier};
use crate::instance::{ServiceInstance, ServiceStatus};

#[async_trait]
pub trait Registry: Send + Sync {
    async fn register(&self, instance: ServiceInstance) -> Result<()>;
    async fn deregister(&self, instance_id: &str) -> Result<()>;
    async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>>;
    async fn list_services(&self) -> Result<Vec<ServiceInstance>>;
    /// Subscribe to changes for `service_name`. The channel is seeded
    /// with the current instance list immediately, then receives a full
    /// replacement list on every subsequent register/deregister for that
    /// service.
    async fn subscribe(&self, service_name: &str) -> mpsc::Receiver<Vec<ServiceInstance>>;
    async fn unsubscribe(&self, service_name: &str);
    /// Resolve `name` to a single healthy instance: filter to
    /// `ServiceStatus::Up`, then delegate to `balancer`. A service whose
    /// every instance is `Down` yields `Error::NoAvailableInstances`
    /// rather than a dead selection.
    async fn select_instance(&self, name: &str, balancer: &dyn Balancer) -> Result<ServiceInstance>;
}

#[derive(Default)]
struct State {
    services: HashMap<String, Vec<ServiceInstance>>,
    subscribers: HashMap<String, Vec<mpsc::Sender<Vec<ServiceInstance>>>>,
}

/// The default `Registry` implementation: an in-process catalog backed
/// by a single `RwLock`. External collaborator registries (etcd, Consul,
/// ...) implement the same trait; only the boundary is specified here.
///
/// Owns a [`HealthChecker`] per spec §4.10: `register`/`deregister` add
/// and remove the checked instance, and status changes the checker
/// observes flow back in through a [`RegistryNotifier`] that holds only a
/// `Weak` handle to this registry, so the checker's background tasks
/// never keep it alive past its last external `Arc`.
pub struct InMemoryRegistry {
    state: RwLock<State>,
    health: Arc<HealthChecker>,
}

struct WeakNotifier {
    registry: Weak<InMemoryRegistry>,
}

#[async_trait]
impl RegistryNotifier for WeakNotifier {
    async fn notify_status_change(&self, service_name: &str, instance_id: &str, status: ServiceStatus) {
        if let Some(registry) = self.registry.upgrade() {
            registry.apply_status_change(service_name, instance_id, status);
        }
    }
}

impl InMemoryRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let notifier = Arc::new(WeakNotifier {
                registry: weak.clone(),
            });
            InMemoryRegistry {
                state: RwLock::new(State::default()),
                health: Arc::new(HealthChecker::new(notifier)),
            }
        })
    }

    fn notify_locked(state: &State, service_name: &str) {
        let Some(subs) = state.subscribers.get(service_name) else {
            return;
        };
        let instances = state
            .services
            .get(service_name)
            .cloned()
            .unwrap_or_default();
        for sub in subs {
            let _ = sub.try_send(instances.clone());
        }
    }

    /// Applies a status change reported by the health checker and
    /// republishes the service's snapshot to subscribers (spec §4.10).
    fn apply_status_change(&self, service_name: &str, instance_id: &str, status: ServiceStatus) {
        let mut state = self.state.write().unwrap();
        if let Some(instances) = state.services.get_mut(service_name) {
            if let Some(instance) = instances.iter_mut().find(|i| i.id == instance_id) {
                instance.status = status;
            }
        }
        Self::notify_locked(&state, service_name);
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn register(&self, mut instance: ServiceInstance) -> Result<()> {
        instance.last_heartbeat = SystemTime::now();

        let mut state = self.state.write().unwrap();
        let name = instance.name.clone();

        let entries = state.services.entry(name.clone()).or_default();
        if let Some(existing) = entries.iter_mut().find(|i| i.id == instance.id) {
            *existing = instance.clone();
        } else {
            entries.push(instance.clone());
        }

        Self::notify_locked(&state, &name);
        drop(state);
        self.health.add_instance(instance);
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        let mut found_service = None;
        for (name, instances) in state.services.iter_mut() {
            if let Some(pos) = instances.iter().position(|i| i.id == instance_id) {
                instances.remove(pos);
                found_service = Some(name.clone());
                break;
            }
        }
        match found_service {
            Some(name) => {
                Self::notify_locked(&state, &name);
                drop(state);
                self.health.remove_instance(instance_id);
                Ok(())
            }
            None => Err(Error::InstanceNotFound(instance_id.to_string())),
        }
    }

    async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        let state = self.state.read().unwrap();
        state
            .services
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))
    }

    async fn list_services(&self) -> Result<Vec<ServiceInstance>> {
        let state = self.state.read().unwrap();
        Ok(state.services.values().flatten().cloned().collect())
    }

    async fn subscribe(&self, service_name: &str) -> mpsc::Receiver<Vec<ServiceInstance>> {
        let (tx, rx) = mpsc::channel(1);
        let mut state = self.state.write().unwrap();
        if let Some(instances) = state.services.get(service_name) {
            let _ = tx.try_send(instances.clone());
        }
        state
            .subscribers
            .entry(service_name.to_string())
            .or_default()
            .push(tx);
        rx
    }

    async fn unsubscribe(&self, service_name: &str) {
        let mut state = self.state.write().unwrap();
        state.subscribers.remove(service_name);
    }

    async fn select_instance(&self, name: &str, balancer: &dyn Balancer) -> Result<ServiceInstance> {
        let instances = self.get_service(name).await?;
        let up: Vec<ServiceInstance> = instances
            .into_iter()
            .filter(|i| i.status == ServiceStatus::Up)
            .collect();
        balancer.select(&up).map(|i| i.clone())
    }
}
