//! Fluent client construction, mirroring the teacher's `ClientBuilder`
//! style.

use std::sync::Arc;
use std::time::Duration;

use meshrpc_core::LinkLayer;
use meshrpc_registry::{Balancer, RandomBalancer, Registry};
use meshrpc_transport::HeartbeatConfig;

use crate::client::{Client, ClientConfig};

pub struct ClientBuilder {
    registry: Option<Arc<dyn Registry>>,
    balancer: Arc<dyn Balancer>,
    config: ClientConfig,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        ClientBuilder {
            registry: None,
            balancer: Arc::new(RandomBalancer),
            config: ClientConfig::default(),
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn balancer(mut self, balancer: Arc<dyn Balancer>) -> Self {
        self.balancer = balancer;
        self
    }

    pub fn heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.config.heartbeat = heartbeat;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    /// Set the link-layer transform applied to every frame this client
    /// sends and receives. Must match the server's configuration.
    pub fn link(mut self, link: LinkLayer) -> Self {
        self.config.link = link;
        self
    }

    /// Build the client. Panics if no registry was configured — matching
    /// the teacher's builders, which require their collaborating
    /// endpoint/transport to be set before `build`.
    pub fn build(self) -> Client {
        let registry = self.registry.expect("ClientBuilder requires a registry");
        Client::new(registry, self.balancer, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshrpc_registry::InMemoryRegistry;

    #[test]
    fn builder_defaults_to_random_balancer() {
        let client = ClientBuilder::new()
            .registry(InMemoryRegistry::new())
            .build();
        let _ = client;
    }

    #[test]
    #[should_panic(expected = "requires a registry")]
    fn builder_without_registry_panics() {
        ClientBuilder::new().build();
    }
}
