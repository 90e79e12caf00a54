//! Service instance model (spec §4.8), grounded on
//! `original_source/registry/registry.go`'s `ServiceInstance`/`HealthCheck`.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceStatus {
    Up,
    Down,
}

#[derive(Clone, Debug)]
pub struct HealthCheckConfig {
    pub interval: Duration,
    pub timeout: Duration,
    /// When empty, health is inferred from heartbeat age instead of an
    /// HTTP probe.
    pub url: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        HealthCheckConfig {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
            url: String::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServiceInstance {
    pub id: String,
    pub name: String,
    pub version: String,
    pub metadata: BTreeMap<String, String>,
    pub endpoints: Vec<String>,
    pub status: ServiceStatus,
    pub last_heartbeat: SystemTime,
    pub health_check: HealthCheckConfig,
}

impl ServiceInstance {
    pub fn new(id: impl Into<String>, name: impl Into<String>, endpoints: Vec<String>) -> Self {
        ServiceInstance {
            id: id.into(),
            name: name.into(),
            version: String::new(),
            metadata: BTreeMap::new(),
            endpoints,
            status: ServiceStatus::Up,
            last_heartbeat: SystemTime::now(),
            health_check: HealthCheckConfig::default(),
        }
    }

    /// Parsed `weight` metadata, defaulting to 1 (matching the Go
    /// original's `WeightedRandomBalancer` default).
    pub fn weight(&self) -> u32 {
        self.metadata
            .get("weight")
            .and_then(|w| w.parse().ok())
            .unwrap_or(1)
    }
}
