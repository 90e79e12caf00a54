//! Load balancers (spec §4.9), grounded on
//! `original_source/registry/balancer.go`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use meshrpc_core::{Error, Result};
use rand::Rng;

use crate::instance::ServiceInstance;

pub trait Balancer: Send + Sync {
    fn select<'a>(&self, instances: &'a [ServiceInstance]) -> Result<&'a ServiceInstance>;
}

#[derive(Default)]
pub struct RandomBalancer;

impl Balancer for RandomBalancer {
    fn select<'a>(&self, instances: &'a [ServiceInstance]) -> Result<&'a ServiceInstance> {
        if instances.is_empty() {
            return Err(Error::NoAvailableInstances);
        }
        let idx = rand::thread_rng().gen_range(0..instances.len());
        Ok(&instances[idx])
    }
}

#[derive(Default)]
pub struct RoundRobinBalancer {
    counter: AtomicU64,
}

impl Balancer for RoundRobinBalancer {
    fn select<'a>(&self, instances: &'a [ServiceInstance]) -> Result<&'a ServiceInstance> {
        if instances.is_empty() {
            return Err(Error::NoAvailableInstances);
        }
        let count = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let idx = (count % instances.len() as u64) as usize;
        Ok(&instances[idx])
    }
}

#[derive(Default)]
pub struct WeightedRandomBalancer;

impl Balancer for WeightedRandomBalancer {
    fn select<'a>(&self, instances: &'a [ServiceInstance]) -> Result<&'a ServiceInstance> {
        if instances.is_empty() {
            return Err(Error::NoAvailableInstances);
        }

        let total_weight: u32 = instances.iter().map(ServiceInstance::weight).sum();
        if total_weight == 0 {
            return Ok(&instances[0]);
        }

        let target = rand::thread_rng().gen_range(0..total_weight);
        let mut current = 0u32;
        for inst in instances {
            current += inst.weight();
            if target < current {
                return Ok(inst);
            }
        }
        Ok(&instances[0])
    }
}

/// Least-active-connections balancer. `increment_active`/`decrement_active`
/// must be called by the caller around each in-flight request, matching
/// the Go original's `IncrementActive`/`DecrementActive` contract.
#[derive(Default)]
pub struct LeastActiveBalancer {
    active: Mutex<HashMap<String, i64>>,
}

impl LeastActiveBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_active(&self, instance_id: &str) {
        let mut active = self.active.lock().unwrap();
        *active.entry(instance_id.to_string()).or_insert(0) += 1;
    }

    pub fn decrement_active(&self, instance_id: &str) {
        let mut active = self.active.lock().unwrap();
        if let Some(count) = active.get_mut(instance_id) {
            *count -= 1;
            if *count <= 0 {
                active.remove(instance_id);
            }
        }
    }
}

impl Balancer for LeastActiveBalancer {
    fn select<'a>(&self, instances: &'a [ServiceInstance]) -> Result<&'a ServiceInstance> {
        if instances.is_empty() {
            return Err(Error::NoAvailableInstances);
        }

        let active = self.active.lock().unwrap();
        let mut min_active = i64::MAX;
        let mut selected = None;
        for inst in instances {
            let count = active.get(&inst.id).copied().unwrap_or(0);
            if count < min_active {
                min_active = count;
                selected = Some(inst);
            }
        }
        Ok(selected.expect("instances is non-empty"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instances() -> Vec<ServiceInstance> {
        vec![
            ServiceInstance::new("a", "Echo", vec!["a:1".into()]),
            ServiceInstance::new("b", "Echo", vec!["b:1".into()]),
            ServiceInstance::new("c", "Echo", vec!["c:1".into()]),
        ]
    }

    #[test]
    fn random_errors_on_empty() {
        let b = RandomBalancer;
        assert!(matches!(
            b.select(&[]).unwrap_err(),
            Error::NoAvailableInstances
        ));
    }

    #[test]
    fn round_robin_cycles() {
        let b = RoundRobinBalancer::default();
        let instances = instances();
        let picks: Vec<_> = (0..6)
            .map(|_| b.select(&instances).unwrap().id.clone())
            .collect();
        assert_eq!(picks, vec!["b", "c", "a", "b", "c", "a"]);
    }

    #[test]
    fn weighted_random_only_picks_weighted_instance() {
        let mut instances = instances();
        instances[0].metadata.insert("weight".into(), "1".into());
        instances[1].metadata.insert("weight".into(), "0".into());
        instances[2].metadata.insert("weight".into(), "0".into());

        let b = WeightedRandomBalancer;
        for _ in 0..20 {
            assert_eq!(b.select(&instances).unwrap().id, "a");
        }
    }

    #[test]
    fn least_active_prefers_idle_instance() {
        let b = LeastActiveBalancer::new();
        b.increment_active("a");
        b.increment_active("a");
        b.increment_active("b");

        let instances = instances();
        let selected = b.select(&instances).unwrap();
        assert_eq!(selected.id, "c");
    }

    #[test]
    fn least_active_decrement_removes_zeroed_entry() {
        let b = LeastActiveBalancer::new();
        b.increment_active("a");
        b.decrement_active("a");
        assert!(b.active.lock().unwrap().get("a").is_none());
    }
}
