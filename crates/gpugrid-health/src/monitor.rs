//! Health monitor — the periodic check loop.
//!
//! Each tick takes a pool snapshot, samples every node, feeds the sample
//! through that node's tracker and applies any resulting transition via
//! `Scheduler::transition_node_health`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use gpugrid_core::HealthConfig;
use gpugrid_scheduler::Scheduler;
use gpugrid_state::{HealthStatus, NodeId};

use crate::checker::{HealthTracker, assess};
use crate::source::{MetricsSource, ReportedMetrics};

/// Callback invoked after a node's health changes.
pub type HealthCallback = Arc<dyn Fn(HealthChange) -> BoxFuture + Send + Sync>;

type BoxFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

/// A transition applied during a check.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthChange {
    pub node_id: NodeId,
    pub from: HealthStatus,
    pub to: HealthStatus,
    pub reason: String,
}

pub struct HealthMonitor {
    scheduler: Arc<Scheduler>,
    source: Arc<dyn MetricsSource>,
    config: HealthConfig,
    trackers: Mutex<HashMap<NodeId, HealthTracker>>,
    on_status_change: Option<HealthCallback>,
}

impl HealthMonitor {
    /// Monitor that judges nodes by their last reported metrics.
    pub fn new(scheduler: Arc<Scheduler>, config: HealthConfig) -> Self {
        Self {
            scheduler,
            source: Arc::new(ReportedMetrics),
            config,
            trackers: Mutex::new(HashMap::new()),
            on_status_change: None,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn MetricsSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_callback(mut self, callback: HealthCallback) -> Self {
        self.on_status_change = Some(callback);
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.config.interval_ms.max(1))
    }

    /// Run one check over every node and return the transitions applied.
    pub async fn check_once(&self) -> Vec<HealthChange> {
        let snapshot = self.scheduler.snapshot().await;

        let mut pending = Vec::new();
        let mut samples = Vec::new();
        {
            let mut trackers = self.trackers.lock().await;
            trackers.retain(|id, _| snapshot.nodes().any(|n| &n.id == id));

            for node in snapshot.nodes() {
                let metrics = self.source.sample(node);
                if self.source.publishes() {
                    samples.push((node.id.clone(), metrics));
                }

                let tracker = trackers
                    .entry(node.id.clone())
                    .or_insert_with(|| HealthTracker::from_config(node.health, &self.config));
                tracker.sync(node.health);

                // Unhealthy and maintenance belong to operators.
                if !matches!(node.health, HealthStatus::Healthy | HealthStatus::Degraded) {
                    continue;
                }

                let verdict = assess(&metrics, &self.config);
                let next = tracker.record(&verdict);
                if next != node.health {
                    pending.push(HealthChange {
                        node_id: node.id.clone(),
                        from: node.health,
                        to: next,
                        reason: verdict.reason().to_string(),
                    });
                }
            }
        }

        for (node_id, metrics) in samples {
            if let Err(e) = self.scheduler.record_metrics(&node_id, metrics).await {
                debug!(node = %node_id, error = %e, "could not store sample");
            }
        }

        let mut applied = Vec::new();
        for change in pending {
            match self
                .scheduler
                .transition_node_health(&change.node_id, change.from, change.to, &change.reason)
                .await
            {
                Ok(true) => {
                    if let Some(cb) = &self.on_status_change {
                        cb(change.clone()).await;
                    }
                    applied.push(change);
                }
                Ok(false) => {
                    debug!(node = %change.node_id, "health changed concurrently, sample dropped");
                }
                Err(e) => {
                    warn!(node = %change.node_id, error = %e, "health transition failed");
                }
            }
        }
        applied
    }

    /// Check on a fixed interval until `shutdown` flips.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let interval = self.interval();
        info!(interval_ms = interval.as_millis() as u64, "health monitor started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let changes = self.check_once().await;
                    if !changes.is_empty() {
                        debug!(transitions = changes.len(), "health check applied transitions");
                    }
                }
                _ = shutdown.changed() => {
                    info!("health monitor shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpugrid_core::GridConfig;
    use gpugrid_state::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn gpu_node(id: &str) -> Node {
        Node::new(
            id,
            "l4",
            NodeCapacity {
                gpu_count: 4,
                memory_gb: 96,
                cpu_cores: 32,
                network_bandwidth_gbps: 50,
            },
        )
    }

    async fn scheduler() -> Arc<Scheduler> {
        let sched = Scheduler::new(&GridConfig::default(), EventBus::new(64)).unwrap();
        sched
            .register_cluster(
                Cluster::new("c1", Provider::Gcp, "europe-west4")
                    .with_node(gpu_node("n1"))
                    .with_node(gpu_node("n2")),
            )
            .await
            .unwrap();
        Arc::new(sched)
    }

    fn overheated() -> NodeMetrics {
        NodeMetrics {
            temperature_c: 88.0,
            ..NodeMetrics::default()
        }
    }

    async fn health_of(sched: &Scheduler, node_id: &str) -> HealthStatus {
        sched
            .snapshot()
            .await
            .nodes()
            .find(|n| n.id == node_id)
            .map(|n| n.health)
            .unwrap()
    }

    #[tokio::test]
    async fn breaching_node_is_degraded_and_recovers() {
        let sched = scheduler().await;
        let mut events = sched.events().subscribe();
        let monitor = HealthMonitor::new(sched.clone(), HealthConfig::default());

        sched.record_metrics("n1", overheated()).await.unwrap();
        let changes = monitor.check_once().await;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].node_id, "n1");
        assert_eq!(changes[0].to, HealthStatus::Degraded);
        assert!(changes[0].reason.contains("temperature"));
        assert_eq!(health_of(&sched, "n1").await, HealthStatus::Degraded);
        assert_eq!(health_of(&sched, "n2").await, HealthStatus::Healthy);

        sched.record_metrics("n1", NodeMetrics::default()).await.unwrap();
        let changes = monitor.check_once().await;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].to, HealthStatus::Healthy);

        let mut names = Vec::new();
        while let Ok(e) = events.try_recv() {
            names.push(e.name());
        }
        assert_eq!(names, vec!["nodeDegraded", "nodeRecovered"]);
    }

    #[tokio::test]
    async fn debounce_delays_degradation() {
        let sched = scheduler().await;
        let config = HealthConfig {
            degrade_after: 2,
            ..HealthConfig::default()
        };
        let monitor = HealthMonitor::new(sched.clone(), config);

        sched.record_metrics("n1", overheated()).await.unwrap();
        assert!(monitor.check_once().await.is_empty());
        assert_eq!(monitor.check_once().await.len(), 1);
        assert_eq!(health_of(&sched, "n1").await, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn maintenance_nodes_are_left_alone() {
        let sched = scheduler().await;
        let monitor = HealthMonitor::new(sched.clone(), HealthConfig::default());
        sched
            .set_node_health("n1", HealthStatus::Maintenance, "firmware update")
            .await
            .unwrap();

        assert!(monitor.check_once().await.is_empty());
        assert_eq!(health_of(&sched, "n1").await, HealthStatus::Maintenance);
    }

    #[tokio::test]
    async fn callback_sees_each_transition() {
        let sched = scheduler().await;
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let monitor = HealthMonitor::new(sched.clone(), HealthConfig::default()).with_callback(
            Arc::new(move |_change: HealthChange| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }) as BoxFuture
            }),
        );

        sched.record_metrics("n1", overheated()).await.unwrap();
        sched.record_metrics("n2", overheated()).await.unwrap();
        monitor.check_once().await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn simulated_source_publishes_samples() {
        let sched = scheduler().await;
        let monitor = HealthMonitor::new(sched.clone(), HealthConfig::default())
            .with_source(Arc::new(crate::source::SimulatedMetrics::new(5)));

        monitor.check_once().await;
        let snapshot = sched.snapshot().await;
        assert!(snapshot.nodes().all(|n| n.metrics.temperature_c >= 45.0));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let sched = scheduler().await;
        let monitor = Arc::new(HealthMonitor::new(
            sched,
            HealthConfig {
                interval_ms: 5,
                ..HealthConfig::default()
            },
        ));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(monitor.run(rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
