//! Autoscaler — turns pool load into scale signals.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use gpugrid_core::AutoscaleConfig;
use gpugrid_scheduler::{LoadSummary, Scheduler};
use gpugrid_state::{Clock, GridEvent, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    ScaleUp { target: usize },
    ScaleDown { target: usize },
    NoChange,
}

/// Callback that carries out a decision, e.g. by asking a cloud
/// provider for nodes. Invoked with no scheduler lock held.
pub type ScaleCallback = Arc<dyn Fn(ScaleDecision, LoadSummary) -> ScaleFuture + Send + Sync>;

pub type ScaleFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>>;

/// Pure scaling rule, without cooldowns.
pub fn decide(config: &AutoscaleConfig, load: &LoadSummary) -> ScaleDecision {
    let nodes = load.node_count;
    let min_nodes = config.min_nodes as usize;
    let max_nodes = config.max_nodes as usize;

    let overloaded = load.avg_utilization > config.threshold;
    let backlog = load.queue_length > config.queue_depth_trigger;
    if (overloaded || backlog) && nodes < max_nodes {
        let proportional = if overloaded && config.threshold > 0.0 {
            (nodes as f64 * load.avg_utilization / config.threshold).ceil() as usize
        } else {
            0
        };
        let target = proportional.max(nodes + 1).min(max_nodes);
        return ScaleDecision::ScaleUp { target };
    }

    if load.avg_utilization < config.threshold / 2.0 && load.queue_length == 0 && nodes > min_nodes
    {
        return ScaleDecision::ScaleDown { target: nodes - 1 };
    }

    ScaleDecision::NoChange
}

#[derive(Debug, Default)]
struct Cooldowns {
    last_scale_up: Option<u64>,
    last_scale_down: Option<u64>,
}

fn cooled(last: Option<u64>, now: u64, window_ms: u64) -> bool {
    last.is_none_or(|t| now.saturating_sub(t) >= window_ms)
}

pub struct AutoScaler {
    scheduler: Arc<Scheduler>,
    config: AutoscaleConfig,
    clock: Arc<dyn Clock>,
    cooldowns: Mutex<Cooldowns>,
    scale_fn: Option<ScaleCallback>,
}

impl AutoScaler {
    pub fn new(scheduler: Arc<Scheduler>, config: AutoscaleConfig) -> Self {
        Self {
            scheduler,
            config,
            clock: Arc::new(SystemClock),
            cooldowns: Mutex::new(Cooldowns::default()),
            scale_fn: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the callback used to act on decisions.
    pub fn with_scale_fn(mut self, f: ScaleCallback) -> Self {
        self.scale_fn = Some(f);
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.config.interval_ms.max(1))
    }

    /// Apply the rule and the cooldown windows to `load`. A returned
    /// scale decision starts a new cooldown window.
    pub async fn evaluate(&self, load: &LoadSummary) -> ScaleDecision {
        if !self.config.enabled {
            return ScaleDecision::NoChange;
        }
        let now = self.clock.now_ms();
        let decision = decide(&self.config, load);

        let mut cooldowns = self.cooldowns.lock().await;
        match decision {
            ScaleDecision::ScaleUp { .. } => {
                if !cooled(cooldowns.last_scale_up, now, self.config.scale_up_cooldown_ms) {
                    debug!("scale-up suppressed by cooldown");
                    return ScaleDecision::NoChange;
                }
                cooldowns.last_scale_up = Some(now);
            }
            ScaleDecision::ScaleDown { .. } => {
                if !cooled(cooldowns.last_scale_down, now, self.config.scale_down_cooldown_ms) {
                    debug!("scale-down suppressed by cooldown");
                    return ScaleDecision::NoChange;
                }
                cooldowns.last_scale_down = Some(now);
            }
            ScaleDecision::NoChange => {}
        }
        decision
    }

    /// Read the current load, decide, publish and act.
    pub async fn evaluate_now(&self) -> ScaleDecision {
        let load = self.scheduler.load_summary().await;
        let decision = self.evaluate(&load).await;

        let event = match decision {
            ScaleDecision::ScaleUp { target } => GridEvent::ScalingUp {
                node_count: load.node_count,
                target_nodes: target,
                queue_length: load.queue_length,
                avg_utilization: load.avg_utilization,
            },
            ScaleDecision::ScaleDown { target } => GridEvent::ScalingDown {
                node_count: load.node_count,
                target_nodes: target,
                queue_length: load.queue_length,
                avg_utilization: load.avg_utilization,
            },
            ScaleDecision::NoChange => return decision,
        };

        info!(
            signal = event.name(),
            nodes = load.node_count,
            queue = load.queue_length,
            avg_utilization = load.avg_utilization,
            ?decision,
            "scaling signal"
        );
        self.scheduler.events().emit(event);

        if let Some(f) = &self.scale_fn
            && let Err(e) = f(decision, load).await
        {
            warn!(error = %e, ?decision, "scale callback failed");
        }
        decision
    }

    /// Evaluate on a fixed interval until `shutdown` flips. Returns at
    /// once when autoscaling is disabled.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        if !self.config.enabled {
            info!("autoscaling disabled");
            return;
        }
        let interval = self.interval();
        info!(
            interval_ms = interval.as_millis() as u64,
            threshold = self.config.threshold,
            min_nodes = self.config.min_nodes,
            max_nodes = self.config.max_nodes,
            "autoscaler started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.evaluate_now().await;
                }
                _ = shutdown.changed() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }
        }
    }
}
