//! Strategy registry — every strategy built once, looked up by kind.

use std::sync::Arc;

use crate::scorer::PlacementContext;
use crate::strategy::*;

pub struct StrategyRegistry {
    round_robin: RoundRobin,
    least_loaded: LeastLoaded,
    performance: PerformanceBased,
    cost: CostOptimized,
    latency: LatencyOptimized,
    hybrid: HybridWeighted,
}

impl StrategyRegistry {
    /// Build all strategies. Round-robin draws from OS entropy.
    pub fn new(ctx: PlacementContext) -> Self {
        let ctx = Arc::new(ctx);
        Self::build(RoundRobin::new(ctx.clone()), ctx)
    }

    /// Build all strategies with a seeded round-robin RNG.
    pub fn with_seed(ctx: PlacementContext, seed: u64) -> Self {
        let ctx = Arc::new(ctx);
        Self::build(RoundRobin::with_seed(ctx.clone(), seed), ctx)
    }

    fn build(round_robin: RoundRobin, ctx: Arc<PlacementContext>) -> Self {
        Self {
            round_robin,
            least_loaded: LeastLoaded::new(ctx.clone()),
            performance: PerformanceBased::new(ctx.clone()),
            cost: CostOptimized::new(ctx.clone()),
            latency: LatencyOptimized::new(ctx.clone()),
            hybrid: HybridWeighted::new(ctx),
        }
    }

    pub fn get(&self, kind: StrategyKind) -> &dyn PlacementStrategy {
        match kind {
            StrategyKind::RoundRobin => &self.round_robin,
            StrategyKind::LeastLoaded => &self.least_loaded,
            StrategyKind::PerformanceBased => &self.performance,
            StrategyKind::CostOptimized => &self.cost,
            StrategyKind::LatencyOptimized => &self.latency,
            StrategyKind::Hybrid => &self.hybrid,
        }
    }

    /// Resolve a strategy by its configured name.
    pub fn resolve(&self, name: &str) -> Result<&dyn PlacementStrategy, PlacementError> {
        let kind: StrategyKind = name.parse()?;
        Ok(self.get(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_holds_every_kind() {
        let registry = StrategyRegistry::with_seed(PlacementContext::default(), 3);
        for kind in StrategyKind::ALL {
            assert_eq!(registry.get(kind).kind(), kind);
        }
    }

    #[test]
    fn resolve_rejects_unknown_names() {
        let registry = StrategyRegistry::new(PlacementContext::default());
        assert_eq!(registry.resolve("cost-optimized").unwrap().kind(), StrategyKind::CostOptimized);
        assert!(matches!(
            registry.resolve("bogus"),
            Err(PlacementError::UnknownStrategy(name)) if name == "bogus"
        ));
    }
}
