//! Static cluster inventory from `[[clusters]]` config entries.

use anyhow::Context;

use gpugrid_core::{ClusterSeed, NodeSeed};
use gpugrid_state::{Cluster, ClusterStatus, Node, NodeCapacity, Provider};

pub fn build_cluster(seed: &ClusterSeed) -> anyhow::Result<Cluster> {
    let provider: Provider = seed
        .provider
        .parse()
        .with_context(|| format!("cluster '{}'", seed.id))?;
    let status: ClusterStatus = seed
        .status
        .parse()
        .with_context(|| format!("cluster '{}'", seed.id))?;

    let mut cluster = Cluster::new(&seed.id, provider, &seed.region);
    cluster.status = status;
    Ok(seed
        .nodes
        .iter()
        .fold(cluster, |c, node| c.with_node(build_node(node))))
}

fn build_node(seed: &NodeSeed) -> Node {
    Node::new(
        &seed.id,
        &seed.gpu_type,
        NodeCapacity {
            gpu_count: seed.gpu_count,
            memory_gb: seed.memory_gb,
            cpu_cores: seed.cpu_cores,
            network_bandwidth_gbps: seed.network_bandwidth_gbps,
        },
    )
    .with_latency(seed.base_latency_ms)
    .with_throughput(seed.compute_throughput)
}

pub fn build_all(seeds: &[ClusterSeed]) -> anyhow::Result<Vec<Cluster>> {
    seeds.iter().map(build_cluster).collect()
}
