//! Shunt Cluster — routing, filter chains, load balance, and failover for
//! multi-endpoint RPC references.
//!
//! A call flows: `Invocation` -> router chain (narrows the endpoint
//! snapshot) -> cluster invoker (selects one endpoint, fails over on error)
//! -> filter chain -> transport endpoint. Endpoint snapshots and routing
//! rules are swapped atomically, so in-flight calls always work against a
//! consistent view.

pub mod bitlist;
pub mod cluster;
pub mod config;
pub mod filter;
pub mod router;

pub use bitlist::BitList;
pub use cluster::{
    ClusterInvoker, Directory, FailfastClusterInvoker, FailoverClusterInvoker, LoadBalance,
    LoadBalanceRegistry, RandomLoadBalance, RoundRobinLoadBalance, RoutedDirectory,
    StaticDirectory,
};
pub use config::ConsumerConfig;
pub use filter::{
    Filter, FilterChainBuilder, FilterChainInvoker, FilterRegistry, FilterRole, MetricsCollector,
    MetricsFilter,
};
pub use router::{
    MeshRouter, MeshRule, Router, RouterChain, RouterDecision, RouterRegistry, RouteTrace,
    TagRouter, TagRule, TagStateRouter,
};
