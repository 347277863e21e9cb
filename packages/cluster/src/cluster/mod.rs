//! Cluster fault tolerance: directories, load balance, and failover policies.

pub mod directory;
pub mod failfast;
pub mod failover;
pub mod invoker;
pub mod loadbalance;

// ---------------------------------------------------------------------------
// Re-exports — flat public API
// ---------------------------------------------------------------------------

pub use directory::{Directory, RoutedDirectory, StaticDirectory};
pub use failfast::FailfastClusterInvoker;
pub use failover::FailoverClusterInvoker;
pub use invoker::{ClusterInvoker, SelectionCore};
pub use loadbalance::{
    LoadBalance, LoadBalanceRegistry, RandomLoadBalance, RoundRobinLoadBalance,
};

// ---------------------------------------------------------------------------
// Integration tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod integration_tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use shunt_core::invocation::keys;
    use shunt_core::{EndpointUrl, Invocation, Invoker, InvokerRef, Reply, RpcError};

    use super::*;
    use crate::filter::{FilterChainBuilder, FilterRegistry, FilterRole};
    use crate::router::{Router, RouterChain, TagRouter};

    /// Endpoint replying with its own host name.
    struct EchoEndpoint {
        url: EndpointUrl,
    }

    fn endpoint(host: &str, tag: Option<&str>) -> InvokerRef {
        let mut url = EndpointUrl::new("shunt", host, 20880);
        if let Some(tag) = tag {
            url.set_param("tag", tag);
        }
        Arc::new(EchoEndpoint { url })
    }

    #[async_trait]
    impl Invoker for EchoEndpoint {
        fn url(&self) -> &EndpointUrl {
            &self.url
        }

        async fn invoke(&self, _invocation: Invocation) -> Result<Reply, RpcError> {
            Ok(Reply::new(rmpv::Value::from(self.url.host())))
        }
    }

    fn routed_cluster() -> FailoverClusterInvoker {
        let chain = RouterChain::new(vec![Arc::new(TagRouter::new()) as Arc<dyn Router>]);
        let directory = Arc::new(RoutedDirectory::new(
            "demo.Echo",
            EndpointUrl::new("shunt", "consumer", 0),
            vec![
                endpoint("a", Some("red")),
                endpoint("b", Some("yellow")),
                endpoint("c", None),
            ],
            chain,
        ));
        FailoverClusterInvoker::new(directory, Arc::new(LoadBalanceRegistry::with_defaults()))
    }

    fn replied_host(reply: &Reply) -> &str {
        reply.value().as_str().unwrap_or_default()
    }

    #[tokio::test]
    async fn tagged_call_lands_on_the_tagged_endpoint() {
        let cluster = routed_cluster();
        let invocation = Invocation::new("demo.Echo", "say").with_attachment(keys::TAG, "red");
        let reply = ClusterInvoker::invoke(&cluster, invocation).await.unwrap();
        assert_eq!(replied_host(&reply), "a");
    }

    #[tokio::test]
    async fn blank_tag_lands_on_the_untagged_endpoint() {
        let cluster = routed_cluster();
        let invocation = Invocation::new("demo.Echo", "say").with_attachment(keys::TAG, "");
        let reply = ClusterInvoker::invoke(&cluster, invocation).await.unwrap();
        assert_eq!(replied_host(&reply), "c");
    }

    #[tokio::test]
    async fn unmatched_tag_downgrades_to_any_endpoint() {
        let cluster = routed_cluster();
        let invocation = Invocation::new("demo.Echo", "say").with_attachment(keys::TAG, "purple");
        let reply = ClusterInvoker::invoke(&cluster, invocation).await.unwrap();
        assert!(["a", "b", "c"].contains(&replied_host(&reply)));
    }

    #[tokio::test]
    async fn full_stack_filters_over_cluster_over_routing() {
        // The consumer-facing composition: filter chain wrapping the cluster
        // invoker wrapping the routed directory.
        let cluster: InvokerRef = Arc::new(routed_cluster());
        let builder = FilterChainBuilder::new(Arc::new(FilterRegistry::with_defaults()));
        let wrapped = builder
            .build_chain(cluster, "reference.filter", FilterRole::Consumer)
            .unwrap();

        let invocation = Invocation::new("demo.Echo", "say").with_attachment(keys::TAG, "red");
        let reply = wrapped.invoke(invocation.clone()).await.unwrap();
        assert_eq!(replied_host(&reply), "a");
        // The context filter ran against the shared attachment bag.
        assert_eq!(invocation.attachment(keys::SIDE).as_deref(), Some("consumer"));
    }
}
