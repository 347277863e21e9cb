//! Consumer context filter: stamps call-side attachments before anything
//! downstream reads them.

use async_trait::async_trait;
use shunt_core::invocation::keys;
use shunt_core::{Invocation, Invoker, Reply, RpcError};

use super::Filter;

/// Runs first in consumer chains (most negative order): filters after it —
/// metrics in particular — rely on the attachments it sets.
pub struct ConsumerContextFilter;

#[async_trait]
impl Filter for ConsumerContextFilter {
    fn name(&self) -> &'static str {
        "context"
    }

    async fn invoke(&self, next: &dyn Invoker, invocation: Invocation) -> Result<Reply, RpcError> {
        invocation.set_attachment(keys::SIDE, "consumer");
        invocation.set_attachment(keys::SERVICE_KEY, invocation.service());
        next.invoke(invocation).await
    }
}

#[cfg(test)]
mod tests {
    use shunt_core::EndpointUrl;

    use super::*;

    struct AssertingTerminal {
        url: EndpointUrl,
    }

    #[async_trait]
    impl Invoker for AssertingTerminal {
        fn url(&self) -> &EndpointUrl {
            &self.url
        }

        async fn invoke(&self, invocation: Invocation) -> Result<Reply, RpcError> {
            assert_eq!(invocation.attachment(keys::SIDE).as_deref(), Some("consumer"));
            assert_eq!(
                invocation.attachment(keys::SERVICE_KEY).as_deref(),
                Some("demo.Echo")
            );
            Ok(Reply::empty())
        }
    }

    #[tokio::test]
    async fn stamps_side_and_service_key_before_descending() {
        let filter = ConsumerContextFilter;
        let terminal = AssertingTerminal {
            url: EndpointUrl::new("shunt", "h", 1),
        };
        let invocation = Invocation::new("demo.Echo", "say");
        filter.invoke(&terminal, invocation.clone()).await.unwrap();
        // The shared bag means the caller's handle sees the stamp too.
        assert_eq!(invocation.attachment(keys::SIDE).as_deref(), Some("consumer"));
    }
}
