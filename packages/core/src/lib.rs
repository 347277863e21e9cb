//! Shunt Core — invocation model, endpoint URLs, and the RPC error taxonomy.

pub mod error;
pub mod invocation;
pub mod reply;
pub mod traits;
pub mod url;

pub use error::{AttemptFailure, ErrorCode, RpcError};
pub use invocation::Invocation;
pub use reply::Reply;
pub use traits::{Invoker, InvokerRef};
pub use url::{EndpointUrl, UrlParseError};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
