//! Fetch gateway implementations.
//!
//! [`HttpGateway`] fetches static HTML. Rendering gateways (headless
//! browsers, hosted scraping APIs) implement
//! [`FetchGateway`](crate::traits::gateway::FetchGateway) the same way and
//! add screenshots and interactions.

mod http;

pub use http::HttpGateway;
