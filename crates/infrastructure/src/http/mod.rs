//! HTTP clients for the control plane and the host agent gateway
//!
//! Every outgoing request carries a fresh `X-Request-Id` header.

mod platform_client;

pub use platform_client::{PlatformError, PlatformHttpClient, X_REQUEST_ID};
