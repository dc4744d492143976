//! API gateway with distributed-tracing instrumentation of its request pipeline.

pub mod config;
pub mod http;
pub mod instrumentation;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;

pub use config::GatewayConfig;
pub use http::GatewayServer;
pub use instrumentation::Instrumentation;
pub use lifecycle::Shutdown;
