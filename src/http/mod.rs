//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, one route per endpoint)
//!     → instrumentation entry middleware (sampling gate)
//!     → endpoint handler (pipeline::handler)
//!     → Send to client
//! ```

pub mod server;

pub use server::{GatewayServer, ServerError};
