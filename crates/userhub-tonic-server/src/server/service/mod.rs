//! gRPC service implementation and call lifecycle.
//!
//! ## Structure
//!
//! - [`handler`] - gRPC entry points (`DirectoryService`).
//! - [`lifecycle`] - in-flight call tracking and graceful shutdown.
//! - [`deadline`] - per-call cancellation tokens honoring `grpc-timeout`.

pub mod deadline;
pub mod handler;
pub mod lifecycle;
