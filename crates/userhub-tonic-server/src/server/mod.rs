//! Server-side components of the `userhub` service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/environment configuration.
//! - [`grpc`] - tonic router and transport wiring.
//! - [`service`] - gRPC entry points, call deadlines and shutdown.
//! - [`store`] - the user directory.
//! - [`streaming`] - the notification feed and upload aggregation.
//! - [`telemetry`] - logging, tracing and metrics initialization.
//!
//! These components are wired together in the server's `main.rs` and serve
//! the `UserService` defined in `userhub_tonic_core::proto`.

pub mod config;
pub mod grpc;
pub mod service;
pub mod store;
pub mod streaming;
pub mod telemetry;
