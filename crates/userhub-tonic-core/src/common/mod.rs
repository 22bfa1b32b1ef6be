//! Definitions shared by the `userhub` server and its clients.
//!
//! - [`error`] - the service error type and its mapping onto `tonic::Status`.
//! - [`types`] - identifier prefixes and feed defaults.
//! - [`proto`] - generated messages, client and server for `userhub.v1`.

pub mod error;
pub mod types;

pub use error::{Error, Result};

/// Generated from `proto/userhub.proto`.
///
/// ## Service
///
/// - `CreateUser` / `GetUser` - unary directory operations.
/// - `StreamNotifications` - server streaming, one bounded feed per call.
/// - `UploadUserData` - client streaming, metadata followed by chunks.
///
/// `UploadChunk.data` is generated as `bytes::Bytes`.
pub mod proto {
    tonic::include_proto!("userhub.v1");

    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("userhub_descriptor");
}
