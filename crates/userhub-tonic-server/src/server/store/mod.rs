//! User directory storage.
//!
//! The gRPC handlers only see the [`DirectoryStore`] trait, so the in-memory
//! backend can be swapped for a persistent one without touching request
//! handling.
//!
//! - [`ids`] - sequential identifier allocation.
//! - [`memory`] - the default lock-guarded `HashMap` backend.

pub mod ids;
pub mod memory;

pub use memory::InMemoryStore;

use userhub_tonic_core::{Result, proto::User};

/// Point lookups and inserts keyed by user id.
///
/// Implementations must be safe to share between concurrent calls: a `get`
/// observes every `put` that returned before it started, and `next_id` never
/// hands out the same identifier twice for the lifetime of the store.
pub trait DirectoryStore: Send + Sync + 'static {
    /// Allocates a fresh, never-used identifier.
    fn next_id(&self) -> String;

    /// Inserts or overwrites the record stored under `user.user_id`.
    fn put(&self, user: User);

    /// Returns the user stored under `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`](userhub_tonic_core::Error::NotFound) when
    /// no such user exists.
    fn get(&self, user_id: &str) -> Result<User>;

    /// Number of stored users.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
